//! Byte sink trait
//!
//! Every encoder in this crate writes through a [`ByteSink`]. The same encoder call can
//! target a growable buffer, a fixed slice (for example a freshly mapped JIT region), or a
//! [`CountingSink`] that only measures. Because the encoders build each instruction before
//! handing it to the sink, a measuring pass and a writing pass always agree on length.

use crate::error::RasError;

/// Destination for encoded bytes
pub trait ByteSink {
    /// Append `bytes` at the current position
    fn emit(&mut self, bytes: &[u8]) -> Result<(), RasError>;

    /// Number of bytes emitted so far
    fn current_position(&self) -> usize;

    fn emit_byte(&mut self, byte: u8) -> Result<(), RasError> {
        self.emit(&[byte])
    }
}

impl ByteSink for Vec<u8> {
    fn emit(&mut self, bytes: &[u8]) -> Result<(), RasError> {
        self.extend_from_slice(bytes);
        Ok(())
    }

    fn current_position(&self) -> usize {
        self.len()
    }
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn emit(&mut self, bytes: &[u8]) -> Result<(), RasError> {
        (**self).emit(bytes)
    }

    fn current_position(&self) -> usize {
        (**self).current_position()
    }
}

/// Sink that discards bytes and only keeps their count (the size-probe pass)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountingSink {
    count: usize,
}

impl CountingSink {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl ByteSink for CountingSink {
    fn emit(&mut self, bytes: &[u8]) -> Result<(), RasError> {
        self.count += bytes.len();
        Ok(())
    }

    fn current_position(&self) -> usize {
        self.count
    }
}

/// Sink over a caller-owned slice; refuses to write past its end
pub struct SliceSink<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

impl ByteSink for SliceSink<'_> {
    fn emit(&mut self, bytes: &[u8]) -> Result<(), RasError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(RasError::BufferOverflow {
                capacity: self.buf.len(),
                needed: end,
            });
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn current_position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_sink_counts_without_storing() {
        let mut sink = CountingSink::new();
        sink.emit(&[1, 2, 3]).unwrap();
        sink.emit_byte(4).unwrap();
        assert_eq!(sink.count(), 4);
        assert_eq!(sink.current_position(), 4);
    }

    #[test]
    fn test_slice_sink_rejects_overflow() {
        let mut storage = [0u8; 3];
        let mut sink = SliceSink::new(&mut storage);
        sink.emit(&[0xaa, 0xbb]).unwrap();
        let err = sink.emit(&[0xcc, 0xdd]).unwrap_err();
        assert_eq!(
            err,
            RasError::BufferOverflow {
                capacity: 3,
                needed: 4
            }
        );
        assert_eq!(sink.written(), &[0xaa, 0xbb]);
    }

    #[test]
    fn test_vec_sink_through_reference() {
        let mut buffer = Vec::new();
        {
            let mut by_ref = &mut buffer;
            by_ref.emit(&[7, 8]).unwrap();
            assert_eq!(by_ref.current_position(), 2);
        }
        assert_eq!(buffer, vec![7, 8]);
    }
}
