//! Frame layout of the generated routine.
//!
//! From `rsp` upwards after the prologue:
//!
//! ```text
//! rsp + 0                      outgoing-call reservation (32 bytes)
//! rbp = rsp + 32               locals, 4 bytes each, padded to 16
//! rbp + locals                 temporaries, 4 bytes each, padded to 16
//! ...                          padding so the saved-register area is a multiple of 16
//! ...                          callee-saved registers, then the caller's rbp
//! ```
//!
//! Locals and temporaries are addressed from `rbp`, so scratch pushes below `rsp` never
//! move them.

use super::LowerError;

pub const STACK_ALIGNMENT: u32 = 16;

/// Home space below the frame pointer
pub const OUTGOING_RESERVATION: u32 = 32;

pub const SLOT_SIZE: u32 = 4;

/// Cap for each of the local and temporary regions
pub const REGION_LIMIT: u32 = 1024;

const SAVED_REGISTER_SIZE: u32 = 8;

pub fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// One region of the frame, as an `rsp`-relative byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRegion {
    pub name: &'static str,
    pub start: u32,
    pub size: u32,
}

impl FrameRegion {
    pub fn end(&self) -> u32 {
        self.start + self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    var_count: u32,
    temp_bytes: u32,
}

impl FrameLayout {
    pub fn new(var_count: u32) -> Result<Self, LowerError> {
        let local_bytes = u64::from(var_count) * u64::from(SLOT_SIZE);
        if local_bytes > u64::from(REGION_LIMIT) {
            return Err(LowerError::FrameExhausted {
                region: "locals",
                limit: REGION_LIMIT,
            });
        }
        Ok(Self {
            var_count,
            temp_bytes: 0,
        })
    }

    pub fn var_count(&self) -> u32 {
        self.var_count
    }

    pub fn local_bytes(&self) -> u32 {
        self.var_count * SLOT_SIZE
    }

    pub fn temp_bytes(&self) -> u32 {
        self.temp_bytes
    }

    fn locals_region(&self) -> u32 {
        align_up(self.local_bytes(), STACK_ALIGNMENT)
    }

    fn temps_region(&self) -> u32 {
        align_up(self.temp_bytes, STACK_ALIGNMENT)
    }

    /// `rbp` displacement of local `index`
    pub fn local_disp(&self, index: u32) -> Result<i32, LowerError> {
        if index >= self.var_count {
            return Err(LowerError::LocalOutOfRange {
                index,
                var_count: self.var_count,
            });
        }
        Ok((index * SLOT_SIZE) as i32)
    }

    /// Carve a fresh temporary slot, returning its `rbp` displacement
    pub fn alloc_temp(&mut self) -> Result<i32, LowerError> {
        if self.temp_bytes + SLOT_SIZE > REGION_LIMIT {
            return Err(LowerError::FrameExhausted {
                region: "temporaries",
                limit: REGION_LIMIT,
            });
        }
        let disp = self.locals_region() + self.temp_bytes;
        self.temp_bytes += SLOT_SIZE;
        Ok(disp as i32)
    }

    /// Padding that rounds the pushed registers up to the alignment
    pub fn saved_padding(saved_count: usize) -> u32 {
        let pushed = saved_count as u32 * SAVED_REGISTER_SIZE;
        align_up(pushed, STACK_ALIGNMENT) - pushed
    }

    /// Immediate of the prologue's `sub rsp` and the epilogue's `add rsp`
    pub fn stack_adjust(&self, saved_count: usize) -> u32 {
        self.locals_region()
            + self.temps_region()
            + Self::saved_padding(saved_count)
            + OUTGOING_RESERVATION
    }

    /// Frame regions in address order; `saved registers` includes its padding
    pub fn regions(&self, saved_count: usize) -> [FrameRegion; 4] {
        let reservation = FrameRegion {
            name: "outgoing reservation",
            start: 0,
            size: OUTGOING_RESERVATION,
        };
        let locals = FrameRegion {
            name: "locals",
            start: reservation.end(),
            size: self.locals_region(),
        };
        let temps = FrameRegion {
            name: "temporaries",
            start: locals.end(),
            size: self.temps_region(),
        };
        let saved = FrameRegion {
            name: "saved registers",
            start: temps.end(),
            size: Self::saved_padding(saved_count) + saved_count as u32 * SAVED_REGISTER_SIZE,
        };
        [reservation, locals, temps, saved]
    }
}
