//! Executable memory for JIT-compiled code
//!
//! The region starts out read-write. Code is written into it (directly through
//! [`ExecutableMemory::as_mut_slice`] or by copying with [`ExecutableMemory::write_code`]),
//! then [`ExecutableMemory::make_executable`] flips it to read-execute. The mapping is
//! released when the value is dropped, on success and error paths alike.

use crate::error::RasError;

/// Page-aligned anonymous mapping holding generated code
pub struct ExecutableMemory {
    ptr: *mut u8,
    size: usize,
    executable: bool,
}

impl ExecutableMemory {
    /// Allocate writable memory (not executable yet)
    pub fn allocate_writable(size: usize) -> Result<Self, RasError> {
        #[cfg(unix)]
        {
            use libc::{MAP_ANONYMOUS, MAP_PRIVATE, PROT_READ, PROT_WRITE, mmap};
            use std::ptr;

            let aligned_size = (size.max(1) + 4095) & !4095; // Page align

            let ptr = unsafe {
                mmap(
                    ptr::null_mut(),
                    aligned_size,
                    PROT_READ | PROT_WRITE,
                    MAP_ANONYMOUS | MAP_PRIVATE,
                    -1,
                    0,
                )
            };

            if ptr == libc::MAP_FAILED {
                return Err(RasError::IoError(format!(
                    "mmap failed (size: {} bytes, aligned: {})",
                    size, aligned_size
                )));
            }

            tracing::debug!(size, aligned_size, "mapped writable code region");

            Ok(Self {
                ptr: ptr as *mut u8,
                size: aligned_size,
                executable: false,
            })
        }

        #[cfg(not(unix))]
        {
            let _ = size;
            Err(RasError::UnsupportedTarget(
                "executable memory allocation is only implemented for Unix hosts".to_string(),
            ))
        }
    }

    /// Switch the region to read-execute; no further writes are allowed
    pub fn make_executable(&mut self) -> Result<(), RasError> {
        #[cfg(unix)]
        {
            use libc::{PROT_EXEC, PROT_READ, mprotect};

            let result =
                unsafe { mprotect(self.ptr as *mut libc::c_void, self.size, PROT_READ | PROT_EXEC) };

            if result != 0 {
                return Err(RasError::IoError(format!(
                    "mprotect failed (size: {} bytes). Cannot make memory executable.",
                    self.size
                )));
            }

            self.executable = true;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            Err(RasError::UnsupportedTarget(
                "making memory executable is only implemented for Unix hosts".to_string(),
            ))
        }
    }

    /// Mapped size (a whole number of pages)
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }

    /// Writable view of the region; fails once the region is executable
    pub fn as_mut_slice(&mut self) -> Result<&mut [u8], RasError> {
        if self.executable {
            return Err(RasError::IoError(
                "code region is already executable".to_string(),
            ));
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) })
    }

    /// Readable view of the region
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    /// Copy code to the start of the region
    pub fn write_code(&mut self, code: &[u8]) -> Result<(), RasError> {
        let region = self.as_mut_slice()?;
        if code.len() > region.len() {
            return Err(RasError::BufferOverflow {
                capacity: region.len(),
                needed: code.len(),
            });
        }
        region[..code.len()].copy_from_slice(code);
        Ok(())
    }

    /// Get function pointer
    ///
    /// # Safety
    ///
    /// The region must be executable and hold a complete routine whose calling
    /// convention matches `T`.
    pub unsafe fn as_function_ptr<T>(&self) -> *const T {
        self.ptr as *const T
    }
}

impl Drop for ExecutableMemory {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::munmap;
            unsafe {
                munmap(self.ptr as *mut libc::c_void, self.size);
            }
            tracing::debug!(size = self.size, "unmapped code region");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_page_aligned() {
        let mem = ExecutableMemory::allocate_writable(10).unwrap();
        assert_eq!(mem.len(), 4096);
        assert!(!mem.is_executable());

        let mem = ExecutableMemory::allocate_writable(4097).unwrap();
        assert_eq!(mem.len(), 8192);
    }

    #[test]
    fn test_writes_rejected_after_protect() {
        let mut mem = ExecutableMemory::allocate_writable(16).unwrap();
        mem.write_code(&[0xc3]).unwrap();
        mem.make_executable().unwrap();
        assert!(mem.is_executable());
        assert!(mem.write_code(&[0x90]).is_err());
        assert_eq!(mem.as_slice()[0], 0xc3);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_execute_constant_routine() {
        // mov eax, 42 ; ret
        let code = [0xb8, 0x2a, 0x00, 0x00, 0x00, 0xc3];
        let mut mem = ExecutableMemory::allocate_writable(code.len()).unwrap();
        mem.write_code(&code).unwrap();
        mem.make_executable().unwrap();
        let result = unsafe {
            let f: extern "C" fn() -> i32 = std::mem::transmute(mem.as_function_ptr::<u8>());
            f()
        };
        assert_eq!(result, 42);
    }
}
