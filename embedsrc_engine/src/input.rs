//! Input acquisition for the mapped path.
//!
//! The whole input file is mapped read-only in one shot, with the kernel
//! advised that the pages will be needed and read sequentially. The advice
//! calls are hints and their results are ignored; mapping and unmapping
//! failures are fatal.

#![cfg(unix)]

use embedsrc_core::io::Fd;
use std::io;
use std::ptr::NonNull;

/// A read-only mapping of the entire input file.
pub struct MappedInput {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedInput {
    /// Map `len` bytes of `fd` from offset zero. `len` must be non-zero
    /// (the dispatcher short-circuits empty files long before this point).
    pub fn map(fd: Fd, len: usize) -> io::Result<MappedInput> {
        debug_assert!(len > 0, "empty files never reach the mapper");

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        unsafe {
            libc::madvise(ptr, len, libc::MADV_WILLNEED);
            libc::madvise(ptr, len, libc::MADV_SEQUENTIAL);
        }

        // MAP_FAILED was excluded above, so the pointer is real.
        let ptr = NonNull::new(ptr as *mut u8).ok_or_else(io::Error::last_os_error)?;
        Ok(MappedInput { ptr, len })
    }

    /// The mapped bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mapped length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty (never true in practice; see `map`).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Release the mapping. Failure here is fatal to the run, which is why
    /// this is an explicit operation rather than a `Drop` impl.
    pub fn unmap(self) -> io::Result<()> {
        let rc = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

// The mapping is immutable shared memory; nothing in it is thread-affine.
unsafe impl Send for MappedInput {}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    fn mapped_file(content: &[u8]) -> (tempfile::NamedTempFile, std::fs::File) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        tmp.flush().unwrap();
        let file = std::fs::File::open(tmp.path()).unwrap();
        (tmp, file)
    }

    #[test]
    fn test_map_reads_file_contents() {
        let content: Vec<u8> = (0..200u8).collect();
        let (_tmp, file) = mapped_file(&content);

        let mapping = MappedInput::map(file.as_raw_fd(), content.len()).unwrap();
        assert_eq!(mapping.len(), content.len());
        assert_eq!(mapping.as_slice(), &content[..]);
        mapping.unmap().unwrap();
    }

    #[test]
    fn test_map_spanning_multiple_pages() {
        let content = vec![0xA5u8; 3 * 4096 + 17];
        let (_tmp, file) = mapped_file(&content);

        let mapping = MappedInput::map(file.as_raw_fd(), content.len()).unwrap();
        assert_eq!(mapping.as_slice(), &content[..]);
        mapping.unmap().unwrap();
    }

    #[test]
    fn test_map_bad_descriptor_fails() {
        assert!(MappedInput::map(-1, 4096).is_err());
    }
}
