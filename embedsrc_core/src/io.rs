//! Raw file-descriptor I/O shim.
//!
//! Every byte this program moves goes through one of the two functions in
//! the platform module below: a single raw read or a single raw write on a
//! plain descriptor. Buffering, threading and batching all live in higher
//! layers; keeping the bottom of the stack this small is what lets the
//! transport engines reason about exactly which syscalls they cause.
//!
//! The standard streams are addressed by the `Fd` constants rather than by
//! owned handles so that the hot paths never touch the process-global
//! `std::io` locks.

use std::io;

// =============================================================================
// Platform-specific descriptor access
// =============================================================================

#[cfg(unix)]
mod platform {
    use std::io;

    /// Raw descriptor type. On POSIX this is the kernel fd itself.
    pub type Fd = i32;

    /// Standard input descriptor.
    pub const STDIN_FD: Fd = libc::STDIN_FILENO;
    /// Standard output descriptor.
    pub const STDOUT_FD: Fd = libc::STDOUT_FILENO;
    /// Standard error descriptor.
    pub const STDERR_FD: Fd = libc::STDERR_FILENO;

    /// One raw `read(2)`.
    pub fn read_fd(fd: Fd, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    /// One raw `write(2)`.
    pub fn write_fd(fd: Fd, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    /// Switch a descriptor to non-blocking mode.
    pub fn set_nonblocking(fd: Fd) -> io::Result<()> {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags == -1 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(windows)]
mod platform {
    use std::io;
    use std::ptr;
    use windows_sys::Win32::Foundation::{ERROR_BROKEN_PIPE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::{ReadFile, WriteFile};
    use windows_sys::Win32::System::Console::{
        GetStdHandle, STD_ERROR_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
    };

    /// Raw descriptor type. On Windows this is the `STD_*_HANDLE` selector,
    /// resolved to a real handle at call time.
    pub type Fd = u32;

    /// Standard input descriptor.
    pub const STDIN_FD: Fd = STD_INPUT_HANDLE;
    /// Standard output descriptor.
    pub const STDOUT_FD: Fd = STD_OUTPUT_HANDLE;
    /// Standard error descriptor.
    pub const STDERR_FD: Fd = STD_ERROR_HANDLE;

    fn resolve(fd: Fd) -> io::Result<windows_sys::Win32::Foundation::HANDLE> {
        let handle = unsafe { GetStdHandle(fd) };
        if handle == INVALID_HANDLE_VALUE {
            Err(io::Error::last_os_error())
        } else {
            Ok(handle)
        }
    }

    /// One raw `ReadFile`.
    pub fn read_fd(fd: Fd, buf: &mut [u8]) -> io::Result<usize> {
        let handle = resolve(fd)?;
        let mut read: u32 = 0;
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let ok =
            unsafe { ReadFile(handle, buf.as_mut_ptr().cast(), len, &mut read, ptr::null_mut()) };
        if ok == 0 {
            let err = io::Error::last_os_error();
            // A closed pipe on the far side reads as EOF, not as a failure.
            if err.raw_os_error() == Some(ERROR_BROKEN_PIPE as i32) {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(read as usize)
    }

    /// One raw `WriteFile`.
    pub fn write_fd(fd: Fd, buf: &[u8]) -> io::Result<usize> {
        let handle = resolve(fd)?;
        let mut written: u32 = 0;
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let ok =
            unsafe { WriteFile(handle, buf.as_ptr().cast(), len, &mut written, ptr::null_mut()) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(written as usize)
    }

    /// Non-blocking mode is a POSIX concept; the Windows build only runs the
    /// buffered engines, whose reader thread may block in `ReadFile`.
    pub fn set_nonblocking(_fd: Fd) -> io::Result<()> {
        Ok(())
    }
}

pub use platform::{read_fd, set_nonblocking, write_fd, Fd, STDERR_FD, STDIN_FD, STDOUT_FD};

// =============================================================================
// Whole-buffer helpers
// =============================================================================

/// Read until `buf` is full or the descriptor reports EOF.
///
/// Returns the number of bytes actually placed in `buf`; a short count means
/// EOF was reached. Must not be used on a non-blocking descriptor — the
/// async stdin stream handles `EAGAIN` itself.
pub fn read_entire_buffer(fd: Fd, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = read_fd(fd, &mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Write all of `buf`, looping over short writes.
pub fn write_entire_buffer(fd: Fd, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = write_fd(fd, buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "descriptor accepted no bytes",
            ));
        }
        buf = &buf[n..];
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    fn pipe_pair() -> (Fd, Fd) {
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    fn close(fd: Fd) {
        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let (rx, tx) = pipe_pair();

        write_entire_buffer(tx, b"pipeline").unwrap();
        close(tx);

        let mut buf = [0u8; 8];
        let n = read_entire_buffer(rx, &mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf, b"pipeline");
        close(rx);
    }

    #[test]
    fn test_read_entire_buffer_short_on_eof() {
        let (rx, tx) = pipe_pair();

        write_entire_buffer(tx, b"abc").unwrap();
        close(tx);

        let mut buf = [0u8; 16];
        let n = read_entire_buffer(rx, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");

        // Once EOF has been reported, further reads keep returning zero.
        let n = read_entire_buffer(rx, &mut buf).unwrap();
        assert_eq!(n, 0);
        close(rx);
    }

    #[test]
    fn test_read_from_regular_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"file-backed bytes").unwrap();
        tmp.flush().unwrap();

        let file = std::fs::File::open(tmp.path()).unwrap();
        let mut buf = [0u8; 32];
        let n = read_entire_buffer(file.as_raw_fd(), &mut buf).unwrap();
        assert_eq!(&buf[..n], b"file-backed bytes");
    }

    #[test]
    fn test_set_nonblocking_gives_would_block() {
        let (rx, tx) = pipe_pair();
        set_nonblocking(rx).unwrap();

        let mut buf = [0u8; 4];
        let err = read_fd(rx, &mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);

        close(tx);
        close(rx);
    }

    #[test]
    fn test_write_zero_length_is_noop() {
        let (rx, tx) = pipe_pair();
        write_entire_buffer(tx, b"").unwrap();
        close(tx);

        let mut buf = [0u8; 4];
        assert_eq!(read_entire_buffer(rx, &mut buf).unwrap(), 0);
        close(rx);
    }
}
