//! Zero-copy pipe output.
//!
//! Two page-aligned anonymous mappings are filled alternately with emitted
//! text. A buffer is handed to the kernel with `vmsplice(SPLICE_F_GIFT)`
//! only when it holds exactly one pipe-capacity of bytes, which keeps the
//! gift length page-aligned and guarantees the kernel has drained a buffer
//! before it is touched again: the pipe can hold at most one buffer's worth,
//! so the next gift of the *other* buffer cannot complete earlier.
//!
//! Emits may not straddle the end of a buffer, so the writer keeps an
//! overflow staging area: once the fill head passes the overflow guard,
//! whole emits land in staging, the buffer is topped up to exactly its
//! capacity from staging, gifted, and the staging remainder seeds the next
//! buffer.
//!
//! The buffers are separate mappings rather than halves of one mapping so
//! the producer and the kernel consumer never share a cache line.

#![cfg(target_os = "linux")]

use crate::error::EngineError;
use embedsrc_core::hugepage::huge_page_size;
use embedsrc_core::io::Fd;
use embedsrc_core::page::{align_down, align_up, base_page_size};
use embedsrc_format::{
    emit_chunk, emit_first, emit_separated, MemorySink, BYTES_PER_CHUNK, MAX_CHUNK_LEN,
};
use embedsrc_stream::StdoutStream;
use std::io;
use std::ptr::NonNull;

// =============================================================================
// Pipe capacity
// =============================================================================

/// Size of the kernel buffer behind a pipe descriptor.
pub fn pipe_capacity(fd: Fd) -> io::Result<usize> {
    let n = unsafe { libc::fcntl(fd, libc::F_GETPIPE_SZ) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

// =============================================================================
// Splice buffers
// =============================================================================

/// One page-aligned anonymous mapping used as a gift-splice source.
struct SpliceBuffer {
    ptr: NonNull<u8>,
    map_len: usize,
}

impl SpliceBuffer {
    /// Map at least `capacity` bytes, preferring huge pages. The mapping is
    /// rounded up to the page granularity actually used; callers only ever
    /// touch the first `capacity` bytes.
    fn allocate(capacity: usize) -> io::Result<SpliceBuffer> {
        if let Some(huge) = huge_page_size() {
            if huge > 0 {
                if let Ok(buf) = Self::map_anonymous(align_up(capacity, huge), libc::MAP_HUGETLB) {
                    return Ok(buf);
                }
            }
        }
        Self::map_anonymous(align_up(capacity, base_page_size()), 0)
    }

    fn map_anonymous(map_len: usize, extra_flags: libc::c_int) -> io::Result<SpliceBuffer> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | extra_flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(ptr as *mut u8).ok_or_else(io::Error::last_os_error)?;
        Ok(SpliceBuffer { ptr, map_len })
    }

    #[inline]
    fn slice_mut(&mut self, len: usize) -> &mut [u8] {
        debug_assert!(len <= self.map_len);
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), len) }
    }

    #[inline]
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for SpliceBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.map_len);
        }
    }
}

unsafe impl Send for SpliceBuffer {}

// =============================================================================
// vmsplice
// =============================================================================

/// Push `len` bytes at `ptr` into the pipe, looping over short splices.
///
/// With `gift` set, iterations whose base and length are page-aligned move
/// page ownership to the kernel; a misaligned remainder after a short gift
/// splice is copied instead.
fn vmsplice_all(fd: Fd, mut ptr: *const u8, mut len: usize, gift: bool) -> io::Result<()> {
    let page = base_page_size();
    while len > 0 {
        let flags = if gift && ptr as usize % page == 0 && len % page == 0 {
            libc::SPLICE_F_GIFT
        } else {
            0
        };
        let iov = libc::iovec {
            iov_base: ptr as *mut libc::c_void,
            iov_len: len,
        };
        let n = unsafe { libc::vmsplice(fd, &iov, 1, flags) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "pipe accepted no bytes",
            ));
        }
        ptr = unsafe { ptr.add(n as usize) };
        len -= n as usize;
    }
    Ok(())
}

// =============================================================================
// Splice writer
// =============================================================================

/// Array-body writer that gift-splices full pipe buffers to stdout.
pub struct SpliceWriter {
    fd: Fd,
    buffers: [SpliceBuffer; 2],
    /// Index of the buffer currently being filled.
    current: usize,
    /// Fill position within the current buffer.
    head: usize,
    /// Bytes per gift splice; equals the pipe capacity.
    capacity: usize,
    /// Last head value at which a whole emit is still guaranteed to fit.
    guard: usize,
    /// Overflow area for emits that would cross the buffer end.
    staging: [u8; 2 * MAX_CHUNK_LEN],
    staging_len: usize,
}

impl SpliceWriter {
    /// Query the pipe and map both splice buffers.
    pub fn new(fd: Fd) -> io::Result<SpliceWriter> {
        let capacity = pipe_capacity(fd)?;
        if capacity <= MAX_CHUNK_LEN {
            // No real pipe is this small, but the guard arithmetic below
            // needs the headroom.
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "pipe capacity below one emit",
            ));
        }
        let buffers = [
            SpliceBuffer::allocate(capacity)?,
            SpliceBuffer::allocate(capacity)?,
        ];
        Ok(SpliceWriter {
            fd,
            buffers,
            current: 0,
            head: 0,
            capacity,
            guard: capacity - MAX_CHUNK_LEN,
            staging: [0u8; 2 * MAX_CHUNK_LEN],
            staging_len: 0,
        })
    }

    /// Emit the first byte of the body.
    pub fn first(&mut self, value: u8) -> Result<(), EngineError> {
        self.emit(|sink| emit_first(sink, value))
    }

    /// Emit one full chunk.
    pub fn chunk(&mut self, values: &[u8; BYTES_PER_CHUNK]) -> Result<(), EngineError> {
        self.emit(|sink| emit_chunk(sink, values))
    }

    /// Emit one separated byte.
    pub fn single(&mut self, value: u8) -> Result<(), EngineError> {
        self.emit(|sink| emit_separated(sink, value))
    }

    fn emit(&mut self, emit_op: impl FnOnce(&mut MemorySink<'_>) -> bool) -> Result<(), EngineError> {
        if self.head <= self.guard {
            let buf = self.buffers[self.current].slice_mut(self.capacity);
            let mut sink = MemorySink::new(&mut buf[self.head..]);
            emit_op(&mut sink);
            self.head += sink.written();
            if self.head == self.capacity {
                self.splice_current_full()?;
            }
            return Ok(());
        }

        // Past the guard: the emit might not fit, stage it.
        let mut sink = MemorySink::new(&mut self.staging[self.staging_len..]);
        emit_op(&mut sink);
        self.staging_len += sink.written();
        self.drain_staging()
    }

    /// If staging can top the current buffer off to exactly `capacity`,
    /// complete it, gift it, and seed the other buffer with the remainder.
    fn drain_staging(&mut self) -> Result<(), EngineError> {
        let needed = self.capacity - self.head;
        if self.staging_len < needed {
            return Ok(());
        }

        {
            let buf = self.buffers[self.current].slice_mut(self.capacity);
            buf[self.head..].copy_from_slice(&self.staging[..needed]);
        }
        self.splice_current_full()?;

        let remainder = self.staging_len - needed;
        if remainder > 0 {
            let buf = self.buffers[self.current].slice_mut(self.capacity);
            buf[..remainder].copy_from_slice(&self.staging[needed..needed + remainder]);
        }
        self.head = remainder;
        self.staging_len = 0;
        Ok(())
    }

    /// Gift the full current buffer to the kernel and swap buffers.
    fn splice_current_full(&mut self) -> Result<(), EngineError> {
        vmsplice_all(
            self.fd,
            self.buffers[self.current].as_ptr(),
            self.capacity,
            true,
        )
        .map_err(|e| EngineError::io("vmsplice to stdout", e))?;
        self.current ^= 1;
        self.head = 0;
        Ok(())
    }

    /// Flush the final partial buffer: the page-aligned prefix goes through
    /// a plain (non-gift) splice, the sub-page tail through the async
    /// stdout stream, whose write lengths have no alignment constraint.
    pub fn finish(mut self) -> Result<(), EngineError> {
        if self.staging_len > 0 {
            // Staging never completed the buffer, so it fits back in.
            let (head, staging_len) = (self.head, self.staging_len);
            let buf = self.buffers[self.current].slice_mut(self.capacity);
            buf[head..head + staging_len].copy_from_slice(&self.staging[..staging_len]);
            self.head += staging_len;
            self.staging_len = 0;
        }

        let aligned = align_down(self.head, base_page_size());
        if aligned > 0 {
            vmsplice_all(self.fd, self.buffers[self.current].as_ptr(), aligned, false)
                .map_err(|e| EngineError::io("vmsplice to stdout", e))?;
        }

        let tail_len = self.head - aligned;
        if tail_len > 0 {
            let buf = self.buffers[self.current].slice_mut(self.capacity);
            let tail = &buf[aligned..aligned + tail_len];
            let mut stream = StdoutStream::initialize(self.fd);
            if !stream.write(tail) {
                let err = stream
                    .last_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "stream write failed"));
                return Err(EngineError::io("write tail to stdout stream", err));
            }
            stream
                .dispose()
                .map_err(|e| EngineError::io("flush stdout stream", e))?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
