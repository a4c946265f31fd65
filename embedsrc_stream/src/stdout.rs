//! The asynchronous output stream.
//!
//! Mirror image of the input stream: the producer fills one half while a
//! background flusher writes the previously completed half to the
//! descriptor. `flush_size` is the number of bytes the flusher must emit
//! for the published half — the full half length in steady state, less
//! during an explicit [`StdoutStream::flush`].

use crate::half::{spin_wait, Half};
use crate::DEFAULT_HALF_LEN;
use embedsrc_core::io::{self, Fd};
use embedsrc_format::StreamWrite;
use std::cell::UnsafeCell;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// =============================================================================
// Shared state
// =============================================================================

struct Shared {
    /// The double buffer; `2 * half_len` bytes.
    buf: UnsafeCell<Box<[u8]>>,
    /// Half the flusher writes next. The producer fills the other.
    flush_half: AtomicBool,
    /// True while the flusher owns the published half.
    io_pending: AtomicBool,
    /// Bytes to write for the published half.
    flush_size: AtomicUsize,
    /// Sticky failure marker plus the raw OS error behind it.
    failed: AtomicBool,
    error_code: AtomicI32,
    /// Cancellation flag; checked after every wait, before the syscall.
    finalize: AtomicBool,
    fd: Fd,
    half_len: usize,
}

// Single writer per byte at any time; publication happens through the
// release stores on `flush_half` / `io_pending`.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn base_ptr(&self) -> *mut u8 {
        unsafe { (*self.buf.get()).as_mut_ptr() }
    }
}

// =============================================================================
// Background flusher
// =============================================================================

fn flusher_loop(shared: &Shared) {
    // The producer fills the left half first, so it is published first.
    let mut target = Half::Left;
    loop {
        spin_wait(|| {
            shared.finalize.load(Ordering::Acquire)
                || Half::from_bool(shared.flush_half.load(Ordering::Acquire)) == target
        });
        if shared.finalize.load(Ordering::Acquire) {
            return;
        }

        let len = shared.flush_size.load(Ordering::Relaxed);
        let src = unsafe {
            std::slice::from_raw_parts(shared.base_ptr().add(target.offset(shared.half_len)), len)
        };
        match io::write_entire_buffer(shared.fd, src) {
            Ok(()) => {
                shared.io_pending.store(false, Ordering::Release);
            }
            Err(e) => {
                shared
                    .error_code
                    .store(e.raw_os_error().unwrap_or(0), Ordering::Relaxed);
                shared.failed.store(true, Ordering::Relaxed);
                shared.io_pending.store(false, Ordering::Release);
                return;
            }
        }

        target = target.other();
    }
}

// =============================================================================
// Producer handle
// =============================================================================

/// Double-buffered asynchronous writer over a raw descriptor.
pub struct StdoutStream {
    shared: Arc<Shared>,
    flusher: Option<JoinHandle<()>>,
    /// Absolute position of the next byte the producer writes.
    write_head: usize,
    /// Half currently being filled.
    fill: Half,
    half_len: usize,
}

impl StdoutStream {
    /// Initialise over `fd` with the default half-buffer size.
    pub fn initialize(fd: Fd) -> StdoutStream {
        Self::with_half_len(fd, DEFAULT_HALF_LEN)
    }

    /// Initialise with an explicit half-buffer size (any size ≥ 1).
    pub fn with_half_len(fd: Fd, half_len: usize) -> StdoutStream {
        assert!(half_len >= 1, "half buffer must hold at least one byte");

        let shared = Arc::new(Shared {
            buf: UnsafeCell::new(vec![0u8; half_len * 2].into_boxed_slice()),
            flush_half: AtomicBool::new(Half::Right.as_bool()),
            io_pending: AtomicBool::new(false),
            flush_size: AtomicUsize::new(half_len),
            failed: AtomicBool::new(false),
            error_code: AtomicI32::new(0),
            finalize: AtomicBool::new(false),
            fd,
            half_len,
        });

        let for_thread = Arc::clone(&shared);
        let flusher = thread::spawn(move || flusher_loop(&for_thread));

        StdoutStream {
            shared,
            flusher: Some(flusher),
            write_head: 0,
            fill: Half::Left,
            half_len,
        }
    }

    /// Append `input`. Returns `false` once the stream has failed; from
    /// then on every call fails without touching the descriptor.
    pub fn write(&mut self, mut input: &[u8]) -> bool {
        loop {
            let half_start = self.fill.offset(self.half_len);
            let free = half_start + self.half_len - self.write_head;
            if input.len() < free {
                self.copy_in(input);
                return true;
            }

            // Top off the half, then hand it to the flusher.
            let (fits, rest) = input.split_at(free);
            self.copy_in(fits);
            input = rest;

            spin_wait(|| !self.shared.io_pending.load(Ordering::Acquire));
            if self.shared.failed.load(Ordering::Relaxed) {
                return false;
            }

            self.shared.io_pending.store(true, Ordering::Release);
            self.shared
                .flush_half
                .store(self.fill.as_bool(), Ordering::Release);
            self.fill = self.fill.other();
            self.write_head = self.fill.offset(self.half_len);
        }
    }

    /// Force the partially filled half out to the descriptor and wait for
    /// it to land. Returns `false` if the stream has failed.
    pub fn flush(&mut self) -> bool {
        // Wait for the in-flight half first.
        spin_wait(|| !self.shared.io_pending.load(Ordering::Acquire));
        if self.shared.failed.load(Ordering::Relaxed) {
            return false;
        }

        let filled = self.write_head - self.fill.offset(self.half_len);
        self.shared.flush_size.store(filled, Ordering::Relaxed);
        self.shared.io_pending.store(true, Ordering::Release);
        self.shared
            .flush_half
            .store(self.fill.as_bool(), Ordering::Release);
        self.fill = self.fill.other();

        spin_wait(|| !self.shared.io_pending.load(Ordering::Acquire));
        if self.shared.failed.load(Ordering::Relaxed) {
            return false;
        }

        self.shared
            .flush_size
            .store(self.half_len, Ordering::Relaxed);
        self.write_head = self.fill.offset(self.half_len);
        true
    }

    /// Flush the remainder, stop the flusher thread and reclaim it.
    pub fn dispose(mut self) -> std::io::Result<()> {
        if !self.flush() {
            let err = self.recorded_error();
            // The flusher exited when it recorded the failure.
            if let Some(handle) = self.flusher.take() {
                let _ = handle.join();
            }
            return Err(err);
        }
        self.shared.finalize.store(true, Ordering::Release);
        let current = self.shared.flush_half.load(Ordering::Acquire);
        self.shared.flush_half.store(!current, Ordering::Release);
        if let Some(handle) = self.flusher.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    /// The OS error recorded by the flusher, if any.
    pub fn last_error(&self) -> Option<std::io::Error> {
        if self.shared.failed.load(Ordering::Acquire) {
            Some(self.recorded_error())
        } else {
            None
        }
    }

    fn copy_in(&mut self, input: &[u8]) {
        unsafe {
            std::ptr::copy_nonoverlapping(
                input.as_ptr(),
                self.shared.base_ptr().add(self.write_head),
                input.len(),
            );
        }
        self.write_head += input.len();
    }

    fn recorded_error(&self) -> std::io::Error {
        let code = self.shared.error_code.load(Ordering::Relaxed);
        if code == 0 {
            std::io::Error::new(ErrorKind::Other, "output stream write failed")
        } else {
            std::io::Error::from_raw_os_error(code)
        }
    }
}

impl StreamWrite for StdoutStream {
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        self.write(bytes)
    }
}

// =============================================================================
// Tests
// =============================================================================
