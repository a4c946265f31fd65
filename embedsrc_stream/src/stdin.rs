//! The asynchronous input stream.
//!
//! A background thread keeps one buffer half full while the consumer drains
//! the other. The descriptor is switched to non-blocking mode so the reader
//! thread retries `EAGAIN` in a tight loop instead of parking inside the
//! kernel — that keeps the cancellation flag observable between syscalls.
//!
//! EOF is recorded as an absolute end position (`write_head`); once the
//! consumer observes it, every read clamps against that position and a
//! short return signals end-of-stream to the caller.

use crate::half::{spin_wait, Half};
use crate::DEFAULT_HALF_LEN;
use embedsrc_core::io::{self, Fd};
use std::cell::UnsafeCell;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// `write_head` value meaning "no EOF recorded yet".
const EOF_UNSET: usize = usize::MAX;

// =============================================================================
// Shared state
// =============================================================================

struct Shared {
    /// The double buffer; `2 * half_len` bytes.
    buf: UnsafeCell<Box<[u8]>>,
    /// Half the reader thread fills next. The consumer drains the other.
    refill_half: AtomicBool,
    /// True while the reader owns its half.
    io_pending: AtomicBool,
    /// Absolute end of produced data once EOF has been seen.
    write_head: AtomicUsize,
    /// Sticky failure marker plus the raw OS error behind it.
    failed: AtomicBool,
    error_code: AtomicI32,
    /// Cancellation flag checked around every wait and syscall.
    finalize: AtomicBool,
    fd: Fd,
    half_len: usize,
}

// The half-ownership protocol guarantees a single writer per byte at any
// time; `io_pending`/`refill_half` release-acquire pairs publish the data.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn base_ptr(&self) -> *mut u8 {
        unsafe { (*self.buf.get()).as_mut_ptr() }
    }
}

// =============================================================================
// Background reader
// =============================================================================

enum FillOutcome {
    /// The half was filled completely.
    Filled,
    /// EOF arrived after this many bytes.
    Eof(usize),
    /// The finalize flag was raised mid-fill.
    Cancelled,
    /// A read failed; raw OS error code.
    Failed(i32),
}

/// Fill one half from the descriptor, retrying `EAGAIN` immediately.
fn fill_half(shared: &Shared, half: Half) -> FillOutcome {
    let offset = half.offset(shared.half_len);
    let mut filled = 0;
    while filled < shared.half_len {
        if shared.finalize.load(Ordering::Acquire) {
            return FillOutcome::Cancelled;
        }
        let dst = unsafe {
            std::slice::from_raw_parts_mut(
                shared.base_ptr().add(offset + filled),
                shared.half_len - filled,
            )
        };
        match io::read_fd(shared.fd, dst) {
            Ok(0) => return FillOutcome::Eof(filled),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::hint::spin_loop();
            }
            Err(e) => return FillOutcome::Failed(e.raw_os_error().unwrap_or(0)),
        }
    }
    FillOutcome::Filled
}

fn reader_loop(shared: &Shared) {
    // `initialize` filled the left half synchronously; start on the right.
    let mut target = Half::Right;
    loop {
        spin_wait(|| {
            shared.finalize.load(Ordering::Acquire)
                || Half::from_bool(shared.refill_half.load(Ordering::Acquire)) == target
        });
        if shared.finalize.load(Ordering::Acquire) {
            return;
        }

        match fill_half(shared, target) {
            FillOutcome::Filled => {
                shared.io_pending.store(false, Ordering::Release);
            }
            FillOutcome::Eof(filled) => {
                shared
                    .write_head
                    .store(target.offset(shared.half_len) + filled, Ordering::Relaxed);
                shared.io_pending.store(false, Ordering::Release);
                return;
            }
            FillOutcome::Cancelled => return,
            FillOutcome::Failed(code) => {
                shared.error_code.store(code, Ordering::Relaxed);
                shared.failed.store(true, Ordering::Relaxed);
                shared.io_pending.store(false, Ordering::Release);
                return;
            }
        }

        target = target.other();
    }
}

// =============================================================================
// Consumer handle
// =============================================================================

/// Double-buffered asynchronous reader over a raw descriptor.
pub struct StdinStream {
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
    /// Absolute position of the next unconsumed byte.
    read_head: usize,
    /// Half currently being drained.
    active: Half,
    /// Absolute end of data, once EOF has been observed on this side.
    eof_end: Option<usize>,
    half_len: usize,
}

impl StdinStream {
    /// Initialise over `fd` with the default half-buffer size.
    pub fn initialize(fd: Fd) -> std::io::Result<StdinStream> {
        Self::with_half_len(fd, DEFAULT_HALF_LEN)
    }

    /// Initialise with an explicit half-buffer size (any size ≥ 1).
    ///
    /// Switches `fd` to non-blocking mode and synchronously fills the first
    /// half. If EOF arrives during that fill, no reader thread is started
    /// and reads simply drain what was gathered.
    pub fn with_half_len(fd: Fd, half_len: usize) -> std::io::Result<StdinStream> {
        assert!(half_len >= 1, "half buffer must hold at least one byte");
        io::set_nonblocking(fd)?;

        let shared = Arc::new(Shared {
            buf: UnsafeCell::new(vec![0u8; half_len * 2].into_boxed_slice()),
            refill_half: AtomicBool::new(Half::Right.as_bool()),
            io_pending: AtomicBool::new(false),
            write_head: AtomicUsize::new(EOF_UNSET),
            failed: AtomicBool::new(false),
            error_code: AtomicI32::new(0),
            finalize: AtomicBool::new(false),
            fd,
            half_len,
        });

        let mut stream = StdinStream {
            shared: Arc::clone(&shared),
            reader: None,
            read_head: 0,
            active: Half::Left,
            eof_end: None,
            half_len,
        };

        match fill_half(&shared, Half::Left) {
            FillOutcome::Filled => {
                // The reader immediately owns the right half.
                shared.io_pending.store(true, Ordering::Relaxed);
                let for_thread = Arc::clone(&shared);
                stream.reader = Some(thread::spawn(move || reader_loop(&for_thread)));
            }
            FillOutcome::Eof(filled) => {
                stream.eof_end = Some(filled);
            }
            FillOutcome::Failed(code) => {
                return Err(std::io::Error::from_raw_os_error(code));
            }
            FillOutcome::Cancelled => {
                return Err(std::io::Error::new(
                    ErrorKind::Interrupted,
                    "input stream cancelled during initialisation",
                ));
            }
        }

        Ok(stream)
    }

    /// Blocking read. Returns the number of bytes copied into `out`; a
    /// short count means the stream has ended, and every read after that
    /// returns `Ok(0)`.
    pub fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if let Some(end) = self.eof_end {
            let n = out.len().min(end - self.read_head);
            self.copy_out(&mut out[..n]);
            return Ok(n);
        }

        let mut copied = 0;
        loop {
            let half_end = self.active.offset(self.half_len) + self.half_len;
            let avail = half_end - self.read_head;
            let want = out.len() - copied;
            if want < avail {
                self.copy_out(&mut out[copied..]);
                return Ok(out.len());
            }

            // Drain the active half completely, then trade halves.
            self.copy_out(&mut out[copied..copied + avail]);
            copied += avail;

            spin_wait(|| !self.shared.io_pending.load(Ordering::Acquire));
            if self.shared.failed.load(Ordering::Relaxed) {
                return Err(self.recorded_error());
            }

            let recorded_end = self.shared.write_head.load(Ordering::Relaxed);
            self.shared.io_pending.store(true, Ordering::Release);
            self.shared
                .refill_half
                .store(self.active.as_bool(), Ordering::Release);
            self.active = self.active.other();
            self.read_head = self.active.offset(self.half_len);

            if recorded_end != EOF_UNSET {
                self.eof_end = Some(recorded_end);
                let n = (out.len() - copied).min(recorded_end - self.read_head);
                self.copy_out(&mut out[copied..copied + n]);
                return Ok(copied + n);
            }
        }
    }

    /// Stop the reader thread and reclaim it. Buffered-but-unread bytes are
    /// discarded.
    pub fn dispose(mut self) {
        if let Some(handle) = self.reader.take() {
            self.shared.finalize.store(true, Ordering::Release);
            // Flip the handover flag so a parked reader re-checks finalize.
            let current = self.shared.refill_half.load(Ordering::Acquire);
            self.shared.refill_half.store(!current, Ordering::Release);
            let _ = handle.join();
        }
    }

    fn copy_out(&mut self, out: &mut [u8]) {
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.shared.base_ptr().add(self.read_head) as *const u8,
                out.as_mut_ptr(),
                out.len(),
            );
        }
        self.read_head += out.len();
    }

    fn recorded_error(&self) -> std::io::Error {
        let code = self.shared.error_code.load(Ordering::Relaxed);
        if code == 0 {
            std::io::Error::new(ErrorKind::Other, "input stream read failed")
        } else {
            std::io::Error::from_raw_os_error(code)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
