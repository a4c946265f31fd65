//! Descriptor classification and transport choice.
//!
//! The decision is made once per run from two `fstat` calls. `choose` is a
//! pure function over the two classifications so the whole table is unit
//! testable; the degradation chains for setup failures live in `run`.

use embedsrc_core::io::Fd;
use std::io;

// =============================================================================
// Descriptor classification
// =============================================================================

/// What kind of object a standard descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdKind {
    /// A regular file of known length.
    RegularFile { len: u64 },
    /// A FIFO / pipe.
    Pipe,
    /// Terminals, sockets, character devices, anything else.
    Other,
}

/// Classify a descriptor with `fstat`.
#[cfg(unix)]
pub fn classify(fd: Fd) -> io::Result<FdKind> {
    let mut st = std::mem::MaybeUninit::<libc::stat>::uninit();
    if unsafe { libc::fstat(fd, st.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let st = unsafe { st.assume_init() };
    Ok(match st.st_mode & libc::S_IFMT {
        libc::S_IFREG => FdKind::RegularFile {
            len: st.st_size as u64,
        },
        libc::S_IFIFO => FdKind::Pipe,
        _ => FdKind::Other,
    })
}

// =============================================================================
// Transport choice
// =============================================================================

/// The four data-movement strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Memory-mapped input, gift-splice output.
    MmapInSpliceOut,
    /// Memory-mapped input, async buffered output.
    MmapInBufferedOut,
    /// Async buffered input, gift-splice output.
    ReadInSpliceOut,
    /// Async buffered input, async buffered output.
    ReadInBufferedOut,
}

/// Whether the zero-copy pipe output path exists on this target.
#[cfg(target_os = "linux")]
pub const SPLICE_AVAILABLE: bool = true;
/// Whether the zero-copy pipe output path exists on this target.
#[cfg(not(target_os = "linux"))]
pub const SPLICE_AVAILABLE: bool = false;

/// Pick the preferred transport for a descriptor pair.
///
/// A regular file qualifies for the mapped input path only when its length
/// fits the address space. Zero-length input is handled by the dispatcher
/// before this table is consulted.
pub fn choose(stdin_kind: FdKind, stdout_kind: FdKind) -> TransportMode {
    let mappable = matches!(
        stdin_kind,
        FdKind::RegularFile { len } if usize::try_from(len).is_ok()
    );
    let spliceable = SPLICE_AVAILABLE && stdout_kind == FdKind::Pipe;

    match (mappable, spliceable) {
        (true, true) => TransportMode::MmapInSpliceOut,
        (true, false) => TransportMode::MmapInBufferedOut,
        (false, true) => TransportMode::ReadInSpliceOut,
        (false, false) => TransportMode::ReadInBufferedOut,
    }
}

// =============================================================================
// Tests
// =============================================================================
