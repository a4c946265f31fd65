//! Asynchronous double-buffered standard streams.
//!
//! Each stream owns a contiguous buffer split into two halves and one
//! dedicated background thread. At any instant exactly one half belongs to
//! the user side (being drained or filled) while the other belongs to the
//! I/O thread (being refilled or flushed); the halves trade owners when the
//! user side exhausts its half.
//!
//! # Synchronisation
//!
//! There are no locks. Ownership of a half is handed over through two
//! atomics per stream: the half selector and `io_pending`. The side that
//! finishes touching buffer memory publishes with a release store; the side
//! about to touch it observes with an acquire load. Waits are spin loops
//! with a periodic `yield_now`, on the assumption that at steady-state
//! throughput the other side is at most one buffer behind.
//!
//! # Lifecycle
//!
//! Streams are explicit-lifetime objects: `initialize` → use → `dispose`.
//! Dropping a stream without disposing it abandons the background thread;
//! the fatal-error path does exactly that on purpose (the process is about
//! to exit and the shared state may be mid-handoff).

mod half;
pub mod stdin;
pub mod stdout;

pub use half::Half;
pub use stdin::StdinStream;
pub use stdout::StdoutStream;

/// Default half-buffer size in bytes.
pub const DEFAULT_HALF_LEN: usize = 64 * 1024;
