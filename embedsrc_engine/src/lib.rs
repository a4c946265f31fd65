//! Transport engines: how bytes get from stdin to stdout.
//!
//! At startup the dispatcher inspects both standard descriptors and picks
//! one of four data-movement strategies:
//!
//! | input          | output        | engine                          |
//! |----------------|---------------|---------------------------------|
//! | regular file   | pipe          | memory-mapped in, gift-splice out |
//! | regular file   | anything else | memory-mapped in, buffered out  |
//! | anything else  | pipe          | buffered in, gift-splice out    |
//! | anything else  | anything else | buffered in, buffered out       |
//!
//! Setup failures degrade along fixed chains (mmap → buffered input,
//! splice → buffered output) so the tool works on any descriptor pair; all
//! four engines produce byte-identical output.

pub mod buffered;
pub mod error;
pub mod input;
pub mod run;
pub mod select;

#[cfg(target_os = "linux")]
pub mod splice;

pub use error::EngineError;
pub use run::execute;
pub use select::{FdKind, TransportMode};
