//! Shared low-level support for the embedsrc pipeline.
//!
//! This crate holds everything the higher layers agree on but none of them
//! own: the raw file-descriptor I/O shim that papers over the POSIX/Windows
//! split, page-size queries and alignment math, and the `/proc/meminfo`
//! huge-page-size probe used by the zero-copy output path.

pub mod io;
pub mod page;

#[cfg(target_os = "linux")]
pub mod hugepage;

/// Crate version, surfaced in the CLI help footer.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
