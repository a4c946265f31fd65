//! Engine failure reporting.

use std::fmt;
use std::io;

/// Everything that can stop a transport engine.
///
/// All variants are fatal: the caller reports the message and exits, it
/// never retries.
#[derive(Debug)]
pub enum EngineError {
    /// The input produced zero bytes but the output language needs data.
    NoData,
    /// A syscall or stream operation failed. `op` names the failing site.
    Io {
        op: &'static str,
        source: io::Error,
    },
}

impl EngineError {
    /// Attach an operation label to a raw I/O error.
    #[inline]
    pub fn io(op: &'static str, source: io::Error) -> EngineError {
        EngineError::Io { op, source }
    }

    /// Whether this is the absent-input condition.
    #[inline]
    pub fn is_no_data(&self) -> bool {
        matches!(self, EngineError::NoData)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NoData => {
                write!(f, "no data received, language requires data")
            }
            EngineError::Io { op, source } => {
                write!(f, "{} failed: {}", op, source)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::NoData => None,
            EngineError::Io { source, .. } => Some(source),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_message_is_exact() {
        // The CLI prints this verbatim behind its `ERROR: ` prefix.
        assert_eq!(
            EngineError::NoData.to_string(),
            "no data received, language requires data"
        );
    }

    #[test]
    fn test_io_message_names_the_site() {
        let err = EngineError::io(
            "vmsplice to stdout",
            io::Error::from_raw_os_error(libc::EPIPE),
        );
        let text = err.to_string();
        assert!(text.starts_with("vmsplice to stdout failed: "));
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err = EngineError::io("stat stdin", io::Error::from_raw_os_error(libc::EBADF));
        assert!(err.source().is_some());
        assert!(EngineError::NoData.source().is_none());
    }
}
