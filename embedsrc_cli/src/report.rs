//! Error reporting and exit codes.
//!
//! Every user-visible failure goes to stderr as `ERROR: <message>`.
//! Configuration mistakes (bad flags, unknown language) exit successfully;
//! only absent input and runtime I/O failures exit with a failure code, and
//! on those paths the process leaves without disposing the streams — their
//! background threads are abandoned to the OS rather than joined against
//! possibly wedged shared state.

use std::fmt::Display;

/// Normal completion, `--help`, and every argv error.
pub const EXIT_SUCCESS: u8 = 0;
/// Absent-but-required input and any runtime I/O failure.
pub const EXIT_FAILURE: u8 = 1;

/// Report a configuration error. These exit *successfully*.
pub fn usage_error(error: &dyn Display) -> u8 {
    eprintln!("ERROR: {}", error);
    EXIT_SUCCESS
}

/// Report a fatal runtime error.
pub fn runtime_error(error: &dyn Display) -> u8 {
    eprintln!("ERROR: {}", error);
    EXIT_FAILURE
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_constants() {
        assert_eq!(EXIT_SUCCESS, 0);
        assert_eq!(EXIT_FAILURE, 1);
    }

    #[test]
    fn test_usage_errors_exit_successfully() {
        assert_eq!(usage_error(&"anything"), EXIT_SUCCESS);
    }

    #[test]
    fn test_runtime_errors_exit_with_failure() {
        assert_eq!(runtime_error(&"anything"), EXIT_FAILURE);
    }
}
