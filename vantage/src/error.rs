//! Errors returned by SDK pipeline operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during pipeline operations such as `export()`,
/// `force_flush()` and `shutdown()`.
#[derive(Error, Debug, PartialEq)]
pub enum SdkError {
    /// Shutdown has already been invoked.
    ///
    /// Shutdown is idempotent, but this error indicates that another part of
    /// the application invoked it earlier than intended.
    #[error("Shutdown already invoked")]
    AlreadyShutdown,

    /// Operation timed out before completing. The operation may still have
    /// completed on the other side of the deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Operation failed due to an internal error.
    ///
    /// The message is intended for logging only and should not be used to
    /// make programmatic decisions.
    #[error("Operation failed: {0}")]
    InternalFailure(String),
}

/// A specialized `Result` for pipeline operations.
pub type SdkResult = Result<(), SdkError>;
