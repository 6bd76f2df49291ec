//! Crate-wide error types.

use thiserror::Error;

/// Convenience alias for fallible scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised synchronously by clock-advancement operations.
///
/// These signal programmer error in the calling test or simulation code and
/// are never retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The requested advance would move the virtual clock backward, or (for
    /// `sleep`) fail to move it strictly forward.
    #[error("{op}: target time is not ahead of the virtual clock")]
    OutOfRange {
        /// The operation that rejected the request.
        op: &'static str,
    },
}
