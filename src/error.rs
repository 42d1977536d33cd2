//! Error taxonomy shared by every engine and by the ZIP locator.
//!
//! The variants mirror the semantic categories of the error design: they are
//! not meant to be exhaustively pattern-matched by callers, just reported.

use thiserror::Error;

/// The single error type returned by library-level operations.
#[derive(Debug, Error)]
pub enum CrackError {
    /// An engine ran to completion without finding a valid password.
    /// Not a failure in the user-facing sense, but distinct from a hard error.
    #[error("password not found")]
    NotFound,

    /// Caller-supplied shapes are inconsistent: bad offsets, empty charset,
    /// password length out of range, and similar.
    #[error("invalid input: {reason}")]
    InputShape { reason: String },

    /// The archive itself doesn't conform to what the locator expects.
    #[error("malformed archive: {reason}")]
    ArchiveFormat { reason: String },

    /// Reading, seeking, or opening the archive failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A buffer allocation that should have been bounded grew unexpectedly.
    #[error("out of memory: {reason}")]
    OutOfMemory { reason: String },

    /// The operation was cancelled by a sibling worker or the caller.
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CrackError>;
