//! Crate-wide error and result types.
//!
//! Every fallible operation in the engine returns [`Result<T>`]. The error
//! carries a tag describing the failure class plus a human-readable message;
//! helpers exist to attach a secondary detail string (typically a file name
//! or the offending value).
//!
//! Errors are cheap to clone so that iterators can hold a sticky status and
//! hand out copies from `status()`.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ------------------------------------------------------------------------------------------------
// Error Type
// ------------------------------------------------------------------------------------------------

/// The failure classes surfaced by the storage engine.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested key does not exist, or exists only as a tombstone.
    #[error("not found: {0}")]
    NotFound(String),

    /// On-disk bytes failed structural validation or a checksum.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The operation or codec is not available in this build.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A caller-supplied argument violates the operation's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl Error {
    /// Builds a [`Error::Corruption`] from a message.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Builds a [`Error::Corruption`] with a secondary detail string.
    pub fn corruption_with(msg: &str, detail: impl AsRef<str>) -> Self {
        Error::Corruption(format!("{msg}: {}", detail.as_ref()))
    }

    /// Builds a [`Error::NotFound`] from a message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Builds a [`Error::InvalidArgument`] from a message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Builds a [`Error::NotSupported`] from a message.
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Error::NotSupported(msg.into())
    }

    /// True iff this error is the [`Error::NotFound`] tag.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True iff this error is the [`Error::Corruption`] tag.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
