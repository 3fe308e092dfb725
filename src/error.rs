// src/error.rs

//! Crate-wide error type
//!
//! One flat enum covering every failure the installation manager can
//! surface. Callers match on the kind; message strings carry the operation
//! context ("While pulling app/... from remote ...") and are not stable API.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Installation manager errors
#[derive(Error, Debug)]
pub enum Error {
    /// A ref, checksum, commit, object or metadata entry does not exist
    #[error("{0}")]
    NotFound(String),

    /// A ref has no deployment (and one was required)
    #[error("{0} not installed")]
    NotDeployed(String),

    /// The requested checksum is already checked out for this ref
    #[error("{ref_name} version {checksum} already deployed")]
    AlreadyDeployed { ref_name: String, checksum: String },

    /// The requested checksum has no checkout to remove
    #[error("{ref_name} version {checksum} already undeployed")]
    AlreadyUndeployed { ref_name: String, checksum: String },

    /// Malformed input: refs, key-value files, object wire data
    #[error("{0}")]
    ParseError(String),

    /// Export policy violated (e.g. D-BUS service name mismatch)
    #[error("{0}")]
    PolicyViolation(String),

    /// Underlying filesystem or network failure, with context
    #[error("{0}")]
    IoError(String),

    /// Underlying filesystem failure without extra context
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// URI scheme or platform feature we do not handle
    #[error("{0}")]
    Unsupported(String),

    /// Operation cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Prefix the error message with operation context, keeping the kind.
    ///
    /// Mirrors the convention of wrapping low-level failures in
    /// "While <doing something>: <cause>" without collapsing every error
    /// into an opaque string.
    pub fn with_context(self, context: &str) -> Error {
        match self {
            Error::NotFound(msg) => Error::NotFound(format!("{context}: {msg}")),
            Error::ParseError(msg) => Error::ParseError(format!("{context}: {msg}")),
            Error::IoError(msg) => Error::IoError(format!("{context}: {msg}")),
            Error::Io(e) => Error::IoError(format!("{context}: {e}")),
            other => other,
        }
    }

    /// True for the not-found kind (missing refs, objects, files)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
