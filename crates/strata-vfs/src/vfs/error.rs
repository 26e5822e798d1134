//! VFS error types.

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Malformed descriptor, manifest, version, or source argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Node or resource not found.
    ///
    /// Tree lookups report misses as `None`; this variant is for callers
    /// that require a node to exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation invoked on the wrong node kind, or content requested
    /// through a descriptor that cannot be resolved.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A required external component is unavailable.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create an InvalidInput error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a Runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Returns true for structural input errors.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns true for wrong-kind and unresolvable-descriptor errors.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }
}

impl From<serde_json::Error> for VfsError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidInput(format!("malformed JSON: {e}"))
    }
}

impl From<serde_yaml::Error> for VfsError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::InvalidInput(format!("malformed YAML: {e}"))
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::InvalidInput(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::Runtime(msg) => io::Error::other(msg),
            VfsError::MissingDependency(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::Io(e) => e,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
