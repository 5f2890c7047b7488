//! Error types for normcache.
//!
//! All errors are strongly typed using thiserror. A read miss is not an
//! error: it is reported as a [`crate::read::MissDescriptor`].

use thiserror::Error;

use crate::path::ResponsePath;

/// Validation errors for configuration and selection sets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Key field names cannot be empty (type '{type_name}')")]
    EmptyKeyField {
        type_name: String,
    },

    #[error("Invalid root key: {reason}")]
    InvalidRootKey {
        reason: String,
    },

    #[error("Field '{field}' declares an empty sub-selection")]
    EmptySelection {
        field: String,
    },

    #[error("Response key '{key}' is used by two different fields")]
    ConflictingResponseKey {
        key: String,
    },

    #[error("Field name cannot be empty")]
    EmptyFieldName,
}

/// How a response disagreed with its selection set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MismatchKind {
    #[error("selected field is absent from the response")]
    MissingField,

    #[error("field has a sub-selection but the response holds a {found}")]
    ExpectedObject {
        found: &'static str,
    },

    #[error("field is a leaf but the response holds a nested {found}")]
    ExpectedLeaf {
        found: &'static str,
    },

    #[error("response root must be an object, found {found}")]
    RootNotObject {
        found: &'static str,
    },
}

/// A response that is structurally incompatible with its selection set.
///
/// Fatal to the write that raised it; the store is left unmodified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Response shape mismatch at `{path}`: {kind}")]
pub struct ShapeMismatchError {
    pub path: ResponsePath,
    pub kind: MismatchKind,
}

impl ShapeMismatchError {
    #[must_use]
    pub const fn new(path: ResponsePath, kind: MismatchKind) -> Self {
        Self { path, kind }
    }
}

/// Top-level error type for normcache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Write rejected: {0}")]
    ShapeMismatch(#[from] ShapeMismatchError),

    #[error("Invalid snapshot: {message}")]
    Snapshot {
        message: String,
    },

    #[error("Invalid configuration: {message}")]
    Config {
        message: String,
    },

    #[error("Poisoned lock: {context}")]
    LockPoisoned {
        context: &'static str,
    },
}

impl CacheError {
    /// Creates a snapshot decoding error.
    #[must_use]
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a write was rejected for its shape.
    #[must_use]
    pub const fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::ShapeMismatch(_))
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
