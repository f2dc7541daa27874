//! Storage-specific error types.
//!
//! Defines [`StorageError`], a domain-specific error enum covering the
//! failure kinds the simulator core may produce. Each variant maps to a
//! concrete HTTP-style status code through [`StorageError::status_code`],
//! which is what the (out of scope) dispatch layer uses to build the JSON
//! error envelope.
//!
//! # Usage
//!
//! ```
//! use gcstack_storage_model::error::StorageError;
//!
//! let err = StorageError::NotFound {
//!     message: "generation 7 not found".to_owned(),
//! };
//! assert_eq!(err.status_code(), 404);
//! ```

/// Storage service error type.
///
/// Every failure raised by the simulator core is one of these kinds. A failed
/// operation leaves all state as it was before the call; errors propagate
/// unmodified to the dispatch layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A malformed header, body, ACL policy, or missing required field.
    #[error("{message}")]
    BadRequest {
        /// Description of the malformed input.
        message: String,
    },

    /// A generation/metageneration condition, rewrite-argument set, or ACL
    /// etag condition did not hold.
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// Description of the failed condition.
        message: String,
    },

    /// A missing generation, ACL entity, object, or rewrite source.
    #[error("{message}")]
    NotFound {
        /// Description of what was not found.
        message: String,
    },

    /// An unknown or already-consumed rewrite continuation token.
    #[error("invalid or expired rewrite token: {token}")]
    Gone {
        /// The token that did not resolve to a live operation.
        token: String,
    },

    /// A metadata patch named a key outside the writable set.
    #[error("invalid metadata change, {key} is not writable")]
    NotWritable {
        /// The offending patch key.
        key: String,
    },

    /// The stored payload checksum disagrees with the payload. This is an
    /// integrity fault, not a client input error; it is still reported
    /// synchronously to the caller rather than silently repaired.
    #[error("mismatched MD5 hash expected={expected}, actual={actual}")]
    ChecksumMismatch {
        /// The checksum recomputed from the payload.
        expected: String,
        /// The checksum found in the stored metadata.
        actual: String,
    },
}

impl StorageError {
    /// The HTTP-style status code for this error kind.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Gone { .. } => 410,
            Self::PreconditionFailed { .. } => 412,
            Self::ChecksumMismatch { .. } => 500,
            Self::NotWritable { .. } => 503,
        }
    }

    /// Shorthand constructor for [`StorageError::BadRequest`].
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Shorthand constructor for [`StorageError::PreconditionFailed`].
    #[must_use]
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }

    /// Shorthand constructor for [`StorageError::NotFound`].
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
