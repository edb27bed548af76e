//! Error types for LiveData core.

use livedata_protocol::{codes, WireError};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in LiveData core operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A publication with this name is already registered.
    #[error("duplicate publication: {name}")]
    DuplicatePublication {
        /// Publication name.
        name: String,
    },

    /// No publication is registered under this name.
    #[error("unknown publication: {name}")]
    UnknownPublication {
        /// Publication name.
        name: String,
    },

    /// No collection is registered under this name.
    #[error("no such collection: {name}")]
    UnknownCollection {
        /// Collection name.
        name: String,
    },

    /// The collection has no method with this name.
    #[error("no method {method} on collection {collection}")]
    UnknownMethod {
        /// Collection name.
        collection: String,
        /// Method name.
        method: String,
    },

    /// A collection with this name is already registered.
    #[error("duplicate collection: {name}")]
    DuplicateCollection {
        /// Collection name.
        name: String,
    },

    /// Collections must be named.
    #[error("anonymous collections are not allowed")]
    AnonymousCollection,

    /// A document has no usable identifier.
    #[error("malformed cache key in {collection}: {reason}")]
    MalformedCacheKey {
        /// Collection the document came from.
        collection: String,
        /// What was wrong with the identifier.
        reason: String,
    },

    /// A document with this id already exists.
    #[error("duplicate document {id} in {collection}")]
    DuplicateDocument {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },

    /// The selector could not be compiled.
    #[error("invalid selector: {message}")]
    InvalidSelector {
        /// Description of the problem.
        message: String,
    },

    /// The update modifier could not be applied.
    #[error("invalid modifier: {message}")]
    InvalidModifier {
        /// Description of the problem.
        message: String,
    },

    /// A mutation validator refused the request.
    #[error("rejected: {reason}")]
    Rejected {
        /// Reason given by the validator.
        reason: String,
    },

    /// The data source failed.
    #[error("data source error: {message}")]
    DataSource {
        /// Description of the failure.
        message: String,
    },

    /// A request could not be understood.
    #[error("malformed request: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a malformed cache key error.
    pub fn malformed_cache_key(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCacheKey {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid selector error.
    pub fn invalid_selector(message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            message: message.into(),
        }
    }

    /// Creates an invalid modifier error.
    pub fn invalid_modifier(message: impl Into<String>) -> Self {
        Self::InvalidModifier {
            message: message.into(),
        }
    }

    /// Creates a rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates a data source error.
    pub fn data_source(message: impl Into<String>) -> Self {
        Self::DataSource {
            message: message.into(),
        }
    }

    /// Creates a malformed request error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Returns the wire error code for this error.
    pub fn code(&self) -> u16 {
        match self {
            Self::UnknownPublication { .. }
            | Self::UnknownCollection { .. }
            | Self::UnknownMethod { .. } => codes::NOT_FOUND,
            Self::Rejected { .. } => codes::REJECTED,
            Self::DuplicateDocument { .. } | Self::DuplicateCollection { .. } => codes::CONFLICT,
            Self::DataSource { .. } => codes::INTERNAL,
            Self::DuplicatePublication { .. }
            | Self::AnonymousCollection
            | Self::MalformedCacheKey { .. }
            | Self::InvalidSelector { .. }
            | Self::InvalidModifier { .. }
            | Self::Malformed { .. } => codes::MALFORMED,
        }
    }

    /// Returns true if the request reached the data source and may have
    /// had effects.
    pub fn reached_data_source(&self) -> bool {
        matches!(self, Self::DataSource { .. })
    }
}

impl From<&CoreError> for WireError {
    fn from(err: &CoreError) -> Self {
        WireError::new(err.code(), err.to_string())
    }
}
