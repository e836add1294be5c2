//! Error types for SocialGrow storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type (e.g., "affiliate", "subscription").
        entity: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// A unique constraint rejected the write.
    #[error("{entity} already exists ({field})")]
    Conflict {
        /// Entity type.
        entity: &'static str,
        /// Column whose uniqueness was violated, when known.
        field: String,
    },

    /// The backend could not be reached or answered with a server error.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this is a unique-constraint conflict on `field`.
    #[must_use]
    pub fn is_conflict_on(&self, field: &str) -> bool {
        matches!(self, Self::Conflict { field: f, .. } if f == field)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
