//! Error types for the model-state core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in model-state operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Document store error.
    #[error("storage error: {0}")]
    Storage(#[from] modelstate_storage::StorageError),

    /// A dump could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A named version or document is absent.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// A document carries an unexpected `SchemaType`, `SchemaVersion_*`,
    /// `Type` or array layout.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A version name is empty or not a dot-separated integer path.
    #[error("invalid version name: {name:?}")]
    InvalidVersionName {
        /// The rejected name.
        name: String,
    },

    /// The root descriptor references an entity document that does not exist.
    #[error("inconsistent reference: {message}")]
    InconsistentReference {
        /// Description of the dangling reference.
        message: String,
    },

    /// The UID generator ran out of identifiers.
    #[error("uid space exhausted for session {session}")]
    UidExhausted {
        /// Session whose counter overflowed.
        session: u32,
    },

    /// Schema upgrade failed.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Creates an invalid version name error.
    pub fn invalid_version_name(name: impl Into<String>) -> Self {
        Self::InvalidVersionName { name: name.into() }
    }

    /// Creates an inconsistent reference error.
    pub fn inconsistent_reference(message: impl Into<String>) -> Self {
        Self::InconsistentReference {
            message: message.into(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }

    /// Returns whether the error means "absent" rather than "broken".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            CoreError::not_found("version \"7\"").to_string(),
            "not found: version \"7\""
        );
        assert_eq!(
            CoreError::invalid_version_name("1.x").to_string(),
            "invalid version name: \"1.x\""
        );
        assert!(CoreError::schema_mismatch("Type")
            .to_string()
            .starts_with("schema mismatch"));
    }

    #[test]
    fn storage_errors_convert() {
        let err: CoreError = modelstate_storage::StorageError::Closed.into();
        assert!(matches!(err, CoreError::Storage(_)));
        assert!(!err.is_not_found());
        assert!(CoreError::not_found("x").is_not_found());
    }
}
