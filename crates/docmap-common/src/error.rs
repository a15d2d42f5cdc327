//! Error types for docmap

use thiserror::Error;

/// Result type alias for docmap operations
pub type Result<T> = std::result::Result<T, DocmapError>;

/// Server error codes that mean an index or namespace with the requested
/// name already exists in a different shape.
///
/// 48 = NamespaceExists, 85 = IndexOptionsConflict, 86 = IndexKeySpecsConflict
pub const NAMESPACE_EXISTS_CODES: [i32; 3] = [48, 85, 86];

/// Unified error type for all docmap operations
#[derive(Error, Debug, Clone)]
pub enum DocmapError {
    /// Malformed, empty or unparsable connection string
    #[error("Invalid URI: {0}")]
    Uri(String),

    /// Model could not be registered (invalid name, rejected schema)
    #[error("Registration error: {0}")]
    Registration(String),

    /// Failure during clear, index sync or drop
    #[error("Maintenance error: {0}")]
    Maintenance(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The server reported that a namespace or index already exists
    #[error("Namespace exists: {0}")]
    NamespaceExists(String),

    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl DocmapError {
    /// Returns true if the index sync fallback (drop then recreate) applies
    pub fn is_namespace_exists(&self) -> bool {
        matches!(self, DocmapError::NamespaceExists(_))
    }

    /// Returns true if this error came out of a maintenance operation
    pub fn is_maintenance(&self) -> bool {
        matches!(self, DocmapError::Maintenance(_))
    }

    /// Wrap any error into a maintenance failure for `operation` on `target`
    ///
    /// Errors that are already maintenance failures are returned unchanged.
    pub fn maintenance(operation: &str, target: &str, err: DocmapError) -> Self {
        match err {
            DocmapError::Maintenance(_) => err,
            other => DocmapError::Maintenance(format!("{} '{}' failed: {}", operation, target, other)),
        }
    }
}

impl From<serde_json::Error> for DocmapError {
    fn from(err: serde_json::Error) -> Self {
        DocmapError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for DocmapError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::Command(cmd)
                if NAMESPACE_EXISTS_CODES.contains(&cmd.code) || cmd.code_name == "NamespaceExists" =>
            {
                DocmapError::NamespaceExists(cmd.message.clone())
            }
            ErrorKind::InvalidArgument { message, .. } => DocmapError::Uri(message.clone()),
            ErrorKind::ServerSelection { message, .. } => DocmapError::Connection(message.clone()),
            _ => DocmapError::MongoDB(err.to_string()),
        }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for DocmapError {
    fn from(err: bson::ser::Error) -> Self {
        DocmapError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for DocmapError {
    fn from(err: bson::de::Error) -> Self {
        DocmapError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}
