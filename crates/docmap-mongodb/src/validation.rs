//! Name validation for model registration
//!
//! Model names and the collection names derived from them are checked before
//! a model is created, so that a bad name fails registration instead of
//! reaching the server.

use crate::Result;
use docmap_common::DocmapError;
use tracing::warn;

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for model names
const MAX_MODEL_NAME_LENGTH: usize = 255;

/// Validated collection name
///
/// # Guarantees
/// - Not empty
/// - Maximum 120 characters
/// - No null bytes
/// - No "system." prefix (system collections)
/// - No $ characters (special operators)
/// - Warns on suspicious patterns (.., //)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    /// Creates a new validated collection name
    ///
    /// # Errors
    /// Returns `DocmapError::Validation` if:
    /// - Name is empty
    /// - Name exceeds MAX_COLLECTION_NAME_LENGTH
    /// - Name contains null bytes
    /// - Name starts with "system."
    /// - Name contains $ characters
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(DocmapError::Validation(
                "Collection name cannot be empty".to_string()
            ));
        }

        if name.len() > MAX_COLLECTION_NAME_LENGTH {
            return Err(DocmapError::Validation(format!(
                "Collection name exceeds maximum length of {} characters: '{}'",
                MAX_COLLECTION_NAME_LENGTH, name
            )));
        }

        if name.contains('\0') {
            return Err(DocmapError::Validation(
                "Collection name cannot contain null bytes".to_string()
            ));
        }

        // Reserved for system collections
        if name.starts_with("system.") {
            return Err(DocmapError::Validation(format!(
                "Collection name cannot start with 'system.' (reserved): '{}'",
                name
            )));
        }

        if name.contains('$') {
            return Err(DocmapError::Validation(format!(
                "Collection name cannot contain '$' character: '{}'",
                name
            )));
        }

        // Suspicious but allowed
        if name.contains("..") || name.contains("//") {
            warn!(collection = name, "collection name contains suspicious pattern");
        }

        Ok(ValidatedCollectionName {
            name: name.to_string(),
        })
    }

    /// Returns the validated collection name as a string slice
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Consumes the ValidatedCollectionName and returns the inner String
    pub fn into_string(self) -> String {
        self.name
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Check a model name before registration
///
/// Model names are free-form (generated names are UUIDs) but must be
/// non-blank, bounded and free of null bytes.
pub fn validate_model_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DocmapError::Validation("Model name cannot be empty".to_string()));
    }

    if name.len() > MAX_MODEL_NAME_LENGTH {
        return Err(DocmapError::Validation(format!(
            "Model name exceeds maximum length of {} characters",
            MAX_MODEL_NAME_LENGTH
        )));
    }

    if name.contains('\0') {
        return Err(DocmapError::Validation(
            "Model name cannot contain null bytes".to_string()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_collection_names() {
        assert!(ValidatedCollectionName::new("users").is_ok());
        assert!(ValidatedCollectionName::new("user_profiles").is_ok());
        assert!(ValidatedCollectionName::new("app.events").is_ok());
    }

    #[test]
    fn test_collection_name_empty() {
        let result = ValidatedCollectionName::new("");
        assert!(matches!(result, Err(DocmapError::Validation(_))));
    }

    #[test]
    fn test_collection_name_too_long() {
        let long = "a".repeat(MAX_COLLECTION_NAME_LENGTH + 1);
        assert!(ValidatedCollectionName::new(&long).is_err());
        let limit = "a".repeat(MAX_COLLECTION_NAME_LENGTH);
        assert!(ValidatedCollectionName::new(&limit).is_ok());
    }

    #[test]
    fn test_collection_name_reserved_and_special() {
        assert!(ValidatedCollectionName::new("system.users").is_err());
        assert!(ValidatedCollectionName::new("users$data").is_err());
        assert!(ValidatedCollectionName::new("users\0").is_err());
    }

    #[test]
    fn test_collection_name_conversions() {
        let name = ValidatedCollectionName::new("edges").unwrap();
        assert_eq!(name.as_str(), "edges");
        assert_eq!(name.to_string(), "edges");
        assert_eq!(name.into_string(), "edges".to_string());
    }

    #[test]
    fn test_model_names() {
        assert!(validate_model_name("User").is_ok());
        assert!(validate_model_name("3f1c5b2e-8a4d-4c1e-9b7a-2d5e6f7a8b9c").is_ok());
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name("   ").is_err());
        assert!(validate_model_name("Us\0er").is_err());
        assert!(validate_model_name(&"x".repeat(MAX_MODEL_NAME_LENGTH + 1)).is_err());
    }
}
