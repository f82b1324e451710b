//! # Mapping Catalog Error Types
//!
//! Errors raised while building or consulting the mapping binding table and
//! the class model.
//!
//! ## Error Categories
//!
//! - **Lookup Errors**: a class or property has no binding / store
//! - **Model Errors**: unknown classes, broken inheritance, bad types
//! - **Configuration Errors**: file I/O, YAML parsing, malformed binding text
//!
//! ## Usage Patterns
//!
//! Lookup errors always carry the offending class *and* property so that the
//! caller can report exactly which mapping entry is missing:
//!
//! ```ignore
//! MappingError::UnmappedProperty {
//!     class: "model::Person".into(),
//!     property: "firm".into(),
//! }
//! ```

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MappingError {
    #[error("No mapping found for class `{class}`")]
    UnmappedClass { class: String },

    #[error("No binding found for property `{property}` of class `{class}`")]
    UnmappedProperty { class: String, property: String },

    #[error("Unknown class `{class}` (not declared in the class model)")]
    UnknownClass { class: String },

    #[error("Class `{class}` has no property `{property}`")]
    UnknownProperty { class: String, property: String },

    #[error("Invalid binding for `{class}.{property}`: {message}")]
    InvalidBinding {
        class: String,
        property: String,
        message: String,
    },

    #[error("Invalid class model: {message}")]
    InvalidModel { message: String },

    #[error("Failed to read mapping document: {error}")]
    ConfigReadError { error: String },

    #[error("Failed to parse mapping document: {error}")]
    ConfigParseError { error: String },

    #[error("Invalid mapping configuration: {message}")]
    InvalidConfig { message: String },
}

/// Helper methods for creating errors with context information
impl MappingError {
    /// Create an UnmappedProperty error
    pub fn unmapped_property(class: impl Into<String>, property: impl Into<String>) -> Self {
        MappingError::UnmappedProperty {
            class: class.into(),
            property: property.into(),
        }
    }

    /// Create an InvalidBinding error
    pub fn invalid_binding(
        class: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MappingError::InvalidBinding {
            class: class.into(),
            property: property.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidConfig error with context
    ///
    /// # Example
    /// ```ignore
    /// MappingError::config_error_with_context(
    ///     "duplicate class mapping for model::Person",
    ///     "While loading mappings from person.yaml",
    /// )
    /// ```
    pub fn config_error_with_context(
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        MappingError::InvalidConfig {
            message: format!("{}\n  Context: {}", message.into(), context.into()),
        }
    }

    /// Create an InvalidModel error
    pub fn invalid_model(message: impl Into<String>) -> Self {
        MappingError::InvalidModel {
            message: message.into(),
        }
    }
}
