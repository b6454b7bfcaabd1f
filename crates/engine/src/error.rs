//! Error types surfaced by view resolution and enrichment.

use std::error::Error as StdError;

use thiserror::Error;
use viewforge_registry::ConfigurationError;

/// Failure of a resolution or fill call.
///
/// Missing data, hidden fields and failed enrichment groups are not errors;
/// they leave the affected fields absent.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("No view mapping for entity type '{entity_type}' under polymorphic view '{view_type}'")]
    UnresolvedPolymorphicType { view_type: String, entity_type: String },

    #[error("Adapter for '{view_type}.{field}' failed: {source}")]
    Transform {
        view_type: String,
        field: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

impl ViewError {
    pub fn transform(view_type: impl Into<String>, field: impl Into<String>, source: anyhow::Error) -> Self {
        ViewError::Transform {
            view_type: view_type.into(),
            field: field.into(),
            source: source.into(),
        }
    }

    pub fn runtime(message: impl ToString) -> Self {
        ViewError::Runtime {
            message: message.to_string(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ViewError::Configuration(_))
    }
}
