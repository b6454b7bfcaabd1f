//! Configuration errors raised while describing views or checking enrichment bindings.

use thiserror::Error;

/// Metadata that cannot be turned into a working projection.
///
/// These errors indicate a bug in the caller's view configuration. They are
/// surfaced immediately and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Unknown view type: {view_type}")]
    UnknownViewType { view_type: String },

    #[error("View type registered twice: {view_type}")]
    DuplicateView { view_type: String },

    #[error("View '{view_type}' declares a field with an empty name")]
    EmptyFieldName { view_type: String },

    #[error("View '{view_type}' declares field '{field}' more than once")]
    DuplicateField { view_type: String, field: String },

    #[error("Field '{view_type}.{field}' declares both include and exclude projections")]
    ConflictingProjection { view_type: String, field: String },

    #[error("Field '{view_type}.{field}' declares a projection but holds no nested view")]
    ProjectionWithoutNestedView { view_type: String, field: String },

    #[error("Field '{view_type}.{field}' projects '{projected}', which view '{nested_view}' does not declare")]
    UnknownProjectedField {
        view_type: String,
        field: String,
        nested_view: String,
        projected: String,
    },

    #[error("Field '{view_type}.{field}' references unregistered view '{nested_view}'")]
    UnknownNestedView {
        view_type: String,
        field: String,
        nested_view: String,
    },

    #[error("Field '{view_type}.{field}' holds views and cannot receive data from enrichment function '{function}'")]
    EnrichmentOnViewField {
        view_type: String,
        field: String,
        function: String,
    },

    #[error("Field '{view_type}.{field}' declares an enrichment with an empty function name")]
    EmptyFunctionName { view_type: String, field: String },

    #[error("Polymorphic view '{view_type}' maps '{entity_type}' to unregistered view '{target}'")]
    UnknownPolymorphicTarget {
        view_type: String,
        entity_type: String,
        target: String,
    },

    #[error("Field '{view_type}.{field}' is bound to unknown enrichment function '{function}'")]
    UnknownFunction {
        view_type: String,
        field: String,
        function: String,
    },

    #[error("Field '{view_type}.{field}' of kind {field_kind} cannot hold {result_kind} results of enrichment function '{function}'")]
    IncompatibleEnrichmentTarget {
        view_type: String,
        field: String,
        function: String,
        field_kind: String,
        result_kind: String,
    },

    #[error("Enrichment function registered twice: {function}")]
    DuplicateFunction { function: String },

    #[error("Enrichment function '{function}' matches results by the '{key}' property but returns {result_kind} results")]
    ResultKeyOnNonObject {
        function: String,
        key: String,
        result_kind: String,
    },
}

impl ConfigurationError {
    pub fn unknown_view_type(view_type: impl Into<String>) -> Self {
        Self::UnknownViewType { view_type: view_type.into() }
    }

    pub fn duplicate_function(function: impl Into<String>) -> Self {
        Self::DuplicateFunction { function: function.into() }
    }
}
