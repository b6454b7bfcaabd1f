//! Consistency checks applied when a descriptor is first built.

use std::collections::HashSet;

use indexmap::IndexMap;
use viewforge_types::ViewTypeId;

use crate::{ConfigurationError, FieldBinding, ViewDefinition};

/// Validate a definition against the other registered definitions.
pub(crate) fn validate_definition(
    definition: &ViewDefinition,
    definitions: &IndexMap<ViewTypeId, ViewDefinition>,
) -> Result<(), ConfigurationError> {
    let view_type = definition.view_type.as_str();
    let mut seen = HashSet::new();

    for binding in &definition.fields {
        if binding.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyFieldName {
                view_type: view_type.to_string(),
            });
        }
        if !seen.insert(binding.name.as_str()) {
            return Err(ConfigurationError::DuplicateField {
                view_type: view_type.to_string(),
                field: binding.name.clone(),
            });
        }
        validate_nested(view_type, binding, definitions)?;
        validate_enrichment(view_type, binding)?;
    }

    if let Some(table) = &definition.polymorphic {
        let targets = table
            .mappings
            .iter()
            .map(|(entity_type, target)| (entity_type.name(), target))
            .chain(table.fallback.iter().map(|target| ("<fallback>", target)));
        for (entity_type, target) in targets {
            if !definitions.contains_key(target) {
                return Err(ConfigurationError::UnknownPolymorphicTarget {
                    view_type: view_type.to_string(),
                    entity_type: entity_type.to_string(),
                    target: target.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn validate_nested(
    view_type: &str,
    binding: &FieldBinding,
    definitions: &IndexMap<ViewTypeId, ViewDefinition>,
) -> Result<(), ConfigurationError> {
    let has_projection = !binding.include.is_empty() || !binding.exclude.is_empty();
    if !binding.include.is_empty() && !binding.exclude.is_empty() {
        return Err(ConfigurationError::ConflictingProjection {
            view_type: view_type.to_string(),
            field: binding.name.clone(),
        });
    }

    let Some(nested_view) = binding.kind.nested_view() else {
        if has_projection {
            return Err(ConfigurationError::ProjectionWithoutNestedView {
                view_type: view_type.to_string(),
                field: binding.name.clone(),
            });
        }
        return Ok(());
    };

    let Some(nested) = definitions.get(nested_view) else {
        return Err(ConfigurationError::UnknownNestedView {
            view_type: view_type.to_string(),
            field: binding.name.clone(),
            nested_view: nested_view.to_string(),
        });
    };

    // Projected names are checked against the declared view only; concrete
    // polymorphic subtypes may add fields of their own.
    if nested.polymorphic.is_none() {
        for projected in binding.include.iter().chain(&binding.exclude) {
            if !nested.declares(projected) {
                return Err(ConfigurationError::UnknownProjectedField {
                    view_type: view_type.to_string(),
                    field: binding.name.clone(),
                    nested_view: nested_view.to_string(),
                    projected: projected.clone(),
                });
            }
        }
    }

    Ok(())
}

fn validate_enrichment(view_type: &str, binding: &FieldBinding) -> Result<(), ConfigurationError> {
    let Some(enrichment) = &binding.enrichment else {
        return Ok(());
    };
    if enrichment.function.trim().is_empty() {
        return Err(ConfigurationError::EmptyFunctionName {
            view_type: view_type.to_string(),
            field: binding.name.clone(),
        });
    }
    if binding.kind.holds_views() {
        return Err(ConfigurationError::EnrichmentOnViewField {
            view_type: view_type.to_string(),
            field: binding.name.clone(),
            function: enrichment.function.clone(),
        });
    }
    Ok(())
}
