//! Polymorphic view selection.

use std::sync::Arc;

use tracing::trace;
use viewforge_registry::{PolymorphicTable, ViewDescriptor, ViewRegistry};
use viewforge_types::{EntityType, ViewTypeId};

use crate::ViewError;

/// Chooses the concrete view type for an entity under one polymorphic table.
///
/// The mapping whose entity type is closest to the runtime type in its
/// supertype lineage wins; equally close mappings fall back to declaration
/// order. With no match the table's fallback is used.
pub fn select_view_type(
    view_type: &ViewTypeId,
    table: &PolymorphicTable,
    entity_type: &'static EntityType,
) -> Result<ViewTypeId, ViewError> {
    let lineage = entity_type.lineage();
    let closest = table
        .mappings
        .iter()
        .enumerate()
        .filter_map(|(order, (mapped, target))| {
            lineage
                .iter()
                .find(|(ancestor, _)| ancestor.name() == mapped.name())
                .map(|(_, distance)| (*distance, order, target))
        })
        .min_by_key(|(distance, order, _)| (*distance, *order));

    match closest {
        Some((_, _, target)) => Ok(target.clone()),
        None => table.fallback.clone().ok_or_else(|| ViewError::UnresolvedPolymorphicType {
            view_type: view_type.to_string(),
            entity_type: entity_type.name().to_string(),
        }),
    }
}

/// Resolves `declared` to the descriptor of the concrete view for `entity_type`.
///
/// Non-polymorphic views resolve to themselves. A concrete view that is itself
/// polymorphic is resolved again until a view maps to itself or has no table.
pub fn resolve_concrete(
    registry: &ViewRegistry,
    declared: &ViewTypeId,
    entity_type: &'static EntityType,
) -> Result<Arc<ViewDescriptor>, ViewError> {
    let mut descriptor = registry.describe(declared)?;
    let mut seen = vec![declared.clone()];

    while let Some(table) = descriptor.polymorphic() {
        let selected = select_view_type(descriptor.view_type(), table, entity_type)?;
        if seen.contains(&selected) {
            break;
        }
        trace!(declared = %declared, entity_type = %entity_type, selected = %selected, "polymorphic view selected");
        descriptor = registry.describe(&selected)?;
        seen.push(selected);
    }

    Ok(descriptor)
}
