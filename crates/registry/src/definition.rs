//! Builder-side configuration of a view type.

use viewforge_types::{EntityType, ViewTypeId};

use crate::FieldBinding;

/// Runtime entity type to concrete view type table for a polymorphic view.
///
/// Mappings keep their declaration order, which is also the tie-break order
/// when two mapped types are equally close to an entity's runtime type.
#[derive(Clone, Debug, Default)]
pub struct PolymorphicTable {
    pub mappings: Vec<(&'static EntityType, ViewTypeId)>,
    /// View used when no mapping matches.
    pub fallback: Option<ViewTypeId>,
}

impl PolymorphicTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, entity_type: &'static EntityType, view_type: impl Into<ViewTypeId>) -> Self {
        self.mappings.push((entity_type, view_type.into()));
        self
    }

    pub fn fallback(mut self, view_type: impl Into<ViewTypeId>) -> Self {
        self.fallback = Some(view_type.into());
        self
    }
}

/// Declared fields of a view type, in the order they are applied.
///
/// ```rust
/// use viewforge_registry::{FieldBinding, ViewDefinition};
///
/// let user_view = ViewDefinition::new("UserView")
///     .field(FieldBinding::value("id"))
///     .field(FieldBinding::value("displayName").source("name"))
///     .field(FieldBinding::value("email").roles(["admin"]));
/// assert_eq!(user_view.fields.len(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct ViewDefinition {
    pub view_type: ViewTypeId,
    pub fields: Vec<FieldBinding>,
    pub polymorphic: Option<PolymorphicTable>,
}

impl ViewDefinition {
    pub fn new(view_type: impl Into<ViewTypeId>) -> Self {
        Self {
            view_type: view_type.into(),
            fields: Vec::new(),
            polymorphic: None,
        }
    }

    pub fn field(mut self, binding: FieldBinding) -> Self {
        self.fields.push(binding);
        self
    }

    pub fn fields(mut self, bindings: impl IntoIterator<Item = FieldBinding>) -> Self {
        self.fields.extend(bindings);
        self
    }

    pub fn polymorphic(mut self, table: PolymorphicTable) -> Self {
        self.polymorphic = Some(table);
        self
    }

    pub fn declares(&self, field: &str) -> bool {
        self.fields.iter().any(|binding| binding.name == field)
    }
}
