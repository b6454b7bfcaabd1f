//! Field descriptor registry.
//!
//! Definitions are registered once at startup. The first call to
//! [`ViewRegistry::describe`] for a view type validates its definition and
//! freezes it into an immutable [`ViewDescriptor`]; every later call returns
//! the same cached `Arc`.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use indexmap::{IndexMap, map::Entry};
use tracing::debug;
use viewforge_types::ViewTypeId;

use crate::{ConfigurationError, FieldBinding, PolymorphicTable, ViewDefinition, validate::validate_definition};

/// Immutable, validated metadata for one view type.
#[derive(Debug)]
pub struct ViewDescriptor {
    view_type: ViewTypeId,
    bindings: Vec<Arc<FieldBinding>>,
    polymorphic: Option<PolymorphicTable>,
}

impl ViewDescriptor {
    pub fn view_type(&self) -> &ViewTypeId {
        &self.view_type
    }

    /// Bindings in declaration order.
    pub fn bindings(&self) -> &[Arc<FieldBinding>] {
        &self.bindings
    }

    pub fn binding(&self, field: &str) -> Option<&Arc<FieldBinding>> {
        self.bindings.iter().find(|binding| binding.name == field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|binding| binding.name.as_str())
    }

    pub fn polymorphic(&self) -> Option<&PolymorphicTable> {
        self.polymorphic.as_ref()
    }
}

/// Collects view definitions before the registry is frozen.
#[derive(Debug, Default)]
pub struct ViewRegistryBuilder {
    definitions: IndexMap<ViewTypeId, ViewDefinition>,
    duplicates: Vec<ViewTypeId>,
}

impl ViewRegistryBuilder {
    pub fn register(mut self, definition: ViewDefinition) -> Self {
        match self.definitions.entry(definition.view_type.clone()) {
            Entry::Occupied(_) => self.duplicates.push(definition.view_type),
            Entry::Vacant(slot) => {
                slot.insert(definition);
            }
        }
        self
    }

    pub fn build(self) -> Result<ViewRegistry, ConfigurationError> {
        if let Some(view_type) = self.duplicates.into_iter().next() {
            return Err(ConfigurationError::DuplicateView {
                view_type: view_type.to_string(),
            });
        }
        Ok(ViewRegistry {
            definitions: self.definitions,
            descriptors: RwLock::new(HashMap::new()),
        })
    }
}

/// Registry of view definitions with a lazily populated descriptor cache.
///
/// The registry is meant to be shared (`Arc<ViewRegistry>`) across every
/// resolution for the lifetime of the process. Concurrent first callers may
/// each build a descriptor; only the first one stored is ever handed out.
pub struct ViewRegistry {
    definitions: IndexMap<ViewTypeId, ViewDefinition>,
    descriptors: RwLock<HashMap<ViewTypeId, Arc<ViewDescriptor>>>,
}

impl ViewRegistry {
    pub fn builder() -> ViewRegistryBuilder {
        ViewRegistryBuilder::default()
    }

    pub fn contains(&self, view_type: &str) -> bool {
        self.definitions.contains_key(view_type)
    }

    pub fn definition(&self, view_type: &str) -> Option<&ViewDefinition> {
        self.definitions.get(view_type)
    }

    pub fn view_types(&self) -> impl Iterator<Item = &ViewTypeId> {
        self.definitions.keys()
    }

    /// Returns the cached descriptor for `view_type`, building it on first use.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] when the view type is not registered or
    /// its definition is inconsistent. Failed builds are not cached.
    pub fn describe(&self, view_type: &ViewTypeId) -> Result<Arc<ViewDescriptor>, ConfigurationError> {
        if let Some(descriptor) = self.read_cache().get(view_type) {
            return Ok(Arc::clone(descriptor));
        }

        let built = Arc::new(self.build_descriptor(view_type)?);

        let mut cache = self.descriptors.write().unwrap_or_else(PoisonError::into_inner);
        let descriptor = cache.entry(view_type.clone()).or_insert(built);
        Ok(Arc::clone(descriptor))
    }

    /// Builds and validates every registered view type.
    pub fn describe_all(&self) -> Result<(), ConfigurationError> {
        for view_type in self.definitions.keys() {
            self.describe(view_type)?;
        }
        Ok(())
    }

    fn build_descriptor(&self, view_type: &ViewTypeId) -> Result<ViewDescriptor, ConfigurationError> {
        let definition = self
            .definitions
            .get(view_type)
            .ok_or_else(|| ConfigurationError::unknown_view_type(view_type.as_str()))?;
        validate_definition(definition, &self.definitions)?;

        debug!(
            view_type = %view_type,
            field_count = definition.fields.len(),
            polymorphic = definition.polymorphic.is_some(),
            "view descriptor built"
        );

        Ok(ViewDescriptor {
            view_type: view_type.clone(),
            bindings: definition.fields.iter().cloned().map(Arc::new).collect(),
            polymorphic: definition.polymorphic.clone(),
        })
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ViewTypeId, Arc<ViewDescriptor>>> {
        self.descriptors.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewRegistry")
            .field("view_types", &self.definitions.keys().collect::<Vec<_>>())
            .field("described", &self.read_cache().len())
            .finish()
    }
}
