//! Reading field values off entities.

use viewforge_types::{Entity, SourceValue};

/// Reads named fields from entities and materializes deferred references.
///
/// The default [`LazyAwareAccessor`] forces a [`SourceValue::Lazy`] once and
/// reuses the loaded target afterwards; custom accessors can intercept reads
/// for instrumentation or to redirect fields.
pub trait EntityAccessor: Send + Sync {
    fn read(&self, entity: &dyn Entity, field: &str) -> SourceValue {
        self.materialize(entity.field(field))
    }

    /// Replaces a lazy reference with its loaded target, or null when the
    /// target is missing or fails to load.
    fn materialize(&self, value: SourceValue) -> SourceValue;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LazyAwareAccessor;

impl EntityAccessor for LazyAwareAccessor {
    fn materialize(&self, value: SourceValue) -> SourceValue {
        match value {
            SourceValue::Lazy(reference) => reference.materialize().map(SourceValue::Entity).unwrap_or_default(),
            other => other,
        }
    }
}
