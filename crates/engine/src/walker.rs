//! Traversal from entity graphs to view graphs.
//!
//! The walk keeps its pending work on the heap, so the depth of the source
//! graph is bounded by memory rather than by the thread's stack.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace};
use viewforge_registry::{EnrichmentBinding, FieldBinding, Projection, ViewDescriptor, ViewRegistry};
use viewforge_types::{Entity, FieldKind, SourceValue, ViewHandle, ViewTypeId, ViewValue};

use crate::{
    EntityAccessor, ViewError,
    context::{PendingEnrichment, PendingKeys, ResolutionContext},
    security, type_resolver,
};

/// A view whose fields are still being applied.
struct Frame {
    entity: Arc<dyn Entity>,
    descriptor: Arc<ViewDescriptor>,
    view: ViewHandle,
    /// Binding whose include/exclude list limits this view's fields.
    projected_by: Option<Arc<FieldBinding>>,
    next: usize,
}

impl Frame {
    fn next_binding(&mut self) -> Option<Arc<FieldBinding>> {
        while let Some(binding) = self.descriptor.bindings().get(self.next) {
            self.next += 1;
            let projection = self.projected_by.as_deref().map_or(Projection::All, FieldBinding::projection);
            if projection.admits(&binding.name) {
                return Some(Arc::clone(binding));
            }
        }
        None
    }
}

enum Step {
    Populate(Frame),
    /// Writes a converted value once the views nested in it are populated.
    Assign { view: ViewHandle, binding: Arc<FieldBinding>, value: ViewValue },
}

/// Walks a source graph and builds the matching view graph.
///
/// The walker is stateless; everything scoped to one call lives in the
/// [`ResolutionContext`] passed through each step.
pub struct GraphWalker<'a> {
    registry: &'a ViewRegistry,
    accessor: &'a dyn EntityAccessor,
}

impl<'a> GraphWalker<'a> {
    pub fn new(registry: &'a ViewRegistry, accessor: &'a dyn EntityAccessor) -> Self {
        Self { registry, accessor }
    }

    /// Resolves any source value into a view of `declared`.
    ///
    /// Null, missing and non-entity values resolve to `None`.
    pub fn resolve(
        &self,
        source: SourceValue,
        declared: &ViewTypeId,
        context: &mut ResolutionContext,
    ) -> Result<Option<ViewHandle>, ViewError> {
        match self.accessor.materialize(source) {
            SourceValue::Entity(entity) => self.resolve_entity(&entity, declared, context).map(Some),
            _ => Ok(None),
        }
    }

    /// Resolves one entity into a view of `declared`, or of the concrete
    /// subtype its polymorphic table selects.
    ///
    /// Nested views are populated depth first in declaration order, the same
    /// order a recursive walk would visit them. A nested binding's projection
    /// only affects the first encounter of an entity; revisits return the
    /// memoized instance as is.
    pub fn resolve_entity(
        &self,
        entity: &Arc<dyn Entity>,
        declared: &ViewTypeId,
        context: &mut ResolutionContext,
    ) -> Result<ViewHandle, ViewError> {
        let mut opened = Vec::new();
        let view = self.open(entity, declared, None, context, &mut opened)?;
        let mut stack: Vec<Step> = opened.into_iter().map(Step::Populate).collect();

        while let Some(step) = stack.pop() {
            match step {
                Step::Assign { view, binding, value } => self.assign(&view, &binding, value)?,
                Step::Populate(mut frame) => {
                    while let Some(binding) = frame.next_binding() {
                        let mut opened = Vec::new();
                        let Some(value) = self.apply_binding(&frame, &binding, context, &mut opened)? else {
                            continue;
                        };
                        // Resume this view after the nested ones, then write the field.
                        let view = frame.view.clone();
                        stack.push(Step::Populate(frame));
                        stack.push(Step::Assign { view, binding, value });
                        stack.extend(opened.into_iter().rev().map(Step::Populate));
                        break;
                    }
                }
            }
        }

        Ok(view)
    }

    /// Returns the view for `entity`, creating and remembering it on the first
    /// encounter. New views are queued on `opened` with no fields applied.
    fn open(
        &self,
        entity: &Arc<dyn Entity>,
        declared: &ViewTypeId,
        projected_by: Option<&Arc<FieldBinding>>,
        context: &mut ResolutionContext,
        opened: &mut Vec<Frame>,
    ) -> Result<ViewHandle, ViewError> {
        let descriptor = type_resolver::resolve_concrete(self.registry, declared, entity.entity_type())?;
        let view_type = descriptor.view_type();

        if let Some(view) = context.visited(entity, view_type) {
            trace!(view_type = %view_type, "reusing view for revisited entity");
            return Ok(view);
        }

        let view = ViewHandle::new(view_type.clone());
        context.remember(entity, &view);
        opened.push(Frame {
            entity: Arc::clone(entity),
            descriptor,
            view: view.clone(),
            projected_by: projected_by.cloned(),
            next: 0,
        });
        Ok(view)
    }

    /// Applies one binding to the frame's view.
    ///
    /// Returns the converted value when it holds views opened on `opened`;
    /// the caller assigns it after those are populated.
    fn apply_binding(
        &self,
        frame: &Frame,
        binding: &Arc<FieldBinding>,
        context: &mut ResolutionContext,
        opened: &mut Vec<Frame>,
    ) -> Result<Option<ViewValue>, ViewError> {
        let view = &frame.view;
        let value = self.accessor.read(frame.entity.as_ref(), &binding.source);

        if let Some(keep) = &binding.filter
            && !keep(&value)
        {
            trace!(field = %binding.name, "field dropped by filter");
            return Ok(None);
        }

        if !security::is_visible(binding, context.roles()) {
            debug!(view_type = %view.view_type(), field = %binding.name, "field hidden from caller");
            return Ok(None);
        }

        if let Some(enrichment) = &binding.enrichment {
            self.defer(binding, enrichment, &value, view, context);
            return Ok(None);
        }

        let Some(converted) = self.convert(value, &binding.kind, binding, context, opened)? else {
            debug!(
                view_type = %view.view_type(),
                field = %binding.name,
                kind = %binding.kind,
                "source value does not fit the declared kind; field left absent"
            );
            return Ok(None);
        };

        if !opened.is_empty() {
            return Ok(Some(converted));
        }
        self.assign(view, binding, converted)?;
        Ok(None)
    }

    fn assign(&self, view: &ViewHandle, binding: &FieldBinding, value: ViewValue) -> Result<(), ViewError> {
        let adapted = binding
            .apply_adapter(value)
            .map_err(|error| ViewError::transform(view.view_type().as_str(), &binding.name, error))?;
        view.set(binding.name.clone(), adapted);
        Ok(())
    }

    fn defer(
        &self,
        binding: &Arc<FieldBinding>,
        enrichment: &EnrichmentBinding,
        value: &SourceValue,
        view: &ViewHandle,
        context: &mut ResolutionContext,
    ) {
        let keys = match (enrichment.key.extract(value), &binding.kind) {
            (None | Some(Value::Null), _) => None,
            (Some(Value::Array(keys)), FieldKind::List(_) | FieldKind::Set(_)) => {
                let keys: Vec<Value> = keys.into_iter().filter(|key| !key.is_null()).collect();
                (!keys.is_empty()).then_some(PendingKeys::Many(keys))
            }
            (Some(key), FieldKind::List(_) | FieldKind::Set(_)) => Some(PendingKeys::Many(vec![key])),
            (Some(key), _) => Some(PendingKeys::One(key)),
        };

        let Some(keys) = keys else {
            trace!(field = %binding.name, function = %enrichment.function, "no enrichment key; field left absent");
            return;
        };

        context.record(PendingEnrichment {
            owner: view.clone(),
            binding: Arc::clone(binding),
            function: enrichment.function.clone(),
            keys,
        });
    }


    /// Converts a source value into the declared kind.
    ///
    /// Returns `None` when the value does not fit; collection elements that do
    /// not fit become null in lists and maps and are dropped from sets.
    fn convert(
        &self,
        value: SourceValue,
        kind: &FieldKind,
        binding: &Arc<FieldBinding>,
        context: &mut ResolutionContext,
        opened: &mut Vec<Frame>,
    ) -> Result<Option<ViewValue>, ViewError> {
        let value = self.accessor.materialize(value);
        if value.is_null() {
            return Ok(Some(ViewValue::Null));
        }

        let converted = match (kind, value) {
            (FieldKind::Data(expected), value) => value
                .to_data()
                .filter(|data| expected.admits(data))
                .map(ViewValue::Data),
            (FieldKind::View(nested), SourceValue::Entity(entity)) => {
                Some(ViewValue::View(self.open(&entity, nested, Some(binding), context, opened)?))
            }
            (FieldKind::List(element), SourceValue::List(items) | SourceValue::Set(items)) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.convert(item, element, binding, context, opened)?.unwrap_or(ViewValue::Null));
                }
                Some(ViewValue::List(values))
            }
            (FieldKind::Set(element), SourceValue::List(items) | SourceValue::Set(items)) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(converted) = self.convert(item, element, binding, context, opened)? {
                        values.push(converted);
                    }
                }
                Some(ViewValue::set_of(values))
            }
            (FieldKind::Map(element), SourceValue::Map(entries)) => {
                let mut values = IndexMap::with_capacity(entries.len());
                for (key, item) in entries {
                    let converted = self.convert(item, element, binding, context, opened)?;
                    values.insert(key, converted.unwrap_or(ViewValue::Null));
                }
                Some(ViewValue::Map(values))
            }
            _ => None,
        };

        Ok(converted)
    }
}
