//! Public entry point for resolving entities into views.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use viewforge_registry::ViewRegistry;
use viewforge_types::{Entity, SourceValue, ViewHandle, ViewTypeId};

use crate::{
    EntityAccessor, FillReport, FillerOptions, FillerResolver, FunctionRegistry, LazyAwareAccessor,
    SecurityContextProvider, StaticRoles, ViewError,
    context::{PendingEnrichments, ResolutionContext},
    walker::GraphWalker,
};

/// Views produced by one resolution call, with the enrichments they still
/// need.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub views: T,
    pub pending: PendingEnrichments,
}

impl<T> Resolved<T> {
    pub fn into_parts(self) -> (T, PendingEnrichments) {
        (self.views, self.pending)
    }
}

/// Views after both resolution and enrichment.
#[derive(Debug, Clone)]
pub struct Hydrated {
    pub views: Vec<ViewHandle>,
    pub report: FillReport,
}

/// Resolves entities into views of a registered view type.
///
/// Each call gets its own [`ResolutionContext`]; the registry, accessor and
/// security provider are shared and read-only, so one resolver can serve
/// concurrent callers.
#[derive(Clone)]
pub struct ViewResolver {
    registry: Arc<ViewRegistry>,
    accessor: Arc<dyn EntityAccessor>,
    security: Arc<dyn SecurityContextProvider>,
    filler: FillerResolver,
}

impl ViewResolver {
    pub fn new(
        registry: Arc<ViewRegistry>,
        accessor: Arc<dyn EntityAccessor>,
        security: Arc<dyn SecurityContextProvider>,
    ) -> Self {
        Self {
            registry,
            accessor,
            security,
            filler: FillerResolver::default(),
        }
    }

    /// Lazy-aware field access and an anonymous caller.
    pub fn with_defaults(registry: Arc<ViewRegistry>) -> Self {
        Self::new(registry, Arc::new(LazyAwareAccessor), Arc::new(StaticRoles::default()))
    }

    pub fn with_security(mut self, security: impl SecurityContextProvider + 'static) -> Self {
        self.security = Arc::new(security);
        self
    }

    pub fn with_filler_options(mut self, options: FillerOptions) -> Self {
        self.filler = FillerResolver::new(options);
        self
    }

    pub fn registry(&self) -> &Arc<ViewRegistry> {
        &self.registry
    }

    pub fn filler(&self) -> &FillerResolver {
        &self.filler
    }

    /// Resolves one entity.
    ///
    /// # Errors
    /// Fails on unregistered or inconsistent view types, an entity type with
    /// no polymorphic mapping, or a failing adapter. Missing data and hidden
    /// fields are not errors.
    pub fn resolve_entity(
        &self,
        view_type: impl Into<ViewTypeId>,
        entity: &Arc<dyn Entity>,
    ) -> Result<Resolved<ViewHandle>, ViewError> {
        let view_type = view_type.into();
        let mut context = self.context();
        let view = self.walker().resolve_entity(entity, &view_type, &mut context)?;
        Ok(self.finish(&view_type, 1, view, context))
    }

    /// Resolves a batch, preserving input order.
    ///
    /// The batch shares one context, so an entity that appears twice (or is
    /// reachable from several entries) maps to a single view instance.
    pub fn resolve_entities(
        &self,
        view_type: impl Into<ViewTypeId>,
        entities: &[Arc<dyn Entity>],
    ) -> Result<Resolved<Vec<ViewHandle>>, ViewError> {
        let view_type = view_type.into();
        let mut context = self.context();
        let walker = self.walker();
        let views = entities
            .iter()
            .map(|entity| walker.resolve_entity(entity, &view_type, &mut context))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.finish(&view_type, entities.len(), views, context))
    }

    /// Resolves an arbitrary source value, materializing lazy references.
    ///
    /// Null and non-entity values resolve to `None`.
    pub fn resolve_value(
        &self,
        view_type: impl Into<ViewTypeId>,
        value: &SourceValue,
    ) -> Result<Resolved<Option<ViewHandle>>, ViewError> {
        let view_type = view_type.into();
        let mut context = self.context();
        let view = self.walker().resolve(value.clone(), &view_type, &mut context)?;
        Ok(self.finish(&view_type, usize::from(view.is_some()), view, context))
    }

    /// Resolves a batch and fills its enrichments in one step.
    pub async fn resolve_hydrated(
        &self,
        view_type: impl Into<ViewTypeId>,
        entities: &[Arc<dyn Entity>],
        functions: &FunctionRegistry,
        cancel: CancellationToken,
    ) -> Result<Hydrated, ViewError> {
        let (views, pending) = self.resolve_entities(view_type, entities)?.into_parts();
        let report = self.filler.fill(pending, functions, cancel).await?;
        Ok(Hydrated { views, report })
    }

    fn context(&self) -> ResolutionContext {
        ResolutionContext::new(self.security.current_roles())
    }

    fn walker(&self) -> GraphWalker<'_> {
        GraphWalker::new(&self.registry, self.accessor.as_ref())
    }

    fn finish<T>(&self, view_type: &ViewTypeId, roots: usize, views: T, context: ResolutionContext) -> Resolved<T> {
        debug!(
            view_type = %view_type,
            roots,
            views = context.visited_count(),
            pending = context.pending().len(),
            "resolution finished"
        );
        Resolved {
            views,
            pending: context.into_pending(),
        }
    }
}

impl std::fmt::Debug for ViewResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewResolver")
            .field("registry", &self.registry)
            .field("filler", &self.filler)
            .finish_non_exhaustive()
    }
}
