//! View resolution engine.
//!
//! Resolution is split in two phases. [`ViewResolver`] walks an entity graph
//! and builds views synchronously, applying projections, role checks and
//! polymorphic dispatch. Fields bound to enrichment functions are recorded as
//! pending instead of fetched; [`FillerResolver`] then batches them per
//! function and writes the bulk results back into the same view instances.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tokio_util::sync::CancellationToken;
//! use viewforge_engine::{EnrichmentFunction, FunctionRegistry, ResultKey, ViewResolver};
//! use viewforge_registry::{FieldBinding, ViewDefinition, ViewRegistry};
//! use viewforge_types::{Entity, EntityRecord, EntityType};
//!
//! static POST: EntityType = EntityType::new("Post");
//!
//! # async fn run() -> anyhow::Result<()> {
//! let registry = ViewRegistry::builder()
//!     .register(
//!         ViewDefinition::new("PostView")
//!             .field(FieldBinding::value("title"))
//!             .field(FieldBinding::value("author").source("authorId").enrich("users")),
//!     )
//!     .build()?;
//! let functions = FunctionRegistry::new().with(EnrichmentFunction::from_fn("users", ResultKey::field("id"), |ids| {
//!     Ok(ids.into_iter().map(|id| serde_json::json!({ "id": id, "name": "Ada" })).collect())
//! }))?;
//!
//! let post: Arc<dyn Entity> = Arc::new(EntityRecord::new(&POST).with("title", "Hello").with("authorId", 1i64));
//! let resolver = ViewResolver::with_defaults(Arc::new(registry));
//! let hydrated = resolver
//!     .resolve_hydrated("PostView", &[post], &functions, CancellationToken::new())
//!     .await?;
//! println!("{}", hydrated.views[0].to_json());
//! # Ok(())
//! # }
//! ```

mod accessor;
mod config;
mod context;
mod error;
mod filler;
mod resolver;
mod security;
mod type_resolver;
mod walker;

pub use accessor::{EntityAccessor, LazyAwareAccessor};
pub use config::{
    CollisionPolicy, EngineConfig, ValidationError, default_config_path, load_config, load_config_from_path,
    save_config_to_path, validate_config,
};
pub use context::{PendingEnrichment, PendingEnrichments, PendingKeys, ResolutionContext};
pub use error::ViewError;
pub use filler::{
    BulkFetch, EnrichmentFunction, EnrichmentGroupFailure, FillReport, FillerOptions, FillerResolver, FnFetch,
    FunctionRegistry, GroupFailureReason, GroupOutcome, ResultKey,
};
pub use resolver::{Hydrated, Resolved, ViewResolver};
pub use security::{SecurityContextProvider, StaticRoles, is_visible};
pub use type_resolver::{resolve_concrete, select_view_type};
pub use walker::GraphWalker;
