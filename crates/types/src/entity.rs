//! Source-side value model.
//!
//! Entities are the internal domain objects a view is projected from. The
//! engine never introspects them: it reads fields by name through the
//! [`Entity`] trait and learns their runtime type from a static
//! [`EntityType`] tag. Partially-loaded references are modelled explicitly as
//! [`LazyReference`] values so the walker can materialize them on demand.

use std::{
    collections::{HashSet, VecDeque},
    fmt,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use tracing::warn;

/// Static runtime type tag for an entity.
///
/// Type tags are declared as `static` items so supertypes can be referenced
/// directly:
///
/// ```rust
/// use viewforge_types::EntityType;
///
/// static CONTENT: EntityType = EntityType::new("Content");
/// static ARTICLE: EntityType = EntityType::extending("Article", &[&CONTENT]);
///
/// assert!(ARTICLE.is_assignable_to(&CONTENT));
/// ```
///
/// Names identify the type; two tags with the same name are the same type.
pub struct EntityType {
    name: &'static str,
    supertypes: &'static [&'static EntityType],
}

impl EntityType {
    /// Declares a root type with no supertypes.
    pub const fn new(name: &'static str) -> Self {
        Self { name, supertypes: &[] }
    }

    /// Declares a type that is assignable to each of `supertypes`.
    pub const fn extending(name: &'static str, supertypes: &'static [&'static EntityType]) -> Self {
        Self { name, supertypes }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn supertypes(&self) -> &'static [&'static EntityType] {
        self.supertypes
    }

    /// Returns this type and every transitive supertype paired with its
    /// distance from `self`, in breadth-first order.
    ///
    /// Supertypes are visited in declaration order, and a type reachable over
    /// several paths is reported once at its shortest distance.
    pub fn lineage(&'static self) -> Vec<(&'static EntityType, usize)> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(self, 0usize)]);
        let mut lineage = Vec::new();

        while let Some((entity_type, distance)) = queue.pop_front() {
            if !seen.insert(entity_type.name) {
                continue;
            }
            lineage.push((entity_type, distance));
            for supertype in entity_type.supertypes {
                queue.push_back((supertype, distance + 1));
            }
        }

        lineage
    }

    /// Whether a value of this type may stand in for `other`.
    pub fn is_assignable_to(&'static self, other: &EntityType) -> bool {
        self.lineage().iter().any(|(candidate, _)| *candidate == other)
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EntityType {}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityType").field(&self.name).finish()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A domain object that can be projected into a view.
///
/// Implementations expose their fields by name. Unknown fields must read as
/// [`SourceValue::Null`] rather than panicking; the walker treats missing data
/// as an absent value.
pub trait Entity: Send + Sync + fmt::Debug {
    fn entity_type(&self) -> &'static EntityType;

    fn field(&self, name: &str) -> SourceValue;
}

/// Identity of a shared entity allocation.
///
/// Two handles to the same `Arc` produce the same key; structurally equal but
/// distinct entities do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityKey(usize);

impl EntityKey {
    pub fn of(entity: &Arc<dyn Entity>) -> Self {
        Self(Arc::as_ptr(entity) as *const () as usize)
    }
}

/// Dynamic entity backed by an ordered field map.
///
/// Fields can be assigned after the record has been shared, which is how
/// cyclic graphs are assembled:
///
/// ```rust
/// use std::sync::Arc;
/// use viewforge_types::{EntityRecord, EntityType, SourceValue};
///
/// static NODE: EntityType = EntityType::new("Node");
///
/// let node = Arc::new(EntityRecord::new(&NODE).with("name", "root"));
/// node.set("next", SourceValue::from(Arc::clone(&node)));
/// ```
pub struct EntityRecord {
    entity_type: &'static EntityType,
    fields: RwLock<IndexMap<String, SourceValue>>,
}

impl EntityRecord {
    pub fn new(entity_type: &'static EntityType) -> Self {
        Self {
            entity_type,
            fields: RwLock::new(IndexMap::new()),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SourceValue>) -> Self {
        self.fields
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
        self
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<SourceValue>) {
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }
}

impl Entity for EntityRecord {
    fn entity_type(&self) -> &'static EntityType {
        self.entity_type
    }

    fn field(&self, name: &str) -> SourceValue {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

// Field values are omitted: records routinely point back at themselves.
impl fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRecord")
            .field("entity_type", &self.entity_type.name)
            .field("fields", &self.field_names())
            .finish()
    }
}

/// Loader invoked when a lazy reference is first materialized.
pub type EntityLoader = Box<dyn Fn() -> anyhow::Result<Option<Arc<dyn Entity>>> + Send + Sync>;

/// A reference to an entity that may not have been loaded yet.
///
/// The loader runs at most once; every later call observes the cached
/// outcome. A loader error is logged and treated as an absent reference.
pub struct LazyReference {
    label: String,
    loader: EntityLoader,
    loaded: OnceLock<Option<Arc<dyn Entity>>>,
}

impl LazyReference {
    pub fn new<F>(label: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Option<Arc<dyn Entity>>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            loader: Box::new(loader),
            loaded: OnceLock::new(),
        }
    }

    /// A reference whose target is already in memory.
    pub fn loaded(label: impl Into<String>, entity: Arc<dyn Entity>) -> Self {
        let reference = Self::new(label, || Ok(None));
        let _ = reference.loaded.set(Some(entity));
        reference
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Returns the target entity, running the loader on first use.
    pub fn materialize(&self) -> Option<Arc<dyn Entity>> {
        self.loaded
            .get_or_init(|| match (self.loader)() {
                Ok(entity) => entity,
                Err(error) => {
                    warn!(reference = %self.label, error = %error, "lazy reference failed to load; treating as absent");
                    None
                }
            })
            .clone()
    }
}

impl fmt::Debug for LazyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyReference")
            .field("label", &self.label)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// A value read from an entity field.
#[derive(Clone, Debug, Default)]
pub enum SourceValue {
    #[default]
    Null,
    /// Scalar or immutable structured data copied as-is.
    Data(Value),
    Entity(Arc<dyn Entity>),
    Lazy(Arc<LazyReference>),
    /// Ordered collection.
    List(Vec<SourceValue>),
    /// Unordered collection; duplicates are collapsed when resolved.
    Set(Vec<SourceValue>),
    Map(IndexMap<String, SourceValue>),
}

impl SourceValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null | SourceValue::Data(Value::Null))
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SourceValue>,
    {
        SourceValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn set<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SourceValue>,
    {
        SourceValue::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn lazy(reference: LazyReference) -> Self {
        SourceValue::Lazy(Arc::new(reference))
    }

    /// Converts plain data (and collections of plain data) into JSON.
    ///
    /// Returns `None` when the value contains an entity or lazy reference.
    pub fn to_data(&self) -> Option<Value> {
        match self {
            SourceValue::Null => Some(Value::Null),
            SourceValue::Data(value) => Some(value.clone()),
            SourceValue::List(items) | SourceValue::Set(items) => {
                items.iter().map(SourceValue::to_data).collect::<Option<Vec<_>>>().map(Value::Array)
            }
            SourceValue::Map(entries) => entries
                .iter()
                .map(|(key, value)| value.to_data().map(|data| (key.clone(), data)))
                .collect::<Option<JsonMap<String, Value>>>()
                .map(Value::Object),
            SourceValue::Entity(_) | SourceValue::Lazy(_) => None,
        }
    }
}

impl From<Value> for SourceValue {
    fn from(value: Value) -> Self {
        SourceValue::Data(value)
    }
}

impl From<&str> for SourceValue {
    fn from(value: &str) -> Self {
        SourceValue::Data(Value::String(value.to_string()))
    }
}

impl From<String> for SourceValue {
    fn from(value: String) -> Self {
        SourceValue::Data(Value::String(value))
    }
}

impl From<i64> for SourceValue {
    fn from(value: i64) -> Self {
        SourceValue::Data(Value::from(value))
    }
}

impl From<bool> for SourceValue {
    fn from(value: bool) -> Self {
        SourceValue::Data(Value::Bool(value))
    }
}

impl From<Arc<dyn Entity>> for SourceValue {
    fn from(entity: Arc<dyn Entity>) -> Self {
        SourceValue::Entity(entity)
    }
}

impl From<Arc<EntityRecord>> for SourceValue {
    fn from(record: Arc<EntityRecord>) -> Self {
        SourceValue::Entity(record)
    }
}

impl<T: Into<SourceValue>> From<Option<T>> for SourceValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}
