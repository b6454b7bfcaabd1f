//! View-side value model.
//!
//! A view is a client-facing projection of an entity. Instances are shared
//! through [`ViewHandle`] so that cyclic source graphs resolve to cyclic view
//! graphs, and so the enrichment phase can write into views after they have
//! been handed back to the caller.

use std::{
    borrow::Borrow,
    collections::HashSet,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value, json};

/// Identity of a view type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewTypeId(Arc<str>);

impl ViewTypeId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ViewTypeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ViewTypeId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&ViewTypeId> for ViewTypeId {
    fn from(id: &ViewTypeId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for ViewTypeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ViewTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewTypeId({:?})", &*self.0)
    }
}

impl fmt::Display for ViewTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value stored in a view field.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewValue {
    Null,
    Data(Value),
    View(ViewHandle),
    List(Vec<ViewValue>),
    /// Members are unique: data by equality, views by instance identity.
    Set(Vec<ViewValue>),
    Map(IndexMap<String, ViewValue>),
}

impl ViewValue {
    /// Builds a set, keeping the first occurrence of each member.
    pub fn set_of(values: impl IntoIterator<Item = ViewValue>) -> Self {
        let mut members: Vec<ViewValue> = Vec::new();
        for value in values {
            if !members.contains(&value) {
                members.push(value);
            }
        }
        ViewValue::Set(members)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ViewValue::Null | ViewValue::Data(Value::Null))
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            ViewValue::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&ViewHandle> {
        match self {
            ViewValue::View(handle) => Some(handle),
            _ => None,
        }
    }

    /// Elements of a list or set.
    pub fn as_elements(&self) -> Option<&[ViewValue]> {
        match self {
            ViewValue::List(items) | ViewValue::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, ViewValue>> {
        match self {
            ViewValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    fn render(&self, path: &mut HashSet<usize>) -> Value {
        match self {
            ViewValue::Null => Value::Null,
            ViewValue::Data(value) => value.clone(),
            ViewValue::View(handle) => handle.render(path),
            ViewValue::List(items) | ViewValue::Set(items) => Value::Array(items.iter().map(|item| item.render(path)).collect()),
            ViewValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.render(path)))
                    .collect::<JsonMap<String, Value>>(),
            ),
        }
    }
}

impl From<Value> for ViewValue {
    fn from(value: Value) -> Self {
        ViewValue::Data(value)
    }
}

impl From<ViewHandle> for ViewValue {
    fn from(handle: ViewHandle) -> Self {
        ViewValue::View(handle)
    }
}

/// Field storage of a single view instance.
#[derive(Debug, Clone)]
pub struct ViewData {
    pub view_type: ViewTypeId,
    /// Populated fields in write order. A field that was never written is absent.
    pub fields: IndexMap<String, ViewValue>,
}

/// Shared, mutable view instance.
///
/// Equality is instance identity, matching how the resolver deduplicates
/// views of the same source object.
///
/// Handles are strong references. A view graph resolved from a cyclic source
/// graph is a reference cycle and is not freed when the last outside handle
/// is dropped; call [`ViewHandle::dismantle`] once the graph is no longer
/// needed. Very deep acyclic graphs are also best dismantled, since dropping
/// them releases one nested view per stack frame.
#[derive(Clone)]
pub struct ViewHandle(Arc<RwLock<ViewData>>);

impl ViewHandle {
    pub fn new(view_type: impl Into<ViewTypeId>) -> Self {
        Self(Arc::new(RwLock::new(ViewData {
            view_type: view_type.into(),
            fields: IndexMap::new(),
        })))
    }

    pub fn view_type(&self) -> ViewTypeId {
        self.read(|data| data.view_type.clone())
    }

    pub fn get(&self, field: &str) -> Option<ViewValue> {
        self.read(|data| data.fields.get(field).cloned())
    }

    /// Convenience accessor for plain data fields.
    pub fn data(&self, field: &str) -> Option<Value> {
        self.read(|data| data.fields.get(field).and_then(ViewValue::as_data).cloned())
    }

    /// Convenience accessor for nested view fields.
    pub fn view(&self, field: &str) -> Option<ViewHandle> {
        self.read(|data| data.fields.get(field).and_then(ViewValue::as_view).cloned())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.read(|data| data.fields.contains_key(field))
    }

    pub fn field_names(&self) -> Vec<String> {
        self.read(|data| data.fields.keys().cloned().collect())
    }

    pub fn set(&self, field: impl Into<String>, value: ViewValue) {
        self.write(|data| {
            data.fields.insert(field.into(), value);
        });
    }

    pub fn remove(&self, field: &str) -> Option<ViewValue> {
        self.write(|data| data.fields.shift_remove(field))
    }

    /// Removes every field, returning them in write order.
    pub fn clear(&self) -> IndexMap<String, ViewValue> {
        self.write(|data| std::mem::take(&mut data.fields))
    }

    /// Clears every view reachable from this one, this one included.
    ///
    /// Breaks the reference cycles of a cyclic view graph so it can be freed.
    /// Runs without recursion, so graphs of any depth are safe to release.
    pub fn dismantle(&self) {
        let mut seen = HashSet::new();
        let mut views = vec![self.clone()];
        // Cleared views stay alive here until the end, so dropping their
        // former fields never cascades.
        let mut cleared = Vec::new();

        while let Some(view) = views.pop() {
            if !seen.insert(view.identity()) {
                continue;
            }
            let mut values: Vec<ViewValue> = view.clear().into_values().collect();
            while let Some(value) = values.pop() {
                match value {
                    ViewValue::View(nested) => views.push(nested),
                    ViewValue::List(items) | ViewValue::Set(items) => values.extend(items),
                    ViewValue::Map(entries) => values.extend(entries.into_values()),
                    ViewValue::Null | ViewValue::Data(_) => {}
                }
            }
            cleared.push(view);
        }
    }

    /// Copy of the current field storage.
    pub fn snapshot(&self) -> ViewData {
        self.read(|data| data.clone())
    }

    pub fn ptr_eq(&self, other: &ViewHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Renders the view graph as JSON for diagnostics.
    ///
    /// A view that is reached again while it is still being rendered appears
    /// as `{"$ref": "<view type>"}`, so cyclic graphs terminate. Rendering does
    /// not free such a graph; see [`ViewHandle::dismantle`].
    pub fn to_json(&self) -> Value {
        self.render(&mut HashSet::new())
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    fn render(&self, path: &mut HashSet<usize>) -> Value {
        let data = self.snapshot();
        if !path.insert(self.identity()) {
            return json!({ "$ref": data.view_type.as_str() });
        }
        let rendered = data
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value.render(path)))
            .collect::<JsonMap<String, Value>>();
        path.remove(&self.identity());
        Value::Object(rendered)
    }

    // Locks are never held across calls back into other handles, so a view
    // that contains itself cannot deadlock.
    fn read<T>(&self, f: impl FnOnce(&ViewData) -> T) -> T {
        f(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut ViewData) -> T) -> T {
        f(&mut self.0.write().unwrap_or_else(PoisonError::into_inner))
    }
}

impl PartialEq for ViewHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ViewHandle {}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (view_type, fields) = self.read(|data| (data.view_type.clone(), data.fields.keys().cloned().collect::<Vec<_>>()));
        f.debug_struct("ViewHandle")
            .field("view_type", &view_type)
            .field("fields", &fields)
            .finish()
    }
}
