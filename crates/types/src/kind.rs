//! Declared shapes of view fields.
//!
//! Field kinds let the registry reject bindings that can never be satisfied
//! (for example an enrichment writing fetched data into a nested-view field)
//! before any entity is resolved.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ViewTypeId;

/// JSON shape of a plain data value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Any,
    Bool,
    Number,
    String,
    Object,
    Array,
}

impl ValueKind {
    /// Shape of `value`, or `None` for JSON null.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Number(_) => Some(ValueKind::Number),
            Value::String(_) => Some(ValueKind::String),
            Value::Array(_) => Some(ValueKind::Array),
            Value::Object(_) => Some(ValueKind::Object),
        }
    }

    /// Null is admitted by every kind.
    pub fn admits(&self, value: &Value) -> bool {
        match ValueKind::of(value) {
            None => true,
            Some(kind) => self.can_hold(kind),
        }
    }

    pub fn can_hold(&self, other: ValueKind) -> bool {
        *self == ValueKind::Any || *self == other
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Any => "any",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
        };
        f.write_str(name)
    }
}

/// Declared type of a view field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Data(ValueKind),
    View(ViewTypeId),
    List(Box<FieldKind>),
    Set(Box<FieldKind>),
    Map(Box<FieldKind>),
}

impl FieldKind {
    /// Untyped data.
    pub fn data() -> Self {
        FieldKind::Data(ValueKind::Any)
    }

    pub fn view(view_type: impl Into<ViewTypeId>) -> Self {
        FieldKind::View(view_type.into())
    }

    pub fn list(element: FieldKind) -> Self {
        FieldKind::List(Box::new(element))
    }

    pub fn set(element: FieldKind) -> Self {
        FieldKind::Set(Box::new(element))
    }

    pub fn map(value: FieldKind) -> Self {
        FieldKind::Map(Box::new(value))
    }

    /// The view type held by this field, looking through collections.
    pub fn nested_view(&self) -> Option<&ViewTypeId> {
        match self {
            FieldKind::Data(_) => None,
            FieldKind::View(view_type) => Some(view_type),
            FieldKind::List(inner) | FieldKind::Set(inner) | FieldKind::Map(inner) => inner.nested_view(),
        }
    }

    pub fn holds_views(&self) -> bool {
        self.nested_view().is_some()
    }

    /// Whether a single fetched value of `kind` can be written here.
    pub fn can_hold_one(&self, kind: ValueKind) -> bool {
        matches!(self, FieldKind::Data(declared) if declared.can_hold(kind))
    }

    /// Whether a collection of fetched values of `kind` can be written here.
    pub fn can_hold_many(&self, kind: ValueKind) -> bool {
        match self {
            FieldKind::List(inner) | FieldKind::Set(inner) => inner.can_hold_one(kind),
            FieldKind::Data(_) | FieldKind::View(_) | FieldKind::Map(_) => false,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Data(kind) => write!(f, "{kind}"),
            FieldKind::View(view_type) => write!(f, "view<{view_type}>"),
            FieldKind::List(inner) => write!(f, "list<{inner}>"),
            FieldKind::Set(inner) => write!(f, "set<{inner}>"),
            FieldKind::Map(inner) => write!(f, "map<{inner}>"),
        }
    }
}
