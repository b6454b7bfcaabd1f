//! Per-field mapping rules.
//!
//! A [`FieldBinding`] is the explicit, builder-configured replacement for
//! per-field annotations: where the value comes from, which nested view it
//! projects into, who may see it, and whether it is filled later by an
//! enrichment function.

use std::{collections::BTreeSet, fmt, sync::Arc};

use serde_json::Value;
use viewforge_types::{FieldKind, RoleSet, SourceValue, ViewTypeId, ViewValue};

/// Predicate over the source value; `false` drops the field.
pub type FieldFilter = Arc<dyn Fn(&SourceValue) -> bool + Send + Sync>;

/// Transform applied to a converted value before it is written to the view.
///
/// An adapter error aborts the resolution call.
pub type DataAdapter = Arc<dyn Fn(ViewValue) -> anyhow::Result<ViewValue> + Send + Sync>;

/// Custom visibility decision for a restricted field.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, roles: &RoleSet, field: &FieldBinding) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(&RoleSet, &FieldBinding) -> bool + Send + Sync,
{
    fn authorize(&self, roles: &RoleSet, field: &FieldBinding) -> bool {
        self(roles, field)
    }
}

/// Who may see a field.
///
/// When both a role set and an authorizer are declared the caller must
/// satisfy both.
#[derive(Clone, Default)]
pub struct RoleRestriction {
    /// Caller must hold at least one of these roles. Empty means no role requirement.
    pub roles: RoleSet,
    pub authorizer: Option<Arc<dyn Authorizer>>,
}

impl RoleRestriction {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.authorizer.is_none()
    }
}

impl fmt::Debug for RoleRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleRestriction")
            .field("roles", &self.roles)
            .field("authorizer", &self.authorizer.is_some())
            .finish()
    }
}

/// How the lookup key for an enrichment is derived from the source value.
#[derive(Clone, Default)]
pub enum KeyExtractor {
    /// The field's own source value is the key (or, for collections, the keys).
    #[default]
    SourceValue,
    Custom(Arc<dyn Fn(&SourceValue) -> Option<Value> + Send + Sync>),
}

impl KeyExtractor {
    pub fn custom<F>(extract: F) -> Self
    where
        F: Fn(&SourceValue) -> Option<Value> + Send + Sync + 'static,
    {
        KeyExtractor::Custom(Arc::new(extract))
    }

    pub fn extract(&self, value: &SourceValue) -> Option<Value> {
        match self {
            KeyExtractor::SourceValue => value.to_data(),
            KeyExtractor::Custom(extract) => extract(value),
        }
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyExtractor::SourceValue => f.write_str("SourceValue"),
            KeyExtractor::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Binds a field to a named enrichment function.
#[derive(Clone, Debug)]
pub struct EnrichmentBinding {
    pub function: String,
    pub key: KeyExtractor,
}

/// Shallow per-occurrence restriction of a nested view's fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection<'a> {
    All,
    Include(&'a BTreeSet<String>),
    Exclude(&'a BTreeSet<String>),
}

impl Projection<'_> {
    pub fn admits(&self, field: &str) -> bool {
        match self {
            Projection::All => true,
            Projection::Include(names) => names.contains(field),
            Projection::Exclude(names) => !names.contains(field),
        }
    }
}

/// Mapping rule for one view field.
#[derive(Clone)]
pub struct FieldBinding {
    /// Name of the field on the view.
    pub name: String,
    /// Name of the field read from the entity.
    pub source: String,
    pub kind: FieldKind,
    pub include: BTreeSet<String>,
    pub exclude: BTreeSet<String>,
    pub filter: Option<FieldFilter>,
    pub restriction: Option<RoleRestriction>,
    pub enrichment: Option<EnrichmentBinding>,
    pub adapter: Option<DataAdapter>,
}

impl FieldBinding {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            name,
            kind,
            include: BTreeSet::new(),
            exclude: BTreeSet::new(),
            filter: None,
            restriction: None,
            enrichment: None,
            adapter: None,
        }
    }

    /// An untyped data field.
    pub fn value(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::data())
    }

    /// A field holding a single nested view.
    pub fn nested(name: impl Into<String>, view_type: impl Into<ViewTypeId>) -> Self {
        Self::new(name, FieldKind::view(view_type))
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn filter<F>(mut self, keep: F) -> Self
    where
        F: Fn(&SourceValue) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(keep));
        self
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let restriction = self.restriction.get_or_insert_with(RoleRestriction::default);
        for role in roles {
            restriction.roles.insert(role);
        }
        self
    }

    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.restriction.get_or_insert_with(RoleRestriction::default).authorizer = Some(Arc::new(authorizer));
        self
    }

    /// Closure form of [`FieldBinding::authorizer`].
    pub fn authorize_with<F>(self, authorize: F) -> Self
    where
        F: Fn(&RoleSet, &FieldBinding) -> bool + Send + Sync + 'static,
    {
        self.authorizer(authorize)
    }

    /// Fills this field from `function`, keyed by the field's source value.
    pub fn enrich(self, function: impl Into<String>) -> Self {
        self.enrich_with(function, KeyExtractor::SourceValue)
    }

    pub fn enrich_with(mut self, function: impl Into<String>, key: KeyExtractor) -> Self {
        self.enrichment = Some(EnrichmentBinding {
            function: function.into(),
            key,
        });
        self
    }

    pub fn adapter<F>(mut self, adapt: F) -> Self
    where
        F: Fn(ViewValue) -> anyhow::Result<ViewValue> + Send + Sync + 'static,
    {
        self.adapter = Some(Arc::new(adapt));
        self
    }

    pub fn projection(&self) -> Projection<'_> {
        if !self.include.is_empty() {
            Projection::Include(&self.include)
        } else if !self.exclude.is_empty() {
            Projection::Exclude(&self.exclude)
        } else {
            Projection::All
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.restriction.as_ref().is_some_and(|restriction| !restriction.is_empty())
    }

    pub fn apply_adapter(&self, value: ViewValue) -> anyhow::Result<ViewValue> {
        match &self.adapter {
            Some(adapt) => adapt(value),
            None => Ok(value),
        }
    }
}

impl fmt::Debug for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("kind", &self.kind)
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("filter", &self.filter.is_some())
            .field("restriction", &self.restriction)
            .field("enrichment", &self.enrichment)
            .field("adapter", &self.adapter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn source_defaults_to_view_name() {
        let binding = FieldBinding::value("title");
        assert_eq!(binding.source, "title");
        assert_eq!(FieldBinding::value("title").source("headline").source, "headline");
    }

    #[test]
    fn projection_prefers_include() {
        let binding = FieldBinding::nested("author", "UserView").include(["id", "name"]);
        let projection = binding.projection();
        assert!(projection.admits("id"));
        assert!(!projection.admits("email"));

        let binding = FieldBinding::nested("author", "UserView").exclude(["email"]);
        assert!(binding.projection().admits("id"));
        assert!(!binding.projection().admits("email"));
    }

    #[test]
    fn restriction_accumulates_roles() {
        let binding = FieldBinding::value("salary").roles(["hr"]).roles(["admin"]);
        let restriction = binding.restriction.as_ref().expect("restriction");
        assert!(restriction.roles.contains("hr"));
        assert!(restriction.roles.contains("admin"));
        assert!(binding.is_restricted());
        assert!(!FieldBinding::value("name").is_restricted());
    }

    #[test]
    fn default_key_extractor_uses_plain_data() {
        let extractor = KeyExtractor::default();
        assert_eq!(extractor.extract(&SourceValue::from(7i64)), Some(json!(7)));
        let custom = KeyExtractor::custom(|value| value.to_data().map(|v| json!(format!("user:{v}"))));
        assert_eq!(custom.extract(&SourceValue::from(7i64)), Some(json!("user:7")));
    }
}
