//! Per-call resolution state.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use viewforge_registry::FieldBinding;
use viewforge_types::{Entity, EntityKey, RoleSet, ViewHandle, ViewTypeId};

/// Keys extracted for one deferred enrichment.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingKeys {
    /// The field receives the single result matching this key.
    One(Value),
    /// The field receives every result matching these keys, in key order.
    Many(Vec<Value>),
}

impl PendingKeys {
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        match self {
            PendingKeys::One(key) => std::slice::from_ref(key).iter(),
            PendingKeys::Many(keys) => keys.iter(),
        }
    }
}

/// A view field waiting to be filled by a bulk enrichment function.
#[derive(Debug, Clone)]
pub struct PendingEnrichment {
    pub owner: ViewHandle,
    pub binding: Arc<FieldBinding>,
    pub function: String,
    pub keys: PendingKeys,
}

/// Enrichments recorded by one resolution call, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct PendingEnrichments(Vec<PendingEnrichment>);

impl PendingEnrichments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pending: PendingEnrichment) {
        self.0.push(pending);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEnrichment> {
        self.0.iter()
    }

    /// Records whose owning view is one of `views`.
    pub fn owned_by(&self, views: &[ViewHandle]) -> PendingEnrichments {
        self.0
            .iter()
            .filter(|pending| views.iter().any(|view| view.ptr_eq(&pending.owner)))
            .cloned()
            .collect()
    }
}

impl Extend<PendingEnrichment> for PendingEnrichments {
    fn extend<T: IntoIterator<Item = PendingEnrichment>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<PendingEnrichment> for PendingEnrichments {
    fn from_iter<T: IntoIterator<Item = PendingEnrichment>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PendingEnrichments {
    type Item = PendingEnrichment;
    type IntoIter = std::vec::IntoIter<PendingEnrichment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

struct Visited {
    // Holding the entity keeps its address from being reused while the
    // context is alive.
    _entity: Arc<dyn Entity>,
    view: ViewHandle,
}

/// State shared across one resolution call and discarded afterwards.
///
/// Views are memoized per source instance and concrete view type, so a
/// cyclic or shared source graph resolves to the same view instances.
pub struct ResolutionContext {
    roles: RoleSet,
    visited: HashMap<(EntityKey, ViewTypeId), Visited>,
    pending: PendingEnrichments,
}

impl ResolutionContext {
    pub fn new(roles: RoleSet) -> Self {
        Self {
            roles,
            visited: HashMap::new(),
            pending: PendingEnrichments::new(),
        }
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn visited(&self, entity: &Arc<dyn Entity>, view_type: &ViewTypeId) -> Option<ViewHandle> {
        self.visited
            .get(&(EntityKey::of(entity), view_type.clone()))
            .map(|visited| visited.view.clone())
    }

    /// Registers `view` for the pair before any of its fields are resolved.
    pub fn remember(&mut self, entity: &Arc<dyn Entity>, view: &ViewHandle) {
        self.visited.insert(
            (EntityKey::of(entity), view.view_type()),
            Visited {
                _entity: Arc::clone(entity),
                view: view.clone(),
            },
        );
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn record(&mut self, pending: PendingEnrichment) {
        self.pending.push(pending);
    }

    pub fn pending(&self) -> &PendingEnrichments {
        &self.pending
    }

    pub fn into_pending(self) -> PendingEnrichments {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use viewforge_types::{EntityRecord, EntityType};

    use super::*;

    static USER: EntityType = EntityType::new("User");

    fn entity() -> Arc<dyn Entity> {
        Arc::new(EntityRecord::new(&USER))
    }

    #[test]
    fn visited_is_keyed_by_instance_and_view_type() {
        let mut context = ResolutionContext::new(RoleSet::new());
        let alice = entity();
        let twin = entity();
        let view = ViewHandle::new("UserView");
        context.remember(&alice, &view);

        let found = context.visited(&alice, &ViewTypeId::from("UserView")).expect("visited");
        assert!(found.ptr_eq(&view));
        assert!(context.visited(&alice, &ViewTypeId::from("AdminView")).is_none());
        assert!(context.visited(&twin, &ViewTypeId::from("UserView")).is_none());
        assert_eq!(context.visited_count(), 1);
    }

    #[test]
    fn pending_records_filter_by_owner() {
        let first = ViewHandle::new("PostView");
        let second = ViewHandle::new("PostView");
        let binding = Arc::new(FieldBinding::value("author").enrich("users"));
        let pending: PendingEnrichments = [&first, &second]
            .into_iter()
            .enumerate()
            .map(|(index, owner)| PendingEnrichment {
                owner: owner.clone(),
                binding: Arc::clone(&binding),
                function: "users".to_string(),
                keys: PendingKeys::One(json!(index)),
            })
            .collect();

        let owned = pending.owned_by(std::slice::from_ref(&second));
        assert_eq!(owned.len(), 1);
        assert_eq!(owned.iter().next().map(|p| p.keys.clone()), Some(PendingKeys::One(json!(1))));
        assert_eq!(PendingKeys::Many(vec![json!(1), json!(2)]).iter().count(), 2);
    }
}
