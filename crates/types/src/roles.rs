use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Roles held by the caller of a resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: impl Into<String>) -> bool {
        self.0.insert(role.into())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    /// Whether at least one role is held by both sets.
    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.0.iter().any(|role| other.contains(role))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersects_requires_a_shared_role() {
        let restricted: RoleSet = ["admin", "auditor"].into_iter().collect();
        let caller: RoleSet = ["viewer"].into_iter().collect();
        assert!(!restricted.intersects(&caller));

        let caller: RoleSet = ["viewer", "auditor"].into_iter().collect();
        assert!(restricted.intersects(&caller));
        assert!(!restricted.intersects(&RoleSet::new()));
    }
}
