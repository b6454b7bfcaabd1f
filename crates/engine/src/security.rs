//! Field-level visibility.

use viewforge_registry::FieldBinding;
use viewforge_types::RoleSet;

/// Supplies the caller's roles for a resolution call.
pub trait SecurityContextProvider: Send + Sync {
    fn current_roles(&self) -> RoleSet;
}

impl<F> SecurityContextProvider for F
where
    F: Fn() -> RoleSet + Send + Sync,
{
    fn current_roles(&self) -> RoleSet {
        self()
    }
}

/// A fixed role set. The default is an anonymous caller with no roles.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles(RoleSet);

impl StaticRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().collect())
    }
}

impl SecurityContextProvider for StaticRoles {
    fn current_roles(&self) -> RoleSet {
        self.0.clone()
    }
}

/// Whether a caller holding `roles` may see the field.
///
/// Unrestricted fields are always visible. A restricted field needs one of
/// its declared roles and, when an authorizer is set, the authorizer's
/// approval as well.
pub fn is_visible(binding: &FieldBinding, roles: &RoleSet) -> bool {
    let Some(restriction) = &binding.restriction else {
        return true;
    };
    let role_ok = restriction.roles.is_empty() || restriction.roles.intersects(roles);
    role_ok
        && restriction
            .authorizer
            .as_ref()
            .is_none_or(|authorizer| authorizer.authorize(roles, binding))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> RoleSet {
        names.iter().copied().collect()
    }

    #[test]
    fn unrestricted_fields_are_visible_to_anyone() {
        assert!(is_visible(&FieldBinding::value("name"), &RoleSet::new()));
    }

    #[test]
    fn any_declared_role_grants_access() {
        let binding = FieldBinding::value("salary").roles(["A", "B"]);
        assert!(is_visible(&binding, &roles(&["B"])));
        assert!(is_visible(&binding, &roles(&["A", "C"])));
        assert!(!is_visible(&binding, &roles(&["C"])));
        assert!(!is_visible(&binding, &RoleSet::new()));
    }

    #[test]
    fn authorizer_and_roles_must_both_pass() {
        let binding = FieldBinding::value("salary")
            .roles(["hr"])
            .authorize_with(|roles, _| !roles.contains("contractor"));
        assert!(is_visible(&binding, &roles(&["hr"])));
        assert!(!is_visible(&binding, &roles(&["hr", "contractor"])));
        assert!(!is_visible(&binding, &roles(&["sales"])));
    }

    #[test]
    fn authorizer_alone_decides_when_no_roles_are_declared() {
        let binding = FieldBinding::value("notes").authorize_with(|roles, field| roles.contains(&field.name));
        assert!(is_visible(&binding, &roles(&["notes"])));
        assert!(!is_visible(&binding, &roles(&["other"])));
    }

    #[test]
    fn providers_report_current_roles() {
        assert!(StaticRoles::default().current_roles().is_empty());
        assert!(StaticRoles::new(["admin"]).current_roles().contains("admin"));
        let dynamic = || roles(&["ops"]);
        assert!(dynamic.current_roles().contains("ops"));
    }
}
