//! Registry crate for view definitions and field descriptors.
//!
//! View types are configured explicitly with [`ViewDefinition`] and
//! [`FieldBinding`] builders, registered once in a [`ViewRegistry`], and
//! described lazily into cached, immutable [`ViewDescriptor`]s.

mod binding;
mod definition;
mod error;
mod registry;
mod validate;

pub use binding::{Authorizer, DataAdapter, EnrichmentBinding, FieldBinding, FieldFilter, KeyExtractor, Projection, RoleRestriction};
pub use definition::{PolymorphicTable, ViewDefinition};
pub use error::ConfigurationError;
pub use registry::{ViewDescriptor, ViewRegistry, ViewRegistryBuilder};

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use viewforge_types::{EntityType, FieldKind, ViewTypeId};

    use super::*;

    static CONTENT: EntityType = EntityType::new("Content");
    static VIDEO: EntityType = EntityType::extending("Video", &[&CONTENT]);

    fn user_view() -> ViewDefinition {
        ViewDefinition::new("UserView")
            .field(FieldBinding::value("id"))
            .field(FieldBinding::value("name"))
            .field(FieldBinding::value("email").roles(["admin"]))
    }

    fn post_view() -> ViewDefinition {
        ViewDefinition::new("PostView")
            .field(FieldBinding::value("title"))
            .field(FieldBinding::nested("author", "UserView").include(["id", "name"]))
            .field(FieldBinding::new("comments", FieldKind::list(FieldKind::view("UserView"))))
    }

    fn registry_with(definitions: Vec<ViewDefinition>) -> Result<ViewRegistry, ConfigurationError> {
        definitions
            .into_iter()
            .fold(ViewRegistry::builder(), ViewRegistryBuilder::register)
            .build()
    }

    #[test]
    fn describe_is_cached_and_idempotent() {
        let registry = registry_with(vec![user_view(), post_view()]).expect("registry");
        let first = registry.describe(&ViewTypeId::from("PostView")).expect("describe");
        let second = registry.describe(&ViewTypeId::from("PostView")).expect("describe");

        assert!(Arc::ptr_eq(&first, &second));
        let names: Vec<_> = first.field_names().collect();
        assert_eq!(names, vec!["title", "author", "comments"]);
    }

    #[test]
    fn concurrent_first_describe_converges_on_one_descriptor() {
        let registry = Arc::new(registry_with(vec![user_view()]).expect("registry"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.describe(&ViewTypeId::from("UserView")).expect("describe"))
            })
            .collect();
        let descriptors: Vec<_> = handles.into_iter().map(|handle| handle.join().expect("join")).collect();
        let cached = registry.describe(&ViewTypeId::from("UserView")).expect("describe");

        assert!(descriptors.iter().all(|descriptor| Arc::ptr_eq(descriptor, &cached)));
    }

    #[test]
    fn unknown_view_type_is_a_configuration_error() {
        let registry = registry_with(vec![user_view()]).expect("registry");
        let error = registry.describe(&ViewTypeId::from("GhostView")).unwrap_err();
        assert!(matches!(error, ConfigurationError::UnknownViewType { .. }));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let error = registry_with(vec![user_view(), user_view()]).unwrap_err();
        assert!(matches!(error, ConfigurationError::DuplicateView { ref view_type } if view_type == "UserView"));
    }

    #[test]
    fn include_and_exclude_together_are_rejected() {
        let post = ViewDefinition::new("PostView").field(
            FieldBinding::nested("author", "UserView")
                .include(["id"])
                .exclude(["email"]),
        );
        let registry = registry_with(vec![user_view(), post]).expect("registry");
        let error = registry.describe(&ViewTypeId::from("PostView")).unwrap_err();
        assert!(matches!(error, ConfigurationError::ConflictingProjection { ref field, .. } if field == "author"));
    }

    #[test]
    fn projection_must_name_declared_fields() {
        let post = ViewDefinition::new("PostView").field(FieldBinding::nested("author", "UserView").include(["nickname"]));
        let registry = registry_with(vec![user_view(), post]).expect("registry");
        let error = registry.describe(&ViewTypeId::from("PostView")).unwrap_err();
        assert!(matches!(error, ConfigurationError::UnknownProjectedField { ref projected, .. } if projected == "nickname"));
    }

    #[test]
    fn projection_on_plain_field_is_rejected() {
        let view = ViewDefinition::new("TagView").field(FieldBinding::value("label").include(["x"]));
        let registry = registry_with(vec![view]).expect("registry");
        let error = registry.describe(&ViewTypeId::from("TagView")).unwrap_err();
        assert!(matches!(error, ConfigurationError::ProjectionWithoutNestedView { .. }));
    }

    #[test]
    fn nested_views_must_be_registered() {
        let registry = registry_with(vec![post_view()]).expect("registry");
        let error = registry.describe(&ViewTypeId::from("PostView")).unwrap_err();
        assert!(matches!(error, ConfigurationError::UnknownNestedView { ref nested_view, .. } if nested_view == "UserView"));
    }

    #[test]
    fn enrichment_cannot_target_view_fields() {
        let view = ViewDefinition::new("PostView").field(FieldBinding::nested("author", "UserView").enrich("users"));
        let registry = registry_with(vec![user_view(), view]).expect("registry");
        let error = registry.describe(&ViewTypeId::from("PostView")).unwrap_err();
        assert!(matches!(error, ConfigurationError::EnrichmentOnViewField { ref function, .. } if function == "users"));
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let view = ViewDefinition::new("TagView")
            .field(FieldBinding::value("label"))
            .field(FieldBinding::value("label").source("name"));
        let registry = registry_with(vec![view]).expect("registry");
        assert!(matches!(
            registry.describe(&ViewTypeId::from("TagView")),
            Err(ConfigurationError::DuplicateField { .. })
        ));
    }

    #[test]
    fn polymorphic_targets_must_be_registered() {
        let content = ViewDefinition::new("ContentView")
            .field(FieldBinding::value("id"))
            .polymorphic(PolymorphicTable::new().map(&VIDEO, "VideoView").fallback("ContentView"));
        let registry = registry_with(vec![content]).expect("registry");
        let error = registry.describe(&ViewTypeId::from("ContentView")).unwrap_err();
        assert!(matches!(
            error,
            ConfigurationError::UnknownPolymorphicTarget { ref entity_type, ref target, .. }
                if entity_type == "Video" && target == "VideoView"
        ));
    }

    #[test]
    fn describe_all_reports_first_invalid_definition() {
        let registry = registry_with(vec![user_view(), post_view()]).expect("registry");
        assert!(registry.describe_all().is_ok());

        let broken = ViewDefinition::new("BrokenView").field(FieldBinding::value(" "));
        let registry = registry_with(vec![user_view(), broken]).expect("registry");
        assert!(matches!(registry.describe_all(), Err(ConfigurationError::EmptyFieldName { .. })));
    }
}
