//! Loading the person mapping fixture into a class model and binding table.

#[cfg(test)]
mod mapping_document_tests {
    use std::path::PathBuf;

    use relplan::mapping_catalog::mapping_schema::{Binding, ResolvedBinding};
    use relplan::mapping_catalog::{MappingDocument, MappingError, SemanticType, TypeTaxonomy};

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    fn load() -> relplan::MappingCatalog {
        MappingDocument::from_yaml_file(fixture("person_mapping.yaml"))
            .expect("mapping parses")
            .to_catalog()
            .expect("mapping builds")
    }

    #[test]
    fn test_fixture_loads() {
        let catalog = load();
        assert_eq!(catalog.schema.name(), "person_mapping");
        assert!(catalog.model.find_class("model::Kitten").is_some());

        let (_, pets) = catalog
            .model
            .find_property("model::Person", "pets")
            .unwrap();
        assert!(pets.is_collection);
        assert_eq!(pets.ty, SemanticType::Class("model::Animal".into()));
    }

    #[test]
    fn test_store_kinds() {
        let catalog = load();
        let car = catalog
            .schema
            .table_store("model::Car", &catalog.model)
            .unwrap();
        assert_eq!(car.table_name(), Some("CAR_SCHEMA.CAR_TABLE"));

        let employer = catalog
            .schema
            .table_store("model::Employer", &catalog.model)
            .unwrap();
        assert_eq!(employer.milestoning().len(), 1);

        assert!(matches!(
            catalog.schema.table_store("model::Firm", &catalog.model),
            Err(MappingError::UnmappedClass { .. })
        ));
    }

    #[test]
    fn test_document_properties_fall_back_to_keys() {
        let catalog = load();
        let binding = catalog
            .schema
            .binding("model::Firm", "employeeCount", &catalog.model, true)
            .unwrap();
        assert!(matches!(binding, ResolvedBinding::ImplicitKey(_)));

        let declared = catalog
            .schema
            .binding("model::Person", "manager", &catalog.model, false)
            .unwrap();
        assert!(matches!(
            declared,
            ResolvedBinding::Declared(Binding::Association { .. })
        ));
    }

    #[test]
    fn test_unmapped_table_property() {
        let catalog = load();
        let err = catalog
            .schema
            .binding("model::Person", "nickname", &catalog.model, false)
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::UnmappedProperty {
                class: "model::Person".into(),
                property: "nickname".into(),
            }
        );
    }

    #[test]
    fn test_pet_taxonomy() {
        let catalog = load();
        let taxonomy = TypeTaxonomy::build(&catalog.model, "@type").unwrap();

        assert_eq!(taxonomy.discriminator_field("model::Dog").unwrap(), "_type");
        assert_eq!(taxonomy.literal_for("model::Animal").unwrap(), None);
        assert_eq!(taxonomy.literal_for("model::Kitten").unwrap(), Some("KITTEN"));
        assert_eq!(
            taxonomy.dispatch_literals("model::Animal").unwrap(),
            vec!["Dog", "Cat", "KITTEN"]
        );
        assert_eq!(
            taxonomy.class_for_literal("model::Dog", "KITTEN"),
            Some("model::Kitten")
        );
    }

    #[test]
    fn test_missing_file() {
        let err = MappingDocument::from_yaml_file(fixture("no_such_mapping.yaml")).unwrap_err();
        assert!(matches!(err, MappingError::ConfigReadError { .. }));
    }
}
