use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use super::binding_parser::{parse_derived_expression, parse_join_predicate, parse_json_path};
use super::class_model::{ClassDef, ClassModel, DiscriminatorStyle, EnumDef, PropertyDef};
use super::data_types::{PhysicalType, SemanticType};
use super::errors::MappingError;
use super::mapping_schema::{
    Binding, ClassMapping, DatabaseType, ExplosionBinding, MappingSchema, Milestoning,
    MilestoningDimension, StoreRef, TableStore, VersionedView,
};

/// Mapping document loaded from YAML
///
/// ```yaml
/// name: person_mapping
/// database_type: Snowflake
/// model:
///   classes:
///     - path: model::Person
///       properties:
///         - { name: firstName, type: String }
///         - { name: firm, type: model::Firm }
/// mappings:
///   - class: model::Person
///     table: PERSON_SCHEMA.PERSON_TABLE
///     primary_key: [ID]
///     properties:
///       firstName: { column: FIRSTNAME, type: "VARCHAR(100)" }
///       firm: { json: FIRM_DETAILS }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingDocument {
    pub name: String,
    #[serde(default)]
    pub database_type: DatabaseType,
    pub model: ModelDefinition,
    #[serde(default)]
    pub mappings: Vec<ClassMappingDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub classes: Vec<ClassDefinition>,
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub path: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Custom discriminator literal
    #[serde(default)]
    pub type_alias: Option<String>,
    /// Discriminator field for this class and its subtypes (`@type` otherwise)
    #[serde(default)]
    pub discriminator_field: Option<String>,
    #[serde(default)]
    pub discriminator_style: Option<DiscriminatorStyle>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// `one` (default) or `many`
    #[serde(default = "default_multiplicity")]
    pub multiplicity: String,
}

fn default_multiplicity() -> String {
    "one".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDefinition {
    pub path: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMappingDefinition {
    pub class: String,
    /// Base table, schema-qualified
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub versioned_view: Option<VersionedViewDefinition>,
    /// Class lives only inside documents of other classes
    #[serde(default)]
    pub embedded: bool,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub milestoning: Vec<MilestoningDefinition>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyBindingDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedViewDefinition {
    pub table: String,
    pub key_columns: Vec<String>,
    pub version_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoningDefinition {
    pub dimension: MilestoningDimension,
    pub from: String,
    pub thru: String,
}

/// One property binding. Exactly one of `column`, `json`, `association`,
/// `explosion` or `derived` must be set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PropertyBindingDefinition {
    #[serde(default)]
    pub column: Option<String>,
    /// Declared physical type of a column (`VARCHAR(100)`)
    #[serde(default, rename = "type")]
    pub physical_type: Option<String>,
    /// JSON path: `FIRM_DETAILS['legalName']` or `['legalName']`
    #[serde(default)]
    pub json: Option<String>,
    /// Target class of an association
    #[serde(default)]
    pub association: Option<String>,
    /// Join predicate template of an association
    #[serde(default)]
    pub on: Option<String>,
    /// Target class of an explosion
    #[serde(default)]
    pub explosion: Option<String>,
    #[serde(default)]
    pub array: Option<String>,
    #[serde(default)]
    pub tag_field: Option<String>,
    #[serde(default)]
    pub tag_value: Option<String>,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub id_type: Option<String>,
    #[serde(default)]
    pub origin_key: Option<String>,
    /// Derived expression: `concat(firstName, ' ', lastName)`
    #[serde(default)]
    pub derived: Option<String>,
}

/// Class model plus binding table, ready for compilation
#[derive(Debug, Clone)]
pub struct MappingCatalog {
    pub model: ClassModel,
    pub schema: MappingSchema,
}

impl MappingDocument {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let contents = fs::read_to_string(path).map_err(|e| MappingError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, MappingError> {
        serde_yaml::from_str(yaml).map_err(|e| MappingError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Build the class model and the binding table, parsing every binding
    /// string once.
    pub fn to_catalog(&self) -> Result<MappingCatalog, MappingError> {
        let model = self.build_model()?;
        let schema = self.build_schema(&model)?;
        log::info!(
            "Loaded mapping '{}': {} classes, {} class mappings",
            self.name,
            model.classes().len(),
            self.mappings.len()
        );
        Ok(MappingCatalog { model, schema })
    }

    fn build_model(&self) -> Result<ClassModel, MappingError> {
        let mut model = ClassModel::new();
        for def in &self.model.enums {
            model.add_enum(EnumDef {
                path: def.path.clone(),
                values: def.values.clone(),
            })?;
        }
        // Register classes first so property types may reference any class
        for def in &self.model.classes {
            let mut class = ClassDef::new(&def.path);
            class.parent = def.parent.clone();
            class.is_abstract = def.is_abstract;
            class.type_alias = def.type_alias.clone();
            class.discriminator_field = def.discriminator_field.clone();
            class.discriminator_style = def.discriminator_style;
            model.add_class(class)?;
        }

        let mut resolved: Vec<(String, Vec<PropertyDef>)> = Vec::new();
        for def in &self.model.classes {
            let mut properties = Vec::with_capacity(def.properties.len());
            let mut seen = HashSet::new();
            for prop in &def.properties {
                if !seen.insert(prop.name.as_str()) {
                    return Err(MappingError::invalid_model(format!(
                        "duplicate property `{}` on `{}`",
                        prop.name, def.path
                    )));
                }
                let ty = model.resolve_type_name(&prop.type_name).map_err(|_| {
                    MappingError::invalid_model(format!(
                        "property `{}.{}` has unknown type `{}`",
                        def.path, prop.name, prop.type_name
                    ))
                })?;
                let is_collection = match prop.multiplicity.as_str() {
                    "one" | "0..1" | "1" => false,
                    "many" | "*" | "0..*" | "1..*" => true,
                    other => {
                        return Err(MappingError::invalid_model(format!(
                            "property `{}.{}` has unknown multiplicity `{}`",
                            def.path, prop.name, other
                        )))
                    }
                };
                properties.push(PropertyDef {
                    name: prop.name.clone(),
                    ty,
                    is_collection,
                });
            }
            resolved.push((def.path.clone(), properties));
        }

        let mut final_model = ClassModel::new();
        for def in &self.model.enums {
            final_model.add_enum(EnumDef {
                path: def.path.clone(),
                values: def.values.clone(),
            })?;
        }
        for (class, (_, properties)) in model.classes().iter().zip(resolved) {
            let mut class = class.clone();
            class.properties = properties;
            final_model.add_class(class)?;
        }
        final_model.validate()?;
        Ok(final_model)
    }

    fn build_schema(&self, model: &ClassModel) -> Result<MappingSchema, MappingError> {
        let mut schema = MappingSchema::new(&self.name, self.database_type);
        for def in &self.mappings {
            let context = format!("While loading mapping for class {}", def.class);
            let store = Self::build_store(def).map_err(|m| {
                MappingError::config_error_with_context(m, context.clone())
            })?;
            let mut mapping = ClassMapping::new(&def.class, store);
            for (property, binding_def) in &def.properties {
                let binding = Self::build_binding(&def.class, property, binding_def)?;
                mapping.properties.insert(property.clone(), binding);
            }
            schema.add_class_mapping(mapping)?;
        }
        schema.validate(model)?;
        Ok(schema)
    }

    fn build_store(def: &ClassMappingDefinition) -> Result<StoreRef, String> {
        let declared = [def.table.is_some(), def.versioned_view.is_some(), def.embedded]
            .iter()
            .filter(|b| **b)
            .count();
        if declared != 1 {
            return Err(
                "exactly one of `table`, `versioned_view` or `embedded: true` is required"
                    .to_string(),
            );
        }

        if let Some(view) = &def.versioned_view {
            return Ok(StoreRef::VersionedView(VersionedView {
                table: view.table.clone(),
                key_columns: view.key_columns.clone(),
                version_column: view.version_column.clone(),
            }));
        }

        match &def.table {
            Some(table) => Ok(StoreRef::Table(TableStore {
                name: table.clone(),
                primary_key: def.primary_key.clone(),
                milestoning: def
                    .milestoning
                    .iter()
                    .map(|m| Milestoning {
                        dimension: m.dimension,
                        from_column: m.from.clone(),
                        thru_column: m.thru.clone(),
                    })
                    .collect(),
            })),
            None => Ok(StoreRef::Embedded),
        }
    }

    fn build_binding(
        class: &str,
        property: &str,
        def: &PropertyBindingDefinition,
    ) -> Result<Binding, MappingError> {
        let kinds = [
            def.column.is_some(),
            def.json.is_some(),
            def.association.is_some(),
            def.explosion.is_some(),
            def.derived.is_some(),
        ];
        if kinds.iter().filter(|k| **k).count() != 1 {
            return Err(MappingError::invalid_binding(
                class,
                property,
                "exactly one of column, json, association, explosion or derived is required",
            ));
        }
        let invalid = |message: String| MappingError::invalid_binding(class, property, message);

        if let Some(column) = &def.column {
            let physical_type = def
                .physical_type
                .as_deref()
                .map(str::parse::<PhysicalType>)
                .transpose()
                .map_err(invalid)?;
            return Ok(Binding::Column {
                column: column.clone(),
                physical_type,
            });
        }

        if let Some(json) = &def.json {
            return parse_json_path(json).map(Binding::JsonPath).map_err(invalid);
        }

        if let Some(target) = &def.association {
            let on = def
                .on
                .as_deref()
                .ok_or_else(|| invalid("association requires an `on` predicate".to_string()))?;
            let predicate = parse_join_predicate(on).map_err(invalid)?;
            return Ok(Binding::Association {
                target_class: target.clone(),
                predicate,
            });
        }

        if let Some(target) = &def.explosion {
            let array = def
                .array
                .as_deref()
                .ok_or_else(|| invalid("explosion requires an `array` path".to_string()))?;
            let array_path = parse_json_path(array).map_err(invalid)?;
            let id_type = match def.id_type.as_deref() {
                Some(name) => SemanticType::primitive(name)
                    .ok_or_else(|| invalid(format!("unknown id type `{}`", name)))?,
                None => SemanticType::Integer,
            };
            if def.tag_field.is_some() != def.tag_value.is_some() {
                return Err(invalid(
                    "`tag_field` and `tag_value` must be given together".to_string(),
                ));
            }
            return Ok(Binding::Explosion(ExplosionBinding {
                target_class: target.clone(),
                array_path,
                tag_field: def.tag_field.clone(),
                tag_value: def.tag_value.clone(),
                id_field: def.id_field.clone().unwrap_or_else(|| "id".to_string()),
                id_type,
                origin_key: def.origin_key.clone().unwrap_or_else(|| "ID".to_string()),
            }));
        }

        match &def.derived {
            Some(expr) => parse_derived_expression(expr)
                .map(Binding::Derived)
                .map_err(invalid),
            None => Err(invalid("empty binding".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
name: people
model:
  classes:
    - path: model::Person
      properties:
        - { name: firstName, type: String }
        - { name: firm, type: model::Firm }
        - { name: manager, type: model::Person }
        - { name: nicknames, type: String, multiplicity: many }
    - path: model::Firm
      properties:
        - { name: legalName, type: String }
mappings:
  - class: model::Person
    table: PERSON_SCHEMA.PERSON_TABLE
    primary_key: [ID]
    properties:
      firstName: { column: FIRSTNAME, type: "VARCHAR(100)" }
      firm: { json: FIRM_DETAILS }
      manager: { association: model::Person, on: "source.MANAGERID = target.ID" }
      nicknames: { json: "DETAILS['nicknames']" }
  - class: model::Firm
    embedded: true
"#;

    #[test]
    fn test_load_document() {
        let doc = MappingDocument::from_yaml_str(DOC).unwrap();
        assert_eq!(doc.database_type, DatabaseType::Snowflake);
        let catalog = doc.to_catalog().unwrap();
        let (_, nick) = catalog
            .model
            .find_property("model::Person", "nicknames")
            .unwrap();
        assert!(nick.is_collection);
        let store = catalog
            .schema
            .table_store("model::Person", &catalog.model)
            .unwrap();
        assert_eq!(store.table_name(), Some("PERSON_SCHEMA.PERSON_TABLE"));
    }

    #[test]
    fn test_column_type_parsed() {
        let catalog = MappingDocument::from_yaml_str(DOC)
            .unwrap()
            .to_catalog()
            .unwrap();
        let mapping = catalog
            .schema
            .class_mapping("model::Person", &catalog.model)
            .unwrap();
        assert_eq!(
            mapping.properties.get("firstName"),
            Some(&Binding::Column {
                column: "FIRSTNAME".into(),
                physical_type: Some(PhysicalType::Varchar(Some(100))),
            })
        );
    }

    #[test]
    fn test_two_binding_kinds_rejected() {
        let def = PropertyBindingDefinition {
            column: Some("A".into()),
            json: Some("B['x']".into()),
            ..Default::default()
        };
        let err = MappingDocument::build_binding("m::X", "p", &def).unwrap_err();
        assert!(matches!(err, MappingError::InvalidBinding { .. }));
    }

    #[test]
    fn test_bad_predicate_reports_property() {
        let def = PropertyBindingDefinition {
            association: Some("m::Y".into()),
            on: Some("source.A ==".into()),
            ..Default::default()
        };
        match MappingDocument::build_binding("m::X", "y", &def) {
            Err(MappingError::InvalidBinding {
                class, property, ..
            }) => {
                assert_eq!(class, "m::X");
                assert_eq!(property, "y");
            }
            other => panic!("expected InvalidBinding, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_property_type() {
        let yaml = DOC.replace("type: model::Firm", "type: model::Missing");
        let err = MappingDocument::from_yaml_str(&yaml)
            .unwrap()
            .to_catalog()
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidModel { .. }));
    }

    #[test]
    fn test_store_must_be_declared_once() {
        let yaml = DOC.replace("    embedded: true\n", "");
        let err = MappingDocument::from_yaml_str(&yaml)
            .unwrap()
            .to_catalog()
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidConfig { .. }));
    }
}
