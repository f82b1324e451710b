use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::binding_parser::{
    DerivedExpression, JoinPredicate, JsonPathBinding, JsonRoot, PathSegment,
};
use super::class_model::ClassModel;
use super::data_types::{PhysicalType, SemanticType};
use super::errors::MappingError;

/// Relational backend a mapping targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DatabaseType {
    #[default]
    Snowflake,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Snowflake => write!(f, "Snowflake"),
        }
    }
}

/// Temporal dimension of a milestoned table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoningDimension {
    Business,
    Processing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Milestoning {
    pub dimension: MilestoningDimension,
    pub from_column: String,
    pub thru_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStore {
    /// Schema-qualified table name, emitted verbatim
    pub name: String,
    pub primary_key: Vec<String>,
    pub milestoning: Vec<Milestoning>,
}

/// Entity whose rows are versioned; joins read only the latest version per key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionedView {
    pub table: String,
    pub key_columns: Vec<String>,
    pub version_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRef {
    Table(TableStore),
    VersionedView(VersionedView),
    /// Class that only exists inside semi-structured documents
    Embedded,
}

impl StoreRef {
    pub fn table_name(&self) -> Option<&str> {
        match self {
            StoreRef::Table(t) => Some(&t.name),
            StoreRef::VersionedView(v) => Some(&v.table),
            StoreRef::Embedded => None,
        }
    }

    pub fn primary_key(&self) -> &[String] {
        match self {
            StoreRef::Table(t) => &t.primary_key,
            StoreRef::VersionedView(v) => &v.key_columns,
            StoreRef::Embedded => &[],
        }
    }

    pub fn milestoning(&self) -> &[Milestoning] {
        match self {
            StoreRef::Table(t) => &t.milestoning,
            _ => &[],
        }
    }
}

/// One-to-many relationship stored inside the target's document.
///
/// Target rows carry an array at `array_path`; elements whose `tag_field`
/// equals `tag_value` reference the origin through `id_field`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplosionBinding {
    pub target_class: String,
    pub array_path: JsonPathBinding,
    pub tag_field: Option<String>,
    pub tag_value: Option<String>,
    pub id_field: String,
    pub id_type: SemanticType,
    /// Origin column matched against the element id
    pub origin_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    Column {
        column: String,
        physical_type: Option<PhysicalType>,
    },
    JsonPath(JsonPathBinding),
    Association {
        target_class: String,
        predicate: JoinPredicate,
    },
    Explosion(ExplosionBinding),
    Derived(DerivedExpression),
}

impl Binding {
    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Column { .. } => "column",
            Binding::JsonPath(_) => "json_path",
            Binding::Association { .. } => "association",
            Binding::Explosion(_) => "explosion",
            Binding::Derived(_) => "derived",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMapping {
    pub class: String,
    pub store: StoreRef,
    pub properties: HashMap<String, Binding>,
}

impl ClassMapping {
    pub fn new(class: impl Into<String>, store: StoreRef) -> Self {
        ClassMapping {
            class: class.into(),
            store,
            properties: HashMap::new(),
        }
    }

    pub fn with_binding(mut self, property: impl Into<String>, binding: Binding) -> Self {
        self.properties.insert(property.into(), binding);
        self
    }
}

/// A binding as seen by the compiler: either declared or implied by the
/// property name for embedded classes.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBinding<'a> {
    Declared(&'a Binding),
    /// `['propertyName']` inside the enclosing document
    ImplicitKey(JsonPathBinding),
}

/// The mapping binding table: class -> store, (class, property) -> binding.
#[derive(Debug, Clone, Default)]
pub struct MappingSchema {
    name: String,
    database_type: DatabaseType,
    classes: HashMap<String, ClassMapping>,
}

impl MappingSchema {
    pub fn new(name: impl Into<String>, database_type: DatabaseType) -> Self {
        MappingSchema {
            name: name.into(),
            database_type,
            classes: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    pub fn add_class_mapping(&mut self, mapping: ClassMapping) -> Result<(), MappingError> {
        if self.classes.contains_key(&mapping.class) {
            return Err(MappingError::config_error_with_context(
                format!("duplicate class mapping for {}", mapping.class),
                format!("While building mapping '{}'", self.name),
            ));
        }
        self.classes.insert(mapping.class.clone(), mapping);
        Ok(())
    }

    pub fn with_class_mapping(mut self, mapping: ClassMapping) -> Result<Self, MappingError> {
        self.add_class_mapping(mapping)?;
        Ok(self)
    }

    pub fn class_mappings(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.values()
    }

    /// Mapping of the class or its nearest mapped ancestor.
    pub fn class_mapping(
        &self,
        class: &str,
        model: &ClassModel,
    ) -> Result<&ClassMapping, MappingError> {
        if let Some(mapping) = self.classes.get(class) {
            return Ok(mapping);
        }
        for ancestor in model.lineage(class)?.into_iter().skip(1) {
            if let Some(mapping) = self.classes.get(&ancestor.path) {
                return Ok(mapping);
            }
        }
        Err(MappingError::UnmappedClass {
            class: class.to_string(),
        })
    }

    /// Store of a class that must live in a table.
    pub fn table_store(&self, class: &str, model: &ClassModel) -> Result<&StoreRef, MappingError> {
        let mapping = self.class_mapping(class, model)?;
        match mapping.store {
            StoreRef::Embedded => Err(MappingError::UnmappedClass {
                class: class.to_string(),
            }),
            _ => Ok(&mapping.store),
        }
    }

    /// Binding of `property` as seen from `class`.
    ///
    /// Looks at the class mapping and then at mapped ancestors. Classes
    /// reached inside a document (`in_document`) fall back to an implicit
    /// key named after the property.
    pub fn binding<'a>(
        &'a self,
        class: &str,
        property: &str,
        model: &ClassModel,
        in_document: bool,
    ) -> Result<ResolvedBinding<'a>, MappingError> {
        // The property must exist in the model first
        model.find_property(class, property)?;

        for owner in model.lineage(class)? {
            if let Some(binding) = self
                .classes
                .get(&owner.path)
                .and_then(|m| m.properties.get(property))
            {
                return Ok(ResolvedBinding::Declared(binding));
            }
        }

        if in_document {
            return Ok(ResolvedBinding::ImplicitKey(JsonPathBinding {
                root: JsonRoot::Context,
                segments: vec![PathSegment::Key(property.to_string())],
            }));
        }

        Err(MappingError::unmapped_property(class, property))
    }

    /// Check every binding against the class model.
    pub fn validate(&self, model: &ClassModel) -> Result<(), MappingError> {
        for mapping in self.classes.values() {
            model.get_class(&mapping.class)?;
            let embedded = mapping.store == StoreRef::Embedded;

            if let StoreRef::VersionedView(view) = &mapping.store {
                if view.key_columns.is_empty() {
                    return Err(MappingError::config_error_with_context(
                        format!("versioned view on {} declares no key columns", view.table),
                        format!("Class {}", mapping.class),
                    ));
                }
            }

            for (property, binding) in &mapping.properties {
                let (_, def) = model.find_property(&mapping.class, property)?;
                match binding {
                    Binding::Column { .. } if embedded => {
                        return Err(MappingError::invalid_binding(
                            &mapping.class,
                            property,
                            "column binding on an embedded class",
                        ));
                    }
                    Binding::JsonPath(path) => match (&path.root, embedded) {
                        (JsonRoot::Column(_), true) => {
                            return Err(MappingError::invalid_binding(
                                &mapping.class,
                                property,
                                "embedded classes bind relative paths such as ['key']",
                            ));
                        }
                        (JsonRoot::Context, false) => {
                            return Err(MappingError::invalid_binding(
                                &mapping.class,
                                property,
                                "table-mapped classes bind paths rooted at a column",
                            ));
                        }
                        _ => {}
                    },
                    Binding::Association { target_class, .. } => {
                        model.get_class(target_class)?;
                        if def.ty.class_path() != Some(target_class.as_str())
                            && !def
                                .ty
                                .class_path()
                                .map(|t| model.is_subtype_of(target_class, t))
                                .unwrap_or(false)
                        {
                            return Err(MappingError::invalid_binding(
                                &mapping.class,
                                property,
                                format!(
                                    "association targets {} but the property is typed {}",
                                    target_class, def.ty
                                ),
                            ));
                        }
                    }
                    Binding::Explosion(explosion) => {
                        if embedded {
                            return Err(MappingError::invalid_binding(
                                &mapping.class,
                                property,
                                "explosions start from a table-mapped class",
                            ));
                        }
                        if !matches!(explosion.array_path.root, JsonRoot::Column(_)) {
                            return Err(MappingError::invalid_binding(
                                &mapping.class,
                                property,
                                "explosion array path must be rooted at a target column",
                            ));
                        }
                        model.get_class(&explosion.target_class)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
