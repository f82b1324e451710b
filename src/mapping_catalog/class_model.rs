//! Class model: classes, inheritance and property declarations.
//!
//! The model is read-only during compilation. Classes keep their declaration
//! order, which is the order subtype dispatch enumerates descendants in.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::data_types::SemanticType;
use super::errors::MappingError;

/// How a concrete class is spelled in a document's discriminator field
/// when it carries no explicit type alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorStyle {
    /// `Dog`
    #[default]
    ShortName,
    /// `model::animals::Dog`
    FullPath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: String,
    pub ty: SemanticType,
    pub is_collection: bool,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, ty: SemanticType) -> Self {
        PropertyDef {
            name: name.into(),
            ty,
            is_collection: false,
        }
    }

    pub fn many(name: impl Into<String>, ty: SemanticType) -> Self {
        PropertyDef {
            name: name.into(),
            ty,
            is_collection: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub path: String,
    pub parent: Option<String>,
    pub is_abstract: bool,
    /// Custom discriminator literal for this class
    pub type_alias: Option<String>,
    /// Discriminator field for this class and its descendants
    pub discriminator_field: Option<String>,
    pub discriminator_style: Option<DiscriminatorStyle>,
    pub properties: Vec<PropertyDef>,
}

impl ClassDef {
    pub fn new(path: impl Into<String>) -> Self {
        ClassDef {
            path: path.into(),
            parent: None,
            is_abstract: false,
            type_alias: None,
            discriminator_field: None,
            discriminator_style: None,
            properties: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_type_alias(mut self, alias: impl Into<String>) -> Self {
        self.type_alias = Some(alias.into());
        self
    }

    pub fn with_discriminator_field(mut self, field: impl Into<String>) -> Self {
        self.discriminator_field = Some(field.into());
        self
    }

    pub fn with_discriminator_style(mut self, style: DiscriminatorStyle) -> Self {
        self.discriminator_style = Some(style);
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn short_name(&self) -> &str {
        short_name(&self.path)
    }

    pub fn own_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Last `::` segment of a fully qualified path.
pub fn short_name(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub path: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassModel {
    classes: Vec<ClassDef>,
    enums: Vec<EnumDef>,
    index: HashMap<String, usize>,
}

impl ClassModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: ClassDef) -> Result<(), MappingError> {
        if self.index.contains_key(&class.path) || self.find_enum(&class.path).is_some() {
            return Err(MappingError::invalid_model(format!(
                "duplicate type declaration `{}`",
                class.path
            )));
        }
        self.index.insert(class.path.clone(), self.classes.len());
        self.classes.push(class);
        Ok(())
    }

    pub fn add_enum(&mut self, def: EnumDef) -> Result<(), MappingError> {
        if self.index.contains_key(&def.path) || self.find_enum(&def.path).is_some() {
            return Err(MappingError::invalid_model(format!(
                "duplicate type declaration `{}`",
                def.path
            )));
        }
        self.enums.push(def);
        Ok(())
    }

    /// Builder-style variant of [`ClassModel::add_class`] for fixtures.
    pub fn with_class(mut self, class: ClassDef) -> Result<Self, MappingError> {
        self.add_class(class)?;
        Ok(self)
    }

    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    pub fn find_class(&self, path: &str) -> Option<&ClassDef> {
        self.index.get(path).map(|&i| &self.classes[i])
    }

    pub fn get_class(&self, path: &str) -> Result<&ClassDef, MappingError> {
        self.find_class(path).ok_or_else(|| MappingError::UnknownClass {
            class: path.to_string(),
        })
    }

    pub fn find_enum(&self, path: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.path == path)
    }

    /// Resolve a declared type name: primitive, enum or class.
    pub fn resolve_type_name(&self, name: &str) -> Result<SemanticType, MappingError> {
        if let Some(primitive) = SemanticType::primitive(name) {
            return Ok(primitive);
        }
        if self.find_enum(name).is_some() {
            return Ok(SemanticType::Enum(name.to_string()));
        }
        if self.find_class(name).is_some() {
            return Ok(SemanticType::Class(name.to_string()));
        }
        Err(MappingError::UnknownClass {
            class: name.to_string(),
        })
    }

    /// The class itself followed by its ancestors, nearest first.
    pub fn lineage(&self, path: &str) -> Result<Vec<&ClassDef>, MappingError> {
        let mut chain = Vec::new();
        let mut current = Some(path);
        while let Some(p) = current {
            let class = self.get_class(p)?;
            if chain.iter().any(|c: &&ClassDef| c.path == class.path) {
                return Err(MappingError::invalid_model(format!(
                    "inheritance cycle through `{}`",
                    class.path
                )));
            }
            chain.push(class);
            current = class.parent.as_deref();
        }
        Ok(chain)
    }

    /// Find a property on the class or the nearest ancestor declaring it.
    ///
    /// Returns the declaring class with the property.
    pub fn find_property(
        &self,
        class: &str,
        property: &str,
    ) -> Result<(&ClassDef, &PropertyDef), MappingError> {
        for owner in self.lineage(class)? {
            if let Some(def) = owner.own_property(property) {
                return Ok((owner, def));
            }
        }
        Err(MappingError::UnknownProperty {
            class: class.to_string(),
            property: property.to_string(),
        })
    }

    /// Reflexive subtype check.
    pub fn is_subtype_of(&self, sub: &str, sup: &str) -> bool {
        match self.lineage(sub) {
            Ok(chain) => chain.iter().any(|c| c.path == sup),
            Err(_) => false,
        }
    }

    /// Direct children, in declaration order.
    pub fn children(&self, path: &str) -> Vec<&ClassDef> {
        self.classes
            .iter()
            .filter(|c| c.parent.as_deref() == Some(path))
            .collect()
    }

    /// All descendants in pre-order, children visited in declaration order.
    pub fn descendants(&self, path: &str) -> Vec<&ClassDef> {
        let mut out = Vec::new();
        self.collect_descendants(path, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, path: &str, out: &mut Vec<&'a ClassDef>) {
        for child in self.children(path) {
            // Guard against cycles; validate() reports them.
            if out.iter().any(|c| c.path == child.path) {
                continue;
            }
            out.push(child);
            self.collect_descendants(&child.path, out);
        }
    }

    /// Check parents exist, inheritance is acyclic and property types resolve.
    pub fn validate(&self) -> Result<(), MappingError> {
        for class in &self.classes {
            if let Some(parent) = &class.parent {
                if self.find_class(parent).is_none() {
                    return Err(MappingError::invalid_model(format!(
                        "class `{}` extends unknown class `{}`",
                        class.path, parent
                    )));
                }
            }
            self.lineage(&class.path)?;

            for property in &class.properties {
                let known = match &property.ty {
                    SemanticType::Class(p) => self.find_class(p).is_some(),
                    SemanticType::Enum(p) => self.find_enum(p).is_some(),
                    _ => true,
                };
                if !known {
                    return Err(MappingError::invalid_model(format!(
                        "property `{}.{}` has unknown type `{}`",
                        class.path, property.name, property.ty
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animals() -> ClassModel {
        let mut model = ClassModel::new();
        model
            .add_class(
                ClassDef::new("zoo::Animal")
                    .abstract_class()
                    .with_property(PropertyDef::new("name", SemanticType::String)),
            )
            .unwrap();
        model
            .add_class(ClassDef::new("zoo::Mammal").with_parent("zoo::Animal"))
            .unwrap();
        model
            .add_class(
                ClassDef::new("zoo::Dog")
                    .with_parent("zoo::Mammal")
                    .with_property(PropertyDef::new("barks", SemanticType::Boolean)),
            )
            .unwrap();
        model
            .add_class(ClassDef::new("zoo::Bird").with_parent("zoo::Animal"))
            .unwrap();
        model
            .add_class(ClassDef::new("zoo::Cat").with_parent("zoo::Mammal"))
            .unwrap();
        model
    }

    #[test]
    fn test_inherited_property_lookup() {
        let model = animals();
        let (owner, prop) = model.find_property("zoo::Dog", "name").unwrap();
        assert_eq!(owner.path, "zoo::Animal");
        assert_eq!(prop.ty, SemanticType::String);
    }

    #[test]
    fn test_unknown_property_names_class() {
        let model = animals();
        let err = model.find_property("zoo::Bird", "barks").unwrap_err();
        assert_eq!(
            err,
            MappingError::UnknownProperty {
                class: "zoo::Bird".into(),
                property: "barks".into()
            }
        );
    }

    #[test]
    fn test_descendants_preorder_declaration_order() {
        let model = animals();
        let names: Vec<&str> = model
            .descendants("zoo::Animal")
            .iter()
            .map(|c| c.short_name())
            .collect();
        assert_eq!(names, vec!["Mammal", "Dog", "Cat", "Bird"]);
    }

    #[test]
    fn test_subtype_is_reflexive() {
        let model = animals();
        assert!(model.is_subtype_of("zoo::Dog", "zoo::Dog"));
        assert!(model.is_subtype_of("zoo::Dog", "zoo::Animal"));
        assert!(!model.is_subtype_of("zoo::Animal", "zoo::Dog"));
    }

    #[test]
    fn test_validate_rejects_unknown_parent() {
        let mut model = ClassModel::new();
        model
            .add_class(ClassDef::new("a::B").with_parent("a::Missing"))
            .unwrap();
        assert!(matches!(
            model.validate(),
            Err(MappingError::InvalidModel { .. })
        ));
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let mut model = animals();
        assert!(model.add_class(ClassDef::new("zoo::Dog")).is_err());
    }
}
