//! Discriminator lookup table for polymorphic documents.
//!
//! Built once per compilation from the class model. Answers three questions
//! for type dispatch: which literal is stored for a class, which literals a
//! (possibly abstract) branch class matches, and which field holds the
//! discriminator at a given level.

use std::collections::HashMap;

use super::class_model::{ClassModel, DiscriminatorStyle};
use super::errors::MappingError;

/// Field used when no class in a hierarchy declares one
pub const LEGACY_DISCRIMINATOR_FIELD: &str = "@type";

#[derive(Debug, Clone)]
struct TaxonomyEntry {
    root: String,
    literal: Option<String>,
    discriminator_field: String,
    /// Pre-order descendants, declaration order
    descendants: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TypeTaxonomy {
    entries: HashMap<String, TaxonomyEntry>,
    /// (hierarchy root, literal) -> class
    by_literal: HashMap<(String, String), String>,
}

impl TypeTaxonomy {
    pub fn build(model: &ClassModel, default_field: &str) -> Result<Self, MappingError> {
        let mut entries = HashMap::new();
        let mut by_literal: HashMap<(String, String), String> = HashMap::new();

        for class in model.classes() {
            let lineage = model.lineage(&class.path)?;
            let root = lineage
                .last()
                .map(|c| c.path.clone())
                .unwrap_or_else(|| class.path.clone());
            let discriminator_field = lineage
                .iter()
                .find_map(|c| c.discriminator_field.clone())
                .unwrap_or_else(|| default_field.to_string());
            let style = lineage
                .iter()
                .find_map(|c| c.discriminator_style)
                .unwrap_or_default();

            let literal = if class.is_abstract {
                None
            } else if let Some(alias) = &class.type_alias {
                Some(alias.clone())
            } else {
                Some(match style {
                    DiscriminatorStyle::ShortName => class.short_name().to_string(),
                    DiscriminatorStyle::FullPath => class.path.clone(),
                })
            };

            if let Some(lit) = &literal {
                let key = (root.clone(), lit.clone());
                if let Some(previous) = by_literal.insert(key, class.path.clone()) {
                    return Err(MappingError::invalid_model(format!(
                        "discriminator literal '{}' used by both `{}` and `{}`",
                        lit, previous, class.path
                    )));
                }
            }

            let descendants = model
                .descendants(&class.path)
                .into_iter()
                .map(|c| c.path.clone())
                .collect();

            entries.insert(
                class.path.clone(),
                TaxonomyEntry {
                    root,
                    literal,
                    discriminator_field,
                    descendants,
                },
            );
        }

        log::debug!(
            "Built type taxonomy: {} classes, {} discriminator literals",
            entries.len(),
            by_literal.len()
        );

        Ok(TypeTaxonomy {
            entries,
            by_literal,
        })
    }

    fn entry(&self, class: &str) -> Result<&TaxonomyEntry, MappingError> {
        self.entries.get(class).ok_or_else(|| MappingError::UnknownClass {
            class: class.to_string(),
        })
    }

    /// Stored literal of a concrete class, `None` for abstract classes.
    pub fn literal_for(&self, class: &str) -> Result<Option<&str>, MappingError> {
        Ok(self.entry(class)?.literal.as_deref())
    }

    /// Class in the hierarchy of `class` stored under `literal`.
    pub fn class_for_literal(&self, class: &str, literal: &str) -> Option<&str> {
        let root = self.entries.get(class)?.root.clone();
        self.by_literal
            .get(&(root, literal.to_string()))
            .map(|s| s.as_str())
    }

    /// Literals a branch on `class` matches: its own (when concrete) followed
    /// by every discriminator-bearing descendant in pre-order.
    pub fn dispatch_literals(&self, class: &str) -> Result<Vec<String>, MappingError> {
        let entry = self.entry(class)?;
        let mut literals: Vec<String> = entry.literal.iter().cloned().collect();
        for descendant in &entry.descendants {
            if let Some(lit) = &self.entry(descendant)?.literal {
                literals.push(lit.clone());
            }
        }
        Ok(literals)
    }

    /// Concrete classes a value of static type `class` may have at runtime.
    pub fn concrete_classes(&self, class: &str) -> Result<Vec<String>, MappingError> {
        let entry = self.entry(class)?;
        let mut out = Vec::new();
        if entry.literal.is_some() {
            out.push(class.to_string());
        }
        for descendant in &entry.descendants {
            if self.entry(descendant)?.literal.is_some() {
                out.push(descendant.clone());
            }
        }
        Ok(out)
    }

    pub fn discriminator_field(&self, class: &str) -> Result<&str, MappingError> {
        Ok(self.entry(class)?.discriminator_field.as_str())
    }

    pub fn has_subtypes(&self, class: &str) -> Result<bool, MappingError> {
        Ok(!self.entry(class)?.descendants.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_catalog::class_model::ClassDef;

    fn shapes() -> ClassModel {
        let mut model = ClassModel::new();
        model
            .add_class(
                ClassDef::new("geo::Shape")
                    .abstract_class()
                    .with_discriminator_field("_type"),
            )
            .unwrap();
        model
            .add_class(ClassDef::new("geo::Polygon").with_parent("geo::Shape"))
            .unwrap();
        model
            .add_class(
                ClassDef::new("geo::Square")
                    .with_parent("geo::Polygon")
                    .with_type_alias("SQ"),
            )
            .unwrap();
        model
            .add_class(
                ClassDef::new("geo::Circle")
                    .with_parent("geo::Shape")
                    .with_discriminator_style(DiscriminatorStyle::FullPath),
            )
            .unwrap();
        model.add_class(ClassDef::new("geo::Point")).unwrap();
        model
    }

    #[test]
    fn test_literal_styles() {
        let taxonomy = TypeTaxonomy::build(&shapes(), LEGACY_DISCRIMINATOR_FIELD).unwrap();
        assert_eq!(taxonomy.literal_for("geo::Shape").unwrap(), None);
        assert_eq!(taxonomy.literal_for("geo::Polygon").unwrap(), Some("Polygon"));
        assert_eq!(taxonomy.literal_for("geo::Square").unwrap(), Some("SQ"));
        assert_eq!(
            taxonomy.literal_for("geo::Circle").unwrap(),
            Some("geo::Circle")
        );
        assert_eq!(
            taxonomy.class_for_literal("geo::Circle", "SQ"),
            Some("geo::Square")
        );
        assert_eq!(taxonomy.class_for_literal("geo::Point", "SQ"), None);
    }

    #[test]
    fn test_abstract_branch_unions_descendants() {
        let taxonomy = TypeTaxonomy::build(&shapes(), LEGACY_DISCRIMINATOR_FIELD).unwrap();
        assert_eq!(
            taxonomy.dispatch_literals("geo::Shape").unwrap(),
            vec!["Polygon", "SQ", "geo::Circle"]
        );
        assert_eq!(
            taxonomy.dispatch_literals("geo::Polygon").unwrap(),
            vec!["Polygon", "SQ"]
        );
    }

    #[test]
    fn test_discriminator_field_inherited() {
        let taxonomy = TypeTaxonomy::build(&shapes(), LEGACY_DISCRIMINATOR_FIELD).unwrap();
        assert_eq!(taxonomy.discriminator_field("geo::Square").unwrap(), "_type");
        assert_eq!(taxonomy.discriminator_field("geo::Point").unwrap(), "@type");
    }

    #[test]
    fn test_same_short_name_in_other_hierarchy_allowed() {
        let mut model = shapes();
        model.add_class(ClassDef::new("other::Polygon")).unwrap();
        assert!(TypeTaxonomy::build(&model, LEGACY_DISCRIMINATOR_FIELD).is_ok());
    }

    #[test]
    fn test_duplicate_literal_rejected() {
        let mut model = shapes();
        model
            .add_class(ClassDef::new("other::Polygon").with_parent("geo::Shape"))
            .unwrap();
        assert!(TypeTaxonomy::build(&model, LEGACY_DISCRIMINATOR_FIELD).is_err());
    }
}
