pub mod binding_parser;
pub mod class_model;
pub mod config;
pub mod data_types;
pub mod errors;
pub mod mapping_schema;
pub mod type_taxonomy;

pub use class_model::{ClassDef, ClassModel, DiscriminatorStyle, PropertyDef};
pub use config::{MappingCatalog, MappingDocument};
pub use data_types::{CastType, PhysicalType, SemanticType};
pub use errors::MappingError;
pub use mapping_schema::{Binding, ClassMapping, DatabaseType, MappingSchema, StoreRef};
pub use type_taxonomy::TypeTaxonomy;
