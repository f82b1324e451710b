//! relplan - mapping-driven relational plans for object-model queries
//!
//! This crate compiles type-checked queries over a class model into single
//! SQL statements over the mapped stores:
//! - Class model and store mappings loaded from YAML
//! - Column, semi-structured path, association, explosion and derived bindings
//! - Lateral flattens for arrays inside VARIANT documents
//! - Deduplicated joins, discriminator dispatch and aggregation subqueries
//! - Snowflake SQL generation wrapped in an explainable execution plan

pub mod utils;

pub mod config;
pub mod mapping_catalog;
pub mod query_compiler;
pub mod query_tree;
pub mod relational_plan;
pub mod sql_generator;

pub use config::CompilerConfig;
pub use mapping_catalog::{MappingCatalog, MappingDocument, MappingError};
pub use query_compiler::{compile, compile_catalog, CompileError};
pub use query_tree::ResolvedQuery;
pub use relational_plan::{ExecutionPlan, RelationalPlan};
