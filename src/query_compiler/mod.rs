//! Mapping-driven query compiler.
//!
//! Turns a [`ResolvedQuery`] over the class model into one SQL statement
//! over the mapped stores. Each property step is resolved against its
//! binding: column reads and semi-structured paths stay inline, unindexed
//! arrays become lateral flattens, associations and explosions become
//! deduplicated left outer joins, polymorphic documents become discriminator
//! dispatch, and aggregates in plain select lists become correlated derived
//! tables.
//!
//! All state of a compilation lives in a [`compile_ctx::CompileCtx`]; the
//! schema and model are only borrowed, so independent compilations can run in
//! parallel.

pub mod aggregation_builder;
pub mod alias_registry;
pub mod compile_ctx;
pub mod errors;
pub mod flatten_injector;
pub mod join_builder;
pub mod path_resolver;
pub mod plan_assembler;
pub mod resolved_expr;
pub mod store_source;
pub mod type_dispatch;

#[cfg(test)]
mod tests;

use validator::Validate;

use crate::config::CompilerConfig;
use crate::mapping_catalog::{ClassModel, MappingCatalog, MappingSchema, TypeTaxonomy};
use crate::query_tree::ResolvedQuery;
use crate::relational_plan::ExecutionPlan;
use crate::sql_generator::dialect_for;

pub use compile_ctx::CompileCtx;
pub use errors::{CompileError, POST_FILTER_MESSAGE};

/// Compile a query into an execution plan.
pub fn compile(
    query: &ResolvedQuery,
    schema: &MappingSchema,
    model: &ClassModel,
    config: &CompilerConfig,
) -> Result<ExecutionPlan, CompileError> {
    config
        .validate()
        .map_err(|e| CompileError::InvalidConfig(e.to_string()))?;
    log::debug!("Compiling query over {}", query.root_class);

    let taxonomy = TypeTaxonomy::build(model, &config.default_discriminator_field)?;
    let dialect = dialect_for(schema.database_type());
    let mut ctx = CompileCtx::new(schema, model, taxonomy, config, dialect);
    plan_assembler::assemble(&mut ctx, query)
}

/// [`compile`] against a loaded mapping document.
pub fn compile_catalog(
    query: &ResolvedQuery,
    catalog: &MappingCatalog,
    config: &CompilerConfig,
) -> Result<ExecutionPlan, CompileError> {
    compile(query, &catalog.schema, &catalog.model, config)
}
