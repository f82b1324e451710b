//! SQL emission: relational AST, dialect trait and the function registry.
//!
//! The compiler builds [`sql_ast::SelectStatement`]s; a [`SqlDialect`]
//! decides how quoting, semi-structured access, casts, flattens and session
//! statements are spelled.

pub mod function_registry;
pub mod snowflake;
pub mod sql_ast;
pub mod to_sql;

use std::fmt;

use crate::config::CompilerConfig;
use crate::mapping_catalog::binding_parser::PathSegment;
use crate::mapping_catalog::data_types::CastType;
use crate::mapping_catalog::mapping_schema::DatabaseType;

pub use snowflake::SnowflakeDialect;
pub use to_sql::ToSql;

/// Backend-specific spelling of the relational AST
pub trait SqlDialect: fmt::Debug + Send + Sync {
    fn database_type(&self) -> DatabaseType;

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// One JSON path step appended to an already rendered base
    fn json_segment(&self, segment: &PathSegment) -> String;

    fn cast(&self, rendered: &str, cast: CastType) -> String;

    /// Full join clause for a lateral array flatten
    fn flatten_join(&self, input: &str, alias: &str) -> String;

    /// Element column exposed by a flatten pseudo-table
    fn flatten_value_column(&self) -> &'static str;

    fn string_agg(&self, rendered: &str, separator: &str) -> String;

    fn limit(&self, rows: u64) -> String {
        format!("limit {}", rows)
    }

    /// Session statements run before the query
    fn pre_execution_statements(&self, config: &CompilerConfig) -> Vec<String>;

    /// Statements that must run after the query, even when it fails
    fn post_execution_statements(&self, config: &CompilerConfig) -> Vec<String>;
}

/// Dialect for a mapping's database type.
pub fn dialect_for(database_type: DatabaseType) -> &'static dyn SqlDialect {
    match database_type {
        DatabaseType::Snowflake => &SnowflakeDialect,
    }
}
