use crate::config::CompilerConfig;
use crate::mapping_catalog::binding_parser::PathSegment;
use crate::mapping_catalog::data_types::CastType;
use crate::mapping_catalog::mapping_schema::DatabaseType;

use super::SqlDialect;

/// Snowflake: bracket paths over VARIANT columns, `lateral flatten`,
/// `listagg` and session query tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnowflakeDialect;

impl SqlDialect for SnowflakeDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Snowflake
    }

    fn json_segment(&self, segment: &PathSegment) -> String {
        match segment {
            PathSegment::Key(key) => format!("[{}]", self.string_literal(key)),
            PathSegment::Index(index) => format!("[{}]", index),
        }
    }

    fn cast(&self, rendered: &str, cast: CastType) -> String {
        let name = match cast {
            CastType::Varchar => "varchar",
            CastType::Number => "number",
            CastType::Float => "float",
            CastType::Boolean => "boolean",
            CastType::Date => "date",
            CastType::Timestamp => "timestamp",
        };
        format!("{}::{}", rendered, name)
    }

    fn flatten_join(&self, input: &str, alias: &str) -> String {
        format!(
            "inner join lateral flatten(input => {}, outer => true, recursive => false, mode => 'array') as {}",
            input,
            self.quote_identifier(alias)
        )
    }

    fn flatten_value_column(&self) -> &'static str {
        "VALUE"
    }

    fn string_agg(&self, rendered: &str, separator: &str) -> String {
        format!("listagg({}, {})", rendered, self.string_literal(separator))
    }

    fn pre_execution_statements(&self, config: &CompilerConfig) -> Vec<String> {
        if !config.query_tag_enabled {
            return Vec::new();
        }
        // BTreeMap keeps the tag byte-stable
        let tag = serde_json::to_string(&config.query_tag_fields).unwrap_or_default();
        vec![format!(
            "ALTER SESSION SET QUERY_TAG = {}",
            self.string_literal(&tag)
        )]
    }

    fn post_execution_statements(&self, config: &CompilerConfig) -> Vec<String> {
        if !config.query_tag_enabled {
            return Vec::new();
        }
        vec!["ALTER SESSION UNSET QUERY_TAG".to_string()]
    }
}
