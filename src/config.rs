use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

lazy_static::lazy_static! {
    static ref IDENTIFIER: regex::Regex =
        regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier regex");
}

fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("identifier");
        err.message = Some(format!("'{}' is not a plain SQL identifier", value).into());
        Err(err)
    }
}

fn validate_discriminator_field(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.contains('\'') {
        let mut err = ValidationError::new("discriminator_field");
        err.message = Some("discriminator field must be non-empty and contain no quotes".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Compiler configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Alias of the root table in every plan
    #[validate(custom(function = "validate_identifier"))]
    pub root_alias: String,

    /// Prefix of flatten pseudo-table aliases (`ss_flatten_0`, ...)
    #[validate(custom(function = "validate_identifier"))]
    pub flatten_alias_prefix: String,

    /// Discriminator field when no class in a hierarchy declares one
    #[validate(custom(function = "validate_discriminator_field"))]
    pub default_discriminator_field: String,

    /// Aggregate column of correlated aggregation subqueries
    #[validate(custom(function = "validate_identifier"))]
    pub aggregate_column: String,

    /// Join key column projected by explosion subqueries
    #[validate(custom(function = "validate_identifier"))]
    pub explosion_key_column: String,

    /// Whether to wrap plans with session query tag statements
    pub query_tag_enabled: bool,

    /// Fields of the JSON query tag
    pub query_tag_fields: BTreeMap<String, String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let mut query_tag_fields = BTreeMap::new();
        query_tag_fields.insert("application".to_string(), "relplan".to_string());
        Self {
            root_alias: "root".to_string(),
            flatten_alias_prefix: "ss_flatten".to_string(),
            default_discriminator_field: "@type".to_string(),
            aggregate_column: "aggCol".to_string(),
            explosion_key_column: "leftJoinKey".to_string(),
            query_tag_enabled: true,
            query_tag_fields,
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut query_tag_fields = defaults.query_tag_fields.clone();
        if let Ok(application) = env::var("RELPLAN_QUERY_TAG_APPLICATION") {
            query_tag_fields.insert("application".to_string(), application);
        }

        let config = Self {
            root_alias: env::var("RELPLAN_ROOT_ALIAS").unwrap_or(defaults.root_alias),
            flatten_alias_prefix: env::var("RELPLAN_FLATTEN_PREFIX")
                .unwrap_or(defaults.flatten_alias_prefix),
            default_discriminator_field: env::var("RELPLAN_DISCRIMINATOR_FIELD")
                .unwrap_or(defaults.default_discriminator_field),
            aggregate_column: env::var("RELPLAN_AGGREGATE_COLUMN")
                .unwrap_or(defaults.aggregate_column),
            explosion_key_column: env::var("RELPLAN_EXPLOSION_KEY_COLUMN")
                .unwrap_or(defaults.explosion_key_column),
            query_tag_enabled: parse_env_var("RELPLAN_QUERY_TAG", "true")?,
            query_tag_fields,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides on top of this configuration
    pub fn from_cli(base: Self, cli: CliConfig) -> Result<Self, ConfigError> {
        let mut config = base;
        config.merge(cli);
        config.validate()?;
        Ok(config)
    }

    /// Merge CLI overrides (CLI overrides environment/file)
    pub fn merge(&mut self, cli: CliConfig) {
        if let Some(root_alias) = cli.root_alias {
            self.root_alias = root_alias;
        }
        if let Some(prefix) = cli.flatten_alias_prefix {
            self.flatten_alias_prefix = prefix;
        }
        if cli.no_query_tag {
            self.query_tag_enabled = false;
        }
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    pub root_alias: Option<String>,
    pub flatten_alias_prefix: Option<String>,
    pub no_query_tag: bool,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.root_alias, "root");
        assert_eq!(config.flatten_alias_prefix, "ss_flatten");
        assert!(config.query_tag_enabled);
    }

    #[test]
    fn test_invalid_root_alias() {
        let config = CompilerConfig {
            root_alias: "my root".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_prefix() {
        let config = CompilerConfig {
            flatten_alias_prefix: "".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quoted_discriminator_rejected() {
        let config = CompilerConfig {
            default_discriminator_field: "it's".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("RELPLAN_ROOT_ALIAS", "base");
        env::set_var("RELPLAN_QUERY_TAG", "false");
        let config = CompilerConfig::from_env();
        env::remove_var("RELPLAN_ROOT_ALIAS");
        env::remove_var("RELPLAN_QUERY_TAG");

        let config = config.unwrap();
        assert_eq!(config.root_alias, "base");
        assert!(!config.query_tag_enabled);
    }

    #[test]
    #[serial]
    fn test_from_env_bad_bool() {
        env::set_var("RELPLAN_QUERY_TAG", "maybe");
        let result = CompilerConfig::from_env();
        env::remove_var("RELPLAN_QUERY_TAG");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_from_yaml_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "flatten_alias_prefix: fl").unwrap();
        writeln!(file, "query_tag_enabled: false").unwrap();

        let config = CompilerConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.flatten_alias_prefix, "fl");
        assert_eq!(config.root_alias, "root");
        assert!(!config.query_tag_enabled);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = CliConfig {
            root_alias: Some("r".to_string()),
            no_query_tag: true,
            ..Default::default()
        };
        let config = CompilerConfig::from_cli(CompilerConfig::default(), cli).unwrap();
        assert_eq!(config.root_alias, "r");
        assert!(!config.query_tag_enabled);
        assert_eq!(config.aggregate_column, "aggCol");
    }
}
