//! File-to-plan compilation with file, environment and CLI configuration.

#[cfg(test)]
mod plan_compilation_tests {
    use std::io::Write;
    use std::path::PathBuf;

    use serial_test::serial;

    use relplan::config::{CliConfig, CompilerConfig};
    use relplan::{compile_catalog, ExecutionPlan, MappingCatalog, MappingDocument, ResolvedQuery};

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    fn catalog() -> MappingCatalog {
        MappingDocument::from_yaml_file(fixture("person_mapping.yaml"))
            .and_then(|doc| doc.to_catalog())
            .expect("mapping fixture loads")
    }

    fn query() -> ResolvedQuery {
        let text = std::fs::read_to_string(fixture("person_query.yaml")).unwrap();
        ResolvedQuery::from_yaml_str(&text).unwrap()
    }

    fn untagged() -> CompilerConfig {
        CompilerConfig {
            query_tag_enabled: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_query_fixture_compiles() -> anyhow::Result<()> {
        let plan = compile_catalog(&query(), &catalog(), &untagged())?;
        let sql = plan.sql();

        assert!(sql.starts_with(
            "select \"root\".FIRSTNAME as \"First Name\", \
             \"root\".FIRM_DETAILS['legalName']::varchar as \"Firm Name\", \
             \"person_table_1\".FIRSTNAME as \"Manager\", \
             \"person_table_2\".aggCol as \"Address Names\" \
             from PERSON_SCHEMA.PERSON_TABLE as \"root\" \
             left outer join PERSON_SCHEMA.PERSON_TABLE as \"person_table_1\" \
             on (\"root\".MANAGERID = \"person_table_1\".ID) \
             left outer join (select \"person_table_3\".ID as ID, \
             listagg(\"ss_flatten_0\".VALUE['name']::varchar, ';') as aggCol"
        ));
        assert!(sql.ends_with(
            "on (\"root\".ID = \"person_table_2\".ID) \
             where \"root\".AGE > 30 order by \"First Name\" asc limit 5"
        ));
        assert!(matches!(plan, ExecutionPlan::Relational(_)));

        let names: Vec<&str> = plan
            .relational()
            .result_schema
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["First Name", "Firm Name", "Manager", "Address Names"]);
        Ok(())
    }

    #[test]
    fn test_explain_output() -> anyhow::Result<()> {
        let plan = compile_catalog(&query(), &catalog(), &CompilerConfig::default())?;
        let explained = plan.to_string();

        assert!(explained.starts_with("RelationalBlockExecutionNode\n"));
        assert!(explained.contains("resultColumns = [(\"First Name\", VARCHAR(100)), "));
        assert!(explained.contains("ALTER SESSION UNSET QUERY_TAG"));
        assert!(explained.contains("connection = RelationalDatabaseConnection(type = \"Snowflake\")"));
        Ok(())
    }

    #[test]
    fn test_json_plan() -> anyhow::Result<()> {
        let plan = compile_catalog(&query(), &catalog(), &untagged())?;
        let json: serde_json::Value = serde_json::to_value(&plan)?;

        assert_eq!(json["kind"], "relational");
        assert_eq!(json["connection"], "Snowflake");
        assert_eq!(json["result_schema"][0]["name"], "First Name");
        Ok(())
    }

    #[test]
    fn test_config_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "root_alias: p")?;
        writeln!(file, "query_tag_enabled: false")?;

        let config = CompilerConfig::from_yaml_file(file.path())?;
        assert_eq!(config.aggregate_column, "aggCol");

        let plan = compile_catalog(&query(), &catalog(), &config)?;
        assert!(plan.sql().starts_with("select \"p\".FIRSTNAME as \"First Name\""));
        assert!(plan.sql().contains("where \"p\".AGE > 30"));
        Ok(())
    }

    #[test]
    fn test_invalid_config_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "flatten_alias_prefix: \"bad prefix\"")?;
        assert!(CompilerConfig::from_yaml_file(file.path()).is_err());
        Ok(())
    }

    #[test]
    #[serial]
    fn test_environment_and_cli_overrides() -> anyhow::Result<()> {
        std::env::set_var("RELPLAN_FLATTEN_PREFIX", "fl");
        std::env::set_var("RELPLAN_QUERY_TAG", "false");
        let from_env = CompilerConfig::from_env();
        std::env::remove_var("RELPLAN_FLATTEN_PREFIX");
        std::env::remove_var("RELPLAN_QUERY_TAG");

        let config = CompilerConfig::from_cli(
            from_env?,
            CliConfig {
                root_alias: Some("person".into()),
                ..Default::default()
            },
        )?;
        let plan = compile_catalog(&query(), &catalog(), &config)?;

        assert!(plan.relational().pre_execution.is_empty());
        assert!(plan.sql().contains("lateral flatten(input => \"person_table_3\".FIRM_DETAILS['addresses']"));
        assert!(plan.sql().contains(" as \"fl_0\" "));
        assert!(plan.sql().starts_with("select \"person\".FIRSTNAME"));
        Ok(())
    }

    #[test]
    fn test_fingerprint_is_stable_across_loads() -> anyhow::Result<()> {
        let first = compile_catalog(&query(), &catalog(), &untagged())?;
        let second = compile_catalog(&query(), &catalog(), &untagged())?;
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
        Ok(())
    }
}
