use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use relplan::config::{CliConfig, CompilerConfig};
use relplan::{compile_catalog, MappingDocument, ResolvedQuery};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Indented plan explanation
    Explain,
    /// The relational statement only
    Sql,
    /// The execution plan as JSON
    Json,
}

/// relplan - compile an object-model query into a Snowflake execution plan
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mapping document (class model and store bindings)
    #[arg(long)]
    mapping: PathBuf,

    /// Resolved query document (YAML, or JSON with a .json extension)
    #[arg(long)]
    query: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Explain)]
    format: OutputFormat,

    /// Compiler configuration file; RELPLAN_* environment variables otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Alias of the root table
    #[arg(long)]
    root_alias: Option<String>,

    /// Prefix of flatten aliases
    #[arg(long)]
    flatten_prefix: Option<String>,

    /// Do not wrap the plan with session query tag statements
    #[arg(long)]
    no_query_tag: bool,
}

impl From<&Cli> for CliConfig {
    fn from(cli: &Cli) -> Self {
        CliConfig {
            root_alias: cli.root_alias.clone(),
            flatten_alias_prefix: cli.flatten_prefix.clone(),
            no_query_tag: cli.no_query_tag,
        }
    }
}

fn load_query(path: &Path) -> anyhow::Result<ResolvedQuery> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading query document {}", path.display()))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let query = if is_json {
        ResolvedQuery::from_json_str(&text)?
    } else {
        ResolvedQuery::from_yaml_str(&text)?
    };
    Ok(query)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Defaults to INFO level, can be overridden with RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => CompilerConfig::from_yaml_file(path)?,
        None => CompilerConfig::from_env()?,
    };
    let config = CompilerConfig::from_cli(base, CliConfig::from(&cli))?;

    let catalog = MappingDocument::from_yaml_file(&cli.mapping)
        .and_then(|doc| doc.to_catalog())
        .with_context(|| format!("loading mapping {}", cli.mapping.display()))?;
    let query = load_query(&cli.query)?;

    let plan = compile_catalog(&query, &catalog, &config)?;
    match cli.format {
        OutputFormat::Explain => print!("{}", plan),
        OutputFormat::Sql => println!("{}", plan.sql()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }
    log::info!("Plan fingerprint {}", plan.fingerprint());
    Ok(())
}
