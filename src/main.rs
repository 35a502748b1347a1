use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use jetbridge::catalog::BindingCatalog;
use jetbridge::config::RunConfig;
use jetbridge::model::QueryDescriptor;
use jetbridge::postgres_query_generator::convert;

/// JetBridge - converts legacy Access-dialect query definitions to
/// PostgreSQL views and procedures
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file holding the exported query descriptors (an array, or a
    /// single object)
    input: PathBuf,

    /// Target schema for generated objects and qualified references
    /// (falls back to JETBRIDGE_SCHEMA, then "public")
    #[arg(long)]
    schema: Option<String>,

    /// JSON file holding control bindings and column types
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Emit full conversion results as JSON instead of plain statements
    #[arg(long)]
    emit_json: bool,
}

fn main() -> Result<()> {
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    // Environment supplies defaults; flags win.
    let env_config = RunConfig::from_env().context("invalid run configuration")?;
    let config = RunConfig::from_cli(
        cli.schema.unwrap_or(env_config.schema),
        cli.emit_json || env_config.emit_json,
    )
    .context("invalid run configuration")?;

    let catalog = match &cli.catalog {
        Some(path) => BindingCatalog::from_json_file(path)
            .with_context(|| format!("failed to load catalog from {}", path.display()))?,
        None => BindingCatalog::default(),
    };

    let descriptors = load_descriptors(&cli.input)?;
    log::info!(
        "converting {} quer{} into schema '{}'",
        descriptors.len(),
        if descriptors.len() == 1 { "y" } else { "ies" },
        config.schema
    );

    let results: Vec<_> = descriptors
        .iter()
        .map(|d| convert(d, &config.schema, &catalog))
        .collect();

    if config.emit_json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            println!("-- {} ({:?})", result.object_name, result.object_type);
            for statement in &result.statements {
                println!("{};\n", statement);
            }
        }
    }

    let skipped = results.iter().filter(|r| r.statements.is_empty()).count();
    if skipped > 0 {
        log::warn!("{} quer{} skipped", skipped, if skipped == 1 { "y was" } else { "ies were" });
    }
    Ok(())
}

/// Accepts either a JSON array of descriptors or one bare descriptor.
fn load_descriptors(path: &PathBuf) -> Result<Vec<QueryDescriptor>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match serde_json::from_str::<Vec<QueryDescriptor>>(&content) {
        Ok(list) => Ok(list),
        Err(_) => {
            let single: QueryDescriptor = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a descriptor or descriptor array", path.display()))?;
            Ok(vec![single])
        }
    }
}
