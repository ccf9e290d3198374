use anyhow::{Context, Result};
use bizgraph::db::Db;
use bizgraph::import::{import_dump_dir, import_json_dir, import_literal_files};
use bizgraph::{Config, UnbalancedPolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Source {
    /// JS literal dumps (nodes.jsx, relationships.jsx, ...), full-table replace
    Literal,
    /// Pre-normalized JSON files (nodes.json, ...), upsert
    Json,
    /// One `<table>_dump.jsx` file per table, full-table replace
    Dumps,
}

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Load graph data files into the bizgraph database")]
struct Args {
    /// Kind of data to import
    #[arg(value_enum, default_value = "literal")]
    source: Source,

    /// Data directory (defaults to the configured literal or JSON directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Database file (defaults to the configured path)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Fail tables whose literal never closes instead of parsing to end of file
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    let mut config = Config::load()?;
    if args.strict {
        config.data.unbalanced = UnbalancedPolicy::Reject;
    }
    let db_path = args.db.unwrap_or_else(|| config.db_path().to_path_buf());
    log::info!("Database path: {}", db_path.display());

    let db = Db::new(&db_path);
    db.migrate(config.migrations_dir())
        .await
        .context("Failed to run migrations")?;

    let failed = match args.source {
        Source::Literal => {
            if let Some(dir) = args.dir {
                config.data.literal_dir = dir;
            }
            let report = import_literal_files(&db, &config.data).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.failures.len()
        }
        Source::Json => {
            let dir = args.dir.unwrap_or_else(|| config.data.json_dir.clone());
            let report = import_json_dir(&db, &dir).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.failures.len()
        }
        Source::Dumps => {
            let dir = args.dir.unwrap_or_else(|| config.data.literal_dir.clone());
            let report = import_dump_dir(&db, &dir, config.data.unbalanced)
                .await
                .with_context(|| format!("Failed to import dumps from {}", dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.failures.len()
        }
    };

    if failed > 0 {
        anyhow::bail!("{} table(s) failed to import", failed);
    }
    log::info!("Import complete");
    Ok(())
}
