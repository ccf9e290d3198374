use anyhow::Result;
use bizgraph::api::{self, AppState};
use bizgraph::db::{migrate, Db};
use bizgraph::error::BizgraphError;
use bizgraph::import::{self, BootstrapOutcome};
use bizgraph::{store, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger from environment variable or default to info level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    // Parse command-line arguments
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" => run_server().await?,
        "reload" => run_reload().await?,
        "verify" => run_schema_verification().await?,
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: bizgraph [serve|reload|verify]");
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Migrate, seed an empty database, then serve the REST API
async fn run_server() -> Result<()> {
    log::info!("Starting bizgraph v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    match import::bootstrap(&db, &config).await? {
        BootstrapOutcome::Populated(count) => log::info!("Serving existing graph ({} nodes)", count),
        BootstrapOutcome::Literal(report) | BootstrapOutcome::Json(report) if !report.is_clean() => {
            log::warn!("{} table(s) failed to load at startup", report.failures.len());
        }
        _ => {}
    }

    let state = AppState::new(db, config)?;
    if !state.assistant.is_enabled() {
        log::warn!("Chat answers will return raw context only");
    }
    api::serve(state).await?;

    Ok(())
}

/// Re-import the literal data files into the configured database
async fn run_reload() -> Result<()> {
    let config = Config::load()?;
    let db = Db::new(config.db_path());
    db.migrate(config.migrations_dir()).await?;

    let report = import::import_literal_files(&db, &config.data).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_clean() {
        anyhow::bail!("{} table(s) failed to import", report.failures.len());
    }
    Ok(())
}

/// Run migrations and check that the graph schema is in place
async fn run_schema_verification() -> Result<()> {
    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Literal data directory: {}", config.data.literal_dir.display());

    let db = Db::new(config.db_path());
    db.migrate(config.migrations_dir()).await?;
    log::info!("Database initialized successfully");

    verify_database_schema(&db).await?;

    let stats = store::stats(&db).await?;
    log::info!(
        "Graph holds {} nodes, {} relationships, {} journeys, {} positions",
        stats.nodes,
        stats.relationships,
        stats.journeys,
        stats.positions
    );
    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = ["journeys", "nodes", "positions", "relationships", "schema_migrations"];
        let missing: Vec<&str> = expected_tables
            .iter()
            .copied()
            .filter(|table| !tables.iter().any(|t| t == table))
            .collect();
        for table in &missing {
            log::error!("Missing table: {}", table);
        }
        if !missing.is_empty() {
            return Err(BizgraphError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("{} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(BizgraphError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(BizgraphError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("Database schema verification complete");
    Ok(())
}
