//! Startup seeding: migrate the database, then load seed data if the graph
//! is still empty.

use serde::Serialize;

use super::{import_json_dir, import_literal_files, ImportReport};
use crate::config::Config;
use crate::db::Db;
use crate::error::Result;
use crate::store;

/// What startup found or loaded
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", content = "report", rename_all = "lowercase")]
pub enum BootstrapOutcome {
    /// The database already held this many nodes; nothing was loaded
    Populated(usize),
    Literal(ImportReport),
    Json(ImportReport),
    /// No seed data was found
    Empty,
}

/// Migrate `db` and seed it from the configured data directories.
///
/// Literal dumps win over JSON when both exist. A database that already has
/// nodes is left alone.
pub async fn bootstrap(db: &Db, config: &Config) -> Result<BootstrapOutcome> {
    db.migrate(config.migrations_dir()).await?;

    let existing = store::count_nodes(db).await?;
    if existing > 0 {
        log::info!("Database already holds {} nodes, skipping seed import", existing);
        return Ok(BootstrapOutcome::Populated(existing));
    }

    if config.data.nodes_path().is_file() {
        let report = import_literal_files(db, &config.data).await?;
        return Ok(BootstrapOutcome::Literal(report));
    }

    if config.data.json_dir.join("nodes.json").is_file() {
        let report = import_json_dir(db, &config.data.json_dir).await?;
        return Ok(BootstrapOutcome::Json(report));
    }

    log::warn!(
        "No seed data found in {} or {}; starting with an empty graph",
        config.data.literal_dir.display(),
        config.data.json_dir.display()
    );
    Ok(BootstrapOutcome::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use crate::model::Node;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn config_for(root: &Path) -> Config {
        let mut config = Config::default();
        config.bizgraph.db_path = root.join("graph.db");
        config.bizgraph.migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
        config.data = DataConfig {
            literal_dir: root.join("literal"),
            json_dir: root.join("json"),
            ..Default::default()
        };
        fs::create_dir_all(&config.data.literal_dir).unwrap();
        fs::create_dir_all(&config.data.json_dir).unwrap();
        config
    }

    #[tokio::test]
    async fn test_literal_preferred_over_json() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path());
        fs::write(
            config.data.nodes_path(),
            "export const INITIAL_NODES = { a: { id: 'a' } };",
        )
        .unwrap();
        fs::write(config.data.json_dir.join("nodes.json"), r#"[{"id": "j"}]"#).unwrap();

        let db = Db::new(config.db_path());
        let outcome = bootstrap(&db, &config).await.unwrap();
        assert!(matches!(outcome, BootstrapOutcome::Literal(ref r) if r.nodes == 1));
        assert!(store::get_node(&db, "j").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_fallback_and_populated() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path());
        fs::write(config.data.json_dir.join("nodes.json"), r#"[{"id": "j"}]"#).unwrap();

        let db = Db::new(config.db_path());
        let outcome = bootstrap(&db, &config).await.unwrap();
        assert!(matches!(outcome, BootstrapOutcome::Json(ref r) if r.nodes == 1));

        store::upsert_node(&db, Node { id: "k".to_string(), ..Default::default() })
            .await
            .unwrap();
        let again = bootstrap(&db, &config).await.unwrap();
        assert!(matches!(again, BootstrapOutcome::Populated(2)));
    }

    #[tokio::test]
    async fn test_no_seed_data() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path());
        let db = Db::new(config.db_path());
        let outcome = bootstrap(&db, &config).await.unwrap();
        assert!(matches!(outcome, BootstrapOutcome::Empty));
        assert_eq!(store::stats(&db).await.unwrap(), store::GraphStats::default());
    }
}
