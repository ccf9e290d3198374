use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::literal::UnbalancedPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bizgraph: BizgraphConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Storage and logging
#[derive(Debug, Clone, Deserialize)]
pub struct BizgraphConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BizgraphConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            migrations_dir: default_migrations_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Where seed data lives and how it is read
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Directory holding the JS literal dumps (`nodes.jsx`, ...)
    #[serde(default = "default_literal_dir")]
    pub literal_dir: PathBuf,
    /// Directory holding pre-normalized JSON files (`nodes.json`, ...)
    #[serde(default = "default_json_dir")]
    pub json_dir: PathBuf,
    #[serde(default = "default_nodes_file")]
    pub nodes_file: String,
    #[serde(default = "default_relationships_file")]
    pub relationships_file: String,
    #[serde(default = "default_journeys_file")]
    pub journeys_file: String,
    #[serde(default = "default_positions_file")]
    pub positions_file: String,
    /// Handling of declarations whose literal never closes
    #[serde(default)]
    pub unbalanced: UnbalancedPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            literal_dir: default_literal_dir(),
            json_dir: default_json_dir(),
            nodes_file: default_nodes_file(),
            relationships_file: default_relationships_file(),
            journeys_file: default_journeys_file(),
            positions_file: default_positions_file(),
            unbalanced: UnbalancedPolicy::default(),
        }
    }
}

impl DataConfig {
    pub fn nodes_path(&self) -> PathBuf {
        self.literal_dir.join(&self.nodes_file)
    }

    pub fn relationships_path(&self) -> PathBuf {
        self.literal_dir.join(&self.relationships_file)
    }

    pub fn journeys_path(&self) -> PathBuf {
        self.literal_dir.join(&self.journeys_file)
    }

    pub fn positions_path(&self) -> PathBuf {
        self.literal_dir.join(&self.positions_file)
    }
}

/// Chat completion configuration.
///
/// `api_key` is resolved from `api_key_env` once, in [`Config::load`]; the
/// chat component never reads the environment itself.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_chat_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_chat_max_retries")]
    pub max_retries: usize,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            api_key_env: default_chat_api_key_env(),
            base_url: default_chat_base_url(),
            timeout_secs: default_chat_timeout_secs(),
            max_retries: default_chat_max_retries(),
            api_key: None,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("graph.db")
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_literal_dir() -> PathBuf {
    PathBuf::from("../components/data")
}

fn default_json_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_nodes_file() -> String {
    "nodes.jsx".to_string()
}

fn default_relationships_file() -> String {
    "relationships.jsx".to_string()
}

fn default_journeys_file() -> String {
    "flow_journey.jsx".to_string()
}

fn default_positions_file() -> String {
    "positions.jsx".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_chat_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_chat_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_timeout_secs() -> u64 {
    60
}

fn default_chat_max_retries() -> usize {
    2
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in BIZGRAPH_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory (built-in defaults if absent)
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let mut config = match std::env::var("BIZGRAPH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let path = Path::new("config.toml");
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    log::info!("No config.toml found, using built-in defaults");
                    let config = Config::default();
                    config.validate()?;
                    config
                }
            }
        };

        config.chat.api_key = std::env::var(&config.chat.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if config.chat.api_key.is_none() {
            log::warn!(
                "Environment variable {} not set; chat answers will fall back to raw context",
                config.chat.api_key_env
            );
        }

        Ok(config)
    }

    /// Parse and validate a config file without touching the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.http_server.port == 0 {
            anyhow::bail!("http_server.port must be greater than 0");
        }

        if self.chat.model.trim().is_empty() {
            anyhow::bail!("chat.model must not be empty");
        }

        if self.chat.timeout_secs == 0 {
            anyhow::bail!("chat.timeout_secs must be greater than 0");
        }

        if !self.chat.base_url.starts_with("http://") && !self.chat.base_url.starts_with("https://") {
            anyhow::bail!("chat.base_url must be an http(s) URL: {}", self.chat.base_url);
        }

        for name in [
            &self.data.nodes_file,
            &self.data.relationships_file,
            &self.data.journeys_file,
            &self.data.positions_file,
        ] {
            if name.trim().is_empty() {
                anyhow::bail!("data file names must not be empty");
            }
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.bizgraph.db_path
    }

    /// Get migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.bizgraph.migrations_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const FULL_CONFIG: &str = r#"
[bizgraph]
db_path = "./test.db"
log_level = "debug"

[data]
literal_dir = "./seed"
json_dir = "./json"
journeys_file = "journeys.jsx"
unbalanced = "reject"

[chat]
model = "gpt-4o"
api_key_env = "BIZGRAPH_TEST_CHAT_KEY"
timeout_secs = 5

[http_server]
port = 9000
allowed_origins = ["http://localhost:3000"]
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();
        assert_eq!(config.bizgraph.log_level, "debug");
        assert_eq!(config.db_path(), Path::new("./test.db"));
        assert_eq!(config.data.unbalanced, UnbalancedPolicy::Reject);
        assert_eq!(config.data.journeys_path(), Path::new("./seed").join("journeys.jsx"));
        assert_eq!(config.data.nodes_file, "nodes.jsx");
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.chat.max_retries, 2);
        assert_eq!(config.http_server.port, 9000);
        assert_eq!(config.http_server.host, "0.0.0.0");
        assert!(config.chat.api_key.is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.db_path(), Path::new("graph.db"));
        assert_eq!(config.migrations_dir(), Path::new("migrations"));
        assert_eq!(config.data.unbalanced, UnbalancedPolicy::Recover);
        assert_eq!(config.chat.base_url, "https://api.openai.com/v1");
        assert_eq!(config.http_server.port, 8000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_toml_str("[http_server]\nport = 0").is_err());
        assert!(Config::from_toml_str("[chat]\nmodel = \"\"").is_err());
        assert!(Config::from_toml_str("[chat]\ntimeout_secs = 0").is_err());
        assert!(Config::from_toml_str("[chat]\nbase_url = \"ftp://x\"").is_err());
        assert!(Config::from_toml_str("[data]\nunbalanced = \"sometimes\"").is_err());
    }

    #[test]
    fn test_load_resolves_api_key_once() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, FULL_CONFIG).unwrap();

        let original = std::env::var("BIZGRAPH_CONFIG").ok();
        std::env::set_var("BIZGRAPH_CONFIG", &config_path);
        std::env::set_var("BIZGRAPH_TEST_CHAT_KEY", "sk-test");

        let config = Config::load();

        std::env::remove_var("BIZGRAPH_TEST_CHAT_KEY");
        std::env::remove_var("BIZGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("BIZGRAPH_CONFIG", v);
        }

        let config = config.unwrap();
        assert_eq!(config.chat.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("BIZGRAPH_CONFIG").ok();
        std::env::set_var("BIZGRAPH_CONFIG", "nonexistent-bizgraph.toml");
        let config = Config::load();
        std::env::remove_var("BIZGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("BIZGRAPH_CONFIG", v);
        }
        assert!(config.is_err());
    }
}
