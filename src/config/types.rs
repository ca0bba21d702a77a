//! Core configuration types and loading.

use reparray_core::DuplicateIdentifierPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity and HTTP endpoint.
    #[serde(default)]
    pub server: ServerConfig,
    /// Authority to replica propagation.
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// Identifier generation.
    #[serde(default)]
    pub names: NamesConfig,
    /// Arrays hosted at startup.
    #[serde(default, rename = "array")]
    pub arrays: Vec<ArrayConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name reported by `/health` and in startup logs.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Port for `/metrics` and `/health`. 0 disables the endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// Replication link configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// How often pending deltas are drained and forwarded.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Bounded queue depth per replica.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// In-process replicas attached to every array.
    #[serde(default = "default_replicas")]
    pub replicas: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            channel_capacity: default_channel_capacity(),
            replicas: default_replicas(),
        }
    }
}

/// Name generator configuration.
///
/// Without files, built-in word tables are used. Without a seed, names
/// differ on every run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamesConfig {
    pub seed: Option<u64>,
    /// One adjective per line.
    pub adjectives_file: Option<PathBuf>,
    /// One name per line.
    pub names_file: Option<PathBuf>,
}

/// A hosted array.
#[derive(Debug, Clone, Deserialize)]
pub struct ArrayConfig {
    pub name: String,
    /// Property types accepted by property sorts.
    #[serde(default = "default_sortable_types")]
    pub sortable_types: Vec<String>,
    #[serde(default)]
    pub duplicate_identifiers: DuplicateIdentifierPolicy,
    /// JSON objects, one per line, added at startup.
    pub preload_file: Option<PathBuf>,
    /// Type tag given to preloaded entries.
    #[serde(default = "default_type_tag")]
    pub type_tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.name, "reparrayd");
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.replication.flush_interval_ms, 100);
        assert_eq!(config.replication.replicas, 1);
        assert!(config.names.seed.is_none());
        assert!(config.arrays.is_empty());
    }

    #[test]
    fn array_blocks_parse() {
        let toml = r#"
[names]
seed = 7

[[array]]
name = "inventory"
sortable_types = ["string"]
duplicate_identifiers = "overwrite"

[[array]]
name = "quests"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.names.seed, Some(7));
        assert_eq!(config.arrays.len(), 2);
        assert_eq!(config.arrays[0].sortable_types, vec!["string"]);
        assert_eq!(
            config.arrays[0].duplicate_identifiers,
            DuplicateIdentifierPolicy::Overwrite
        );
        assert_eq!(
            config.arrays[1].duplicate_identifiers,
            DuplicateIdentifierPolicy::Reject
        );
        assert_eq!(config.arrays[1].type_tag, "Json");
        assert!(config.arrays[1].sortable_types.contains(&"f64".to_string()));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nname = \"edge\"\nmetrics_port = 0").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.name, "edge");
        assert_eq!(config.server.metrics_port, 0);
    }

    #[test]
    fn load_reports_missing_file_and_bad_toml() {
        assert!(matches!(
            Config::load("/nonexistent/reparrayd.toml"),
            Err(ConfigError::Io(_))
        ));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nname = ").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
