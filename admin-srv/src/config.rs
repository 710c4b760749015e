//! Configuration: TOML file plus environment overrides, environment winning.

use std::env;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub listen_endpoint: SocketAddr,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub catalog: CatalogConfig,
    pub iceberg: IcebergConfig,
    pub tasks: TasksConfig,
    pub refresh: RefreshConfig,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen_endpoint: "127.0.0.1:8080".parse().expect("valid default endpoint"),
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
            catalog: CatalogConfig::default(),
            iceberg: IcebergConfig::default(),
            tasks: TasksConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub uri: String,
    pub catalog: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            catalog: String::from("lakehouse"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IcebergConfig {
    pub default_database: String,
}

impl Default for IcebergConfig {
    fn default() -> Self {
        Self {
            default_database: String::from("main"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub worker_count: usize,
    pub poll_interval_seconds: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_interval_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_seconds: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
        }
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn apply_env_overrides(config: &mut AdminConfig) -> Result<()> {
    if let Some(value) = get_env("FLOE_LISTEN_ENDPOINT") {
        config.listen_endpoint = value
            .parse()
            .with_context(|| format!("parsing FLOE_LISTEN_ENDPOINT {value:?}"))?;
    }
    if let Some(value) = get_env("FLOE_SQL_CONNECTION_STRING") {
        config.database.uri = value;
    }
    if let Some(value) = get_env("FLOE_ENGINE_URI") {
        config.engine.uri = value;
    }
    if let Some(value) = get_env("FLOE_ENGINE_CATALOG") {
        config.engine.catalog = value;
    }
    if let Some(value) = get_env("FLOE_CATALOG_URI") {
        config.catalog.uri = value;
    }
    if let Some(value) = get_env("FLOE_ICEBERG_DEFAULT_DATABASE") {
        config.iceberg.default_database = value;
    }
    if let Some(value) = get_env("FLOE_TASKS_WORKER_COUNT") {
        config.tasks.worker_count = value
            .parse()
            .with_context(|| format!("parsing FLOE_TASKS_WORKER_COUNT {value:?}"))?;
    }
    if let Some(value) = get_env("FLOE_TASKS_POLL_INTERVAL_SECONDS") {
        config.tasks.poll_interval_seconds = value
            .parse()
            .with_context(|| format!("parsing FLOE_TASKS_POLL_INTERVAL_SECONDS {value:?}"))?;
    }
    if let Some(value) = get_env("FLOE_REFRESH_INTERVAL_SECONDS") {
        config.refresh.interval_seconds = value
            .parse()
            .with_context(|| format!("parsing FLOE_REFRESH_INTERVAL_SECONDS {value:?}"))?;
    }
    Ok(())
}

/// Loads configuration from the given file (or `./floe.toml` when present),
/// then applies `FLOE_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AdminConfig> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => {
            let default_path = Path::new("./floe.toml");
            if default_path.exists() {
                let content = std::fs::read_to_string(default_path)
                    .with_context(|| "reading ./floe.toml")?;
                toml::from_str(&content).with_context(|| "parsing ./floe.toml")?
            } else {
                AdminConfig::default()
            }
        }
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = AdminConfig::default();
        assert_eq!(config.engine.catalog, "lakehouse");
        assert_eq!(config.iceberg.default_database, "main");
        assert_eq!(config.tasks.worker_count, 4);
        assert_eq!(config.tasks.poll_interval_seconds, 1);
        assert_eq!(config.refresh.interval_seconds, 3600);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: AdminConfig = toml::from_str(
            r#"
            listen_endpoint = "0.0.0.0:9090"

            [database]
            uri = "postgres://floe@db/floe"

            [tasks]
            worker_count = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_endpoint, "0.0.0.0:9090".parse().unwrap());
        assert_eq!(config.database.uri, "postgres://floe@db/floe");
        assert_eq!(config.tasks.worker_count, 8);
        // untouched sections keep their defaults
        assert_eq!(config.tasks.poll_interval_seconds, 1);
        assert_eq!(config.engine.catalog, "lakehouse");
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_values() {
        unsafe {
            env::set_var("FLOE_TASKS_WORKER_COUNT", "12");
            env::set_var("FLOE_SQL_CONNECTION_STRING", "postgres://floe@env/floe");
        }
        let mut config = AdminConfig::default();
        config.tasks.worker_count = 2;
        config.database.uri = String::from("postgres://floe@file/floe");
        apply_env_overrides(&mut config).unwrap();
        assert_eq!(config.tasks.worker_count, 12);
        assert_eq!(config.database.uri, "postgres://floe@env/floe");
        unsafe {
            env::remove_var("FLOE_TASKS_WORKER_COUNT");
            env::remove_var("FLOE_SQL_CONNECTION_STRING");
        }
    }
}
