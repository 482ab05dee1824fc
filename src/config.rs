//! Configuration management for eballscan

use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prepended to every route, e.g. `/eballscan/getBlock`.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            route_prefix: default_route_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Keep everything in memory; nothing survives a restart.
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    20680
}

fn default_route_prefix() -> String {
    "/eballscan".to_string()
}

fn default_db_path() -> String {
    "./data/eballscan.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line settings, applied after the file and the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub port: Option<u16>,
    pub db: Option<String>,
    pub in_memory: bool,
}

impl Config {
    /// Parses TOML only; call [`Config::validate`] once every override is in.
    pub fn from_toml(text: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `PORT` and `EBALLSCAN_DB` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(path) = var("EBALLSCAN_DB") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(db) = &overrides.db {
            self.database.path = db.clone();
        }
        if overrides.in_memory {
            self.database.in_memory = true;
        }
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.database.in_memory && self.database.path.is_empty() {
            return Err("database.path must be set in config.toml".into());
        }

        let prefix = &self.server.route_prefix;
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(format!(
                "server.route_prefix must start with '/' and not end with one, got {:?}",
                prefix
            )
            .into());
        }

        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

/// Loads `path` (defaults when the file is absent), then layers the
/// environment and `overrides` on top and validates the result.
pub fn load_config_from(
    path: impl AsRef<Path>,
    overrides: &Overrides,
) -> Result<Config, Box<dyn std::error::Error>> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let mut config = if config_str.is_empty() {
        Config::default()
    } else {
        Config::from_toml(&config_str)?
    };

    config.apply_env();
    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 20680);
        assert_eq!(config.server.route_prefix, "/eballscan");
        assert_eq!(config.listen_address(), "0.0.0.0:20680");
        assert!(!config.database.in_memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 8080

            [database]
            in_memory = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert!(config.database.in_memory);
        assert_eq!(config.logging.level, "info");
    }

    fn validated(text: &str) -> Result<Config, Box<dyn std::error::Error>> {
        let config = Config::from_toml(text)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_rejects_bad_prefix() {
        assert!(validated("[server]\nroute_prefix = \"eballscan\"").is_err());
        assert!(validated("[server]\nroute_prefix = \"/eballscan/\"").is_err());
        assert!(validated("[server]\nroute_prefix = \"\"").is_ok());
    }

    #[test]
    fn test_rejects_empty_db_path() {
        assert!(validated("[database]\npath = \"\"").is_err());
        assert!(validated("[database]\npath = \"\"\nin_memory = true").is_ok());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_toml("[server]\nport = 8080\n[database]\npath = \"\"").unwrap();
        config.apply_vars(|key| match key {
            "PORT" => Some("9090".to_string()),
            "EBALLSCAN_DB" => Some("/tmp/env.db".to_string()),
            _ => None,
        });
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.path, "/tmp/env.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unusable_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_vars(|key| match key {
            "PORT" => Some("not-a-port".to_string()),
            "EBALLSCAN_DB" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = Config::default();
        config.apply_vars(|key| match key {
            "PORT" => Some("9090".to_string()),
            "EBALLSCAN_DB" => Some("/tmp/env.db".to_string()),
            _ => None,
        });
        config.apply_overrides(&Overrides {
            port: Some(7070),
            db: Some("/tmp/cli.db".to_string()),
            in_memory: false,
        });
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.database.path, "/tmp/cli.db");
    }

    #[test]
    fn test_overrides_repair_empty_db_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[database]\npath = \"\"\n").unwrap();

        let overrides = Overrides {
            in_memory: true,
            ..Default::default()
        };
        let config = load_config_from(&path, &overrides).unwrap();
        assert!(config.database.in_memory);

        let overrides = Overrides {
            db: Some(dir.path().join("cli.db").to_string_lossy().into_owned()),
            ..Default::default()
        };
        assert!(load_config_from(&path, &overrides).is_ok());
    }

    #[test]
    fn test_apply_env_reads_process_environment() {
        std::env::set_var("EBALLSCAN_DB", "/tmp/from-env.db");
        let mut config = Config::default();
        config.apply_env();
        std::env::remove_var("EBALLSCAN_DB");
        assert_eq!(config.database.path, "/tmp/from-env.db");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let config = load_config_from(&path, &Overrides::default()).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(dir.path().join("absent.toml"), &Overrides::default()).unwrap();
        assert_eq!(config.server.route_prefix, "/eballscan");
    }
}
