//! Global configuration for dbin
//!
//! Located at `~/.config/dbin/config.toml`

use crate::{ConfigError, DatabaseSpec, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Global dbin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub defaults: DefaultsConfig,
    pub providers: ProvidersConfig,
    /// Extra or overriding catalog entries, keyed by database name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub databases: BTreeMap<String, DatabaseSpec>,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Default container provider ("docker" or "podman", empty to auto-detect)
    pub provider: String,
    /// Seconds the engine waits for a container to stop before killing it
    pub stop_timeout: u32,
    /// Stream container logs to the terminal by default
    pub debug: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            stop_timeout: 10,
            debug: false,
        }
    }
}

/// Provider-specific configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub docker: DockerConfig,
    pub podman: PodmanConfig,
}

/// Docker-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker socket path
    pub socket: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: default_docker_socket(),
        }
    }
}

#[cfg(windows)]
fn default_docker_socket() -> String {
    "//./pipe/docker_engine".to_string()
}

#[cfg(not(windows))]
fn default_docker_socket() -> String {
    "/var/run/docker.sock".to_string()
}

/// Podman-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PodmanConfig {
    /// Podman socket path
    pub socket: String,
}

impl Default for PodmanConfig {
    fn default() -> Self {
        Self {
            socket: default_podman_socket(),
        }
    }
}

#[cfg(target_os = "linux")]
fn default_podman_socket() -> String {
    std::env::var("XDG_RUNTIME_DIR")
        .map(|dir| format!("{}/podman/podman.sock", dir))
        .unwrap_or_else(|_| "/run/user/1000/podman/podman.sock".to_string())
}

#[cfg(target_os = "macos")]
fn default_podman_socket() -> String {
    dirs::home_dir()
        .map(|h| {
            format!(
                "{}/.local/share/containers/podman/machine/podman-machine-default/podman.sock",
                h.display()
            )
        })
        .unwrap_or_else(|| "/var/run/podman.sock".to_string())
}

#[cfg(windows)]
fn default_podman_socket() -> String {
    "//./pipe/podman-machine-default".to_string()
}

impl GlobalConfig {
    /// Load global configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            "Loaded config from {:?}: provider={:?}, {} custom database(s)",
            path,
            config.defaults.provider,
            config.databases.len()
        );

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the config file path; `DBIN_CONFIG` overrides the platform default
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os("DBIN_CONFIG").filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let dirs = ProjectDirs::from("", "", "dbin").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckSpec, ClientKind};

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert!(config.defaults.provider.is_empty(), "Provider should be empty for auto-detection");
        assert_eq!(config.defaults.stop_timeout, 10);
        assert!(!config.defaults.debug);
        assert!(config.databases.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[defaults]
provider = "podman"
stop_timeout = 3

[providers.docker]
socket = "/var/run/docker.sock"

[providers.podman]
socket = "/run/user/1000/podman/podman.sock"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.defaults.provider, "podman");
        assert_eq!(config.defaults.stop_timeout, 3);
        assert_eq!(config.providers.podman.socket, "/run/user/1000/podman/podman.sock");
    }

    #[test]
    fn test_parse_custom_database() {
        let toml = r#"
[databases.memcached]
description = "Memcached in-memory cache"

[[databases.memcached.roles]]
name = "cache"
image = "memcached:latest"
port = 11211

[databases.memcached.readiness]
check = { type = "tcp" }
retry = { attempts = 10, delay_secs = 1 }

[databases.memcached.client]
type = "exec"
command = ["sh"]
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        let spec = &config.databases["memcached"];
        assert_eq!(spec.roles.len(), 1);
        assert_eq!(spec.roles[0].port, Some(11211));
        assert_eq!(spec.readiness.check, CheckSpec::Tcp);
        assert_eq!(spec.readiness.retry.attempts, 10);
        assert!(matches!(&spec.client.kind, ClientKind::Exec { command, .. } if command == &["sh"]));
        assert_eq!(spec.client.retry.attempts, 5, "client retry falls back to its default");
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut config = GlobalConfig::default();
        config.defaults.provider = "docker".to_string();
        config.defaults.debug = true;
        config.save_to(&path).unwrap();

        let loaded = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(loaded.defaults.provider, "docker");
        assert!(loaded.defaults.debug);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = GlobalConfig::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.defaults.stop_timeout, 10);
    }

    #[test]
    fn test_parse_error_names_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[defaults\nprovider = 1").unwrap();
        let err = GlobalConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
