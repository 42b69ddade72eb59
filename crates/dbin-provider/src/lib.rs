//! Container engine gateway for dbin
//!
//! This crate provides an abstraction over container runtimes (Docker, Podman)
//! covering exactly the operations an ephemeral database needs: image
//! presence and pulls, container and network lifecycle, inspection, exec
//! and log streaming.

mod docker;
mod error;
mod types;

pub use docker::DockerProvider;
pub use error::*;
pub use types::*;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for container providers (Docker, Podman, etc.)
#[async_trait]
pub trait ContainerProvider: Send + Sync {
    /// Check whether an image is present locally (no network I/O)
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull an image from a registry.
    /// Decoded progress events are sent to the provided channel
    async fn pull(&self, image: &str, progress: mpsc::UnboundedSender<PullEvent>)
        -> Result<ImageId>;

    /// Create a container from an image
    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId>;

    /// Start a container
    async fn start(&self, id: &ContainerId) -> Result<()>;

    /// Stop a container
    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()>;

    /// Remove a container
    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()>;

    /// Force-remove a container by name
    async fn remove_by_name(&self, name: &str) -> Result<()>;

    /// Execute a command in a running container and wait for it
    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult>;

    /// List containers managed by dbin
    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>>;

    /// Get detailed information about a container
    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails>;

    /// Get container logs
    async fn logs(&self, id: &ContainerId, config: &LogConfig) -> Result<LogStream>;

    /// Create a private bridge network
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId>;

    /// Attach a container to a network so peers can resolve it by name
    async fn connect_network(&self, network: &NetworkId, container: &ContainerId) -> Result<()>;

    /// Remove a network
    async fn remove_network(&self, network: &NetworkId) -> Result<()>;

    /// List networks managed by dbin
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>>;

    /// Check if the provider is available/connected
    async fn ping(&self) -> Result<()>;

    /// Get provider information
    fn info(&self) -> ProviderInfo;
}

/// Factory function to create a provider based on type
pub async fn create_provider(
    provider_type: ProviderType,
    config: &dbin_config::GlobalConfig,
) -> Result<Box<dyn ContainerProvider>> {
    match provider_type {
        ProviderType::Docker => {
            let socket = &config.providers.docker.socket;
            let provider = DockerProvider::new(socket).await?;
            Ok(Box::new(provider))
        }
        ProviderType::Podman => {
            let socket = &config.providers.podman.socket;
            let provider = DockerProvider::new_podman(socket).await?;
            Ok(Box::new(provider))
        }
    }
}

/// Test if a specific provider is available and responsive
pub async fn test_provider_connectivity(
    provider_type: ProviderType,
    config: &dbin_config::GlobalConfig,
) -> bool {
    match create_provider(provider_type, config).await {
        Ok(provider) => provider.ping().await.is_ok(),
        Err(_) => false,
    }
}

/// Detect which providers are available on the system.
/// Returns (ProviderType, is_available) pairs, Docker first
pub async fn detect_available_providers(
    config: &dbin_config::GlobalConfig,
) -> Vec<(ProviderType, bool)> {
    let (docker, podman) = tokio::join!(
        test_provider_connectivity(ProviderType::Docker, config),
        test_provider_connectivity(ProviderType::Podman, config)
    );

    vec![(ProviderType::Docker, docker), (ProviderType::Podman, podman)]
}

/// Create the provider named in the global config.
/// If no provider is configured (empty), auto-detects by trying Docker first, then Podman
pub async fn create_default_provider(
    config: &dbin_config::GlobalConfig,
) -> Result<Box<dyn ContainerProvider>> {
    let provider_type = match config.defaults.provider.as_str() {
        "" => {
            tracing::debug!("No provider configured, auto-detecting...");
            let available = detect_available_providers(config).await;

            match available.iter().find(|(_, available)| *available) {
                Some((provider_type, _)) => {
                    tracing::debug!("Auto-detected provider: {}", provider_type);
                    *provider_type
                }
                None => {
                    // Neither available, default to Docker for better error messages
                    tracing::warn!("No providers detected, defaulting to Docker");
                    ProviderType::Docker
                }
            }
        }
        other => other.parse().map_err(ProviderError::ConfigError)?,
    };

    connect(provider_type, config).await
}

/// Create a provider of the given type, turning connection failures into
/// an actionable message
pub async fn connect(
    provider_type: ProviderType,
    config: &dbin_config::GlobalConfig,
) -> Result<Box<dyn ContainerProvider>> {
    let socket_path = match provider_type {
        ProviderType::Podman => &config.providers.podman.socket,
        ProviderType::Docker => &config.providers.docker.socket,
    };

    match create_provider(provider_type, config).await {
        Ok(provider) => Ok(provider),
        Err(e) => {
            let socket_exists =
                std::path::Path::new(socket_path.trim_start_matches("unix://")).exists();
            Err(ProviderError::ConnectionError(format_connection_error(
                provider_type,
                socket_path,
                socket_exists,
                &e,
            )))
        }
    }
}

/// Format a helpful connection error message with actionable instructions
fn format_connection_error(
    provider: ProviderType,
    socket_path: &str,
    socket_exists: bool,
    underlying: &ProviderError,
) -> String {
    let provider_name = match provider {
        ProviderType::Podman => "Podman",
        ProviderType::Docker => "Docker",
    };

    let mut msg = format!("Cannot connect to {}\n\n", provider_name);

    if !socket_exists {
        msg.push_str(&format!(
            "The {} API socket was not found at:\n  {}\n\n",
            provider_name, socket_path
        ));

        match provider {
            ProviderType::Podman => {
                msg.push_str("To enable the Podman socket, run:\n");
                msg.push_str("  systemctl --user enable --now podman.socket\n");
            }
            ProviderType::Docker => {
                msg.push_str("To start Docker, run:\n");
                msg.push_str("  sudo systemctl enable --now docker\n");
            }
        }
    } else {
        msg.push_str(&format!(
            "The socket exists at {} but the daemon is not responding.\n\n",
            socket_path
        ));
        msg.push_str(&format!("Underlying error: {}\n", underlying));
    }

    msg
}
