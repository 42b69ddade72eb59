//! Common types for container providers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Label marking every resource created by dbin
pub const MANAGED_LABEL: &str = "dbin.managed";
/// Label carrying the instance id a resource belongs to
pub const INSTANCE_LABEL: &str = "dbin.instance";
/// Label carrying the catalog name of the database
pub const DATABASE_LABEL: &str = "dbin.database";
/// Label carrying the topology role of a container
pub const ROLE_LABEL: &str = "dbin.role";

/// Container ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        if self.0.len() > 12 {
            &self.0[..12]
        } else {
            &self.0
        }
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Network ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NetworkId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Image ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Docker,
    Podman,
}

impl ProviderType {
    /// Name of the command-line binary for this runtime
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

/// Container status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// One decoded event from an image pull stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullEvent {
    /// Engine status text ("Downloading", "Pull complete", ...)
    pub status: String,
    /// Layer the event refers to, if any
    pub layer_id: Option<String>,
    /// Human readable progress bar supplied by the engine
    pub progress_text: Option<String>,
    pub current_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl PullEvent {
    /// Whether this event reports byte progress for a layer being downloaded
    pub fn is_downloading(&self) -> bool {
        self.status == "Downloading"
            && self.layer_id.is_some()
            && self
                .progress_text
                .as_deref()
                .map_or(false, |p| !p.is_empty())
    }
}

/// Configuration for creating a container
#[derive(Debug, Clone, Default)]
pub struct CreateContainerConfig {
    /// Image to use
    pub image: String,
    /// Container name
    pub name: Option<String>,
    /// Command to run
    pub cmd: Option<Vec<String>>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Host directories bound into the container
    pub binds: Vec<BindMount>,
    /// Port mappings
    pub ports: Vec<PortConfig>,
    /// Labels
    pub labels: HashMap<String, String>,
}

/// Host path bound into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
}

impl BindMount {
    /// Engine `source:target` form
    pub fn spec(&self) -> String {
        format!("{}:{}", self.source, self.target)
    }
}

/// Port configuration
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Host port (None for auto-assign)
    pub host_port: Option<u16>,
    /// Container port
    pub container_port: u16,
    /// Protocol (tcp/udp)
    pub protocol: String,
    /// Host IP to bind to
    pub host_ip: Option<String>,
}

impl PortConfig {
    /// TCP port published on all host interfaces
    pub fn tcp(container_port: u16, host_port: Option<u16>) -> Self {
        Self {
            host_port,
            container_port,
            protocol: "tcp".to_string(),
            host_ip: Some("0.0.0.0".to_string()),
        }
    }
}

/// Exec configuration
#[derive(Debug, Clone, Default)]
pub struct ExecConfig {
    /// Command to execute
    pub cmd: Vec<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// User to run as
    pub user: Option<String>,
}

/// Result of exec command
#[derive(Debug)]
pub struct ExecResult {
    /// Exit code
    pub exit_code: i64,
    /// Combined stdout/stderr output
    pub output: String,
}

/// Basic container info for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub created: i64,
    pub labels: HashMap<String, String>,
}

impl ContainerInfo {
    /// Check if this container is managed by dbin
    pub fn is_dbin_managed(&self) -> bool {
        self.labels.contains_key(MANAGED_LABEL)
    }

    /// Instance id the container belongs to, if labelled
    pub fn instance(&self) -> Option<&str> {
        self.labels.get(INSTANCE_LABEL).map(|s| s.as_str())
    }
}

/// Detailed container information
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub exit_code: Option<i64>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortInfo>,
}

impl ContainerDetails {
    /// Host port the engine bound for a container port, ignoring unbound entries
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .filter(|p| p.container_port == container_port)
            .filter_map(|p| p.host_port)
            .find(|p| *p != 0)
    }
}

/// Port information
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub container_port: u16,
    pub host_port: Option<u16>,
    pub protocol: String,
    pub host_ip: Option<String>,
}

/// Configuration for creating a network
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// Basic network info for listing
#[derive(Debug, Clone)]
pub struct NetworkSummary {
    pub id: NetworkId,
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// Log configuration
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Follow log output
    pub follow: bool,
    /// Show stdout
    pub stdout: bool,
    /// Show stderr
    pub stderr: bool,
    /// Number of lines from end to show
    pub tail: Option<u64>,
}

/// Log stream with engine framing already removed
pub struct LogStream {
    pub stream: Pin<Box<dyn AsyncRead + Send>>,
}

/// Provider information
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider_type: ProviderType,
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}
