//! Database catalog: the data records the orchestrator is parameterised by
//!
//! Every supported database is a [`DatabaseSpec`]: an ordered list of
//! container roles, a readiness check and a client session description.
//! The built-in entries live in `builtin.rs`; users can add or override
//! entries through `[databases.<name>]` tables in the global config.

use crate::{ConfigError, GlobalConfig, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_secs: u64,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay_secs: u64) -> Self {
        Self {
            attempts,
            delay_secs,
        }
    }

    /// 30 attempts, one second apart
    pub const fn readiness_default() -> Self {
        Self::new(30, 1)
    }

    /// 5 attempts, five seconds apart
    pub const fn client_default() -> Self {
        Self::new(5, 5)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::readiness_default()
    }
}

/// One container in a topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub image: String,
    /// Container port published to the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Fixed host port; the engine allocates one when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Command override, subject to `${...}` substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    /// Data path inside the container that a host data directory binds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    /// Seconds to wait after starting this role before starting the next
    #[serde(default)]
    pub settle_secs: u64,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            port: None,
            host_port: None,
            env: BTreeMap::new(),
            cmd: None,
            volume: None,
            settle_secs: 0,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cmd<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn volume(mut self, path: impl Into<String>) -> Self {
        self.volume = Some(path.into());
        self
    }

    pub fn settle(mut self, secs: u64) -> Self {
        self.settle_secs = secs;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

/// How readiness is determined
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSpec {
    /// Considered ready as soon as the containers run
    #[default]
    None,
    /// Run a command inside a container; exit status 0 means ready
    Exec {
        command: Vec<String>,
        /// Defaults to the primary role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    /// TCP connect to the primary host port
    Tcp,
    /// HTTP GET on the primary host port answering 2xx
    Http {
        #[serde(default = "default_http_path")]
        path: String,
    },
    /// PostgreSQL protocol connect followed by `SELECT 1`
    Postgres {
        user: String,
        password: String,
        database: String,
    },
}

fn default_http_path() -> String {
    "/".to_string()
}

/// Readiness check plus its retry budget
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSpec {
    pub check: CheckSpec,
    pub retry: RetryPolicy,
}

impl ReadinessSpec {
    pub fn new(check: CheckSpec, retry: RetryPolicy) -> Self {
        Self { check, retry }
    }
}

/// The interactive session attached once the database is ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientKind {
    /// Interactive command exec'd inside a running role's container
    Exec {
        command: Vec<String>,
        /// Defaults to the primary role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    /// Throwaway client container joined to the instance network
    Sidecar { image: String, command: Vec<String> },
    /// Browser interface served on a role's host port
    Web {
        #[serde(default = "default_http_path")]
        path: String,
        /// Defaults to the primary role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
}

/// Client session description plus its connection retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSpec {
    #[serde(flatten)]
    pub kind: ClientKind,
    #[serde(default = "RetryPolicy::client_default")]
    pub retry: RetryPolicy,
}

impl ClientSpec {
    pub fn exec<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ClientKind::Exec {
                command: command.into_iter().map(Into::into).collect(),
                role: None,
            },
            retry: RetryPolicy::client_default(),
        }
    }

    pub fn sidecar<I, S>(image: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ClientKind::Sidecar {
                image: image.into(),
                command: command.into_iter().map(Into::into).collect(),
            },
            retry: RetryPolicy::client_default(),
        }
    }

    pub fn web(path: impl Into<String>) -> Self {
        Self {
            kind: ClientKind::Web {
                path: path.into(),
                role: None,
            },
            retry: RetryPolicy::client_default(),
        }
    }

    /// Run the client against a specific role instead of the primary one
    pub fn on_role(mut self, name: impl Into<String>) -> Self {
        match &mut self.kind {
            ClientKind::Exec { role, .. } | ClientKind::Web { role, .. } => {
                *role = Some(name.into())
            }
            ClientKind::Sidecar { .. } => {}
        }
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Everything needed to run one database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// Catalog key; filled from the table name for config entries
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Containers in start order
    pub roles: Vec<RoleSpec>,
    /// Role whose host port is the instance's primary port; defaults to the last role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default)]
    pub readiness: ReadinessSpec,
    pub client: ClientSpec,
}

impl DatabaseSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, client: ClientSpec) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            roles: Vec::new(),
            primary: None,
            readiness: ReadinessSpec::default(),
            client,
        }
    }

    pub fn role(mut self, role: RoleSpec) -> Self {
        self.roles.push(role);
        self
    }

    pub fn primary(mut self, role: impl Into<String>) -> Self {
        self.primary = Some(role.into());
        self
    }

    pub fn readiness(mut self, check: CheckSpec, retry: RetryPolicy) -> Self {
        self.readiness = ReadinessSpec::new(check, retry);
        self
    }

    /// Whether this database runs as several containers on a private network
    pub fn is_clustered(&self) -> bool {
        self.roles.len() > 1
    }

    /// Look up a role by name
    pub fn find_role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// The externally reachable role
    pub fn primary_role(&self) -> Option<&RoleSpec> {
        match &self.primary {
            Some(name) => self.find_role(name),
            None => self.roles.last(),
        }
    }

    /// Every image the database needs, roles first, without duplicates
    pub fn images(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let sidecar = match &self.client.kind {
            ClientKind::Sidecar { image, .. } => Some(image.as_str()),
            _ => None,
        };
        self.roles
            .iter()
            .map(|r| r.image.as_str())
            .chain(sidecar)
            .filter(|image| seen.insert(*image))
            .collect()
    }

    /// Check the record is internally consistent
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ConfigError::InvalidDatabase {
            name: self.name.clone(),
            reason,
        };

        if self.roles.is_empty() {
            return Err(invalid("at least one role is required".to_string()));
        }

        let mut names = HashSet::new();
        for role in &self.roles {
            if role.name.is_empty() || role.image.is_empty() {
                return Err(invalid("roles need a name and an image".to_string()));
            }
            if !role
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(invalid(format!("role name '{}' is not a valid hostname", role.name)));
            }
            if !names.insert(role.name.as_str()) {
                return Err(invalid(format!("duplicate role '{}'", role.name)));
            }
            if role.host_port.is_some() && role.port.is_none() {
                return Err(invalid(format!(
                    "role '{}' pins a host port without a container port",
                    role.name
                )));
            }
        }

        let primary = self
            .primary_role()
            .ok_or_else(|| invalid(format!("unknown primary role {:?}", self.primary)))?;

        let needs_port = matches!(
            self.readiness.check,
            CheckSpec::Tcp | CheckSpec::Http { .. } | CheckSpec::Postgres { .. }
        );
        if needs_port && primary.port.is_none() {
            return Err(invalid(format!(
                "primary role '{}' exposes no port for its readiness check",
                primary.name
            )));
        }

        if let CheckSpec::Exec { command, role } = &self.readiness.check {
            if command.is_empty() {
                return Err(invalid("readiness command is empty".to_string()));
            }
            if let Some(role) = role {
                if self.find_role(role).is_none() {
                    return Err(invalid(format!("readiness role '{}' does not exist", role)));
                }
            }
        }

        match &self.client.kind {
            ClientKind::Exec { command, role } => {
                if command.is_empty() {
                    return Err(invalid("client command is empty".to_string()));
                }
                if let Some(role) = role {
                    if self.find_role(role).is_none() {
                        return Err(invalid(format!("client role '{}' does not exist", role)));
                    }
                }
            }
            ClientKind::Sidecar { image, command } => {
                if image.is_empty() || command.is_empty() {
                    return Err(invalid("sidecar client needs an image and a command".to_string()));
                }
                if !self.is_clustered() {
                    return Err(invalid(
                        "sidecar clients need a multi-role topology with a private network"
                            .to_string(),
                    ));
                }
            }
            ClientKind::Web { role, .. } => {
                let target = match role {
                    Some(role) => self
                        .find_role(role)
                        .ok_or_else(|| invalid(format!("client role '{}' does not exist", role)))?,
                    None => primary,
                };
                if target.port.is_none() {
                    return Err(invalid(format!(
                        "web client role '{}' exposes no port",
                        target.name
                    )));
                }
            }
        }

        if self.readiness.retry.attempts == 0 || self.client.retry.attempts == 0 {
            return Err(invalid("retry attempts must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// The set of databases dbin knows how to run
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, DatabaseSpec>,
}

impl Catalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// The databases shipped with dbin
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for spec in crate::builtin::databases() {
            catalog.entries.insert(spec.name.clone(), spec);
        }
        catalog
    }

    /// Built-in databases merged with the `[databases]` tables of the config
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        let mut catalog = Self::builtin();
        for (name, spec) in &config.databases {
            let mut spec = spec.clone();
            spec.name = name.clone();
            if catalog.entries.contains_key(name) {
                tracing::debug!("Config overrides built-in database '{}'", name);
            }
            catalog.insert(spec)?;
        }
        Ok(catalog)
    }

    /// Add or replace an entry after validating it
    pub fn insert(&mut self, spec: DatabaseSpec) -> Result<()> {
        if spec.name.is_empty() {
            return Err(ConfigError::Invalid("database entries need a name".to_string()));
        }
        spec.validate()?;
        self.entries.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseSpec> {
        self.entries.get(name)
    }

    /// Entries sorted by name
    pub fn list(&self) -> impl Iterator<Item = &DatabaseSpec> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
