//! Readiness probing
//!
//! A probe is retried a bounded number of times with a fixed delay. Probe
//! failures are never errors on their own, only exhausting the budget is.

use crate::instance::DatabaseInstance;
use crate::{CoreError, Result};
use async_trait::async_trait;
use dbin_config::{CheckSpec, DatabaseSpec, RetryPolicy};
use dbin_provider::{ContainerId, ContainerProvider, ExecConfig};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// One way of asking whether the database accepts work
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// What is being probed, for log and error messages
    fn target(&self) -> String;

    /// A single attempt; true means ready
    async fn check(&self) -> bool;
}

/// Run `check` until it succeeds or the retry budget is spent.
///
/// Sleeps `retry.delay()` between attempts but not after the last one.
pub async fn wait_until_ready(check: &dyn ReadinessCheck, retry: &RetryPolicy) -> Result<()> {
    let target = check.target();
    for attempt in 1..=retry.attempts {
        info!(
            "Waiting for {} (attempt {}/{})",
            target, attempt, retry.attempts
        );
        if check.check().await {
            info!("{} is ready", target);
            return Ok(());
        }
        if attempt < retry.attempts {
            tokio::time::sleep(retry.delay()).await;
        }
    }

    Err(CoreError::ReadinessTimeout {
        target,
        attempts: retry.attempts,
    })
}

/// Exit status of a command run inside a container
pub struct ExecCheck<'a> {
    pub provider: &'a dyn ContainerProvider,
    pub container: ContainerId,
    pub command: Vec<String>,
}

#[async_trait]
impl ReadinessCheck for ExecCheck<'_> {
    fn target(&self) -> String {
        format!("container {}", self.container.short())
    }

    async fn check(&self) -> bool {
        let config = ExecConfig {
            cmd: self.command.clone(),
            ..Default::default()
        };
        match self.provider.exec(&self.container, &config).await {
            Ok(result) => {
                if result.exit_code != 0 {
                    trace!("Readiness command exited {}: {}", result.exit_code, result.output);
                }
                result.exit_code == 0
            }
            Err(e) => {
                debug!("Readiness exec failed: {}", e);
                false
            }
        }
    }
}

/// Plain TCP connect to a published port
pub struct TcpCheck {
    pub port: u16,
}

#[async_trait]
impl ReadinessCheck for TcpCheck {
    fn target(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    async fn check(&self) -> bool {
        let addr = format!("127.0.0.1:{}", self.port);
        matches!(
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}

/// HTTP GET answering with a 2xx status
pub struct HttpCheck {
    pub url: String,
    client: reqwest::Client,
}

impl HttpCheck {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ReadinessCheck for HttpCheck {
    fn target(&self) -> String {
        self.url.clone()
    }

    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                trace!("Health check error: {}", e);
                false
            }
        }
    }
}

/// PostgreSQL protocol connect followed by `SELECT 1`
pub struct PostgresCheck {
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl PostgresCheck {
    fn connection_string(&self) -> String {
        format!(
            "host=127.0.0.1 port={} user={} password={} dbname={} connect_timeout={}",
            self.port,
            self.user,
            self.password,
            self.database,
            CONNECT_TIMEOUT.as_secs()
        )
    }

    async fn query(&self) -> std::result::Result<(), tokio_postgres::Error> {
        let (client, connection) =
            tokio_postgres::connect(&self.connection_string(), tokio_postgres::NoTls).await?;
        let conn = tokio::spawn(async move {
            if let Err(e) = connection.await {
                trace!("Postgres connection closed: {}", e);
            }
        });
        let result = client.simple_query("SELECT 1").await.map(|_| ());
        drop(client);
        conn.abort();
        result
    }
}

#[async_trait]
impl ReadinessCheck for PostgresCheck {
    fn target(&self) -> String {
        format!("postgres://{}@127.0.0.1:{}/{}", self.user, self.port, self.database)
    }

    async fn check(&self) -> bool {
        match tokio::time::timeout(Duration::from_secs(5), self.query()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                trace!("Postgres not ready: {}", e);
                false
            }
            Err(_) => false,
        }
    }
}

/// Build the probe a database asks for, or `None` when it has none
pub fn readiness_check<'a>(
    spec: &DatabaseSpec,
    instance: &DatabaseInstance,
    provider: &'a dyn ContainerProvider,
) -> Result<Option<Box<dyn ReadinessCheck + 'a>>> {
    let primary_port = || {
        instance.primary_port().ok_or_else(|| {
            CoreError::provision(&instance.primary_role, "no host port was published")
        })
    };

    let check: Box<dyn ReadinessCheck + 'a> = match &spec.readiness.check {
        CheckSpec::None => return Ok(None),
        CheckSpec::Exec { command, role } => {
            let role = role.as_deref().unwrap_or(&instance.primary_role);
            let binding = instance
                .binding(role)
                .ok_or_else(|| CoreError::provision(role, "role is not running"))?;
            Box::new(ExecCheck {
                provider,
                container: binding.container_id.clone(),
                command: command.clone(),
            })
        }
        CheckSpec::Tcp => Box::new(TcpCheck {
            port: primary_port()?,
        }),
        CheckSpec::Http { path } => Box::new(HttpCheck::new(format!(
            "http://127.0.0.1:{}/{}",
            primary_port()?,
            path.trim_start_matches('/')
        ))),
        CheckSpec::Postgres {
            user,
            password,
            database,
        } => Box::new(PostgresCheck {
            port: primary_port()?,
            user: user.clone(),
            password: password.clone(),
            database: database.clone(),
        }),
    };
    Ok(Some(check))
}

/// Wait until the instance reports ready, per its database's readiness spec
pub async fn probe(
    spec: &DatabaseSpec,
    instance: &DatabaseInstance,
    provider: &dyn ContainerProvider,
) -> Result<()> {
    match readiness_check(spec, instance, provider)? {
        Some(check) => wait_until_ready(check.as_ref(), &spec.readiness.retry).await,
        None => {
            debug!("{} has no readiness check", spec.name);
            Ok(())
        }
    }
}
