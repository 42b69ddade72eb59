//! Topology creation and teardown
//!
//! Roles start in catalog order. Every container is recorded on the
//! instance the moment the engine hands back its id, so a failure at any
//! later point still leaves teardown a complete picture of what exists.

use crate::instance::{DatabaseInstance, RoleBinding};
use crate::{CoreError, Result};
use dbin_config::{substitute_map, substitute_vec, DatabaseSpec, RoleSpec, SubstitutionContext};
use dbin_provider::{
    BindMount, ContainerId, ContainerProvider, CreateContainerConfig, NetworkConfig, PortConfig,
    ProviderError,
};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lower bound on the time any single teardown step may take
pub const CLEANUP_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace on top of the engine's stop timeout before a step is abandoned
const CLEANUP_STEP_GRACE: Duration = Duration::from_secs(5);

/// A teardown step that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub resource: String,
    pub action: &'static str,
    pub message: String,
}

/// What teardown released and what it could not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_containers: Vec<String>,
    pub removed_network: Option<String>,
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, resource: impl Into<String>, action: &'static str, err: ProviderError) {
        let warning = CleanupWarning {
            resource: resource.into(),
            action,
            message: err.to_string(),
        };
        warn!(
            "Failed to {} {}: {}",
            warning.action, warning.resource, warning.message
        );
        self.warnings.push(warning);
    }
}

/// Run one teardown step, giving up after `limit`
async fn bounded<F>(limit: Duration, step: F) -> std::result::Result<(), ProviderError>
where
    F: Future<Output = std::result::Result<(), ProviderError>>,
{
    match tokio::time::timeout(limit, step).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout),
    }
}

/// Treat "already gone" as success
fn ignore_not_found(result: std::result::Result<(), ProviderError>) -> std::result::Result<(), ProviderError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Creates and destroys the containers behind a [`DatabaseInstance`]
pub struct TopologyBuilder<'a> {
    provider: &'a dyn ContainerProvider,
    stop_timeout: u32,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(provider: &'a dyn ContainerProvider, stop_timeout: u32) -> Self {
        Self {
            provider,
            stop_timeout,
        }
    }

    /// Time allowed for one teardown step: the stop timeout plus some grace,
    /// never less than [`CLEANUP_STEP_TIMEOUT`]
    pub fn step_timeout(&self) -> Duration {
        let stop = Duration::from_secs(u64::from(self.stop_timeout)) + CLEANUP_STEP_GRACE;
        stop.max(CLEANUP_STEP_TIMEOUT)
    }

    /// Provision every role of `spec` into `instance`.
    ///
    /// Every image of `spec` must already be present; see
    /// [`crate::ensure_images`]. On error the instance holds exactly the
    /// resources created so far and the caller is expected to run
    /// [`TopologyBuilder::teardown`]. `host_port` pins the primary role's
    /// host port.
    pub async fn create(
        &self,
        spec: &DatabaseSpec,
        instance: &mut DatabaseInstance,
        host_port: Option<u16>,
    ) -> Result<()> {
        let ctx = instance.substitution_context(spec);

        if spec.is_clustered() {
            let name = instance.network_name();
            let network = self
                .provider
                .create_network(&NetworkConfig {
                    name: name.clone(),
                    labels: instance.labels(None),
                })
                .await
                .map_err(|e| CoreError::provision(format!("network {}", name), e))?;
            debug!("Created network {} ({})", name, network);
            instance.network = Some(network);
        }

        if matches!(spec.client.kind, dbin_config::ClientKind::Sidecar { .. }) {
            instance.client_container = Some(instance.client_container_name());
        }

        let last = spec.roles.len().saturating_sub(1);
        for (i, role) in spec.roles.iter().enumerate() {
            let pin = if role.name == instance.primary_role {
                host_port.or(role.host_port)
            } else {
                role.host_port
            };
            self.start_role(spec, role, instance, &ctx, pin).await?;

            if role.settle_secs > 0 && i < last {
                debug!("Waiting {}s for {} to settle", role.settle_secs, role.name);
                tokio::time::sleep(role.settle_delay()).await;
            }
        }

        for role in spec.roles.iter().filter(|r| r.port.is_some()) {
            let port = self.published_port(instance, role).await?;
            instance.host_ports.insert(role.name.clone(), port);
        }

        Ok(())
    }

    async fn start_role(
        &self,
        spec: &DatabaseSpec,
        role: &RoleSpec,
        instance: &mut DatabaseInstance,
        ctx: &SubstitutionContext,
        host_port: Option<u16>,
    ) -> Result<()> {
        let name = instance.container_name(&role.name);
        let config = CreateContainerConfig {
            image: role.image.clone(),
            name: Some(name.clone()),
            cmd: role.cmd.as_ref().map(|cmd| substitute_vec(cmd, ctx)),
            env: substitute_map(&role.env, ctx),
            binds: self.bind_for(spec, role, instance)?.into_iter().collect(),
            ports: role
                .port
                .map(|port| PortConfig::tcp(port, host_port))
                .into_iter()
                .collect(),
            labels: instance.labels(Some(&role.name)),
        };

        info!("Starting {} ({})", role.name, role.image);
        let id = self
            .provider
            .create(&config)
            .await
            .map_err(|e| CoreError::provision(format!("container {}", name), e))?;

        instance.roles.push(RoleBinding {
            role: role.name.clone(),
            container_id: id.clone(),
            container_name: name.clone(),
        });

        if let Some(network) = &instance.network {
            self.provider
                .connect_network(network, &id)
                .await
                .map_err(|e| CoreError::provision(format!("network for {}", name), e))?;
        }

        self.provider
            .start(&id)
            .await
            .map_err(|e| CoreError::provision(format!("container {}", name), e))?;
        debug!("Started {} as {}", name, id.short());
        Ok(())
    }

    /// Host data directory binding for a role, if one applies
    fn bind_for(
        &self,
        spec: &DatabaseSpec,
        role: &RoleSpec,
        instance: &DatabaseInstance,
    ) -> Result<Option<BindMount>> {
        let (Some(data_dir), Some(volume)) = (&instance.data_dir, &role.volume) else {
            return Ok(None);
        };

        let source: PathBuf = if spec.is_clustered() {
            let dir = data_dir.join(&role.name);
            std::fs::create_dir_all(&dir)
                .map_err(|e| CoreError::provision(format!("data directory {}", dir.display()), e))?;
            dir
        } else {
            data_dir.clone()
        };

        Ok(Some(BindMount {
            source: source.to_string_lossy().into_owned(),
            target: volume.clone(),
        }))
    }

    async fn published_port(&self, instance: &DatabaseInstance, role: &RoleSpec) -> Result<u16> {
        let binding = instance
            .binding(&role.name)
            .ok_or_else(|| CoreError::provision(&role.name, "role was never started"))?;
        let container_port = role.port.unwrap_or_default();

        let details = self
            .provider
            .inspect(&binding.container_id)
            .await
            .map_err(|e| CoreError::provision(&binding.container_name, e))?;

        details.host_port(container_port).ok_or_else(|| {
            CoreError::provision(
                &binding.container_name,
                format!("no host port published for {}/tcp", container_port),
            )
        })
    }

    /// Release everything recorded on `instance`.
    ///
    /// The client container goes first, then roles in reverse start order,
    /// then the network. Failures are collected, never returned, and every
    /// step runs regardless of earlier ones. Resources are taken off the
    /// instance as they are handled, so a second call does nothing.
    pub async fn teardown(&self, instance: &mut DatabaseInstance) -> CleanupReport {
        let mut report = CleanupReport::default();

        if let Some(name) = instance.client_container.take() {
            let result =
                bounded(self.step_timeout(), self.provider.remove_by_name(&name)).await;
            if let Err(e) = ignore_not_found(result) {
                report.warn(&name, "remove", e);
            }
        }

        let roles = std::mem::take(&mut instance.roles);
        for binding in roles.iter().rev() {
            self.remove_container(&binding.container_id, &binding.container_name, &mut report)
                .await;
        }

        if let Some(network) = instance.network.take() {
            let name = instance.network_name();
            let result =
                bounded(self.step_timeout(), self.provider.remove_network(&network)).await;
            match ignore_not_found(result) {
                Ok(()) => {
                    debug!("Removed network {}", name);
                    report.removed_network = Some(name);
                }
                Err(e) => report.warn(name, "remove", e),
            }
        }

        instance.host_ports.clear();
        report
    }

    async fn remove_container(&self, id: &ContainerId, name: &str, report: &mut CleanupReport) {
        let stop = self.provider.stop(id, Some(self.stop_timeout));
        let stopped = bounded(self.step_timeout(), stop).await;
        if let Err(e) = ignore_not_found(stopped) {
            report.warn(name, "stop", e);
        }

        let removed = bounded(self.step_timeout(), self.provider.remove(id, true)).await;
        match ignore_not_found(removed) {
            Ok(()) => {
                debug!("Removed container {}", name);
                report.removed_containers.push(name.to_string());
            }
            Err(e) => report.warn(name, "remove", e),
        }
    }
}

/// Remove every dbin-labelled container and network the engine knows about.
///
/// Used to recover from runs that were killed before they could clean up.
pub async fn purge_managed(
    provider: &dyn ContainerProvider,
    stop_timeout: u32,
) -> Result<CleanupReport> {
    let builder = TopologyBuilder::new(provider, stop_timeout);
    let mut report = CleanupReport::default();

    let containers = provider.list(true).await?;
    for container in containers.iter().filter(|c| c.is_dbin_managed()) {
        builder
            .remove_container(&container.id, &container.name, &mut report)
            .await;
    }

    let networks = provider.list_networks().await?;
    for network in networks {
        let result =
            bounded(builder.step_timeout(), provider.remove_network(&network.id)).await;
        match ignore_not_found(result) {
            Ok(()) => report.removed_network = Some(network.name),
            Err(e) => report.warn(network.name, "remove", e),
        }
    }

    Ok(report)
}
