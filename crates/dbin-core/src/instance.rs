//! The running instance of one database for one invocation

use dbin_config::{DatabaseSpec, SubstitutionContext};
use dbin_provider::{
    ContainerId, NetworkId, DATABASE_LABEL, INSTANCE_LABEL, MANAGED_LABEL, ROLE_LABEL,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A container created for one role of the topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    pub role: String,
    pub container_id: ContainerId,
    /// Also the hostname peers on the instance network resolve
    pub container_name: String,
}

/// The containers (and optional private network) backing one run.
///
/// `roles` is filled in start order while provisioning and drained exactly
/// once by teardown. `network` is only set for multi-role topologies.
#[derive(Debug, Clone)]
pub struct DatabaseInstance {
    pub id: String,
    pub database: String,
    pub roles: Vec<RoleBinding>,
    pub network: Option<NetworkId>,
    /// Role name to the host port the engine assigned
    pub host_ports: BTreeMap<String, u16>,
    pub primary_role: String,
    pub data_dir: Option<PathBuf>,
    pub debug: bool,
    /// Name reserved for a sidecar client container
    pub client_container: Option<String>,
}

impl DatabaseInstance {
    pub fn new(spec: &DatabaseSpec, data_dir: Option<PathBuf>, debug: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            database: spec.name.clone(),
            roles: Vec::new(),
            network: None,
            host_ports: BTreeMap::new(),
            primary_role: spec
                .primary_role()
                .map(|r| r.name.clone())
                .unwrap_or_default(),
            data_dir,
            debug,
            client_container: None,
        }
    }

    /// First 8 characters of the id, used in resource names
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }

    pub fn container_name(&self, role: &str) -> String {
        format!("dbin-{}-{}-{}", self.database, role, self.short_id())
    }

    pub fn network_name(&self) -> String {
        format!("dbin-{}-{}", self.database, self.short_id())
    }

    pub fn client_container_name(&self) -> String {
        format!("dbin-{}-client-{}", self.database, self.short_id())
    }

    /// Labels for a resource; containers also carry their role
    pub fn labels(&self, role: Option<&str>) -> HashMap<String, String> {
        let mut labels = HashMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (INSTANCE_LABEL.to_string(), self.id.clone()),
            (DATABASE_LABEL.to_string(), self.database.clone()),
        ]);
        if let Some(role) = role {
            labels.insert(ROLE_LABEL.to_string(), role.to_string());
        }
        labels
    }

    /// Hostnames of every role, known before any container exists
    pub fn substitution_context(&self, spec: &DatabaseSpec) -> SubstitutionContext {
        spec.roles.iter().fold(
            SubstitutionContext::new(self.short_id()),
            |ctx, role| ctx.with_host(role.name.as_str(), self.container_name(&role.name)),
        )
    }

    pub fn binding(&self, role: &str) -> Option<&RoleBinding> {
        self.roles.iter().find(|b| b.role == role)
    }

    pub fn primary(&self) -> Option<&RoleBinding> {
        self.binding(&self.primary_role)
    }

    pub fn host_port(&self, role: &str) -> Option<u16> {
        self.host_ports.get(role).copied()
    }

    pub fn primary_port(&self) -> Option<u16> {
        self.host_port(&self.primary_role)
    }

    /// Whether nothing is left to tear down
    pub fn is_released(&self) -> bool {
        self.roles.is_empty() && self.network.is_none() && self.client_container.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbin_config::Catalog;

    #[test]
    fn test_names_share_short_id() {
        let spec = Catalog::builtin().get("tidb").cloned().unwrap();
        let instance = DatabaseInstance::new(&spec, None, false);
        let short = instance.short_id().to_string();
        assert_eq!(short.len(), 8);
        assert_eq!(instance.container_name("pd"), format!("dbin-tidb-pd-{}", short));
        assert_eq!(instance.network_name(), format!("dbin-tidb-{}", short));
        assert_eq!(instance.client_container_name(), format!("dbin-tidb-client-{}", short));
        assert_eq!(instance.primary_role, "tidb");
    }

    #[test]
    fn test_ids_not_reused() {
        let spec = Catalog::builtin().get("redis").cloned().unwrap();
        let a = DatabaseInstance::new(&spec, None, false);
        let b = DatabaseInstance::new(&spec, None, false);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_substitution_context_resolves_every_role() {
        let spec = Catalog::builtin().get("tidb").cloned().unwrap();
        let instance = DatabaseInstance::new(&spec, None, false);
        let ctx = instance.substitution_context(&spec);
        assert_eq!(ctx.hosts.len(), 3);
        assert_eq!(ctx.hosts["tikv"], instance.container_name("tikv"));
    }

    #[test]
    fn test_labels() {
        let spec = Catalog::builtin().get("redis").cloned().unwrap();
        let instance = DatabaseInstance::new(&spec, None, false);
        let labels = instance.labels(Some("redis"));
        assert_eq!(labels[MANAGED_LABEL], "true");
        assert_eq!(labels[INSTANCE_LABEL], instance.id);
        assert_eq!(labels[ROLE_LABEL], "redis");
        assert!(!instance.labels(None).contains_key(ROLE_LABEL));
        assert!(instance.is_released());
    }
}
