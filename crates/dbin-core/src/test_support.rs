//! Test support utilities for dbin-core
//!
//! Provides MockProvider and MockLauncher so the coordinator can be driven
//! end to end without a Docker/Podman runtime or a terminal.

use crate::client::ClientLauncher;
use async_trait::async_trait;
use dbin_provider::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// First host port handed out by the mock engine
pub const MOCK_PORT_BASE: u16 = 49152;

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    ImageExists { image: String },
    Pull { image: String },
    Create { image: String, name: Option<String> },
    Start { id: String },
    Stop { id: String },
    Remove { id: String, force: bool },
    RemoveByName { name: String },
    Exec { id: String, cmd: Vec<String> },
    Inspect { id: String },
    List { all: bool },
    Logs { id: String },
    CreateNetwork { name: String },
    ConnectNetwork { network: String, container: String },
    RemoveNetwork { id: String },
    ListNetworks,
    Ping,
}

/// Configurable mock container provider for testing
pub struct MockProvider {
    pub provider_type: ProviderType,
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    /// Images image_exists reports as absent
    pub missing_images: Arc<Mutex<HashSet<String>>>,
    /// Events sent on the progress channel during a pull
    pub pull_events: Arc<Mutex<Vec<PullEvent>>>,
    /// Result for pull calls
    pub pull_result: Arc<Mutex<Result<ImageId>>>,
    /// How long each pull takes
    pub pull_delay: Arc<Mutex<Duration>>,
    /// Errors for specific create calls, keyed by 1-based call number
    pub create_failures: Arc<Mutex<HashMap<usize, ProviderError>>>,
    /// Every successful create, in order; container N is `mock-N`
    pub created: Arc<Mutex<Vec<CreateContainerConfig>>>,
    /// Delay applied to every create
    pub create_delay: Arc<Mutex<Duration>>,
    /// Result for start calls
    pub start_result: Arc<Mutex<Result<()>>>,
    /// Result for stop calls
    pub stop_result: Arc<Mutex<Result<()>>>,
    /// How long each stop takes
    pub stop_delay: Arc<Mutex<Duration>>,
    /// Result for remove calls
    pub remove_result: Arc<Mutex<Result<()>>>,
    /// Result for remove_by_name calls
    pub remove_by_name_result: Arc<Mutex<Result<()>>>,
    /// Exit codes for successive exec calls; falls back to exec_exit_code
    pub exec_exit_codes: Arc<Mutex<VecDeque<i64>>>,
    pub exec_exit_code: Arc<Mutex<i64>>,
    /// Error for exec calls (if Some, exec returns this error)
    pub exec_error: Arc<Mutex<Option<ProviderError>>>,
    /// Overrides the synthesized inspect result when set
    pub inspect_result: Arc<Mutex<Option<Result<ContainerDetails>>>>,
    /// Result for list calls
    pub list_result: Arc<Mutex<Result<Vec<ContainerInfo>>>>,
    /// Output served by logs calls
    pub log_output: Arc<Mutex<String>>,
    /// Result for create_network calls
    pub create_network_result: Arc<Mutex<Result<NetworkId>>>,
    /// Result for connect_network calls
    pub connect_network_result: Arc<Mutex<Result<()>>>,
    /// Result for remove_network calls
    pub remove_network_result: Arc<Mutex<Result<()>>>,
    /// Result for list_networks calls
    pub list_networks_result: Arc<Mutex<Result<Vec<NetworkSummary>>>>,
    /// Result for ping calls
    pub ping_result: Arc<Mutex<Result<()>>>,
}

impl MockProvider {
    /// Create a new mock provider with default success results
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            calls: Arc::new(Mutex::new(Vec::new())),
            missing_images: Arc::new(Mutex::new(HashSet::new())),
            pull_events: Arc::new(Mutex::new(Vec::new())),
            pull_result: Arc::new(Mutex::new(Ok(ImageId::new("sha256:mock_pulled_id")))),
            pull_delay: Arc::new(Mutex::new(Duration::ZERO)),
            create_failures: Arc::new(Mutex::new(HashMap::new())),
            created: Arc::new(Mutex::new(Vec::new())),
            create_delay: Arc::new(Mutex::new(Duration::ZERO)),
            start_result: Arc::new(Mutex::new(Ok(()))),
            stop_result: Arc::new(Mutex::new(Ok(()))),
            stop_delay: Arc::new(Mutex::new(Duration::ZERO)),
            remove_result: Arc::new(Mutex::new(Ok(()))),
            remove_by_name_result: Arc::new(Mutex::new(Ok(()))),
            exec_exit_codes: Arc::new(Mutex::new(VecDeque::new())),
            exec_exit_code: Arc::new(Mutex::new(0)),
            exec_error: Arc::new(Mutex::new(None)),
            inspect_result: Arc::new(Mutex::new(None)),
            list_result: Arc::new(Mutex::new(Ok(Vec::new()))),
            log_output: Arc::new(Mutex::new(String::new())),
            create_network_result: Arc::new(Mutex::new(Ok(NetworkId::new("mock-network")))),
            connect_network_result: Arc::new(Mutex::new(Ok(()))),
            remove_network_result: Arc::new(Mutex::new(Ok(()))),
            list_networks_result: Arc::new(Mutex::new(Ok(Vec::new()))),
            ping_result: Arc::new(Mutex::new(Ok(()))),
        }
    }

    /// Make the nth create call (1-based) fail
    pub fn fail_nth_create(&self, n: usize, err: ProviderError) {
        self.create_failures.lock().unwrap().insert(n, err);
    }

    /// Record a call
    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a specific call was made
    pub fn was_called(&self, call: &MockCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    /// Number of calls matching a predicate
    pub fn count_calls(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Ids of containers that were created and not yet removed
    pub fn live_containers(&self) -> Vec<String> {
        let calls = self.get_calls();
        let created = self.created.lock().unwrap().len();
        (1..=created)
            .map(|n| format!("mock-{}", n))
            .filter(|id| {
                !calls
                    .iter()
                    .any(|c| matches!(c, MockCall::Remove { id: removed, .. } if removed == id))
            })
            .collect()
    }

    fn synthesized_details(&self, id: &ContainerId) -> Result<ContainerDetails> {
        let created = self.created.lock().unwrap();
        let index = id
            .0
            .strip_prefix("mock-")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1 && *n <= created.len())
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        let config = &created[index - 1];

        let ports = config
            .ports
            .iter()
            .map(|p| PortInfo {
                container_port: p.container_port,
                host_port: Some(p.host_port.unwrap_or(MOCK_PORT_BASE + index as u16)),
                protocol: p.protocol.clone(),
                host_ip: p.host_ip.clone(),
            })
            .collect();

        let mut details = mock_container_details(&id.0, ContainerStatus::Running);
        details.name = config.name.clone().unwrap_or_default();
        details.image = config.image.clone();
        details.labels = config.labels.clone();
        details.ports = ports;
        Ok(details)
    }
}

/// Helper to clone a Result<T> from an Arc<Mutex<Result<T>>>
fn clone_result<T: Clone>(r: &Arc<Mutex<Result<T>>>) -> Result<T> {
    let guard = r.lock().unwrap();
    match &*guard {
        Ok(v) => Ok(v.clone()),
        Err(e) => Err(clone_provider_error(e)),
    }
}

/// Clone a ProviderError (thiserror types don't implement Clone)
pub fn clone_provider_error(e: &ProviderError) -> ProviderError {
    match e {
        ProviderError::ConnectionError(s) => ProviderError::ConnectionError(s.clone()),
        ProviderError::ContainerNotFound(s) => ProviderError::ContainerNotFound(s.clone()),
        ProviderError::ImageNotFound(s) => ProviderError::ImageNotFound(s.clone()),
        ProviderError::NetworkNotFound(s) => ProviderError::NetworkNotFound(s.clone()),
        ProviderError::PullError(s) => ProviderError::PullError(s.clone()),
        ProviderError::ExecError(s) => ProviderError::ExecError(s.clone()),
        ProviderError::RuntimeError(s) => ProviderError::RuntimeError(s.clone()),
        ProviderError::ConfigError(s) => ProviderError::ConfigError(s.clone()),
        ProviderError::Timeout => ProviderError::Timeout,
        ProviderError::IoError(_) => ProviderError::RuntimeError("IO error (cloned)".into()),
    }
}

/// Create a mock ContainerDetails
pub fn mock_container_details(id: &str, status: ContainerStatus) -> ContainerDetails {
    ContainerDetails {
        id: ContainerId::new(id),
        name: "mock_container".to_string(),
        image: "mock_image:latest".to_string(),
        status,
        exit_code: None,
        labels: HashMap::new(),
        ports: Vec::new(),
    }
}

#[async_trait]
impl ContainerProvider for MockProvider {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.record(MockCall::ImageExists {
            image: image.to_string(),
        });
        Ok(!self.missing_images.lock().unwrap().contains(image))
    }

    async fn pull(
        &self,
        image: &str,
        progress: mpsc::UnboundedSender<PullEvent>,
    ) -> Result<ImageId> {
        self.record(MockCall::Pull {
            image: image.to_string(),
        });
        let events = self.pull_events.lock().unwrap().clone();
        for event in events {
            let _ = progress.send(event);
        }
        let delay = *self.pull_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        clone_result(&self.pull_result)
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        self.record(MockCall::Create {
            image: config.image.clone(),
            name: config.name.clone(),
        });
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let attempt = self.count_calls(|c| matches!(c, MockCall::Create { .. }));
        if let Some(err) = self.create_failures.lock().unwrap().get(&attempt) {
            return Err(clone_provider_error(err));
        }

        let mut created = self.created.lock().unwrap();
        created.push(config.clone());
        Ok(ContainerId::new(format!("mock-{}", created.len())))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.record(MockCall::Start { id: id.0.clone() });
        clone_result(&self.start_result)
    }

    async fn stop(&self, id: &ContainerId, _timeout: Option<u32>) -> Result<()> {
        self.record(MockCall::Stop { id: id.0.clone() });
        let delay = *self.stop_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        clone_result(&self.stop_result)
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()> {
        self.record(MockCall::Remove {
            id: id.0.clone(),
            force,
        });
        clone_result(&self.remove_result)
    }

    async fn remove_by_name(&self, name: &str) -> Result<()> {
        self.record(MockCall::RemoveByName {
            name: name.to_string(),
        });
        clone_result(&self.remove_by_name_result)
    }

    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult> {
        self.record(MockCall::Exec {
            id: id.0.clone(),
            cmd: config.cmd.clone(),
        });
        if let Some(err) = self.exec_error.lock().unwrap().as_ref() {
            return Err(clone_provider_error(err));
        }
        let exit_code = self
            .exec_exit_codes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.exec_exit_code.lock().unwrap());
        Ok(ExecResult {
            exit_code,
            output: String::new(),
        })
    }

    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        self.record(MockCall::List { all });
        clone_result(&self.list_result)
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        self.record(MockCall::Inspect { id: id.0.clone() });
        if let Some(result) = self.inspect_result.lock().unwrap().as_ref() {
            return match result {
                Ok(details) => Ok(details.clone()),
                Err(e) => Err(clone_provider_error(e)),
            };
        }
        self.synthesized_details(id)
    }

    async fn logs(&self, id: &ContainerId, _config: &LogConfig) -> Result<LogStream> {
        self.record(MockCall::Logs { id: id.0.clone() });
        let output = self.log_output.lock().unwrap().clone().into_bytes();
        Ok(LogStream {
            stream: Box::pin(std::io::Cursor::new(output)),
        })
    }

    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId> {
        self.record(MockCall::CreateNetwork {
            name: config.name.clone(),
        });
        clone_result(&self.create_network_result)
    }

    async fn connect_network(&self, network: &NetworkId, container: &ContainerId) -> Result<()> {
        self.record(MockCall::ConnectNetwork {
            network: network.0.clone(),
            container: container.0.clone(),
        });
        clone_result(&self.connect_network_result)
    }

    async fn remove_network(&self, network: &NetworkId) -> Result<()> {
        self.record(MockCall::RemoveNetwork {
            id: network.0.clone(),
        });
        clone_result(&self.remove_network_result)
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>> {
        self.record(MockCall::ListNetworks);
        clone_result(&self.list_networks_result)
    }

    async fn ping(&self) -> Result<()> {
        self.record(MockCall::Ping);
        clone_result(&self.ping_result)
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: self.provider_type,
            version: "mock-1.0".to_string(),
            api_version: "mock".to_string(),
            os: "test".to_string(),
            arch: "test".to_string(),
        }
    }
}

/// Records which client actions were taken
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchCall {
    Interactive { argv: Vec<String> },
    EndpointReady { url: String },
    OpenBrowser { url: String },
    WaitForQuit,
    RestoreTerminal,
}

/// Scriptable client launcher for testing
pub struct MockLauncher {
    pub calls: Arc<Mutex<Vec<LaunchCall>>>,
    /// Exit codes for successive interactive sessions; 0 once exhausted
    pub exit_codes: Arc<Mutex<VecDeque<i32>>>,
    /// How long each interactive session lasts
    pub session_delay: Arc<Mutex<Duration>>,
    /// Answers for successive endpoint probes; true once exhausted
    pub endpoint_results: Arc<Mutex<VecDeque<bool>>>,
    /// How long until the user presses the quit key
    pub quit_delay: Arc<Mutex<Duration>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            exit_codes: Arc::new(Mutex::new(VecDeque::new())),
            session_delay: Arc::new(Mutex::new(Duration::ZERO)),
            endpoint_results: Arc::new(Mutex::new(VecDeque::new())),
            quit_delay: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// A launcher whose sessions exit with the given codes in order
    pub fn with_exit_codes(codes: impl IntoIterator<Item = i32>) -> Self {
        let launcher = Self::new();
        launcher.exit_codes.lock().unwrap().extend(codes);
        launcher
    }

    fn record(&self, call: LaunchCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn get_calls(&self) -> Vec<LaunchCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Argument vectors of every interactive session started
    pub fn sessions(&self) -> Vec<Vec<String>> {
        self.get_calls()
            .into_iter()
            .filter_map(|c| match c {
                LaunchCall::Interactive { argv } => Some(argv),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientLauncher for MockLauncher {
    async fn run_interactive(&self, argv: &[String]) -> crate::Result<i32> {
        self.record(LaunchCall::Interactive {
            argv: argv.to_vec(),
        });
        let delay = *self.session_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.exit_codes.lock().unwrap().pop_front().unwrap_or(0))
    }

    async fn endpoint_ready(&self, url: &str) -> bool {
        self.record(LaunchCall::EndpointReady {
            url: url.to_string(),
        });
        self.endpoint_results.lock().unwrap().pop_front().unwrap_or(true)
    }

    fn open_browser(&self, url: &str) {
        self.record(LaunchCall::OpenBrowser {
            url: url.to_string(),
        });
    }

    async fn wait_for_quit(&self) -> crate::Result<()> {
        self.record(LaunchCall::WaitForQuit);
        let delay = *self.quit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn restore_terminal(&self) {
        self.record(LaunchCall::RestoreTerminal);
    }
}
