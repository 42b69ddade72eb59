//! Run-to-completion coordination of one database instance
//!
//! `Created → Provisioning → Probing → Serving → CleaningUp → Done`. Any
//! fatal error, or an interrupt, jumps straight to `CleaningUp`, and
//! teardown runs exactly once before [`Coordinator::run`] returns.

use crate::client::{run_client, ClientLauncher};
use crate::image::ensure_images;
use crate::instance::DatabaseInstance;
use crate::readiness::probe;
use crate::topology::{CleanupReport, TopologyBuilder};
use crate::{logs, CoreError, Result};
use dbin_config::{Catalog, DatabaseSpec};
use dbin_provider::{ContainerProvider, ProviderType};
use futures::FutureExt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Provisioning,
    Probing,
    Serving,
    CleaningUp,
    Done,
}

/// What the user asked to run
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub database: String,
    /// Host directory bound to the data volume; ephemeral storage when unset
    pub data_dir: Option<PathBuf>,
    /// Stream container logs to stderr while running
    pub debug: bool,
    /// Fixed host port for the primary role
    pub host_port: Option<u16>,
}

impl RunRequest {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }
}

/// How a run ended
#[derive(Debug)]
pub struct RunOutcome {
    /// The run's primary result; cleanup problems never end up here
    pub result: Result<()>,
    pub cleanup: CleanupReport,
    /// Every state the run passed through, in order
    pub states: Vec<RunState>,
}

impl RunOutcome {
    /// Process exit code: 0 on a clean client exit, 130 on interrupt, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match &self.result {
            Ok(()) => 0,
            Err(e) => e.exit_code(),
        }
    }
}

/// Ties provisioning, probing, the client session and teardown together
pub struct Coordinator {
    provider: Box<dyn ContainerProvider>,
    launcher: Box<dyn ClientLauncher>,
    catalog: Catalog,
    stop_timeout: u32,
}

impl Coordinator {
    pub fn new(
        provider: Box<dyn ContainerProvider>,
        launcher: Box<dyn ClientLauncher>,
        catalog: Catalog,
    ) -> Self {
        Self {
            provider,
            launcher,
            catalog,
            stop_timeout: 10,
        }
    }

    /// Seconds the engine waits for a container to stop before killing it
    pub fn with_stop_timeout(mut self, secs: u32) -> Self {
        self.stop_timeout = secs;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn provider(&self) -> &dyn ContainerProvider {
        self.provider.as_ref()
    }

    fn runtime(&self) -> ProviderType {
        self.provider.info().provider_type
    }

    /// Run a database until its client session ends or `shutdown` resolves.
    ///
    /// Returns only after teardown has finished.
    pub async fn run<F>(&self, request: &RunRequest, shutdown: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        let mut states = vec![RunState::Created];

        let Some(spec) = self.catalog.get(&request.database) else {
            states.push(RunState::Done);
            return RunOutcome {
                result: Err(CoreError::UnknownDatabase(request.database.clone())),
                cleanup: CleanupReport::default(),
                states,
            };
        };

        let mut instance = DatabaseInstance::new(spec, request.data_dir.clone(), request.debug);
        debug!("Instance {} for {}", instance.id, spec.name);
        tokio::pin!(shutdown);
        let mut log_task = None;

        let result = self
            .drive(spec, request, &mut instance, shutdown.as_mut(), &mut states, &mut log_task)
            .await;
        if let Err(e) = &result {
            debug!("Run ended with error: {}", e);
        }

        states.push(RunState::CleaningUp);
        if let Some(task) = log_task.take() {
            task.abort();
        }
        info!("Cleaning up {}", spec.name);
        let cleanup = TopologyBuilder::new(self.provider.as_ref(), self.stop_timeout)
            .teardown(&mut instance)
            .await;
        if !cleanup.is_clean() {
            warn!(
                "Cleanup finished with {} warning(s); leftovers can be removed with `dbin cleanup`",
                cleanup.warnings.len()
            );
        }
        states.push(RunState::Done);

        RunOutcome {
            result,
            cleanup,
            states,
        }
    }

    async fn drive<F>(
        &self,
        spec: &DatabaseSpec,
        request: &RunRequest,
        instance: &mut DatabaseInstance,
        mut shutdown: Pin<&mut F>,
        states: &mut Vec<RunState>,
        log_task: &mut Option<JoinHandle<()>>,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        states.push(RunState::Provisioning);
        info!("Starting {}", spec.name);

        // Pulls touch no container, so they can be abandoned on interrupt
        let images = spec.images();
        tokio::select! {
            pulled = ensure_images(self.provider.as_ref(), &images) => pulled?,
            _ = shutdown.as_mut() => return Err(CoreError::Interrupted),
        }

        // Container creation is not abandoned midway: an id the engine hands
        // back after the future is dropped would never be torn down
        TopologyBuilder::new(self.provider.as_ref(), self.stop_timeout)
            .create(spec, instance, request.host_port)
            .await?;
        if shutdown.as_mut().now_or_never().is_some() {
            return Err(CoreError::Interrupted);
        }

        if let Some(port) = instance.primary_port() {
            info!("{} is listening on localhost:{}", instance.primary_role, port);
        }
        if request.debug {
            *log_task = logs::follow(self.provider.as_ref(), instance).await;
        }

        states.push(RunState::Probing);
        tokio::select! {
            ready = probe(spec, instance, self.provider.as_ref()) => ready?,
            _ = shutdown.as_mut() => return Err(CoreError::Interrupted),
        }

        states.push(RunState::Serving);
        let session = run_client(self.launcher.as_ref(), self.runtime(), spec, instance);
        tokio::select! {
            result = session => result,
            _ = shutdown.as_mut() => {
                self.launcher.restore_terminal();
                info!("Interrupted, shutting down");
                Err(CoreError::Interrupted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{LaunchCall, MockCall, MockLauncher, MockProvider};
    use dbin_provider::ProviderError;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Calls = Arc<Mutex<Vec<MockCall>>>;

    fn coordinator(mock: MockProvider, launcher: MockLauncher) -> Coordinator {
        Coordinator::new(Box::new(mock), Box::new(launcher), Catalog::builtin())
    }

    fn count(calls: &Calls, pred: impl Fn(&MockCall) -> bool) -> usize {
        calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Every created container got exactly one stop and one remove
    fn assert_released_once(calls: &Calls, created: usize) {
        for n in 1..=created {
            let id = format!("mock-{}", n);
            assert_eq!(
                count(calls, |c| matches!(c, MockCall::Stop { id: s } if *s == id)),
                1,
                "stop {}",
                id
            );
            assert_eq!(
                count(calls, |c| matches!(c, MockCall::Remove { id: r, .. } if *r == id)),
                1,
                "remove {}",
                id
            );
        }
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_client_exit() {
        let mock = MockProvider::new(ProviderType::Docker);
        let calls = mock.calls.clone();
        let coordinator = coordinator(mock, MockLauncher::new());

        let outcome = coordinator.run(&RunRequest::new("redis"), never()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            outcome.states,
            vec![
                RunState::Created,
                RunState::Provisioning,
                RunState::Probing,
                RunState::Serving,
                RunState::CleaningUp,
                RunState::Done,
            ]
        );
        assert_released_once(&calls, 1);
    }

    #[tokio::test]
    async fn test_unknown_database_touches_nothing() {
        let mock = MockProvider::new(ProviderType::Docker);
        let calls = mock.calls.clone();
        let coordinator = coordinator(mock, MockLauncher::new());

        let outcome = coordinator.run(&RunRequest::new("nosuchdb"), never()).await;

        assert!(matches!(outcome.result, Err(CoreError::UnknownDatabase(_))));
        assert_eq!(outcome.exit_code(), 1);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisioning_failure_rolls_back() {
        let mock = MockProvider::new(ProviderType::Docker);
        mock.fail_nth_create(3, ProviderError::RuntimeError("no space left".into()));
        let calls = mock.calls.clone();
        let launcher = MockLauncher::new();
        let launches = launcher.calls.clone();
        let coordinator = coordinator(mock, launcher);

        let outcome = coordinator.run(&RunRequest::new("tidb"), never()).await;

        assert!(matches!(outcome.result, Err(CoreError::Provision { .. })));
        assert_eq!(
            outcome.states,
            vec![
                RunState::Created,
                RunState::Provisioning,
                RunState::CleaningUp,
                RunState::Done,
            ]
        );
        assert_released_once(&calls, 2);
        assert_eq!(count(&calls, |c| matches!(c, MockCall::RemoveNetwork { .. })), 1);
        assert!(launches.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_still_cleans_up() {
        let mock = MockProvider::new(ProviderType::Docker);
        *mock.exec_exit_code.lock().unwrap() = 1;
        let calls = mock.calls.clone();
        let coordinator = coordinator(mock, MockLauncher::new());

        let outcome = coordinator.run(&RunRequest::new("redis"), never()).await;

        assert!(matches!(
            outcome.result,
            Err(CoreError::ReadinessTimeout { attempts: 30, .. })
        ));
        assert_eq!(count(&calls, |c| matches!(c, MockCall::Exec { .. })), 30);
        assert!(!outcome.states.contains(&RunState::Serving));
        assert_released_once(&calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_failure_is_the_run_result() {
        let mock = MockProvider::new(ProviderType::Docker);
        *mock.stop_result.lock().unwrap() = Err(ProviderError::RuntimeError("stuck".into()));
        let calls = mock.calls.clone();
        let coordinator = coordinator(mock, MockLauncher::with_exit_codes([1; 5]));

        let outcome = coordinator.run(&RunRequest::new("mysql"), never()).await;

        // The cleanup warning does not replace the client error
        assert!(matches!(outcome.result, Err(CoreError::ClientConnect { attempts: 5 })));
        assert_eq!(outcome.cleanup.warnings.len(), 1);
        assert_eq!(outcome.exit_code(), 1);
        assert_released_once(&calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_session() {
        let mock = MockProvider::new(ProviderType::Docker);
        let calls = mock.calls.clone();
        let launcher = MockLauncher::new();
        *launcher.session_delay.lock().unwrap() = Duration::from_secs(3600);
        let launches = launcher.calls.clone();
        let coordinator = coordinator(mock, launcher);

        let start = tokio::time::Instant::now();
        let interrupt = tokio::time::sleep(Duration::from_millis(100));
        let outcome = coordinator.run(&RunRequest::new("redis"), interrupt).await;

        assert!(matches!(outcome.result, Err(CoreError::Interrupted)));
        assert_eq!(outcome.exit_code(), 130);
        assert!(start.elapsed() < Duration::from_secs(3600));
        assert!(outcome.states.contains(&RunState::Serving));
        assert!(launches
            .lock()
            .unwrap()
            .contains(&LaunchCall::RestoreTerminal));
        assert_released_once(&calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_provisioning_waits_for_creation() {
        let mock = MockProvider::new(ProviderType::Docker);
        *mock.create_delay.lock().unwrap() = Duration::from_secs(1);
        let calls = mock.calls.clone();
        let launcher = MockLauncher::new();
        let launches = launcher.calls.clone();
        let coordinator = coordinator(mock, launcher);

        let interrupt = tokio::time::sleep(Duration::from_millis(100));
        let outcome = coordinator.run(&RunRequest::new("tidb"), interrupt).await;

        assert!(matches!(outcome.result, Err(CoreError::Interrupted)));
        assert!(!outcome.states.contains(&RunState::Probing));
        // Every container that was created is released, none is leaked
        assert_released_once(&calls, 3);
        assert!(launches.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_pull_creates_nothing() {
        let mock = MockProvider::new(ProviderType::Docker);
        mock.missing_images
            .lock()
            .unwrap()
            .insert("redis:latest".to_string());
        *mock.pull_delay.lock().unwrap() = Duration::from_secs(60);
        let calls = mock.calls.clone();
        let coordinator = coordinator(mock, MockLauncher::new());

        let interrupt = tokio::time::sleep(Duration::from_millis(100));
        let outcome = coordinator.run(&RunRequest::new("redis"), interrupt).await;

        assert!(matches!(outcome.result, Err(CoreError::Interrupted)));
        assert_eq!(count(&calls, |c| matches!(c, MockCall::Create { .. })), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_image_checked_once() {
        let mock = MockProvider::new(ProviderType::Docker);
        let calls = mock.calls.clone();
        let coordinator = coordinator(mock, MockLauncher::new());
        let images = coordinator.catalog().get("tidb").unwrap().images().len();

        let outcome = coordinator.run(&RunRequest::new("tidb"), never()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(count(&calls, |c| matches!(c, MockCall::ImageExists { .. })), images);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_failure_creates_nothing() {
        let mock = MockProvider::new(ProviderType::Docker);
        mock.missing_images
            .lock()
            .unwrap()
            .insert("redis:latest".to_string());
        *mock.pull_result.lock().unwrap() = Err(ProviderError::PullError("denied".into()));
        let calls = mock.calls.clone();
        let coordinator = coordinator(mock, MockLauncher::new());

        let outcome = coordinator.run(&RunRequest::new("redis"), never()).await;

        assert!(matches!(outcome.result, Err(CoreError::Pull { .. })));
        assert_eq!(count(&calls, |c| matches!(c, MockCall::Create { .. })), 0);
        assert!(outcome.cleanup.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinned_port_reaches_engine() {
        let mock = MockProvider::new(ProviderType::Docker);
        let created = mock.created.clone();
        let coordinator = coordinator(mock, MockLauncher::new());

        let request = RunRequest {
            host_port: Some(16379),
            ..RunRequest::new("redis")
        };
        let outcome = coordinator.run(&request, never()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(created.lock().unwrap()[0].ports[0].host_port, Some(16379));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debug_follows_logs() {
        let mock = MockProvider::new(ProviderType::Docker);
        let calls = mock.calls.clone();
        let coordinator = coordinator(mock, MockLauncher::new());

        let request = RunRequest {
            debug: true,
            ..RunRequest::new("redis")
        };
        let outcome = coordinator.run(&request, never()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(count(&calls, |c| matches!(c, MockCall::Logs { .. })), 1);
    }
}
