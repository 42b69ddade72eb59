//! Interactive client sessions
//!
//! Exec and sidecar clients hand the terminal to the engine CLI
//! (`docker exec -it` / `docker run --rm -it`). Web clients open the
//! browser and wait for the quit key.

use crate::instance::DatabaseInstance;
use crate::terminal;
use crate::{CoreError, Result};
use async_trait::async_trait;
use dbin_config::{substitute_vec, ClientKind, DatabaseSpec, RetryPolicy};
use dbin_provider::{ProviderType, INSTANCE_LABEL, MANAGED_LABEL};
use std::io::IsTerminal;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Side effects of a client session that touch the user's terminal or desktop
#[async_trait]
pub trait ClientLauncher: Send + Sync {
    /// Run a command attached to the terminal and return its exit status
    async fn run_interactive(&self, argv: &[String]) -> Result<i32>;

    /// Whether an HTTP endpoint answers with a success status
    async fn endpoint_ready(&self, url: &str) -> bool;

    /// Ask the desktop to open a URL
    fn open_browser(&self, url: &str);

    /// Wait until the user asks to quit
    async fn wait_for_quit(&self) -> Result<()>;

    /// Put the terminal back in cooked mode after an interrupted session
    fn restore_terminal(&self) {}
}

/// Launcher backed by the real terminal, engine CLI and browser
pub struct TerminalLauncher {
    http: reqwest::Client,
}

impl TerminalLauncher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }
}

impl Default for TerminalLauncher {
    fn default() -> Self {
        Self::new()
    }
}

/// Sets the flag when dropped so a blocking key loop can exit
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientLauncher for TerminalLauncher {
    /// The child outlives this future if it is dropped. Removing the
    /// container it is attached to ends it, and lets the engine CLI put
    /// the terminal back the way it found it.
    async fn run_interactive(&self, argv: &[String]) -> Result<i32> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CoreError::ClientFailed("empty client command".to_string()))?;
        debug!("Running {:?}", argv);

        let status = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| CoreError::ClientFailed(format!("failed to spawn {}: {}", program, e)))?;

        Ok(status.code().unwrap_or(1))
    }

    async fn endpoint_ready(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(response) => {
                debug!("{} answered {}", url, response.status());
                response.status().is_success()
            }
            Err(e) => {
                debug!("{} unreachable: {}", url, e);
                false
            }
        }
    }

    fn open_browser(&self, url: &str) {
        if let Err(e) = terminal::open_in_browser(url) {
            warn!("Could not open a browser ({}), visit {} manually", e, url);
        }
    }

    async fn wait_for_quit(&self) -> Result<()> {
        if !std::io::stdin().is_terminal() {
            // Nothing to read keys from; only an interrupt ends the session
            return std::future::pending().await;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(cancel.clone());
        let pressed = tokio::task::spawn_blocking(move || terminal::wait_for_key('q', &cancel))
            .await
            .map_err(|e| CoreError::ClientFailed(e.to_string()))??;
        debug!("Quit key pressed: {}", pressed);
        Ok(())
    }

    fn restore_terminal(&self) {
        terminal::restore();
    }
}

/// Argument vector for an exec client inside a running role
pub fn exec_argv(runtime: ProviderType, container: &str, command: &[String]) -> Vec<String> {
    let mut argv = vec![
        runtime.binary().to_string(),
        "exec".to_string(),
        "-it".to_string(),
        container.to_string(),
    ];
    argv.extend(command.iter().cloned());
    argv
}

/// Argument vector for a throwaway client container on the instance network
pub fn sidecar_argv(
    runtime: ProviderType,
    instance: &DatabaseInstance,
    network: &str,
    image: &str,
    command: &[String],
) -> Vec<String> {
    let mut argv: Vec<String> = [
        runtime.binary(),
        "run",
        "--rm",
        "-it",
        "--network",
        network,
        "--name",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    argv.push(instance.client_container_name());
    argv.push("--label".to_string());
    argv.push(format!("{}=true", MANAGED_LABEL));
    argv.push("--label".to_string());
    argv.push(format!("{}={}", INSTANCE_LABEL, instance.id));
    argv.push(image.to_string());
    argv.extend(command.iter().cloned());
    argv
}

/// Run a terminal client until it exits 0, within the retry budget.
///
/// A non-zero exit usually means the database refused the connection
/// while still warming up, so it is retried like a failed probe.
async fn run_with_retry(
    launcher: &dyn ClientLauncher,
    argv: &[String],
    retry: &RetryPolicy,
) -> Result<()> {
    for attempt in 1..=retry.attempts {
        let code = launcher.run_interactive(argv).await?;
        if code == 0 {
            return Ok(());
        }
        if attempt < retry.attempts {
            warn!(
                "Client exited with status {} (attempt {}/{}), retrying in {}s",
                code, attempt, retry.attempts, retry.delay_secs
            );
            tokio::time::sleep(retry.delay()).await;
        } else {
            warn!("Client exited with status {}", code);
        }
    }
    Err(CoreError::ClientConnect {
        attempts: retry.attempts,
    })
}

/// Attach the database's client to a ready instance and return once the
/// user ends the session
pub async fn run_client(
    launcher: &dyn ClientLauncher,
    runtime: ProviderType,
    spec: &DatabaseSpec,
    instance: &DatabaseInstance,
) -> Result<()> {
    let ctx = instance.substitution_context(spec);
    let retry = &spec.client.retry;

    match &spec.client.kind {
        ClientKind::Exec { command, role } => {
            let role = role.as_deref().unwrap_or(&instance.primary_role);
            let binding = instance
                .binding(role)
                .ok_or_else(|| CoreError::ClientFailed(format!("role '{}' is not running", role)))?;
            let argv = exec_argv(runtime, &binding.container_name, &substitute_vec(command, &ctx));
            run_with_retry(launcher, &argv, retry).await
        }
        ClientKind::Sidecar { image, command } => {
            let network = instance.network_name();
            if instance.network.is_none() {
                return Err(CoreError::ClientFailed(format!(
                    "network {} does not exist",
                    network
                )));
            }
            let argv = sidecar_argv(runtime, instance, &network, image, &substitute_vec(command, &ctx));
            run_with_retry(launcher, &argv, retry).await
        }
        ClientKind::Web { path, role } => {
            let role = role.as_deref().unwrap_or(&instance.primary_role);
            let port = instance
                .host_port(role)
                .ok_or_else(|| CoreError::ClientFailed(format!("role '{}' has no host port", role)))?;
            let url = format!("http://localhost:{}/{}", port, path.trim_start_matches('/'));

            let mut reachable = false;
            for attempt in 1..=retry.attempts {
                if launcher.endpoint_ready(&url).await {
                    reachable = true;
                    break;
                }
                info!(
                    "Waiting for {} (attempt {}/{})",
                    url, attempt, retry.attempts
                );
                if attempt < retry.attempts {
                    tokio::time::sleep(retry.delay()).await;
                }
            }
            if !reachable {
                return Err(CoreError::ClientConnect {
                    attempts: retry.attempts,
                });
            }

            launcher.open_browser(&url);
            info!("{} is available at {}", spec.name, url);
            info!("Press 'q' to quit");
            launcher.wait_for_quit().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{LaunchCall, MockLauncher};
    use crate::instance::RoleBinding;
    use dbin_config::Catalog;
    use dbin_provider::{ContainerId, NetworkId};
    use std::time::Duration;

    fn running(name: &str) -> (DatabaseSpec, DatabaseInstance) {
        let spec = Catalog::builtin().get(name).cloned().unwrap();
        let mut instance = DatabaseInstance::new(&spec, None, false);
        for (i, role) in spec.roles.iter().enumerate() {
            instance.roles.push(RoleBinding {
                role: role.name.clone(),
                container_id: ContainerId::new(format!("mock-{}", i + 1)),
                container_name: instance.container_name(&role.name),
            });
            if role.port.is_some() {
                instance.host_ports.insert(role.name.clone(), 50000 + i as u16);
            }
        }
        if spec.is_clustered() {
            instance.network = Some(NetworkId::new("mock-network"));
        }
        (spec, instance)
    }

    #[tokio::test]
    async fn test_exec_client_targets_primary_container() {
        let (spec, instance) = running("redis");
        let launcher = MockLauncher::new();

        run_client(&launcher, ProviderType::Docker, &spec, &instance)
            .await
            .unwrap();

        let name = instance.container_name("redis");
        assert_eq!(
            launcher.sessions(),
            vec![vec!["docker", "exec", "-it", name.as_str(), "redis-cli"]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonzero_exit_retried_until_success() {
        let (spec, instance) = running("postgres");
        let launcher = MockLauncher::with_exit_codes([2, 2]);
        let start = tokio::time::Instant::now();

        run_client(&launcher, ProviderType::Podman, &spec, &instance)
            .await
            .unwrap();

        let sessions = launcher.sessions();
        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[0][0], "podman");
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let (spec, instance) = running("postgres");
        let launcher = MockLauncher::with_exit_codes([1; 5]);

        let err = run_client(&launcher, ProviderType::Docker, &spec, &instance)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ClientConnect { attempts: 5 }));
        assert_eq!(launcher.sessions().len(), 5);
    }

    #[tokio::test]
    async fn test_sidecar_joins_instance_network() {
        let (spec, instance) = running("tidb");
        let launcher = MockLauncher::new();

        run_client(&launcher, ProviderType::Docker, &spec, &instance)
            .await
            .unwrap();

        let argv = launcher.sessions().remove(0);
        let network = instance.network_name();
        let tidb_host = format!("-h{}", instance.container_name("tidb"));
        assert_eq!(&argv[..4], ["docker", "run", "--rm", "-it"]);
        assert!(argv.windows(2).any(|w| w[0] == "--network" && w[1] == network));
        assert!(argv.windows(2).any(|w| w[0] == "--name" && w[1] == instance.client_container_name()));
        assert!(argv.contains(&"mysql:latest".to_string()));
        assert!(argv.contains(&tidb_host));
    }

    #[tokio::test(start_paused = true)]
    async fn test_web_client_waits_for_endpoint_then_quits() {
        let (spec, instance) = running("elasticsearch");
        let launcher = MockLauncher::new();
        launcher.endpoint_results.lock().unwrap().extend([false, false]);

        run_client(&launcher, ProviderType::Docker, &spec, &instance)
            .await
            .unwrap();

        let port = instance.host_port("kibana").unwrap();
        let url = format!("http://localhost:{}/", port);
        let calls = launcher.get_calls();
        assert_eq!(
            calls,
            vec![
                LaunchCall::EndpointReady { url: url.clone() },
                LaunchCall::EndpointReady { url: url.clone() },
                LaunchCall::EndpointReady { url: url.clone() },
                LaunchCall::OpenBrowser { url },
                LaunchCall::WaitForQuit,
            ]
        );
    }

    #[test]
    fn test_exec_argv() {
        let argv = exec_argv(
            ProviderType::Docker,
            "dbin-mysql-mysql-1234abcd",
            &["mysql".to_string(), "-uroot".to_string()],
        );
        assert_eq!(
            argv,
            vec!["docker", "exec", "-it", "dbin-mysql-mysql-1234abcd", "mysql", "-uroot"]
        );
    }

    /// Answers each connection with the next status line, then closes
    async fn serve_statuses(statuses: Vec<&'static str>) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_endpoint_ready_requires_success_status() {
        let port = serve_statuses(vec!["503 Service Unavailable", "200 OK"]).await;
        let url = format!("http://127.0.0.1:{}/", port);
        let launcher = TerminalLauncher::new();

        assert!(!launcher.endpoint_ready(&url).await);
        assert!(launcher.endpoint_ready(&url).await);
    }

    #[tokio::test]
    async fn test_endpoint_ready_rejects_not_found() {
        let port = serve_statuses(vec!["404 Not Found"]).await;
        let launcher = TerminalLauncher::new();

        assert!(!launcher.endpoint_ready(&format!("http://127.0.0.1:{}/", port)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_session_leaves_client_running() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("finished");
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("sleep 1; touch '{}'", marker.display()),
        ];
        let launcher = TerminalLauncher::new();

        tokio::select! {
            _ = launcher.run_interactive(&argv) => panic!("client finished too early"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(marker.exists(), "client was killed when its session was dropped");
    }
}
