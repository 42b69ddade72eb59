//! Docker provider implementation using bollard

use crate::{
    ContainerDetails, ContainerId, ContainerInfo, ContainerProvider, ContainerStatus,
    CreateContainerConfig, ExecConfig, ExecResult, ImageId, LogConfig, LogStream, NetworkConfig,
    NetworkId, NetworkSummary, PortInfo, ProviderError,
    ProviderInfo, ProviderType, PullEvent, Result, MANAGED_LABEL,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, ListNetworksOptions};
use bollard::service::{EndpointSettings, HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

/// Docker provider using bollard crate
pub struct DockerProvider {
    client: Docker,
    provider_type: ProviderType,
}

impl DockerProvider {
    /// Create a new Docker provider
    pub async fn new(socket_path: &str) -> Result<Self> {
        let client = if socket_path.starts_with("http://") || socket_path.starts_with("https://") {
            Docker::connect_with_http(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?
        } else {
            let path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?
        };

        // Test connection
        client
            .ping()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            provider_type: ProviderType::Docker,
        })
    }

    /// Create a new provider for Podman (uses Docker-compatible API)
    pub async fn new_podman(socket_path: &str) -> Result<Self> {
        let mut provider = Self::new(socket_path).await?;
        provider.provider_type = ProviderType::Podman;
        Ok(provider)
    }
}

fn managed_filter() -> HashMap<String, Vec<String>> {
    HashMap::from([(
        "label".to_string(),
        vec![format!("{}=true", MANAGED_LABEL)],
    )])
}

fn to_pull_event(info: bollard::models::CreateImageInfo) -> PullEvent {
    let detail = info.progress_detail.unwrap_or_default();
    PullEvent {
        status: info.status.unwrap_or_default(),
        layer_id: info.id,
        progress_text: info.progress,
        current_bytes: detail.current.and_then(|v| u64::try_from(v).ok()),
        total_bytes: detail.total.and_then(|v| u64::try_from(v).ok()),
    }
}

#[async_trait]
impl ContainerProvider for DockerProvider {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.client.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = ProviderError::from(e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn pull(
        &self,
        image: &str,
        progress: mpsc::UnboundedSender<PullEvent>,
    ) -> Result<ImageId> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(error) = info.error {
                        return Err(ProviderError::PullError(error));
                    }
                    // Receiver going away only means nobody renders progress
                    let _ = progress.send(to_pull_event(info));
                }
                Err(e) => return Err(ProviderError::PullError(e.to_string())),
            }
        }

        let inspect = self
            .client
            .inspect_image(image)
            .await
            .map_err(|e| ProviderError::ImageNotFound(e.to_string()))?;

        Ok(ImageId::new(inspect.id.unwrap_or_else(|| image.to_string())))
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        let options = config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        });

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();

        for port in &config.ports {
            let container_port = format!("{}/{}", port.container_port, port.protocol);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = PortBinding {
                host_ip: port.host_ip.clone(),
                // "0" asks the engine for a free ephemeral port
                host_port: Some(port.host_port.unwrap_or(0).to_string()),
            };
            port_bindings.insert(container_port, Some(vec![binding]));
        }

        let binds: Vec<String> = config.binds.iter().map(|b| b.spec()).collect();

        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            ..Default::default()
        };

        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            env: if env.is_empty() { None } else { Some(env) },
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(options, container_config)
            .await?;

        for warning in &response.warnings {
            tracing::warn!("{}", warning);
        }

        Ok(ContainerId::new(response.id))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.client
            .start_container(&id.0, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout.unwrap_or(10) as i64,
        };
        match self.client.stop_container(&id.0, Some(options)).await {
            // 304: already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            other => other.map_err(Into::into),
        }
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client.remove_container(&id.0, Some(options)).await?;
        Ok(())
    }

    async fn remove_by_name(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.client.remove_container(name, Some(options)).await?;
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult> {
        let options = CreateExecOptions {
            cmd: Some(config.cmd.clone()),
            env: Some(
                config
                    .env
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            ),
            user: config.user.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.client.create_exec(&id.0, options).await?;
        let result = self.client.start_exec(&exec.id, None).await?;

        let mut output_str = String::new();

        match result {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(bollard::container::LogOutput::StdOut { message })
                        | Ok(bollard::container::LogOutput::StdErr { message }) => {
                            output_str.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => return Err(ProviderError::ExecError(e.to_string())),
                    }
                }
            }
            StartExecResults::Detached => {}
        }

        let inspect = self.client.inspect_exec(&exec.id).await?;
        // A missing exit code means the process never reported one
        let exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(ExecResult {
            exit_code,
            output: output_str,
        })
    }

    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions {
            all,
            filters: managed_filter(),
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: ContainerId::new(c.id.unwrap_or_default()),
                name: c
                    .names
                    .and_then(|n| n.first().cloned())
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string(),
                image: c.image.unwrap_or_default(),
                status: c
                    .state
                    .as_deref()
                    .map(ContainerStatus::from)
                    .unwrap_or(ContainerStatus::Unknown),
                created: c.created.unwrap_or(0),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        let info = self.client.inspect_container(&id.0, None).await?;

        let state = info.state.as_ref();
        let status = state
            .and_then(|s| s.status)
            .map(|s| ContainerStatus::from(s.to_string().as_str()))
            .unwrap_or(ContainerStatus::Unknown);

        let config = info.config.as_ref();

        let mut ports = Vec::new();
        if let Some(port_map) = info.network_settings.as_ref().and_then(|n| n.ports.as_ref()) {
            for (container_port, bindings) in port_map {
                let (number, protocol) = container_port
                    .split_once('/')
                    .unwrap_or((container_port.as_str(), "tcp"));
                let port_num: u16 = number.parse().unwrap_or(0);

                match bindings {
                    Some(bindings) => {
                        for binding in bindings {
                            ports.push(PortInfo {
                                container_port: port_num,
                                host_port: binding.host_port.as_ref().and_then(|p| p.parse().ok()),
                                protocol: protocol.to_string(),
                                host_ip: binding.host_ip.clone(),
                            });
                        }
                    }
                    None => ports.push(PortInfo {
                        container_port: port_num,
                        host_port: None,
                        protocol: protocol.to_string(),
                        host_ip: None,
                    }),
                }
            }
        }

        Ok(ContainerDetails {
            id: id.clone(),
            name: info
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: config.and_then(|c| c.image.clone()).unwrap_or_default(),
            status,
            exit_code: state.and_then(|s| s.exit_code),
            labels: config.and_then(|c| c.labels.clone()).unwrap_or_default(),
            ports,
        })
    }

    async fn logs(&self, id: &ContainerId, config: &LogConfig) -> Result<LogStream> {
        let options = LogsOptions::<String> {
            follow: config.follow,
            stdout: config.stdout,
            stderr: config.stderr,
            tail: config
                .tail
                .map(|t| t.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let stream = self.client.logs(&id.0, Some(options));
        let reader = LogOutputReader::new(stream);

        Ok(LogStream {
            stream: Box::pin(reader),
        })
    }

    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId> {
        let options = CreateNetworkOptions {
            name: config.name.as_str(),
            driver: "bridge",
            labels: config
                .labels
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            ..Default::default()
        };

        let response = self.client.create_network(options).await?;
        if let Some(warning) = response.warning.filter(|w| !w.is_empty()) {
            tracing::warn!("{}", warning);
        }

        // Older engines omit the id; the name addresses the network just as well
        Ok(NetworkId::new(
            response.id.unwrap_or_else(|| config.name.clone()),
        ))
    }

    async fn connect_network(&self, network: &NetworkId, container: &ContainerId) -> Result<()> {
        let options = ConnectNetworkOptions {
            container: container.0.as_str(),
            endpoint_config: EndpointSettings::default(),
        };
        self.client.connect_network(&network.0, options).await?;
        Ok(())
    }

    async fn remove_network(&self, network: &NetworkId) -> Result<()> {
        match self.client.remove_network(&network.0).await {
            Ok(()) => Ok(()),
            Err(e) => match ProviderError::from(e) {
                ProviderError::ContainerNotFound(msg) => Err(ProviderError::NetworkNotFound(msg)),
                other => Err(other),
            },
        }
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>> {
        let options = ListNetworksOptions {
            filters: managed_filter(),
        };
        let networks = self.client.list_networks(Some(options)).await?;

        Ok(networks
            .into_iter()
            .map(|n| NetworkSummary {
                id: NetworkId::new(n.id.unwrap_or_default()),
                name: n.name.unwrap_or_default(),
                labels: n.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: self.provider_type,
            version: "unknown".to_string(),
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Reader that converts a demultiplexed log stream to AsyncRead.
///
/// Bollard strips the 8-byte stream header from every frame, so only the
/// payload reaches the buffer.
struct LogOutputReader<S> {
    stream: S,
    buffer: Vec<u8>,
    pos: usize,
}

impl<S> LogOutputReader<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            pos: 0,
        }
    }
}

impl<S> AsyncRead for LogOutputReader<S>
where
    S: futures::Stream<
            Item = std::result::Result<bollard::container::LogOutput, bollard::errors::Error>,
        > + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if self.pos < self.buffer.len() {
            let remaining = &self.buffer[self.pos..];
            let to_copy = std::cmp::min(remaining.len(), buf.remaining());
            buf.put_slice(&remaining[..to_copy]);
            self.pos += to_copy;
            return std::task::Poll::Ready(Ok(()));
        }

        self.buffer.clear();
        self.pos = 0;

        loop {
            match Pin::new(&mut self.stream).poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(output))) => {
                    let data = output.into_bytes();
                    // An empty frame would read as EOF; wait for the next one
                    if data.is_empty() {
                        continue;
                    }
                    self.buffer = data.to_vec();

                    let to_copy = std::cmp::min(self.buffer.len(), buf.remaining());
                    buf.put_slice(&self.buffer[..to_copy]);
                    self.pos = to_copy;
                    return std::task::Poll::Ready(Ok(()));
                }
                std::task::Poll::Ready(Some(Err(e))) => {
                    return std::task::Poll::Ready(Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        e.to_string(),
                    )))
                }
                std::task::Poll::Ready(None) => return std::task::Poll::Ready(Ok(())),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::container::LogOutput;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_pull_event_from_engine_info() {
        let info = bollard::models::CreateImageInfo {
            id: Some("d1a2b3c4".to_string()),
            status: Some("Downloading".to_string()),
            progress: Some("[=>  ] 2MB/8MB".to_string()),
            progress_detail: Some(bollard::models::ProgressDetail {
                current: Some(2_000_000),
                total: Some(8_000_000),
            }),
            ..Default::default()
        };
        let event = to_pull_event(info);
        assert!(event.is_downloading());
        assert_eq!(event.layer_id.as_deref(), Some("d1a2b3c4"));
        assert_eq!(event.current_bytes, Some(2_000_000));
        assert_eq!(event.total_bytes, Some(8_000_000));
    }

    #[test]
    fn test_pull_event_without_detail() {
        let info = bollard::models::CreateImageInfo {
            status: Some("Pulling from library/redis".to_string()),
            ..Default::default()
        };
        let event = to_pull_event(info);
        assert!(!event.is_downloading());
        assert_eq!(event.current_bytes, None);
    }

    #[tokio::test]
    async fn test_log_reader_concatenates_payloads() {
        let frames = vec![
            Ok(LogOutput::StdOut {
                message: "ready to accept ".into(),
            }),
            Ok(LogOutput::StdErr {
                message: "".into(),
            }),
            Ok(LogOutput::StdErr {
                message: "connections\n".into(),
            }),
        ];
        let mut reader = LogOutputReader::new(futures::stream::iter(frames));
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "ready to accept connections\n");
    }
}
