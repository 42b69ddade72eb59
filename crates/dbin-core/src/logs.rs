//! Container log streaming for `--debug` runs

use crate::instance::DatabaseInstance;
use dbin_provider::{ContainerProvider, LogConfig};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::warn;

/// Stream every role's log to stderr, prefixed with the role name.
///
/// Returns the forwarding task; the caller aborts it before teardown.
pub async fn follow(
    provider: &dyn ContainerProvider,
    instance: &DatabaseInstance,
) -> Option<JoinHandle<()>> {
    let config = LogConfig {
        follow: true,
        stdout: true,
        stderr: true,
        tail: None,
    };

    let mut streams: Vec<BoxStream<'static, String>> = Vec::new();
    for binding in &instance.roles {
        let log = match provider.logs(&binding.container_id, &config).await {
            Ok(log) => log,
            Err(e) => {
                warn!("Cannot follow logs of {}: {}", binding.role, e);
                continue;
            }
        };

        let role = binding.role.clone();
        let lines = BufReader::new(log.stream).lines();
        let tagged = stream::unfold(lines, |mut lines| async move {
            match lines.next_line().await {
                Ok(Some(line)) => Some((line, lines)),
                _ => None,
            }
        })
        .map(move |line| format!("[{}] {}", role, line));
        streams.push(tagged.boxed());
    }

    if streams.is_empty() {
        return None;
    }

    let mut merged = stream::select_all(streams);
    Some(tokio::spawn(async move {
        while let Some(line) = merged.next().await {
            eprintln!("{}", line);
        }
    }))
}
