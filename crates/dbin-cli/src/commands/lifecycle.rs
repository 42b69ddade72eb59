//! Lifecycle commands: start a database and run it to completion

use anyhow::{bail, Context, Result};
use dbin_core::{Coordinator, RunOutcome, RunRequest};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Run a database until its client exits or `shutdown` fires.
///
/// Returns the process exit code. Errors are reported here rather than
/// returned so that the caller exits only after cleanup has finished.
pub async fn start<F>(coordinator: &Coordinator, request: &RunRequest, shutdown: F) -> i32
where
    F: Future<Output = ()>,
{
    let outcome = coordinator.run(request, shutdown).await;
    report(&outcome);
    outcome.exit_code()
}

fn report(outcome: &RunOutcome) {
    for warning in &outcome.cleanup.warnings {
        eprintln!(
            "Warning: could not {} {}: {}",
            warning.action, warning.resource, warning.message
        );
    }
    if let Err(e) = &outcome.result {
        eprintln!("Error: {}", e);
    }
}

/// Expand `~`, make the path absolute and create it if missing
pub fn resolve_data_dir(raw: &str) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        bail!("Data directory must not be empty");
    }

    let expanded = shellexpand::tilde(raw);
    let path = Path::new(expanded.as_ref());
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read current directory")?
            .join(path)
    };

    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create data directory {}", path.display()))?;
    tracing::debug!("Using data directory {}", path.display());
    Ok(path)
}

/// Build a run request from command line values
pub fn run_request(
    database: &str,
    data_dir: Option<&str>,
    debug: bool,
    port: Option<u16>,
) -> Result<RunRequest> {
    let data_dir = data_dir.map(resolve_data_dir).transpose()?;
    Ok(RunRequest {
        database: database.to_string(),
        data_dir,
        debug,
        host_port: port,
    })
}
