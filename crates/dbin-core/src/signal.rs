//! Interrupt handling

use std::future::Future;
use std::io;

/// Install SIGINT/SIGTERM handlers and return a future that resolves on the
/// first of them.
///
/// Handlers are installed before this returns, so a signal that arrives
/// before the future is first polled is still observed instead of killing
/// the process with containers left behind.
#[cfg(unix)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()> + Send> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => tracing::debug!("Received SIGINT"),
            _ = terminate.recv() => tracing::debug!("Received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()> + Send> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
}
