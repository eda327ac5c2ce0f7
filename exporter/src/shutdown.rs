//! Stop signal shared by the poller, the resolver, the fleet watcher and the
//! scrape server.
//!
//! One broadcast sender; each task holds its own receiver. Once fired the
//! signal stays fired, so a receiver taken late still sees it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct StopSignal {
    tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx, fired: Arc::new(AtomicBool::new(false)) }
    }

    /// Receiver for a task loop. Yields immediately if the signal already fired.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let rx = self.tx.subscribe();
        if self.is_fired() {
            let _ = self.tx.send(());
        }
        rx
    }

    pub fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Future that completes on stop, for axum's graceful shutdown.
    pub fn notified(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Block until the process is asked to terminate, then fire.
    pub async fn fire_on_termination(&self) {
        let name = termination().await;
        tracing::info!("received {name}, stopping exporter");
        self.fire();
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the first termination signal delivered to the process.
async fn termination() -> &'static str {
    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => "SIGINT",
        _ = sigterm => "SIGTERM",
    }
}
