//! Signal handling for graceful shutdown

use std::sync::Arc;
use tokio::sync::watch;

/// Exit code used when a second interrupt forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// Cancellation token shared by the runner and every in-flight step
#[derive(Clone, Debug)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Cancel the token
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancelled
    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                // Sender dropped without cancelling: never resolves
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for one interrupt/terminate signal
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(mut sigint), Ok(mut sigterm)) => {
            tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        _ => {
            tracing::warn!("Could not install signal handlers, interrupts will not be graceful");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("Could not install Ctrl+C handler, interrupts will not be graceful");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}

/// Cancel `token` on the first interrupt, exit immediately on the second
pub fn install_signal_handlers(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        tracing::warn!(signal, "Interrupted, finishing up (press again to force quit)");
        token.cancel();

        let signal = wait_for_signal().await;
        tracing::error!(signal, "Forced shutdown");
        std::process::exit(FORCED_EXIT_CODE);
    })
}
