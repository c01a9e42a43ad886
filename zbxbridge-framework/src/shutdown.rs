//! Cooperative shutdown.
//!
//! Signal handling never touches the broker session. The signal task only
//! flips a flag; the event loop observes it between events and runs the
//! disconnect sequence itself.

use std::future;

use tokio::sync::watch;

/// Sending half: flips the termination flag.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half: observed by the event loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a linked trigger/observer pair.
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// An observer that is never triggered.
    pub fn never() -> Self {
        let (_trigger, shutdown) = Self::channel();
        shutdown
    }

    /// Whether termination was requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once termination is requested.
    ///
    /// Pends forever if the trigger is dropped without firing.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|requested| *requested).await.is_err() {
            future::pending::<()>().await;
        }
    }
}

impl ShutdownTrigger {
    /// Request termination.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Spawn a task that triggers on SIGINT or SIGTERM (Ctrl+C elsewhere).
    pub fn listen_for_signals(self) {
        tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(name) => tracing::info!(signal = name, "Received shutdown signal"),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for shutdown signals");
                    return;
                }
            }
            self.trigger();
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
