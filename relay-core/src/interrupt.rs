use tokio::sync::watch;

/// Cooperative interruption for a running consumer.
///
/// Fires when the owning task asks its worker to stop, or when the host
/// application signals shutdown. A dropped stop sender counts as a stop
/// request; a dropped shutdown sender never fires.
#[derive(Debug, Clone)]
pub struct Interrupt {
    stop_rx: watch::Receiver<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Interrupt {
    pub fn new(stop_rx: watch::Receiver<bool>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            stop_rx,
            shutdown_rx,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        *self.stop_rx.borrow() || self.stop_rx.has_changed().is_err() || *self.shutdown_rx.borrow()
    }

    /// Resolves once an interruption has been requested.
    pub async fn interrupted(&self) {
        let mut stop_rx = self.stop_rx.clone();

        tokio::select! {
            _ = stop_rx.wait_for(|requested| *requested) => {}
            () = shutdown_requested(self.shutdown_rx.clone()) => {}
        }
    }
}

/// Resolves once the host sets its shutdown flag. Pends forever if the sender is gone.
pub(crate) async fn shutdown_requested(mut shutdown_rx: watch::Receiver<bool>) {
    if shutdown_rx.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}
