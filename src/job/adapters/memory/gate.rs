//! Handshake for holding a collaborator call mid-flight.

use tokio::sync::Notify;

/// Holds a call until the test releases it.
///
/// Lets a test observe a job while one of its stages is in flight and act
/// on it before the stage finishes.
#[derive(Debug, Default)]
pub struct StageGate {
    started: Notify,
    release: Notify,
}

impl StageGate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until a call reaches the gate.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Lets the held call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Signals arrival and waits for [`Self::release`].
    pub(super) async fn pass(&self) {
        self.started.notify_one();
        self.release.notified().await;
    }
}
