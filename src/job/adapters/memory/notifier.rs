//! Recording notifier.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use crate::job::{
    domain::JobStatus,
    ports::{JobNotifier, NotifyError, StatusUpdate},
};

/// Notifier that keeps every update it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
    rejecting: bool,
}

impl RecordingNotifier {
    /// Creates a notifier that accepts every update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier that records then rejects every update.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            rejecting: true,
            ..Self::default()
        }
    }

    /// Returns every update received, in order.
    #[must_use]
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the statuses announced, in order.
    #[must_use]
    pub fn statuses(&self) -> Vec<JobStatus> {
        self.updates().iter().map(|update| update.status).collect()
    }
}

#[async_trait]
impl JobNotifier for RecordingNotifier {
    async fn notify_status(&self, update: &StatusUpdate) -> Result<(), NotifyError> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update.clone());
        if self.rejecting {
            return Err(NotifyError::Rejected(503));
        }
        Ok(())
    }
}
