//! Job status state machine and canonical presentation metadata.

use super::ParseJobStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for the executor.
    Queued,
    /// Patches are being generated.
    Coding,
    /// Patches are being applied and committed.
    Patching,
    /// Generated test commands are running.
    Testing,
    /// Review request opened, or dry run completed.
    PrOpened,
    /// A stage failed.
    Failed,
    /// Job was cancelled by an operator.
    Cancelled,
}

impl JobStatus {
    /// Every status, in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::Queued,
        Self::Coding,
        Self::Patching,
        Self::Testing,
        Self::PrOpened,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Coding => "coding",
            Self::Patching => "patching",
            Self::Testing => "testing",
            Self::PrOpened => "pr_opened",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns whether transition to `target` is an edge of the state
    /// machine.
    ///
    /// Testing is optional, so `patching` may complete directly.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Queued, Self::Coding)
                | (Self::Coding, Self::Patching)
                | (Self::Patching, Self::Testing | Self::PrOpened)
                | (Self::Testing, Self::PrOpened)
                | (Self::Coding | Self::Patching | Self::Testing, Self::Failed)
                | (
                    Self::Queued | Self::Coding | Self::Patching | Self::Testing,
                    Self::Cancelled
                )
                | (Self::Failed, Self::Queued)
        )
    }

    /// Returns whether an operator may still cancel a job in this status.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Coding | Self::Patching | Self::Testing
        )
    }

    /// Returns the presentation metadata for this status.
    #[must_use]
    pub const fn metadata(self) -> StatusMetadata {
        match self {
            Self::Queued => StatusMetadata::new(self, "Queued", "⏳"),
            Self::Coding => StatusMetadata::new(self, "Generating code", "🤖"),
            Self::Patching => StatusMetadata::new(self, "Applying patches", "🩹"),
            Self::Testing => StatusMetadata::new(self, "Running tests", "🧪"),
            Self::PrOpened => StatusMetadata::new(self, "Review request opened", "🚀"),
            Self::Failed => StatusMetadata::new(self, "Failed", "❌"),
            Self::Cancelled => StatusMetadata::new(self, "Cancelled", "🚫"),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = ParseJobStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "queued" => Ok(Self::Queued),
            "coding" => Ok(Self::Coding),
            "patching" => Ok(Self::Patching),
            "testing" => Ok(Self::Testing),
            "pr_opened" => Ok(Self::PrOpened),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseJobStatusError(value.to_owned())),
        }
    }
}

/// Canonical label and emoji for a status.
///
/// Notification and presentation collaborators read this mapping instead of
/// keeping their own lookup tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusMetadata {
    /// Status the metadata describes.
    pub status: JobStatus,
    /// Human-readable label.
    pub label: &'static str,
    /// Emoji shown alongside the label.
    pub emoji: &'static str,
}

impl StatusMetadata {
    const fn new(status: JobStatus, label: &'static str, emoji: &'static str) -> Self {
        Self {
            status,
            label,
            emoji,
        }
    }
}

impl fmt::Display for StatusMetadata {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.emoji, self.label)
    }
}
