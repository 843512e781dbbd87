//! Run status tracking

use crate::error::{EegError, EegResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one processing run
///
/// Transitions only move forward: `Pending -> Processing -> {Completed, Failed}`.
/// A run may also fail straight from `Pending` when loading is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// Move to `next`, rejecting backward or sideways moves
    pub fn advance(&mut self, next: ProcessingStatus) -> EegResult<()> {
        if !self.can_transition_to(next) {
            return Err(EegError::InvalidState {
                reason: format!("cannot move from {} to {}", self, next),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut status = ProcessingStatus::default();
        assert_eq!(status, ProcessingStatus::Pending);
        status.advance(ProcessingStatus::Processing).unwrap();
        status.advance(ProcessingStatus::Completed).unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn test_backward_transitions_rejected() {
        let mut status = ProcessingStatus::Completed;
        assert!(status.advance(ProcessingStatus::Processing).is_err());
        assert!(status.advance(ProcessingStatus::Failed).is_err());
        assert_eq!(status, ProcessingStatus::Completed);

        let mut pending = ProcessingStatus::Pending;
        assert!(pending.advance(ProcessingStatus::Completed).is_err());
        assert!(pending.advance(ProcessingStatus::Failed).is_ok());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ProcessingStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }
}
