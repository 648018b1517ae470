//! The batch dispatcher: walks the recipient list, sends one message per row,
//! and records outcomes and resume points.

pub mod controller;
pub mod event;
pub mod handle;
pub mod progress;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::row::FIRST_DATA_ROW;
use crate::policy::{AttachmentPolicy, RecipientSettings};
use crate::store::CheckpointStore;
use crate::transport::Sender;

pub use controller::{Controller, RunOutcome};
pub use event::{EventSink, LogLevel, MergeEvent, RowStatus, RunState};
pub use handle::{spawn, CancelToken, Job, RunHandle};

/// Everything the dispatcher needs to know about a run, fixed before it
/// starts. Saved with the checkpoint when a run stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub sender: Sender,
    pub recipients: RecipientSettings,
    pub attachments: AttachmentPolicy,
}

/// Where a run starts and what it sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub draft_id: String,
    /// First row index to process (2 = first data row).
    pub start_row: usize,
    /// Number of recipients, if already known. Counted from the list otherwise.
    pub total_rows: Option<usize>,
    pub resume: bool,
}

impl RunPlan {
    /// A fresh run from the first data row.
    pub fn fresh(draft_id: impl Into<String>) -> Self {
        Self {
            draft_id: draft_id.into(),
            start_row: FIRST_DATA_ROW,
            total_rows: None,
            resume: false,
        }
    }

    /// Continue from the saved checkpoint, or from the first data row if
    /// there is none.
    pub fn resume(draft_id: impl Into<String>, checkpoint: &CheckpointStore) -> Result<Self> {
        let start_row = checkpoint
            .load()?
            .map(|c| c.last_row_index.max(FIRST_DATA_ROW))
            .unwrap_or(FIRST_DATA_ROW);
        Ok(Self {
            draft_id: draft_id.into(),
            start_row,
            total_rows: None,
            resume: true,
        })
    }

    pub fn with_total_rows(mut self, total: usize) -> Self {
        self.total_rows = Some(total);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_without_checkpoint_starts_at_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = CheckpointStore::at(dir.path().join("cp.json"));
        let plan = RunPlan::resume("d", &checkpoint).unwrap();
        assert_eq!(plan.start_row, FIRST_DATA_ROW);
        assert!(plan.resume);
    }

    #[test]
    fn test_resume_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = CheckpointStore::at(dir.path().join("cp.json"));
        checkpoint.save(9).unwrap();
        let plan = RunPlan::resume("d", &checkpoint).unwrap();
        assert_eq!(plan.start_row, 9);
    }
}
