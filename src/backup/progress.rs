/// Progress reporting for backup-manager operations
///
/// Operations publish to a single latest-value channel: each update replaces
/// the previous one for every observer.

use crate::{error::Result, util::now_millis};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Kind of backup-manager operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    AutomaticBackup,
    ManualBackup,
    Restore,
    Import,
    Export,
    Cleanup,
}

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Started,
    InProgress,
    Completed,
    Failed,
}

/// Snapshot of one operation's progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupOperation {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub user_id: String,
    pub status: OperationStatus,
    /// Fraction complete in [0, 1]
    pub progress: f32,
    pub error: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
}

impl BackupOperation {
    pub fn is_finished(&self) -> bool {
        matches!(self.status, OperationStatus::Completed | OperationStatus::Failed)
    }
}

/// Latest-value broadcast of operation progress
#[derive(Debug)]
pub struct OperationChannel {
    sender: watch::Sender<Option<BackupOperation>>,
}

impl OperationChannel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Most recently published operation
    pub fn latest(&self) -> Option<BackupOperation> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<BackupOperation>> {
        self.sender.subscribe()
    }

    /// Stream of operation updates published after this call.
    ///
    /// A slow consumer only sees the latest value; intermediate updates are
    /// skipped. The stream ends when the channel is dropped.
    pub fn stream(&self) -> impl Stream<Item = BackupOperation> + Send + 'static {
        futures_util::stream::unfold(self.subscribe(), |mut receiver| async move {
            loop {
                if receiver.changed().await.is_err() {
                    return None;
                }
                let current = receiver.borrow_and_update().clone();
                if let Some(operation) = current {
                    return Some((operation, receiver));
                }
            }
        })
    }

    /// Begin tracking a new operation and publish STARTED
    pub fn start(&self, operation_type: OperationType, user_id: &str) -> OperationTracker<'_> {
        let operation = BackupOperation {
            operation_id: uuid::Uuid::new_v4().to_string(),
            operation_type,
            user_id: user_id.to_string(),
            status: OperationStatus::Started,
            progress: 0.0,
            error: None,
            started_at: now_millis(),
        };
        debug!("Starting {:?} for {}", operation_type, user_id);

        let tracker = OperationTracker {
            channel: self,
            operation,
        };
        tracker.publish();
        tracker
    }

    fn publish(&self, operation: BackupOperation) {
        self.sender.send_replace(Some(operation));
    }
}

impl Default for OperationChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one in-flight operation
pub struct OperationTracker<'a> {
    channel: &'a OperationChannel,
    operation: BackupOperation,
}

impl OperationTracker<'_> {
    /// Publish IN_PROGRESS with the given fraction, clamped to [0, 1]
    pub fn progress(&mut self, progress: f32) {
        self.operation.status = OperationStatus::InProgress;
        self.operation.progress = progress.clamp(0.0, 1.0);
        self.publish();
    }

    /// Publish COMPLETED or FAILED for `result` and hand it back
    pub fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                self.operation.status = OperationStatus::Completed;
                self.operation.progress = 1.0;
                info!(
                    "{:?} for {} completed",
                    self.operation.operation_type, self.operation.user_id
                );
            }
            Err(e) => {
                self.operation.status = OperationStatus::Failed;
                self.operation.error = Some(e.to_string());
                warn!(
                    "{:?} for {} failed: {}",
                    self.operation.operation_type, self.operation.user_id, e
                );
            }
        }
        self.publish();
        result
    }

    fn publish(&self) {
        self.channel.publish(self.operation.clone());
    }
}
