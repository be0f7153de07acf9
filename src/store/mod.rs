pub mod memory;

use crate::{
    backup::{BackupMetadata, BackupType},
    conflict::ResolutionStrategy,
    error::Result,
    settings::UserSettings,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::*;

/// Device-local settings and backup storage
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Load the settings document for a user
    async fn get_user_settings(&self, user_id: &str) -> Result<Option<UserSettings>>;

    /// Insert or replace the settings document for its user
    async fn save_user_settings(&self, settings: &UserSettings) -> Result<()>;

    /// Delete the settings document for a user
    async fn delete_user_settings(&self, user_id: &str) -> Result<()>;

    /// Persist a backup snapshot of `settings`
    async fn create_backup(&self, settings: &UserSettings, backup_type: BackupType) -> Result<BackupMetadata>;

    /// Load the snapshot stored under a backup id
    async fn load_backup(&self, backup_id: &str) -> Result<Option<UserSettings>>;

    /// List backup metadata for a user, in no particular order
    async fn list_backups(&self, user_id: &str) -> Result<Vec<BackupMetadata>>;

    /// Delete a backup blob and its metadata
    async fn delete_backup(&self, backup_id: &str) -> Result<()>;
}

/// Remote document store shared by all of a user's devices
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Load the remote settings document for a user
    async fn get_settings(&self, user_id: &str) -> Result<Option<UserSettings>>;

    /// Write `settings` if the stored document still matches `expected_last_modified`.
    ///
    /// Fails with [`crate::Error::VersionConflict`] when the stored document
    /// has a higher version, or was modified since the caller last read it.
    /// `None` expects that no document exists yet.
    async fn conditional_update(
        &self,
        settings: &UserSettings,
        expected_last_modified: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Delete the remote settings document for a user
    async fn delete_settings(&self, user_id: &str) -> Result<()>;

    /// Append an audit record; returns the entry id
    async fn append_history(
        &self,
        user_id: &str,
        settings: &UserSettings,
        change_type: HistoryChangeType,
        device_info: &str,
    ) -> Result<String>;

    /// Read a user's audit log, oldest first
    async fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>>;
}

/// Network reachability signal
pub trait NetworkConnectivity: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Whether the current connection is unmetered
    fn is_wifi(&self) -> bool {
        self.is_connected()
    }
}

/// Kind of change recorded in the remote history log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "strategy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryChangeType {
    Update,
    Sync,
    Restore,
    ConflictResolved(ResolutionStrategy),
    Import,
    Export,
}

impl HistoryChangeType {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryChangeType::Update => "UPDATE",
            HistoryChangeType::Sync => "SYNC",
            HistoryChangeType::Restore => "RESTORE",
            HistoryChangeType::ConflictResolved(_) => "CONFLICT_RESOLVED",
            HistoryChangeType::Import => "IMPORT",
            HistoryChangeType::Export => "EXPORT",
        }
    }

    /// Strategy that produced a conflict resolution, if any
    pub fn strategy(&self) -> Option<ResolutionStrategy> {
        match self {
            HistoryChangeType::ConflictResolved(strategy) => Some(*strategy),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryChangeType::ConflictResolved(strategy) => write!(f, "{}:{}", self.label(), strategy),
            _ => f.write_str(self.label()),
        }
    }
}

/// One append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub entry_id: String,
    pub user_id: String,
    pub change_type: HistoryChangeType,
    pub device_info: String,
    pub settings: UserSettings,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub recorded_at: DateTime<Utc>,
}
