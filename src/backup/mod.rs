/// Backup, restore, import, and export of settings documents

pub mod format;
pub mod manager;
pub mod progress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use manager::*;
pub use progress::*;

/// Operation that produced a stored backup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupType {
    /// Taken by the system; subject to retention cleanup
    Automatic,
    /// Requested by the user; never auto-deleted
    Manual,
    /// Side effect of an export; never auto-deleted
    Export,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Automatic => "AUTOMATIC",
            BackupType::Manual => "MANUAL",
            BackupType::Export => "EXPORT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AUTOMATIC" => Some(BackupType::Automatic),
            "MANUAL" => Some(BackupType::Manual),
            "EXPORT" => Some(BackupType::Export),
            _ => None,
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry for one stored backup blob
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub backup_id: String,
    pub user_id: String,
    pub backup_type: BackupType,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Size of the serialized document
    pub data_size_bytes: u64,
    /// Document version at the time of backup
    pub settings_version: u64,
    /// Hex SHA-256 of the serialized document
    pub checksum: String,
}

/// How imported data combines with an existing document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStrategy {
    /// Imported document replaces the existing one
    ReplaceAll,
    /// Existing (local) and imported (remote) are merged section by section
    MergeWithExisting,
    /// Only sections still at their factory default take the imported value
    ImportMissingOnly,
}

/// Backup manager configuration
#[derive(Debug, Clone)]
pub struct BackupManagerConfig {
    /// Automatic backups kept per user after each automatic backup
    pub automatic_backup_retention: usize,
    /// Device description attached to history entries
    pub device_info: String,
}

impl Default for BackupManagerConfig {
    fn default() -> Self {
        Self {
            automatic_backup_retention: 10,
            device_info: format!("prefsync/{}", crate::VERSION),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_type_parse() {
        for backup_type in [BackupType::Automatic, BackupType::Manual, BackupType::Export] {
            assert_eq!(BackupType::parse(backup_type.as_str()), Some(backup_type));
        }
        assert_eq!(BackupType::parse("nightly"), None);
    }

    #[test]
    fn test_default_config() {
        let config = BackupManagerConfig::default();
        assert_eq!(config.automatic_backup_retention, 10);
        assert!(config.device_info.starts_with("prefsync/"));
    }
}
