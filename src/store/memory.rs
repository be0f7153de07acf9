//! In-process store implementations.
//!
//! Each store carries failure switches so callers can exercise their
//! error and best-effort paths without a real backend.

use crate::{
    backup::{format, BackupMetadata, BackupType},
    error::{Error, Result},
    settings::UserSettings,
    store::{HistoryChangeType, HistoryEntry, LocalStore, NetworkConnectivity, RemoteStore},
    util::{checksum_hex, next_after, now_millis},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;

struct StoredBackup {
    metadata: BackupMetadata,
    payload: String,
}

/// In-memory local store
pub struct MemoryLocalStore {
    settings: RwLock<HashMap<String, UserSettings>>,
    backups: RwLock<HashMap<String, StoredBackup>>,
    last_backup_at: RwLock<Option<DateTime<Utc>>>,
    fail_writes: AtomicBool,
    fail_backups: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(HashMap::new()),
            backups: RwLock::new(HashMap::new()),
            last_backup_at: RwLock::new(None),
            fail_writes: AtomicBool::new(false),
            fail_backups: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Make settings writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make backup creation fail
    pub fn set_fail_backups(&self, fail: bool) {
        self.fail_backups.store(fail, Ordering::SeqCst);
    }

    /// Make backup deletion fail
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a stored backup payload, bypassing the checksum
    pub async fn corrupt_backup(&self, backup_id: &str, payload: &str) {
        let mut backups = self.backups.write().await;
        if let Some(stored) = backups.get_mut(backup_id) {
            stored.payload = payload.to_string();
        }
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get_user_settings(&self, user_id: &str) -> Result<Option<UserSettings>> {
        let settings = self.settings.read().await;
        Ok(settings.get(user_id).cloned())
    }

    async fn save_user_settings(&self, settings: &UserSettings) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database("Failed to save settings: write rejected".to_string()));
        }
        let mut stored = self.settings.write().await;
        stored.insert(settings.user_id.clone(), settings.clone());
        Ok(())
    }

    async fn delete_user_settings(&self, user_id: &str) -> Result<()> {
        let mut stored = self.settings.write().await;
        stored.remove(user_id);
        Ok(())
    }

    async fn create_backup(&self, settings: &UserSettings, backup_type: BackupType) -> Result<BackupMetadata> {
        if self.fail_backups.load(Ordering::SeqCst) {
            return Err(Error::Database("Failed to create backup: write rejected".to_string()));
        }

        let payload = format::encode_settings(settings)?;

        // Stamps are strictly increasing so retention ordering is total
        let created_at = {
            let mut last = self.last_backup_at.write().await;
            let created_at = next_after(*last);
            *last = Some(created_at);
            created_at
        };

        let metadata = BackupMetadata {
            backup_id: uuid::Uuid::new_v4().to_string(),
            user_id: settings.user_id.clone(),
            backup_type,
            created_at,
            data_size_bytes: payload.len() as u64,
            settings_version: settings.version,
            checksum: checksum_hex(payload.as_bytes()),
        };

        let mut backups = self.backups.write().await;
        backups.insert(
            metadata.backup_id.clone(),
            StoredBackup {
                metadata: metadata.clone(),
                payload,
            },
        );

        Ok(metadata)
    }

    async fn load_backup(&self, backup_id: &str) -> Result<Option<UserSettings>> {
        let backups = self.backups.read().await;
        match backups.get(backup_id) {
            Some(stored) => {
                if checksum_hex(stored.payload.as_bytes()) != stored.metadata.checksum {
                    return Err(Error::backup(format!("backup {} failed checksum verification", backup_id), None));
                }
                Ok(Some(format::decode_backup(&stored.payload)?))
            }
            None => Ok(None),
        }
    }

    async fn list_backups(&self, user_id: &str) -> Result<Vec<BackupMetadata>> {
        let backups = self.backups.read().await;
        Ok(backups
            .values()
            .filter(|b| b.metadata.user_id == user_id)
            .map(|b| b.metadata.clone())
            .collect())
    }

    async fn delete_backup(&self, backup_id: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Database(format!("Failed to delete backup {}", backup_id)));
        }
        let mut backups = self.backups.write().await;
        backups
            .remove(backup_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("backup {}", backup_id)))
    }
}

/// In-memory remote store with an optimistic-concurrency guard
pub struct MemoryRemoteStore {
    documents: RwLock<HashMap<String, UserSettings>>,
    history: RwLock<Vec<HistoryEntry>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_history: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    /// Store a document unconditionally, as another device would
    pub async fn seed(&self, settings: UserSettings) {
        let mut documents = self.documents.write().await;
        documents.insert(settings.user_id.clone(), settings);
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_settings(&self, user_id: &str) -> Result<Option<UserSettings>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Io("remote store unreachable".to_string()));
        }
        let documents = self.documents.read().await;
        Ok(documents.get(user_id).cloned())
    }

    async fn conditional_update(
        &self,
        settings: &UserSettings,
        expected_last_modified: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io("remote store unreachable".to_string()));
        }

        let mut documents = self.documents.write().await;
        if let Some(stored) = documents.get(&settings.user_id) {
            if stored.version > settings.version {
                return Err(Error::VersionConflict {
                    expected: format!("version >= {}", stored.version),
                    actual: settings.version.to_string(),
                });
            }
            if expected_last_modified != Some(stored.last_modified) {
                return Err(Error::VersionConflict {
                    expected: format!("{:?}", expected_last_modified.map(|t| t.timestamp_millis())),
                    actual: stored.last_modified.timestamp_millis().to_string(),
                });
            }
        } else if let Some(expected) = expected_last_modified {
            return Err(Error::VersionConflict {
                expected: expected.timestamp_millis().to_string(),
                actual: "missing".to_string(),
            });
        }

        documents.insert(settings.user_id.clone(), settings.clone());
        Ok(())
    }

    async fn delete_settings(&self, user_id: &str) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.remove(user_id);
        Ok(())
    }

    async fn append_history(
        &self,
        user_id: &str,
        settings: &UserSettings,
        change_type: HistoryChangeType,
        device_info: &str,
    ) -> Result<String> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Error::Io("history log unreachable".to_string()));
        }

        let entry = HistoryEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            change_type,
            device_info: device_info.to_string(),
            settings: settings.clone(),
            recorded_at: now_millis(),
        };
        let entry_id = entry.entry_id.clone();

        let mut history = self.history.write().await;
        history.push(entry);
        Ok(entry_id)
    }

    async fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        let history = self.history.read().await;
        Ok(history.iter().filter(|e| e.user_id == user_id).cloned().collect())
    }
}

/// Connectivity signal that is set by hand
pub struct StaticConnectivity {
    connected: AtomicBool,
    wifi: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            wifi: AtomicBool::new(connected),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_wifi(&self, wifi: bool) {
        self.wifi.store(wifi, Ordering::SeqCst);
    }
}

impl NetworkConnectivity for StaticConnectivity {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_wifi(&self) -> bool {
        self.is_connected() && self.wifi.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_settings_round_trip() {
        let store = MemoryLocalStore::new();
        let settings = UserSettings::default_settings("user123");

        store.save_user_settings(&settings).await.unwrap();
        assert_eq!(store.get_user_settings("user123").await.unwrap(), Some(settings));
        assert_eq!(store.get_user_settings("other").await.unwrap(), None);

        store.delete_user_settings("user123").await.unwrap();
        assert_eq!(store.get_user_settings("user123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_backup_stamps_strictly_increase() {
        let store = MemoryLocalStore::new();
        let settings = UserSettings::default_settings("user123");

        let first = store.create_backup(&settings, BackupType::Automatic).await.unwrap();
        let second = store.create_backup(&settings, BackupType::Automatic).await.unwrap();
        assert!(second.created_at > first.created_at);
        assert_eq!(store.list_backups("user123").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_backup_fails_checksum() {
        let store = MemoryLocalStore::new();
        let settings = UserSettings::default_settings("user123");
        let meta = store.create_backup(&settings, BackupType::Manual).await.unwrap();

        assert_eq!(store.load_backup(&meta.backup_id).await.unwrap().map(|s| s.user_id), Some("user123".to_string()));

        store.corrupt_backup(&meta.backup_id, "{}").await;
        assert!(store.load_backup(&meta.backup_id).await.is_err());
    }

    #[tokio::test]
    async fn test_remote_rejects_stale_version() {
        let store = MemoryRemoteStore::new();
        let mut settings = UserSettings::default_settings("user123");
        settings.version = 5;
        store.conditional_update(&settings, None).await.unwrap();

        let mut stale = settings.clone();
        stale.version = 4;
        let err = store.conditional_update(&stale, Some(settings.last_modified)).await.unwrap_err();
        assert!(matches!(err, Error::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_remote_rejects_unexpected_timestamp() {
        let store = MemoryRemoteStore::new();
        let settings = UserSettings::default_settings("user123");
        store.conditional_update(&settings, None).await.unwrap();

        // Creating again as if the document did not exist
        assert!(store.conditional_update(&settings, None).await.is_err());
        // Matching expectation succeeds
        store.conditional_update(&settings, Some(settings.last_modified)).await.unwrap();
    }

    #[tokio::test]
    async fn test_history_is_append_only_per_user() {
        let store = MemoryRemoteStore::new();
        let settings = UserSettings::default_settings("user123");

        store.append_history("user123", &settings, HistoryChangeType::Import, "test").await.unwrap();
        store.append_history("user123", &settings, HistoryChangeType::Export, "test").await.unwrap();
        store.append_history("other", &settings, HistoryChangeType::Export, "test").await.unwrap();

        let history = store.history("user123").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].change_type, HistoryChangeType::Import);

        store.set_fail_history(true);
        assert!(store.append_history("user123", &settings, HistoryChangeType::Sync, "test").await.is_err());
    }

    #[test]
    fn test_failure_switches() {
        let local = MemoryLocalStore::new();
        let remote = MemoryRemoteStore::new();
        let settings = UserSettings::default_settings("user123");

        tokio_test::block_on(async {
            local.set_fail_writes(true);
            tokio_test::assert_err!(local.save_user_settings(&settings).await);
            local.set_fail_writes(false);
            tokio_test::assert_ok!(local.save_user_settings(&settings).await);

            local.set_fail_backups(true);
            tokio_test::assert_err!(local.create_backup(&settings, BackupType::Manual).await);
            local.set_fail_backups(false);
            let meta = tokio_test::assert_ok!(local.create_backup(&settings, BackupType::Manual).await);

            local.set_fail_deletes(true);
            tokio_test::assert_err!(local.delete_backup(&meta.backup_id).await);

            remote.set_fail_reads(true);
            tokio_test::assert_err!(remote.get_settings("user123").await);
        });
    }

    #[test]
    fn test_static_connectivity() {
        let connectivity = StaticConnectivity::offline();
        assert!(!connectivity.is_connected());
        assert!(!connectivity.is_wifi());

        connectivity.set_connected(true);
        connectivity.set_wifi(false);
        assert!(connectivity.is_connected());
        assert!(!connectivity.is_wifi());
    }
}
