/// Backup manager
///
/// Orchestrates automatic and manual backups, new-device restore,
/// conflict-aware import, and export. Every operation publishes its progress
/// on a latest-value stream and returns a typed result. Best-effort side
/// effects (history entries, automatic cleanup) are awaited, and their
/// failures are logged and dropped.

use crate::{
    backup::{
        format, BackupManagerConfig, BackupMetadata, BackupOperation, BackupType, ImportStrategy,
        OperationChannel, OperationTracker, OperationType,
    },
    conflict::{
        merge::{fill_default_sections, merge_documents},
        ConflictResolver, ResolutionSide, ResolutionStrategy,
    },
    error::{Error, Result},
    settings::{SettingsSection, SyncStatus, UserSettings},
    store::{HistoryChangeType, LocalStore, NetworkConnectivity, RemoteStore},
    util::{next_after, now_millis},
};
use futures_util::Stream;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct BackupManager {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn NetworkConnectivity>,
    resolver: ConflictResolver,
    config: BackupManagerConfig,
    operations: OperationChannel,
}

impl BackupManager {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn NetworkConnectivity>,
    ) -> Self {
        Self::with_config(local, remote, connectivity, BackupManagerConfig::default())
    }

    pub fn with_config(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn NetworkConnectivity>,
        config: BackupManagerConfig,
    ) -> Self {
        Self {
            local,
            remote,
            connectivity,
            resolver: ConflictResolver::new(),
            config,
            operations: OperationChannel::new(),
        }
    }

    pub fn config(&self) -> &BackupManagerConfig {
        &self.config
    }

    /// Stream of operation progress; each update replaces the previous one
    pub fn observe_backup_operations(&self) -> impl Stream<Item = BackupOperation> + Send + 'static {
        self.operations.stream()
    }

    /// Raw receiver for the operation channel
    pub fn subscribe(&self) -> watch::Receiver<Option<BackupOperation>> {
        self.operations.subscribe()
    }

    pub fn latest_operation(&self) -> Option<BackupOperation> {
        self.operations.latest()
    }

    /// Store an automatic backup, then prune old automatic backups.
    ///
    /// Cleanup failures are logged and never fail the backup.
    pub async fn create_automatic_backup(&self, settings: &UserSettings) -> Result<BackupMetadata> {
        let mut tracker = self.operations.start(OperationType::AutomaticBackup, &settings.user_id);
        let result = self.automatic_backup(&mut tracker, settings).await;
        tracker.finish(result)
    }

    async fn automatic_backup(
        &self,
        tracker: &mut OperationTracker<'_>,
        settings: &UserSettings,
    ) -> Result<BackupMetadata> {
        let metadata = self
            .local
            .create_backup(settings, BackupType::Automatic)
            .await
            .map_err(|e| Error::backup("create_automatic_backup: failed to store backup", e))?;
        tracker.progress(0.5);

        if let Err(e) = self
            .cleanup_old_backups(&settings.user_id, self.config.automatic_backup_retention)
            .await
        {
            warn!("Automatic backup cleanup failed for {}: {}", settings.user_id, e);
        }

        Ok(metadata)
    }

    /// Store a manual backup of the current settings and return their
    /// portable text form
    pub async fn create_manual_backup(&self, user_id: &str) -> Result<String> {
        let mut tracker = self.operations.start(OperationType::ManualBackup, user_id);
        let result = self.manual_backup(&mut tracker, user_id).await;
        tracker.finish(result)
    }

    async fn manual_backup(&self, tracker: &mut OperationTracker<'_>, user_id: &str) -> Result<String> {
        let settings = self.current_settings(user_id, "create_manual_backup").await?;
        tracker.progress(0.3);

        let serialized = format::encode_settings(&settings)
            .map_err(|e| Error::backup("create_manual_backup: failed to serialize settings", e))?;
        tracker.progress(0.6);

        self.local
            .create_backup(&settings, BackupType::Manual)
            .await
            .map_err(|e| Error::backup("create_manual_backup: failed to store backup", e))?;

        Ok(serialized)
    }

    /// Restore settings on a fresh install.
    ///
    /// Source order: `backup_data` if given, else the remote document when
    /// online, else section defaults. The candidate is validated before
    /// anything is written; on failure existing state is untouched.
    pub async fn restore_on_new_device(&self, user_id: &str, backup_data: Option<&str>) -> Result<UserSettings> {
        let mut tracker = self.operations.start(OperationType::Restore, user_id);
        let result = self.restore(&mut tracker, user_id, backup_data).await;
        tracker.finish(result)
    }

    async fn restore(
        &self,
        tracker: &mut OperationTracker<'_>,
        user_id: &str,
        backup_data: Option<&str>,
    ) -> Result<UserSettings> {
        let candidate = match backup_data {
            Some(data) => format::decode_and_validate(data)
                .map_err(|e| Error::backup("restore_on_new_device: invalid backup payload", e))?,
            None if self.connectivity.is_connected() => {
                let remote = self
                    .remote
                    .get_settings(user_id)
                    .await
                    .map_err(|e| Error::backup("restore_on_new_device: failed to fetch remote settings", e))?;
                match remote {
                    Some(settings) => {
                        settings
                            .validate()
                            .map_err(|e| Error::backup("restore_on_new_device: invalid remote settings", e))?;
                        settings
                    }
                    None => {
                        info!("No remote settings for {}, restoring defaults", user_id);
                        UserSettings::default_settings(user_id)
                    }
                }
            }
            None => {
                info!("Offline with no backup data for {}, restoring defaults", user_id);
                UserSettings::default_settings(user_id)
            }
        };
        tracker.progress(0.5);

        let restored = self
            .adopt(user_id, candidate, "restore_on_new_device")
            .await?;
        tracker.progress(0.8);

        self.record_history(&restored, HistoryChangeType::Restore).await;
        Ok(restored)
    }

    /// Restore settings from a locally stored backup
    pub async fn restore_from_backup(&self, user_id: &str, backup_id: &str) -> Result<UserSettings> {
        let mut tracker = self.operations.start(OperationType::Restore, user_id);
        let result = self.restore_stored(&mut tracker, user_id, backup_id).await;
        tracker.finish(result)
    }

    async fn restore_stored(
        &self,
        tracker: &mut OperationTracker<'_>,
        user_id: &str,
        backup_id: &str,
    ) -> Result<UserSettings> {
        let candidate = self
            .local
            .load_backup(backup_id)
            .await
            .map_err(|e| Error::backup("restore_from_backup: failed to load backup", e))?
            .ok_or_else(|| Error::backup(format!("restore_from_backup: backup {} not found", backup_id), None))?;

        if candidate.user_id != user_id {
            return Err(Error::backup(
                format!("restore_from_backup: backup {} belongs to another user", backup_id),
                None,
            ));
        }
        candidate
            .validate()
            .map_err(|e| Error::backup("restore_from_backup: invalid backup payload", e))?;
        tracker.progress(0.5);

        let restored = self.adopt(user_id, candidate, "restore_from_backup").await?;
        self.record_history(&restored, HistoryChangeType::Restore).await;
        Ok(restored)
    }

    /// Resolve a local/remote pair with the chosen strategy and persist the result
    pub async fn resolve_conflict_with_user_choice(
        &self,
        user_id: &str,
        local: &UserSettings,
        remote: &UserSettings,
        strategy: ResolutionStrategy,
    ) -> Result<UserSettings> {
        let resolved = self.resolver.resolve_conflict(local, remote, strategy)?;
        self.persist_resolution(user_id, resolved, local, remote, strategy, "resolve_conflict_with_user_choice")
            .await
    }

    /// Apply explicit per-section choices and persist the result
    pub async fn apply_manual_resolution(
        &self,
        user_id: &str,
        local: &UserSettings,
        remote: &UserSettings,
        choices: &HashMap<SettingsSection, ResolutionSide>,
    ) -> Result<UserSettings> {
        let resolved = self.resolver.resolve_with_choices(local, remote, choices)?;
        self.persist_resolution(
            user_id,
            resolved,
            local,
            remote,
            ResolutionStrategy::ManualResolution,
            "apply_manual_resolution",
        )
        .await
    }

    /// Store a resolution as a new local write, ahead of both inputs.
    ///
    /// The result counts as reconciled with `remote`.
    async fn persist_resolution(
        &self,
        user_id: &str,
        mut resolved: UserSettings,
        local: &UserSettings,
        remote: &UserSettings,
        strategy: ResolutionStrategy,
        operation: &str,
    ) -> Result<UserSettings> {
        resolved.user_id = user_id.to_string();
        resolved.version = local.version.max(remote.version) + 1;
        resolved.last_modified = next_after(Some(local.last_modified.max(remote.last_modified)));
        resolved.last_synced_at = Some(remote.last_modified);
        resolved.sync_status = SyncStatus::Pending;

        self.local
            .save_user_settings(&resolved)
            .await
            .map_err(|e| Error::backup(format!("{}: failed to persist settings", operation), e))?;
        info!("Resolved settings conflict for {} with {}", user_id, strategy);

        self.record_history(&resolved, HistoryChangeType::ConflictResolved(strategy))
            .await;
        Ok(resolved)
    }

    /// Import a backup payload and combine it with any existing document
    pub async fn import_settings(
        &self,
        user_id: &str,
        backup_data: &str,
        strategy: ImportStrategy,
    ) -> Result<UserSettings> {
        let mut tracker = self.operations.start(OperationType::Import, user_id);
        let result = self.import(&mut tracker, user_id, backup_data, strategy).await;
        tracker.finish(result)
    }

    async fn import(
        &self,
        tracker: &mut OperationTracker<'_>,
        user_id: &str,
        backup_data: &str,
        strategy: ImportStrategy,
    ) -> Result<UserSettings> {
        let imported = format::decode_and_validate(backup_data)
            .map_err(|e| Error::backup("import_settings: invalid backup payload", e))?;
        tracker.progress(0.3);

        let existing = self
            .local
            .get_user_settings(user_id)
            .await
            .map_err(|e| Error::backup("import_settings: failed to load existing settings", e))?;
        tracker.progress(0.5);

        let combined = match (strategy, existing) {
            (ImportStrategy::ReplaceAll, _) | (_, None) => imported,
            (ImportStrategy::MergeWithExisting, Some(existing)) => merge_documents(&existing, &imported),
            (ImportStrategy::ImportMissingOnly, Some(existing)) => fill_default_sections(&existing, &imported),
        };
        debug!("Import for {} combined with {:?}", user_id, strategy);

        let result = self.adopt(user_id, combined, "import_settings").await?;
        tracker.progress(0.8);

        self.record_history(&result, HistoryChangeType::Import).await;
        Ok(result)
    }

    /// Serialize the current settings, optionally wrapped with export metadata.
    ///
    /// Also stores a local EXPORT backup.
    pub async fn export_settings(&self, user_id: &str, include_metadata: bool) -> Result<String> {
        let mut tracker = self.operations.start(OperationType::Export, user_id);
        let result = self.export(&mut tracker, user_id, include_metadata).await;
        tracker.finish(result)
    }

    async fn export(
        &self,
        tracker: &mut OperationTracker<'_>,
        user_id: &str,
        include_metadata: bool,
    ) -> Result<String> {
        let settings = self
            .local
            .get_user_settings(user_id)
            .await
            .map_err(|e| Error::export("export_settings: failed to load settings", e))?
            .ok_or_else(|| Error::export(format!("export_settings: no settings found for {}", user_id), None))?;
        tracker.progress(0.3);

        let payload = if include_metadata {
            format::encode_export(&settings, now_millis())
        } else {
            format::encode_settings(&settings)
        }
        .map_err(|e| Error::export("export_settings: failed to serialize settings", e))?;
        tracker.progress(0.6);

        self.local
            .create_backup(&settings, BackupType::Export)
            .await
            .map_err(|e| Error::export("export_settings: failed to store export backup", e))?;

        self.record_history(&settings, HistoryChangeType::Export).await;
        Ok(payload)
    }

    /// Stored backups for a user, newest first
    pub async fn get_backup_history(&self, user_id: &str) -> Result<Vec<BackupMetadata>> {
        let mut backups = self
            .local
            .list_backups(user_id)
            .await
            .map_err(|e| Error::backup("get_backup_history: failed to list backups", e))?;
        sort_newest_first(&mut backups);
        Ok(backups)
    }

    /// Delete automatic backups beyond the newest `keep_count`.
    ///
    /// Manual and export backups are never touched. Returns the number deleted.
    pub async fn cleanup_old_backups(&self, user_id: &str, keep_count: usize) -> Result<usize> {
        let mut tracker = self.operations.start(OperationType::Cleanup, user_id);
        let result = self.cleanup(&mut tracker, user_id, keep_count).await;
        tracker.finish(result)
    }

    async fn cleanup(&self, tracker: &mut OperationTracker<'_>, user_id: &str, keep_count: usize) -> Result<usize> {
        let mut automatic: Vec<BackupMetadata> = self
            .local
            .list_backups(user_id)
            .await
            .map_err(|e| Error::backup("cleanup_old_backups: failed to list backups", e))?
            .into_iter()
            .filter(|b| b.backup_type == BackupType::Automatic)
            .collect();
        sort_newest_first(&mut automatic);

        let expired: Vec<BackupMetadata> = automatic.into_iter().skip(keep_count).collect();
        let total = expired.len();

        for (index, backup) in expired.iter().enumerate() {
            self.local.delete_backup(&backup.backup_id).await.map_err(|e| {
                Error::backup(format!("cleanup_old_backups: failed to delete {}", backup.backup_id), e)
            })?;
            tracker.progress((index + 1) as f32 / total as f32);
        }

        if total > 0 {
            debug!("Deleted {} automatic backups for {}", total, user_id);
        }
        Ok(total)
    }

    /// Load the current local document, or fail with a backup error
    async fn current_settings(&self, user_id: &str, operation: &str) -> Result<UserSettings> {
        self.local
            .get_user_settings(user_id)
            .await
            .map_err(|e| Error::backup(format!("{}: failed to load settings", operation), e))?
            .ok_or_else(|| Error::backup(format!("{}: no settings found for {}", operation, user_id), None))
    }

    /// Take ownership of an incoming document and persist it locally.
    ///
    /// Rewrites the user id and metadata so the result is a fresh pending
    /// write whose version does not go backwards.
    async fn adopt(&self, user_id: &str, mut incoming: UserSettings, operation: &str) -> Result<UserSettings> {
        let existing = self
            .local
            .get_user_settings(user_id)
            .await
            .map_err(|e| Error::backup(format!("{}: failed to load existing settings", operation), e))?;

        incoming.user_id = user_id.to_string();
        incoming.sync_status = SyncStatus::Pending;
        match existing {
            Some(existing) => {
                incoming.version = incoming.version.max(existing.version + 1);
                incoming.last_modified = next_after(Some(existing.last_modified));
                incoming.last_synced_at = existing.last_synced_at;
            }
            None => {
                incoming.last_modified = now_millis();
                incoming.last_synced_at = None;
            }
        }

        self.local
            .save_user_settings(&incoming)
            .await
            .map_err(|e| Error::backup(format!("{}: failed to persist settings", operation), e))?;

        Ok(incoming)
    }

    /// Append a history entry when online; failures are logged and dropped
    async fn record_history(&self, settings: &UserSettings, change_type: HistoryChangeType) {
        if !self.connectivity.is_connected() {
            debug!("Offline, skipping {} history entry for {}", change_type, settings.user_id);
            return;
        }

        if let Err(e) = self
            .remote
            .append_history(&settings.user_id, settings, change_type, &self.config.device_info)
            .await
        {
            warn!(
                "Failed to append {} history entry for {}: {}",
                change_type, settings.user_id, e
            );
        }
    }
}

fn sort_newest_first(backups: &mut [BackupMetadata]) {
    backups.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.backup_id.cmp(&a.backup_id))
    });
}
