//! Sync coordinator
//!
//! Reconciles the local and remote copies of a user's settings document.
//! Conflicting copies go through the resolver's recommended strategy; a
//! sensitive conflict is parked as `CONFLICT` until the user chooses.

use crate::{
    backup::BackupManager,
    conflict::{ConflictResolver, ResolutionStrategy, SettingsConflict},
    error::{Error, Result},
    settings::{
        CyclePreferences, DisplayPreferences, NotificationPreferences, PrivacyPreferences, SectionValue,
        SyncPreferences, SyncStatus, UnitPreferences, UserSettings,
    },
    store::{HistoryChangeType, LocalStore, NetworkConnectivity, RemoteStore},
    util::next_after,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Device description attached to history entries
    pub device_info: String,
    /// Take an automatic backup of the local copy before resolving a conflict
    pub backup_before_resolution: bool,
    /// Run a sync when connectivity comes back
    pub push_pending_on_reconnect: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_info: format!("prefsync/{}", crate::VERSION),
            backup_before_resolution: true,
            push_pending_on_reconnect: true,
        }
    }
}

/// What a sync pass did
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No network; nothing was attempted
    Offline,
    /// Neither side had a document; defaults were created and pushed
    Created,
    /// Local copy was written to the remote store
    Pushed,
    /// Remote copy was adopted locally
    Pulled,
    /// Both copies already agreed
    InSync,
    /// Conflicts were resolved automatically and pushed
    Resolved(ResolutionStrategy),
    /// Conflicts touch sensitive sections and wait for the user
    ManualResolutionRequired(Vec<SettingsConflict>),
}

pub struct SyncCoordinator {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn NetworkConnectivity>,
    backups: Arc<BackupManager>,
    resolver: ConflictResolver,
    config: SyncConfig,
}

impl SyncCoordinator {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn NetworkConnectivity>,
        backups: Arc<BackupManager>,
    ) -> Self {
        Self::with_config(local, remote, connectivity, backups, SyncConfig::default())
    }

    pub fn with_config(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn NetworkConnectivity>,
        backups: Arc<BackupManager>,
        config: SyncConfig,
    ) -> Self {
        Self {
            local,
            remote,
            connectivity,
            backups,
            resolver: ConflictResolver::new(),
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn backups(&self) -> &Arc<BackupManager> {
        &self.backups
    }

    /// Load the local document, creating and saving defaults when absent
    pub async fn get_or_create_settings(&self, user_id: &str) -> Result<UserSettings> {
        if let Some(settings) = self.local.get_user_settings(user_id).await? {
            return Ok(settings);
        }

        let settings = UserSettings::default_settings(user_id);
        settings.validate()?;
        self.local.save_user_settings(&settings).await?;
        debug!("Created default settings for {}", user_id);
        Ok(settings)
    }

    pub async fn update_unit_preferences(&self, user_id: &str, units: UnitPreferences) -> Result<UserSettings> {
        self.update_section(user_id, SectionValue::UnitPreferences(units)).await
    }

    pub async fn update_notification_preferences(
        &self,
        user_id: &str,
        notifications: NotificationPreferences,
    ) -> Result<UserSettings> {
        self.update_section(user_id, SectionValue::NotificationPreferences(notifications))
            .await
    }

    pub async fn update_cycle_preferences(&self, user_id: &str, cycle: CyclePreferences) -> Result<UserSettings> {
        self.update_section(user_id, SectionValue::CyclePreferences(cycle)).await
    }

    pub async fn update_privacy_preferences(
        &self,
        user_id: &str,
        privacy: PrivacyPreferences,
    ) -> Result<UserSettings> {
        self.update_section(user_id, SectionValue::PrivacyPreferences(privacy)).await
    }

    pub async fn update_display_preferences(
        &self,
        user_id: &str,
        display: DisplayPreferences,
    ) -> Result<UserSettings> {
        self.update_section(user_id, SectionValue::DisplayPreferences(display)).await
    }

    pub async fn update_sync_preferences(&self, user_id: &str, sync: SyncPreferences) -> Result<UserSettings> {
        self.update_section(user_id, SectionValue::SyncPreferences(sync)).await
    }

    async fn update_section(&self, user_id: &str, value: SectionValue) -> Result<UserSettings> {
        value.validate()?;

        let mut settings = self.get_or_create_settings(user_id).await?;
        let section = value.section();
        settings.apply_section_update(value);
        self.local.save_user_settings(&settings).await?;

        debug!("Updated {} for {} (version {})", section, user_id, settings.version);
        Ok(settings)
    }

    /// Reconcile the local and remote documents for `user_id`
    pub async fn sync(&self, user_id: &str) -> Result<SyncOutcome> {
        if !self.connectivity.is_connected() {
            debug!("Skipping sync for {}: offline", user_id);
            return Ok(SyncOutcome::Offline);
        }

        let local = self.local.get_user_settings(user_id).await?;
        let remote = self
            .remote
            .get_settings(user_id)
            .await
            .map_err(|e| Error::sync("failed to fetch remote settings", e))?;

        match (local, remote) {
            (None, None) => {
                let defaults = UserSettings::default_settings(user_id);
                self.push(&defaults, None, None).await?;
                info!("Created default settings for {}", user_id);
                Ok(SyncOutcome::Created)
            }
            (Some(local), None) => {
                self.push(&local, None, None).await?;
                Ok(SyncOutcome::Pushed)
            }
            (None, Some(remote)) => {
                let version = remote.version;
                self.adopt_remote(remote, version).await?;
                Ok(SyncOutcome::Pulled)
            }
            (Some(local), Some(remote)) => self.reconcile(local, remote).await,
        }
    }

    /// React to a connectivity change; returns the sync outcome when one ran
    pub async fn on_connectivity_changed(&self, user_id: &str, connected: bool) -> Result<Option<SyncOutcome>> {
        if !connected || !self.config.push_pending_on_reconnect {
            return Ok(None);
        }

        let preferences = self
            .local
            .get_user_settings(user_id)
            .await?
            .map(|settings| settings.sync_preferences)
            .unwrap_or_default();

        if !preferences.auto_sync_enabled {
            debug!("Auto sync disabled for {}", user_id);
            return Ok(None);
        }
        if preferences.wifi_only_sync && !self.connectivity.is_wifi() {
            debug!("Deferring sync for {} until on wifi", user_id);
            return Ok(None);
        }

        self.sync(user_id).await.map(Some)
    }

    /// A local copy is only pushed without comparing sections when the
    /// remote copy is the one it was last reconciled with.
    async fn reconcile(&self, local: UserSettings, remote: UserSettings) -> Result<SyncOutcome> {
        let remote_unchanged = local.last_synced_at == Some(remote.last_modified);

        if remote_unchanged && local.version > remote.version && local.sync_status != SyncStatus::Conflict {
            self.push(&local, Some(remote.last_modified), Some(&local)).await?;
            return Ok(SyncOutcome::Pushed);
        }

        let conflicts = self.resolver.detect_conflicts(&local, &remote);

        if conflicts.is_empty() {
            if local.version != remote.version || local.sync_status != SyncStatus::Synced {
                let version = local.version.max(remote.version);
                self.adopt_remote(remote, version).await?;
            }
            return Ok(SyncOutcome::InSync);
        }

        if remote.version > local.version && local.sync_status == SyncStatus::Synced {
            let version = remote.version;
            self.adopt_remote(remote, version).await?;
            return Ok(SyncOutcome::Pulled);
        }

        let strategy = self.resolver.recommended_strategy(&conflicts);
        info!(
            "{} conflicting sections for {}, strategy {}",
            conflicts.len(),
            local.user_id,
            strategy
        );

        if strategy == ResolutionStrategy::ManualResolution {
            let mut parked = local;
            parked.sync_status = SyncStatus::Conflict;
            self.local.save_user_settings(&parked).await?;
            return Ok(SyncOutcome::ManualResolutionRequired(conflicts));
        }

        if self.config.backup_before_resolution {
            self.backups
                .create_automatic_backup(&local)
                .await
                .map_err(|e| Error::sync("failed to back up settings before resolution", e))?;
        }

        let mut resolved = self.resolver.resolve_conflict(&local, &remote, strategy)?;
        resolved.version = local.version.max(remote.version) + 1;
        resolved.last_modified = next_after(Some(local.last_modified.max(remote.last_modified)));
        self.push(&resolved, Some(remote.last_modified), Some(&local)).await?;
        self.record_history(&resolved, HistoryChangeType::ConflictResolved(strategy))
            .await;

        Ok(SyncOutcome::Resolved(strategy))
    }

    /// Conditionally write `settings` remotely, then store it locally as synced.
    ///
    /// On rejection `local` (or `settings` itself) is stored as `FAILED`.
    async fn push(
        &self,
        settings: &UserSettings,
        expected_last_modified: Option<DateTime<Utc>>,
        local: Option<&UserSettings>,
    ) -> Result<()> {
        let mut outgoing = settings.clone();
        outgoing.sync_status = SyncStatus::Synced;
        outgoing.last_synced_at = Some(outgoing.last_modified);

        if let Err(e) = self.remote.conditional_update(&outgoing, expected_last_modified).await {
            warn!("Remote rejected settings for {}: {}", outgoing.user_id, e);
            let mut failed = local.unwrap_or(settings).clone();
            failed.sync_status = SyncStatus::Failed;
            if let Err(save_error) = self.local.save_user_settings(&failed).await {
                warn!("Failed to mark settings as failed for {}: {}", failed.user_id, save_error);
            }
            return Err(Error::sync("remote rejected settings update", e));
        }

        self.local
            .save_user_settings(&outgoing)
            .await
            .map_err(|e| Error::sync("failed to store synced settings", e))?;
        self.record_history(&outgoing, HistoryChangeType::Sync).await;

        debug!("Pushed settings for {} (version {})", outgoing.user_id, outgoing.version);
        Ok(())
    }

    /// Store the remote copy locally as synced, at no less than `version`
    async fn adopt_remote(&self, mut remote: UserSettings, version: u64) -> Result<()> {
        remote.sync_status = SyncStatus::Synced;
        remote.last_synced_at = Some(remote.last_modified);
        remote.version = remote.version.max(version);
        self.local
            .save_user_settings(&remote)
            .await
            .map_err(|e| Error::sync("failed to store remote settings", e))?;
        debug!("Adopted remote settings for {} (version {})", remote.user_id, remote.version);
        Ok(())
    }

    async fn record_history(&self, settings: &UserSettings, change_type: HistoryChangeType) {
        if let Err(e) = self
            .remote
            .append_history(&settings.user_id, settings, change_type, &self.config.device_info)
            .await
        {
            warn!("Failed to record {} history for {}: {}", change_type, settings.user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        settings::{HapticIntensity, TemperatureUnit},
        store::{MemoryLocalStore, MemoryRemoteStore, StaticConnectivity},
        util::now_millis,
    };
    use chrono::Duration;

    struct Fixture {
        local: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        connectivity: Arc<StaticConnectivity>,
        coordinator: SyncCoordinator,
    }

    fn fixture() -> Fixture {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let connectivity = Arc::new(StaticConnectivity::online());
        let backups = Arc::new(BackupManager::new(local.clone(), remote.clone(), connectivity.clone()));
        let coordinator = SyncCoordinator::new(local.clone(), remote.clone(), connectivity.clone(), backups);
        Fixture {
            local,
            remote,
            connectivity,
            coordinator,
        }
    }

    #[tokio::test]
    async fn test_offline_sync_does_nothing() {
        let f = fixture();
        f.connectivity.set_connected(false);
        assert_eq!(f.coordinator.sync("user123").await.unwrap(), SyncOutcome::Offline);
        assert!(f.remote.get_settings("user123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_sync_creates_defaults() {
        let f = fixture();
        assert_eq!(f.coordinator.sync("user123").await.unwrap(), SyncOutcome::Created);

        let local = f.local.get_user_settings("user123").await.unwrap().unwrap();
        let remote = f.remote.get_settings("user123").await.unwrap().unwrap();
        assert_eq!(local, remote);
        assert_eq!(local.sync_status, SyncStatus::Synced);

        assert_eq!(f.coordinator.sync("user123").await.unwrap(), SyncOutcome::InSync);
    }

    #[tokio::test]
    async fn test_section_update_then_push() {
        let f = fixture();
        f.coordinator.sync("user123").await.unwrap();

        let units = UnitPreferences {
            temperature_unit: TemperatureUnit::Fahrenheit,
            is_manually_set: true,
            ..Default::default()
        };
        let updated = f.coordinator.update_unit_preferences("user123", units.clone()).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.sync_status, SyncStatus::Pending);

        assert_eq!(f.coordinator.sync("user123").await.unwrap(), SyncOutcome::Pushed);
        let remote = f.remote.get_settings("user123").await.unwrap().unwrap();
        assert_eq!(remote.unit_preferences, units);
        assert_eq!(remote.version, 2);
    }

    #[tokio::test]
    async fn test_invalid_update_is_rejected() {
        let f = fixture();
        let display = DisplayPreferences {
            text_size_scale: 5.0,
            ..Default::default()
        };
        assert!(matches!(
            f.coordinator.update_display_preferences("user123", display).await,
            Err(Error::Validation(_))
        ));
        assert!(f.local.get_user_settings("user123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_only_is_pulled() {
        let f = fixture();
        let mut remote = UserSettings::default_settings("user123");
        remote.cycle_preferences.average_cycle_length = 31;
        f.remote.seed(remote.clone()).await;

        assert_eq!(f.coordinator.sync("user123").await.unwrap(), SyncOutcome::Pulled);
        let local = f.local.get_user_settings("user123").await.unwrap().unwrap();
        assert_eq!(local.cycle_preferences.average_cycle_length, 31);
        assert_eq!(local.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_single_conflict_uses_last_write_wins() {
        let f = fixture();
        let mut remote = UserSettings::default_settings("user123");
        remote.display_preferences.haptic_intensity = HapticIntensity::Strong;
        remote.last_modified = now_millis() - Duration::seconds(60);
        f.remote.seed(remote).await;

        let mut local = UserSettings::default_settings("user123");
        local.display_preferences.haptic_intensity = HapticIntensity::Light;
        f.local.save_user_settings(&local).await.unwrap();

        assert_eq!(
            f.coordinator.sync("user123").await.unwrap(),
            SyncOutcome::Resolved(ResolutionStrategy::LastWriteWins)
        );

        let remote = f.remote.get_settings("user123").await.unwrap().unwrap();
        assert_eq!(remote.display_preferences.haptic_intensity, HapticIntensity::Light);

        // Pre-resolution copy was backed up
        let backups = f.coordinator.backups().get_backup_history("user123").await.unwrap();
        assert_eq!(backups.len(), 1);

        let history = f.remote.history("user123").await.unwrap();
        assert!(history
            .iter()
            .any(|h| h.change_type == HistoryChangeType::ConflictResolved(ResolutionStrategy::LastWriteWins)));
    }

    #[tokio::test]
    async fn test_sensitive_conflict_is_parked() {
        let f = fixture();
        let mut remote = UserSettings::default_settings("user123");
        remote.privacy_preferences.analytics_enabled = true;
        f.remote.seed(remote.clone()).await;

        let local = UserSettings::default_settings("user123");
        f.local.save_user_settings(&local).await.unwrap();

        match f.coordinator.sync("user123").await.unwrap() {
            SyncOutcome::ManualResolutionRequired(conflicts) => assert_eq!(conflicts.len(), 1),
            other => panic!("unexpected outcome {:?}", other),
        }

        let local = f.local.get_user_settings("user123").await.unwrap().unwrap();
        assert_eq!(local.sync_status, SyncStatus::Conflict);
        assert_eq!(f.remote.get_settings("user123").await.unwrap().unwrap(), remote);
    }

    #[tokio::test]
    async fn test_rejected_push_marks_failed() {
        let f = fixture();
        f.coordinator.sync("user123").await.unwrap();
        f.coordinator
            .update_cycle_preferences(
                "user123",
                CyclePreferences {
                    average_cycle_length: 30,
                    is_customized: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.remote.set_fail_writes(true);
        let err = f.coordinator.sync("user123").await.unwrap_err();
        assert!(matches!(err, Error::Sync { .. }));

        let local = f.local.get_user_settings("user123").await.unwrap().unwrap();
        assert_eq!(local.sync_status, SyncStatus::Failed);
        assert_eq!(local.cycle_preferences.average_cycle_length, 30);
    }

    #[tokio::test]
    async fn test_reconnect_respects_sync_preferences() {
        let f = fixture();
        assert_eq!(f.coordinator.on_connectivity_changed("user123", false).await.unwrap(), None);

        f.coordinator
            .update_sync_preferences(
                "user123",
                SyncPreferences {
                    wifi_only_sync: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.connectivity.set_wifi(false);
        assert_eq!(f.coordinator.on_connectivity_changed("user123", true).await.unwrap(), None);

        f.connectivity.set_wifi(true);
        assert_eq!(
            f.coordinator.on_connectivity_changed("user123", true).await.unwrap(),
            Some(SyncOutcome::Pushed)
        );

        f.coordinator
            .update_sync_preferences(
                "user123",
                SyncPreferences {
                    auto_sync_enabled: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(f.coordinator.on_connectivity_changed("user123", true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remote_ahead_is_pulled() {
        let f = fixture();
        f.coordinator.sync("user123").await.unwrap();

        let mut remote = f.remote.get_settings("user123").await.unwrap().unwrap();
        remote.update_display(DisplayPreferences {
            high_contrast_mode: true,
            ..Default::default()
        });
        let expected = f.remote.get_settings("user123").await.unwrap().unwrap().last_modified;
        f.remote.conditional_update(&remote, Some(expected)).await.unwrap();

        assert_eq!(f.coordinator.sync("user123").await.unwrap(), SyncOutcome::Pulled);
        let local = f.local.get_user_settings("user123").await.unwrap().unwrap();
        assert!(local.display_preferences.high_contrast_mode);
        assert_eq!(local.version, 2);
        assert_eq!(local.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_matching_sections_keep_higher_local_version() {
        let f = fixture();
        f.coordinator.sync("user123").await.unwrap();

        let mut parked = f.local.get_user_settings("user123").await.unwrap().unwrap();
        parked.version = 5;
        parked.sync_status = SyncStatus::Conflict;
        f.local.save_user_settings(&parked).await.unwrap();

        assert_eq!(f.coordinator.sync("user123").await.unwrap(), SyncOutcome::InSync);
        let local = f.local.get_user_settings("user123").await.unwrap().unwrap();
        assert_eq!(local.version, 5);
        assert_eq!(local.sync_status, SyncStatus::Synced);
        assert!(local.same_sections(&parked));
    }
}
