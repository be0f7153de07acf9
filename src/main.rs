use futures_util::StreamExt;
use prefsync::{
    database::{Database, DatabaseConfig},
    settings::{DisplayPreferences, HapticIntensity, PrivacyPreferences},
    store::{MemoryRemoteStore, StaticConnectivity},
    BackupManager, Error, ImportStrategy, RemoteStore, SyncCoordinator, SyncOutcome,
};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let user_id = "demo-user";

    let database = Database::new(DatabaseConfig::in_memory()).await?;
    let local = Arc::new(database.local_store());
    let remote = Arc::new(MemoryRemoteStore::new());
    let connectivity = Arc::new(StaticConnectivity::online());

    let backups = Arc::new(BackupManager::new(local.clone(), remote.clone(), connectivity.clone()));
    let coordinator = SyncCoordinator::new(local, remote.clone(), connectivity.clone(), backups.clone());

    let mut operations = Box::pin(backups.observe_backup_operations());
    tokio::spawn(async move {
        while let Some(operation) = operations.next().await {
            info!(
                "operation {:?} {:?} ({:.0}%)",
                operation.operation_type,
                operation.status,
                operation.progress * 100.0
            );
        }
    });

    info!("First sync: {:?}", coordinator.sync(user_id).await?);

    // Another device changes haptics while this one is offline
    let mut other_device = remote
        .get_settings(user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("remote settings for {}", user_id)))?;
    let expected = other_device.last_modified;
    other_device.update_display(DisplayPreferences {
        haptic_intensity: HapticIntensity::Strong,
        ..Default::default()
    });
    remote.conditional_update(&other_device, Some(expected)).await?;

    connectivity.set_connected(false);
    coordinator
        .update_display_preferences(
            user_id,
            DisplayPreferences {
                text_size_scale: 1.3,
                ..Default::default()
            },
        )
        .await?;
    info!("Offline sync: {:?}", coordinator.sync(user_id).await?);

    connectivity.set_connected(true);
    match coordinator.on_connectivity_changed(user_id, true).await? {
        Some(SyncOutcome::ManualResolutionRequired(conflicts)) => {
            warn!("{} conflicts need a decision", conflicts.len());
        }
        outcome => info!("Reconnect sync: {:?}", outcome),
    }

    coordinator
        .update_privacy_preferences(
            user_id,
            PrivacyPreferences {
                analytics_enabled: true,
                ..Default::default()
            },
        )
        .await?;

    let serialized = backups.create_manual_backup(user_id).await?;
    info!("Manual backup ({} bytes)", serialized.len());

    let exported = backups.export_settings(user_id, true).await?;
    let imported = backups
        .import_settings(user_id, &exported, ImportStrategy::ReplaceAll)
        .await?;
    info!("Re-imported settings at version {}", imported.version);

    for metadata in backups.get_backup_history(user_id).await? {
        info!(
            "backup {} {} v{} {} bytes",
            metadata.backup_id, metadata.backup_type, metadata.settings_version, metadata.data_size_bytes
        );
    }

    database.close().await;
    Ok(())
}
