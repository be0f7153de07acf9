//! SQLite implementation of [`LocalStore`].
//!
//! Documents are stored as JSON text with their version and stamp copied
//! into columns. Backup payloads are gzip-compressed; the checksum and
//! size in the catalog describe the uncompressed JSON.

use super::DatabasePool;
use crate::{
    backup::{format, BackupMetadata, BackupType},
    error::{Error, Result},
    settings::UserSettings,
    store::LocalStore,
    util::{checksum_hex, from_epoch_millis, next_after},
};
use async_trait::async_trait;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use sqlx::{sqlite::SqliteRow, Row};
use std::io::{Read, Write};
use tracing::debug;

/// Settings and backup storage in a SQLite database
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: DatabasePool,
}

impl SqliteLocalStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn metadata_from_row(row: &SqliteRow) -> Result<BackupMetadata> {
        let backup_type: String = row.get("backup_type");
        let backup_type = BackupType::parse(&backup_type)
            .ok_or_else(|| Error::Database(format!("Unknown backup type: {}", backup_type)))?;

        Ok(BackupMetadata {
            backup_id: row.get("backup_id"),
            user_id: row.get("user_id"),
            backup_type,
            created_at: from_epoch_millis(row.get("created_at")),
            data_size_bytes: row.get::<i64, _>("data_size_bytes") as u64,
            settings_version: row.get::<i64, _>("settings_version") as u64,
            checksum: row.get("checksum"),
        })
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decompress(data: &[u8]) -> Result<String> {
    let mut decoder = GzDecoder::new(data);
    let mut output = String::new();
    decoder.read_to_string(&mut output)?;
    Ok(output)
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get_user_settings(&self, user_id: &str) -> Result<Option<UserSettings>> {
        let row = sqlx::query("SELECT settings_json FROM user_settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to load settings: {}", e)))?;

        match row {
            Some(row) => {
                let json: String = row.get("settings_json");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn save_user_settings(&self, settings: &UserSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;

        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, settings_json, version, last_modified, sync_status)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                settings_json = excluded.settings_json,
                version = excluded.version,
                last_modified = excluded.last_modified,
                sync_status = excluded.sync_status
            "#,
        )
        .bind(&settings.user_id)
        .bind(json)
        .bind(settings.version as i64)
        .bind(settings.last_modified.timestamp_millis())
        .bind(settings.sync_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to save settings: {}", e)))?;

        Ok(())
    }

    async fn delete_user_settings(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_settings WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete settings: {}", e)))?;
        Ok(())
    }

    async fn create_backup(&self, settings: &UserSettings, backup_type: BackupType) -> Result<BackupMetadata> {
        let payload = format::encode_settings(settings)?;
        let compressed = compress(payload.as_bytes())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin backup transaction: {}", e)))?;

        // Stamps are strictly increasing so retention ordering is total
        let last: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM settings_backups")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to read backup stamps: {}", e)))?;
        let created_at = next_after(last.map(from_epoch_millis));

        let metadata = BackupMetadata {
            backup_id: uuid::Uuid::new_v4().to_string(),
            user_id: settings.user_id.clone(),
            backup_type,
            created_at,
            data_size_bytes: payload.len() as u64,
            settings_version: settings.version,
            checksum: checksum_hex(payload.as_bytes()),
        };

        sqlx::query(
            r#"
            INSERT INTO settings_backups
                (backup_id, user_id, backup_type, created_at, data_size_bytes, settings_version, checksum, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metadata.backup_id)
        .bind(&metadata.user_id)
        .bind(metadata.backup_type.as_str())
        .bind(metadata.created_at.timestamp_millis())
        .bind(metadata.data_size_bytes as i64)
        .bind(metadata.settings_version as i64)
        .bind(&metadata.checksum)
        .bind(compressed)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to create backup: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit backup: {}", e)))?;

        debug!(
            "Stored {} backup {} ({} bytes)",
            metadata.backup_type, metadata.backup_id, metadata.data_size_bytes
        );
        Ok(metadata)
    }

    async fn load_backup(&self, backup_id: &str) -> Result<Option<UserSettings>> {
        let row = sqlx::query("SELECT checksum, payload FROM settings_backups WHERE backup_id = ?")
            .bind(backup_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to load backup: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let checksum: String = row.get("checksum");
        let compressed: Vec<u8> = row.get("payload");
        let payload = decompress(&compressed)
            .map_err(|e| Error::backup(format!("backup {} payload is unreadable", backup_id), e))?;

        if checksum_hex(payload.as_bytes()) != checksum {
            return Err(Error::backup(format!("backup {} failed checksum verification", backup_id), None));
        }

        Ok(Some(format::decode_backup(&payload)?))
    }

    async fn list_backups(&self, user_id: &str) -> Result<Vec<BackupMetadata>> {
        let rows = sqlx::query(
            r#"
            SELECT backup_id, user_id, backup_type, created_at, data_size_bytes, settings_version, checksum
            FROM settings_backups WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list backups: {}", e)))?;

        rows.iter().map(Self::metadata_from_row).collect()
    }

    async fn delete_backup(&self, backup_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM settings_backups WHERE backup_id = ?")
            .bind(backup_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete backup: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("backup {}", backup_id)));
        }
        Ok(())
    }
}
