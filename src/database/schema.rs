/// Database schema definitions for the local settings store

/// Database schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL statements for creating tables
pub const CREATE_TABLES: &[&str] = &[
    // One settings document per user
    r#"
    CREATE TABLE IF NOT EXISTS user_settings (
        user_id TEXT PRIMARY KEY,
        settings_json TEXT NOT NULL,
        version INTEGER NOT NULL,
        last_modified INTEGER NOT NULL,
        sync_status TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    // Backup catalog and gzip-compressed payloads
    r#"
    CREATE TABLE IF NOT EXISTS settings_backups (
        backup_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        backup_type TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        data_size_bytes INTEGER NOT NULL,
        settings_version INTEGER NOT NULL,
        checksum TEXT NOT NULL,
        payload BLOB NOT NULL
    )
    "#,
    // Schema version tracking
    r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
];

/// SQL statements for creating indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_settings_backups_user_created ON settings_backups(user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_settings_backups_type ON settings_backups(backup_type)",
];

/// SQL statements for creating triggers
pub const CREATE_TRIGGERS: &[&str] = &[r#"
    CREATE TRIGGER IF NOT EXISTS update_user_settings_timestamp
    AFTER UPDATE ON user_settings
    BEGIN
        UPDATE user_settings SET updated_at = CURRENT_TIMESTAMP WHERE user_id = NEW.user_id;
    END
    "#];
