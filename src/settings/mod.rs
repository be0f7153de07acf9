/// User settings document
///
/// One versioned document per user id, composed of six sections that are
/// compared, merged, and backed up independently.

pub mod sections;

use crate::{
    error::Result,
    util::{next_after, now_millis},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use sections::*;

/// Sync state of a settings document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Local changes not yet pushed
    #[default]
    Pending,
    /// Push in progress
    Syncing,
    /// Local and remote agree
    Synced,
    /// Last push was rejected or failed
    Failed,
    /// Waiting on an explicit user choice
    Conflict,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Syncing => "SYNCING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Failed => "FAILED",
            SyncStatus::Conflict => "CONFLICT",
        }
    }
}

/// Identity of one of the six document sections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingsSection {
    UnitPreferences,
    NotificationPreferences,
    CyclePreferences,
    PrivacyPreferences,
    DisplayPreferences,
    SyncPreferences,
}

impl SettingsSection {
    pub const ALL: [SettingsSection; 6] = [
        SettingsSection::UnitPreferences,
        SettingsSection::NotificationPreferences,
        SettingsSection::CyclePreferences,
        SettingsSection::PrivacyPreferences,
        SettingsSection::DisplayPreferences,
        SettingsSection::SyncPreferences,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsSection::UnitPreferences => "UNIT_PREFERENCES",
            SettingsSection::NotificationPreferences => "NOTIFICATION_PREFERENCES",
            SettingsSection::CyclePreferences => "CYCLE_PREFERENCES",
            SettingsSection::PrivacyPreferences => "PRIVACY_PREFERENCES",
            SettingsSection::DisplayPreferences => "DISPLAY_PREFERENCES",
            SettingsSection::SyncPreferences => "SYNC_PREFERENCES",
        }
    }

    /// Sections holding health or consent data, which never auto-merge
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            SettingsSection::PrivacyPreferences | SettingsSection::CyclePreferences
        )
    }
}

impl fmt::Display for SettingsSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single section's value, tagged by section kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "section", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionValue {
    UnitPreferences(UnitPreferences),
    NotificationPreferences(NotificationPreferences),
    CyclePreferences(CyclePreferences),
    PrivacyPreferences(PrivacyPreferences),
    DisplayPreferences(DisplayPreferences),
    SyncPreferences(SyncPreferences),
}

impl SectionValue {
    pub fn section(&self) -> SettingsSection {
        match self {
            SectionValue::UnitPreferences(_) => SettingsSection::UnitPreferences,
            SectionValue::NotificationPreferences(_) => SettingsSection::NotificationPreferences,
            SectionValue::CyclePreferences(_) => SettingsSection::CyclePreferences,
            SectionValue::PrivacyPreferences(_) => SettingsSection::PrivacyPreferences,
            SectionValue::DisplayPreferences(_) => SettingsSection::DisplayPreferences,
            SectionValue::SyncPreferences(_) => SettingsSection::SyncPreferences,
        }
    }

    /// Factory default for the given section
    pub fn default_for(section: SettingsSection) -> Self {
        match section {
            SettingsSection::UnitPreferences => SectionValue::UnitPreferences(Default::default()),
            SettingsSection::NotificationPreferences => {
                SectionValue::NotificationPreferences(Default::default())
            }
            SettingsSection::CyclePreferences => SectionValue::CyclePreferences(Default::default()),
            SettingsSection::PrivacyPreferences => SectionValue::PrivacyPreferences(Default::default()),
            SettingsSection::DisplayPreferences => SectionValue::DisplayPreferences(Default::default()),
            SettingsSection::SyncPreferences => SectionValue::SyncPreferences(Default::default()),
        }
    }

    /// Whether this value is exactly the factory default
    pub fn is_default(&self) -> bool {
        *self == Self::default_for(self.section())
    }

    /// Names of fields that differ; empty if the sections differ in kind
    pub fn changed_fields(&self, other: &SectionValue) -> Vec<&'static str> {
        match (self, other) {
            (SectionValue::UnitPreferences(a), SectionValue::UnitPreferences(b)) => a.changed_fields(b),
            (SectionValue::NotificationPreferences(a), SectionValue::NotificationPreferences(b)) => {
                a.changed_fields(b)
            }
            (SectionValue::CyclePreferences(a), SectionValue::CyclePreferences(b)) => a.changed_fields(b),
            (SectionValue::PrivacyPreferences(a), SectionValue::PrivacyPreferences(b)) => a.changed_fields(b),
            (SectionValue::DisplayPreferences(a), SectionValue::DisplayPreferences(b)) => a.changed_fields(b),
            (SectionValue::SyncPreferences(a), SectionValue::SyncPreferences(b)) => a.changed_fields(b),
            _ => Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SectionValue::UnitPreferences(v) => v.validate(),
            SectionValue::NotificationPreferences(v) => v.validate(),
            SectionValue::CyclePreferences(v) => v.validate(),
            SectionValue::PrivacyPreferences(v) => v.validate(),
            SectionValue::DisplayPreferences(v) => v.validate(),
            SectionValue::SyncPreferences(v) => v.validate(),
        }
    }
}

/// A user's settings document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// Owning user id
    pub user_id: String,
    pub unit_preferences: UnitPreferences,
    pub notification_preferences: NotificationPreferences,
    pub cycle_preferences: CyclePreferences,
    pub privacy_preferences: PrivacyPreferences,
    pub display_preferences: DisplayPreferences,
    pub sync_preferences: SyncPreferences,
    /// Last local or merged modification, serialized as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
    pub sync_status: SyncStatus,
    /// Monotonic write counter
    pub version: u64,
    /// Remote `last_modified` this copy was last reconciled with
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl UserSettings {
    /// Create a settings document with every section at its default
    pub fn default_settings(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            unit_preferences: UnitPreferences::default(),
            notification_preferences: NotificationPreferences::default(),
            cycle_preferences: CyclePreferences::default(),
            privacy_preferences: PrivacyPreferences::default(),
            display_preferences: DisplayPreferences::default(),
            sync_preferences: SyncPreferences::default(),
            last_modified: now_millis(),
            sync_status: SyncStatus::Pending,
            version: 1,
            last_synced_at: None,
        }
    }

    pub fn update_units(&mut self, units: UnitPreferences) {
        self.unit_preferences = units;
        self.mark_updated();
    }

    pub fn update_notifications(&mut self, notifications: NotificationPreferences) {
        self.notification_preferences = notifications;
        self.mark_updated();
    }

    pub fn update_cycle(&mut self, cycle: CyclePreferences) {
        self.cycle_preferences = cycle;
        self.mark_updated();
    }

    pub fn update_privacy(&mut self, privacy: PrivacyPreferences) {
        self.privacy_preferences = privacy;
        self.mark_updated();
    }

    pub fn update_display(&mut self, display: DisplayPreferences) {
        self.display_preferences = display;
        self.mark_updated();
    }

    pub fn update_sync(&mut self, sync: SyncPreferences) {
        self.sync_preferences = sync;
        self.mark_updated();
    }

    /// Replace one section by value
    pub fn set_section(&mut self, value: SectionValue) {
        match value {
            SectionValue::UnitPreferences(v) => self.unit_preferences = v,
            SectionValue::NotificationPreferences(v) => self.notification_preferences = v,
            SectionValue::CyclePreferences(v) => self.cycle_preferences = v,
            SectionValue::PrivacyPreferences(v) => self.privacy_preferences = v,
            SectionValue::DisplayPreferences(v) => self.display_preferences = v,
            SectionValue::SyncPreferences(v) => self.sync_preferences = v,
        }
    }

    /// Replace one section as a local edit, bumping the version
    pub fn apply_section_update(&mut self, value: SectionValue) {
        self.set_section(value);
        self.mark_updated();
    }

    pub fn section(&self, section: SettingsSection) -> SectionValue {
        match section {
            SettingsSection::UnitPreferences => SectionValue::UnitPreferences(self.unit_preferences.clone()),
            SettingsSection::NotificationPreferences => {
                SectionValue::NotificationPreferences(self.notification_preferences.clone())
            }
            SettingsSection::CyclePreferences => SectionValue::CyclePreferences(self.cycle_preferences.clone()),
            SettingsSection::PrivacyPreferences => {
                SectionValue::PrivacyPreferences(self.privacy_preferences.clone())
            }
            SettingsSection::DisplayPreferences => {
                SectionValue::DisplayPreferences(self.display_preferences.clone())
            }
            SettingsSection::SyncPreferences => SectionValue::SyncPreferences(self.sync_preferences.clone()),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(crate::error::Error::Validation("userId must not be empty".to_string()));
        }
        for section in SettingsSection::ALL {
            self.section(section).validate()?;
        }
        Ok(())
    }

    /// Section-wise equality, ignoring document metadata
    pub fn same_sections(&self, other: &UserSettings) -> bool {
        self.unit_preferences == other.unit_preferences
            && self.notification_preferences == other.notification_preferences
            && self.cycle_preferences == other.cycle_preferences
            && self.privacy_preferences == other.privacy_preferences
            && self.display_preferences == other.display_preferences
            && self.sync_preferences == other.sync_preferences
    }

    /// Record a local mutation
    fn mark_updated(&mut self) {
        self.last_modified = next_after(Some(self.last_modified));
        self.sync_status = SyncStatus::Pending;
        self.version += 1;
    }
}
