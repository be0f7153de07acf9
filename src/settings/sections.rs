//! The six independently mergeable sections of a settings document.
//!
//! Each section is a plain value type with a deterministic `Default`, a
//! validity predicate, and a field-level diff used for conflict reporting.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest accepted text-size scale
pub const MIN_TEXT_SIZE_SCALE: f32 = 0.8;
/// Largest accepted text-size scale
pub const MAX_TEXT_SIZE_SCALE: f32 = 2.0;
/// Largest accepted reminder lead time in days
pub const MAX_DAYS_IN_ADVANCE: u8 = 7;

pub const CYCLE_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 21..=45;
pub const LUTEAL_PHASE_RANGE: std::ops::RangeInclusive<u32> = 10..=16;
pub const PERIOD_DURATION_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Push the name of every listed field whose value differs between two sections
macro_rules! changed_fields {
    ($left:expr, $right:expr, { $($field:ident => $name:literal),+ $(,)? }) => {{
        let mut fields: Vec<&'static str> = Vec::new();
        $(
            if $left.$field != $right.$field {
                fields.push($name);
            }
        )+
        fields
    }};
}

// Unit preferences

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightUnit {
    #[default]
    Kilograms,
    Pounds,
}

/// Measurement units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnitPreferences {
    pub temperature_unit: TemperatureUnit,
    pub weight_unit: WeightUnit,
    /// Set once the user picks units explicitly instead of inheriting locale defaults
    pub is_manually_set: bool,
}

impl UnitPreferences {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }

    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, {
            temperature_unit => "temperatureUnit",
            weight_unit => "weightUnit",
            is_manually_set => "isManuallySet",
        })
    }
}

// Notification preferences

/// One reminder slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSetting {
    pub enabled: bool,
    /// Local time of day the reminder fires
    pub time: Option<NaiveTime>,
    pub days_in_advance: u8,
}

impl NotificationSetting {
    pub fn enabled_at(time: NaiveTime, days_in_advance: u8) -> Self {
        Self {
            enabled: true,
            time: Some(time),
            days_in_advance,
        }
    }

    pub fn validate(&self, slot: &str) -> Result<()> {
        if self.enabled && self.time.is_none() {
            return Err(Error::Validation(format!(
                "notification '{}' is enabled but has no time set",
                slot
            )));
        }
        if self.days_in_advance > MAX_DAYS_IN_ADVANCE {
            return Err(Error::Validation(format!(
                "notification '{}' daysInAdvance {} is outside [0, {}]",
                slot, self.days_in_advance, MAX_DAYS_IN_ADVANCE
            )));
        }
        Ok(())
    }
}

/// Named reminder slots of [`NotificationPreferences`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationSlot {
    DailyLogReminder,
    PeriodPrediction,
    OvulationAlert,
    InsightsNotification,
}

impl NotificationSlot {
    pub const ALL: [NotificationSlot; 4] = [
        NotificationSlot::DailyLogReminder,
        NotificationSlot::PeriodPrediction,
        NotificationSlot::OvulationAlert,
        NotificationSlot::InsightsNotification,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            NotificationSlot::DailyLogReminder => "dailyLogReminder",
            NotificationSlot::PeriodPrediction => "periodPrediction",
            NotificationSlot::OvulationAlert => "ovulationAlert",
            NotificationSlot::InsightsNotification => "insightsNotification",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub daily_log_reminder: NotificationSetting,
    pub period_prediction: NotificationSetting,
    pub ovulation_alert: NotificationSetting,
    pub insights_notification: NotificationSetting,
    pub global_notifications_enabled: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            daily_log_reminder: NotificationSetting::default(),
            period_prediction: NotificationSetting::default(),
            ovulation_alert: NotificationSetting::default(),
            insights_notification: NotificationSetting::default(),
            global_notifications_enabled: true,
        }
    }
}

impl NotificationPreferences {
    pub fn slot(&self, slot: NotificationSlot) -> &NotificationSetting {
        match slot {
            NotificationSlot::DailyLogReminder => &self.daily_log_reminder,
            NotificationSlot::PeriodPrediction => &self.period_prediction,
            NotificationSlot::OvulationAlert => &self.ovulation_alert,
            NotificationSlot::InsightsNotification => &self.insights_notification,
        }
    }

    pub fn slot_mut(&mut self, slot: NotificationSlot) -> &mut NotificationSetting {
        match slot {
            NotificationSlot::DailyLogReminder => &mut self.daily_log_reminder,
            NotificationSlot::PeriodPrediction => &mut self.period_prediction,
            NotificationSlot::OvulationAlert => &mut self.ovulation_alert,
            NotificationSlot::InsightsNotification => &mut self.insights_notification,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for slot in NotificationSlot::ALL {
            self.slot(slot).validate(slot.field_name())?;
        }
        Ok(())
    }

    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, {
            daily_log_reminder => "dailyLogReminder",
            period_prediction => "periodPrediction",
            ovulation_alert => "ovulationAlert",
            insights_notification => "insightsNotification",
            global_notifications_enabled => "globalNotificationsEnabled",
        })
    }
}

// Cycle preferences

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CyclePreferences {
    pub average_cycle_length: u32,
    pub average_luteal_phase_length: u32,
    pub period_duration: u32,
    /// Set once the user overrides the population defaults
    pub is_customized: bool,
}

impl Default for CyclePreferences {
    fn default() -> Self {
        Self {
            average_cycle_length: 28,
            average_luteal_phase_length: 14,
            period_duration: 5,
            is_customized: false,
        }
    }
}

impl CyclePreferences {
    pub fn validate(&self) -> Result<()> {
        if !CYCLE_LENGTH_RANGE.contains(&self.average_cycle_length) {
            return Err(Error::Validation(format!(
                "averageCycleLength {} is outside {:?}",
                self.average_cycle_length, CYCLE_LENGTH_RANGE
            )));
        }
        if !LUTEAL_PHASE_RANGE.contains(&self.average_luteal_phase_length) {
            return Err(Error::Validation(format!(
                "averageLutealPhaseLength {} is outside {:?}",
                self.average_luteal_phase_length, LUTEAL_PHASE_RANGE
            )));
        }
        if !PERIOD_DURATION_RANGE.contains(&self.period_duration) {
            return Err(Error::Validation(format!(
                "periodDuration {} is outside {:?}",
                self.period_duration, PERIOD_DURATION_RANGE
            )));
        }
        if self.average_luteal_phase_length >= self.average_cycle_length {
            return Err(Error::Validation(
                "averageLutealPhaseLength must be shorter than averageCycleLength".to_string(),
            ));
        }
        Ok(())
    }

    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, {
            average_cycle_length => "averageCycleLength",
            average_luteal_phase_length => "averageLutealPhaseLength",
            period_duration => "periodDuration",
            is_customized => "isCustomized",
        })
    }
}

// Privacy preferences

/// Data-collection consent toggles. `true` means the user allows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyPreferences {
    pub data_sharing_enabled: bool,
    pub anonymous_insights_enabled: bool,
    pub crash_reporting_enabled: bool,
    pub analytics_enabled: bool,
}

impl Default for PrivacyPreferences {
    fn default() -> Self {
        Self {
            data_sharing_enabled: false,
            anonymous_insights_enabled: false,
            crash_reporting_enabled: true,
            analytics_enabled: false,
        }
    }
}

impl PrivacyPreferences {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }

    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, {
            data_sharing_enabled => "dataSharingEnabled",
            anonymous_insights_enabled => "anonymousInsightsEnabled",
            crash_reporting_enabled => "crashReportingEnabled",
            analytics_enabled => "analyticsEnabled",
        })
    }
}

// Display preferences

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HapticIntensity {
    Disabled,
    Light,
    #[default]
    Medium,
    Strong,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPreferences {
    pub text_size_scale: f32,
    pub high_contrast_mode: bool,
    pub haptic_feedback_enabled: bool,
    pub haptic_intensity: HapticIntensity,
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            text_size_scale: 1.0,
            high_contrast_mode: false,
            haptic_feedback_enabled: true,
            haptic_intensity: HapticIntensity::Medium,
        }
    }
}

impl DisplayPreferences {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TEXT_SIZE_SCALE..=MAX_TEXT_SIZE_SCALE).contains(&self.text_size_scale) {
            return Err(Error::Validation(format!(
                "textSizeScale {} is outside [{}, {}]",
                self.text_size_scale, MIN_TEXT_SIZE_SCALE, MAX_TEXT_SIZE_SCALE
            )));
        }
        if !self.haptic_feedback_enabled && self.haptic_intensity != HapticIntensity::Disabled {
            return Err(Error::Validation(
                "hapticIntensity must be DISABLED when haptic feedback is off".to_string(),
            ));
        }
        Ok(())
    }

    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, {
            text_size_scale => "textSizeScale",
            high_contrast_mode => "highContrastMode",
            haptic_feedback_enabled => "hapticFeedbackEnabled",
            haptic_intensity => "hapticIntensity",
        })
    }
}

// Sync preferences

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncPreferences {
    pub auto_sync_enabled: bool,
    pub wifi_only_sync: bool,
    pub cloud_backup_enabled: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self {
            auto_sync_enabled: true,
            wifi_only_sync: false,
            cloud_backup_enabled: true,
            last_sync_time: None,
        }
    }
}

impl SyncPreferences {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }

    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, {
            auto_sync_enabled => "autoSyncEnabled",
            wifi_only_sync => "wifiOnlySync",
            cloud_backup_enabled => "cloudBackupEnabled",
            last_sync_time => "lastSyncTime",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eight_pm() -> NaiveTime {
        NaiveTime::from_hms_opt(20, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(UnitPreferences::default().validate().is_ok());
        assert!(NotificationPreferences::default().validate().is_ok());
        assert!(CyclePreferences::default().validate().is_ok());
        assert!(PrivacyPreferences::default().validate().is_ok());
        assert!(DisplayPreferences::default().validate().is_ok());
        assert!(SyncPreferences::default().validate().is_ok());
    }

    #[test]
    fn test_enabled_notification_requires_time() {
        let setting = NotificationSetting {
            enabled: true,
            time: None,
            days_in_advance: 1,
        };
        assert!(matches!(setting.validate("dailyLogReminder"), Err(Error::Validation(_))));

        let setting = NotificationSetting::enabled_at(eight_pm(), 1);
        assert!(setting.validate("dailyLogReminder").is_ok());
    }

    #[test]
    fn test_days_in_advance_bounds() {
        let mut setting = NotificationSetting::enabled_at(eight_pm(), 7);
        assert!(setting.validate("periodPrediction").is_ok());

        setting.days_in_advance = 8;
        assert!(setting.validate("periodPrediction").is_err());

        // Disabled slots are still range-checked
        setting.enabled = false;
        assert!(setting.validate("periodPrediction").is_err());
    }

    #[test]
    fn test_display_haptic_consistency() {
        let mut display = DisplayPreferences::default();
        display.haptic_feedback_enabled = false;
        assert!(display.validate().is_err());

        display.haptic_intensity = HapticIntensity::Disabled;
        assert!(display.validate().is_ok());
    }

    #[test]
    fn test_display_text_scale_range() {
        let mut display = DisplayPreferences::default();
        display.text_size_scale = MAX_TEXT_SIZE_SCALE;
        assert!(display.validate().is_ok());

        display.text_size_scale = MAX_TEXT_SIZE_SCALE + 0.1;
        assert!(display.validate().is_err());

        display.text_size_scale = f32::NAN;
        assert!(display.validate().is_err());
    }

    #[test]
    fn test_cycle_ranges() {
        let mut cycle = CyclePreferences::default();
        cycle.average_cycle_length = 32;
        assert!(cycle.validate().is_ok());

        cycle.average_cycle_length = 60;
        assert!(cycle.validate().is_err());

        cycle.average_cycle_length = 28;
        cycle.period_duration = 0;
        assert!(cycle.validate().is_err());
    }

    #[test]
    fn test_changed_fields_names_only_differences() {
        let local = UnitPreferences::default();
        let remote = UnitPreferences {
            temperature_unit: TemperatureUnit::Fahrenheit,
            is_manually_set: true,
            ..UnitPreferences::default()
        };

        assert_eq!(local.changed_fields(&remote), vec!["temperatureUnit", "isManuallySet"]);
        assert!(local.changed_fields(&local).is_empty());
    }

    #[test]
    fn test_notification_slot_accessors() {
        let mut prefs = NotificationPreferences::default();
        *prefs.slot_mut(NotificationSlot::OvulationAlert) = NotificationSetting::enabled_at(eight_pm(), 2);

        assert!(prefs.ovulation_alert.enabled);
        assert_eq!(prefs.slot(NotificationSlot::OvulationAlert).days_in_advance, 2);
        assert_eq!(prefs.changed_fields(&NotificationPreferences::default()), vec!["ovulationAlert"]);
    }
}
