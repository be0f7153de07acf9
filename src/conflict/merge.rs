//! Per-section merge rules.
//!
//! Each rule picks the "more specific" or "more protective" value of its
//! section. Rules are total: any two valid sections merge into a valid one.

use crate::settings::{
    CyclePreferences, DisplayPreferences, HapticIntensity, NotificationPreferences,
    NotificationSetting, NotificationSlot, PrivacyPreferences, SectionValue, SettingsSection,
    SyncPreferences, SyncStatus, UnitPreferences, UserSettings,
};

/// Explicitly chosen units win; if both or neither were chosen, remote wins
pub fn merge_units(local: &UnitPreferences, remote: &UnitPreferences) -> UnitPreferences {
    if local.is_manually_set && !remote.is_manually_set {
        local.clone()
    } else {
        remote.clone()
    }
}

/// Enabled reminder slots win; ties keep local. The global switch is OR'd.
pub fn merge_notifications(
    local: &NotificationPreferences,
    remote: &NotificationPreferences,
) -> NotificationPreferences {
    let mut merged = local.clone();
    for slot in NotificationSlot::ALL {
        *merged.slot_mut(slot) = merge_notification_slot(local.slot(slot), remote.slot(slot));
    }
    merged.global_notifications_enabled =
        local.global_notifications_enabled || remote.global_notifications_enabled;
    merged
}

fn merge_notification_slot(local: &NotificationSetting, remote: &NotificationSetting) -> NotificationSetting {
    if remote.enabled && !local.enabled {
        remote.clone()
    } else {
        local.clone()
    }
}

/// Customized cycle data wins; otherwise local
pub fn merge_cycle(local: &CyclePreferences, remote: &CyclePreferences) -> CyclePreferences {
    if remote.is_customized && !local.is_customized {
        remote.clone()
    } else {
        local.clone()
    }
}

/// Every consent toggle is AND'd so a merge never loosens privacy
pub fn merge_privacy(local: &PrivacyPreferences, remote: &PrivacyPreferences) -> PrivacyPreferences {
    PrivacyPreferences {
        data_sharing_enabled: local.data_sharing_enabled && remote.data_sharing_enabled,
        anonymous_insights_enabled: local.anonymous_insights_enabled && remote.anonymous_insights_enabled,
        crash_reporting_enabled: local.crash_reporting_enabled && remote.crash_reporting_enabled,
        analytics_enabled: local.analytics_enabled && remote.analytics_enabled,
    }
}

/// Non-default scale and intensity win; accessibility flags are OR'd
pub fn merge_display(local: &DisplayPreferences, remote: &DisplayPreferences) -> DisplayPreferences {
    let defaults = DisplayPreferences::default();

    let text_size_scale = if local.text_size_scale != defaults.text_size_scale {
        local.text_size_scale
    } else {
        remote.text_size_scale
    };

    let haptic_feedback_enabled = local.haptic_feedback_enabled || remote.haptic_feedback_enabled;

    let mut haptic_intensity = if local.haptic_intensity != defaults.haptic_intensity {
        local.haptic_intensity
    } else {
        remote.haptic_intensity
    };

    // DISABLED intensity is only valid with haptics off; use the enabled side's level.
    if haptic_feedback_enabled && haptic_intensity == HapticIntensity::Disabled {
        haptic_intensity = if local.haptic_feedback_enabled {
            local.haptic_intensity
        } else {
            remote.haptic_intensity
        };
        if haptic_intensity == HapticIntensity::Disabled {
            haptic_intensity = defaults.haptic_intensity;
        }
    }

    DisplayPreferences {
        text_size_scale,
        high_contrast_mode: local.high_contrast_mode || remote.high_contrast_mode,
        haptic_feedback_enabled,
        haptic_intensity,
    }
}

/// Flags are OR'd and the later sync time is kept
pub fn merge_sync(local: &SyncPreferences, remote: &SyncPreferences) -> SyncPreferences {
    SyncPreferences {
        auto_sync_enabled: local.auto_sync_enabled || remote.auto_sync_enabled,
        wifi_only_sync: local.wifi_only_sync || remote.wifi_only_sync,
        cloud_backup_enabled: local.cloud_backup_enabled || remote.cloud_backup_enabled,
        last_sync_time: local.last_sync_time.max(remote.last_sync_time),
    }
}

/// Merge one section, dispatching on section identity
pub fn merge_section(section: SettingsSection, local: &UserSettings, remote: &UserSettings) -> SectionValue {
    match section {
        SettingsSection::UnitPreferences => {
            SectionValue::UnitPreferences(merge_units(&local.unit_preferences, &remote.unit_preferences))
        }
        SettingsSection::NotificationPreferences => SectionValue::NotificationPreferences(
            merge_notifications(&local.notification_preferences, &remote.notification_preferences),
        ),
        SettingsSection::CyclePreferences => {
            SectionValue::CyclePreferences(merge_cycle(&local.cycle_preferences, &remote.cycle_preferences))
        }
        SettingsSection::PrivacyPreferences => SectionValue::PrivacyPreferences(merge_privacy(
            &local.privacy_preferences,
            &remote.privacy_preferences,
        )),
        SettingsSection::DisplayPreferences => SectionValue::DisplayPreferences(merge_display(
            &local.display_preferences,
            &remote.display_preferences,
        )),
        SettingsSection::SyncPreferences => {
            SectionValue::SyncPreferences(merge_sync(&local.sync_preferences, &remote.sync_preferences))
        }
    }
}

/// Build a new document by merging every section.
///
/// The result keeps the local user id, takes the larger version and the
/// later modification time, and is marked pending.
pub fn merge_documents(local: &UserSettings, remote: &UserSettings) -> UserSettings {
    let mut merged = local.clone();
    for section in SettingsSection::ALL {
        merged.set_section(merge_section(section, local, remote));
    }
    merged.version = local.version.max(remote.version);
    merged.last_modified = local.last_modified.max(remote.last_modified);
    merged.sync_status = SyncStatus::Pending;
    merged
}

/// Keep every `existing` section unless it is still exactly at its factory
/// default, in which case take the `imported` section.
pub fn fill_default_sections(existing: &UserSettings, imported: &UserSettings) -> UserSettings {
    let mut result = existing.clone();
    for section in SettingsSection::ALL {
        if existing.section(section).is_default() {
            result.set_section(imported.section(section));
        }
    }
    result.version = existing.version.max(imported.version);
    result.sync_status = SyncStatus::Pending;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{TemperatureUnit, WeightUnit};
    use chrono::{NaiveTime, Utc};

    fn nine_am() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn test_manually_set_units_win() {
        let local = UnitPreferences {
            temperature_unit: TemperatureUnit::Celsius,
            weight_unit: WeightUnit::Kilograms,
            is_manually_set: true,
        };
        let remote = UnitPreferences {
            temperature_unit: TemperatureUnit::Fahrenheit,
            weight_unit: WeightUnit::Pounds,
            is_manually_set: false,
        };

        assert_eq!(merge_units(&local, &remote), local);
        assert_eq!(merge_units(&remote, &local), local);
    }

    #[test]
    fn test_units_tie_prefers_remote() {
        let local = UnitPreferences::default();
        let remote = UnitPreferences {
            temperature_unit: TemperatureUnit::Fahrenheit,
            ..UnitPreferences::default()
        };
        assert_eq!(merge_units(&local, &remote), remote);
    }

    #[test]
    fn test_notification_slots_prefer_enabled() {
        let mut local = NotificationPreferences::default();
        local.global_notifications_enabled = false;
        local.daily_log_reminder = NotificationSetting::enabled_at(nine_am(), 0);

        let mut remote = NotificationPreferences::default();
        remote.global_notifications_enabled = false;
        remote.period_prediction = NotificationSetting::enabled_at(nine_am(), 3);

        let merged = merge_notifications(&local, &remote);
        assert!(merged.daily_log_reminder.enabled);
        assert!(merged.period_prediction.enabled);
        assert_eq!(merged.period_prediction.days_in_advance, 3);
        assert!(!merged.ovulation_alert.enabled);
        assert!(!merged.global_notifications_enabled);

        remote.global_notifications_enabled = true;
        assert!(merge_notifications(&local, &remote).global_notifications_enabled);
    }

    #[test]
    fn test_customized_cycle_wins() {
        let local = CyclePreferences::default();
        let remote = CyclePreferences {
            average_cycle_length: 32,
            is_customized: true,
            ..CyclePreferences::default()
        };
        assert_eq!(merge_cycle(&local, &remote), remote);
        assert_eq!(merge_cycle(&remote, &local), remote);

        let other = CyclePreferences {
            average_cycle_length: 30,
            is_customized: true,
            ..CyclePreferences::default()
        };
        assert_eq!(merge_cycle(&other, &remote), other);
    }

    #[test]
    fn test_privacy_is_anded() {
        let local = PrivacyPreferences {
            data_sharing_enabled: true,
            anonymous_insights_enabled: true,
            crash_reporting_enabled: false,
            analytics_enabled: true,
        };
        let remote = PrivacyPreferences {
            data_sharing_enabled: true,
            anonymous_insights_enabled: false,
            crash_reporting_enabled: true,
            analytics_enabled: false,
        };

        let merged = merge_privacy(&local, &remote);
        assert!(merged.data_sharing_enabled);
        assert!(!merged.anonymous_insights_enabled);
        assert!(!merged.crash_reporting_enabled);
        assert!(!merged.analytics_enabled);
    }

    #[test]
    fn test_display_prefers_non_default_and_stays_valid() {
        let local = DisplayPreferences {
            haptic_feedback_enabled: false,
            haptic_intensity: HapticIntensity::Disabled,
            ..DisplayPreferences::default()
        };
        let remote = DisplayPreferences {
            text_size_scale: 1.4,
            high_contrast_mode: true,
            ..DisplayPreferences::default()
        };

        let merged = merge_display(&local, &remote);
        assert_eq!(merged.text_size_scale, 1.4);
        assert!(merged.high_contrast_mode);
        assert!(merged.haptic_feedback_enabled);
        assert_eq!(merged.haptic_intensity, HapticIntensity::Medium);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_display_both_disabled() {
        let off = DisplayPreferences {
            haptic_feedback_enabled: false,
            haptic_intensity: HapticIntensity::Disabled,
            ..DisplayPreferences::default()
        };
        let merged = merge_display(&off, &off);
        assert!(!merged.haptic_feedback_enabled);
        assert_eq!(merged.haptic_intensity, HapticIntensity::Disabled);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_sync_flags_ored_and_latest_time_kept() {
        let earlier = Utc::now() - chrono::Duration::days(1);
        let later = Utc::now();
        let local = SyncPreferences {
            auto_sync_enabled: false,
            wifi_only_sync: true,
            cloud_backup_enabled: false,
            last_sync_time: Some(later),
        };
        let remote = SyncPreferences {
            auto_sync_enabled: false,
            wifi_only_sync: false,
            cloud_backup_enabled: true,
            last_sync_time: Some(earlier),
        };

        let merged = merge_sync(&local, &remote);
        assert!(!merged.auto_sync_enabled);
        assert!(merged.wifi_only_sync);
        assert!(merged.cloud_backup_enabled);
        assert_eq!(merged.last_sync_time, Some(later));

        let none = SyncPreferences { last_sync_time: None, ..remote };
        assert_eq!(merge_sync(&none, &local).last_sync_time, Some(later));
    }

    #[test]
    fn test_merge_documents_metadata() {
        let mut local = UserSettings::default_settings("user123");
        local.version = 4;
        let mut remote = UserSettings::default_settings("user123");
        remote.version = 7;
        remote.last_modified = local.last_modified - chrono::Duration::minutes(5);
        remote.sync_status = SyncStatus::Synced;

        let merged = merge_documents(&local, &remote);
        assert_eq!(merged.version, 7);
        assert_eq!(merged.last_modified, local.last_modified);
        assert_eq!(merged.sync_status, SyncStatus::Pending);
        assert_eq!(merged.user_id, "user123");
    }

    #[test]
    fn test_fill_default_sections() {
        let mut existing = UserSettings::default_settings("user123");
        existing.unit_preferences.is_manually_set = true;

        let mut imported = UserSettings::default_settings("user123");
        imported.unit_preferences.temperature_unit = TemperatureUnit::Fahrenheit;
        imported.cycle_preferences.average_cycle_length = 32;

        let result = fill_default_sections(&existing, &imported);
        assert_eq!(result.unit_preferences, existing.unit_preferences);
        assert_eq!(result.cycle_preferences.average_cycle_length, 32);
    }
}
