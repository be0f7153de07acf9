use crate::{
    conflict::{
        detector::detect_conflicts, merge::merge_documents, ResolutionSide, ResolutionStrategy,
        SettingsConflict,
    },
    error::{Error, Result},
    settings::{SettingsSection, SyncStatus, UserSettings},
};
use std::collections::HashMap;
use tracing::debug;

/// Resolution strategy engine.
///
/// Stateless: every call produces a new document and never mutates its inputs.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn detect_conflicts(&self, local: &UserSettings, remote: &UserSettings) -> Vec<SettingsConflict> {
        detect_conflicts(local, remote)
    }

    pub fn has_conflicts(&self, local: &UserSettings, remote: &UserSettings) -> bool {
        !self.detect_conflicts(local, remote).is_empty()
    }

    /// Collapse two documents into one according to `strategy`.
    ///
    /// Only [`ResolutionStrategy::ManualResolution`] fails; every other
    /// strategy is total.
    pub fn resolve_conflict(
        &self,
        local: &UserSettings,
        remote: &UserSettings,
        strategy: ResolutionStrategy,
    ) -> Result<UserSettings> {
        debug!("Resolving settings for {} with {}", local.user_id, strategy);

        match strategy {
            ResolutionStrategy::LastWriteWins => {
                if remote.last_modified > local.last_modified {
                    Ok(remote.clone())
                } else {
                    Ok(local.clone())
                }
            }
            ResolutionStrategy::LocalWins => Ok(local.clone()),
            ResolutionStrategy::RemoteWins => Ok(remote.clone()),
            ResolutionStrategy::MergeFields => Ok(merge_documents(local, remote)),
            ResolutionStrategy::ManualResolution => {
                let sections: Vec<&str> = self
                    .detect_conflicts(local, remote)
                    .iter()
                    .map(|c| c.section.as_str())
                    .collect();
                Err(Error::conflict_resolution(
                    format!("manual resolution required for sections {:?}", sections),
                    None,
                ))
            }
        }
    }

    /// Suggest a strategy for a set of conflicts.
    ///
    /// Privacy and cycle data never auto-merge. Several non-sensitive
    /// conflicts are merged; a single one falls back to last-write-wins.
    pub fn recommended_strategy(&self, conflicts: &[SettingsConflict]) -> ResolutionStrategy {
        if conflicts.iter().any(|c| c.section.is_sensitive()) {
            ResolutionStrategy::ManualResolution
        } else if conflicts.len() > 1 {
            ResolutionStrategy::MergeFields
        } else {
            ResolutionStrategy::LastWriteWins
        }
    }

    /// Apply explicit per-section choices.
    ///
    /// Every conflicting section must have a choice. Sections that do not
    /// conflict are identical on both sides and are taken from local.
    pub fn resolve_with_choices(
        &self,
        local: &UserSettings,
        remote: &UserSettings,
        choices: &HashMap<SettingsSection, ResolutionSide>,
    ) -> Result<UserSettings> {
        let conflicts = self.detect_conflicts(local, remote);

        let missing: Vec<&str> = conflicts
            .iter()
            .filter(|c| !choices.contains_key(&c.section))
            .map(|c| c.section.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::conflict_resolution(
                format!("no choice supplied for conflicting sections {:?}", missing),
                None,
            ));
        }

        let mut resolved = local.clone();
        for conflict in conflicts {
            let value = match choices.get(&conflict.section) {
                Some(ResolutionSide::Remote) => conflict.remote_value,
                _ => conflict.local_value,
            };
            resolved.set_section(value);
        }
        resolved.version = local.version.max(remote.version);
        resolved.last_modified = local.last_modified.max(remote.last_modified);
        resolved.sync_status = SyncStatus::Pending;

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        settings::{CyclePreferences, TemperatureUnit, UnitPreferences},
    };
    use chrono::Duration;

    fn pair() -> (UserSettings, UserSettings) {
        let local = UserSettings::default_settings("user123");
        let mut remote = local.clone();
        remote.unit_preferences.temperature_unit = TemperatureUnit::Fahrenheit;
        (local, remote)
    }

    #[test]
    fn test_last_write_wins_picks_newer() {
        let resolver = ConflictResolver::new();
        let (local, mut remote) = pair();
        remote.last_modified = local.last_modified + Duration::seconds(1);

        let resolved = resolver
            .resolve_conflict(&local, &remote, ResolutionStrategy::LastWriteWins)
            .unwrap();
        assert_eq!(resolved, remote);

        let resolved = resolver
            .resolve_conflict(&remote, &local, ResolutionStrategy::LastWriteWins)
            .unwrap();
        assert_eq!(resolved, remote);
    }

    #[test]
    fn test_last_write_wins_tie_keeps_local() {
        let resolver = ConflictResolver::new();
        let (local, mut remote) = pair();
        remote.last_modified = local.last_modified;

        let resolved = resolver
            .resolve_conflict(&local, &remote, ResolutionStrategy::LastWriteWins)
            .unwrap();
        assert_eq!(resolved, local);
    }

    #[test]
    fn test_wholesale_strategies() {
        let resolver = ConflictResolver::new();
        let (local, remote) = pair();

        assert_eq!(resolver.resolve_conflict(&local, &remote, ResolutionStrategy::LocalWins).unwrap(), local);
        assert_eq!(resolver.resolve_conflict(&local, &remote, ResolutionStrategy::RemoteWins).unwrap(), remote);
    }

    #[test]
    fn test_manual_resolution_always_fails() {
        let resolver = ConflictResolver::new();
        let (local, remote) = pair();

        let err = resolver
            .resolve_conflict(&local, &remote, ResolutionStrategy::ManualResolution)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictResolution);

        // Even without conflicts
        assert!(resolver
            .resolve_conflict(&local, &local, ResolutionStrategy::ManualResolution)
            .is_err());
    }

    #[test]
    fn test_merge_fields_manual_units_scenario() {
        let resolver = ConflictResolver::new();
        let mut local = UserSettings::default_settings("user123");
        local.unit_preferences = UnitPreferences {
            temperature_unit: TemperatureUnit::Celsius,
            is_manually_set: true,
            ..UnitPreferences::default()
        };
        let mut remote = local.clone();
        remote.unit_preferences = UnitPreferences {
            temperature_unit: TemperatureUnit::Fahrenheit,
            is_manually_set: false,
            ..UnitPreferences::default()
        };

        let resolved = resolver
            .resolve_conflict(&local, &remote, ResolutionStrategy::MergeFields)
            .unwrap();
        assert_eq!(resolved.unit_preferences.temperature_unit, TemperatureUnit::Celsius);
    }

    #[test]
    fn test_recommended_strategy() {
        let resolver = ConflictResolver::new();
        let base = UserSettings::default_settings("user123");

        assert_eq!(resolver.recommended_strategy(&[]), ResolutionStrategy::LastWriteWins);

        let mut cycle = base.clone();
        cycle.cycle_preferences = CyclePreferences {
            average_cycle_length: 31,
            is_customized: true,
            ..CyclePreferences::default()
        };
        let conflicts = resolver.detect_conflicts(&base, &cycle);
        assert_eq!(resolver.recommended_strategy(&conflicts), ResolutionStrategy::ManualResolution);

        let mut two = base.clone();
        two.unit_preferences.temperature_unit = TemperatureUnit::Fahrenheit;
        two.display_preferences.high_contrast_mode = true;
        let conflicts = resolver.detect_conflicts(&base, &two);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(resolver.recommended_strategy(&conflicts), ResolutionStrategy::MergeFields);

        let mut one = base.clone();
        one.display_preferences.high_contrast_mode = true;
        let conflicts = resolver.detect_conflicts(&base, &one);
        assert_eq!(resolver.recommended_strategy(&conflicts), ResolutionStrategy::LastWriteWins);
    }

    #[test]
    fn test_resolve_with_choices() {
        let resolver = ConflictResolver::new();
        let local = UserSettings::default_settings("user123");
        let mut remote = local.clone();
        remote.unit_preferences.temperature_unit = TemperatureUnit::Fahrenheit;
        remote.privacy_preferences.analytics_enabled = true;
        remote.version = 9;

        let mut choices = HashMap::new();
        choices.insert(SettingsSection::UnitPreferences, ResolutionSide::Remote);
        assert!(resolver.resolve_with_choices(&local, &remote, &choices).is_err());

        choices.insert(SettingsSection::PrivacyPreferences, ResolutionSide::Local);
        let resolved = resolver.resolve_with_choices(&local, &remote, &choices).unwrap();
        assert_eq!(resolved.unit_preferences.temperature_unit, TemperatureUnit::Fahrenheit);
        assert!(!resolved.privacy_preferences.analytics_enabled);
        assert_eq!(resolved.version, 9);
        assert_eq!(resolved.sync_status, SyncStatus::Pending);
    }
}
