use crate::{
    conflict::SettingsConflict,
    settings::{SettingsSection, UserSettings},
};
use tracing::debug;

/// Compare two documents section by section.
///
/// Metadata (`last_modified`, `version`, `sync_status`, `user_id`) is not
/// compared, so two documents that differ only in metadata have no conflicts.
pub fn detect_conflicts(local: &UserSettings, remote: &UserSettings) -> Vec<SettingsConflict> {
    let mut conflicts = Vec::new();

    for section in SettingsSection::ALL {
        let local_value = local.section(section);
        let remote_value = remote.section(section);

        if local_value != remote_value {
            let changed_fields = local_value.changed_fields(&remote_value);
            debug!("Conflict in {}: fields {:?}", section, changed_fields);

            conflicts.push(SettingsConflict {
                section,
                local_value,
                remote_value,
                changed_fields,
            });
        }
    }

    conflicts
}

pub fn has_conflicts(local: &UserSettings, remote: &UserSettings) -> bool {
    !detect_conflicts(local, remote).is_empty()
}
