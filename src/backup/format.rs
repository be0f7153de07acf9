//! Portable text form of settings documents.
//!
//! A backup is either the bare document JSON, or the export envelope
//! `{exportVersion, exportedAt, settingsVersion, settings}`.

use crate::{
    error::{Error, Result},
    settings::UserSettings,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Newest export envelope version this crate reads and writes
pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub export_version: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub exported_at: DateTime<Utc>,
    pub settings_version: u64,
    pub settings: UserSettings,
}

/// Serialize a document as pretty-printed JSON
pub fn encode_settings(settings: &UserSettings) -> Result<String> {
    Ok(serde_json::to_string_pretty(settings)?)
}

/// Serialize a document wrapped in an export envelope
pub fn encode_export(settings: &UserSettings, exported_at: DateTime<Utc>) -> Result<String> {
    let envelope = ExportEnvelope {
        export_version: EXPORT_FORMAT_VERSION,
        exported_at,
        settings_version: settings.version,
        settings: settings.clone(),
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Parse either a bare document or an export envelope.
///
/// Does not validate section contents; see [`decode_and_validate`].
pub fn decode_backup(data: &str) -> Result<UserSettings> {
    if data.trim().is_empty() {
        return Err(Error::Validation("backup payload is empty".to_string()));
    }

    let value: serde_json::Value = serde_json::from_str(data)?;
    let is_envelope = value.get("exportVersion").is_some() && value.get("settings").is_some();

    if !is_envelope {
        return Ok(serde_json::from_value(value)?);
    }

    let envelope: ExportEnvelope = serde_json::from_value(value)?;
    if envelope.export_version > EXPORT_FORMAT_VERSION {
        return Err(Error::Validation(format!(
            "export version {} is newer than supported version {}",
            envelope.export_version, EXPORT_FORMAT_VERSION
        )));
    }
    if envelope.settings_version != envelope.settings.version {
        return Err(Error::Validation(format!(
            "envelope settingsVersion {} does not match document version {}",
            envelope.settings_version, envelope.settings.version
        )));
    }
    Ok(envelope.settings)
}

/// Parse a backup payload and validate every section
pub fn decode_and_validate(data: &str) -> Result<UserSettings> {
    let settings = decode_backup(data)?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{settings::SectionValue, util::now_millis};

    #[test]
    fn test_bare_document_decodes() {
        let mut settings = UserSettings::default_settings("user123");
        settings.cycle_preferences.average_cycle_length = 32;

        let decoded = decode_backup(&encode_settings(&settings).unwrap()).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn test_envelope_decodes() {
        let settings = UserSettings::default_settings("user123");
        let exported = encode_export(&settings, now_millis()).unwrap();

        let json: serde_json::Value = serde_json::from_str(&exported).unwrap();
        assert_eq!(json["exportVersion"], EXPORT_FORMAT_VERSION);
        assert_eq!(json["settingsVersion"], settings.version);
        assert!(json["exportedAt"].is_i64());

        assert_eq!(decode_backup(&exported).unwrap(), settings);
    }

    #[test]
    fn test_newer_envelope_is_rejected() {
        let settings = UserSettings::default_settings("user123");
        let mut json: serde_json::Value =
            serde_json::from_str(&encode_export(&settings, now_millis()).unwrap()).unwrap();
        json["exportVersion"] = serde_json::json!(EXPORT_FORMAT_VERSION + 1);

        assert!(matches!(decode_backup(&json.to_string()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(decode_backup(""), Err(Error::Validation(_))));
        assert!(matches!(decode_backup("not json"), Err(Error::Json(_))));
        assert!(matches!(decode_backup("{\"userId\":\"u\"}"), Err(Error::Json(_))));
    }

    #[test]
    fn test_invalid_sections_fail_validation() {
        let mut settings = UserSettings::default_settings("user123");
        settings.set_section(SectionValue::DisplayPreferences(crate::settings::DisplayPreferences {
            text_size_scale: 9.0,
            ..Default::default()
        }));
        let data = encode_settings(&settings).unwrap();

        assert!(decode_backup(&data).is_ok());
        assert!(matches!(decode_and_validate(&data), Err(Error::Validation(_))));
    }
}
