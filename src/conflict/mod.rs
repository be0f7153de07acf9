/// Conflict detection and resolution for settings documents
///
/// Detection works at section granularity; resolution collapses two
/// conflicting documents into a new one according to a [`ResolutionStrategy`].

pub mod detector;
pub mod merge;
pub mod resolver;

use crate::settings::{SectionValue, SettingsSection};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use detector::*;
pub use resolver::*;

/// One section-level disagreement between a local and a remote document
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsConflict {
    pub section: SettingsSection,
    pub local_value: SectionValue,
    pub remote_value: SectionValue,
    /// Names of the fields that differ, for logging and display
    pub changed_fields: Vec<&'static str>,
}

/// Algorithm used to collapse two conflicting documents into one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    /// Newer `last_modified` wins; ties keep local
    LastWriteWins,
    LocalWins,
    RemoteWins,
    /// Per-section merge favoring the more specific or more protective value
    MergeFields,
    /// Requires an explicit per-section choice from the user
    ManualResolution,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::LastWriteWins => "LAST_WRITE_WINS",
            ResolutionStrategy::LocalWins => "LOCAL_WINS",
            ResolutionStrategy::RemoteWins => "REMOTE_WINS",
            ResolutionStrategy::MergeFields => "MERGE_FIELDS",
            ResolutionStrategy::ManualResolution => "MANUAL_RESOLUTION",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side picked for a section during manual resolution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionSide {
    Local,
    Remote,
}
