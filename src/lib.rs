// Copyright (c) 2025 Prefsync Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # prefsync
//!
//! Per-user settings documents that stay consistent across devices.
//!
//! The crate detects section-level conflicts between a local and a remote
//! copy, resolves them with a chosen or recommended strategy, and keeps
//! local backups that can be restored, imported, and exported.

pub mod backup;
pub mod conflict;
pub mod database;
pub mod error;
pub mod settings;
pub mod store;
pub mod sync;
pub mod util;

pub use backup::{BackupManager, BackupManagerConfig, BackupMetadata, BackupOperation, BackupType, ImportStrategy};
pub use conflict::{ConflictResolver, ResolutionSide, ResolutionStrategy, SettingsConflict};
pub use error::{Error, ErrorKind, Result};
pub use settings::{SettingsSection, SyncStatus, UserSettings};
pub use store::{LocalStore, NetworkConnectivity, RemoteStore};
pub use sync::{SyncConfig, SyncCoordinator, SyncOutcome};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
