//! User settings of the interceptor.
//!
//! Settings are a small JSON document the host keeps next to its own configuration. Loading
//! never fails: a missing file means a first run and enables the interceptor, anything that
//! cannot be read or parsed falls back to [`Settings::default`] with a warning.

use std::{
    fs,
    io::ErrorKind,
    path::Path,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Settings shared between the session, the store and every record
pub type SettingsHandle = Arc<RwLock<Settings>>;

/// Persisted user choices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Instrument the host at startup
    pub enabled: bool,
    /// Ask the observer for a sound when an entry is dismissed
    pub sound_on_dismiss: bool,
    /// List and attribute cleanup (finalizer) hooks. Changes fingerprints when toggled.
    pub include_cleanup_hooks: bool,
}

impl Settings {
    /// Settings of a first run, when no file exists yet
    #[must_use]
    pub fn first_run() -> Self {
        Settings {
            enabled: true,
            ..Settings::default()
        }
    }

    /// Read settings from `path`, propagating I/O and JSON errors
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read and
    /// [`crate::Error::JsonError`] if it is not a valid settings document.
    pub fn read_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read settings from `path` with fallbacks; never fails.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match Self::read_from(path) {
            Ok(settings) => settings,
            Err(crate::Error::FileError(error)) if error.kind() == ErrorKind::NotFound => {
                log::debug!("no settings at {}, using first-run defaults", path.display());
                Self::first_run()
            }
            Err(error) => {
                log::warn!("ignoring settings at {}: {}", path.display(), error);
                Self::default()
            }
        }
    }

    /// Write settings to `path` as pretty-printed JSON
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Wrap into a shareable handle
    #[must_use]
    pub fn into_handle(self) -> SettingsHandle {
        Arc::new(RwLock::new(self))
    }
}
