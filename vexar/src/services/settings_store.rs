//! JSON file persistence for user settings

use std::path::{Path, PathBuf};

use shared::{Component, component_warn};

use crate::config::Settings;
use crate::error::{VexarError, VexarResult};
use crate::traits::SettingsStore;

pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> VexarResult<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            component_warn!(Component::App, "Reading {} failed: {}", self.path.display(), e);
            VexarError::settings("read", &self.path)
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, settings: &Settings) -> VexarResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;

        // Write then rename so a crash never leaves a truncated file
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, content).map_err(|e| {
            component_warn!(Component::App, "Writing {} failed: {}", staging.display(), e);
            VexarError::settings("write", &staging)
        })?;
        std::fs::rename(&staging, &self.path).map_err(|e| {
            component_warn!(Component::App, "Replacing {} failed: {}", self.path.display(), e);
            VexarError::settings("rename", &self.path)
        })
    }
}
