//! Content configuration loader.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use registry_core::Redirector;
use registry_service::ServiceSettings;

use crate::{LoadResult, read_file};

/// Content-side registry configuration, loaded from a TOML file.
///
/// Redirect tables live here so renames ship as content changes rather
/// than code changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentSettings {
    /// Snapshot tag of the data source.
    pub data_source_name: String,

    /// Directory scanned for item catalog files.
    pub item_directory: PathBuf,

    /// Directory holding the registry snapshots.
    pub snapshot_directory: PathBuf,

    /// Archetype rename history.
    #[serde(default)]
    pub archetype_redirects: Vec<Redirector>,

    /// Item name rename history.
    #[serde(default)]
    pub name_redirects: Vec<Redirector>,
}

impl ContentSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> LoadResult<Self> {
        let content = read_file(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> LoadResult<Self> {
        toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse registry settings TOML: {}", e))
    }

    /// The service-side slice of the settings.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            snapshot_directory: self.snapshot_directory.clone(),
            archetype_redirects: self.archetype_redirects.clone(),
            name_redirects: self.name_redirects.clone(),
        }
    }
}
