//! File-backed registry data source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use walkdir::WalkDir;

use registry_core::{ItemId, ItemTags, Payload, RecordData, SharedData};
use registry_service::{DataSourceTraits, RegistryBridge, RegistryDataSource};

use crate::settings::ContentSettings;
use crate::{LoadResult, read_file};

fn default_max_stack() -> u32 {
    1
}

/// One item definition as authored in a catalog file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub archetype: String,
    pub name: String,
    #[serde(default)]
    pub tags: ItemTags,
    #[serde(default = "default_max_stack")]
    pub max_stack_size: u32,
    #[serde(default)]
    pub default_payload: Option<Payload>,
    #[serde(default)]
    pub custom_data: Option<Payload>,
}

/// Catalog structure for RON files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemCatalog {
    pub items: Vec<ItemDefinition>,
}

impl ItemCatalog {
    /// Load an item catalog from a RON file.
    pub fn load(path: &Path) -> LoadResult<Self> {
        let content = read_file(path)?;
        ron::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse item catalog {}: {}", path.display(), e)
        })
    }
}

/// Data source scanning a directory of `*.ron` item catalogs.
///
/// Each definition becomes one registry record whose asset path is the
/// catalog file path relative to the item directory. Refreshes rescan
/// the directory and reconcile: new and changed definitions are
/// appended, definitions that disappeared are removed.
pub struct FileDataSource {
    name: String,
    item_directory: PathBuf,
    pending: Option<Vec<RecordData>>,
}

impl FileDataSource {
    pub fn new(settings: &ContentSettings) -> Self {
        Self {
            name: settings.data_source_name.clone(),
            item_directory: settings.item_directory.clone(),
            pending: None,
        }
    }

    /// Scans the item directory into registry records. Files are walked
    /// in sorted order so the result is deterministic. Two definitions
    /// claiming the same identifier fail the whole scan; the registry
    /// state treats a duplicate as a caller contract violation.
    pub fn scan(&self) -> LoadResult<Vec<RecordData>> {
        let mut records = Vec::new();
        let mut seen: HashMap<ItemId, String> = HashMap::new();

        for entry in WalkDir::new(&self.item_directory)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "ron"))
        {
            let path = entry.path();
            let catalog = ItemCatalog::load(path)?;

            let asset_path = path
                .strip_prefix(&self.item_directory)
                .unwrap_or(path)
                .display()
                .to_string();

            for definition in catalog.items {
                let id = ItemId::new(definition.archetype.as_str(), definition.name.as_str());

                if let Some(previous) = seen.insert(id.clone(), asset_path.clone()) {
                    anyhow::bail!(
                        "Duplicate item definition {} in {} (already defined in {})",
                        id,
                        asset_path,
                        previous
                    );
                }

                records.push(RecordData {
                    shared: SharedData::new(id, definition.tags, definition.max_stack_size),
                    asset_path: asset_path.clone(),
                    default_payload: definition.default_payload,
                    custom_data: definition.custom_data,
                });
            }
        }

        Ok(records)
    }

    /// Reconciles the registry with a scan result.
    fn apply(&self, bridge: &mut dyn RegistryBridge, records: Vec<RecordData>) {
        let mut removed = bridge.record_ids(None);
        removed.retain(|id| !records.iter().any(|record| record.id() == id));

        let appended = bridge.append_records(records);
        let removals = bridge.remove_records(&removed);
        debug!(appended, removals, "reconciled registry with content scan");
    }
}

impl RegistryDataSource for FileDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_traits(&self) -> DataSourceTraits {
        DataSourceTraits {
            // Content files can change between refreshes.
            is_persistent: false,
            supports_cooking: true,
            supports_development_cooking: true,
        }
    }

    fn initialize(&mut self, bridge: &mut dyn RegistryBridge) -> anyhow::Result<()> {
        if !bridge.was_loaded() {
            let records = self.scan()?;
            bridge.reset_records(records);
        }

        Ok(())
    }

    fn force_refresh(&mut self, bridge: &mut dyn RegistryBridge, synchronous: bool) {
        match self.scan() {
            Ok(records) if synchronous => self.apply(bridge, records),
            Ok(records) => self.pending = Some(records),
            Err(err) => error!(error = %err, "content scan failed; keeping the current registry"),
        }
    }

    fn flush_pending_refresh(&mut self, bridge: &mut dyn RegistryBridge) {
        if let Some(records) = self.pending.take() {
            self.apply(bridge, records);
        }
    }

    fn cancel_pending_refresh(&mut self) {
        self.pending = None;
    }

    fn is_pending_refresh(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_parses_payload_variants() {
        let catalog: ItemCatalog = ron::from_str(
            r#"
            ItemCatalog(
                items: [
                    ItemDefinition(
                        archetype: "Weapon",
                        name: "Sword",
                        tags: "EQUIPPABLE",
                        max_stack_size: 1,
                        default_payload: Some(Weapon((durability: 100, enchant_level: 0))),
                    ),
                    ItemDefinition(
                        archetype: "Consumable",
                        name: "Elixir",
                    ),
                ],
            )
            "#,
        )
        .unwrap();

        assert_eq!(catalog.items.len(), 2);
        assert_eq!(catalog.items[0].tags, ItemTags::EQUIPPABLE);
        assert!(matches!(
            catalog.items[0].default_payload,
            Some(Payload::Weapon(_))
        ));
        assert_eq!(catalog.items[1].max_stack_size, 1);
        assert!(catalog.items[1].default_payload.is_none());
    }
}
