//! Mutation interface handed to data sources.

use registry_core::{ArchetypeName, ItemId, RecordData};

/// The only path through which a data source reads or mutates the
/// registry. Mutations run the full refresh pipeline: checksum refresh,
/// change diffing, defaults propagation and observer notification.
pub trait RegistryBridge {
    /// Resolved copy of a record, payloads included.
    fn record_data(&self, id: &ItemId) -> Option<RecordData>;

    /// All record ids, or the ids of one archetype.
    fn record_ids(&self, archetype: Option<&ArchetypeName>) -> Vec<ItemId>;

    /// Appends new records or updates existing ones. Returns how many
    /// records were actually added rather than updated.
    fn append_records(&mut self, records: Vec<RecordData>) -> usize;

    /// Removes records. Returns how many existed and were removed.
    fn remove_records(&mut self, ids: &[ItemId]) -> usize;

    /// Replaces the whole registry content.
    fn reset_records(&mut self, records: Vec<RecordData>);

    /// Whether the registry was hydrated from a snapshot before the
    /// data source initialized.
    fn was_loaded(&self) -> bool;

    /// Whether the registry is currently in the cooking mode.
    fn is_cooking(&self) -> bool;
}
