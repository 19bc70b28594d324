//! Per-archetype registry rows.

use serde::{Deserialize, Serialize};

use crate::id::{ArchetypeName, ItemId, ItemName};
use crate::payload::Payload;
use crate::tags::ItemTags;

/// Reserved replication index for "no item".
pub const INVALID_REP_INDEX: u32 = 0;

/// The hot data shared between all item instances of the same archetype.
///
/// Designed to stay small; anything cold belongs in the custom data blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedData {
    /// Identifier of the archetype this data was registered under.
    pub id: ItemId,

    /// Customizable gameplay tags.
    pub tags: ItemTags,

    /// The maximum amount of grouped items of the same archetype.
    pub max_stack_size: u32,
}

impl SharedData {
    pub fn new(id: ItemId, tags: ItemTags, max_stack_size: u32) -> Self {
        Self {
            id,
            tags,
            max_stack_size,
        }
    }

    /// Deterministic text form folded into record checksums.
    pub fn export_text(&self) -> String {
        format!(
            "SharedData(id={},tags={},max_stack_size={})",
            self.id,
            self.tags.export_text(),
            self.max_stack_size
        )
    }
}

/// A complete archetype row as produced by a data source.
///
/// This is the input shape for `append`/`reset`: payload blobs travel by
/// value here and are moved into the state's shared pool on insertion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordData {
    pub shared: SharedData,

    /// Origin reference of the definition the data was copied from.
    pub asset_path: String,

    /// Declared default payload for new item instances.
    pub default_payload: Option<Payload>,

    /// Registry-only metadata blob, never replicated to instances.
    pub custom_data: Option<Payload>,
}

impl RecordData {
    pub fn id(&self) -> &ItemId {
        &self.shared.id
    }
}

/// One archetype's row inside the registry state.
///
/// Payload blobs live in the state's shared pool; the row stores indices
/// into it. Replication index and checksum are derived bookkeeping: the
/// rep index is reassigned from the sorted position on every structural
/// change and must never be treated as a stable identity.
#[derive(Clone, Debug)]
pub struct RegistryRecord {
    /// The actual cached shared data.
    pub shared: SharedData,

    /// Original asset path the data was copied from.
    pub asset_path: String,

    /// Optional index of the default payload in the shared pool.
    pub default_payload: Option<usize>,

    /// Optional index of the custom data blob in the shared pool.
    pub custom_data: Option<usize>,

    /// Replication index, derived from the sorted position.
    pub rep_index: u32,

    /// Cached CRC32 over the exported record content; 0 = not computed.
    checksum: u32,
}

impl RegistryRecord {
    pub(crate) fn new(shared: SharedData, asset_path: String) -> Self {
        Self {
            shared,
            asset_path,
            default_payload: None,
            custom_data: None,
            rep_index: INVALID_REP_INDEX,
            checksum: 0,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.shared.id
    }

    pub fn archetype(&self) -> &ArchetypeName {
        &self.shared.id.archetype
    }

    pub fn name(&self) -> &ItemName {
        &self.shared.id.name
    }

    /// Cached checksum, if one has been computed since the last mutation.
    pub fn cached_checksum(&self) -> Option<u32> {
        (self.checksum != 0).then_some(self.checksum)
    }

    pub(crate) fn invalidate_checksum(&mut self) {
        self.checksum = 0;
    }

    /// Lazily computes and caches the record checksum.
    ///
    /// The fold order is part of the contract: shared data, default
    /// payload, custom data, asset path.
    pub(crate) fn checksum(
        &mut self,
        default_payload: Option<&Payload>,
        custom_data: Option<&Payload>,
    ) -> u32 {
        if self.checksum == 0 {
            self.checksum =
                compute_record_checksum(&self.shared, &self.asset_path, default_payload, custom_data);
        }

        self.checksum
    }
}

/// CRC32 fold over the exported text representations of the record.
pub(crate) fn compute_record_checksum(
    shared: &SharedData,
    asset_path: &str,
    default_payload: Option<&Payload>,
    custom_data: Option<&Payload>,
) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(shared.export_text().as_bytes());
    hasher.update(export_payload_text(default_payload).as_bytes());
    hasher.update(export_payload_text(custom_data).as_bytes());
    hasher.update(asset_path.as_bytes());

    // 0 is reserved as the "not computed" sentinel.
    hasher.finalize().max(1)
}

fn export_payload_text(payload: Option<&Payload>) -> String {
    match payload {
        Some(payload) => payload.export_text(),
        None => "()".to_owned(),
    }
}
