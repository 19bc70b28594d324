//! The authoritative registry state.
//!
//! An indexed, always-sorted table of archetype records plus a shared pool
//! of payload blobs. Every structural mutation re-derives the secondary
//! data (replication indices, lookup maps, archetype groups) from the
//! sorted sequence; checksums are invalidated eagerly and recomputed
//! lazily.
//!
//! Mutation is owned by a single data source via the service layer; this
//! type itself is single-threaded plain data.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::id::{ArchetypeName, ItemId};
use crate::payload::Payload;
use crate::record::{INVALID_REP_INDEX, RecordData, RegistryRecord};

/// A contiguous run of records sharing one archetype.
#[derive(Clone, Debug)]
pub struct ArchetypeGroup {
    pub archetype: ArchetypeName,
    pub begin: usize,
    pub len: usize,

    /// Cached CRC32 fold of the member record checksums; 0 = not computed.
    checksum: u32,
}

impl ArchetypeGroup {
    fn new(archetype: ArchetypeName, begin: usize) -> Self {
        Self {
            archetype,
            begin,
            len: 0,
            checksum: 0,
        }
    }

    pub fn cached_checksum(&self) -> Option<u32> {
        (self.checksum != 0).then_some(self.checksum)
    }
}

/// Which of a record's two blob slots an operation refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlobSlot {
    DefaultPayload,
    CustomData,
}

/// Sorted, indexed collection of archetype records.
#[derive(Clone, Debug, Default)]
pub struct RegistryState {
    /// Storage for registry records, sorted by `(archetype, name)`.
    records: Vec<RegistryRecord>,

    /// Shared storage for default payloads and custom data blobs.
    pool: Vec<Payload>,

    /// Contiguous archetype runs over `records`.
    groups: Vec<ArchetypeGroup>,

    /// Maps identifiers to `records` positions.
    id_map: HashMap<ItemId, usize>,

    /// Maps replication indices to `records` positions.
    rep_map: HashMap<u32, usize>,

    /// Number of bits needed to encode a replication index.
    rep_index_bits: u32,

    /// Cached CRC32 fold of the archetype group checksums; 0 = not computed.
    checksum: u32,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Management
    // ------------------------------------------------------------------

    /// Replaces the entire state with the given records.
    ///
    /// The pool is rebuilt in a fixed pass order: every default payload in
    /// sorted-record order first, then every custom data blob. Changing
    /// that order would silently change nothing observable today, but
    /// snapshot diffs rely on the layout being deterministic.
    pub fn reset(&mut self, data: Vec<RecordData>) {
        let mut data = data;
        data.sort_by(|a, b| a.id().cmp(b.id()));

        self.records.clear();
        self.pool.clear();

        let mut custom_blobs = Vec::with_capacity(data.len());

        for row in data {
            let mut record = RegistryRecord::new(row.shared, row.asset_path);

            if let Some(payload) = row.default_payload {
                record.default_payload = Some(self.pool.len());
                self.pool.push(payload);
            }

            custom_blobs.push(row.custom_data);
            self.records.push(record);
        }

        for (record, custom) in self.records.iter_mut().zip(custom_blobs) {
            if let Some(payload) = custom {
                record.custom_data = Some(self.pool.len());
                self.pool.push(payload);
            }
        }

        for record in &mut self.records {
            record.invalidate_checksum();
        }

        self.fixup(/* migrate_group_checksums */ false);
    }

    /// Updates existing data or inserts a new record.
    ///
    /// Returns `true` if a new record was created, `false` on update.
    pub fn append_data(&mut self, data: RecordData) -> bool {
        if let Some(&position) = self.id_map.get(data.id()) {
            let archetype = data.shared.id.archetype.clone();

            {
                let record = &mut self.records[position];
                record.shared = data.shared;
                record.asset_path = data.asset_path;
            }

            self.refresh_blob(position, BlobSlot::DefaultPayload, data.default_payload);
            self.refresh_blob(position, BlobSlot::CustomData, data.custom_data);

            // Invalidate the entire checksum chain.
            if let Some(group) = self.find_group_mut(&archetype) {
                group.checksum = 0;
            }
            self.records[position].invalidate_checksum();
            self.checksum = 0;

            return false;
        }

        let position = self
            .records
            .partition_point(|record| record.id() < data.id());

        let mut record = RegistryRecord::new(data.shared, data.asset_path);

        if let Some(group) = self.find_group_mut(&record.shared.id.archetype) {
            group.checksum = 0;
        }

        if let Some(payload) = data.default_payload {
            record.default_payload = Some(self.pool.len());
            self.pool.push(payload);
        }

        if let Some(payload) = data.custom_data {
            record.custom_data = Some(self.pool.len());
            self.pool.push(payload);
        }

        self.records.insert(position, record);
        self.fixup(/* migrate_group_checksums */ true);

        true
    }

    /// Removes a record. Returns whether one was found and removed.
    pub fn remove_data(&mut self, id: &ItemId) -> bool {
        let Some(&position) = self.id_map.get(id) else {
            return false;
        };

        // Each removal shifts the surviving indices down, so re-read the
        // record's slots between the two removals.
        if let Some(blob) = self.records[position].default_payload {
            self.remove_custom_data(blob);
        }

        if let Some(blob) = self.records[position].custom_data {
            self.remove_custom_data(blob);
        }

        let archetype = self.records[position].shared.id.archetype.clone();
        if let Some(group) = self.find_group_mut(&archetype) {
            group.checksum = 0;
        }

        self.records.remove(position);
        self.fixup(/* migrate_group_checksums */ true);

        true
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn contains_record(&self, id: &ItemId) -> bool {
        self.id_map.contains_key(id)
    }

    pub fn contains_archetype(&self, archetype: &ArchetypeName) -> bool {
        self.find_group(archetype).is_some()
    }

    pub fn record(&self, id: &ItemId) -> Option<&RegistryRecord> {
        self.id_map.get(id).map(|&position| &self.records[position])
    }

    pub fn record_from_replication(&self, rep_index: u32) -> Option<&RegistryRecord> {
        self.rep_map
            .get(&rep_index)
            .map(|&position| &self.records[position])
    }

    /// All records in sorted order.
    pub fn records(&self) -> &[RegistryRecord] {
        &self.records
    }

    /// Records of one archetype as a contiguous slice.
    pub fn records_of(&self, archetype: &ArchetypeName) -> &[RegistryRecord] {
        match self.find_group(archetype) {
            Some(group) => &self.records[group.begin..group.begin + group.len],
            None => &[],
        }
    }

    /// Total records, or the records of one archetype when provided.
    pub fn records_num(&self, archetype: Option<&ArchetypeName>) -> usize {
        match archetype {
            Some(archetype) => self.find_group(archetype).map_or(0, |group| group.len),
            None => self.records.len(),
        }
    }

    pub fn record_ids(&self, archetype: Option<&ArchetypeName>) -> Vec<ItemId> {
        let records = match archetype {
            Some(archetype) => self.records_of(archetype),
            None => self.records(),
        };

        records.iter().map(|record| record.id().clone()).collect()
    }

    pub fn archetypes(&self) -> impl Iterator<Item = &ArchetypeName> {
        self.groups.iter().map(|group| &group.archetype)
    }

    pub fn groups(&self) -> &[ArchetypeGroup] {
        &self.groups
    }

    /// Resolves a record's default payload against the pool.
    pub fn default_payload_of(&self, record: &RegistryRecord) -> Option<&Payload> {
        record.default_payload.map(|index| &self.pool[index])
    }

    /// Resolves a record's custom data blob against the pool.
    pub fn custom_data_of(&self, record: &RegistryRecord) -> Option<&Payload> {
        record.custom_data.map(|index| &self.pool[index])
    }

    /// Reconstructs the data-source shape of a record, payloads included.
    pub fn to_record_data(&self, record: &RegistryRecord) -> RecordData {
        RecordData {
            shared: record.shared.clone(),
            asset_path: record.asset_path.clone(),
            default_payload: self.default_payload_of(record).copied(),
            custom_data: self.custom_data_of(record).copied(),
        }
    }

    // ------------------------------------------------------------------
    // Utils
    // ------------------------------------------------------------------

    /// Number of bits needed to encode a replication index.
    pub fn rep_index_encoding_bits(&self) -> u32 {
        self.rep_index_bits
    }

    /// Cached top-level checksum, if valid.
    pub fn cached_checksum(&self) -> Option<u32> {
        (self.checksum != 0).then_some(self.checksum)
    }

    /// Lazily recomputed CRC32 over all record content, excluding metadata.
    ///
    /// The fold is hierarchical: per-record checksums fold into per-group
    /// checksums, which fold into the top-level value, in group iteration
    /// order. Can be used to validate network compatibility.
    pub fn checksum(&mut self) -> u32 {
        if self.checksum != 0 {
            return self.checksum;
        }

        let records = &mut self.records;
        let pool = &self.pool;
        let mut top = crc32fast::Hasher::new();

        for group in &mut self.groups {
            if group.checksum == 0 {
                let mut fold = crc32fast::Hasher::new();

                for record in &mut records[group.begin..group.begin + group.len] {
                    let default_payload = record.default_payload.map(|index| &pool[index]);
                    let custom_data = record.custom_data.map(|index| &pool[index]);
                    let checksum = record.checksum(default_payload, custom_data);
                    fold.update(&checksum.to_le_bytes());
                }

                group.checksum = fold.finalize().max(1);
            }

            top.update(&group.checksum.to_le_bytes());
        }

        self.checksum = top.finalize().max(1);
        self.checksum
    }

    /// Destructively removes every record content-identical to the
    /// corresponding record in `base`, shrinking this state down to the
    /// actual changes.
    pub fn diff_records(&mut self, base: &RegistryState) {
        if !self.has_records() || !base.has_records() {
            return;
        }

        // Enumerate the state with fewer records.
        let (probe, lookup): (&RegistryState, &RegistryState) =
            if self.records_num(None) > base.records_num(None) {
                (base, self)
            } else {
                (self, base)
            };

        // When both states carry a valid top-level checksum the per-record
        // caches are populated too, so checksum equality is enough.
        let fast = self.checksum != 0 && base.checksum != 0;

        let mut pending_remove = Vec::new();

        for record in probe.records() {
            let Some(other) = lookup.record(record.id()) else {
                continue;
            };

            let identical = if fast {
                record.cached_checksum() == other.cached_checksum()
            } else {
                probe.has_identical_data(record, lookup, other)
            };

            if identical {
                pending_remove.push(record.id().clone());
            }
        }

        // Per-element removal is O(N) each; a full wipe is cheaper.
        if pending_remove.len() == self.records_num(None) {
            self.reset(Vec::new());
        } else {
            for id in &pending_remove {
                let removed = self.remove_data(id);
                debug_assert!(removed);
            }
        }
    }

    /// Whether two records hold identical content, pools resolved on both
    /// sides. Metadata (rep index, cached checksums) is excluded.
    pub fn has_identical_data(
        &self,
        record: &RegistryRecord,
        other_state: &RegistryState,
        other: &RegistryRecord,
    ) -> bool {
        record.shared == other.shared
            && record.asset_path == other.asset_path
            && self.default_payload_of(record) == other_state.default_payload_of(other)
            && self.custom_data_of(record) == other_state.custom_data_of(other)
    }

    /// Deterministic human-readable listing of all records grouped by
    /// archetype. Side-effect free; cached checksums are shown as-is.
    pub fn dump(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "<=================== Item Registry Summary ===================>");
        let _ = writeln!(
            out,
            "Records: {}, Archetypes: {}, RepIndexEncodingBits: {}, Hash: {:#010x}",
            self.records.len(),
            self.groups.len(),
            self.rep_index_bits,
            self.checksum
        );

        for group in &self.groups {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "<===== Archetype: '{}' ({:#010x}) =====>",
                group.archetype, group.checksum
            );

            let records = &self.records[group.begin..group.begin + group.len];
            let width = records
                .iter()
                .map(|record| record.name().as_str().len())
                .max()
                .unwrap_or(0);

            for (index, record) in records.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "#{:02}: {:<width$}, RepIndex: {:02}, AssetPath: '{}'",
                    index,
                    record.name(),
                    record.rep_index,
                    record.asset_path,
                );
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "<================= Item Registry Summary End =================>");

        out
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    fn find_group(&self, archetype: &ArchetypeName) -> Option<&ArchetypeGroup> {
        self.groups.iter().find(|group| &group.archetype == archetype)
    }

    fn find_group_mut(&mut self, archetype: &ArchetypeName) -> Option<&mut ArchetypeGroup> {
        self.groups
            .iter_mut()
            .find(|group| &group.archetype == archetype)
    }

    /// Re-derives all secondary data after a structural mutation.
    ///
    /// Replication indices are reassigned from the sorted position,
    /// identifier and replication maps are rebuilt, pool indices are
    /// validated, and archetype groups are rescanned. Group checksums are
    /// not recomputed here, only migrated onto still-present archetypes
    /// when requested; recomputation stays lazy.
    ///
    /// Panics on a duplicate identifier: that is a contract violation by
    /// the caller, not a runtime condition.
    fn fixup(&mut self, migrate_group_checksums: bool) {
        debug_assert!(
            self.records.windows(2).all(|pair| pair[0].id() <= pair[1].id()),
            "registry records must stay sorted"
        );

        self.rep_index_bits = rep_index_bits_for(self.records.len());
        self.rep_map.clear();
        self.id_map.clear();

        // Keep the previous groups around to migrate their checksums.
        let previous_groups = std::mem::take(&mut self.groups);

        for (position, record) in self.records.iter_mut().enumerate() {
            assert!(
                !self.id_map.contains_key(record.id()),
                "duplicate identifier in registry state: {}",
                record.id()
            );

            record.rep_index = position as u32 + 1;
            self.rep_map.insert(record.rep_index, position);
            self.id_map.insert(record.id().clone(), position);

            debug_assert!(record.rep_index != INVALID_REP_INDEX);
            debug_assert!(
                record
                    .default_payload
                    .is_none_or(|index| index < self.pool.len()),
                "default payload index out of pool bounds"
            );
            debug_assert!(
                record
                    .custom_data
                    .is_none_or(|index| index < self.pool.len()),
                "custom data index out of pool bounds"
            );

            match self.groups.last_mut() {
                Some(group) if &group.archetype == record.archetype() => group.len += 1,
                _ => {
                    let mut group = ArchetypeGroup::new(record.archetype().clone(), position);
                    group.len = 1;
                    self.groups.push(group);
                }
            }
        }

        // Invalidate the top-level checksum.
        self.checksum = 0;

        if migrate_group_checksums {
            for group in &mut self.groups {
                if let Some(previous) = previous_groups
                    .iter()
                    .find(|candidate| candidate.archetype == group.archetype)
                {
                    group.checksum = previous.checksum;
                }
            }
        }
    }

    /// Removes one pool entry, shifting every higher index down by one.
    ///
    /// Shift-down (not swap-with-last) semantics are observable through
    /// pool layout after interleaved removals and must be preserved.
    fn remove_custom_data(&mut self, index: usize) {
        if index >= self.pool.len() {
            return;
        }

        self.pool.remove(index);

        for record in &mut self.records {
            if let Some(blob) = record.default_payload
                && blob > index
            {
                record.default_payload = Some(blob - 1);
            }

            if let Some(blob) = record.custom_data
                && blob > index
            {
                record.custom_data = Some(blob - 1);
            }
        }
    }

    /// Refreshes one blob slot of an existing record from new source data.
    fn refresh_blob(&mut self, position: usize, slot: BlobSlot, new_payload: Option<Payload>) {
        let current = match slot {
            BlobSlot::DefaultPayload => self.records[position].default_payload,
            BlobSlot::CustomData => self.records[position].custom_data,
        };

        let updated = match (current, new_payload) {
            // Same schema: copy bytes in place, the slot survives.
            (Some(blob), Some(payload)) if self.pool[blob].kind() == payload.kind() => {
                self.pool[blob] = payload;
                return;
            }
            // Schema changed: release the slot, append the new blob.
            (Some(blob), Some(payload)) => {
                self.remove_custom_data(blob);
                self.pool.push(payload);
                Some(self.pool.len() - 1)
            }
            // Blob removed entirely.
            (Some(blob), None) => {
                self.remove_custom_data(blob);
                None
            }
            // Blob added where none existed.
            (None, Some(payload)) => {
                self.pool.push(payload);
                Some(self.pool.len() - 1)
            }
            (None, None) => return,
        };

        // remove_custom_data above may have shifted this record's other
        // slot, so write through the record only now.
        match slot {
            BlobSlot::DefaultPayload => self.records[position].default_payload = updated,
            BlobSlot::CustomData => self.records[position].custom_data = updated,
        }
    }
}

/// Bits needed to encode a replication index for `records_num` records.
///
/// Index 0 is the reserved invalid encoding, so the domain is `[0, N]`.
pub(crate) fn rep_index_bits_for(records_num: usize) -> u32 {
    let domain = records_num as u64 + 1;
    domain.next_power_of_two().trailing_zeros()
}
