//! Network serialization of item handles.
//!
//! Items never replicate their identifier strings. The writer encodes
//! the record's replication index using exactly as many bits as the
//! registry needs for its current record count; the reader maps the
//! index back to the identifier through its own state. Both sides must
//! therefore hold content-identical registry states, which the optional
//! checksum exchange (`net-checksum` feature, on by default) verifies
//! per item at the cost of 32 extra bits.
//!
//! Mismatches are soft failures reported through the context success
//! flag until a payload arrives without a matching record, which is a
//! hard desync and poisons the stream.

use tracing::{error, warn};

use crate::id::ItemId;
use crate::item::{Item, ItemStack};
use crate::payload::Payload;
use crate::record::{INVALID_REP_INDEX, RegistryRecord};
use crate::state::RegistryState;

/// Upper bound on a single payload value on the wire.
const MAX_PAYLOAD_WIRE_BYTES: u32 = 1024;

/// Bit-level stream writer. Bits are packed LSB first.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `num_bits` bits of `value`.
    pub fn write_bits(&mut self, value: u32, num_bits: u32) {
        debug_assert!(num_bits <= 32);

        for bit in 0..num_bits {
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }

            if value >> bit & 1 != 0 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 1 << (self.bit_len % 8);
            }

            self.bit_len += 1;
        }
    }

    pub fn write_bit(&mut self, value: bool) {
        self.write_bits(value as u32, 1);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(value, 32);
    }

    /// Variable-length encoding: 7 value bits per byte, high bit set
    /// while more bytes follow.
    pub fn write_packed(&mut self, mut value: u32) {
        loop {
            let more = value >> 7 != 0;
            self.write_bits(value & 0x7f | (more as u32) << 7, 8);
            value >>= 7;

            if !more {
                break;
            }
        }
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Bit-level stream reader over bytes produced by [`BitWriter`].
///
/// Reading past the end yields zeros and latches the error flag, the
/// same way a poisoned network archive keeps returning empty data.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
    error: bool,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            bit_pos: 0,
            error: false,
        }
    }

    pub fn read_bits(&mut self, num_bits: u32) -> u32 {
        debug_assert!(num_bits <= 32);

        if self.bit_pos + num_bits as usize > self.bytes.len() * 8 {
            self.error = true;
            return 0;
        }

        let mut value = 0;
        for bit in 0..num_bits {
            if self.bytes[self.bit_pos / 8] >> (self.bit_pos % 8) & 1 != 0 {
                value |= 1 << bit;
            }

            self.bit_pos += 1;
        }

        value
    }

    pub fn read_bit(&mut self) -> bool {
        self.read_bits(1) != 0
    }

    pub fn read_u32(&mut self) -> u32 {
        self.read_bits(32)
    }

    pub fn read_packed(&mut self) -> u32 {
        let mut value = 0u32;
        let mut shift = 0;

        loop {
            let byte = self.read_bits(8);
            value |= (byte & 0x7f) << shift;
            shift += 7;

            if byte >> 7 == 0 || shift >= 32 || self.error {
                break;
            }
        }

        value
    }

    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn remaining_bits(&self) -> usize {
        self.bytes.len() * 8 - self.bit_pos
    }
}

/// Carries the record resolved during the identifier pass into the
/// payload pass, together with the accumulated success flag.
#[derive(Debug)]
pub struct NetSerializeContext<'a> {
    record: Option<&'a RegistryRecord>,
    pub success: bool,
}

impl RegistryState {
    /// Writer half of the identifier exchange.
    pub fn net_serialize_item<'a>(
        &'a self,
        writer: &mut BitWriter,
        id: &ItemId,
    ) -> NetSerializeContext<'a> {
        let record = self.record(id);
        let rep_index = record.map_or(INVALID_REP_INDEX, |record| record.rep_index);

        writer.write_bits(rep_index, self.rep_index_encoding_bits());

        #[cfg(feature = "net-checksum")]
        writer.write_u32(record.and_then(RegistryRecord::cached_checksum).unwrap_or(0));

        NetSerializeContext {
            record,
            success: true,
        }
    }

    /// Reader half of the identifier exchange. Unresolvable indices and
    /// checksum mismatches clear the success flag but keep the stream
    /// readable.
    pub fn net_deserialize_item<'a>(
        &'a self,
        reader: &mut BitReader<'_>,
        id: &mut ItemId,
    ) -> NetSerializeContext<'a> {
        let rep_index = reader.read_bits(self.rep_index_encoding_bits());

        #[cfg(feature = "net-checksum")]
        let remote_checksum = reader.read_u32();

        let mut context = NetSerializeContext {
            record: None,
            success: true,
        };

        let mut local_checksum = 0u32;

        if let Some(record) = self.record_from_replication(rep_index) {
            *id = record.id().clone();
            local_checksum = record.cached_checksum().unwrap_or(0);
            context.record = Some(record);
        } else {
            *id = ItemId::default();

            if rep_index != INVALID_REP_INDEX {
                warn!(rep_index, "failed to match replication index with any item id");
                context.success = false;
            }
        }

        #[cfg(feature = "net-checksum")]
        if remote_checksum != local_checksum {
            warn!(
                %id,
                local = format_args!("{local_checksum:#x}"),
                remote = format_args!("{remote_checksum:#x}"),
                "network checksum mismatch"
            );
            context.success = false;
        }

        #[cfg(not(feature = "net-checksum"))]
        let _ = local_checksum;

        context
    }

    /// Writer half of the payload exchange. The payload schema is
    /// synchronized to the record default before the value is written,
    /// without copying the default field values.
    pub fn net_serialize_item_payload(
        &self,
        writer: &mut BitWriter,
        payload: &mut Option<Payload>,
        context: &mut NetSerializeContext<'_>,
    ) {
        let default_kind = context
            .record
            .and_then(|record| self.default_payload_of(record))
            .map(Payload::kind);

        writer.write_bit(default_kind.is_some());

        let Some(kind) = default_kind else {
            *payload = None;
            return;
        };

        if payload.as_ref().map(Payload::kind) != Some(kind) {
            *payload = Some(Payload::new_default(kind));
        }

        let bytes = match payload {
            Some(payload) => payload.to_field_bytes(),
            None => Vec::new(),
        };

        writer.write_packed(bytes.len() as u32);
        for byte in bytes {
            writer.write_bits(byte as u32, 8);
        }
    }

    /// Reader half of the payload exchange. A payload bit with no record
    /// context means the writer serialized against a record this side
    /// does not have, which is a hard desync.
    pub fn net_deserialize_item_payload(
        &self,
        reader: &mut BitReader<'_>,
        payload: &mut Option<Payload>,
        context: &mut NetSerializeContext<'_>,
    ) {
        if !reader.read_bit() {
            *payload = None;
            return;
        }

        let default_kind = context
            .record
            .and_then(|record| self.default_payload_of(record))
            .map(Payload::kind);

        let Some(kind) = default_kind else {
            error!("desync encountered during item payload net-serialization");
            context.success = false;
            *payload = None;
            reader.set_error();
            return;
        };

        let len = reader.read_packed();

        if len > MAX_PAYLOAD_WIRE_BYTES || len as usize * 8 > reader.remaining_bits() {
            error!(len, "oversized item payload in network stream");
            context.success = false;
            *payload = None;
            reader.set_error();
            return;
        }

        let mut bytes = Vec::with_capacity(len as usize);
        for _ in 0..len {
            bytes.push(reader.read_bits(8) as u8);
        }

        match Payload::from_field_bytes(kind, &bytes) {
            Some(value) => *payload = Some(value),
            None => {
                error!(schema = %kind, "failed to decode item payload from network stream");
                context.success = false;
                *payload = None;
                reader.set_error();
            }
        }
    }
}

impl Item {
    /// Serializes the handle into the bit stream. Returns the soft
    /// success flag.
    pub fn net_write(&mut self, state: &RegistryState, writer: &mut BitWriter) -> bool {
        let mut context = state.net_serialize_item(writer, &self.id);
        state.net_serialize_item_payload(writer, &mut self.payload, &mut context);
        context.success
    }

    /// Deserializes the handle from the bit stream. Returns the soft
    /// success flag; hard desyncs additionally latch the reader error.
    pub fn net_read(&mut self, state: &RegistryState, reader: &mut BitReader<'_>) -> bool {
        let mut context = state.net_deserialize_item(reader, &mut self.id);
        state.net_deserialize_item_payload(reader, &mut self.payload, &mut context);
        context.success && !reader.is_error()
    }
}

impl ItemStack {
    pub fn net_write(&mut self, state: &RegistryState, writer: &mut BitWriter) -> bool {
        let success = self.item.net_write(state, writer);

        writer.write_bit(self.count < 0);
        writer.write_packed(self.count.unsigned_abs());

        success
    }

    pub fn net_read(&mut self, state: &RegistryState, reader: &mut BitReader<'_>) -> bool {
        let success = self.item.net_read(state, reader);

        let is_negative = reader.read_bit();
        let absolute = reader.read_packed();
        // wrapping_neg keeps i32::MIN intact.
        self.count = if is_negative {
            (absolute as i32).wrapping_neg()
        } else {
            absolute as i32
        };

        success && !reader.is_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ConsumablePayload, WeaponPayload};
    use crate::record::{RecordData, SharedData};
    use crate::tags::ItemTags;

    fn weapon(name: &str) -> RecordData {
        RecordData {
            shared: SharedData::new(ItemId::new("Weapon", name), ItemTags::EQUIPPABLE, 1),
            asset_path: format!("items/weapons/{name}.ron"),
            default_payload: Some(Payload::Weapon(WeaponPayload {
                durability: 100,
                enchant_level: 0,
            })),
            custom_data: None,
        }
    }

    fn potion(name: &str) -> RecordData {
        RecordData {
            shared: SharedData::new(ItemId::new("Consumable", name), ItemTags::CONSUMABLE, 16),
            asset_path: format!("items/consumables/{name}.ron"),
            default_payload: Some(Payload::Consumable(ConsumablePayload { charges: 3 })),
            custom_data: None,
        }
    }

    fn test_state() -> RegistryState {
        let mut state = RegistryState::default();
        state.reset(vec![weapon("Sword"), weapon("Axe"), potion("Elixir")]);
        state.checksum();
        for index in 0..state.records_num(None) {
            let record = &state.records()[index];
            assert!(record.cached_checksum().is_some());
        }
        state
    }

    #[test]
    fn bit_codec_round_trip() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bit(true);
        writer.write_u32(0xdead_beef);
        writer.write_packed(0);
        writer.write_packed(127);
        writer.write_packed(300);
        writer.write_packed(u32::MAX);

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(3), 0b101);
        assert!(reader.read_bit());
        assert_eq!(reader.read_u32(), 0xdead_beef);
        assert_eq!(reader.read_packed(), 0);
        assert_eq!(reader.read_packed(), 127);
        assert_eq!(reader.read_packed(), 300);
        assert_eq!(reader.read_packed(), u32::MAX);
        assert!(!reader.is_error());
    }

    #[test]
    fn reading_past_end_latches_error() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b11, 2);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(8), 0b11);
        assert_eq!(reader.read_u32(), 0);
        assert!(reader.is_error());
    }

    #[test]
    fn item_round_trip_between_identical_states() {
        let state = test_state();

        let mut item = Item::new(ItemId::new("Weapon", "Sword"));
        item.payload = Some(Payload::Weapon(WeaponPayload {
            durability: 42,
            enchant_level: 2,
        }));

        let mut writer = BitWriter::new();
        assert!(item.clone().net_write(&state, &mut writer));

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let mut received = Item::default();
        assert!(received.net_read(&state, &mut reader));

        assert_eq!(received, item);
    }

    #[test]
    fn invalid_item_round_trips_as_invalid() {
        let state = test_state();

        let mut item = Item::default();
        let mut writer = BitWriter::new();
        assert!(item.net_write(&state, &mut writer));

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let mut received = Item::new(ItemId::new("Weapon", "Axe"));
        received.payload = Some(Payload::new_default(crate::payload::PayloadKind::Weapon));
        assert!(received.net_read(&state, &mut reader));

        assert!(!received.id.is_valid());
        assert!(received.payload.is_none());
    }

    #[test]
    fn writer_synchronizes_payload_schema() {
        let state = test_state();

        // Handle carries the wrong schema for its record.
        let mut item = Item::new(ItemId::new("Consumable", "Elixir"));
        item.payload = Some(Payload::new_default(crate::payload::PayloadKind::Weapon));

        let mut writer = BitWriter::new();
        assert!(item.net_write(&state, &mut writer));
        assert_eq!(
            item.payload.as_ref().map(Payload::kind),
            Some(crate::payload::PayloadKind::Consumable)
        );
    }

    #[test]
    fn mismatched_states_fail_softly() {
        let writer_state = test_state();

        // Two records still need two encoding bits, so the streams stay
        // bit-aligned while replication index 3 has nothing to resolve to.
        let mut reader_state = RegistryState::default();
        reader_state.reset(vec![weapon("Axe"), potion("Elixir")]);
        reader_state.checksum();

        // "Weapon:Sword" sorts last on the writer: replication index 3.
        let mut item = Item::new(ItemId::new("Weapon", "Sword"));
        item.reset(&writer_state);

        let mut writer = BitWriter::new();
        assert!(item.net_write(&writer_state, &mut writer));

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let mut received = Item::default();
        assert!(!received.net_read(&reader_state, &mut reader));
        assert!(received.payload.is_none());
    }

    #[cfg(feature = "net-checksum")]
    #[test]
    fn divergent_record_content_fails_checksum_exchange() {
        let writer_state = test_state();

        let mut reader_state = RegistryState::default();
        let mut divergent = weapon("Axe");
        divergent.asset_path = "items/weapons/axe_v2.ron".to_owned();
        reader_state.reset(vec![weapon("Sword"), divergent, potion("Elixir")]);
        reader_state.checksum();

        let mut item = Item::new(ItemId::new("Weapon", "Axe"));
        item.reset(&writer_state);

        let mut writer = BitWriter::new();
        assert!(item.net_write(&writer_state, &mut writer));

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let mut received = Item::default();
        assert!(!received.net_read(&reader_state, &mut reader));

        // The index still resolved; only the content check failed.
        assert_eq!(received.id, ItemId::new("Weapon", "Axe"));
    }

    #[test]
    fn stack_count_sign_survives_round_trip() {
        let state = test_state();

        for count in [0, 1, -1, 300, -70_000, i32::MAX, i32::MIN] {
            let mut item = Item::new(ItemId::new("Weapon", "Sword"));
            item.reset(&state);
            let mut stack = ItemStack::new(item, count);

            let mut writer = BitWriter::new();
            assert!(stack.net_write(&state, &mut writer));

            let bytes = writer.finish();
            let mut reader = BitReader::new(&bytes);
            let mut received = ItemStack::default();
            assert!(received.net_read(&state, &mut reader));
            assert_eq!(received.count, count);
        }
    }

    #[test]
    fn rep_index_width_tracks_record_count() {
        let state = test_state();
        assert_eq!(state.rep_index_encoding_bits(), 2);

        let mut item = Item::new(ItemId::new("Weapon", "Axe"));
        item.reset(&state);

        let mut writer = BitWriter::new();
        item.net_write(&state, &mut writer);

        // 2 index bits, optional 32 checksum bits, 1 payload bit, then
        // the length-prefixed payload bytes.
        let fixed_bits = if cfg!(feature = "net-checksum") { 35 } else { 3 };
        assert!(writer.bit_len() > fixed_bits);
    }
}
