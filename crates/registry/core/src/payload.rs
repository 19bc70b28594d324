//! Typed item payload schemas.
//!
//! The registry stores one optional default payload and one optional custom
//! data blob per record. Instead of reflecting over arbitrary registered
//! types, the set of supported schemas is a closed enum: every schema is a
//! plain struct with a declared top-level field list, and [`Payload`]
//! dispatches field comparison/copy/export by match. Defaults propagation
//! relies on that field surface to migrate only fields the player never
//! customized.
//!
//! # Design: Base + Kind Pattern
//!
//! - [`PayloadKind`] is the schema tag with a stable wire id and name
//! - [`Payload`] holds the schema-specific value
//! - [`PayloadFields`] is the per-schema "vtable": field count, per-field
//!   equality, per-field copy

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Per-schema field surface used by defaults propagation.
///
/// `index` addresses the schema's declared top-level fields in order.
/// Implementations must keep the index assignment stable: it participates
/// in the "was this field customized away from the default" check.
pub trait PayloadFields {
    /// Number of declared top-level fields.
    const FIELD_COUNT: usize;

    /// Whether field `index` compares equal between `self` and `other`.
    fn field_eq(&self, other: &Self, index: usize) -> bool;

    /// Overwrites field `index` of `self` with the value from `source`.
    fn copy_field_from(&mut self, source: &Self, index: usize);
}

/// Instance state of an equippable weapon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponPayload {
    pub durability: u32,
    pub enchant_level: u8,
}

impl PayloadFields for WeaponPayload {
    const FIELD_COUNT: usize = 2;

    fn field_eq(&self, other: &Self, index: usize) -> bool {
        match index {
            0 => self.durability == other.durability,
            1 => self.enchant_level == other.enchant_level,
            _ => unreachable!("WeaponPayload has {} fields", Self::FIELD_COUNT),
        }
    }

    fn copy_field_from(&mut self, source: &Self, index: usize) {
        match index {
            0 => self.durability = source.durability,
            1 => self.enchant_level = source.enchant_level,
            _ => unreachable!("WeaponPayload has {} fields", Self::FIELD_COUNT),
        }
    }
}

/// Instance state of a consumable (potions, scrolls, food).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumablePayload {
    pub charges: u16,
}

impl PayloadFields for ConsumablePayload {
    const FIELD_COUNT: usize = 1;

    fn field_eq(&self, other: &Self, index: usize) -> bool {
        match index {
            0 => self.charges == other.charges,
            _ => unreachable!("ConsumablePayload has {} fields", Self::FIELD_COUNT),
        }
    }

    fn copy_field_from(&mut self, source: &Self, index: usize) {
        match index {
            0 => self.charges = source.charges,
            _ => unreachable!("ConsumablePayload has {} fields", Self::FIELD_COUNT),
        }
    }
}

/// Cosmetic customization state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmeticPayload {
    pub dye: u32,
    pub pattern: u16,
}

impl PayloadFields for CosmeticPayload {
    const FIELD_COUNT: usize = 2;

    fn field_eq(&self, other: &Self, index: usize) -> bool {
        match index {
            0 => self.dye == other.dye,
            1 => self.pattern == other.pattern,
            _ => unreachable!("CosmeticPayload has {} fields", Self::FIELD_COUNT),
        }
    }

    fn copy_field_from(&mut self, source: &Self, index: usize) {
        match index {
            0 => self.dye = source.dye,
            1 => self.pattern = source.pattern,
            _ => unreachable!("CosmeticPayload has {} fields", Self::FIELD_COUNT),
        }
    }
}

/// Generic accumulating counters (kill trackers, usage stats).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersPayload {
    pub uses: u32,
    pub kills: u32,
}

impl PayloadFields for CountersPayload {
    const FIELD_COUNT: usize = 2;

    fn field_eq(&self, other: &Self, index: usize) -> bool {
        match index {
            0 => self.uses == other.uses,
            1 => self.kills == other.kills,
            _ => unreachable!("CountersPayload has {} fields", Self::FIELD_COUNT),
        }
    }

    fn copy_field_from(&mut self, source: &Self, index: usize) {
        match index {
            0 => self.uses = source.uses,
            1 => self.kills = source.kills,
            _ => unreachable!("CountersPayload has {} fields", Self::FIELD_COUNT),
        }
    }
}

/// Schema tag for [`Payload`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum PayloadKind {
    Weapon,
    Consumable,
    Cosmetic,
    Counters,
}

impl PayloadKind {
    /// Stable wire id used by cooked snapshots and schema-version tables.
    pub const fn wire_id(self) -> u16 {
        match self {
            Self::Weapon => 1,
            Self::Consumable => 2,
            Self::Cosmetic => 3,
            Self::Counters => 4,
        }
    }

    /// Stable schema name used by development snapshots.
    pub const fn schema_name(self) -> &'static str {
        match self {
            Self::Weapon => "WeaponPayload",
            Self::Consumable => "ConsumablePayload",
            Self::Cosmetic => "CosmeticPayload",
            Self::Counters => "CountersPayload",
        }
    }

    /// Schema layout version recorded in snapshot headers.
    pub const fn schema_version(self) -> u16 {
        match self {
            Self::Weapon => 1,
            Self::Consumable => 1,
            Self::Cosmetic => 1,
            Self::Counters => 1,
        }
    }

    pub fn from_wire_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::Weapon),
            2 => Some(Self::Consumable),
            3 => Some(Self::Cosmetic),
            4 => Some(Self::Counters),
            _ => None,
        }
    }

    pub fn from_schema_name(name: &str) -> Option<Self> {
        match name {
            "WeaponPayload" => Some(Self::Weapon),
            "ConsumablePayload" => Some(Self::Consumable),
            "CosmeticPayload" => Some(Self::Cosmetic),
            "CountersPayload" => Some(Self::Counters),
            _ => None,
        }
    }
}

/// A typed, variable-shape payload value.
///
/// Default payloads and registry custom data share this representation and
/// the same shared pool inside the registry state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Weapon(WeaponPayload),
    Consumable(ConsumablePayload),
    Cosmetic(CosmeticPayload),
    Counters(CountersPayload),
}

impl Payload {
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Self::Weapon(_) => PayloadKind::Weapon,
            Self::Consumable(_) => PayloadKind::Consumable,
            Self::Cosmetic(_) => PayloadKind::Cosmetic,
            Self::Counters(_) => PayloadKind::Counters,
        }
    }

    /// Fresh value of the given schema with all fields zeroed.
    pub fn new_default(kind: PayloadKind) -> Self {
        match kind {
            PayloadKind::Weapon => Self::Weapon(WeaponPayload::default()),
            PayloadKind::Consumable => Self::Consumable(ConsumablePayload::default()),
            PayloadKind::Cosmetic => Self::Cosmetic(CosmeticPayload::default()),
            PayloadKind::Counters => Self::Counters(CountersPayload::default()),
        }
    }

    pub const fn field_count(&self) -> usize {
        match self {
            Self::Weapon(_) => WeaponPayload::FIELD_COUNT,
            Self::Consumable(_) => ConsumablePayload::FIELD_COUNT,
            Self::Cosmetic(_) => CosmeticPayload::FIELD_COUNT,
            Self::Counters(_) => CountersPayload::FIELD_COUNT,
        }
    }

    /// Per-field equality. Both values must carry the same schema.
    pub fn field_eq(&self, other: &Self, index: usize) -> bool {
        match (self, other) {
            (Self::Weapon(a), Self::Weapon(b)) => a.field_eq(b, index),
            (Self::Consumable(a), Self::Consumable(b)) => a.field_eq(b, index),
            (Self::Cosmetic(a), Self::Cosmetic(b)) => a.field_eq(b, index),
            (Self::Counters(a), Self::Counters(b)) => a.field_eq(b, index),
            _ => unreachable!("field_eq requires matching payload schemas"),
        }
    }

    /// Per-field copy. Both values must carry the same schema.
    pub fn copy_field_from(&mut self, source: &Self, index: usize) {
        match (self, source) {
            (Self::Weapon(a), Self::Weapon(b)) => a.copy_field_from(b, index),
            (Self::Consumable(a), Self::Consumable(b)) => a.copy_field_from(b, index),
            (Self::Cosmetic(a), Self::Cosmetic(b)) => a.copy_field_from(b, index),
            (Self::Counters(a), Self::Counters(b)) => a.copy_field_from(b, index),
            _ => unreachable!("copy_field_from requires matching payload schemas"),
        }
    }

    /// Deterministic text form folded into checksums and diagnostic dumps.
    pub fn export_text(&self) -> String {
        match self {
            Self::Weapon(p) => format!(
                "WeaponPayload(durability={},enchant_level={})",
                p.durability, p.enchant_level
            ),
            Self::Consumable(p) => format!("ConsumablePayload(charges={})", p.charges),
            Self::Cosmetic(p) => {
                format!("CosmeticPayload(dye={},pattern={})", p.dye, p.pattern)
            }
            Self::Counters(p) => format!("CountersPayload(uses={},kills={})", p.uses, p.kills),
        }
    }

    /// Serializes the schema fields without the kind tag.
    ///
    /// The snapshot and wire formats encode the schema tag themselves, as
    /// either a name string or a compact wire id.
    pub fn to_field_bytes(&self) -> Vec<u8> {
        let encoded = match self {
            Self::Weapon(p) => bincode::serialize(p),
            Self::Consumable(p) => bincode::serialize(p),
            Self::Cosmetic(p) => bincode::serialize(p),
            Self::Counters(p) => bincode::serialize(p),
        };

        // Schema structs are plain integers; bincode cannot fail on them.
        encoded.expect("payload field serialization is infallible")
    }

    /// Rebuilds a value of `kind` from [`Payload::to_field_bytes`] output.
    pub fn from_field_bytes(kind: PayloadKind, bytes: &[u8]) -> Option<Self> {
        let payload = match kind {
            PayloadKind::Weapon => Self::Weapon(bincode::deserialize(bytes).ok()?),
            PayloadKind::Consumable => Self::Consumable(bincode::deserialize(bytes).ok()?),
            PayloadKind::Cosmetic => Self::Cosmetic(bincode::deserialize(bytes).ok()?),
            PayloadKind::Counters => Self::Counters(bincode::deserialize(bytes).ok()?),
        };

        Some(payload)
    }
}
