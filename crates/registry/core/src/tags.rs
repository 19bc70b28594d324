//! Item tag sets shared between all instances of an archetype.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Customizable per-archetype gameplay tags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ItemTags: u32 {
        const EQUIPPABLE = 1 << 0;
        const CONSUMABLE = 1 << 1;
        const STACKABLE  = 1 << 2;
        const QUEST_ITEM = 1 << 3;
        const TRADEABLE  = 1 << 4;
        const UNIQUE     = 1 << 5;
    }
}

impl ItemTags {
    /// Deterministic text form folded into record checksums.
    pub fn export_text(&self) -> String {
        format!("{:#010x}", self.bits())
    }
}

// Flags-string form in human-readable formats ("EQUIPPABLE | UNIQUE"),
// raw bits in binary ones. Deriving inside `bitflags!` would serialize
// the wrapper struct instead.
impl Serialize for ItemTags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        bitflags::serde::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ItemTags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bitflags::serde::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_text_is_stable() {
        let tags = ItemTags::EQUIPPABLE | ItemTags::TRADEABLE;
        assert_eq!(tags.export_text(), "0x00000011");
        assert_eq!(ItemTags::empty().export_text(), "0x00000000");
    }

    #[test]
    fn serde_uses_the_flags_text_form() {
        let tags: ItemTags = ron::from_str("\"EQUIPPABLE | UNIQUE\"").unwrap();
        assert_eq!(tags, ItemTags::EQUIPPABLE | ItemTags::UNIQUE);

        let text = ron::to_string(&tags).unwrap();
        let back: ItemTags = ron::from_str(&text).unwrap();
        assert_eq!(back, tags);

        let empty: ItemTags = ron::from_str("\"\"").unwrap();
        assert_eq!(empty, ItemTags::empty());
    }
}
