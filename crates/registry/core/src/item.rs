//! Item handles.
//!
//! An [`Item`] is the lightweight value stored in inventories: the
//! registry identifier plus an optional instanced payload. Shared data,
//! default payloads and custom data always live in the registry state;
//! the handle only carries what differs per instance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::ItemId;
use crate::payload::Payload;
use crate::redirects::Redirects;
use crate::state::RegistryState;

/// A registry-backed item instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub payload: Option<Payload>,
}

impl Item {
    pub fn new(id: ItemId) -> Self {
        Self { id, payload: None }
    }

    /// Resets the payload to a copy of the registry default. An id with
    /// no backing record is cleared entirely.
    pub fn reset(&mut self, state: &RegistryState) {
        if self.id.is_valid() {
            if let Some(record) = state.record(&self.id) {
                self.payload = state.default_payload_of(record).copied();
                return;
            }

            self.id = ItemId::default();
        }

        self.payload = None;
    }

    /// Whether the handle is consistent with the registry: a backed id
    /// whose payload schema matches the record default, or a fully empty
    /// handle.
    pub fn validate(&self, state: &RegistryState) -> bool {
        if let Some(record) = state.record(&self.id) {
            return self.payload.as_ref().map(Payload::kind)
                == state.default_payload_of(record).map(Payload::kind);
        }

        !self.id.is_valid() && self.payload.is_none()
    }

    /// Brings a possibly stale handle up to date: applies redirects when
    /// the id no longer resolves, then refreshes the payload schema to
    /// the record default if it diverged. Clears the handle when no
    /// record can be found even after redirection.
    pub fn synchronize(&mut self, state: &RegistryState, redirects: &Redirects) {
        if self.id.is_valid() {
            if !state.contains_record(&self.id) {
                redirects.try_redirect(&mut self.id);
            }

            if let Some(record) = state.record(&self.id) {
                let default_payload = state.default_payload_of(record);

                if self.payload.as_ref().map(Payload::kind) != default_payload.map(Payload::kind) {
                    self.payload = default_payload.copied();
                }

                return;
            }

            self.id = ItemId::default();
        }

        self.payload = None;
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "{} {}", self.id, payload.export_text()),
            None => write!(f, "{}", self.id),
        }
    }
}

/// An item with a signed stack count.
///
/// Negative counts are meaningful to debt-style gameplay systems and
/// survive the wire encoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: Item,
    pub count: i32,
}

impl ItemStack {
    pub fn new(item: Item, count: i32) -> Self {
        Self { item, count }
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.item, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Payload, PayloadKind, WeaponPayload};
    use crate::record::{RecordData, SharedData};
    use crate::redirects::Redirector;
    use crate::tags::ItemTags;

    fn state_with_sword() -> RegistryState {
        let mut state = RegistryState::default();
        state.reset(vec![RecordData {
            shared: SharedData::new(ItemId::new("Weapon", "Sword"), ItemTags::EQUIPPABLE, 1),
            asset_path: "items/weapons/sword.ron".to_owned(),
            default_payload: Some(Payload::Weapon(WeaponPayload::default())),
            custom_data: None,
        }]);
        state
    }

    #[test]
    fn reset_copies_registry_default() {
        let state = state_with_sword();
        let mut item = Item::new(ItemId::new("Weapon", "Sword"));

        item.reset(&state);
        assert_eq!(item.payload.map(|p| p.kind()), Some(PayloadKind::Weapon));
        assert!(item.validate(&state));
    }

    #[test]
    fn reset_clears_unknown_id() {
        let state = state_with_sword();
        let mut item = Item::new(ItemId::new("Weapon", "Mace"));
        item.payload = Some(Payload::Weapon(WeaponPayload::default()));

        item.reset(&state);
        assert!(!item.id.is_valid());
        assert!(item.payload.is_none());
        assert!(item.validate(&state));
    }

    #[test]
    fn validate_rejects_schema_mismatch() {
        let state = state_with_sword();
        let mut item = Item::new(ItemId::new("Weapon", "Sword"));
        item.payload = Some(Payload::new_default(PayloadKind::Consumable));

        assert!(!item.validate(&state));
    }

    #[test]
    fn synchronize_follows_redirects() {
        let state = state_with_sword();
        let redirects = Redirects::from_raw(&[], &[Redirector::new("Longsword", "Sword")]);

        let mut item = Item::new(ItemId::new("Weapon", "Longsword"));
        item.synchronize(&state, &redirects);

        assert_eq!(item.id, ItemId::new("Weapon", "Sword"));
        assert_eq!(item.payload.map(|p| p.kind()), Some(PayloadKind::Weapon));
    }

    #[test]
    fn synchronize_keeps_matching_payload() {
        let state = state_with_sword();
        let redirects = Redirects::default();

        let customized = Payload::Weapon(WeaponPayload {
            durability: 7,
            enchant_level: 3,
        });

        let mut item = Item::new(ItemId::new("Weapon", "Sword"));
        item.payload = Some(customized);
        item.synchronize(&state, &redirects);

        assert_eq!(item.payload, Some(customized));
    }

    #[test]
    fn synchronize_clears_unresolvable_id() {
        let state = state_with_sword();
        let redirects = Redirects::default();

        let mut item = Item::new(ItemId::new("Weapon", "Mace"));
        item.synchronize(&state, &redirects);

        assert!(!item.id.is_valid());
        assert!(item.payload.is_none());
    }

    #[test]
    fn display_includes_payload_text() {
        let mut item = Item::new(ItemId::new("Weapon", "Sword"));
        assert_eq!(item.to_string(), "Weapon:Sword");

        item.payload = Some(Payload::Weapon(WeaponPayload {
            durability: 100,
            enchant_level: 0,
        }));
        assert_eq!(
            item.to_string(),
            "Weapon:Sword WeaponPayload(durability=100,enchant_level=0)"
        );
    }
}
