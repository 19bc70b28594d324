//! End-to-end flow over the public API: content refresh, diffing,
//! defaults propagation into live inventories, network exchange and
//! snapshot persistence working together.

use registry_core::{
    BitReader, BitWriter, DefaultsPropagator, Item, ItemId, ItemStack, ItemTags, Payload,
    PropagationContext, PropagationTarget, RecordData, Redirector, Redirects, RegistryState,
    SharedData, WeaponPayload,
};

struct Stash {
    id: u64,
    stacks: Vec<ItemStack>,
}

impl PropagationTarget for Stash {
    fn target_id(&self) -> u64 {
        self.id
    }

    fn visit_items(&mut self, visitor: &mut dyn FnMut(&mut Item)) {
        for stack in &mut self.stacks {
            visitor(&mut stack.item);
        }
    }
}

fn weapon(name: &str, durability: u32) -> RecordData {
    RecordData {
        shared: SharedData::new(ItemId::new("Weapon", name), ItemTags::EQUIPPABLE, 1),
        asset_path: format!("items/weapons/{name}.ron"),
        default_payload: Some(Payload::Weapon(WeaponPayload {
            durability,
            enchant_level: 0,
        })),
        custom_data: None,
    }
}

#[test]
fn content_refresh_reaches_live_inventories() {
    let mut state = RegistryState::default();
    state.reset(vec![weapon("Sword", 100), weapon("Axe", 80)]);

    // A player holds one pristine sword and one customized sword.
    let mut pristine = Item::new(ItemId::new("Weapon", "Sword"));
    pristine.reset(&state);
    let mut customized = pristine.clone();
    customized.payload = Some(Payload::Weapon(WeaponPayload {
        durability: 13,
        enchant_level: 5,
    }));

    let mut stash = Stash {
        id: 42,
        stacks: vec![
            ItemStack::new(pristine, 1),
            ItemStack::new(customized, 1),
        ],
    };

    // Content update: the sword default gets sturdier, the axe is
    // untouched.
    let original = state.clone();
    assert!(!state.append_data(weapon("Sword", 200)));

    // Shrink the pre-mutation slice to the records that actually
    // changed.
    let mut changed = original;
    changed.diff_records(&state);
    assert_eq!(changed.records_num(None), 1);

    let mut propagator = DefaultsPropagator::new();
    let mut context = PropagationContext::new(changed);
    propagator.propagate_defaults(
        &state,
        &Redirects::default(),
        &mut context,
        &mut [&mut stash],
    );

    assert_eq!(
        stash.stacks[0].item.payload,
        Some(Payload::Weapon(WeaponPayload {
            durability: 200,
            enchant_level: 0,
        }))
    );
    // Customization survives the refresh.
    assert_eq!(
        stash.stacks[1].item.payload,
        Some(Payload::Weapon(WeaponPayload {
            durability: 13,
            enchant_level: 5,
        }))
    );
    assert_eq!(context.modified_targets, vec![42]);
}

#[test]
fn renames_propagate_and_replicate() {
    let mut server = RegistryState::default();
    server.reset(vec![weapon("Sword", 100)]);

    let mut stash = Stash {
        id: 1,
        stacks: vec![{
            let mut item = Item::new(ItemId::new("Weapon", "Longsword"));
            item.payload = Some(Payload::Weapon(WeaponPayload {
                durability: 100,
                enchant_level: 0,
            }));
            ItemStack::new(item, 3)
        }],
    };

    // The stash still references the pre-rename id; synchronize it the
    // way a load-time fixup would.
    let redirects = Redirects::from_raw(&[], &[Redirector::new("Longsword", "Sword")]);
    let mut original = RegistryState::default();
    original.reset(vec![weapon("Longsword", 100)]);

    let mut propagator = DefaultsPropagator::new();
    let mut context = PropagationContext::new(original);
    context.is_initial_fixup = true;
    propagator.propagate_defaults(&server, &redirects, &mut context, &mut [&mut stash]);

    assert_eq!(stash.stacks[0].item.id, ItemId::new("Weapon", "Sword"));
    assert!(context.modified_targets.is_empty());

    // The fixed-up stack replicates to a client holding the same state.
    let mut client = server.clone();
    server.checksum();
    client.checksum();

    let mut writer = BitWriter::new();
    assert!(stash.stacks[0].net_write(&server, &mut writer));

    let bytes = writer.finish();
    let mut reader = BitReader::new(&bytes);
    let mut received = ItemStack::default();
    assert!(received.net_read(&client, &mut reader));

    assert_eq!(received.item.id, ItemId::new("Weapon", "Sword"));
    assert_eq!(received.count, 3);
}

#[test]
fn snapshot_preserves_replication_layout() {
    let mut state = RegistryState::default();
    state.reset(vec![weapon("Sword", 100), weapon("Axe", 80), weapon("Mace", 60)]);
    let expected_checksum = state.checksum();

    let mut bytes = Vec::new();
    state
        .save_state(&mut bytes, false, "flow-test")
        .unwrap();

    let mut restored = RegistryState::default();
    restored
        .load_state(&mut bytes.as_slice(), false, "flow-test")
        .unwrap();

    assert_eq!(restored.checksum(), expected_checksum);
    for record in state.records() {
        let loaded = restored.record(record.id()).unwrap();
        assert_eq!(loaded.rep_index, record.rep_index);
    }
}
