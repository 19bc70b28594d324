//! End-to-end: a directory of RON catalogs driving the registry service.

use std::fs;

use registry_core::{ItemId, Payload, PayloadKind};
use registry_service::RegistryService;

use registry_content::{ContentSettings, FileDataSource};

fn write_catalog(dir: &std::path::Path, file: &str, content: &str) {
    fs::write(dir.join(file), content).unwrap();
}

fn weapons_catalog(durability: u32) -> String {
    format!(
        r#"
        ItemCatalog(
            items: [
                ItemDefinition(
                    archetype: "Weapon",
                    name: "Sword",
                    tags: "EQUIPPABLE",
                    max_stack_size: 1,
                    default_payload: Some(Weapon((durability: {durability}, enchant_level: 0))),
                ),
                ItemDefinition(
                    archetype: "Weapon",
                    name: "Axe",
                    tags: "EQUIPPABLE",
                    max_stack_size: 1,
                    default_payload: Some(Weapon((durability: 80, enchant_level: 0))),
                ),
            ],
        )
        "#
    )
}

const POTIONS_CATALOG: &str = r#"
ItemCatalog(
    items: [
        ItemDefinition(
            archetype: "Consumable",
            name: "Elixir",
            tags: "CONSUMABLE | STACKABLE",
            max_stack_size: 16,
            default_payload: Some(Consumable((charges: 3))),
        ),
    ],
)
"#;

fn test_settings(root: &std::path::Path) -> ContentSettings {
    ContentSettings {
        data_source_name: "content-items".to_owned(),
        item_directory: root.join("items"),
        snapshot_directory: root.join("registry"),
        archetype_redirects: Vec::new(),
        name_redirects: Vec::new(),
    }
}

fn start_service(settings: &ContentSettings) -> RegistryService {
    let source = FileDataSource::new(settings);
    let mut service = RegistryService::new(Box::new(source), settings.service_settings());
    service.initialize().unwrap();
    service
}

#[test]
fn directory_scan_builds_the_registry() {
    let root = tempfile::tempdir().unwrap();
    let items = root.path().join("items");
    fs::create_dir_all(&items).unwrap();
    fs::create_dir_all(root.path().join("registry")).unwrap();

    write_catalog(&items, "weapons.ron", &weapons_catalog(100));
    write_catalog(&items, "potions.ron", POTIONS_CATALOG);

    let mut service = start_service(&test_settings(root.path()));

    assert_eq!(service.with_state(|state| state.records_num(None)), 3);
    service.with_state(|state| {
        let sword = state.record(&ItemId::new("Weapon", "Sword")).unwrap();
        assert_eq!(sword.asset_path, "weapons.ron");
        assert_eq!(
            state.default_payload_of(sword).map(Payload::kind),
            Some(PayloadKind::Weapon)
        );

        let elixir = state.record(&ItemId::new("Consumable", "Elixir")).unwrap();
        assert_eq!(elixir.shared.max_stack_size, 16);
    });

    service.deinitialize();
}

#[test]
fn refresh_reconciles_added_and_removed_files() {
    let root = tempfile::tempdir().unwrap();
    let items = root.path().join("items");
    fs::create_dir_all(&items).unwrap();
    fs::create_dir_all(root.path().join("registry")).unwrap();

    write_catalog(&items, "weapons.ron", &weapons_catalog(100));

    let mut service = start_service(&test_settings(root.path()));
    assert_eq!(service.with_state(|state| state.records_num(None)), 2);

    // A new catalog appears and the weapons catalog disappears.
    write_catalog(&items, "potions.ron", POTIONS_CATALOG);
    fs::remove_file(items.join("weapons.ron")).unwrap();

    service.force_refresh(true);

    assert_eq!(service.with_state(|state| state.records_num(None)), 1);
    assert!(
        service.with_state(|state| state.record(&ItemId::new("Consumable", "Elixir")).is_some())
    );
    assert!(service.with_state(|state| state.record(&ItemId::new("Weapon", "Sword")).is_none()));

    service.deinitialize();
}

#[test]
fn pending_refresh_applies_on_flush() {
    let root = tempfile::tempdir().unwrap();
    let items = root.path().join("items");
    fs::create_dir_all(&items).unwrap();
    fs::create_dir_all(root.path().join("registry")).unwrap();

    write_catalog(&items, "weapons.ron", &weapons_catalog(100));

    let mut service = start_service(&test_settings(root.path()));

    write_catalog(&items, "weapons.ron", &weapons_catalog(175));
    service.force_refresh(false);
    assert!(service.is_pending_refresh());

    // Nothing applied yet.
    service.with_state(|state| {
        let sword = state.record(&ItemId::new("Weapon", "Sword")).unwrap();
        assert_eq!(
            state.default_payload_of(sword),
            Some(&Payload::Weapon(registry_core::WeaponPayload {
                durability: 100,
                enchant_level: 0,
            }))
        );
    });

    service.flush_pending_refresh();

    service.with_state(|state| {
        let sword = state.record(&ItemId::new("Weapon", "Sword")).unwrap();
        assert_eq!(
            state.default_payload_of(sword),
            Some(&Payload::Weapon(registry_core::WeaponPayload {
                durability: 175,
                enchant_level: 0,
            }))
        );
    });

    service.deinitialize();
}

#[test]
fn second_session_hydrates_from_development_snapshot() {
    let root = tempfile::tempdir().unwrap();
    let items = root.path().join("items");
    fs::create_dir_all(&items).unwrap();
    fs::create_dir_all(root.path().join("registry")).unwrap();

    write_catalog(&items, "weapons.ron", &weapons_catalog(100));

    let settings = test_settings(root.path());

    {
        let mut service = start_service(&settings);
        service.deinitialize();
    }

    // Even with the content directory gone the snapshot hydrates the
    // second session.
    fs::remove_file(items.join("weapons.ron")).unwrap();
    let mut service = start_service(&settings);

    assert_eq!(service.with_state(|state| state.records_num(None)), 2);
    service.deinitialize();
}

#[test]
fn duplicate_ids_across_catalogs_fail_initialization() {
    let root = tempfile::tempdir().unwrap();
    let items = root.path().join("items");
    fs::create_dir_all(&items).unwrap();
    fs::create_dir_all(root.path().join("registry")).unwrap();

    // Both catalogs declare Weapon:Sword.
    write_catalog(&items, "weapons.ron", &weapons_catalog(100));
    write_catalog(
        &items,
        "more_weapons.ron",
        r#"
        ItemCatalog(
            items: [
                ItemDefinition(
                    archetype: "Weapon",
                    name: "Sword",
                    tags: "EQUIPPABLE",
                    max_stack_size: 1,
                ),
            ],
        )
        "#,
    );

    let settings = test_settings(root.path());
    let source = FileDataSource::new(&settings);
    let mut service = RegistryService::new(Box::new(source), settings.service_settings());

    let err = service.initialize().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Weapon:Sword"));
    assert!(message.contains("weapons.ron"));
}

#[test]
fn malformed_catalog_fails_initialization_with_context() {
    let root = tempfile::tempdir().unwrap();
    let items = root.path().join("items");
    fs::create_dir_all(&items).unwrap();
    fs::create_dir_all(root.path().join("registry")).unwrap();

    write_catalog(&items, "broken.ron", "ItemCatalog(items: [");

    let settings = test_settings(root.path());
    let source = FileDataSource::new(&settings);
    let mut service = RegistryService::new(Box::new(source), settings.service_settings());

    let err = service.initialize().unwrap_err();
    assert!(err.to_string().contains("broken.ron"));
}
