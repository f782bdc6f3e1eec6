//! Integration tests for the economy facade.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ascendant_economy::{
    ActorStats, ContentCatalog, CraftError, DurableStore, EconomyEvent, EconomyFacade, EngineConfig,
    EngineError, Inventory, InventoryDelta, MemoryStore, PlayerId, PlayerSnapshot, Rarity, ScriptedRng,
    SeededRng, StateStore, StoreError, UnlockError,
};

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data")
}

fn shipped_catalog() -> Arc<ContentCatalog> {
    Arc::new(ContentCatalog::load(data_dir().join("content.toml")).unwrap())
}

fn temp_wal_path(tag: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("test_facade_{tag}_{}_{id}_{n}.wal", std::process::id()))
}

fn grant(store: &impl StateStore, player: PlayerId, items: &[(&str, u32)], currency: u64) {
    let snapshot = store.load(player).unwrap();
    let mut delta = InventoryDelta::new();
    for &(item, count) in items {
        delta.credit_item(item, count);
    }
    delta.credit_currency(currency);
    store.apply_delta(player, snapshot.version, &delta).unwrap();
}

// ============================================================
// Shipped content
// ============================================================

#[test]
fn test_shipped_config_and_content_load() {
    let config = EngineConfig::load(data_dir().join("engine.toml")).unwrap();
    assert_eq!(config.content_path, data_dir().join("content.toml"));
    assert!(config.rng_seed.is_some());

    let catalog = ContentCatalog::load(&config.content_path).unwrap();
    assert!(catalog.creature("Ember Tyrant").is_some_and(|c| c.boss));
    assert_eq!(catalog.crafting().producers_of("Claw Dagger"), ["Claw Dagger".to_owned()]);
    assert!(catalog.crafting().find_cycle().is_none());
}

#[test]
fn test_hunt_then_craft_flow() {
    let store = MemoryStore::new();
    store.create_player(1, ActorStats::new(60, 10, 3)).unwrap();
    // Every roll succeeds: each Dire Wolf drops its whole table.
    let facade = EconomyFacade::new(shipped_catalog(), store, ScriptedRng::constant(0.0));

    for _ in 0..3 {
        let outcome = facade.defeat_creature(1, "Dire Wolf").unwrap();
        assert_eq!(outcome.drops.len(), 3);
    }

    let snapshot = facade.store().load(1).unwrap();
    assert_eq!(snapshot.inventory.count_item("Beast Claw"), 3);
    assert_eq!(snapshot.inventory.count_item("Frayed Hide"), 3);
    assert_eq!(snapshot.currency, 45);

    facade.craft(1, "Campfire", "Claw Dagger").unwrap();

    let inventory = facade.store().get_inventory(1).unwrap();
    assert_eq!(inventory.count_item("Claw Dagger"), 1);
    assert_eq!(inventory.count_item("Beast Claw"), 0);
    assert_eq!(inventory.count_item("Frayed Hide"), 1);

    let events = facade.drain_events();
    assert_eq!(events.len(), 4);
    assert!(matches!(events.last(), Some(EconomyEvent::ItemCrafted { item, .. }) if item == "Claw Dagger"));
    assert!(facade.drain_events().is_empty());
}

#[test]
fn test_rare_drop_broadcast() {
    let store = MemoryStore::new();
    store.create_player(5, ActorStats::new(900, 200, 45)).unwrap();
    let facade = EconomyFacade::new(shipped_catalog(), store, ScriptedRng::constant(0.01));

    facade.defeat_creature(5, "Frost Wyrm").unwrap();
    let rare: Vec<_> = facade
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EconomyEvent::RareDrop { .. }))
        .collect();
    assert_eq!(
        rare,
        vec![EconomyEvent::RareDrop {
            player: 5,
            item: "Frost Fragment".to_owned(),
            rarity: Rarity::Mythic,
        }]
    );
}

#[test]
fn test_station_progression() {
    let store = MemoryStore::new();
    store.create_player(2, ActorStats::new(100, 20, 12)).unwrap();
    grant(&store, 2, &[("Iron Ore", 8)], 520);
    let facade = EconomyFacade::new(shipped_catalog(), store, SeededRng::from_seed(4));

    assert!(matches!(
        facade.craft(2, "Forge", "Iron Ingot"),
        Err(EngineError::Craft(CraftError::RecipeNotEligible { .. }))
    ));

    facade.unlock_station(2, "Forge").unwrap();
    assert_eq!(facade.store().load(2).unwrap().currency, 20);

    facade.craft(2, "Forge", "Iron Ingot").unwrap();
    facade.craft(2, "Forge", "Iron Ingot").unwrap();

    let snapshot = facade.store().load(2).unwrap();
    assert_eq!(snapshot.inventory.count_item("Iron Ingot"), 2);
    assert_eq!(snapshot.inventory.count_item("Iron Ore"), 0);
    assert_eq!(snapshot.currency, 10);

    assert!(matches!(
        facade.unlock_station(2, "Tannery"),
        Err(EngineError::Unlock(UnlockError::InsufficientFunds { required: 200, available: 10 }))
    ));
}

// ============================================================
// Store failures
// ============================================================

/// Loads work; every write fails.
struct ReadOnlyStore {
    inner: MemoryStore,
}

impl StateStore for ReadOnlyStore {
    fn load(&self, player: PlayerId) -> Result<PlayerSnapshot, StoreError> {
        self.inner.load(player)
    }

    fn apply_delta(&self, _: PlayerId, _: u64, _: &InventoryDelta) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("disk offline".to_owned()))
    }
}

/// Another writer commits between every load and the caller's apply.
struct RacingStore {
    inner: MemoryStore,
}

impl StateStore for RacingStore {
    fn load(&self, player: PlayerId) -> Result<PlayerSnapshot, StoreError> {
        let snapshot = self.inner.load(player)?;
        self.inner.set_stats(player, snapshot.stats)?;
        Ok(snapshot)
    }

    fn apply_delta(&self, player: PlayerId, expected: u64, delta: &InventoryDelta) -> Result<u64, StoreError> {
        self.inner.apply_delta(player, expected, delta)
    }
}

#[test]
fn test_store_failure_surfaces_without_events() {
    let inner = MemoryStore::new();
    inner.create_player(1, ActorStats::new(50, 5, 3)).unwrap();
    let facade = EconomyFacade::new(shipped_catalog(), ReadOnlyStore { inner }, ScriptedRng::constant(0.0));

    assert!(matches!(
        facade.defeat_creature(1, "Dire Wolf"),
        Err(EngineError::Store(StoreError::Unavailable(_)))
    ));
    assert_eq!(facade.pending_event_count(), 0);
    assert_eq!(facade.store().inner.load(1).unwrap().inventory, Inventory::new());
}

#[test]
fn test_version_conflict_not_retried() {
    let inner = MemoryStore::new();
    inner.create_player(1, ActorStats::new(50, 5, 3)).unwrap();
    grant(&inner, 1, &[("Beast Claw", 3), ("Frayed Hide", 2)], 0);
    let facade = EconomyFacade::new(shipped_catalog(), RacingStore { inner }, ScriptedRng::constant(0.0));

    let result = facade.craft(1, "Campfire", "Claw Dagger");
    assert!(matches!(
        result,
        Err(EngineError::Store(StoreError::VersionConflict { player: 1, .. }))
    ));

    let inventory = facade.store().inner.get_inventory(1).unwrap();
    assert_eq!(inventory.count_item("Beast Claw"), 3);
    assert_eq!(inventory.count_item("Claw Dagger"), 0);
    assert_eq!(facade.pending_event_count(), 0);
}

// ============================================================
// Concurrency
// ============================================================

#[test]
fn test_concurrent_crafts_cannot_overspend() {
    let store = MemoryStore::new();
    store.create_player(1, ActorStats::new(50, 5, 3)).unwrap();
    store.create_player(2, ActorStats::new(50, 5, 3)).unwrap();
    // Enough for exactly three daggers each.
    grant(&store, 1, &[("Beast Claw", 9), ("Frayed Hide", 6)], 0);
    grant(&store, 2, &[("Beast Claw", 9), ("Frayed Hide", 6)], 0);
    let facade = Arc::new(EconomyFacade::new(shipped_catalog(), store, SeededRng::from_seed(1)));

    let successes = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..16)
        .map(|t| {
            let facade = Arc::clone(&facade);
            let successes = Arc::clone(&successes);
            thread::spawn(move || {
                let player = 1 + (t % 2);
                match facade.craft(player, "Campfire", "Claw Dagger") {
                    Ok(_) => {
                        successes.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::Craft(CraftError::InsufficientIngredient { .. })) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(successes.load(Ordering::Relaxed), 6);
    for player in [1, 2] {
        let snapshot = facade.store().load(player).unwrap();
        assert_eq!(snapshot.inventory.count_item("Claw Dagger"), 3);
        assert_eq!(snapshot.inventory.count_item("Beast Claw"), 0);
        assert_eq!(snapshot.inventory.count_item("Frayed Hide"), 0);
    }
    assert_eq!(facade.drain_events().len(), 6);
}

// ============================================================
// Durability
// ============================================================

#[test]
fn test_durable_facade_survives_restart() {
    let path = temp_wal_path("restart");

    {
        let store = DurableStore::open(&path).unwrap();
        store.create_player(3, ActorStats::new(80, 10, 6)).unwrap();
        store.set_skill_level(3, "Power Strike", 4).unwrap();
        let facade = EconomyFacade::new(shipped_catalog(), store, ScriptedRng::constant(0.0));
        facade.defeat_creature(3, "Cave Spider").unwrap();
        facade.defeat_creature(3, "Cave Spider").unwrap();
    }

    let store = DurableStore::open(&path).unwrap();
    let snapshot = store.load(3).unwrap();
    assert_eq!(snapshot.inventory.count_item("Venom Gland"), 2);
    assert_eq!(snapshot.inventory.count_item("Iron Ore"), 2);
    assert_eq!(snapshot.currency, 44);
    assert_eq!(snapshot.skill_level("Power Strike"), Some(4));

    let facade = EconomyFacade::new(shipped_catalog(), store, ScriptedRng::constant(0.0));
    // 80 - 5 = 75 base; 1.5% + 3 * 0.2% = 2.1% -> bonus 1
    let hit = facade.attack(3, "Cave Spider", "Power Strike").unwrap();
    assert_eq!(hit.base, 75);
    assert_eq!(hit.total, 76);

    std::fs::remove_file(&path).ok();
}
