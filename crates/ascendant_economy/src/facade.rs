//! # Economy Facade
//!
//! The single entry point for state-changing requests. Each operation:
//!
//! ```text
//! caller ──> facade ──> load snapshot ──> resolver ──> delta ──> store.apply_delta
//!                          (per-player lock held throughout)        │
//!                                                                   ▼
//!                                                            queue events
//! ```
//!
//! Resolvers never see the store. The facade commits only when every check
//! passes; any error leaves the store untouched and emits no event.
//!
//! Read-validate-apply is serialized per player with a `parking_lot`
//! mutex; different players never contend. The store's version check
//! still guards against writers that bypass the facade.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::ContentCatalog;
use crate::combat::{resolve_damage, ActivePassive, ActorStats, DamageBreakdown, Skill};
use crate::crafting::{self, RecipeId, StationId};
use crate::error::{EngineError, EngineResult, UnlockError};
use crate::inventory::{InventoryDelta, ItemId};
use crate::item::Rarity;
use crate::loot::{resolve_drops, CreatureId, ItemDrop};
use crate::rng::RandomSource;
use crate::store::{PlayerId, StateStore};

/// Something that happened, for whoever renders or broadcasts it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EconomyEvent {
    /// A creature was defeated and its loot credited.
    CreatureDefeated {
        /// The victor.
        player: PlayerId,
        /// The creature.
        creature: CreatureId,
        /// Items credited.
        drops: Vec<ItemDrop>,
        /// Currency credited.
        currency: u64,
    },
    /// An item was crafted.
    ItemCrafted {
        /// The crafter.
        player: PlayerId,
        /// Recipe used.
        recipe: RecipeId,
        /// Item produced.
        item: ItemId,
        /// Quantity produced.
        quantity: u32,
    },
    /// A station was unlocked.
    StationUnlocked {
        /// The buyer.
        player: PlayerId,
        /// The station.
        station: StationId,
    },
    /// A Legendary-or-better item dropped.
    RareDrop {
        /// The lucky player.
        player: PlayerId,
        /// The item.
        item: ItemId,
        /// Its rarity.
        rarity: Rarity,
    },
}

/// Result of [`EconomyFacade::defeat_creature`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefeatOutcome {
    /// Items credited, in loot-table order.
    pub drops: Vec<ItemDrop>,
    /// Currency credited.
    pub currency: u64,
    /// Player version after the commit.
    pub version: u64,
}

/// Result of [`EconomyFacade::craft`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CraftOutcome {
    /// The delta that was committed.
    pub delta: InventoryDelta,
    /// Player version after the commit.
    pub version: u64,
}

/// Composes the resolvers against a state store.
pub struct EconomyFacade<S: StateStore> {
    /// Static content.
    catalog: Arc<ContentCatalog>,
    /// Player state.
    store: S,
    /// Shared random stream.
    rng: Mutex<Box<dyn RandomSource + Send>>,
    /// One lock per player with an operation in flight.
    player_locks: Mutex<HashMap<PlayerId, Arc<Mutex<()>>>>,
    /// Events waiting to be drained.
    event_buffer: Mutex<Vec<EconomyEvent>>,
}

impl<S: StateStore> EconomyFacade<S> {
    /// Creates a facade.
    pub fn new(
        catalog: Arc<ContentCatalog>,
        store: S,
        rng: impl RandomSource + Send + 'static,
    ) -> Self {
        Self {
            catalog,
            store,
            rng: Mutex::new(Box::new(rng)),
            player_locks: Mutex::new(HashMap::new()),
            event_buffer: Mutex::new(Vec::with_capacity(256)),
        }
    }

    /// The content catalog.
    #[must_use]
    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Runs `f` holding `player`'s lock. The entry is removed again once no
    /// other caller holds or waits on it, so the map only tracks players
    /// with an operation in flight.
    fn with_player_lock<R>(&self, player: PlayerId, f: impl FnOnce() -> R) -> R {
        let lock = Arc::clone(self.player_locks.lock().entry(player).or_default());
        let result = {
            let _guard = lock.lock();
            f()
        };

        // Clones are only taken under the map lock: map + ours means idle
        let mut locks = self.player_locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&player);
        }
        result
    }

    fn push_events(&self, events: impl IntoIterator<Item = EconomyEvent>) {
        self.event_buffer.lock().extend(events);
    }

    // ========================================================================
    // Loot
    // ========================================================================

    /// Rolls `creature`'s loot for `player` and credits the drops and the
    /// currency reward.
    ///
    /// # Errors
    ///
    /// `UnknownContent` for an unknown creature, `Store` if the load or
    /// commit fails. Nothing is credited on error.
    pub fn defeat_creature(&self, player: PlayerId, creature: &str) -> EngineResult<DefeatOutcome> {
        let creature = self.catalog.creature(creature).ok_or_else(|| EngineError::UnknownContent {
            kind: "creature",
            name: creature.to_owned(),
        })?;

        self.with_player_lock(player, || -> EngineResult<DefeatOutcome> {
            let snapshot = self.store.load(player)?;
            let drops = resolve_drops(creature, &mut *self.rng.lock());

            let mut delta = InventoryDelta::new();
            for drop in &drops {
                delta.credit_item(&drop.item, drop.quantity);
            }
            delta.credit_currency(creature.currency_reward);

            let version = self.store.apply_delta(player, snapshot.version, &delta)?;

            let mut events = vec![EconomyEvent::CreatureDefeated {
                player,
                creature: creature.name.clone(),
                drops: drops.clone(),
                currency: creature.currency_reward,
            }];
            for drop in &drops {
                let rarity = self.catalog.item(&drop.item).map_or(Rarity::Common, |item| item.rarity);
                if rarity.is_notable() {
                    events.push(EconomyEvent::RareDrop {
                        player,
                        item: drop.item.clone(),
                        rarity,
                    });
                }
            }
            self.push_events(events);

            tracing::info!(
                player,
                creature = %creature.name,
                drops = drops.len(),
                currency = creature.currency_reward,
                version,
                "creature defeated"
            );

            Ok(DefeatOutcome {
                drops,
                currency: creature.currency_reward,
                version,
            })
        })
    }

    // ========================================================================
    // Crafting
    // ========================================================================

    /// Crafts `recipe` at `station` for `player`.
    ///
    /// # Errors
    ///
    /// `UnknownContent` for unknown names; `Craft(RecipeNotEligible)` if the
    /// station does not expose the recipe, is locked, or is above the
    /// player's level; any other `Craft` error from the resolver; `Store`
    /// if the load or commit fails.
    pub fn craft(&self, player: PlayerId, station: &str, recipe: &str) -> EngineResult<CraftOutcome> {
        let entry = self.catalog.recipe(recipe).ok_or_else(|| EngineError::UnknownContent {
            kind: "recipe",
            name: recipe.to_owned(),
        })?;
        if self.catalog.station(station).is_none() {
            return Err(EngineError::UnknownContent {
                kind: "station",
                name: station.to_owned(),
            });
        }

        self.with_player_lock(player, || -> EngineResult<CraftOutcome> {
            let snapshot = self.store.load(player)?;
            self.catalog.crafting().eligibility(
                station,
                recipe,
                snapshot.stats.level,
                &snapshot.unlocked_stations,
            )?;
            let delta = crafting::craft(entry, &snapshot.crafter(), &snapshot.inventory)?;
            let version = self.store.apply_delta(player, snapshot.version, &delta)?;

            let result = entry.result();
            self.push_events([EconomyEvent::ItemCrafted {
                player,
                recipe: entry.name().to_owned(),
                item: result.item.clone(),
                quantity: result.quantity,
            }]);

            tracing::info!(player, station, recipe, version, "item crafted");
            Ok(CraftOutcome { delta, version })
        })
    }

    /// Pays to unlock `station` for `player`.
    ///
    /// Returns the player version after the commit.
    ///
    /// # Errors
    ///
    /// `UnknownContent` for an unknown station; `Unlock(AlreadyUnlocked)`
    /// if it is free or already bought; `Unlock(LevelTooLow)` or
    /// `Unlock(InsufficientFunds)` otherwise; `Store` on store failure.
    pub fn unlock_station(&self, player: PlayerId, station: &str) -> EngineResult<u64> {
        let entry = self.catalog.station(station).ok_or_else(|| EngineError::UnknownContent {
            kind: "station",
            name: station.to_owned(),
        })?;

        self.with_player_lock(player, || -> EngineResult<u64> {
            let snapshot = self.store.load(player)?;
            if entry.is_unlocked(&snapshot.unlocked_stations) {
                return Err(UnlockError::AlreadyUnlocked(entry.name.clone()).into());
            }
            if snapshot.stats.level < entry.required_level {
                return Err(UnlockError::LevelTooLow {
                    required: entry.required_level,
                    actual: snapshot.stats.level,
                }
                .into());
            }
            if snapshot.currency < entry.unlock_cost {
                return Err(UnlockError::InsufficientFunds {
                    required: entry.unlock_cost,
                    available: snapshot.currency,
                }
                .into());
            }

            let mut delta = InventoryDelta::new();
            delta.debit_currency(entry.unlock_cost).unlock_station(&entry.name);
            let version = self.store.apply_delta(player, snapshot.version, &delta)?;

            self.push_events([EconomyEvent::StationUnlocked {
                player,
                station: entry.name.clone(),
            }]);

            tracing::info!(player, station, cost = entry.unlock_cost, version, "station unlocked");
            Ok(version)
        })
    }

    // ========================================================================
    // Combat
    // ========================================================================

    /// Resolves one attack by `player` on `creature` with `skill`.
    ///
    /// Uses the player's stored stats, their trained level of `skill` and
    /// every other passive they have learned. Changes no state.
    ///
    /// # Errors
    ///
    /// `UnknownContent` for unknown names, `SkillNotLearned` if the player
    /// lacks `skill`, `Store` if the load fails.
    pub fn attack(&self, player: PlayerId, creature: &str, skill: &str) -> EngineResult<DamageBreakdown> {
        let defender = self.catalog.creature(creature).ok_or_else(|| EngineError::UnknownContent {
            kind: "creature",
            name: creature.to_owned(),
        })?;
        let skill_def = self.lookup_skill(skill)?;

        let snapshot = self.store.load(player)?;
        let level = snapshot
            .skill_level(skill)
            .ok_or_else(|| EngineError::SkillNotLearned(skill.to_owned()))?;

        let mut passives = Vec::new();
        for (name, &trained) in &snapshot.skills {
            if name == skill {
                continue;
            }
            match self.catalog.skill(name) {
                Some(learned) if learned.is_passive() => passives.push(ActivePassive {
                    skill: learned,
                    level: trained,
                }),
                Some(_) => {}
                None => tracing::warn!(player, skill = %name, "learned skill missing from catalog"),
            }
        }

        let breakdown = resolve_damage(
            &snapshot.stats,
            &defender.combat_stats(),
            skill_def,
            level,
            &passives,
            &mut *self.rng.lock(),
        );
        tracing::debug!(player, creature, skill, damage = breakdown.total, "attack resolved");
        Ok(breakdown)
    }

    /// Computes damage from explicit stats and skill names.
    ///
    /// `passives` pairs skill names with trained levels; non-passive skills
    /// among them are ignored.
    ///
    /// # Errors
    ///
    /// `UnknownContent` for any unknown skill name.
    pub fn compute_damage(
        &self,
        attacker: &ActorStats,
        defender: &ActorStats,
        skill: &str,
        level: u32,
        passives: &[(&str, u32)],
    ) -> EngineResult<u64> {
        let skill_def = self.lookup_skill(skill)?;
        let passives = passives
            .iter()
            .map(|&(name, trained)| {
                Ok(ActivePassive {
                    skill: self.lookup_skill(name)?,
                    level: trained,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let breakdown = resolve_damage(attacker, defender, skill_def, level, &passives, &mut *self.rng.lock());
        Ok(breakdown.total)
    }

    fn lookup_skill(&self, name: &str) -> EngineResult<&Skill> {
        self.catalog.skill(name).ok_or_else(|| EngineError::UnknownContent {
            kind: "skill",
            name: name.to_owned(),
        })
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Drains all pending events, oldest first.
    pub fn drain_events(&self) -> Vec<EconomyEvent> {
        let mut events = self.event_buffer.lock();
        std::mem::take(&mut *events)
    }

    /// Peeks at pending event count.
    #[must_use]
    pub fn pending_event_count(&self) -> usize {
        self.event_buffer.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{Skill, SkillType};
    use crate::crafting::{Ingredient, Recipe, Station};
    use crate::error::{CraftError, StoreError};
    use crate::fixed_point::FixedPoint;
    use crate::item::{Item, ItemCategory};
    use crate::loot::{Creature, LootDrop};
    use crate::rng::ScriptedRng;
    use crate::store::MemoryStore;

    fn catalog() -> Arc<ContentCatalog> {
        let items = vec![
            Item::new("Beast Claw", Rarity::Common, ItemCategory::Material),
            Item::new("Frayed Hide", Rarity::Common, ItemCategory::Material),
            Item::new("Claw Dagger", Rarity::Uncommon, ItemCategory::Equipment),
            Item::new("Ember Fragment", Rarity::Legendary, ItemCategory::Fragment),
        ];
        let creatures = vec![
            Creature::new("Dire Wolf", 120, 40, 10)
                .with_currency_reward(15)
                .with_drop(LootDrop::new("Beast Claw", 1.0).unwrap())
                .unwrap()
                .with_drop(LootDrop::new("Frayed Hide", 0.5).unwrap())
                .unwrap(),
            Creature::new("Ember Tyrant", 5_000, 300, 50)
                .as_boss()
                .with_drop(LootDrop::new("Ember Fragment", 0.1).unwrap())
                .unwrap(),
        ];
        let recipes = vec![Recipe::new(
            "Claw Dagger",
            vec![Ingredient::new("Beast Claw", 3), Ingredient::new("Frayed Hide", 2)],
            Ingredient::new("Claw Dagger", 1),
        )
        .unwrap()];
        let stations = vec![
            Station::new("Campfire").with_recipe("Claw Dagger"),
            Station::new("Forge").with_unlock(100, 5).with_recipe("Claw Dagger"),
        ];
        let skills = vec![
            Skill::new(
                "Power Strike",
                SkillType::Active,
                FixedPoint::from_parts(1, 500_000),
                FixedPoint::from_parts(0, 200_000),
            ),
            Skill::new("Fury", SkillType::Passive, FixedPoint::from_whole(10), FixedPoint::ZERO),
        ];
        Arc::new(ContentCatalog::from_parts(items, creatures, recipes, stations, skills).unwrap())
    }

    fn facade(draws: Vec<f64>) -> EconomyFacade<MemoryStore> {
        let store = MemoryStore::new();
        store.create_player(1, ActorStats::new(500, 20, 3)).unwrap();
        EconomyFacade::new(catalog(), store, ScriptedRng::new(draws))
    }

    fn give(facade: &EconomyFacade<MemoryStore>, items: &[(&str, u32)], currency: u64) {
        let snapshot = facade.store().load(1).unwrap();
        let mut delta = InventoryDelta::new();
        for &(item, count) in items {
            delta.credit_item(item, count);
        }
        delta.credit_currency(currency);
        facade.store().apply_delta(1, snapshot.version, &delta).unwrap();
    }

    #[test]
    fn test_defeat_credits_drops_and_currency() {
        // Beast Claw rolls 0.3 (< 1.0), Frayed Hide rolls 0.7 (>= 0.5)
        let facade = facade(vec![0.3, 0.7]);
        let outcome = facade.defeat_creature(1, "Dire Wolf").unwrap();

        assert_eq!(outcome.drops.len(), 1);
        assert_eq!(outcome.currency, 15);

        let snapshot = facade.store().load(1).unwrap();
        assert_eq!(snapshot.inventory.count_item("Beast Claw"), 1);
        assert_eq!(snapshot.inventory.count_item("Frayed Hide"), 0);
        assert_eq!(snapshot.currency, 15);
        assert_eq!(snapshot.version, outcome.version);

        let events = facade.drain_events();
        assert!(matches!(events.as_slice(), [EconomyEvent::CreatureDefeated { currency: 15, .. }]));
        assert_eq!(facade.pending_event_count(), 0);
    }

    #[test]
    fn test_legendary_drop_emits_rare_event() {
        let facade = facade(vec![0.05]);
        facade.defeat_creature(1, "Ember Tyrant").unwrap();

        let events = facade.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            EconomyEvent::RareDrop { rarity: Rarity::Legendary, item, .. } if item == "Ember Fragment"
        ));
    }

    #[test]
    fn test_craft_commits_delta() {
        let facade = facade(vec![0.0]);
        give(&facade, &[("Beast Claw", 4), ("Frayed Hide", 2)], 0);

        let outcome = facade.craft(1, "Campfire", "Claw Dagger").unwrap();
        assert_eq!(outcome.delta.item_change("Claw Dagger"), 1);

        let inventory = facade.store().get_inventory(1).unwrap();
        assert_eq!(inventory.count_item("Beast Claw"), 1);
        assert_eq!(inventory.count_item("Frayed Hide"), 0);
        assert_eq!(inventory.count_item("Claw Dagger"), 1);
        assert!(matches!(
            facade.drain_events().as_slice(),
            [EconomyEvent::ItemCrafted { quantity: 1, .. }]
        ));
    }

    #[test]
    fn test_failed_craft_leaves_store_untouched() {
        let facade = facade(vec![0.0]);
        give(&facade, &[("Beast Claw", 3)], 0);
        let before = facade.store().load(1).unwrap();

        let result = facade.craft(1, "Campfire", "Claw Dagger");
        assert!(matches!(
            result,
            Err(EngineError::Craft(CraftError::InsufficientIngredient { ref item, .. })) if item == "Frayed Hide"
        ));
        assert_eq!(facade.store().load(1).unwrap(), before);
        assert_eq!(facade.pending_event_count(), 0);
    }

    #[test]
    fn test_locked_station_not_eligible() {
        let facade = facade(vec![0.0]);
        give(&facade, &[("Beast Claw", 3), ("Frayed Hide", 2)], 0);

        assert!(matches!(
            facade.craft(1, "Forge", "Claw Dagger"),
            Err(EngineError::Craft(CraftError::RecipeNotEligible { .. }))
        ));
        assert!(matches!(
            facade.craft(1, "Altar", "Claw Dagger"),
            Err(EngineError::UnknownContent { kind: "station", .. })
        ));
    }

    #[test]
    fn test_unlock_station_flow() {
        let facade = facade(vec![0.0]);

        // Level 3 < 5
        assert!(matches!(
            facade.unlock_station(1, "Forge"),
            Err(EngineError::Unlock(UnlockError::LevelTooLow { required: 5, actual: 3 }))
        ));

        let snapshot = facade.store().load(1).unwrap();
        facade.store().set_stats(1, ActorStats { level: 5, ..snapshot.stats }).unwrap();
        assert!(matches!(
            facade.unlock_station(1, "Forge"),
            Err(EngineError::Unlock(UnlockError::InsufficientFunds { required: 100, available: 0 }))
        ));

        give(&facade, &[("Beast Claw", 3), ("Frayed Hide", 2)], 120);
        facade.unlock_station(1, "Forge").unwrap();
        assert_eq!(facade.store().load(1).unwrap().currency, 20);
        assert!(matches!(
            facade.unlock_station(1, "Forge"),
            Err(EngineError::Unlock(UnlockError::AlreadyUnlocked(_)))
        ));
        assert!(matches!(
            facade.unlock_station(1, "Campfire"),
            Err(EngineError::Unlock(UnlockError::AlreadyUnlocked(_)))
        ));

        facade.craft(1, "Forge", "Claw Dagger").unwrap();
    }

    #[test]
    fn test_attack_uses_learned_passives() {
        let facade = facade(vec![0.0]);
        facade.store().set_skill_level(1, "Power Strike", 1).unwrap();

        // attack 500 vs Dire Wolf defense 10: base 490, 1.5% -> bonus 7
        let plain = facade.attack(1, "Dire Wolf", "Power Strike").unwrap();
        assert_eq!(plain.base, 490);
        assert_eq!(plain.total, 497);

        facade.store().set_skill_level(1, "Fury", 1).unwrap();
        // 11.5% of 490 = 56.35 -> 56
        let buffed = facade.attack(1, "Dire Wolf", "Power Strike").unwrap();
        assert_eq!(buffed.bonus, 56);
        assert_eq!(buffed.total, 546);

        assert!(matches!(
            facade.attack(1, "Dire Wolf", "Meteor"),
            Err(EngineError::UnknownContent { kind: "skill", .. })
        ));
    }

    #[test]
    fn test_attack_caps_trained_level() {
        let facade = facade(vec![0.0]);
        facade.store().set_skill_level(1, "Power Strike", 10).unwrap();
        let at_cap = facade.attack(1, "Dire Wolf", "Power Strike").unwrap();

        facade.store().set_skill_level(1, "Power Strike", 25).unwrap();
        let over_cap = facade.attack(1, "Dire Wolf", "Power Strike").unwrap();
        assert_eq!(over_cap, at_cap);
        // 3.3% of 490 = 16.17
        assert_eq!(at_cap.bonus, 16);
    }

    #[test]
    fn test_attack_requires_learned_skill() {
        let facade = facade(vec![0.0]);
        assert!(matches!(
            facade.attack(1, "Dire Wolf", "Power Strike"),
            Err(EngineError::SkillNotLearned(_))
        ));
    }

    #[test]
    fn test_compute_damage_by_name() {
        let facade = facade(vec![0.0]);
        let damage = facade
            .compute_damage(
                &ActorStats::new(500, 0, 10),
                &ActorStats::new(0, 50, 10),
                "Power Strike",
                1,
                &[],
            )
            .unwrap();
        assert_eq!(damage, 456);

        assert!(facade
            .compute_damage(&ActorStats::default(), &ActorStats::default(), "Power Strike", 1, &[("Rage", 1)])
            .is_err());
    }

    #[test]
    fn test_player_locks_released_after_use() {
        let facade = facade(vec![0.0]);
        for player in 100..200 {
            assert!(facade.defeat_creature(player, "Dire Wolf").is_err());
            assert!(facade.unlock_station(player, "Forge").is_err());
        }
        facade.defeat_creature(1, "Dire Wolf").unwrap();
        assert!(facade.player_locks.lock().is_empty());
    }

    #[test]
    fn test_unknown_player() {
        let facade = facade(vec![0.0]);
        assert!(matches!(
            facade.defeat_creature(9, "Dire Wolf"),
            Err(EngineError::Store(StoreError::PlayerNotFound(9)))
        ));
        assert_eq!(facade.pending_event_count(), 0);
    }
}
