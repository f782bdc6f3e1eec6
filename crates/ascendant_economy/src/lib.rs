//! # ASCENDANT Economy System
//!
//! Server-authoritative resolution of loot drops, crafting and combat
//! damage for the ASCENDANT action RPG.
//!
//! ## Design Principles
//!
//! 1. **Pure resolvers** - Loot, crafting and damage read snapshots and return values or deltas; they never touch storage
//! 2. **Fixed-point percentages** - Skill effects are u64 micro-units, never floats
//! 3. **Atomic commits** - The facade applies a whole delta or nothing, one player at a time
//! 4. **External configuration** - All balance data lives in TOML files
//!
//! ## Thread Safety
//!
//! [`EconomyFacade`] is `Send + Sync`. Requests for the same player are
//! serialized; requests for different players run in parallel.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ascendant_economy::{ActorStats, ContentCatalog, EconomyFacade, MemoryStore, SeededRng};
//!
//! let catalog = ContentCatalog::from_toml_str(r#"
//!     [[items]]
//!     name = "Beast Claw"
//!     category = "material"
//!
//!     [[creatures]]
//!     name = "Dire Wolf"
//!     hp = 120
//!     attack = 40
//!     defense = 10
//!     drops = [{ item = "Beast Claw", drop_rate = 1.0 }]
//! "#).unwrap();
//!
//! let store = MemoryStore::new();
//! store.create_player(7, ActorStats::new(50, 5, 1)).unwrap();
//!
//! let facade = EconomyFacade::new(Arc::new(catalog), store, SeededRng::from_seed(1));
//! let outcome = facade.defeat_creature(7, "Dire Wolf").unwrap();
//! assert_eq!(outcome.drops.len(), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod catalog;
pub mod combat;
pub mod config;
pub mod crafting;
pub mod error;
pub mod facade;
pub mod fixed_point;
pub mod inventory;
pub mod item;
pub mod loot;
pub mod rng;
pub mod store;
pub mod wal;

pub use catalog::ContentCatalog;
pub use combat::{compute_damage, resolve_damage, ActivePassive, ActorStats, DamageBreakdown, Skill, SkillType};
pub use config::EngineConfig;
pub use crafting::{craft, Crafter, CraftingGraph, Ingredient, Recipe, RecipeId, Station, StationId};
pub use error::{
    ContentError, CraftError, DeltaError, EngineError, EngineResult, StoreError, UnlockError,
};
pub use facade::{CraftOutcome, DefeatOutcome, EconomyEvent, EconomyFacade};
pub use fixed_point::FixedPoint;
pub use inventory::{Inventory, InventoryDelta, ItemId};
pub use item::{Item, ItemCategory, Rarity};
pub use loot::{resolve_drops, Creature, ItemDrop, LootDrop, LootStatistics};
pub use rng::{RandomSource, ScriptedRng, SeededRng};
pub use store::{ConfiguredStore, MemoryStore, PlayerId, PlayerSnapshot, StateStore};
pub use wal::{DurableStore, WalOperation, WriteAheadLog};
