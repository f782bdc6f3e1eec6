//! # State Store
//!
//! The engine's only mutable state: one [`PlayerSnapshot`] per player.
//!
//! ## Optimistic concurrency
//!
//! Every snapshot carries a `version`. Writers hand back the version they
//! read; if another writer committed in between, the store refuses with
//! `StoreError::VersionConflict` instead of merging. Two stale copies of
//! the same state can therefore never both be spent.
//!
//! Conflicts are surfaced, never retried here.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::combat::{ActorStats, SkillId};
use crate::crafting::{Crafter, StationId};
use crate::error::{DeltaError, StoreError, StoreResult};
use crate::inventory::{apply_currency, Inventory, InventoryDelta};
use crate::wal::DurableStore;

/// Unique identifier for a player.
pub type PlayerId = u64;

/// Everything the engine knows about one player at one version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Player ID.
    pub player_id: PlayerId,
    /// Bumped on every committed change.
    pub version: u64,
    /// Combat stats.
    pub stats: ActorStats,
    /// Currency balance.
    pub currency: u64,
    /// Item holdings.
    pub inventory: Inventory,
    /// Stations unlocked by payment.
    pub unlocked_stations: BTreeSet<StationId>,
    /// Learned skills and their trained levels.
    pub skills: BTreeMap<SkillId, u32>,
}

impl PlayerSnapshot {
    /// A fresh player at version 0 with nothing held.
    #[must_use]
    pub fn new(player_id: PlayerId, stats: ActorStats) -> Self {
        Self {
            player_id,
            version: 0,
            stats,
            currency: 0,
            inventory: Inventory::new(),
            unlocked_stations: BTreeSet::new(),
            skills: BTreeMap::new(),
        }
    }

    /// Level and balance as seen by the craft resolver.
    #[must_use]
    pub const fn crafter(&self) -> Crafter {
        Crafter::new(self.stats.level, self.currency)
    }

    /// Trained level of `skill`, if learned.
    #[must_use]
    pub fn skill_level(&self, skill: &str) -> Option<u32> {
        self.skills.get(skill).copied()
    }

    /// Returns the snapshot that results from applying `delta`, at the next
    /// version. `self` is never modified.
    ///
    /// # Errors
    ///
    /// The first invariant the delta would break: item quantities first,
    /// then the currency balance.
    pub fn with_delta(&self, delta: &InventoryDelta) -> Result<Self, DeltaError> {
        let mut next = self.clone();
        next.inventory.apply(delta)?;
        next.currency = apply_currency(self.currency, delta.currency())?;
        next.unlocked_stations
            .extend(delta.unlocks().map(str::to_owned));
        next.version = self.version.wrapping_add(1);
        Ok(next)
    }
}

/// Per-player state storage.
///
/// Implementations must apply each delta atomically per player.
pub trait StateStore: Send + Sync {
    /// Reads the current snapshot of a player.
    ///
    /// # Errors
    ///
    /// `PlayerNotFound` if absent, `Unavailable` on backend failure.
    fn load(&self, player: PlayerId) -> StoreResult<PlayerSnapshot>;

    /// Reads a player's inventory.
    ///
    /// # Errors
    ///
    /// As [`StateStore::load`].
    fn get_inventory(&self, player: PlayerId) -> StoreResult<Inventory> {
        Ok(self.load(player)?.inventory)
    }

    /// Reads a player's combat stats.
    ///
    /// # Errors
    ///
    /// As [`StateStore::load`].
    fn get_actor_stats(&self, player: PlayerId) -> StoreResult<ActorStats> {
        Ok(self.load(player)?.stats)
    }

    /// Applies `delta` if the stored version still equals `expected_version`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// `VersionConflict` on a stale version, `Constraint` if the delta would
    /// break an invariant. Nothing changes on error.
    fn apply_delta(
        &self,
        player: PlayerId,
        expected_version: u64,
        delta: &InventoryDelta,
    ) -> StoreResult<u64>;
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn load(&self, player: PlayerId) -> StoreResult<PlayerSnapshot> {
        (**self).load(player)
    }

    fn get_inventory(&self, player: PlayerId) -> StoreResult<Inventory> {
        (**self).get_inventory(player)
    }

    fn get_actor_stats(&self, player: PlayerId) -> StoreResult<ActorStats> {
        (**self).get_actor_stats(player)
    }

    fn apply_delta(
        &self,
        player: PlayerId,
        expected_version: u64,
        delta: &InventoryDelta,
    ) -> StoreResult<u64> {
        (**self).apply_delta(player, expected_version, delta)
    }
}

/// In-memory reference store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    players: RwLock<HashMap<PlayerId, PlayerSnapshot>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new player.
    ///
    /// # Errors
    ///
    /// `PlayerExists` if the ID is taken.
    pub fn create_player(&self, player: PlayerId, stats: ActorStats) -> StoreResult<PlayerSnapshot> {
        self.insert_with(PlayerSnapshot::new(player, stats), |_| Ok(()))
    }

    /// Replaces a player's combat stats. Bumps the version.
    ///
    /// # Errors
    ///
    /// `PlayerNotFound` if absent.
    pub fn set_stats(&self, player: PlayerId, stats: ActorStats) -> StoreResult<u64> {
        self.update_with(player, None, |current| Ok(with_stats(current, stats)), |_| Ok(()))
    }

    /// Sets the trained level of a skill, learning it if new. Bumps the
    /// version.
    ///
    /// # Errors
    ///
    /// `PlayerNotFound` if absent.
    pub fn set_skill_level(&self, player: PlayerId, skill: &str, level: u32) -> StoreResult<u64> {
        self.update_with(
            player,
            None,
            |current| Ok(with_skill(current, skill, level)),
            |_| Ok(()),
        )
    }

    /// Number of players stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    /// Returns true if no players are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    /// All snapshots, ordered by player ID.
    #[must_use]
    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        let mut all: Vec<PlayerSnapshot> = self.players.read().values().cloned().collect();
        all.sort_by_key(|s| s.player_id);
        all
    }

    /// Runs `f` over all snapshots while holding the write lock, so no
    /// writer can commit until it returns.
    pub(crate) fn with_exclusive<R>(&self, f: impl FnOnce(&[PlayerSnapshot]) -> R) -> R {
        let players = self.players.write();
        let mut all: Vec<PlayerSnapshot> = players.values().cloned().collect();
        all.sort_by_key(|s| s.player_id);
        f(&all)
    }

    /// Inserts or overwrites a snapshot verbatim.
    pub(crate) fn put(&self, snapshot: PlayerSnapshot) {
        self.players.write().insert(snapshot.player_id, snapshot);
    }

    /// Inserts a new snapshot after `log` accepts it, under the write lock.
    pub(crate) fn insert_with<L>(&self, snapshot: PlayerSnapshot, log: L) -> StoreResult<PlayerSnapshot>
    where
        L: FnOnce(&PlayerSnapshot) -> StoreResult<()>,
    {
        let mut players = self.players.write();
        if players.contains_key(&snapshot.player_id) {
            return Err(StoreError::PlayerExists(snapshot.player_id));
        }
        log(&snapshot)?;
        players.insert(snapshot.player_id, snapshot.clone());
        Ok(snapshot)
    }

    /// Read-validate-write for one player under the write lock.
    ///
    /// `build` derives the next snapshot from the current one; `log` sees it
    /// before it becomes visible and can veto it. With `expected` set, a
    /// stale version is refused before `build` runs.
    pub(crate) fn update_with<B, L>(
        &self,
        player: PlayerId,
        expected: Option<u64>,
        build: B,
        log: L,
    ) -> StoreResult<u64>
    where
        B: FnOnce(&PlayerSnapshot) -> StoreResult<PlayerSnapshot>,
        L: FnOnce(&PlayerSnapshot) -> StoreResult<()>,
    {
        let mut players = self.players.write();
        let current = players
            .get(&player)
            .ok_or(StoreError::PlayerNotFound(player))?;

        if let Some(expected) = expected {
            if current.version != expected {
                return Err(StoreError::VersionConflict {
                    player,
                    expected,
                    actual: current.version,
                });
            }
        }

        let next = build(current)?;
        log(&next)?;
        let version = next.version;
        players.insert(player, next);
        Ok(version)
    }
}

impl StateStore for MemoryStore {
    fn load(&self, player: PlayerId) -> StoreResult<PlayerSnapshot> {
        self.players
            .read()
            .get(&player)
            .cloned()
            .ok_or(StoreError::PlayerNotFound(player))
    }

    fn apply_delta(
        &self,
        player: PlayerId,
        expected_version: u64,
        delta: &InventoryDelta,
    ) -> StoreResult<u64> {
        self.update_with(
            player,
            Some(expected_version),
            |current| Ok(current.with_delta(delta)?),
            |_| Ok(()),
        )
    }
}

/// The store an [`EngineConfig`](crate::EngineConfig) selects: durable when
/// a WAL path is configured, in-memory otherwise.
pub enum ConfiguredStore {
    /// State lives only in this process.
    Memory(MemoryStore),
    /// State is logged to a write-ahead log.
    Durable(DurableStore),
}

impl ConfiguredStore {
    /// Returns true if mutations are logged.
    #[must_use]
    pub const fn is_durable(&self) -> bool {
        matches!(self, Self::Durable(_))
    }

    /// Registers a new player.
    ///
    /// # Errors
    ///
    /// `PlayerExists` if the ID is taken, `Unavailable` if logging fails.
    pub fn create_player(&self, player: PlayerId, stats: ActorStats) -> StoreResult<PlayerSnapshot> {
        match self {
            Self::Memory(store) => store.create_player(player, stats),
            Self::Durable(store) => store.create_player(player, stats),
        }
    }

    /// Replaces a player's combat stats.
    ///
    /// # Errors
    ///
    /// `PlayerNotFound` if absent, `Unavailable` if logging fails.
    pub fn set_stats(&self, player: PlayerId, stats: ActorStats) -> StoreResult<u64> {
        match self {
            Self::Memory(store) => store.set_stats(player, stats),
            Self::Durable(store) => store.set_stats(player, stats),
        }
    }

    /// Sets the trained level of a skill, learning it if new.
    ///
    /// # Errors
    ///
    /// `PlayerNotFound` if absent, `Unavailable` if logging fails.
    pub fn set_skill_level(&self, player: PlayerId, skill: &str, level: u32) -> StoreResult<u64> {
        match self {
            Self::Memory(store) => store.set_skill_level(player, skill, level),
            Self::Durable(store) => store.set_skill_level(player, skill, level),
        }
    }

    /// Number of players stored.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Memory(store) => store.len(),
            Self::Durable(store) => store.len(),
        }
    }

    /// Returns true if no players are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All snapshots, ordered by player ID.
    #[must_use]
    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        match self {
            Self::Memory(store) => store.snapshots(),
            Self::Durable(store) => store.snapshots(),
        }
    }
}

impl StateStore for ConfiguredStore {
    fn load(&self, player: PlayerId) -> StoreResult<PlayerSnapshot> {
        match self {
            Self::Memory(store) => store.load(player),
            Self::Durable(store) => store.load(player),
        }
    }

    fn apply_delta(
        &self,
        player: PlayerId,
        expected_version: u64,
        delta: &InventoryDelta,
    ) -> StoreResult<u64> {
        match self {
            Self::Memory(store) => store.apply_delta(player, expected_version, delta),
            Self::Durable(store) => store.apply_delta(player, expected_version, delta),
        }
    }
}

/// `current` with new stats at the next version.
pub(crate) fn with_stats(current: &PlayerSnapshot, stats: ActorStats) -> PlayerSnapshot {
    let mut next = current.clone();
    next.stats = stats;
    next.version = current.version.wrapping_add(1);
    next
}

/// `current` with `skill` at `level` at the next version.
pub(crate) fn with_skill(current: &PlayerSnapshot, skill: &str, level: u32) -> PlayerSnapshot {
    let mut next = current.clone();
    next.skills.insert(skill.to_owned(), level);
    next.version = current.version.wrapping_add(1);
    next
}
