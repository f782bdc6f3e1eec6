//! # Economy Error Types
//!
//! Domain errors (`CraftError`, `UnlockError`) are recoverable by the caller
//! and map one-to-one to user-facing messages. Store errors are the
//! infrastructure category and are never folded into domain errors.

use thiserror::Error;

use crate::inventory::ItemId;

/// Why a craft request was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CraftError {
    /// The crafter is below the recipe's required level.
    #[error("level too low: recipe requires level {required}, crafter is level {actual}")]
    LevelTooLow {
        /// Level the recipe requires.
        required: u32,
        /// Level the crafter has.
        actual: u32,
    },

    /// The crafter cannot pay the crafting cost.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Crafting cost.
        required: u64,
        /// Current balance.
        available: u64,
    },

    /// An ingredient is under-supplied. Reports the first shortfall in
    /// ingredient-list order.
    #[error("insufficient ingredient {item}: need {required}, have {available}")]
    InsufficientIngredient {
        /// The short ingredient.
        item: ItemId,
        /// Quantity the recipe consumes.
        required: u32,
        /// Quantity in the inventory.
        available: u32,
    },

    /// The recipe is not craftable at the requested station for this player.
    #[error("recipe {recipe} is not eligible at station {station}")]
    RecipeNotEligible {
        /// Requested recipe.
        recipe: String,
        /// Requested station.
        station: String,
    },
}

/// Why a station unlock was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnlockError {
    /// The player is below the station's required level.
    #[error("level too low: station requires level {required}, player is level {actual}")]
    LevelTooLow {
        /// Level the station requires.
        required: u32,
        /// Level the player has.
        actual: u32,
    },

    /// The player cannot pay the unlock cost.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Unlock cost.
        required: u64,
        /// Current balance.
        available: u64,
    },

    /// The station is already unlocked.
    #[error("station already unlocked: {0}")]
    AlreadyUnlocked(String),
}

/// A delta that would break a player-state invariant if applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    /// An item quantity would drop below zero.
    #[error("item {item} would go negative: have {current}, change {change}")]
    NegativeQuantity {
        /// The offending item.
        item: ItemId,
        /// Quantity before the delta.
        current: u32,
        /// Signed change requested.
        change: i64,
    },

    /// The currency balance would drop below zero.
    #[error("currency would go negative: have {current}, change {change}")]
    NegativeCurrency {
        /// Balance before the delta.
        current: u64,
        /// Signed change requested.
        change: i128,
    },

    /// A quantity or balance would exceed its integer range.
    #[error("arithmetic overflow applying delta")]
    Overflow,
}

/// Infrastructure failures of the state store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record exists for the player.
    #[error("player not found: {0}")]
    PlayerNotFound(u64),

    /// A record already exists for the player.
    #[error("player already exists: {0}")]
    PlayerExists(u64),

    /// The caller's snapshot is stale; another writer committed first.
    #[error("version conflict for player {player}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Player whose record changed.
        player: u64,
        /// Version the caller read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// The delta violates a store constraint.
    #[error("constraint violation: {0}")]
    Constraint(#[from] DeltaError),

    /// The backing storage could not be reached or written.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Persisted data failed an integrity check.
    #[error("store corrupt: {0}")]
    Corrupt(String),
}

/// Content catalog and configuration load failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContentError {
    /// The file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// OS error message.
        message: String,
    },

    /// The TOML did not parse into the expected shape.
    #[error("failed to parse content: {0}")]
    Parse(String),

    /// Two entries of the same kind share a name.
    #[error("duplicate {kind}: {name}")]
    Duplicate {
        /// Entity kind.
        kind: &'static str,
        /// Duplicated name.
        name: String,
    },

    /// A reference points at an unknown entry.
    #[error("{context} references unknown {kind}: {name}")]
    UnknownReference {
        /// Where the reference appears.
        context: String,
        /// Entity kind referenced.
        kind: &'static str,
        /// Missing name.
        name: String,
    },

    /// A drop rate outside `(0, 1]`.
    #[error("invalid drop rate {rate} for {item}")]
    InvalidDropRate {
        /// Item the drop grants.
        item: ItemId,
        /// Configured rate.
        rate: f64,
    },

    /// A recipe broke a structural rule.
    #[error("invalid recipe {recipe}: {reason}")]
    InvalidRecipe {
        /// Recipe name.
        recipe: String,
        /// What was wrong.
        reason: String,
    },

    /// Any other invalid value.
    #[error("invalid content: {0}")]
    Invalid(String),
}

/// Errors surfaced by the economy facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Craft rejected by domain rules.
    #[error(transparent)]
    Craft(#[from] CraftError),

    /// Station unlock rejected by domain rules.
    #[error(transparent)]
    Unlock(#[from] UnlockError),

    /// The state store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A name did not resolve in the content catalog.
    #[error("unknown {kind}: {name}")]
    UnknownContent {
        /// Entity kind.
        kind: &'static str,
        /// Requested name.
        name: String,
    },

    /// The player has not learned the requested skill.
    #[error("skill not learned: {0}")]
    SkillNotLearned(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for content loading.
pub type ContentResult<T> = Result<T, ContentError>;

/// Result type for facade operations.
pub type EngineResult<T> = Result<T, EngineError>;
