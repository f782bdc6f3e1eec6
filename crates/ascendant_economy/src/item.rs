//! # Item Definitions
//!
//! Items are static content: created once when the catalog loads and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::inventory::ItemId;

/// Rarity tier for items and creatures.
///
/// Ordered: `Common < Uncommon < Rare < Legendary < Mythic < Ascended`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Rarity {
    /// Common items (gray).
    #[default]
    Common = 0,
    /// Uncommon items (green).
    Uncommon = 1,
    /// Rare items (blue).
    Rare = 2,
    /// Legendary items (orange).
    Legendary = 3,
    /// Mythic items (red).
    Mythic = 4,
    /// Ascended items (white) - endgame tier.
    Ascended = 5,
}

impl Rarity {
    /// All tiers, lowest first.
    pub const ALL: [Self; 6] = [
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::Legendary,
        Self::Mythic,
        Self::Ascended,
    ];

    /// Converts from u8 to Rarity. Out-of-range values map to `Ascended`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Common,
            1 => Self::Uncommon,
            2 => Self::Rare,
            3 => Self::Legendary,
            4 => Self::Mythic,
            _ => Self::Ascended,
        }
    }

    /// Whether a drop of this tier deserves a broadcast.
    #[inline]
    #[must_use]
    pub const fn is_notable(self) -> bool {
        self as u8 >= Self::Legendary as u8
    }
}

/// What an item is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// Crafting input.
    Material,
    /// Wearable or wieldable gear.
    Equipment,
    /// Boss-unique drop, typically a high-tier ingredient.
    Fragment,
}

/// An item definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique name.
    pub name: ItemId,
    /// Rarity tier.
    #[serde(default)]
    pub rarity: Rarity,
    /// Category.
    pub category: ItemCategory,
}

impl Item {
    /// Creates a new item definition.
    #[must_use]
    pub fn new(name: impl Into<ItemId>, rarity: Rarity, category: ItemCategory) -> Self {
        Self {
            name: name.into(),
            rarity,
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_ordering() {
        for pair in Rarity::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Rarity::from_u8(200), Rarity::Ascended);
    }

    #[test]
    fn test_notable_starts_at_legendary() {
        assert!(!Rarity::Rare.is_notable());
        assert!(Rarity::Legendary.is_notable());
        assert!(Rarity::Ascended.is_notable());
    }
}
