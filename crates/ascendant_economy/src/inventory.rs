//! # Inventory System
//!
//! A player's inventory is a map from item name to a non-negative quantity.
//! Absent entries mean zero; entries that reach zero are removed, so two
//! inventories holding the same items always compare equal.
//!
//! Changes are expressed as an [`InventoryDelta`] and applied all-or-nothing:
//! every entry is validated before the first one is written.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::DeltaError;

/// Unique identifier for an item type (its catalog name).
pub type ItemId = String;

/// A player's item holdings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    items: BTreeMap<ItemId, u32>,
}

impl Inventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an inventory from `(item, quantity)` pairs. Repeated items
    /// accumulate; zero quantities are dropped.
    #[must_use]
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<ItemId>,
    {
        let mut inventory = Self::new();
        for (item, count) in items {
            let slot = inventory.items.entry(item.into()).or_insert(0);
            *slot = slot.saturating_add(count);
        }
        inventory.items.retain(|_, count| *count > 0);
        inventory
    }

    /// Counts a specific item. Absent items count as zero.
    #[must_use]
    pub fn count_item(&self, item: &str) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }

    /// Number of distinct items held.
    #[must_use]
    pub fn distinct_items(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates `(item, quantity)` in item-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.items.iter().map(|(item, count)| (item.as_str(), *count))
    }

    /// Adds items.
    ///
    /// # Errors
    ///
    /// Returns `DeltaError::Overflow` if the quantity would exceed `u32::MAX`.
    pub fn add(&mut self, item: &str, count: u32) -> Result<(), DeltaError> {
        if count == 0 {
            return Ok(());
        }
        let current = self.count_item(item);
        let next = current.checked_add(count).ok_or(DeltaError::Overflow)?;
        self.items.insert(item.to_owned(), next);
        Ok(())
    }

    /// Removes items.
    ///
    /// # Errors
    ///
    /// Returns `DeltaError::NegativeQuantity` if fewer than `count` are held;
    /// the inventory is unchanged in that case.
    pub fn remove(&mut self, item: &str, count: u32) -> Result<(), DeltaError> {
        let current = self.count_item(item);
        if current < count {
            return Err(DeltaError::NegativeQuantity {
                item: item.to_owned(),
                current,
                change: -i64::from(count),
            });
        }
        self.set(item, current - count);
        Ok(())
    }

    /// Applies a delta's item changes atomically.
    ///
    /// Currency and unlocks are not part of an inventory; the store applies
    /// those alongside.
    ///
    /// # Errors
    ///
    /// Returns the first violation in item-name order; the inventory is
    /// unchanged on error.
    pub fn apply(&mut self, delta: &InventoryDelta) -> Result<(), DeltaError> {
        let mut staged = Vec::with_capacity(delta.items.len());
        for (item, &change) in &delta.items {
            let current = self.count_item(item);
            let next = i64::from(current)
                .checked_add(change)
                .ok_or(DeltaError::Overflow)?;
            if next < 0 {
                return Err(DeltaError::NegativeQuantity {
                    item: item.clone(),
                    current,
                    change,
                });
            }
            let next = u32::try_from(next).map_err(|_| DeltaError::Overflow)?;
            staged.push((item.as_str(), next));
        }

        for (item, next) in staged {
            self.set(item, next);
        }
        Ok(())
    }

    fn set(&mut self, item: &str, count: u32) {
        if count == 0 {
            self.items.remove(item);
        } else {
            self.items.insert(item.to_owned(), count);
        }
    }
}

/// Applies a signed change to a currency balance.
///
/// # Errors
///
/// `NegativeCurrency` if the balance would drop below zero, `Overflow` if it
/// would exceed `u64::MAX`.
pub fn apply_currency(balance: u64, change: i128) -> Result<u64, DeltaError> {
    let next = i128::from(balance)
        .checked_add(change)
        .ok_or(DeltaError::Overflow)?;
    if next < 0 {
        return Err(DeltaError::NegativeCurrency {
            current: balance,
            change,
        });
    }
    u64::try_from(next).map_err(|_| DeltaError::Overflow)
}

/// A set of signed changes to one player's state, applied atomically.
///
/// Item changes accumulate per item: crediting 3 and debiting 1 of the same
/// item records a single `+2`. Entries that net to zero disappear. The
/// currency change is held in `i128`, so any number of full-range `u64`
/// credits and debits is recorded exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDelta {
    items: BTreeMap<ItemId, i64>,
    currency: i128,
    unlocks: BTreeSet<String>,
}

impl InventoryDelta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a gain of `count` items.
    pub fn credit_item(&mut self, item: &str, count: u32) -> &mut Self {
        self.change_item(item, i64::from(count))
    }

    /// Records a loss of `count` items.
    pub fn debit_item(&mut self, item: &str, count: u32) -> &mut Self {
        self.change_item(item, -i64::from(count))
    }

    /// Records a currency gain.
    pub fn credit_currency(&mut self, amount: u64) -> &mut Self {
        self.currency = self.currency.saturating_add(i128::from(amount));
        self
    }

    /// Records a currency loss.
    pub fn debit_currency(&mut self, amount: u64) -> &mut Self {
        self.currency = self.currency.saturating_sub(i128::from(amount));
        self
    }

    /// Records a station unlock.
    pub fn unlock_station(&mut self, station: &str) -> &mut Self {
        self.unlocks.insert(station.to_owned());
        self
    }

    /// Signed change recorded for `item` (zero if untouched).
    #[must_use]
    pub fn item_change(&self, item: &str) -> i64 {
        self.items.get(item).copied().unwrap_or(0)
    }

    /// Iterates `(item, signed change)` in item-name order.
    pub fn item_changes(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.items.iter().map(|(item, change)| (item.as_str(), *change))
    }

    /// Signed currency change.
    #[must_use]
    pub const fn currency(&self) -> i128 {
        self.currency
    }

    /// Stations this delta unlocks.
    pub fn unlocks(&self) -> impl Iterator<Item = &str> + '_ {
        self.unlocks.iter().map(String::as_str)
    }

    /// Returns true if applying this delta would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.currency == 0 && self.unlocks.is_empty()
    }

    pub(crate) fn change_currency(&mut self, change: i128) -> &mut Self {
        self.currency = self.currency.saturating_add(change);
        self
    }

    pub(crate) fn change_item(&mut self, item: &str, change: i64) -> &mut Self {
        if change == 0 {
            return self;
        }
        let slot = self.items.entry(item.to_owned()).or_insert(0);
        *slot = slot.saturating_add(change);
        if *slot == 0 {
            self.items.remove(item);
        }
        self
    }
}
