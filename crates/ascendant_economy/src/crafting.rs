//! # Crafting System - Recipe Graph
//!
//! **Single-step crafting with level, cost and ingredient gating**
//!
//! This module implements the crafting resolver with the following guarantees:
//!
//! 1. **Fail fast**: level, then funds, then ingredients in list order; the
//!    first violation is reported
//! 2. **No partial consumption**: every check runs before the delta is built
//! 3. **Pure**: `craft` returns an [`InventoryDelta`] and never touches state
//! 4. **One step per craft**: the engine never resolves transitive chains;
//!    the caller picks each recipe explicitly
//!
//! Cycles across recipes are legal content. [`CraftingGraph::find_cycle`]
//! exists as a load-time diagnostic only.
//!
//! ## Example
//!
//! ```rust
//! use ascendant_economy::crafting::{craft, Crafter, Ingredient, Recipe};
//! use ascendant_economy::Inventory;
//!
//! let recipe = Recipe::new(
//!     "Claw Dagger",
//!     vec![Ingredient::new("Beast Claw", 3), Ingredient::new("Frayed Hide", 2)],
//!     Ingredient::new("Claw Dagger", 1),
//! )
//! .unwrap();
//!
//! let inventory = Inventory::from_items([("Beast Claw", 3), ("Frayed Hide", 2)]);
//! let delta = craft(&recipe, &Crafter::new(1, 0), &inventory).unwrap();
//! assert_eq!(delta.item_change("Claw Dagger"), 1);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ContentError, ContentResult, CraftError};
use crate::inventory::{Inventory, InventoryDelta, ItemId};

/// Unique identifier for a recipe (its catalog name).
pub type RecipeId = String;

/// Unique identifier for a crafting station (its catalog name).
pub type StationId = String;

/// An item and quantity consumed or produced by a recipe.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ingredient {
    /// The item.
    pub item: ItemId,
    /// Quantity, at least 1.
    pub quantity: u32,
}

impl Ingredient {
    /// Creates a new ingredient.
    #[inline]
    #[must_use]
    pub fn new(item: impl Into<ItemId>, quantity: u32) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }
}

fn default_required_level() -> u32 {
    1
}

/// Recipe as written in content files, before validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecipeDef {
    /// Unique name.
    pub name: RecipeId,
    /// Ingredients; repeated items are merged.
    pub ingredients: Vec<Ingredient>,
    /// Produced item.
    pub result: Ingredient,
    /// Minimum crafter level.
    #[serde(default = "default_required_level")]
    pub required_level: u32,
    /// Currency debited per craft.
    #[serde(default)]
    pub crafting_cost: u64,
}

/// A validated crafting recipe.
///
/// Ingredient items are unique, every quantity is at least 1, the result
/// item is not among the ingredients and the required level is at least 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipe {
    name: RecipeId,
    ingredients: Vec<Ingredient>,
    result: Ingredient,
    required_level: u32,
    crafting_cost: u64,
}

impl Recipe {
    /// Creates a recipe with level 1 and no cost.
    ///
    /// Repeated ingredient items are merged by summing their quantities; the
    /// merged entry keeps the position of the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidRecipe` if there are no ingredients, a
    /// quantity is zero, or the result item is also an ingredient.
    pub fn new(
        name: impl Into<RecipeId>,
        ingredients: Vec<Ingredient>,
        result: Ingredient,
    ) -> ContentResult<Self> {
        let name = name.into();
        let invalid = |reason: &str| ContentError::InvalidRecipe {
            recipe: name.clone(),
            reason: reason.to_owned(),
        };

        if ingredients.is_empty() {
            return Err(invalid("recipe must have at least one ingredient"));
        }
        if result.quantity == 0 {
            return Err(invalid("result quantity must be at least 1"));
        }

        let mut merged: Vec<Ingredient> = Vec::with_capacity(ingredients.len());
        for ingredient in ingredients {
            if ingredient.quantity == 0 {
                return Err(invalid(&format!(
                    "ingredient {} has quantity 0",
                    ingredient.item
                )));
            }
            if ingredient.item == result.item {
                return Err(invalid(&format!(
                    "result {} is also an ingredient",
                    result.item
                )));
            }
            match merged.iter_mut().find(|m| m.item == ingredient.item) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .checked_add(ingredient.quantity)
                        .ok_or_else(|| invalid("ingredient quantity overflow"))?;
                }
                None => merged.push(ingredient),
            }
        }

        Ok(Self {
            name,
            ingredients: merged,
            result,
            required_level: 1,
            crafting_cost: 0,
        })
    }

    /// Sets the required level. Levels below 1 are raised to 1.
    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.required_level = level.max(1);
        self
    }

    /// Sets the crafting cost.
    #[must_use]
    pub const fn with_cost(mut self, cost: u64) -> Self {
        self.crafting_cost = cost;
        self
    }

    /// Recipe name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ingredients in list order, without repeated items.
    #[must_use]
    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    /// Produced item and quantity.
    #[must_use]
    pub const fn result(&self) -> &Ingredient {
        &self.result
    }

    /// Minimum crafter level.
    #[must_use]
    pub const fn required_level(&self) -> u32 {
        self.required_level
    }

    /// Currency debited per craft.
    #[must_use]
    pub const fn crafting_cost(&self) -> u64 {
        self.crafting_cost
    }
}

impl TryFrom<RecipeDef> for Recipe {
    type Error = ContentError;

    fn try_from(def: RecipeDef) -> ContentResult<Self> {
        if def.required_level == 0 {
            return Err(ContentError::InvalidRecipe {
                recipe: def.name,
                reason: "required level must be at least 1".to_owned(),
            });
        }
        Ok(Self::new(def.name, def.ingredients, def.result)?
            .with_level(def.required_level)
            .with_cost(def.crafting_cost))
    }
}

/// A crafting station and the recipes it exposes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Unique name.
    pub name: StationId,
    /// Currency paid once to unlock; 0 means always unlocked.
    #[serde(default)]
    pub unlock_cost: u64,
    /// Minimum player level to unlock and use.
    #[serde(default = "default_required_level")]
    pub required_level: u32,
    /// Recipes exposed, by name.
    #[serde(default)]
    pub recipes: Vec<RecipeId>,
}

impl Station {
    /// Creates a free station with no recipes.
    #[must_use]
    pub fn new(name: impl Into<StationId>) -> Self {
        Self {
            name: name.into(),
            unlock_cost: 0,
            required_level: 1,
            recipes: Vec::new(),
        }
    }

    /// Sets the unlock cost and required level.
    #[must_use]
    pub const fn with_unlock(mut self, cost: u64, required_level: u32) -> Self {
        self.unlock_cost = cost;
        self.required_level = required_level;
        self
    }

    /// Exposes a recipe.
    #[must_use]
    pub fn with_recipe(mut self, recipe: impl Into<RecipeId>) -> Self {
        self.recipes.push(recipe.into());
        self
    }

    /// Whether the station needs an explicit unlock.
    #[must_use]
    pub const fn requires_unlock(&self) -> bool {
        self.unlock_cost > 0
    }

    /// Whether a player with the given unlock set may use the station.
    #[must_use]
    pub fn is_unlocked(&self, unlocked: &BTreeSet<StationId>) -> bool {
        !self.requires_unlock() || unlocked.contains(&self.name)
    }

    /// Whether the station exposes `recipe`.
    #[must_use]
    pub fn exposes(&self, recipe: &str) -> bool {
        self.recipes.iter().any(|r| r == recipe)
    }
}

/// What the resolver needs to know about the actor crafting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Crafter {
    /// Character level.
    pub level: u32,
    /// Currency balance.
    pub currency: u64,
}

impl Crafter {
    /// Creates a crafter.
    #[inline]
    #[must_use]
    pub const fn new(level: u32, currency: u64) -> Self {
        Self { level, currency }
    }
}

/// Resolves one craft attempt.
///
/// Checks, in order: level, funds, then each ingredient in list order. On
/// success returns the delta that consumes the ingredients, debits the cost
/// and credits the result. The delta is not applied.
///
/// Station gating is the caller's responsibility; see
/// [`CraftingGraph::eligibility`].
///
/// # Errors
///
/// The first violated requirement.
pub fn craft(
    recipe: &Recipe,
    crafter: &Crafter,
    inventory: &Inventory,
) -> Result<InventoryDelta, CraftError> {
    if crafter.level < recipe.required_level {
        return Err(CraftError::LevelTooLow {
            required: recipe.required_level,
            actual: crafter.level,
        });
    }

    if crafter.currency < recipe.crafting_cost {
        return Err(CraftError::InsufficientFunds {
            required: recipe.crafting_cost,
            available: crafter.currency,
        });
    }

    for ingredient in &recipe.ingredients {
        let available = inventory.count_item(&ingredient.item);
        if available < ingredient.quantity {
            return Err(CraftError::InsufficientIngredient {
                item: ingredient.item.clone(),
                required: ingredient.quantity,
                available,
            });
        }
    }

    let mut delta = InventoryDelta::new();
    for ingredient in &recipe.ingredients {
        delta.debit_item(&ingredient.item, ingredient.quantity);
    }
    delta
        .credit_item(&recipe.result.item, recipe.result.quantity)
        .debit_currency(recipe.crafting_cost);

    tracing::debug!(recipe = %recipe.name, "craft resolved");
    Ok(delta)
}

/// Index over all recipes and stations.
///
/// Maintains reverse lookups from items to the recipes that produce or
/// consume them and from recipes to the stations exposing them.
#[derive(Debug, Default)]
pub struct CraftingGraph {
    /// All recipes indexed by name.
    recipes: HashMap<RecipeId, Recipe>,
    /// All stations indexed by name.
    stations: HashMap<StationId, Station>,
    /// Items mapped to recipes that produce them.
    item_producers: HashMap<ItemId, Vec<RecipeId>>,
    /// Items mapped to recipes that consume them.
    item_consumers: HashMap<ItemId, Vec<RecipeId>>,
    /// Recipes mapped to the stations exposing them.
    exposed_by: HashMap<RecipeId, Vec<StationId>>,
}

impl CraftingGraph {
    /// Creates a new empty crafting graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a recipe to the graph.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Duplicate` if the name is taken.
    pub fn add_recipe(&mut self, recipe: Recipe) -> ContentResult<()> {
        if self.recipes.contains_key(&recipe.name) {
            return Err(ContentError::Duplicate {
                kind: "recipe",
                name: recipe.name,
            });
        }

        for ingredient in &recipe.ingredients {
            self.item_consumers
                .entry(ingredient.item.clone())
                .or_default()
                .push(recipe.name.clone());
        }
        self.item_producers
            .entry(recipe.result.item.clone())
            .or_default()
            .push(recipe.name.clone());

        self.recipes.insert(recipe.name.clone(), recipe);
        Ok(())
    }

    /// Adds a station. Every recipe it exposes must already be present.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the name is taken or a recipe is listed twice,
    /// `UnknownReference` for an unknown recipe.
    pub fn add_station(&mut self, station: Station) -> ContentResult<()> {
        if self.stations.contains_key(&station.name) {
            return Err(ContentError::Duplicate {
                kind: "station",
                name: station.name,
            });
        }

        let mut seen = HashSet::new();
        for recipe in &station.recipes {
            if !self.recipes.contains_key(recipe) {
                return Err(ContentError::UnknownReference {
                    context: format!("station {}", station.name),
                    kind: "recipe",
                    name: recipe.clone(),
                });
            }
            if !seen.insert(recipe.as_str()) {
                return Err(ContentError::Duplicate {
                    kind: "station recipe",
                    name: format!("{}/{recipe}", station.name),
                });
            }
        }

        for recipe in &station.recipes {
            self.exposed_by
                .entry(recipe.clone())
                .or_default()
                .push(station.name.clone());
        }
        self.stations.insert(station.name.clone(), station);
        Ok(())
    }

    /// Gets a recipe by name.
    #[must_use]
    pub fn recipe(&self, name: &str) -> Option<&Recipe> {
        self.recipes.get(name)
    }

    /// Gets a station by name.
    #[must_use]
    pub fn station(&self, name: &str) -> Option<&Station> {
        self.stations.get(name)
    }

    /// Returns all recipes, in no particular order.
    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    /// Returns all stations, in no particular order.
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// Returns the number of recipes.
    #[must_use]
    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    /// Returns the number of stations.
    #[must_use]
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Stations exposing `recipe`, in load order.
    #[must_use]
    pub fn stations_exposing(&self, recipe: &str) -> &[StationId] {
        self.exposed_by.get(recipe).map(Vec::as_slice).unwrap_or_default()
    }

    /// Recipes whose result is `item`.
    #[must_use]
    pub fn producers_of(&self, item: &str) -> &[RecipeId] {
        self.item_producers.get(item).map(Vec::as_slice).unwrap_or_default()
    }

    /// Recipes that consume `item`.
    #[must_use]
    pub fn consumers_of(&self, item: &str) -> &[RecipeId] {
        self.item_consumers.get(item).map(Vec::as_slice).unwrap_or_default()
    }

    /// Station gating check.
    ///
    /// The station must exist and expose the recipe, the player must meet
    /// the station's level and the station must be unlocked.
    ///
    /// # Errors
    ///
    /// `CraftError::RecipeNotEligible` when any condition fails.
    pub fn eligibility(
        &self,
        station: &str,
        recipe: &str,
        level: u32,
        unlocked: &BTreeSet<StationId>,
    ) -> Result<(), CraftError> {
        let not_eligible = || CraftError::RecipeNotEligible {
            recipe: recipe.to_owned(),
            station: station.to_owned(),
        };

        let Some(entry) = self.stations.get(station) else {
            return Err(not_eligible());
        };
        if !entry.exposes(recipe) {
            tracing::debug!(station, recipe, "recipe not exposed by station");
            return Err(not_eligible());
        }
        if level < entry.required_level {
            tracing::debug!(station, level, required = entry.required_level, "station level too high");
            return Err(not_eligible());
        }
        if !entry.is_unlocked(unlocked) {
            tracing::debug!(station, "station locked");
            return Err(not_eligible());
        }
        Ok(())
    }

    /// Recipes at `station` the crafter could craft right now, in the
    /// station's listed order.
    ///
    /// Only the resolver's checks apply; station gating is separate.
    #[must_use]
    pub fn craftable_at(
        &self,
        station: &str,
        crafter: &Crafter,
        inventory: &Inventory,
    ) -> Vec<&Recipe> {
        let Some(entry) = self.stations.get(station) else {
            return Vec::new();
        };
        entry
            .recipes
            .iter()
            .filter_map(|name| self.recipes.get(name))
            .filter(|recipe| craft(recipe, crafter, inventory).is_ok())
            .collect()
    }

    /// Finds one recipe cycle, if any.
    ///
    /// Recipe A links to recipe B when A's result is one of B's
    /// ingredients. The returned path starts and ends with the same recipe.
    /// Traversal runs in name order so the result is stable across loads.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<RecipeId>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        let mut names: Vec<&str> = self.recipes.keys().map(String::as_str).collect();
        names.sort_unstable();

        for start in names {
            if !visited.contains(start) {
                if let Some(cycle) = self.dfs_find_cycle(start, &mut visited, &mut rec_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    /// DFS helper for cycle detection.
    fn dfs_find_cycle<'a>(
        &'a self,
        recipe: &'a str,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<RecipeId>> {
        visited.insert(recipe);
        rec_stack.insert(recipe);
        path.push(recipe);

        if let Some(entry) = self.recipes.get(recipe) {
            let mut consumers: Vec<&str> = self
                .consumers_of(&entry.result.item)
                .iter()
                .map(String::as_str)
                .collect();
            consumers.sort_unstable();

            for consumer in consumers {
                if !visited.contains(consumer) {
                    if let Some(cycle) = self.dfs_find_cycle(consumer, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(consumer) {
                    let start = path.iter().position(|&name| name == consumer).unwrap_or(0);
                    let mut cycle: Vec<RecipeId> = path[start..].iter().map(|&s| s.to_owned()).collect();
                    cycle.push(consumer.to_owned());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(recipe);
        None
    }
}
