//! # Content Catalog
//!
//! Read-only keyed maps of every static entity: items, creatures, recipes,
//! stations and skills. Built once, validated as a whole, then shared
//! behind an `Arc` for the life of the process.
//!
//! ## File format
//!
//! ```toml
//! [[items]]
//! name = "Beast Claw"
//! rarity = "common"
//! category = "material"
//!
//! [[creatures]]
//! name = "Dire Wolf"
//! hp = 120
//! attack = 40
//! defense = 10
//! drops = [{ item = "Beast Claw", drop_rate = 0.8 }]
//!
//! [[recipes]]
//! name = "Claw Dagger"
//! ingredients = [{ item = "Beast Claw", quantity = 3 }]
//! result = { item = "Claw Dagger", quantity = 1 }
//!
//! [[stations]]
//! name = "Campfire"
//! recipes = ["Claw Dagger"]
//!
//! [[skills]]
//! name = "Power Strike"
//! type = "active"
//! base_effect = 1.5
//! effect_per_level = 0.2
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::combat::{Skill, SkillId};
use crate::crafting::{CraftingGraph, Recipe, RecipeDef, Station};
use crate::error::{ContentError, ContentResult};
use crate::inventory::ItemId;
use crate::item::{Item, ItemCategory};
use crate::loot::{Creature, CreatureId};

/// Raw shape of a content file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContentFile {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    creatures: Vec<Creature>,
    #[serde(default)]
    recipes: Vec<RecipeDef>,
    #[serde(default)]
    stations: Vec<Station>,
    #[serde(default)]
    skills: Vec<Skill>,
}

/// All static game content.
#[derive(Debug, Default)]
pub struct ContentCatalog {
    items: HashMap<ItemId, Item>,
    creatures: HashMap<CreatureId, Creature>,
    skills: HashMap<SkillId, Skill>,
    crafting: CraftingGraph,
}

impl ContentCatalog {
    /// Loads and validates a content file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, otherwise as
    /// [`ContentCatalog::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ContentResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ContentError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let catalog = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "content loaded");
        Ok(catalog)
    }

    /// Parses and validates content from TOML text.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML or unknown fields, and any validation
    /// error from [`ContentCatalog::from_parts`].
    pub fn from_toml_str(text: &str) -> ContentResult<Self> {
        let file: ContentFile = toml::from_str(text).map_err(|e| ContentError::Parse(e.to_string()))?;
        let recipes = file
            .recipes
            .into_iter()
            .map(Recipe::try_from)
            .collect::<ContentResult<Vec<_>>>()?;
        Self::from_parts(file.items, file.creatures, recipes, file.stations, file.skills)
    }

    /// Builds a catalog from already-constructed content.
    ///
    /// Checks run in kind order (items, creatures, recipes, stations,
    /// skills); the first failure is returned.
    ///
    /// # Errors
    ///
    /// `Duplicate` for repeated names, `UnknownReference` for dangling item
    /// or recipe names, `InvalidDropRate` for bad drops, `InvalidRecipe`
    /// for recipe shape violations, `Invalid` for a fragment shared by two
    /// creatures or a skill with `max_level` 0.
    pub fn from_parts(
        items: Vec<Item>,
        creatures: Vec<Creature>,
        recipes: Vec<Recipe>,
        stations: Vec<Station>,
        skills: Vec<Skill>,
    ) -> ContentResult<Self> {
        let mut catalog = Self::default();

        for item in items {
            if catalog.items.contains_key(&item.name) {
                return Err(ContentError::Duplicate { kind: "item", name: item.name });
            }
            catalog.items.insert(item.name.clone(), item);
        }

        let mut fragment_sources: HashMap<&str, &str> = HashMap::new();
        for creature in &creatures {
            creature.validate()?;
            for drop in &creature.drops {
                let item = catalog.require_item(&drop.item, || format!("creature {}", creature.name))?;
                if item.category != ItemCategory::Fragment {
                    continue;
                }
                if let Some(other) = fragment_sources.insert(&drop.item, &creature.name) {
                    return Err(ContentError::Invalid(format!(
                        "fragment {} drops from both {other} and {}",
                        drop.item, creature.name
                    )));
                }
            }
        }
        for creature in creatures {
            if catalog.creatures.contains_key(&creature.name) {
                return Err(ContentError::Duplicate { kind: "creature", name: creature.name });
            }
            catalog.creatures.insert(creature.name.clone(), creature);
        }

        for recipe in recipes {
            for ingredient in recipe.ingredients() {
                catalog.require_item(&ingredient.item, || format!("recipe {}", recipe.name()))?;
            }
            catalog.require_item(&recipe.result().item, || format!("recipe {}", recipe.name()))?;
            catalog.crafting.add_recipe(recipe)?;
        }

        for station in stations {
            catalog.crafting.add_station(station)?;
        }

        for skill in skills {
            if skill.max_level == 0 {
                return Err(ContentError::Invalid(format!("skill {} has max_level 0", skill.name)));
            }
            if catalog.skills.contains_key(&skill.name) {
                return Err(ContentError::Duplicate { kind: "skill", name: skill.name });
            }
            catalog.skills.insert(skill.name.clone(), skill);
        }

        if let Some(cycle) = catalog.crafting.find_cycle() {
            tracing::warn!(cycle = ?cycle, "recipe graph contains a cycle");
        }

        tracing::debug!(
            items = catalog.items.len(),
            creatures = catalog.creatures.len(),
            recipes = catalog.crafting.recipe_count(),
            stations = catalog.crafting.station_count(),
            skills = catalog.skills.len(),
            "content catalog validated"
        );
        Ok(catalog)
    }

    fn require_item(&self, name: &str, context: impl FnOnce() -> String) -> ContentResult<&Item> {
        self.items.get(name).ok_or_else(|| ContentError::UnknownReference {
            context: context(),
            kind: "item",
            name: name.to_owned(),
        })
    }

    /// Looks up an item.
    #[must_use]
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    /// Looks up a creature.
    #[must_use]
    pub fn creature(&self, name: &str) -> Option<&Creature> {
        self.creatures.get(name)
    }

    /// Looks up a recipe.
    #[must_use]
    pub fn recipe(&self, name: &str) -> Option<&Recipe> {
        self.crafting.recipe(name)
    }

    /// Looks up a station.
    #[must_use]
    pub fn station(&self, name: &str) -> Option<&Station> {
        self.crafting.station(name)
    }

    /// Looks up a skill.
    #[must_use]
    pub fn skill(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// All items, in no particular order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// All creatures, in no particular order.
    pub fn creatures(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.values()
    }

    /// All skills, in no particular order.
    pub fn skills(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    /// The recipe and station index.
    #[must_use]
    pub const fn crafting(&self) -> &CraftingGraph {
        &self.crafting
    }
}
