//! # Kitchen Data Model
//!
//! This module defines the stored entities (ingredients, recipes, pantry rows,
//! staples, meal plan entries, shopping list items), the payloads used to
//! mutate them, and the in-memory snapshot the reconciliation engine reads.
//!
//! ## Core Concepts
//!
//! - **Ingredient**: a catalog entry, unique by case-insensitive name
//! - **Recipe line**: one (ingredient, required quantity) pair of a recipe
//! - **Pantry item**: on-hand stock for one ingredient
//! - **Shopping source**: whether a shopping entry was derived or added by hand

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{KitchenError, Result};

pub const DEFAULT_UNIT: &str = "unit";
pub const DEFAULT_CATEGORY: &str = "Divers";
pub const DEFAULT_SLOT: &str = "ANY";
pub const MAX_NAME_LENGTH: usize = 255;

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub unit: String,
}

/// One requirement of a recipe, joined with its ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecipeLine {
    pub ingredient_id: i64,
    pub name: String,
    pub unit: String,
    pub quantity_required: f64,
}

/// A recipe with its requirements in the order they were entered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub instructions: String,
    pub ingredients: Vec<RecipeLine>,
}

/// Current stock for one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PantryItem {
    pub ingredient_id: i64,
    pub name: String,
    pub unit: String,
    pub quantity_available: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeeklyStaple {
    pub ingredient_id: i64,
    pub default_quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MealPlanEntry {
    pub id: i64,
    pub date: NaiveDate,
    pub slot: String,
    pub recipe_id: i64,
}

/// Origin of a shopping list entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShoppingSource {
    /// Produced by the reconciliation engine; replaced on every run
    Derived,
    /// Added by hand; reconciliation leaves it alone
    Manual,
}

impl ShoppingSource {
    /// Tag persisted in the `source` column
    pub fn as_tag(&self) -> &'static str {
        match self {
            ShoppingSource::Derived => "AUTO",
            ShoppingSource::Manual => "MANUAL",
        }
    }

    /// Read a persisted tag. Anything not written by the engine counts as manual.
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("AUTO") {
            ShoppingSource::Derived
        } else {
            ShoppingSource::Manual
        }
    }
}

impl fmt::Display for ShoppingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub id: i64,
    pub ingredient_id: i64,
    pub name: String,
    pub unit: String,
    pub quantity_needed: f64,
    pub is_checked: bool,
    pub source: ShoppingSource,
}

// =============================================================================
// Mutation payloads
// =============================================================================

/// Explicit ingredient creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientDraft {
    pub name: String,
    pub category: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
}

/// One ingredient of a recipe payload, referenced by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeLineDraft {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Recipe create/update payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDraft {
    pub name: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub ingredients: Option<Vec<RecipeLineDraft>>,
}

/// A recipe payload that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecipe {
    pub name: String,
    pub instructions: String,
    pub lines: Vec<ValidRecipeLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecipeLine {
    pub name: String,
    pub unit: String,
    pub quantity: f64,
}

impl RecipeDraft {
    /// Check the payload before anything is persisted
    pub fn validate(&self) -> Result<ValidRecipe> {
        let name = validate_name(&self.name, "recipe name")?;
        let drafts = self
            .ingredients
            .as_ref()
            .ok_or_else(|| KitchenError::Validation("missing ingredient list".to_string()))?;

        let mut lines = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let line_name = validate_name(&draft.name, "ingredient name")?;
            let quantity = validate_quantity(draft.quantity, &line_name)?;
            lines.push(ValidRecipeLine {
                name: line_name,
                unit: normalize_unit(draft.unit.as_deref()),
                quantity,
            });
        }

        Ok(ValidRecipe {
            name,
            instructions: self.instructions.clone().unwrap_or_default(),
            lines,
        })
    }
}

/// Stock addition by ingredient name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantryAddition {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

impl PantryAddition {
    pub fn validate(&self) -> Result<(String, f64, String)> {
        let name = validate_name(&self.name, "ingredient name")?;
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(KitchenError::Validation(format!(
                "quantity for {name} must be a positive number"
            )));
        }
        Ok((name, self.quantity, normalize_unit(self.unit.as_deref())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanDraft {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub slot: Option<String>,
    pub recipe_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealPlanUpdate {
    pub date: Option<NaiveDate>,
    pub slot: Option<String>,
    pub recipe_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualShoppingItem {
    pub ingredient_id: i64,
    pub quantity_needed: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItemUpdate {
    pub quantity_needed: Option<f64>,
    pub is_checked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkCheckedRequest {
    pub item_ids: Vec<i64>,
    pub checked: bool,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Read-only view of the stored state used by reconciliation and scoring
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KitchenSnapshot {
    pub ingredients: HashMap<i64, Ingredient>,
    pub recipes: HashMap<i64, Recipe>,
    /// Pantry quantity by ingredient id
    pub pantry: HashMap<i64, f64>,
    pub staples: Vec<WeeklyStaple>,
    pub meal_plan: Vec<MealPlanEntry>,
}

impl KitchenSnapshot {
    /// Stock on hand for an ingredient, 0 when there is no pantry row
    pub fn stock_of(&self, ingredient_id: i64) -> f64 {
        self.pantry.get(&ingredient_id).copied().unwrap_or(0.0)
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

/// Trim a name and reject blank or overlong values
pub fn validate_name(raw: &str, field: &str) -> Result<String> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(KitchenError::Validation(format!("{field} must not be empty")));
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(KitchenError::Validation(format!(
            "{field} must be at most {MAX_NAME_LENGTH} characters"
        )));
    }

    Ok(trimmed.to_string())
}

/// Quantities are non-negative finite decimals
pub fn validate_quantity(quantity: f64, what: &str) -> Result<f64> {
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(KitchenError::Validation(format!(
            "quantity for {what} must be a non-negative number"
        )));
    }
    Ok(quantity)
}

/// Blank or missing units fall back to the generic count unit
pub fn normalize_unit(unit: Option<&str>) -> String {
    match unit.map(str::trim) {
        Some(u) if !u.is_empty() => u.to_string(),
        _ => DEFAULT_UNIT.to_string(),
    }
}
