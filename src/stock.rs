//! # Stock Movements
//!
//! Pure planning of pantry changes for the two stock-moving operations:
//!
//! - **cooking** consumes a recipe's requirements from the pantry
//! - **checkout** moves checked shopping list entries into the pantry
//!
//! Both return a list of [`StockChange`] that the store applies inside the
//! same transaction as the rest of the operation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::model::{RecipeLine, ShoppingListItem};

/// One pantry row mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StockChange {
    /// Create or overwrite the row with this quantity
    Set { ingredient_id: i64, quantity: f64 },
    /// Delete the row
    Remove { ingredient_id: i64 },
}

impl StockChange {
    pub fn ingredient_id(&self) -> i64 {
        match self {
            StockChange::Set { ingredient_id, .. } | StockChange::Remove { ingredient_id } => {
                *ingredient_id
            }
        }
    }
}

/// Pantry changes for cooking a recipe.
///
/// Ingredients without a pantry row are left alone; a row that would end
/// at or below zero is removed instead of being stored.
pub fn plan_consumption(pantry: &HashMap<i64, f64>, requirements: &[RecipeLine]) -> Vec<StockChange> {
    let mut remaining: BTreeMap<i64, f64> = BTreeMap::new();

    for line in requirements {
        if !pantry.contains_key(&line.ingredient_id) {
            continue;
        }
        let current = remaining
            .entry(line.ingredient_id)
            .or_insert_with(|| pantry[&line.ingredient_id]);
        *current -= line.quantity_required;
    }

    remaining
        .into_iter()
        .map(|(ingredient_id, quantity)| {
            if quantity <= 0.0 {
                StockChange::Remove { ingredient_id }
            } else {
                StockChange::Set {
                    ingredient_id,
                    quantity,
                }
            }
        })
        .collect()
}

/// Pantry changes for checking out the shopping list.
///
/// Every checked entry adds its `quantity_needed` to stock; unchecked
/// entries are ignored.
pub fn plan_restock(pantry: &HashMap<i64, f64>, items: &[ShoppingListItem]) -> Vec<StockChange> {
    let mut restocked: BTreeMap<i64, f64> = BTreeMap::new();

    for item in items.iter().filter(|item| item.is_checked) {
        let current = restocked
            .entry(item.ingredient_id)
            .or_insert_with(|| pantry.get(&item.ingredient_id).copied().unwrap_or(0.0));
        *current += item.quantity_needed;
    }

    restocked
        .into_iter()
        .map(|(ingredient_id, quantity)| {
            if quantity <= 0.0 {
                StockChange::Remove { ingredient_id }
            } else {
                StockChange::Set {
                    ingredient_id,
                    quantity,
                }
            }
        })
        .collect()
}
