//! # Shopping List Reconciliation
//!
//! Aggregates ingredient demand from the weekly staples and the meal plan,
//! nets it against pantry stock and produces the derived shopping list.
//!
//! The computation is pure: it reads a [`KitchenSnapshot`] and returns a
//! [`ReconciliationPlan`]. Persisting the plan (removing the previous derived
//! entries and inserting the new ones in one transaction) is done by
//! [`crate::db::shopping::regenerate_shopping_list`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::model::{KitchenSnapshot, DEFAULT_UNIT};

/// A derived shopping list entry to insert
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedEntry {
    pub ingredient_id: i64,
    pub quantity_needed: f64,
}

/// Report row for an ingredient that was put on the list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedItem {
    pub name: String,
    pub unit: String,
    pub needed: f64,
    pub stock: f64,
    pub added_qty: f64,
}

/// Report row for an ingredient whose demand is already covered by stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub name: String,
    pub unit: String,
    pub needed: f64,
    pub stock: f64,
}

/// Caller feedback returned by a reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub added: Vec<AddedItem>,
    pub skipped: Vec<SkippedItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    pub entries: Vec<DerivedEntry>,
    pub report: ReconciliationReport,
}

/// Sum staple and meal plan demand per ingredient.
///
/// Meal plan entries whose recipe is not in the snapshot contribute nothing.
pub fn accumulate_demand(snapshot: &KitchenSnapshot) -> BTreeMap<i64, f64> {
    let mut demand: BTreeMap<i64, f64> = BTreeMap::new();

    for staple in &snapshot.staples {
        *demand.entry(staple.ingredient_id).or_insert(0.0) += staple.default_quantity;
    }

    for plan in &snapshot.meal_plan {
        let Some(recipe) = snapshot.recipes.get(&plan.recipe_id) else {
            debug!(
                meal_plan_id = plan.id,
                recipe_id = plan.recipe_id,
                "Meal plan entry references an unknown recipe, skipping"
            );
            continue;
        };
        for line in &recipe.ingredients {
            *demand.entry(line.ingredient_id).or_insert(0.0) += line.quantity_required;
        }
    }

    demand
}

/// Compute the derived shopping list for a snapshot
pub fn reconcile(snapshot: &KitchenSnapshot) -> ReconciliationPlan {
    let demand = accumulate_demand(snapshot);

    let mut rows: Vec<(String, i64, String, f64, f64)> = demand
        .into_iter()
        .filter(|(_, needed)| *needed > 0.0)
        .map(|(ingredient_id, needed)| {
            let (name, unit) = match snapshot.ingredients.get(&ingredient_id) {
                Some(ingredient) => (ingredient.name.clone(), ingredient.unit.clone()),
                None => (format!("#{ingredient_id}"), DEFAULT_UNIT.to_string()),
            };
            (name, ingredient_id, unit, needed, snapshot.stock_of(ingredient_id))
        })
        .collect();
    rows.sort_by(|a, b| {
        a.0.to_lowercase()
            .cmp(&b.0.to_lowercase())
            .then(a.1.cmp(&b.1))
    });

    let mut plan = ReconciliationPlan::default();
    for (name, ingredient_id, unit, needed, stock) in rows {
        let deficit = needed - stock;
        trace!(ingredient_id, needed, stock, deficit, "Reconciled ingredient");

        if deficit > 0.0 {
            plan.entries.push(DerivedEntry {
                ingredient_id,
                quantity_needed: deficit,
            });
            plan.report.added.push(AddedItem {
                name,
                unit,
                needed,
                stock,
                added_qty: deficit,
            });
        } else {
            plan.report.skipped.push(SkippedItem {
                name,
                unit,
                needed,
                stock,
            });
        }
    }

    plan
}
