//! Weekly staples, the meal plan, and cooking a planned meal.

use chrono::Local;
use sqlx::PgPool;
use tracing::info;

use crate::errors::{KitchenError, Result};
use crate::model::{validate_quantity, MealPlanDraft, MealPlanEntry, MealPlanUpdate, WeeklyStaple, DEFAULT_SLOT};
use crate::stock::{plan_consumption, StockChange};

use super::catalog::fetch_ingredient;
use super::recipes::{fetch_recipe_lines, recipe_exists};
use super::{apply_stock_changes, load_pantry_map};

fn normalize_slot(slot: Option<&str>) -> String {
    match slot.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => DEFAULT_SLOT.to_string(),
    }
}

/// Create or replace the staple quantity of an ingredient
pub async fn upsert_staple(pool: &PgPool, staple: &WeeklyStaple) -> Result<WeeklyStaple> {
    validate_quantity(staple.default_quantity, "staple")?;
    let mut conn = pool.acquire().await?;
    fetch_ingredient(&mut conn, staple.ingredient_id).await?;

    let saved = sqlx::query_as::<_, WeeklyStaple>(
        "INSERT INTO weekly_staples (ingredient_id, default_quantity) VALUES ($1, $2)
         ON CONFLICT (ingredient_id) DO UPDATE SET default_quantity = EXCLUDED.default_quantity
         RETURNING ingredient_id, default_quantity",
    )
    .bind(staple.ingredient_id)
    .bind(staple.default_quantity)
    .fetch_one(&mut *conn)
    .await?;

    Ok(saved)
}

pub async fn list_staples(pool: &PgPool) -> Result<Vec<WeeklyStaple>> {
    let staples = sqlx::query_as::<_, WeeklyStaple>(
        "SELECT ingredient_id, default_quantity FROM weekly_staples ORDER BY ingredient_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(staples)
}

pub async fn delete_staple(pool: &PgPool, ingredient_id: i64) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM weekly_staples WHERE ingredient_id = $1")
        .bind(ingredient_id)
        .execute(pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(KitchenError::NotFound(format!(
            "no staple for ingredient {ingredient_id}"
        )));
    }
    Ok(())
}

/// Schedule a recipe; date defaults to today and slot to `ANY`
pub async fn schedule_meal(pool: &PgPool, draft: &MealPlanDraft) -> Result<MealPlanEntry> {
    let mut conn = pool.acquire().await?;
    if !recipe_exists(&mut conn, draft.recipe_id).await? {
        return Err(KitchenError::not_found("recipe", draft.recipe_id));
    }

    let date = draft.date.unwrap_or_else(|| Local::now().date_naive());
    let entry = sqlx::query_as::<_, MealPlanEntry>(
        "INSERT INTO meal_plans (date, slot, recipe_id) VALUES ($1, $2, $3)
         RETURNING id, date, slot, recipe_id",
    )
    .bind(date)
    .bind(normalize_slot(draft.slot.as_deref()))
    .bind(draft.recipe_id)
    .fetch_one(&mut *conn)
    .await?;

    info!(meal_plan_id = entry.id, recipe_id = entry.recipe_id, date = %entry.date, "Scheduled meal");
    Ok(entry)
}

pub async fn update_meal_plan(pool: &PgPool, id: i64, update: &MealPlanUpdate) -> Result<MealPlanEntry> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, MealPlanEntry>(
        "SELECT id, date, slot, recipe_id FROM meal_plans WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| KitchenError::not_found("meal plan entry", id))?;

    let recipe_id = update.recipe_id.unwrap_or(current.recipe_id);
    if recipe_id != current.recipe_id && !recipe_exists(&mut tx, recipe_id).await? {
        return Err(KitchenError::not_found("recipe", recipe_id));
    }
    let slot = match update.slot.as_deref() {
        Some(slot) => normalize_slot(Some(slot)),
        None => current.slot,
    };

    let entry = sqlx::query_as::<_, MealPlanEntry>(
        "UPDATE meal_plans SET date = $2, slot = $3, recipe_id = $4 WHERE id = $1
         RETURNING id, date, slot, recipe_id",
    )
    .bind(id)
    .bind(update.date.unwrap_or(current.date))
    .bind(slot)
    .bind(recipe_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(entry)
}

pub async fn remove_meal_plan(pool: &PgPool, id: i64) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM meal_plans WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(KitchenError::not_found("meal plan entry", id));
    }
    Ok(())
}

/// Planned meals by date, then insertion order
pub async fn list_meal_plan(pool: &PgPool) -> Result<Vec<MealPlanEntry>> {
    let entries = sqlx::query_as::<_, MealPlanEntry>(
        "SELECT id, date, slot, recipe_id FROM meal_plans ORDER BY date, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Consume a planned meal's ingredients from the pantry and drop the entry.
///
/// Returns the pantry changes that were applied.
pub async fn cook_meal(pool: &PgPool, meal_plan_id: i64) -> Result<Vec<StockChange>> {
    let mut tx = pool.begin().await?;

    let entry = sqlx::query_as::<_, MealPlanEntry>(
        "SELECT id, date, slot, recipe_id FROM meal_plans WHERE id = $1 FOR UPDATE",
    )
    .bind(meal_plan_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| KitchenError::not_found("meal plan entry", meal_plan_id))?;

    let requirements = fetch_recipe_lines(&mut tx, entry.recipe_id).await?;
    let pantry = load_pantry_map(&mut tx).await?;
    let changes = plan_consumption(&pantry, &requirements);

    apply_stock_changes(&mut tx, &changes).await?;
    sqlx::query("DELETE FROM meal_plans WHERE id = $1")
        .bind(meal_plan_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        meal_plan_id,
        recipe_id = entry.recipe_id,
        pantry_changes = changes.len(),
        "Cooked meal"
    );
    Ok(changes)
}
