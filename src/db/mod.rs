//! # Kitchen Store
//!
//! PostgreSQL persistence for the catalog, recipes, pantry, staples, meal plan
//! and shopping list. Every operation takes the pool explicitly; the ones that
//! must be atomic (reconciliation, cooking, checkout, bulk pantry additions)
//! run inside a single transaction that rolls back when dropped.

use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::errors::Result;
use crate::model::{KitchenSnapshot, MealPlanEntry, WeeklyStaple};
use crate::stock::StockChange;

pub mod catalog;
pub mod pantry;
pub mod planning;
pub mod recipes;
pub mod shopping;

pub use catalog::*;
pub use pantry::*;
pub use planning::*;
pub use recipes::*;
pub use shopping::*;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS ingredients (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT 'Divers',
        unit TEXT NOT NULL DEFAULT 'unit'
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS ingredients_name_lower_idx ON ingredients (lower(name))",
    "CREATE TABLE IF NOT EXISTS recipes (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        instructions TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS recipe_ingredients (
        recipe_id BIGINT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
        ingredient_id BIGINT NOT NULL REFERENCES ingredients(id),
        quantity_required DOUBLE PRECISION NOT NULL CHECK (quantity_required >= 0),
        position INTEGER NOT NULL,
        PRIMARY KEY (recipe_id, ingredient_id)
    )",
    "CREATE TABLE IF NOT EXISTS pantry (
        ingredient_id BIGINT PRIMARY KEY REFERENCES ingredients(id),
        quantity_available DOUBLE PRECISION NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS weekly_staples (
        ingredient_id BIGINT PRIMARY KEY REFERENCES ingredients(id),
        default_quantity DOUBLE PRECISION NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS meal_plans (
        id BIGSERIAL PRIMARY KEY,
        date DATE NOT NULL DEFAULT CURRENT_DATE,
        slot TEXT NOT NULL DEFAULT 'ANY',
        recipe_id BIGINT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS shopping_list (
        id BIGSERIAL PRIMARY KEY,
        ingredient_id BIGINT NOT NULL REFERENCES ingredients(id),
        quantity_needed DOUBLE PRECISION NOT NULL,
        is_checked BOOLEAN NOT NULL DEFAULT FALSE,
        source TEXT NOT NULL DEFAULT 'MANUAL'
    )",
    "CREATE INDEX IF NOT EXISTS shopping_list_source_idx ON shopping_list (source)",
];

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Database schema initialized successfully");
    Ok(())
}

/// Pantry quantity by ingredient id
pub(crate) async fn load_pantry_map(conn: &mut PgConnection) -> Result<HashMap<i64, f64>> {
    let rows: Vec<(i64, f64)> =
        sqlx::query_as("SELECT ingredient_id, quantity_available FROM pantry")
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows.into_iter().collect())
}

/// Read everything the reconciliation engine needs
pub async fn load_snapshot(conn: &mut PgConnection) -> Result<KitchenSnapshot> {
    let ingredients = catalog::load_ingredient_map(conn).await?;
    let recipes = recipes::load_recipes(conn).await?;
    let pantry = load_pantry_map(conn).await?;

    let staples = sqlx::query_as::<_, WeeklyStaple>(
        "SELECT ingredient_id, default_quantity FROM weekly_staples ORDER BY ingredient_id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let meal_plan = sqlx::query_as::<_, MealPlanEntry>(
        "SELECT id, date, slot, recipe_id FROM meal_plans ORDER BY date, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    debug!(
        ingredients = ingredients.len(),
        recipes = recipes.len(),
        staples = staples.len(),
        planned = meal_plan.len(),
        "Loaded kitchen snapshot"
    );

    Ok(KitchenSnapshot {
        ingredients,
        recipes,
        pantry,
        staples,
        meal_plan,
    })
}

/// Apply planned pantry mutations on an open connection or transaction
pub(crate) async fn apply_stock_changes(conn: &mut PgConnection, changes: &[StockChange]) -> Result<()> {
    for change in changes {
        match change {
            StockChange::Set {
                ingredient_id,
                quantity,
            } => {
                sqlx::query(
                    "INSERT INTO pantry (ingredient_id, quantity_available) VALUES ($1, $2)
                     ON CONFLICT (ingredient_id) DO UPDATE SET quantity_available = EXCLUDED.quantity_available",
                )
                .bind(ingredient_id)
                .bind(quantity)
                .execute(&mut *conn)
                .await?;
            }
            StockChange::Remove { ingredient_id } => {
                sqlx::query("DELETE FROM pantry WHERE ingredient_id = $1")
                    .bind(ingredient_id)
                    .execute(&mut *conn)
                    .await?;
            }
        }
    }
    Ok(())
}
