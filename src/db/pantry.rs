//! Pantry stock.

use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::errors::{KitchenError, Result};
use crate::model::{PantryAddition, PantryItem, DEFAULT_CATEGORY};

use super::catalog::{ensure_ingredient, fetch_ingredient};

const PANTRY_COLUMNS: &str = "SELECT p.ingredient_id, i.name, i.unit, p.quantity_available
     FROM pantry p
     JOIN ingredients i ON i.id = p.ingredient_id";

async fn fetch_pantry_item(conn: &mut PgConnection, ingredient_id: i64) -> Result<Option<PantryItem>> {
    let item = sqlx::query_as::<_, PantryItem>(&format!("{PANTRY_COLUMNS} WHERE p.ingredient_id = $1"))
        .bind(ingredient_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(item)
}

async fn add_stock(conn: &mut PgConnection, name: &str, quantity: f64, unit: &str) -> Result<PantryItem> {
    let (ingredient, _) = ensure_ingredient(conn, name, unit, DEFAULT_CATEGORY).await?;

    sqlx::query(
        "INSERT INTO pantry (ingredient_id, quantity_available) VALUES ($1, $2)
         ON CONFLICT (ingredient_id)
         DO UPDATE SET quantity_available = pantry.quantity_available + EXCLUDED.quantity_available",
    )
    .bind(ingredient.id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    fetch_pantry_item(conn, ingredient.id)
        .await?
        .ok_or_else(|| KitchenError::Persistence(format!("pantry row for {} missing after insert", ingredient.name)))
}

/// Add stock by ingredient name, creating the ingredient if needed
pub async fn add_to_pantry(pool: &PgPool, addition: &PantryAddition) -> Result<PantryItem> {
    let (name, quantity, unit) = addition.validate()?;
    let mut conn = pool.acquire().await?;

    let item = add_stock(&mut conn, &name, quantity, &unit).await?;
    debug!(ingredient_id = item.ingredient_id, quantity, "Added pantry stock");
    Ok(item)
}

/// Add several records in one transaction; any invalid record rejects the batch
pub async fn add_bulk_to_pantry(pool: &PgPool, additions: &[PantryAddition]) -> Result<Vec<PantryItem>> {
    let validated = additions
        .iter()
        .map(PantryAddition::validate)
        .collect::<Result<Vec<_>>>()?;

    let mut tx = pool.begin().await?;
    let mut items = Vec::with_capacity(validated.len());
    for (name, quantity, unit) in &validated {
        items.push(add_stock(&mut tx, name, *quantity, unit).await?);
    }
    tx.commit().await?;

    info!(records = items.len(), "Added pantry stock in bulk");
    Ok(items)
}

/// Overwrite the stock of an ingredient; zero or less removes the row
pub async fn set_pantry_quantity(pool: &PgPool, ingredient_id: i64, quantity: f64) -> Result<Option<PantryItem>> {
    if !quantity.is_finite() {
        return Err(KitchenError::Validation("pantry quantity must be a finite number".to_string()));
    }

    let mut tx = pool.begin().await?;
    fetch_ingredient(&mut tx, ingredient_id).await?;

    if quantity <= 0.0 {
        sqlx::query("DELETE FROM pantry WHERE ingredient_id = $1")
            .bind(ingredient_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(ingredient_id, "Removed pantry row");
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO pantry (ingredient_id, quantity_available) VALUES ($1, $2)
         ON CONFLICT (ingredient_id) DO UPDATE SET quantity_available = EXCLUDED.quantity_available",
    )
    .bind(ingredient_id)
    .bind(quantity)
    .execute(&mut *tx)
    .await?;

    let item = fetch_pantry_item(&mut tx, ingredient_id).await?;
    tx.commit().await?;
    Ok(item)
}

pub async fn delete_pantry_item(pool: &PgPool, ingredient_id: i64) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM pantry WHERE ingredient_id = $1")
        .bind(ingredient_id)
        .execute(pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(KitchenError::NotFound(format!(
            "no pantry row for ingredient {ingredient_id}"
        )));
    }
    Ok(())
}

/// Current stock joined with the catalog, sorted by name
pub async fn list_pantry(pool: &PgPool) -> Result<Vec<PantryItem>> {
    let items = sqlx::query_as::<_, PantryItem>(&format!("{PANTRY_COLUMNS} ORDER BY lower(i.name), i.id"))
        .fetch_all(pool)
        .await?;
    Ok(items)
}
