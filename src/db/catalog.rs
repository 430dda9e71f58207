//! Ingredient catalog: case-insensitive get-or-create and plain maintenance.

use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::errors::{KitchenError, Result};
use crate::model::{validate_name, Ingredient, IngredientDraft, IngredientUpdate};

async fn find_ingredient_by_name(conn: &mut PgConnection, name: &str) -> Result<Option<Ingredient>> {
    let ingredient = sqlx::query_as::<_, Ingredient>(
        "SELECT id, name, category, unit FROM ingredients WHERE lower(name) = lower($1)",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(ingredient)
}

pub(crate) async fn fetch_ingredient(conn: &mut PgConnection, id: i64) -> Result<Ingredient> {
    sqlx::query_as::<_, Ingredient>("SELECT id, name, category, unit FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| KitchenError::not_found("ingredient", id))
}

pub(crate) async fn load_ingredient_map(conn: &mut PgConnection) -> Result<HashMap<i64, Ingredient>> {
    let rows = sqlx::query_as::<_, Ingredient>("SELECT id, name, category, unit FROM ingredients")
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(|i| (i.id, i)).collect())
}

/// Get-or-create on an open connection.
///
/// Returns the ingredient and whether it was created. An existing ingredient
/// is returned unchanged, even when `unit` or `category` differ.
pub(crate) async fn ensure_ingredient(
    conn: &mut PgConnection,
    name: &str,
    unit: &str,
    category: &str,
) -> Result<(Ingredient, bool)> {
    let name = validate_name(name, "ingredient name")?;

    if let Some(existing) = find_ingredient_by_name(conn, &name).await? {
        return Ok((existing, false));
    }

    // A concurrent insert of the same name makes this return no row
    let created = sqlx::query_as::<_, Ingredient>(
        "INSERT INTO ingredients (name, category, unit) VALUES ($1, $2, $3)
         ON CONFLICT ((lower(name))) DO NOTHING
         RETURNING id, name, category, unit",
    )
    .bind(&name)
    .bind(category)
    .bind(unit)
    .fetch_optional(&mut *conn)
    .await?;

    match created {
        Some(ingredient) => {
            info!(ingredient_id = ingredient.id, name = %ingredient.name, "Created ingredient");
            Ok((ingredient, true))
        }
        None => {
            let existing = find_ingredient_by_name(conn, &name).await?.ok_or_else(|| {
                KitchenError::Persistence(format!("ingredient {name} vanished after conflicting insert"))
            })?;
            Ok((existing, false))
        }
    }
}

/// Find an ingredient by case-insensitive trimmed name, creating it on a miss
pub async fn get_or_create_ingredient(
    pool: &PgPool,
    name: &str,
    unit: &str,
    category: &str,
) -> Result<Ingredient> {
    let mut conn = pool.acquire().await?;
    let (ingredient, _) = ensure_ingredient(&mut conn, name, unit, category).await?;
    Ok(ingredient)
}

/// Explicit creation; fails with `Duplicate` when the name is taken
pub async fn create_ingredient(pool: &PgPool, draft: &IngredientDraft) -> Result<Ingredient> {
    let name = validate_name(&draft.name, "ingredient name")?;
    let mut conn = pool.acquire().await?;

    if let Some(existing) = find_ingredient_by_name(&mut conn, &name).await? {
        return Err(KitchenError::Duplicate(format!(
            "ingredient {} already exists",
            existing.name
        )));
    }

    let ingredient = sqlx::query_as::<_, Ingredient>(
        "INSERT INTO ingredients (name, category, unit) VALUES ($1, $2, $3)
         RETURNING id, name, category, unit",
    )
    .bind(&name)
    .bind(&draft.category)
    .bind(&draft.unit)
    .fetch_one(&mut *conn)
    .await?;

    info!(ingredient_id = ingredient.id, name = %ingredient.name, "Created ingredient");
    Ok(ingredient)
}

pub async fn get_ingredient(pool: &PgPool, id: i64) -> Result<Ingredient> {
    let mut conn = pool.acquire().await?;
    fetch_ingredient(&mut conn, id).await
}

/// All ingredients, sorted by name
pub async fn list_ingredients(pool: &PgPool) -> Result<Vec<Ingredient>> {
    let ingredients = sqlx::query_as::<_, Ingredient>(
        "SELECT id, name, category, unit FROM ingredients ORDER BY lower(name), id",
    )
    .fetch_all(pool)
    .await?;

    Ok(ingredients)
}

pub async fn update_ingredient(pool: &PgPool, id: i64, update: &IngredientUpdate) -> Result<Ingredient> {
    let mut tx = pool.begin().await?;
    let current = fetch_ingredient(&mut tx, id).await?;

    let name = match &update.name {
        Some(raw) => {
            let name = validate_name(raw, "ingredient name")?;
            if let Some(other) = find_ingredient_by_name(&mut tx, &name).await? {
                if other.id != id {
                    return Err(KitchenError::Duplicate(format!(
                        "ingredient {} already exists",
                        other.name
                    )));
                }
            }
            name
        }
        None => current.name,
    };

    let updated = sqlx::query_as::<_, Ingredient>(
        "UPDATE ingredients SET name = $2, category = $3, unit = $4 WHERE id = $1
         RETURNING id, name, category, unit",
    )
    .bind(id)
    .bind(&name)
    .bind(update.category.as_deref().unwrap_or(&current.category))
    .bind(update.unit.as_deref().unwrap_or(&current.unit))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    debug!(ingredient_id = id, "Updated ingredient");
    Ok(updated)
}

/// Delete an ingredient nothing refers to
pub async fn delete_ingredient(pool: &PgPool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    let ingredient = fetch_ingredient(&mut tx, id).await?;

    let references: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM recipe_ingredients WHERE ingredient_id = $1)
              + (SELECT COUNT(*) FROM pantry WHERE ingredient_id = $1)
              + (SELECT COUNT(*) FROM weekly_staples WHERE ingredient_id = $1)
              + (SELECT COUNT(*) FROM shopping_list WHERE ingredient_id = $1)",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    if references > 0 {
        return Err(KitchenError::InUse(format!(
            "ingredient {} is referenced {references} time(s)",
            ingredient.name
        )));
    }

    sqlx::query("DELETE FROM ingredients WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(ingredient_id = id, "Deleted ingredient");
    Ok(())
}
