//! The shopping list: reconciliation runs, manual entries and checkout.

use sqlx::{PgConnection, PgPool};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::errors::{KitchenError, Result};
use crate::model::{
    validate_quantity, ManualShoppingItem, MarkCheckedRequest, ShoppingItemUpdate, ShoppingListItem,
    ShoppingSource,
};
use crate::reconciliation::{reconcile, ReconciliationReport};
use crate::stock::plan_restock;

use super::catalog::fetch_ingredient;
use super::{apply_stock_changes, load_pantry_map, load_snapshot};

#[derive(sqlx::FromRow)]
struct ShoppingRow {
    id: i64,
    ingredient_id: i64,
    name: String,
    unit: String,
    quantity_needed: f64,
    is_checked: bool,
    source: String,
}

impl From<ShoppingRow> for ShoppingListItem {
    fn from(row: ShoppingRow) -> Self {
        ShoppingListItem {
            id: row.id,
            ingredient_id: row.ingredient_id,
            name: row.name,
            unit: row.unit,
            quantity_needed: row.quantity_needed,
            is_checked: row.is_checked,
            source: ShoppingSource::from_tag(&row.source),
        }
    }
}

const SHOPPING_COLUMNS: &str =
    "SELECT s.id, s.ingredient_id, i.name, i.unit, s.quantity_needed, s.is_checked, s.source
     FROM shopping_list s
     JOIN ingredients i ON i.id = s.ingredient_id";

async fn fetch_shopping_item(conn: &mut PgConnection, id: i64) -> Result<ShoppingListItem> {
    sqlx::query_as::<_, ShoppingRow>(&format!("{SHOPPING_COLUMNS} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(ShoppingListItem::from)
        .ok_or_else(|| KitchenError::not_found("shopping list item", id))
}

async fn fetch_shopping_list(conn: &mut PgConnection) -> Result<Vec<ShoppingListItem>> {
    let rows = sqlx::query_as::<_, ShoppingRow>(&format!(
        "{SHOPPING_COLUMNS} ORDER BY lower(i.name), s.id"
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(ShoppingListItem::from).collect())
}

/// Entries joined with their ingredient, sorted by name
pub async fn list_shopping_list(pool: &PgPool) -> Result<Vec<ShoppingListItem>> {
    let mut conn = pool.acquire().await?;
    fetch_shopping_list(&mut conn).await
}

/// Recompute the derived entries from staples, the meal plan and stock.
///
/// Previous derived entries are replaced; manual entries are left alone.
pub async fn regenerate_shopping_list(pool: &PgPool) -> Result<ReconciliationReport> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM shopping_list WHERE source = $1")
        .bind(ShoppingSource::Derived.as_tag())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let snapshot = load_snapshot(&mut tx).await?;
    let plan = reconcile(&snapshot);

    for entry in &plan.entries {
        sqlx::query(
            "INSERT INTO shopping_list (ingredient_id, quantity_needed, is_checked, source)
             VALUES ($1, $2, FALSE, $3)",
        )
        .bind(entry.ingredient_id)
        .bind(entry.quantity_needed)
        .bind(ShoppingSource::Derived.as_tag())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        removed,
        added = plan.report.added.len(),
        skipped = plan.report.skipped.len(),
        "Regenerated shopping list"
    );
    Ok(plan.report)
}

/// Put an entry on the list by hand
pub async fn add_manual_item(pool: &PgPool, item: &ManualShoppingItem) -> Result<ShoppingListItem> {
    validate_quantity(item.quantity_needed, "shopping list item")?;
    let mut conn = pool.acquire().await?;
    fetch_ingredient(&mut conn, item.ingredient_id).await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO shopping_list (ingredient_id, quantity_needed, is_checked, source)
         VALUES ($1, $2, FALSE, $3) RETURNING id",
    )
    .bind(item.ingredient_id)
    .bind(item.quantity_needed)
    .bind(ShoppingSource::Manual.as_tag())
    .fetch_one(&mut *conn)
    .await?;

    debug!(item_id = id, ingredient_id = item.ingredient_id, "Added manual shopping item");
    fetch_shopping_item(&mut conn, id).await
}

pub async fn update_shopping_item(pool: &PgPool, id: i64, update: &ShoppingItemUpdate) -> Result<ShoppingListItem> {
    if let Some(quantity) = update.quantity_needed {
        validate_quantity(quantity, "shopping list item")?;
    }

    let mut conn = pool.acquire().await?;
    let updated = sqlx::query(
        "UPDATE shopping_list
         SET quantity_needed = COALESCE($2, quantity_needed),
             is_checked = COALESCE($3, is_checked)
         WHERE id = $1",
    )
    .bind(id)
    .bind(update.quantity_needed)
    .bind(update.is_checked)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(KitchenError::not_found("shopping list item", id));
    }
    fetch_shopping_item(&mut conn, id).await
}

pub async fn set_item_checked(pool: &PgPool, id: i64, checked: bool) -> Result<ShoppingListItem> {
    update_shopping_item(
        pool,
        id,
        &ShoppingItemUpdate {
            quantity_needed: None,
            is_checked: Some(checked),
        },
    )
    .await
}

/// Flip the checked flag of one entry
pub async fn toggle_shopping_item(pool: &PgPool, id: i64) -> Result<ShoppingListItem> {
    let mut conn = pool.acquire().await?;
    let updated = sqlx::query("UPDATE shopping_list SET is_checked = NOT is_checked WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(KitchenError::not_found("shopping list item", id));
    }
    fetch_shopping_item(&mut conn, id).await
}

/// Set the checked flag of several entries; every id must exist
pub async fn mark_shopping_items(pool: &PgPool, request: &MarkCheckedRequest) -> Result<u64> {
    let ids: Vec<i64> = request.item_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let mut tx = pool.begin().await?;

    let found: Vec<i64> = sqlx::query_scalar("SELECT id FROM shopping_list WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

    if found.len() != ids.len() {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains(id))
            .map(|id| id.to_string())
            .collect();
        return Err(KitchenError::NotFound(format!(
            "shopping list items not found: {}",
            missing.join(", ")
        )));
    }

    let marked = sqlx::query("UPDATE shopping_list SET is_checked = $2 WHERE id = ANY($1)")
        .bind(&ids)
        .bind(request.checked)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    debug!(marked, checked = request.checked, "Marked shopping list items");
    Ok(marked)
}

pub async fn delete_shopping_item(pool: &PgPool, id: i64) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM shopping_list WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(KitchenError::not_found("shopping list item", id));
    }
    Ok(())
}

/// Remove every entry, derived or manual
pub async fn clear_shopping_list(pool: &PgPool) -> Result<u64> {
    let cleared = sqlx::query("DELETE FROM shopping_list")
        .execute(pool)
        .await?
        .rows_affected();

    info!(cleared, "Cleared shopping list");
    Ok(cleared)
}

/// Move every checked entry into the pantry.
///
/// Returns how many entries were moved; unchecked entries stay on the list.
pub async fn checkout_shopping_list(pool: &PgPool) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let items = fetch_shopping_list(&mut tx).await?;
    let pantry = load_pantry_map(&mut tx).await?;
    let changes = plan_restock(&pantry, &items);
    apply_stock_changes(&mut tx, &changes).await?;

    let moved = sqlx::query("DELETE FROM shopping_list WHERE is_checked")
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    info!(moved, pantry_changes = changes.len(), "Checked out shopping list");
    Ok(moved)
}
