//! Route handlers. Each one extracts its input, calls the store or the
//! receipt scanner, and returns JSON. Extractor rejections are turned into
//! `ApiError` so malformed input gets the same `{error, message}` body.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::ApiError;
use super::state::AppState;
use crate::db;
use crate::feasibility::RecipeSuggestion;
use crate::model::{MarkCheckedRequest, PantryAddition, PantryItem, ShoppingItemUpdate, ShoppingListItem};
use crate::reconciliation::ReconciliationReport;
use crate::scan::ReceiptItem;
use crate::stock::StockChange;

/// Multipart field carrying the receipt image
pub const RECEIPT_FIELD: &str = "file";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub moved: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkResponse {
    pub marked: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub cleared: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CookResponse {
    pub meal_plan_id: i64,
    pub pantry_changes: Vec<StockChange>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

pub async fn generate_shopping_list(
    State(state): State<AppState>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    let report = db::regenerate_shopping_list(&state.pool).await?;
    Ok(Json(report))
}

pub async fn recipe_suggestions(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecipeSuggestion>>, ApiError> {
    Ok(Json(db::suggest_recipes(&state.pool).await?))
}

/// Read the receipt image from the `file` field and scan it.
///
/// No database work happens here; accepting the items into the pantry is a
/// separate call to the bulk pantry route.
pub async fn scan_receipt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<ReceiptItem>>, ApiError> {
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(RECEIPT_FIELD) {
            debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read receipt upload: {e}")))?;
        image = Some(bytes);
        break;
    }

    let image = image.ok_or_else(|| ApiError::BadRequest(format!("missing multipart field '{RECEIPT_FIELD}'")))?;
    info!(bytes = image.len(), "Received receipt upload");

    let items = state.scanner.scan(&image).await?;
    Ok(Json(items))
}

pub async fn list_shopping_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<ShoppingListItem>>, ApiError> {
    Ok(Json(db::list_shopping_list(&state.pool).await?))
}

pub async fn toggle_shopping_item(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ShoppingListItem>, ApiError> {
    let Path(id) = path?;
    Ok(Json(db::toggle_shopping_item(&state.pool, id).await?))
}

pub async fn update_shopping_item(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<ShoppingItemUpdate>, JsonRejection>,
) -> Result<Json<ShoppingListItem>, ApiError> {
    let Path(id) = path?;
    let Json(update) = body?;
    Ok(Json(db::update_shopping_item(&state.pool, id, &update).await?))
}

pub async fn mark_shopping_items(
    State(state): State<AppState>,
    body: Result<Json<MarkCheckedRequest>, JsonRejection>,
) -> Result<Json<MarkResponse>, ApiError> {
    let Json(request) = body?;
    let marked = db::mark_shopping_items(&state.pool, &request).await?;
    Ok(Json(MarkResponse { marked }))
}

pub async fn checkout_shopping_list(
    State(state): State<AppState>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let moved = db::checkout_shopping_list(&state.pool).await?;
    Ok(Json(CheckoutResponse { moved }))
}

pub async fn clear_shopping_list(State(state): State<AppState>) -> Result<Json<ClearResponse>, ApiError> {
    let cleared = db::clear_shopping_list(&state.pool).await?;
    Ok(Json(ClearResponse { cleared }))
}

pub async fn cook_meal(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<CookResponse>, ApiError> {
    let Path(id) = path?;
    let pantry_changes = db::cook_meal(&state.pool, id).await?;
    Ok(Json(CookResponse {
        meal_plan_id: id,
        pantry_changes,
    }))
}

pub async fn add_pantry_bulk(
    State(state): State<AppState>,
    body: Result<Json<Vec<PantryAddition>>, JsonRejection>,
) -> Result<Json<Vec<PantryItem>>, ApiError> {
    let Json(additions) = body?;
    Ok(Json(db::add_bulk_to_pantry(&state.pool, &additions).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_response_shapes() {
        assert_eq!(serde_json::to_value(CheckoutResponse { moved: 2 }).unwrap(), json!({"moved": 2}));
        assert_eq!(serde_json::to_value(MarkResponse { marked: 3 }).unwrap(), json!({"marked": 3}));
        assert_eq!(serde_json::to_value(ClearResponse { cleared: 0 }).unwrap(), json!({"cleared": 0}));
    }

    #[test]
    fn test_cook_response_shape() {
        let response = CookResponse {
            meal_plan_id: 4,
            pantry_changes: vec![StockChange::Remove { ingredient_id: 9 }],
        };

        let json = serde_json::to_value(response).unwrap();

        assert_eq!(json["meal_plan_id"], 4);
        assert_eq!(json["pantry_changes"].as_array().map(Vec::len), Some(1));
    }
}
