//! Router setup with the kitchen routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Room for multipart framing around the largest accepted receipt image
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.scanner.config().max_image_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/shopping-list/generate", post(handlers::generate_shopping_list))
        .route("/api/recipes/suggestions", get(handlers::recipe_suggestions))
        .route(
            "/api/scan-receipt",
            post(handlers::scan_receipt).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/shopping-list",
            get(handlers::list_shopping_list).delete(handlers::clear_shopping_list),
        )
        .route("/api/shopping-list/{id}", put(handlers::update_shopping_item))
        .route("/api/shopping-list/{id}/toggle", post(handlers::toggle_shopping_item))
        .route("/api/shopping-list/mark", post(handlers::mark_shopping_items))
        .route("/api/shopping-list/checkout", post(handlers::checkout_shopping_list))
        .route("/api/meal-plans/{id}/cook", post(handlers::cook_meal))
        .route("/api/pantry/bulk", post(handlers::add_pantry_bulk))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
