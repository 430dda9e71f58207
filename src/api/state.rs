//! State shared by every route handler through axum's `State` extractor.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

use crate::scan::ReceiptScanner;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub scanner: Arc<ReceiptScanner>,
    /// Server start time for uptime reporting
    pub start_time: Instant,
}

impl AppState {
    pub fn new(pool: PgPool, scanner: ReceiptScanner) -> Self {
        Self {
            pool,
            scanner: Arc::new(scanner),
            start_time: Instant::now(),
        }
    }
}
