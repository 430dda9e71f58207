//! # Error Types Module
//!
//! This module defines the error type shared by the store, the reconciliation
//! engine, the receipt scanner and the HTTP layer. Every operation returns a
//! [`KitchenError`] so callers can tell client mistakes apart from upstream
//! and persistence failures.

/// Custom error types for kitchen operations
#[derive(Debug, Clone, PartialEq)]
pub enum KitchenError {
    /// A referenced recipe, meal plan entry, shopping item or ingredient does not exist
    NotFound(String),
    /// Explicit creation with a name that is already taken
    Duplicate(String),
    /// Missing or malformed fields in a mutation payload
    Validation(String),
    /// An ingredient is still referenced and cannot be removed
    InUse(String),
    /// Receipt bytes rejected before any upstream call
    UnsupportedImage(String),
    /// Every receipt scanning candidate failed
    Upstream {
        /// Candidates tried, in order
        attempted: Vec<String>,
        /// Last underlying failure reason
        reason: String,
    },
    /// Any other storage failure; the surrounding transaction was rolled back
    Persistence(String),
}

impl KitchenError {
    pub fn not_found(what: &str, id: i64) -> Self {
        KitchenError::NotFound(format!("{what} {id} not found"))
    }

    /// Whether the error was caused by the caller's request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            KitchenError::NotFound(_)
                | KitchenError::Duplicate(_)
                | KitchenError::Validation(_)
                | KitchenError::InUse(_)
                | KitchenError::UnsupportedImage(_)
        )
    }
}

impl std::fmt::Display for KitchenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KitchenError::NotFound(msg) => write!(f, "Not found: {msg}"),
            KitchenError::Duplicate(msg) => write!(f, "Duplicate: {msg}"),
            KitchenError::Validation(msg) => write!(f, "Validation error: {msg}"),
            KitchenError::InUse(msg) => write!(f, "In use: {msg}"),
            KitchenError::UnsupportedImage(msg) => write!(f, "Unsupported image: {msg}"),
            KitchenError::Upstream { attempted, reason } => write!(
                f,
                "Receipt scanning failed after trying [{}]: {reason}",
                attempted.join(", ")
            ),
            KitchenError::Persistence(msg) => write!(f, "Persistence error: {msg}"),
        }
    }
}

impl std::error::Error for KitchenError {}

impl From<sqlx::Error> for KitchenError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                KitchenError::Duplicate(db_err.message().to_string())
            }
            _ => KitchenError::Persistence(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for KitchenError {
    fn from(err: serde_json::Error) -> Self {
        KitchenError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KitchenError>;
