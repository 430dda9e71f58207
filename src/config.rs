//! # Configuration Module
//!
//! This module defines the service settings and the receipt scanning
//! settings, including recovery (backoff and circuit breaker) parameters.
//! Values are read from the environment; `.env` files are loaded by `main`
//! through `dotenv` before these are built.

use anyhow::{Context, Result};
use std::path::PathBuf;

// Constants for service configuration
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Constants for receipt scanning
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODELS: &[&str] = &["gemini-2.0-flash", "gemini-1.5-flash"];
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB limit for receipt images
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Address the HTTP server listens on
    pub bind_addr: String,
    /// Pool size
    pub max_connections: u32,
    /// Master ingredient file imported at startup when present
    pub import_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .context("DATABASE_URL must be set")?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_connections,
            import_path: lookup("INGREDIENT_IMPORT_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Recovery configuration for receipt scanning
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// Base delay after a rate-limited candidate in milliseconds
    pub base_backoff_ms: u64,
    /// Maximum delay between candidates in milliseconds
    pub max_backoff_ms: u64,
    /// Consecutive exhausted scans before the circuit opens
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 1000, // 1 second
            max_backoff_ms: 8000,  // 8 seconds
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Configuration for the receipt ingestion adapter
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Gemini API key; scanning fails upstream when absent
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model candidates in priority order
    pub models: Vec<String>,
    /// Ask the API for available flash models before the configured list
    pub discover_models: bool,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Largest accepted receipt image in bytes
    pub max_image_bytes: usize,
    pub recovery: RecoveryConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            models: DEFAULT_GEMINI_MODELS.iter().map(|m| m.to_string()).collect(),
            discover_models: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_image_bytes: MAX_IMAGE_SIZE,
            recovery: RecoveryConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let recovery = RecoveryConfig {
            base_backoff_ms: parse_or(&lookup, "GEMINI_BACKOFF_MS", defaults.recovery.base_backoff_ms)?,
            max_backoff_ms: parse_or(&lookup, "GEMINI_MAX_BACKOFF_MS", defaults.recovery.max_backoff_ms)?,
            ..defaults.recovery.clone()
        };

        let models = match lookup("GEMINI_MODELS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.models.clone(),
        };

        Ok(Self {
            api_key: lookup("GEMINI_API_KEY").filter(|v| !v.trim().is_empty()),
            base_url: lookup("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            models,
            discover_models: lookup("GEMINI_DISCOVER_MODELS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            request_timeout_secs: parse_or(
                &lookup,
                "GEMINI_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            max_image_bytes: defaults.max_image_bytes,
            recovery,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} is not a valid number: {raw}")),
        None => Ok(default),
    }
}
