//! Bulk import of a master ingredient file into the catalog.
//!
//! The file is a JSON array of `{name, unit, category}` records. Every record
//! goes through get-or-create, so importing the same file twice is harmless.

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::path::Path;
use tracing::{debug, info};

use crate::db::catalog::ensure_ingredient;
use crate::errors::Result;
use crate::model::{DEFAULT_CATEGORY, DEFAULT_UNIT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: usize,
    pub existing: usize,
    pub skipped: usize,
}

/// A record ready for get-or-create
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    pub name: String,
    pub unit: String,
    pub category: String,
}

fn non_blank(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Apply defaults and drop records without a usable name.
///
/// Returns the records to import and how many were skipped.
pub fn prepare_records(records: &[CatalogRecord]) -> (Vec<PreparedRecord>, usize) {
    let mut prepared = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for record in records {
        let name = record.name.trim();
        if name.is_empty() {
            skipped += 1;
            continue;
        }
        prepared.push(PreparedRecord {
            name: name.to_string(),
            unit: non_blank(record.unit.as_deref(), DEFAULT_UNIT),
            category: non_blank(record.category.as_deref(), DEFAULT_CATEGORY),
        });
    }

    (prepared, skipped)
}

/// Import records in one transaction
pub async fn import_catalog(pool: &PgPool, records: &[CatalogRecord]) -> Result<ImportSummary> {
    let (prepared, skipped) = prepare_records(records);
    let mut summary = ImportSummary {
        skipped,
        ..Default::default()
    };

    let mut tx = pool.begin().await?;
    for record in &prepared {
        let (ingredient, created) =
            ensure_ingredient(&mut tx, &record.name, &record.unit, &record.category).await?;
        if created {
            summary.created += 1;
        } else {
            debug!(ingredient_id = ingredient.id, name = %ingredient.name, "Ingredient already in catalog");
            summary.existing += 1;
        }
    }
    tx.commit().await?;

    info!(
        created = summary.created,
        existing = summary.existing,
        skipped = summary.skipped,
        "Imported ingredient catalog"
    );
    Ok(summary)
}

/// Read a JSON catalog file
pub fn read_catalog_file(path: &Path) -> AnyResult<Vec<CatalogRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ingredient file {}", path.display()))?;
    let records = serde_json::from_str(&raw)
        .with_context(|| format!("Ingredient file {} is not a JSON array of records", path.display()))?;
    Ok(records)
}

/// Import a JSON catalog file from disk
pub async fn import_catalog_file(pool: &PgPool, path: &Path) -> AnyResult<ImportSummary> {
    info!(path = %path.display(), "Importing ingredient catalog");
    let records = read_catalog_file(path)?;
    let summary = import_catalog(pool, &records)
        .await
        .context("Failed to import ingredient catalog")?;
    Ok(summary)
}
