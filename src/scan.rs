//! # Receipt Scanning
//!
//! Turns a photographed grocery receipt into `{name, quantity, unit}` records
//! by asking an image-understanding model, with:
//!
//! - image validation before anything leaves the process
//! - candidate fallback: models are tried in priority order, with a short
//!   backoff after a rate-limited candidate
//! - tolerant extraction of the JSON array from commentary or code fences
//! - unit normalization to `kg`, `g`, `l` or `unit`
//! - a circuit breaker over repeated exhausted scans

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{RecoveryConfig, ScanConfig};
use crate::errors::{KitchenError, Result};
use crate::gemini::{ModelError, ReceiptModel};

pub const RECEIPT_PROMPT: &str = r#"Analyze this grocery receipt. Extract all food items.
Return ONLY a JSON array of objects:
[{"name": "string", "quantity": number, "unit": "string"}].
Normalize units to 'kg', 'g', 'l', or 'unit'.
Return ONLY the raw JSON."#;

lazy_static! {
    static ref JSON_ARRAY: Regex = Regex::new(r"(?s)\[.*\]").expect("JSON array pattern should be valid");
}

/// Unit vocabulary of scanned receipt items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptUnit {
    #[serde(rename = "kg")]
    Kilograms,
    #[serde(rename = "g")]
    Grams,
    #[serde(rename = "l")]
    Liters,
    #[serde(rename = "unit")]
    Unit,
}

impl ReceiptUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptUnit::Kilograms => "kg",
            ReceiptUnit::Grams => "g",
            ReceiptUnit::Liters => "l",
            ReceiptUnit::Unit => "unit",
        }
    }

    /// Map a free-form unit to the vocabulary, with the divisor that converts
    /// a quantity in the original unit into the normalized one.
    pub fn normalize(raw: &str) -> (ReceiptUnit, f64) {
        let unit = raw.trim().trim_end_matches('.').to_lowercase();
        match unit.as_str() {
            "kg" | "kgs" | "kilo" | "kilos" | "kilogram" | "kilograms" | "kilogramme" | "kilogrammes" => {
                (ReceiptUnit::Kilograms, 1.0)
            }
            "g" | "gr" | "grs" | "gram" | "grams" | "gramme" | "grammes" => (ReceiptUnit::Grams, 1.0),
            "l" | "lt" | "ltr" | "liter" | "liters" | "litre" | "litres" => (ReceiptUnit::Liters, 1.0),
            "cl" => (ReceiptUnit::Liters, 100.0),
            "ml" => (ReceiptUnit::Liters, 1000.0),
            _ => (ReceiptUnit::Unit, 1.0),
        }
    }
}

/// One item read from a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: f64,
    pub unit: ReceiptUnit,
}

#[derive(Debug, Deserialize)]
struct RawReceiptItem {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    quantity: Option<serde_json::Value>,
    #[serde(default)]
    unit: Option<String>,
}

/// Detect the image type of receipt bytes, rejecting anything we won't upload
pub fn detect_image_mime(image: &[u8], max_bytes: usize) -> Result<&'static str> {
    if image.is_empty() {
        return Err(KitchenError::UnsupportedImage("receipt image is empty".to_string()));
    }
    if image.len() > max_bytes {
        return Err(KitchenError::UnsupportedImage(format!(
            "receipt image is {} bytes, limit is {max_bytes}",
            image.len()
        )));
    }

    match image::guess_format(image) {
        Ok(image::ImageFormat::Png) => Ok("image/png"),
        Ok(image::ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(image::ImageFormat::WebP) => Ok("image/webp"),
        Ok(image::ImageFormat::Gif) => Ok("image/gif"),
        Ok(image::ImageFormat::Bmp) => Ok("image/bmp"),
        Ok(image::ImageFormat::Tiff) => Ok("image/tiff"),
        Ok(format) => Err(KitchenError::UnsupportedImage(format!(
            "unsupported image format: {format:?}"
        ))),
        Err(e) => Err(KitchenError::UnsupportedImage(format!(
            "could not determine image format: {e}"
        ))),
    }
}

/// Substring from the first `[` to the last `]`, if any
pub fn extract_json_array(text: &str) -> Option<&str> {
    JSON_ARRAY.find(text).map(|m| m.as_str())
}

fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn parse_quantity(value: Option<&serde_json::Value>) -> Option<f64> {
    let quantity = match value {
        None | Some(serde_json::Value::Null) => 1.0,
        Some(serde_json::Value::Number(n)) => n.as_f64()?,
        Some(serde_json::Value::String(s)) => s.trim().replace(',', ".").parse().ok()?,
        Some(_) => return None,
    };
    (quantity.is_finite() && quantity > 0.0).then_some(quantity)
}

/// Parse model output into normalized receipt items.
///
/// Items without a name or without a positive quantity are dropped.
pub fn parse_receipt_items(text: &str) -> std::result::Result<Vec<ReceiptItem>, serde_json::Error> {
    let raw: Vec<RawReceiptItem> = match extract_json_array(text) {
        Some(array) => match serde_json::from_str(array) {
            Ok(items) => items,
            Err(e) => {
                debug!(error = %e, "Embedded array did not parse, retrying without code fences");
                serde_json::from_str(&strip_code_fences(text))?
            }
        },
        None => serde_json::from_str(&strip_code_fences(text))?,
    };

    let items = raw
        .into_iter()
        .filter_map(|item| {
            let name = item.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?.to_string();
            let Some(quantity) = parse_quantity(item.quantity.as_ref()) else {
                debug!(name = %name, "Dropping receipt item with unusable quantity");
                return None;
            };
            let (unit, divisor) = ReceiptUnit::normalize(item.unit.as_deref().unwrap_or(""));
            Some(ReceiptItem {
                name,
                quantity: quantity / divisor,
                unit,
            })
        })
        .collect();

    Ok(items)
}

/// Delay before the candidate after a rate-limited `attempt` (0-based)
pub fn calculate_retry_delay(attempt: u32, config: &RecoveryConfig) -> Duration {
    let exponential = config
        .base_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    let jitter_max = exponential / 4;
    let jitter = if jitter_max > 0 {
        rand::thread_rng().gen_range(0..=jitter_max)
    } else {
        0
    };
    Duration::from_millis(exponential.saturating_add(jitter))
}

/// Receipt ingestion adapter
pub struct ReceiptScanner {
    model: Arc<dyn ReceiptModel>,
    config: ScanConfig,
    breaker: CircuitBreaker,
}

impl ReceiptScanner {
    pub fn new(model: Arc<dyn ReceiptModel>, config: ScanConfig) -> Self {
        let breaker = CircuitBreaker::new(config.recovery.clone());
        Self {
            model,
            config,
            breaker,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Candidate models in priority order
    pub async fn candidates(&self) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();

        if self.config.discover_models {
            match self.model.list_models().await {
                Ok(models) => {
                    candidates.extend(models.into_iter().filter(|m| m.to_lowercase().contains("flash")));
                }
                Err(e) => warn!(error = %e, "Model discovery failed, using configured candidates"),
            }
        }

        for model in &self.config.models {
            if !candidates.contains(model) {
                candidates.push(model.clone());
            }
        }

        candidates
    }

    /// Scan one receipt image.
    ///
    /// Returns the extracted items, or [`KitchenError::Upstream`] once every
    /// candidate has failed.
    pub async fn scan(&self, image: &[u8]) -> Result<Vec<ReceiptItem>> {
        let mime_type = detect_image_mime(image, self.config.max_image_bytes)?;

        if self.breaker.is_open() {
            warn!("Receipt scan rejected, circuit breaker is open");
            return Err(KitchenError::Upstream {
                attempted: Vec::new(),
                reason: "receipt scanning is paused after repeated failures".to_string(),
            });
        }

        let candidates = self.candidates().await;
        let mut attempted = Vec::with_capacity(candidates.len());
        let mut last_reason = "no receipt model candidates configured".to_string();
        let mut rate_limited: u32 = 0;

        for (index, model) in candidates.iter().enumerate() {
            attempted.push(model.clone());
            info!(model = %model, mime_type, "Scanning receipt");

            match self.model.generate(model, RECEIPT_PROMPT, image, mime_type).await {
                Ok(text) => match parse_receipt_items(&text) {
                    Ok(items) => {
                        self.breaker.record_success();
                        info!(model = %model, items = items.len(), "Receipt scanned");
                        return Ok(items);
                    }
                    Err(e) => {
                        warn!(model = %model, error = %e, "Model output held no item array");
                        last_reason = format!("{model}: unreadable output: {e}");
                    }
                },
                Err(ModelError::RateLimited(reason)) => {
                    warn!(model = %model, reason = %reason, "Model rate limited");
                    last_reason = format!("{model}: rate limited: {reason}");
                    if index + 1 < candidates.len() {
                        let delay = calculate_retry_delay(rate_limited, &self.config.recovery);
                        debug!(delay_ms = delay.as_millis() as u64, "Backing off before next candidate");
                        tokio::time::sleep(delay).await;
                    }
                    rate_limited += 1;
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model candidate failed");
                    last_reason = format!("{model}: {}", e.reason());
                }
            }
        }

        self.breaker.record_failure();
        error!(
            attempted = ?attempted,
            reason = %last_reason,
            "All receipt scanning candidates exhausted"
        );
        if let Ok(available) = self.model.list_models().await {
            info!(available = ?available, "Models available to this API key");
        }

        Err(KitchenError::Upstream {
            attempted,
            reason: last_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    /// Replays scripted responses and records which models were asked
    struct ScriptedModel {
        responses: Mutex<VecDeque<std::result::Result<String, ModelError>>>,
        calls: Mutex<Vec<String>>,
        listed: Vec<String>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<std::result::Result<String, ModelError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
                listed: Vec::new(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReceiptModel for ScriptedModel {
        async fn generate(
            &self,
            model: &str,
            _prompt: &str,
            _image: &[u8],
            _mime_type: &str,
        ) -> std::result::Result<String, ModelError> {
            self.calls.lock().unwrap().push(model.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Failed("no scripted response".into())))
        }

        async fn list_models(&self) -> std::result::Result<Vec<String>, ModelError> {
            Ok(self.listed.clone())
        }
    }

    fn fast_config(models: &[&str]) -> ScanConfig {
        ScanConfig {
            models: models.iter().map(|m| m.to_string()).collect(),
            recovery: RecoveryConfig {
                base_backoff_ms: 1,
                max_backoff_ms: 2,
                circuit_breaker_threshold: 2,
                circuit_breaker_reset_secs: 60,
            },
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_commentary_and_bare_array_parse_identically() {
        let bare = r#"[{"name": "Lait demi-écrémé", "quantity": 2, "unit": "l"}, {"name": "Oeufs", "quantity": 12, "unit": "unit"}]"#;
        let chatty = format!(
            "Here are the items I found on the receipt:\n```json\n{bare}\n```\nLet me know if you need anything else."
        );

        assert_eq!(parse_receipt_items(&chatty).unwrap(), parse_receipt_items(bare).unwrap());
        assert_eq!(parse_receipt_items(bare).unwrap().len(), 2);
    }

    #[test]
    fn test_extract_spans_first_open_to_last_close() {
        let text = "items: [{\"name\": \"a\", \"tags\": [1, 2]}] done";
        assert_eq!(extract_json_array(text), Some("[{\"name\": \"a\", \"tags\": [1, 2]}]"));
        assert_eq!(extract_json_array("no array here"), None);
    }

    #[test]
    fn test_output_without_array_is_an_error() {
        assert!(parse_receipt_items("I could not read this receipt.").is_err());
    }

    #[test]
    fn test_items_are_normalized() {
        let text = r#"[
            {"name": "  Beurre ", "quantity": "250", "unit": "gr"},
            {"name": "Jus d'orange", "quantity": 500, "unit": "ml"},
            {"name": "Pommes", "quantity": "1,5", "unit": "Kilograms"},
            {"name": "Baguette", "unit": "pièce"},
            {"name": "", "quantity": 1, "unit": "unit"},
            {"name": "Remise", "quantity": -2, "unit": "unit"},
            {"name": "Sac", "quantity": 0, "unit": "unit"},
            {"name": "Consigne", "quantity": "0,0", "unit": "l"}
        ]"#;

        let items = parse_receipt_items(text).unwrap();

        assert_eq!(
            items,
            vec![
                ReceiptItem { name: "Beurre".into(), quantity: 250.0, unit: ReceiptUnit::Grams },
                ReceiptItem { name: "Jus d'orange".into(), quantity: 0.5, unit: ReceiptUnit::Liters },
                ReceiptItem { name: "Pommes".into(), quantity: 1.5, unit: ReceiptUnit::Kilograms },
                ReceiptItem { name: "Baguette".into(), quantity: 1.0, unit: ReceiptUnit::Unit },
            ]
        );
    }

    #[test]
    fn test_unit_vocabulary() {
        assert_eq!(ReceiptUnit::normalize("KG").0, ReceiptUnit::Kilograms);
        assert_eq!(ReceiptUnit::normalize("g.").0, ReceiptUnit::Grams);
        assert_eq!(ReceiptUnit::normalize("L"), (ReceiptUnit::Liters, 1.0));
        assert_eq!(ReceiptUnit::normalize("cl"), (ReceiptUnit::Liters, 100.0));
        assert_eq!(ReceiptUnit::normalize("pack").0, ReceiptUnit::Unit);
        assert_eq!(serde_json::to_string(&ReceiptUnit::Liters).unwrap(), "\"l\"");
    }

    #[test]
    fn test_image_validation() {
        assert_eq!(detect_image_mime(PNG_HEADER, 1024).unwrap(), "image/png");
        assert_eq!(
            detect_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'], 1024).unwrap(),
            "image/jpeg"
        );
        assert!(matches!(
            detect_image_mime(b"", 1024),
            Err(KitchenError::UnsupportedImage(_))
        ));
        assert!(matches!(
            detect_image_mime(b"definitely not an image", 1024),
            Err(KitchenError::UnsupportedImage(_))
        ));
        assert!(matches!(
            detect_image_mime(PNG_HEADER, 4),
            Err(KitchenError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let config = RecoveryConfig {
            base_backoff_ms: 100,
            max_backoff_ms: 300,
            ..Default::default()
        };

        let first = calculate_retry_delay(0, &config).as_millis();
        let third = calculate_retry_delay(2, &config).as_millis();

        assert!((100..=125).contains(&first));
        assert!((300..=375).contains(&third));
    }

    #[test]
    fn test_retry_delay_saturates_at_huge_cap() {
        let config = RecoveryConfig {
            base_backoff_ms: u64::MAX / 2,
            max_backoff_ms: u64::MAX,
            ..Default::default()
        };

        assert_eq!(calculate_retry_delay(8, &config), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn test_falls_back_after_rate_limit() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::RateLimited("quota".into())),
            Ok(r#"[{"name": "Sugar", "quantity": 1, "unit": "kg"}]"#.into()),
        ]));
        let scanner = ReceiptScanner::new(model.clone(), fast_config(&["primary", "secondary"]));

        let items = scanner.scan(PNG_HEADER).await.unwrap();

        assert_eq!(items[0].name, "Sugar");
        assert_eq!(model.calls(), vec!["primary", "secondary"]);
    }

    #[tokio::test]
    async fn test_unreadable_output_moves_to_next_candidate() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("Sorry, I can't help with that.".into()),
            Ok("[]".into()),
        ]));
        let scanner = ReceiptScanner::new(model.clone(), fast_config(&["a", "b"]));

        assert_eq!(scanner.scan(PNG_HEADER).await.unwrap(), Vec::new());
        assert_eq!(model.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_candidates_report_last_reason() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::Unavailable("404".into())),
            Err(ModelError::RateLimited("quota exceeded".into())),
        ]));
        let scanner = ReceiptScanner::new(model, fast_config(&["a", "b"]));

        let err = scanner.scan(PNG_HEADER).await.unwrap_err();

        assert_eq!(
            err,
            KitchenError::Upstream {
                attempted: vec!["a".into(), "b".into()],
                reason: "b: rate limited: quota exceeded".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_circuit_opens_after_repeated_exhaustion() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let scanner = ReceiptScanner::new(model.clone(), fast_config(&["only"]));

        assert!(scanner.scan(PNG_HEADER).await.is_err());
        assert!(scanner.scan(PNG_HEADER).await.is_err());
        assert_eq!(model.calls().len(), 2);

        let err = scanner.scan(PNG_HEADER).await.unwrap_err();
        assert!(matches!(err, KitchenError::Upstream { ref attempted, .. } if attempted.is_empty()));
        assert_eq!(model.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_image_never_reaches_model() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let scanner = ReceiptScanner::new(model.clone(), fast_config(&["a"]));

        assert!(matches!(
            scanner.scan(b"plain text").await,
            Err(KitchenError::UnsupportedImage(_))
        ));
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_discovered_flash_models_come_first() {
        let mut model = ScriptedModel::new(Vec::new());
        model.listed = vec![
            "gemini-2.5-flash".into(),
            "gemini-2.5-pro".into(),
            "gemini-1.5-flash".into(),
        ];
        let mut config = fast_config(&["gemini-1.5-flash", "gemini-1.0-pro-vision"]);
        config.discover_models = true;
        let scanner = ReceiptScanner::new(Arc::new(model), config);

        assert_eq!(
            scanner.candidates().await,
            vec!["gemini-2.5-flash", "gemini-1.5-flash", "gemini-1.0-pro-vision"]
        );
    }
}
