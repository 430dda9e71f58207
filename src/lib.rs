//! # Kitchen Log
//!
//! Backend for a household kitchen: an ingredient catalog, recipes, pantry
//! stock, weekly staples and a meal plan, a shopping list derived from them,
//! recipe suggestions from current stock, and receipt scanning through an
//! image-understanding model.

pub mod api;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod feasibility;
pub mod gemini;
pub mod import;
pub mod model;
pub mod reconciliation;
pub mod scan;
pub mod stock;
