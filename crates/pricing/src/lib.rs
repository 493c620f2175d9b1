//! Tiered pricing of fabrication jobs.
//!
//! - [`PricingCatalog`]: versioned lookup tables (option key → per-tier cost).
//! - [`PricingEngine`]: pure `(job options, tier) → price`, plus the ordered
//!   breakdown used for invoice line snapshots.
//!
//! Pricing never fails: unknown option keys cost nothing.

pub mod catalog;
pub mod engine;

pub use catalog::{CatalogEntry, PricingCatalog, Tier, TierCost, UrgencyLevel};
pub use engine::{ComponentKind, PriceBreakdown, PriceComponent, PricingEngine};
