//! Option catalog: option key → per-tier cost.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Money, ValueObject};

/// Per-client pricing plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Tier1,
    Tier2,
}

impl core::fmt::Display for Tier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Tier::Tier1 => f.write_str("tier1"),
            Tier::Tier2 => f.write_str("tier2"),
        }
    }
}

/// Cost of one option under each tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCost {
    pub tier1: Money,
    pub tier2: Money,
}

impl ValueObject for TierCost {}

impl TierCost {
    pub const fn new(tier1_cents: u64, tier2_cents: u64) -> Self {
        Self {
            tier1: Money::from_cents(tier1_cents),
            tier2: Money::from_cents(tier2_cents),
        }
    }

    pub fn for_tier(&self, tier: Tier) -> Money {
        match tier {
            Tier::Tier1 => self.tier1,
            Tier::Tier2 => self.tier2,
        }
    }
}

/// A priced option with its human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub label: String,
    pub cost: TierCost,
}

impl CatalogEntry {
    pub fn new(label: impl Into<String>, cost: TierCost) -> Self {
        Self {
            label: label.into(),
            cost,
        }
    }
}

/// An urgency level: a flat percentage surcharge, independent of tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyLevel {
    pub label: String,
    pub rate_percent: u32,
}

impl UrgencyLevel {
    pub fn new(label: impl Into<String>, rate_percent: u32) -> Self {
        Self {
            label: label.into(),
            rate_percent,
        }
    }
}

/// Versioned option catalog, injected wherever prices are computed.
///
/// Invoices record the `version` they were priced with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingCatalog {
    pub version: u32,
    pub categories: BTreeMap<String, CatalogEntry>,
    pub diamond_finishes: BTreeMap<String, CatalogEntry>,
    pub lens_options: BTreeMap<String, CatalogEntry>,
    /// Cost per engraving.
    pub engraving: CatalogEntry,
    pub shape_change: CatalogEntry,
    pub urgency_levels: BTreeMap<String, UrgencyLevel>,
}

/// Upper bound accepted for an urgency surcharge.
const MAX_URGENCY_RATE_PERCENT: u32 = 100;

fn entries<const N: usize>(rows: [(&str, &str, u64, u64); N]) -> BTreeMap<String, CatalogEntry> {
    rows.into_iter()
        .map(|(key, label, t1, t2)| (key.to_string(), CatalogEntry::new(label, TierCost::new(t1, t2))))
        .collect()
}

impl PricingCatalog {
    /// The workshop's built-in catalog.
    pub fn standard() -> Self {
        Self {
            version: 1,
            categories: entries([
                ("rimmed", "Rimmed mounting", 700, 600),
                ("nylon-cord", "Nylon-cord mounting", 1500, 1300),
                ("drilled", "Drilled mounting", 2500, 2200),
            ]),
            diamond_finishes: entries([
                ("none", "No diamond finish", 0, 0),
                ("facet", "Diamond facet finish", 3980, 3480),
                ("full", "Full diamond finish", 5970, 5220),
            ]),
            lens_options: entries([
                ("polish", "Edge polish", 300, 250),
                ("bevel", "Safety bevel", 450, 400),
                ("uv", "UV treatment", 500, 400),
                ("tint", "Tinting", 800, 700),
            ]),
            engraving: CatalogEntry::new("Engraving", TierCost::new(500, 400)),
            shape_change: CatalogEntry::new("Shape change", TierCost::new(1000, 800)),
            urgency_levels: [
                ("standard", UrgencyLevel::new("Standard", 0)),
                ("urgent", UrgencyLevel::new("Urgent", 20)),
                ("express", UrgencyLevel::new("Express", 30)),
                ("same-day", UrgencyLevel::new("Same day", 50)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        }
    }

    /// Parse a catalog from JSON and validate it.
    pub fn from_json(json: &str) -> DomainResult<Self> {
        let catalog: Self = serde_json::from_str(json)
            .map_err(|e| DomainError::validation(format!("invalid catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Structural checks for externally supplied catalogs.
    pub fn validate(&self) -> DomainResult<()> {
        if self.version == 0 {
            return Err(DomainError::validation("catalog version must be at least 1"));
        }

        let tables = [
            ("categories", &self.categories),
            ("diamond_finishes", &self.diamond_finishes),
            ("lens_options", &self.lens_options),
        ];
        for (table, rows) in tables {
            for (key, entry) in rows {
                if key.trim().is_empty() || key.trim().to_lowercase() != *key {
                    return Err(DomainError::validation(format!(
                        "{table}: key '{key}' must be trimmed lower-case"
                    )));
                }
                if entry.label.trim().is_empty() {
                    return Err(DomainError::validation(format!("{table}.{key}: empty label")));
                }
            }
        }

        for (key, level) in &self.urgency_levels {
            if level.rate_percent > MAX_URGENCY_RATE_PERCENT {
                return Err(DomainError::validation(format!(
                    "urgency_levels.{key}: rate {}% exceeds {MAX_URGENCY_RATE_PERCENT}%",
                    level.rate_percent
                )));
            }
        }

        Ok(())
    }

    pub fn category(&self, key: &str) -> Option<&CatalogEntry> {
        self.categories.get(key)
    }

    pub fn diamond_finish(&self, key: &str) -> Option<&CatalogEntry> {
        self.diamond_finishes.get(key)
    }

    pub fn lens_option(&self, key: &str) -> Option<&CatalogEntry> {
        self.lens_options.get(key)
    }

    pub fn urgency(&self, key: &str) -> Option<&UrgencyLevel> {
        self.urgency_levels.get(key)
    }

    /// Surcharge rate for an urgency level; unknown levels carry none.
    pub fn urgency_rate(&self, key: &str) -> u32 {
        self.urgency(key).map(|u| u.rate_percent).unwrap_or(0)
    }
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
