//! Runtime configuration, read from the environment.
//!
//! | variable                       | default            |
//! |--------------------------------|--------------------|
//! | `ATELIER_TAX_RATE_PERCENT`     | `20`               |
//! | `ATELIER_PAYMENT_EPSILON_CENTS`| `10`               |
//! | `ATELIER_CATALOG_PATH`         | built-in catalog   |
//! | `ATELIER_INVOICE_PREFIX`       | `INV`              |

use std::path::PathBuf;

use anyhow::{Context, bail};

use atelier_core::Money;
use atelier_invoicing::{DEFAULT_INVOICE_PREFIX, DEFAULT_TAX_RATE_PERCENT, PAYMENT_EPSILON};
use atelier_pricing::PricingCatalog;

pub const TAX_RATE_VAR: &str = "ATELIER_TAX_RATE_PERCENT";
pub const PAYMENT_EPSILON_VAR: &str = "ATELIER_PAYMENT_EPSILON_CENTS";
pub const CATALOG_PATH_VAR: &str = "ATELIER_CATALOG_PATH";
pub const INVOICE_PREFIX_VAR: &str = "ATELIER_INVOICE_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub tax_rate_percent: u32,
    pub payment_epsilon: Money,
    /// JSON catalog replacing the built-in one.
    pub catalog_path: Option<PathBuf>,
    pub invoice_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tax_rate_percent: DEFAULT_TAX_RATE_PERCENT,
            payment_epsilon: PAYMENT_EPSILON,
            catalog_path: None,
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let tax_rate_percent = lookup(TAX_RATE_VAR)
            .unwrap_or_else(|| DEFAULT_TAX_RATE_PERCENT.to_string())
            .trim()
            .parse::<u32>()
            .with_context(|| format!("{TAX_RATE_VAR} must be a whole percentage"))?;
        if tax_rate_percent > 100 {
            bail!("{TAX_RATE_VAR} must be at most 100, got {tax_rate_percent}");
        }

        let epsilon_cents = lookup(PAYMENT_EPSILON_VAR)
            .unwrap_or_else(|| PAYMENT_EPSILON.cents().to_string())
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{PAYMENT_EPSILON_VAR} must be a non-negative number of cents"))?;

        let catalog_path = lookup(CATALOG_PATH_VAR)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        let invoice_prefix = lookup(INVOICE_PREFIX_VAR)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_INVOICE_PREFIX.to_string());
        if !invoice_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("{INVOICE_PREFIX_VAR} must be alphanumeric, got '{invoice_prefix}'");
        }

        Ok(Self {
            tax_rate_percent,
            payment_epsilon: Money::from_cents(epsilon_cents),
            catalog_path,
            invoice_prefix,
        })
    }

    /// The configured catalog file, or the built-in catalog.
    pub fn load_catalog(&self) -> anyhow::Result<PricingCatalog> {
        let Some(path) = &self.catalog_path else {
            return Ok(PricingCatalog::standard());
        };

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog file {}", path.display()))?;
        PricingCatalog::from_json(&json).with_context(|| format!("loading catalog file {}", path.display()))
    }
}
