//! Monthly billing periods and invoice numbering.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{ClientId, DomainError, DomainResult};

/// Default invoice number prefix.
pub const DEFAULT_INVOICE_PREFIX: &str = "INV";

/// A calendar month, the unit invoices are issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!("month must be 1..=12, got {month}")));
        }
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::validation(format!("year must have four digits, got {year}")));
        }
        Ok(Self { year, month })
    }

    /// The period a timestamp falls in (UTC).
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Deterministic number: repeated runs for one client and month collide.
    ///
    /// Format: `<prefix>-YYYYMM-<client id, compact>`.
    pub fn invoice_number(&self, prefix: &str, client_id: ClientId) -> String {
        format!("{prefix}-{:04}{:02}-{}", self.year, self.month, client_id.compact())
    }
}

impl core::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn number_is_stable_per_client_and_month() {
        let client = ClientId::new();
        let period = BillingPeriod::new(2024, 3).unwrap();

        let first = period.invoice_number("INV", client);
        assert_eq!(first, period.invoice_number("INV", client));
        assert!(first.starts_with("INV-202403-"));
        assert_eq!(first.len(), "INV-202403-".len() + 32);

        let next_month = BillingPeriod::new(2024, 4).unwrap();
        assert_ne!(first, next_month.invoice_number("INV", client));
        assert_ne!(first, period.invoice_number("INV", ClientId::new()));
    }

    #[test]
    fn containing_uses_utc_calendar_month() {
        let at = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(BillingPeriod::containing(at), BillingPeriod::new(2023, 12).unwrap());
        assert_eq!(BillingPeriod::containing(at).to_string(), "2023-12");
    }

    #[test]
    fn rejects_out_of_range_months() {
        assert!(BillingPeriod::new(2024, 0).is_err());
        assert!(BillingPeriod::new(2024, 13).is_err());
        assert!(BillingPeriod::new(24, 1).is_err());
    }
}
