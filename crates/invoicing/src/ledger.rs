//! Payment reconciliation.
//!
//! The payment status is never stored: it is derived from `amount_paid` and
//! `total_ttc` on every read, with a small tolerance to absorb rounding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, DomainResult, Money};

use crate::invoice::{Invoice, InvoiceCommand, InvoiceEvent, RecordPayment};

/// Shortfall still counted as fully paid: 0.10.
pub const PAYMENT_EPSILON: Money = Money::from_cents(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    pub fn label(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// - `paid >= ttc - epsilon` → `Paid`
/// - `0 < paid < ttc - epsilon` → `PartiallyPaid`
/// - otherwise → `Unpaid`
pub fn derive_status(amount_paid: Money, total_ttc: Money, epsilon: Money) -> PaymentStatus {
    let threshold = total_ttc.saturating_sub(epsilon);
    if amount_paid >= threshold {
        PaymentStatus::Paid
    } else if !amount_paid.is_zero() {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    }
}

/// Result of recording a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPayment {
    pub status: PaymentStatus,
    pub outstanding: Money,
    pub events: Vec<InvoiceEvent>,
}

/// Records cumulative payments and reports settlement.
///
/// The tolerance is the one stamped on each invoice at issue time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentLedger;

impl PaymentLedger {
    pub fn new() -> Self {
        Self
    }

    pub fn status(&self, invoice: &Invoice) -> PaymentStatus {
        invoice.payment_status()
    }

    /// Replace the cumulative amount paid. Negative amounts are rejected;
    /// over-payment is accepted and reads as `Paid`.
    pub fn record_payment(
        &self,
        invoice: &mut Invoice,
        amount_paid_cents: i64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<RecordedPayment> {
        let events = invoice.execute(&InvoiceCommand::RecordPayment(RecordPayment {
            invoice_id: invoice.id_typed(),
            amount_paid_cents,
            occurred_at,
        }))?;

        Ok(RecordedPayment {
            status: self.status(invoice),
            outstanding: invoice.outstanding(),
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{ClientId, DomainError, InvoiceId, OrderId};
    use proptest::prelude::*;

    use crate::invoice::{IssueInvoice, InvoiceLine, LineComponent};
    use crate::period::BillingPeriod;

    fn cents(c: u64) -> Money {
        Money::from_cents(c)
    }

    fn invoice_with_ht(ht_cents: u64) -> Invoice {
        invoice_with_tolerance(ht_cents, PAYMENT_EPSILON)
    }

    fn invoice_with_tolerance(ht_cents: u64, epsilon: Money) -> Invoice {
        let id = InvoiceId::new();
        let mut invoice = Invoice::empty(id);
        invoice
            .execute(&InvoiceCommand::IssueInvoice(IssueInvoice {
                invoice_id: id,
                client_id: ClientId::new(),
                number: "INV-202405-X".to_string(),
                period: BillingPeriod::new(2024, 5).unwrap(),
                lines: vec![InvoiceLine::new(
                    OrderId::new(),
                    "R1",
                    vec![LineComponent {
                        description: "Rimmed mounting".to_string(),
                        amount: cents(ht_cents),
                    }],
                )],
                catalog_version: 1,
                tax_rate_percent: 20,
                payment_epsilon: epsilon,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        invoice
    }

    #[test]
    fn exact_payment_is_paid() {
        assert_eq!(derive_status(cents(8424), cents(8424), PAYMENT_EPSILON), PaymentStatus::Paid);
    }

    #[test]
    fn five_cents_short_is_still_paid() {
        assert_eq!(derive_status(cents(8419), cents(8424), PAYMENT_EPSILON), PaymentStatus::Paid);
    }

    #[test]
    fn five_units_short_is_partially_paid() {
        assert_eq!(
            derive_status(cents(7924), cents(8424), PAYMENT_EPSILON),
            PaymentStatus::PartiallyPaid
        );
    }

    #[test]
    fn nothing_paid_is_unpaid() {
        assert_eq!(derive_status(Money::ZERO, cents(8424), PAYMENT_EPSILON), PaymentStatus::Unpaid);
    }

    #[test]
    fn ledger_records_and_reports_status() {
        let ledger = PaymentLedger::default();
        let mut invoice = invoice_with_ht(7020);
        let ttc = invoice.total_ttc().cents() as i64;
        assert_eq!(ttc, 8424);

        let partial = ledger.record_payment(&mut invoice, 4000, Utc::now()).unwrap();
        assert_eq!(partial.status, PaymentStatus::PartiallyPaid);
        assert_eq!(partial.outstanding, cents(4424));
        assert_eq!(partial.events.len(), 1);

        let settled = ledger.record_payment(&mut invoice, ttc - 5, Utc::now()).unwrap();
        assert_eq!(settled.status, PaymentStatus::Paid);

        let err = ledger.record_payment(&mut invoice, -100, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(invoice.amount_paid(), cents(8419));
    }

    #[test]
    fn status_follows_the_tolerance_stamped_on_the_invoice() {
        let ledger = PaymentLedger::new();
        let mut strict = invoice_with_tolerance(1000, Money::ZERO);
        let recorded = ledger.record_payment(&mut strict, 1199, Utc::now()).unwrap();

        assert_eq!(recorded.status, PaymentStatus::PartiallyPaid);
        assert_eq!(ledger.status(&strict), recorded.status);
        assert_eq!(strict.payment_status(), recorded.status);

        let mut lenient = invoice_with_ht(1000);
        let recorded = ledger.record_payment(&mut lenient, 1199, Utc::now()).unwrap();
        assert_eq!(recorded.status, PaymentStatus::Paid);
        assert_eq!(lenient.payment_status(), recorded.status);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: status is a pure function of (paid, ttc).
        #[test]
        fn status_is_deterministic(paid in 0u64..10_000_000, ttc in 0u64..10_000_000) {
            let first = derive_status(cents(paid), cents(ttc), PAYMENT_EPSILON);
            let second = derive_status(cents(paid), cents(ttc), PAYMENT_EPSILON);
            prop_assert_eq!(first, second);
        }

        /// Property: status follows the threshold rules exactly.
        #[test]
        fn status_matches_thresholds(paid in 0u64..10_000_000, ttc in 0u64..10_000_000) {
            let status = derive_status(cents(paid), cents(ttc), PAYMENT_EPSILON);
            let threshold = ttc.saturating_sub(10);
            let expected = if paid >= threshold {
                PaymentStatus::Paid
            } else if paid > 0 {
                PaymentStatus::PartiallyPaid
            } else {
                PaymentStatus::Unpaid
            };
            prop_assert_eq!(status, expected);
        }

        /// Property: paying more never moves the status backwards.
        #[test]
        fn status_is_monotonic_in_amount(a in 0u64..1_000_000, b in 0u64..1_000_000, ttc in 0u64..1_000_000) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let rank = |s: PaymentStatus| match s {
                PaymentStatus::Unpaid => 0,
                PaymentStatus::PartiallyPaid => 1,
                PaymentStatus::Paid => 2,
            };
            prop_assert!(
                rank(derive_status(cents(low), cents(ttc), PAYMENT_EPSILON))
                    <= rank(derive_status(cents(high), cents(ttc), PAYMENT_EPSILON))
            );
        }
    }
}
