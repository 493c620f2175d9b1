//! Monthly invoice aggregation.
//!
//! Selects a shop's completed, not-yet-invoiced orders, freezes their price
//! breakdowns into invoice lines and issues the invoice. Persistence and the
//! marking of covered orders are left to the caller.

use chrono::{DateTime, Utc};

use atelier_clients::Client;
use atelier_core::{Aggregate, ClientId, DomainError, DomainResult, InvoiceId, Money};
use atelier_orders::Order;
use atelier_pricing::{PricingEngine, Tier};

use crate::invoice::{Invoice, InvoiceCommand, InvoiceEvent, InvoiceLine, IssueInvoice, LineComponent};
use crate::ledger::PAYMENT_EPSILON;
use crate::period::{BillingPeriod, DEFAULT_INVOICE_PREFIX};

/// Standard VAT rate applied to every invoice.
pub const DEFAULT_TAX_RATE_PERCENT: u32 = 20;

/// An issued invoice together with the events that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedInvoice {
    pub invoice: Invoice,
    pub events: Vec<InvoiceEvent>,
}

#[derive(Debug, Clone)]
pub struct InvoiceAggregator<'a> {
    engine: PricingEngine<'a>,
    tax_rate_percent: u32,
    payment_epsilon: Money,
    number_prefix: String,
}

impl<'a> InvoiceAggregator<'a> {
    pub fn new(engine: PricingEngine<'a>) -> Self {
        Self {
            engine,
            tax_rate_percent: DEFAULT_TAX_RATE_PERCENT,
            payment_epsilon: PAYMENT_EPSILON,
            number_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
        }
    }

    pub fn with_tax_rate(mut self, percent: u32) -> Self {
        self.tax_rate_percent = percent;
        self
    }

    /// Payment shortfall the issued invoices still read as `Paid`.
    pub fn with_payment_epsilon(mut self, epsilon: Money) -> Self {
        self.payment_epsilon = epsilon;
        self
    }

    pub fn with_number_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.number_prefix = prefix.into();
        self
    }

    pub fn tax_rate_percent(&self) -> u32 {
        self.tax_rate_percent
    }

    /// The number an invoice for this client and period would carry.
    pub fn invoice_number(&self, client_id: ClientId, period: BillingPeriod) -> String {
        period.invoice_number(&self.number_prefix, client_id)
    }

    /// Orders of `client_id` that are `Done` and not yet on any invoice,
    /// oldest first.
    pub fn eligible<'o>(&self, client_id: ClientId, candidates: &'o [Order]) -> Vec<&'o Order> {
        let mut eligible: Vec<&Order> = candidates
            .iter()
            .filter(|o| o.owner_id() == Some(client_id) && o.is_invoice_candidate())
            .collect();
        eligible.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.reference().cmp(b.reference()))
                .then_with(|| a.id_typed().cmp(&b.id_typed()))
        });
        eligible
    }

    /// Freeze one order's current price breakdown.
    pub fn line_for(&self, order: &Order, tier: Tier) -> Option<InvoiceLine> {
        let options = order.options()?;
        let breakdown = self.engine.breakdown(options, tier);
        let components = breakdown
            .components
            .into_iter()
            .map(|c| LineComponent {
                description: c.description,
                amount: c.amount,
            })
            .collect();
        Some(InvoiceLine::new(order.id_typed(), order.reference(), components))
    }

    /// Build and issue the invoice for `client` over `candidates`.
    ///
    /// Candidates not owned by the client, not `Done`, or already invoiced are
    /// skipped. No eligible order is a `Validation` error.
    pub fn generate_invoice(
        &self,
        client: &Client,
        period: BillingPeriod,
        candidates: &[Order],
        issued_at: DateTime<Utc>,
    ) -> DomainResult<GeneratedInvoice> {
        let client_id = client.id_typed();
        let tier = client.tier().ok_or_else(|| {
            DomainError::validation(format!(
                "only shops are invoiced (client {client_id} is a {})",
                client.role().label()
            ))
        })?;

        let lines: Vec<InvoiceLine> = self
            .eligible(client_id, candidates)
            .into_iter()
            .filter_map(|order| self.line_for(order, tier))
            .collect();

        if lines.is_empty() {
            return Err(DomainError::validation(format!(
                "nothing to invoice for client {client_id} in {period}"
            )));
        }

        let invoice_id = InvoiceId::new();
        let mut invoice = Invoice::empty(invoice_id);
        let events = invoice.execute(&InvoiceCommand::IssueInvoice(IssueInvoice {
            invoice_id,
            client_id,
            number: self.invoice_number(client_id, period),
            period,
            lines,
            catalog_version: self.engine.catalog().version,
            tax_rate_percent: self.tax_rate_percent,
            payment_epsilon: self.payment_epsilon,
            occurred_at: issued_at,
        }))?;

        Ok(GeneratedInvoice { invoice, events })
    }
}
