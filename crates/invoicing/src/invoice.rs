use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, AggregateRoot, ClientId, DomainError, InvoiceId, Money, OrderId};
use atelier_events::Event;

use crate::ledger::{PAYMENT_EPSILON, PaymentStatus, derive_status};
use crate::period::BillingPeriod;

/// Upper bound accepted for a tax rate.
const MAX_TAX_RATE_PERCENT: u32 = 100;

/// One priced component of a frozen invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineComponent {
    pub description: String,
    pub amount: Money,
}

/// Frozen snapshot of one order's price at generation time.
///
/// Never recomputed: later catalog or order changes leave it untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub order_id: OrderId,
    pub reference: String,
    pub components: Vec<LineComponent>,
    pub line_total: Money,
}

impl InvoiceLine {
    /// Build a line whose total is the sum of its components.
    pub fn new(order_id: OrderId, reference: impl Into<String>, components: Vec<LineComponent>) -> Self {
        let line_total = components.iter().map(|c| c.amount).sum();
        Self {
            order_id,
            reference: reference.into(),
            components,
            line_total,
        }
    }

    fn is_consistent(&self) -> bool {
        self.components.iter().map(|c| c.amount).sum::<Money>() == self.line_total
    }
}

/// Aggregate root: Invoice.
///
/// Immutable once issued, except for `amount_paid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    client_id: Option<ClientId>,
    number: String,
    period: Option<BillingPeriod>,
    issued_at: Option<DateTime<Utc>>,
    lines: Vec<InvoiceLine>,
    catalog_version: u32,
    tax_rate_percent: u32,
    payment_epsilon: Money,
    total_ht: Money,
    total_ttc: Money,
    amount_paid: Money,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-issued aggregate instance.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            client_id: None,
            number: String::new(),
            period: None,
            issued_at: None,
            lines: Vec::new(),
            catalog_version: 0,
            tax_rate_percent: 0,
            payment_epsilon: PAYMENT_EPSILON,
            total_ht: Money::ZERO,
            total_ttc: Money::ZERO,
            amount_paid: Money::ZERO,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn period(&self) -> Option<BillingPeriod> {
        self.period
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        self.lines.iter().map(|l| l.order_id).collect()
    }

    pub fn catalog_version(&self) -> u32 {
        self.catalog_version
    }

    pub fn tax_rate_percent(&self) -> u32 {
        self.tax_rate_percent
    }

    /// Shortfall still read as settled, fixed when the invoice was issued.
    pub fn payment_epsilon(&self) -> Money {
        self.payment_epsilon
    }

    pub fn total_ht(&self) -> Money {
        self.total_ht
    }

    pub fn total_ttc(&self) -> Money {
        self.total_ttc
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    /// Amount still due; over-payment reads as zero.
    pub fn outstanding(&self) -> Money {
        self.total_ttc.saturating_sub(self.amount_paid)
    }

    /// Derived from stored amounts on every call.
    pub fn payment_status(&self) -> PaymentStatus {
        derive_status(self.amount_paid, self.total_ttc, self.payment_epsilon)
    }

    pub fn is_issued(&self) -> bool {
        self.created
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub number: String,
    pub period: BillingPeriod,
    pub lines: Vec<InvoiceLine>,
    pub catalog_version: u32,
    pub tax_rate_percent: u32,
    pub payment_epsilon: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
///
/// Carries the new cumulative amount paid to date, not a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub invoice_id: InvoiceId,
    pub amount_paid_cents: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteInvoice {
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    RecordPayment(RecordPayment),
    DeleteInvoice(DeleteInvoice),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub number: String,
    pub period: BillingPeriod,
    pub lines: Vec<InvoiceLine>,
    pub catalog_version: u32,
    pub tax_rate_percent: u32,
    pub payment_epsilon: Money,
    pub total_ht: Money,
    pub total_ttc: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub invoice_id: InvoiceId,
    pub previous: Money,
    pub amount_paid: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDeleted {
    pub invoice_id: InvoiceId,
    pub number: String,
    /// Orders whose invoice marker must be released.
    pub order_ids: Vec<OrderId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    PaymentRecorded(PaymentRecorded),
    InvoiceDeleted(InvoiceDeleted),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRecorded(_) => "invoicing.invoice.payment_recorded",
            InvoiceEvent::InvoiceDeleted(_) => "invoicing.invoice.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::PaymentRecorded(e) => e.occurred_at,
            InvoiceEvent::InvoiceDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.client_id = Some(e.client_id);
                self.number = e.number.clone();
                self.period = Some(e.period);
                self.issued_at = Some(e.occurred_at);
                self.lines = e.lines.clone();
                self.catalog_version = e.catalog_version;
                self.tax_rate_percent = e.tax_rate_percent;
                self.payment_epsilon = e.payment_epsilon;
                self.total_ht = e.total_ht;
                self.total_ttc = e.total_ttc;
                self.amount_paid = Money::ZERO;
                self.created = true;
            }
            InvoiceEvent::PaymentRecorded(e) => {
                self.amount_paid = e.amount_paid;
            }
            InvoiceEvent::InvoiceDeleted(_) => {
                self.deleted = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            InvoiceCommand::DeleteInvoice(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Invoice {
    fn ensure_live(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found(format!("invoice {invoice_id}")));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }

        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot issue invoice without lines"));
        }

        if cmd.tax_rate_percent > MAX_TAX_RATE_PERCENT {
            return Err(DomainError::validation(format!(
                "tax rate {}% exceeds {MAX_TAX_RATE_PERCENT}%",
                cmd.tax_rate_percent
            )));
        }

        let mut seen = BTreeSet::new();
        for line in &cmd.lines {
            if !seen.insert(line.order_id) {
                return Err(DomainError::validation(format!(
                    "order {} appears twice on the invoice",
                    line.order_id
                )));
            }
            if !line.is_consistent() {
                return Err(DomainError::invariant(format!(
                    "line for order {} does not add up to its total",
                    line.order_id
                )));
            }
        }

        let total_ht: Money = cmd.lines.iter().map(|l| l.line_total).sum();
        let total_ttc = total_ht + total_ht.percent(cmd.tax_rate_percent);

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            invoice_id: cmd.invoice_id,
            client_id: cmd.client_id,
            number: cmd.number.trim().to_string(),
            period: cmd.period,
            lines: cmd.lines.clone(),
            catalog_version: cmd.catalog_version,
            tax_rate_percent: cmd.tax_rate_percent,
            payment_epsilon: cmd.payment_epsilon,
            total_ht,
            total_ttc,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(&self, cmd: &RecordPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.invoice_id)?;

        let cents = u64::try_from(cmd.amount_paid_cents).map_err(|_| {
            DomainError::validation(format!(
                "amount paid cannot be negative (got {} cents)",
                cmd.amount_paid_cents
            ))
        })?;
        let amount_paid = Money::from_cents(cents);

        if amount_paid == self.amount_paid {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::PaymentRecorded(PaymentRecorded {
            invoice_id: cmd.invoice_id,
            previous: self.amount_paid,
            amount_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.invoice_id)?;

        if !self.amount_paid.is_zero() {
            return Err(DomainError::conflict(format!(
                "invoice {} has recorded payments ({}) and cannot be deleted",
                self.number, self.amount_paid
            )));
        }

        Ok(vec![InvoiceEvent::InvoiceDeleted(InvoiceDeleted {
            invoice_id: cmd.invoice_id,
            number: self.number.clone(),
            order_ids: self.order_ids(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
