//! Invoicing: monthly aggregation of finished jobs and payment tracking.
//!
//! Pure domain logic. The aggregator prices orders through an injected
//! catalog; storage and document delivery happen in `atelier-infra`.

pub mod aggregator;
pub mod invoice;
pub mod ledger;
pub mod period;

pub use aggregator::{DEFAULT_TAX_RATE_PERCENT, GeneratedInvoice, InvoiceAggregator};
pub use invoice::{
    DeleteInvoice, Invoice, InvoiceCommand, InvoiceDeleted, InvoiceEvent, InvoiceIssued,
    InvoiceLine, IssueInvoice, LineComponent, PaymentRecorded, RecordPayment,
};
pub use ledger::{PAYMENT_EPSILON, PaymentLedger, PaymentStatus, RecordedPayment, derive_status};
pub use period::{BillingPeriod, DEFAULT_INVOICE_PREFIX};
