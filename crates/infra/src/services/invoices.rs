use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;

use atelier_auth::{AccessScope, Caller, OwnerFilter, Permission};
use atelier_clients::Client;
use atelier_core::{
    Aggregate, AggregateRoot, ClientId, DomainError, ExpectedVersion, InvoiceId, Money, OrderId,
};
use atelier_events::Event;
use atelier_invoicing::{
    BillingPeriod, DeleteInvoice, Invoice, InvoiceAggregator, InvoiceCommand, PaymentLedger,
    PaymentStatus,
};
use atelier_orders::{MarkInvoiced, Order, OrderCommand, OrderEvent, ReleaseInvoice};
use atelier_pricing::PricingEngine;

use crate::collaborators::{Attachment, Notification, RenderedDocument};
use crate::repository::RepositoryError;

use super::{ServiceContext, ServiceError, ServiceResult};

const AGGREGATE_TYPE: &str = "invoicing.invoice";
const ORDER_AGGREGATE_TYPE: &str = "orders.order";

/// Attempts at releasing an order that keeps being written concurrently.
const RELEASE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedInvoiceOutcome {
    pub invoice: Invoice,
    /// Whether the rendered document reached the client.
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub invoice: Invoice,
    pub status: PaymentStatus,
    pub outstanding: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodResult {
    Issued {
        invoice_id: InvoiceId,
        number: String,
        total_ttc: Money,
        delivered: bool,
    },
    AlreadyInvoiced {
        number: String,
    },
    NothingToInvoice,
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodReportEntry {
    pub client_id: ClientId,
    pub result: PeriodResult,
}

/// Per-client outcome of a period run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodReport {
    pub period: BillingPeriod,
    pub entries: Vec<PeriodReportEntry>,
}

impl PeriodReport {
    pub fn issued(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.result, PeriodResult::Issued { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.result, PeriodResult::Failed { .. }))
            .count()
    }

    pub fn entry(&self, client_id: ClientId) -> Option<&PeriodResult> {
        self.entries
            .iter()
            .find(|e| e.client_id == client_id)
            .map(|e| &e.result)
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceService {
    ctx: ServiceContext,
}

impl InvoiceService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Invoice the client's finished, not yet invoiced orders for `period`.
    ///
    /// An existing invoice for the period is a `Conflict`; no eligible order
    /// is a `Validation` error. Delivery of the document is best effort.
    pub fn generate_invoice(
        &self,
        caller: &Caller,
        client_id: ClientId,
        period: BillingPeriod,
    ) -> ServiceResult<GeneratedInvoiceOutcome> {
        AccessScope::new(caller).require(&Permission::INVOICES_GENERATE)?;
        let client = self.load_client(client_id)?;

        let number = self.aggregator().invoice_number(client_id, period);
        if self.ctx.invoices.find_by_number(&number)?.is_some() {
            return Err(already_invoiced(client_id, &number).into());
        }

        self.issue(&client, period)
    }

    /// Run generation for every verified shop. One client's failure never
    /// stops the batch.
    pub fn generate_period_invoices(
        &self,
        caller: &Caller,
        period: BillingPeriod,
    ) -> ServiceResult<PeriodReport> {
        AccessScope::new(caller).require(&Permission::INVOICES_GENERATE)?;

        let shops = self
            .ctx
            .clients
            .list()?
            .into_iter()
            .filter(|c| c.role().is_shop() && c.is_verified());

        let mut entries = Vec::new();
        for client in shops {
            let client_id = client.id_typed();
            let result = self.period_result(&client, period);
            if let PeriodResult::Failed { reason } = &result {
                tracing::warn!(%client_id, %period, %reason, "period invoice failed");
            }
            entries.push(PeriodReportEntry { client_id, result });
        }

        let report = PeriodReport { period, entries };
        tracing::info!(
            %period,
            clients = report.entries.len(),
            issued = report.issued(),
            failed = report.failed(),
            "period invoicing finished"
        );
        Ok(report)
    }

    /// Replace the cumulative amount paid on an invoice.
    pub fn record_payment(
        &self,
        caller: &Caller,
        invoice_id: InvoiceId,
        amount_paid_cents: i64,
    ) -> ServiceResult<PaymentOutcome> {
        AccessScope::new(caller).require(&Permission::INVOICES_PAYMENTS)?;
        let mut invoice = self.load(invoice_id)?;
        let base_version = invoice.version();

        let recorded = self
            .ledger()
            .record_payment(&mut invoice, amount_paid_cents, Utc::now())?;

        if !recorded.events.is_empty() {
            self.ctx
                .invoices
                .update(invoice.clone(), ExpectedVersion::Exact(base_version))?;
            self.publish_invoice(&invoice, base_version, &recorded.events);
            tracing::info!(
                %invoice_id,
                amount_paid = %invoice.amount_paid(),
                status = %recorded.status,
                "payment recorded"
            );
        }

        Ok(PaymentOutcome {
            invoice,
            status: recorded.status,
            outstanding: recorded.outstanding,
        })
    }

    /// Delete an unpaid invoice and release its orders for re-invoicing.
    ///
    /// Orders are released before the invoice is tombstoned. If a release or
    /// the tombstone write fails, the released orders are marked again and
    /// the invoice stays in place.
    pub fn delete_invoice(&self, caller: &Caller, invoice_id: InvoiceId) -> ServiceResult<()> {
        AccessScope::new(caller).require(&Permission::INVOICES_DELETE)?;
        let mut invoice = self.load(invoice_id)?;
        let base_version = invoice.version();

        let events = invoice.execute(&InvoiceCommand::DeleteInvoice(DeleteInvoice {
            invoice_id,
            occurred_at: Utc::now(),
        }))?;

        let mut released = Vec::new();
        for order_id in invoice.order_ids() {
            match self.release_order(order_id, invoice_id) {
                Ok(()) => released.push(order_id),
                Err(error) => {
                    tracing::warn!(%invoice_id, %order_id, %error, "order release failed, keeping invoice");
                    self.remark(invoice_id, &released);
                    return Err(error);
                }
            }
        }

        // A payment recorded meanwhile makes the versioned tombstone fail.
        if let Err(error) = self
            .ctx
            .invoices
            .update(invoice.clone(), ExpectedVersion::Exact(base_version))
        {
            tracing::warn!(%invoice_id, %error, "invoice tombstone failed, keeping invoice");
            self.remark(invoice_id, &released);
            return Err(error.into());
        }

        self.ctx.invoices.remove(invoice_id)?;
        self.publish_invoice(&invoice, base_version, &events);
        tracing::info!(%invoice_id, number = invoice.number(), "invoice deleted");
        Ok(())
    }

    pub fn get_invoice(&self, caller: &Caller, invoice_id: InvoiceId) -> ServiceResult<Invoice> {
        let scope = AccessScope::new(caller);
        scope.require(&Permission::INVOICES_READ)?;

        let invoice = self.load(invoice_id)?;
        if let Some(client_id) = invoice.client_id() {
            scope.ensure_can_view(client_id)?;
        }
        tracing::debug!(%invoice_id, "invoice read");
        Ok(invoice)
    }

    /// Invoices visible to the caller, most recent period first.
    pub fn list_invoices(&self, caller: &Caller) -> ServiceResult<Vec<Invoice>> {
        let scope = AccessScope::new(caller);
        scope.require(&Permission::INVOICES_READ)?;

        let invoices = match scope.visible_owners() {
            OwnerFilter::All => self.ctx.invoices.list()?,
            OwnerFilter::Only(clients) => self.ctx.invoices.by_clients(&clients)?,
        };
        let invoices: Vec<Invoice> = invoices.into_iter().filter(|i| !i.is_deleted()).collect();
        tracing::debug!(caller = %caller.id, count = invoices.len(), "invoices listed");
        Ok(invoices)
    }

    pub fn render_invoice(
        &self,
        caller: &Caller,
        invoice_id: InvoiceId,
    ) -> ServiceResult<RenderedDocument> {
        let invoice = self.get_invoice(caller, invoice_id)?;
        let client = self.invoice_client(&invoice)?;
        Ok(self.ctx.renderer.render(&invoice, &client)?)
    }

    /// Settlement derived with the tolerance stamped on the invoice.
    pub fn payment_status(
        &self,
        caller: &Caller,
        invoice_id: InvoiceId,
    ) -> ServiceResult<PaymentStatus> {
        let invoice = self.get_invoice(caller, invoice_id)?;
        Ok(self.ledger().status(&invoice))
    }

    fn aggregator(&self) -> InvoiceAggregator<'_> {
        InvoiceAggregator::new(PricingEngine::new(&self.ctx.catalog))
            .with_tax_rate(self.ctx.config.tax_rate_percent)
            .with_payment_epsilon(self.ctx.config.payment_epsilon)
            .with_number_prefix(self.ctx.config.invoice_prefix.clone())
    }

    fn ledger(&self) -> PaymentLedger {
        PaymentLedger::new()
    }

    fn period_result(&self, client: &Client, period: BillingPeriod) -> PeriodResult {
        let client_id = client.id_typed();
        let aggregator = self.aggregator();
        let number = aggregator.invoice_number(client_id, period);

        match self.ctx.invoices.find_by_number(&number) {
            Ok(Some(_)) => return PeriodResult::AlreadyInvoiced { number },
            Ok(None) => {}
            Err(error) => {
                return PeriodResult::Failed {
                    reason: error.to_string(),
                };
            }
        }

        let has_candidates = self
            .ctx
            .orders
            .by_owner(client_id)
            .map(|orders| !aggregator.eligible(client_id, &orders).is_empty());
        match has_candidates {
            Ok(false) => return PeriodResult::NothingToInvoice,
            Ok(true) => {}
            Err(error) => {
                return PeriodResult::Failed {
                    reason: error.to_string(),
                };
            }
        }

        match self.issue(client, period) {
            Ok(outcome) => PeriodResult::Issued {
                invoice_id: outcome.invoice.id_typed(),
                number: outcome.invoice.number().to_string(),
                total_ttc: outcome.invoice.total_ttc(),
                delivered: outcome.delivered,
            },
            Err(error) if error.is_conflict() => PeriodResult::AlreadyInvoiced { number },
            Err(error) => PeriodResult::Failed {
                reason: error.to_string(),
            },
        }
    }

    /// Build, persist and mark. If marking an order fails, the orders marked
    /// so far are released and the invoice is removed.
    fn issue(&self, client: &Client, period: BillingPeriod) -> ServiceResult<GeneratedInvoiceOutcome> {
        let client_id = client.id_typed();
        let candidates = self.ctx.orders.by_owner(client_id)?;
        let generated = self
            .aggregator()
            .generate_invoice(client, period, &candidates, Utc::now())?;
        let invoice = generated.invoice;
        let invoice_id = invoice.id_typed();

        self.ctx
            .invoices
            .insert(invoice.clone())
            .map_err(|error| match error {
                RepositoryError::Duplicate { what: "invoice number", .. } => {
                    ServiceError::from(already_invoiced(client_id, invoice.number()))
                }
                other => ServiceError::from(other),
            })?;

        let by_id: HashMap<OrderId, &Order> =
            candidates.iter().map(|o| (o.id_typed(), o)).collect();
        let mut marked = Vec::new();
        for order_id in invoice.order_ids() {
            let Some(order) = by_id.get(&order_id) else {
                continue;
            };
            match self.mark_order(order, invoice_id) {
                Ok(()) => marked.push(order_id),
                Err(error) => {
                    tracing::warn!(%invoice_id, %order_id, %error, "marking order failed, rolling back invoice");
                    self.roll_back(invoice_id, &marked);
                    return Err(error);
                }
            }
        }

        self.publish_invoice(&invoice, 0, &generated.events);
        tracing::info!(
            %invoice_id,
            %client_id,
            number = invoice.number(),
            lines = invoice.lines().len(),
            total_ttc = %invoice.total_ttc(),
            "invoice issued"
        );

        let delivered = self.deliver(&invoice, client);
        Ok(GeneratedInvoiceOutcome { invoice, delivered })
    }

    fn mark_order(&self, order: &Order, invoice_id: InvoiceId) -> ServiceResult<()> {
        let mut order = order.clone();
        let order_id = order.id_typed();
        let base_version = order.version();

        let events = order.execute(&OrderCommand::MarkInvoiced(MarkInvoiced {
            order_id,
            invoice_id,
            occurred_at: Utc::now(),
        }))?;
        self.ctx
            .orders
            .save(order.clone(), ExpectedVersion::Exact(base_version))?;
        self.publish_order(&order, base_version, &events);
        Ok(())
    }

    /// Reload-and-retry so a concurrent write on the order does not strand it.
    fn release_order(&self, order_id: OrderId, invoice_id: InvoiceId) -> ServiceResult<()> {
        let mut last_error = None;
        for _ in 0..RELEASE_ATTEMPTS {
            let Some(mut order) = self.ctx.orders.get(order_id)? else {
                return Ok(());
            };
            if order.invoiced_in() != Some(invoice_id) {
                return Ok(());
            }
            let base_version = order.version();
            let events = order.execute(&OrderCommand::ReleaseInvoice(ReleaseInvoice {
                order_id,
                invoice_id,
                occurred_at: Utc::now(),
            }))?;

            match self
                .ctx
                .orders
                .save(order.clone(), ExpectedVersion::Exact(base_version))
            {
                Ok(()) => {
                    self.publish_order(&order, base_version, &events);
                    return Ok(());
                }
                Err(error @ RepositoryError::StaleVersion { .. }) => last_error = Some(error),
                Err(error) => return Err(error.into()),
            }
        }
        Err(last_error
            .map(ServiceError::from)
            .unwrap_or_else(|| DomainError::conflict(format!("order {order_id} kept changing")).into()))
    }

    fn remark(&self, invoice_id: InvoiceId, released: &[OrderId]) {
        for order_id in released {
            let marked = match self.ctx.orders.get(*order_id) {
                Ok(Some(order)) => self.mark_order(&order, invoice_id),
                Ok(None) => Ok(()),
                Err(error) => Err(error.into()),
            };
            if let Err(error) = marked {
                tracing::warn!(%invoice_id, %order_id, %error, "re-marking order failed");
            }
        }
    }

    fn roll_back(&self, invoice_id: InvoiceId, marked: &[OrderId]) {
        for order_id in marked {
            if let Err(error) = self.release_order(*order_id, invoice_id) {
                tracing::warn!(%invoice_id, %order_id, %error, "rollback release failed");
            }
        }
        if let Err(error) = self.ctx.invoices.remove(invoice_id) {
            tracing::warn!(%invoice_id, %error, "rollback removal failed");
        }
    }

    /// Render and mail the invoice. Failures are logged, never propagated.
    fn deliver(&self, invoice: &Invoice, client: &Client) -> bool {
        let invoice_id = invoice.id_typed();
        let document = match self.ctx.renderer.render(invoice, client) {
            Ok(document) => document,
            Err(error) => {
                tracing::warn!(%invoice_id, %error, "invoice rendering failed");
                return false;
            }
        };

        let notification = Notification::new(
            format!("Invoice {}", invoice.number()),
            format!(
                "Please find attached invoice {} for {} ({} incl. tax).",
                invoice.number(),
                invoice
                    .period()
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
                invoice.total_ttc()
            ),
        )
        .with_attachment(Attachment {
            file_name: document.file_name,
            content_type: document.content_type,
            bytes: document.bytes,
        });

        match self.ctx.notifier.notify(client.email(), &notification) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%invoice_id, %error, "invoice delivery failed");
                false
            }
        }
    }

    fn publish_invoice<E>(&self, invoice: &Invoice, base_version: u64, events: &[E])
    where
        E: Event + Serialize,
    {
        if let Some(client_id) = invoice.client_id() {
            self.ctx
                .publish(client_id, invoice.id_typed(), AGGREGATE_TYPE, base_version, events);
        }
    }

    fn publish_order(&self, order: &Order, base_version: u64, events: &[OrderEvent]) {
        if let Some(owner_id) = order.owner_id() {
            self.ctx.publish(
                owner_id,
                order.id_typed(),
                ORDER_AGGREGATE_TYPE,
                base_version,
                events,
            );
        }
    }

    fn load(&self, invoice_id: InvoiceId) -> ServiceResult<Invoice> {
        self.ctx
            .invoices
            .get(invoice_id)?
            .filter(|i| !i.is_deleted())
            .ok_or_else(|| DomainError::not_found(format!("invoice {invoice_id}")).into())
    }

    fn load_client(&self, client_id: ClientId) -> ServiceResult<Client> {
        self.ctx
            .clients
            .get(client_id)?
            .ok_or_else(|| DomainError::not_found(format!("client {client_id}")).into())
    }

    fn invoice_client(&self, invoice: &Invoice) -> ServiceResult<Client> {
        let client_id = invoice.client_id().ok_or_else(|| {
            DomainError::invariant(format!("invoice {} has no client", invoice.id_typed()))
        })?;
        self.load_client(client_id)
    }
}

fn already_invoiced(client_id: ClientId, number: &str) -> DomainError {
    DomainError::conflict(format!(
        "client {client_id} already invoiced this period ({number})"
    ))
}
