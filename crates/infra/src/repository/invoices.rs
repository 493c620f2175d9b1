use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use atelier_core::{AggregateRoot, ClientId, ExpectedVersion, InvoiceId};
use atelier_invoicing::Invoice;

use super::{RepositoryError, check_version};

/// Invoice storage. Invoice numbers are unique, which makes the
/// one-invoice-per-client-per-period rule hold under concurrent generation.
pub trait InvoiceRepository: Send + Sync {
    fn insert(&self, invoice: Invoice) -> Result<(), RepositoryError>;

    fn update(&self, invoice: Invoice, expected: ExpectedVersion) -> Result<(), RepositoryError>;

    fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError>;

    fn find_by_number(&self, number: &str) -> Result<Option<Invoice>, RepositoryError>;

    fn by_client(&self, client: ClientId) -> Result<Vec<Invoice>, RepositoryError>;

    fn by_clients(&self, clients: &BTreeSet<ClientId>) -> Result<Vec<Invoice>, RepositoryError>;

    fn list(&self) -> Result<Vec<Invoice>, RepositoryError>;

    fn remove(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError>;
}

impl<R> InvoiceRepository for Arc<R>
where
    R: InvoiceRepository + ?Sized,
{
    fn insert(&self, invoice: Invoice) -> Result<(), RepositoryError> {
        (**self).insert(invoice)
    }

    fn update(&self, invoice: Invoice, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        (**self).update(invoice, expected)
    }

    fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        (**self).get(id)
    }

    fn find_by_number(&self, number: &str) -> Result<Option<Invoice>, RepositoryError> {
        (**self).find_by_number(number)
    }

    fn by_client(&self, client: ClientId) -> Result<Vec<Invoice>, RepositoryError> {
        (**self).by_client(client)
    }

    fn by_clients(&self, clients: &BTreeSet<ClientId>) -> Result<Vec<Invoice>, RepositoryError> {
        (**self).by_clients(clients)
    }

    fn list(&self) -> Result<Vec<Invoice>, RepositoryError> {
        (**self).list()
    }

    fn remove(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        (**self).remove(id)
    }
}

#[derive(Debug, Default)]
struct InvoiceTable {
    rows: HashMap<InvoiceId, Invoice>,
    by_number: HashMap<String, InvoiceId>,
}

/// In-memory invoice store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    inner: RwLock<InvoiceTable>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, keep: impl Fn(&Invoice) -> bool) -> Result<Vec<Invoice>, RepositoryError> {
        let table = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut invoices: Vec<Invoice> = table.rows.values().filter(|i| keep(i)).cloned().collect();
        // Most recent period first, then by number.
        invoices.sort_by(|a, b| {
            b.period()
                .cmp(&a.period())
                .then_with(|| a.number().cmp(b.number()))
        });
        Ok(invoices)
    }
}

impl InvoiceRepository for InMemoryInvoiceRepository {
    fn insert(&self, invoice: Invoice) -> Result<(), RepositoryError> {
        let mut table = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let id = invoice.id_typed();
        let number = invoice.number().to_string();

        if table.by_number.contains_key(&number) {
            return Err(RepositoryError::Duplicate {
                what: "invoice number",
                key: number,
            });
        }
        if table.rows.contains_key(&id) {
            return Err(RepositoryError::Duplicate {
                what: "invoice id",
                key: id.to_string(),
            });
        }

        table.by_number.insert(number, id);
        table.rows.insert(id, invoice);
        Ok(())
    }

    fn update(&self, invoice: Invoice, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        let mut table = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let id = invoice.id_typed();
        let stored = table
            .rows
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("invoice {id}")))?;
        check_version("invoice", expected, stored.version())?;
        table.rows.insert(id, invoice);
        Ok(())
    }

    fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let table = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(table.rows.get(&id).cloned())
    }

    fn find_by_number(&self, number: &str) -> Result<Option<Invoice>, RepositoryError> {
        let table = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(table
            .by_number
            .get(number)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    fn by_client(&self, client: ClientId) -> Result<Vec<Invoice>, RepositoryError> {
        self.select(|i| i.client_id() == Some(client))
    }

    fn by_clients(&self, clients: &BTreeSet<ClientId>) -> Result<Vec<Invoice>, RepositoryError> {
        self.select(|i| i.client_id().is_some_and(|id| clients.contains(&id)))
    }

    fn list(&self) -> Result<Vec<Invoice>, RepositoryError> {
        self.select(|_| true)
    }

    fn remove(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let mut table = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let removed = table.rows.remove(&id);
        if let Some(invoice) = &removed {
            table.by_number.remove(invoice.number());
        }
        Ok(removed)
    }
}
