//! Persistence contracts and in-memory adapters.
//!
//! Every write replaces a whole entity under one lock, so a reader never
//! observes a partially written order, client or invoice.

use thiserror::Error;

use atelier_core::{DomainError, ExpectedVersion};

pub mod clients;
pub mod invoices;
pub mod orders;

pub use clients::{ClientRepository, InMemoryClientRepository};
pub use invoices::{InMemoryInvoiceRepository, InvoiceRepository};
pub use orders::{InMemoryOrderRepository, OrderRepository};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A uniqueness constraint was violated.
    #[error("duplicate {what}: {key}")]
    Duplicate { what: &'static str, key: String },

    /// Optimistic concurrency check failed.
    #[error("stale write on {what} (expected {expected:?}, stored version {actual})")]
    StaleVersion {
        what: &'static str,
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("repository lock poisoned")]
    Poisoned,
}

impl RepositoryError {
    /// Domain view of the failure, when it has one.
    pub fn to_domain(&self) -> Option<DomainError> {
        match self {
            RepositoryError::Duplicate { .. } | RepositoryError::StaleVersion { .. } => {
                Some(DomainError::conflict(self.to_string()))
            }
            RepositoryError::NotFound(what) => Some(DomainError::not_found(what.clone())),
            RepositoryError::Poisoned => None,
        }
    }
}

pub(crate) fn check_version(
    what: &'static str,
    expected: ExpectedVersion,
    actual: u64,
) -> Result<(), RepositoryError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(RepositoryError::StaleVersion {
            what,
            expected,
            actual,
        })
    }
}
