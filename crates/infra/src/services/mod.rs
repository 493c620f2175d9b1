//! Application services: scope-checked operations over the repositories.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! caller + request
//!   ↓
//! 1. permission + scope check (atelier-auth)
//!   ↓
//! 2. load entity (NotFound before Forbidden)
//!   ↓
//! 3. aggregate.execute(command) (pure decision)
//!   ↓
//! 4. write with ExpectedVersion (stale write → Conflict)
//!   ↓
//! 5. publish envelopes, notify (best effort, logged)
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use atelier_core::{ClientId, DomainError};
use atelier_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use atelier_pricing::PricingCatalog;

use crate::collaborators::{
    DocumentRenderer, InMemoryPhotoStorage, Notifier, PhotoStorage, PlainTextRenderer,
    RecordingNotifier, RenderError, StorageError,
};
use crate::config::AppConfig;
use crate::repository::{
    ClientRepository, InMemoryClientRepository, InMemoryInvoiceRepository,
    InMemoryOrderRepository, InvoiceRepository, OrderRepository, RepositoryError,
};

pub mod clients;
pub mod invoices;
pub mod orders;

pub use clients::ClientService;
pub use invoices::{
    GeneratedInvoiceOutcome, InvoiceService, PaymentOutcome, PeriodReport, PeriodReportEntry,
    PeriodResult,
};
pub use orders::{OrderService, StatusChangeOutcome};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error("photo storage: {0}")]
    Storage(#[from] StorageError),

    #[error("invoice rendering: {0}")]
    Render(#[from] RenderError),
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value.to_domain() {
            Some(domain) => ServiceError::Domain(domain),
            None => ServiceError::Repository(value),
        }
    }
}

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.domain().is_some_and(DomainError::is_conflict)
    }

    pub fn is_forbidden(&self) -> bool {
        self.domain().is_some_and(DomainError::is_forbidden)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.domain(), Some(DomainError::NotFound(_)))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.domain(), Some(DomainError::Validation(_)))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Destination for committed event envelopes.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: EventEnvelope<JsonValue>) -> Result<(), String>;
}

impl<B> EventSink for B
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn emit(&self, envelope: EventEnvelope<JsonValue>) -> Result<(), String> {
        self.publish(envelope).map_err(|e| format!("{e:?}"))
    }
}

/// Shared dependencies of the services.
#[derive(Clone)]
pub struct ServiceContext {
    pub clients: Arc<dyn ClientRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub photos: Arc<dyn PhotoStorage>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub events: Arc<dyn EventSink>,
    pub catalog: Arc<PricingCatalog>,
    pub config: AppConfig,
}

impl ServiceContext {
    /// Publish committed events; `base_version` is the version before they
    /// were applied. Failures are logged, the write stands.
    pub(crate) fn publish<E>(
        &self,
        client_id: ClientId,
        aggregate_id: impl Into<Uuid>,
        aggregate_type: &'static str,
        base_version: u64,
        events: &[E],
    ) where
        E: Event + Serialize,
    {
        let aggregate_id = aggregate_id.into();
        for (offset, event) in events.iter().enumerate() {
            let sequence = base_version + offset as u64 + 1;
            let published = EventEnvelope::from_typed(
                client_id,
                aggregate_id,
                aggregate_type,
                sequence,
                event,
            )
            .map_err(|e| e.to_string())
            .and_then(|envelope| self.events.emit(envelope));

            if let Err(error) = published {
                tracing::warn!(
                    %aggregate_id,
                    event_type = event.event_type(),
                    %error,
                    "event publication failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("catalog_version", &self.catalog.version)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// In-process adapters for every contract, kept reachable for inspection.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    pub clients: Arc<InMemoryClientRepository>,
    pub orders: Arc<InMemoryOrderRepository>,
    pub invoices: Arc<InMemoryInvoiceRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub photos: Arc<InMemoryPhotoStorage>,
    pub bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the adapters into a context, loading the configured catalog.
    pub fn context(&self, config: AppConfig) -> anyhow::Result<ServiceContext> {
        let catalog = config.load_catalog()?;
        Ok(ServiceContext {
            clients: self.clients.clone(),
            orders: self.orders.clone(),
            invoices: self.invoices.clone(),
            notifier: self.notifier.clone(),
            photos: self.photos.clone(),
            renderer: Arc::new(PlainTextRenderer),
            events: self.bus.clone(),
            catalog: Arc::new(catalog),
            config,
        })
    }
}
