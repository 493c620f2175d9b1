//! Infrastructure layer: storage contracts, outbound collaborators,
//! configuration and the scope-checked application services.

pub mod collaborators;
pub mod config;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use services::{
    ClientService, EventSink, InMemoryBackend, InvoiceService, OrderService, ServiceContext,
    ServiceError, ServiceResult,
};
