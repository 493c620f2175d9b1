//! Fabrication orders ("jobs") placed by shops against the workshop.
//!
//! This crate contains the order entity, its production status machine and
//! the priced job options, implemented purely as deterministic domain logic
//! (no IO, no pricing, no storage).

pub mod options;
pub mod order;

pub use options::{DEFAULT_DIAMOND_FINISH, DEFAULT_URGENCY, JobOptions, MAX_ENGRAVINGS};
pub use order::{
    AttachPhoto, ChangeStatus, CreatedBy, DeleteOrder, EditOrder, InvoiceReleased, MarkInvoiced,
    Order, OrderCommand, OrderDeleted, OrderDetails, OrderEdited, OrderEvent, OrderInvoiced,
    OrderPlaced, OrderStatus, PhotoAttached, PhotoRef, PlaceOrder, ReleaseInvoice, StatusChanged,
};
