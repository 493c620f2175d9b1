//! `atelier-auth`: caller identity, role permissions and record scoping.
//!
//! This crate is decoupled from transport and storage: it receives an
//! already-authenticated `Caller` and answers pure policy questions.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod scope;

pub use authorize::{AuthorizationExplanation, AuthzError, authorize, explain_authorization};
pub use permissions::Permission;
pub use principal::Caller;
pub use roles::permissions_for;
pub use scope::{AccessScope, CreationTarget, OwnerFilter};
