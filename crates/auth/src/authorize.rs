use serde::Serialize;
use thiserror::Error;

use atelier_core::DomainError;

use crate::{Caller, Permission, permissions_for};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(err: AuthzError) -> Self {
        DomainError::forbidden(err.to_string())
    }
}

/// Check a role-level permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(caller: &Caller, required: &Permission) -> Result<(), AuthzError> {
    let granted = permissions_for(&caller.role);

    if granted.iter().any(|p| p.is_wildcard() || p == required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Auditable account of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub role: &'static str,
    pub effective_permissions: Vec<String>,
    pub reason: String,
}

/// Explain why `authorize` would allow or deny `required` for this caller.
pub fn explain_authorization(caller: &Caller, required: &Permission) -> AuthorizationExplanation {
    let mut effective: Vec<String> = permissions_for(&caller.role)
        .iter()
        .map(|p| p.as_str().to_string())
        .collect();
    effective.sort();

    let has_wildcard = effective.iter().any(|p| p == "*");
    let has_required = effective.iter().any(|p| p == required.as_str());

    let reason = if has_wildcard {
        "role holds wildcard permission '*'".to_string()
    } else if has_required {
        format!("role grants '{required}'")
    } else {
        format!("role '{}' does not grant '{required}'", caller.role.label())
    };

    AuthorizationExplanation {
        required_permission: required.as_str().to_string(),
        granted: has_wildcard || has_required,
        role: caller.role.label(),
        effective_permissions: effective,
        reason,
    }
}
