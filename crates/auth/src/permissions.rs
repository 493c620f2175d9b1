use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "invoices.generate"). The wildcard
/// `"*"` grants everything and is held only by workshop staff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const ORDERS_READ: Permission = Permission(Cow::Borrowed("orders.read"));
    pub const ORDERS_CREATE: Permission = Permission(Cow::Borrowed("orders.create"));
    pub const ORDERS_EDIT: Permission = Permission(Cow::Borrowed("orders.edit"));
    pub const ORDERS_STATUS: Permission = Permission(Cow::Borrowed("orders.status"));
    pub const INVOICES_READ: Permission = Permission(Cow::Borrowed("invoices.read"));
    pub const INVOICES_GENERATE: Permission = Permission(Cow::Borrowed("invoices.generate"));
    pub const INVOICES_PAYMENTS: Permission = Permission(Cow::Borrowed("invoices.payments"));
    pub const INVOICES_DELETE: Permission = Permission(Cow::Borrowed("invoices.delete"));
    pub const CLIENTS_CREATE: Permission = Permission(Cow::Borrowed("clients.create"));
    pub const CLIENTS_VERIFY: Permission = Permission(Cow::Borrowed("clients.verify"));
    pub const CLIENTS_TIER: Permission = Permission(Cow::Borrowed("clients.tier"));
    pub const CLIENTS_ASSIGN: Permission = Permission(Cow::Borrowed("clients.assign"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
