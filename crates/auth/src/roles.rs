use atelier_clients::ClientRole;

use crate::Permission;

/// Role → granted permissions.
///
/// Shops and managers share the same operational set; what differs between
/// them is the set of owners they reach, which `AccessScope` decides.
pub fn permissions_for(role: &ClientRole) -> Vec<Permission> {
    match role {
        ClientRole::Admin => vec![Permission::WILDCARD],
        ClientRole::Shop { .. } | ClientRole::Manager { .. } => vec![
            Permission::ORDERS_READ,
            Permission::ORDERS_CREATE,
            Permission::ORDERS_EDIT,
            Permission::INVOICES_READ,
        ],
    }
}
