//! Record-level access scoping.
//!
//! Permissions (`authorize`) say *what* a role may do; the scope says *whose*
//! orders and invoices it may do it to:
//!
//! | role    | sees                     | creates for                      |
//! |---------|--------------------------|----------------------------------|
//! | shop    | itself                   | itself                           |
//! | manager | its assigned shops       | one assigned shop, named explicitly |
//! | admin   | everyone                 | any shop, named explicitly       |
//!
//! Out-of-scope records are reported as `Forbidden`. Callers check existence
//! first, so genuine absence stays `NotFound`.

use std::collections::BTreeSet;

use atelier_clients::ClientRole;
use atelier_core::{ClientId, DomainError, DomainResult};
use atelier_orders::CreatedBy;

use crate::{Caller, Permission, authorize};

/// The set of owners whose records a caller may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerFilter {
    All,
    Only(BTreeSet<ClientId>),
}

impl OwnerFilter {
    pub fn allows(&self, owner: ClientId) -> bool {
        match self {
            OwnerFilter::All => true,
            OwnerFilter::Only(owners) => owners.contains(&owner),
        }
    }
}

/// Resolved owner and audit trail for a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationTarget {
    pub owner_id: ClientId,
    pub created_by: CreatedBy,
}

#[derive(Debug, Clone, Copy)]
pub struct AccessScope<'a> {
    caller: &'a Caller,
}

impl<'a> AccessScope<'a> {
    pub fn new(caller: &'a Caller) -> Self {
        Self { caller }
    }

    pub fn caller(&self) -> &'a Caller {
        self.caller
    }

    pub fn visible_owners(&self) -> OwnerFilter {
        match &self.caller.role {
            ClientRole::Admin => OwnerFilter::All,
            ClientRole::Manager { assigned_shops } => OwnerFilter::Only(assigned_shops.clone()),
            ClientRole::Shop { .. } => OwnerFilter::Only(BTreeSet::from([self.caller.id])),
        }
    }

    pub fn can_view(&self, owner: ClientId) -> bool {
        match &self.caller.role {
            ClientRole::Admin => true,
            ClientRole::Manager { assigned_shops } => assigned_shops.contains(&owner),
            ClientRole::Shop { .. } => owner == self.caller.id,
        }
    }

    pub fn ensure_can_view(&self, owner: ClientId) -> DomainResult<()> {
        if self.can_view(owner) {
            Ok(())
        } else {
            Err(DomainError::forbidden(format!(
                "client {} ({}) has no access to records of {owner}",
                self.caller.id,
                self.caller.role.label()
            )))
        }
    }

    /// Decide who owns an order the caller is about to create.
    ///
    /// `requested` is the target shop named by the caller. Shops may omit it.
    pub fn creation_target(&self, requested: Option<ClientId>) -> DomainResult<CreationTarget> {
        let caller_id = self.caller.id;

        match (&self.caller.role, requested) {
            (ClientRole::Shop { .. }, None) => Ok(CreationTarget {
                owner_id: caller_id,
                created_by: CreatedBy::Owner,
            }),
            (ClientRole::Shop { .. }, Some(target)) if target == caller_id => Ok(CreationTarget {
                owner_id: caller_id,
                created_by: CreatedBy::Owner,
            }),
            (ClientRole::Shop { .. }, Some(target)) => Err(DomainError::forbidden(format!(
                "a shop may only create orders for itself, not for {target}"
            ))),

            (ClientRole::Manager { .. }, None) | (ClientRole::Admin, None) => Err(
                DomainError::validation("the shop the order is for must be named explicitly"),
            ),
            (ClientRole::Manager { assigned_shops }, Some(target)) => {
                if assigned_shops.contains(&target) {
                    Ok(CreationTarget {
                        owner_id: target,
                        created_by: CreatedBy::ManagerOnBehalf {
                            manager_id: caller_id,
                        },
                    })
                } else {
                    Err(DomainError::forbidden(format!(
                        "shop {target} is not assigned to manager {caller_id}"
                    )))
                }
            }
            (ClientRole::Admin, Some(target)) => Ok(CreationTarget {
                owner_id: target,
                created_by: CreatedBy::StaffOnBehalf { staff_id: caller_id },
            }),
        }
    }

    /// Role-level permission check, reported as `Forbidden`.
    pub fn require(&self, permission: &Permission) -> DomainResult<()> {
        authorize(self.caller, permission).map_err(DomainError::from)
    }
}
