use serde::{Deserialize, Serialize};

use atelier_clients::{Client, ClientRole};
use atelier_core::ClientId;
use atelier_pricing::Tier;

/// An already-authenticated caller: who is acting, and in which role.
///
/// The role carries the assigned shops or the tier exactly as stored on the
/// account, so scope decisions never need another lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: ClientId,
    pub role: ClientRole,
}

impl Caller {
    pub fn new(id: ClientId, role: ClientRole) -> Self {
        Self { id, role }
    }

    pub fn shop(id: ClientId, tier: Tier) -> Self {
        Self::new(id, ClientRole::shop(tier))
    }

    pub fn manager(id: ClientId, shops: impl IntoIterator<Item = ClientId>) -> Self {
        Self::new(id, ClientRole::manager(shops))
    }

    pub fn admin(id: ClientId) -> Self {
        Self::new(id, ClientRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<&Client> for Caller {
    fn from(client: &Client) -> Self {
        Self::new(client.id_typed(), client.role().clone())
    }
}
