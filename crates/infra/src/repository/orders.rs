use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use atelier_core::{AggregateRoot, ClientId, ExpectedVersion, OrderId};
use atelier_orders::{Order, OrderStatus};

use super::{RepositoryError, check_version};

/// Order storage. Listings come back oldest first.
pub trait OrderRepository: Send + Sync {
    fn insert(&self, order: Order) -> Result<(), RepositoryError>;

    /// Replace a stored order whose version still equals `expected`.
    fn save(&self, order: Order, expected: ExpectedVersion) -> Result<(), RepositoryError>;

    fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Hard removal. Returns the removed order, if any.
    fn remove(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    fn by_owner(&self, owner: ClientId) -> Result<Vec<Order>, RepositoryError>;

    fn by_owners(&self, owners: &BTreeSet<ClientId>) -> Result<Vec<Order>, RepositoryError>;

    fn by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError>;

    fn list(&self) -> Result<Vec<Order>, RepositoryError>;
}

impl<R> OrderRepository for Arc<R>
where
    R: OrderRepository + ?Sized,
{
    fn insert(&self, order: Order) -> Result<(), RepositoryError> {
        (**self).insert(order)
    }

    fn save(&self, order: Order, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        (**self).save(order, expected)
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        (**self).get(id)
    }

    fn remove(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        (**self).remove(id)
    }

    fn by_owner(&self, owner: ClientId) -> Result<Vec<Order>, RepositoryError> {
        (**self).by_owner(owner)
    }

    fn by_owners(&self, owners: &BTreeSet<ClientId>) -> Result<Vec<Order>, RepositoryError> {
        (**self).by_owners(owners)
    }

    fn by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        (**self).by_status(status)
    }

    fn list(&self) -> Result<Vec<Order>, RepositoryError> {
        (**self).list()
    }
}

/// In-memory order store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    inner: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, keep: impl Fn(&Order) -> bool) -> Result<Vec<Order>, RepositoryError> {
        let rows = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut orders: Vec<Order> = rows.values().filter(|o| keep(o)).cloned().collect();
        orders.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id_typed().cmp(&b.id_typed()))
        });
        Ok(orders)
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn insert(&self, order: Order) -> Result<(), RepositoryError> {
        let mut rows = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let id = order.id_typed();
        if rows.contains_key(&id) {
            return Err(RepositoryError::Duplicate {
                what: "order id",
                key: id.to_string(),
            });
        }
        rows.insert(id, order);
        Ok(())
    }

    fn save(&self, order: Order, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        let mut rows = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let id = order.id_typed();
        let stored = rows
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {id}")))?;
        check_version("order", expected, stored.version())?;
        rows.insert(id, order);
        Ok(())
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let rows = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(rows.get(&id).cloned())
    }

    fn remove(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut rows = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        Ok(rows.remove(&id))
    }

    fn by_owner(&self, owner: ClientId) -> Result<Vec<Order>, RepositoryError> {
        self.select(|o| o.owner_id() == Some(owner))
    }

    fn by_owners(&self, owners: &BTreeSet<ClientId>) -> Result<Vec<Order>, RepositoryError> {
        self.select(|o| o.owner_id().is_some_and(|id| owners.contains(&id)))
    }

    fn by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        self.select(|o| o.status() == status)
    }

    fn list(&self) -> Result<Vec<Order>, RepositoryError> {
        self.select(|_| true)
    }
}
