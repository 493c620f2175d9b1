#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use atelier_auth::Caller;
use atelier_clients::{Client, ClientProfile, ClientRole};
use atelier_core::{ClientId, ExpectedVersion, OrderId};
use atelier_infra::repository::{InMemoryOrderRepository, OrderRepository, RepositoryError};
use atelier_infra::{
    AppConfig, ClientService, InMemoryBackend, InvoiceService, OrderService, ServiceContext,
};
use atelier_orders::{JobOptions, Order, OrderDetails, OrderStatus};
use atelier_pricing::Tier;

pub struct Harness {
    pub backend: InMemoryBackend,
    pub ctx: ServiceContext,
    pub clients: ClientService,
    pub orders: OrderService,
    pub invoices: InvoiceService,
    pub admin: Caller,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        atelier_observability::init_for_tests();

        let backend = InMemoryBackend::new();
        let ctx = backend.context(config).unwrap();
        Self {
            clients: ClientService::new(ctx.clone()),
            orders: OrderService::new(ctx.clone()),
            invoices: InvoiceService::new(ctx.clone()),
            admin: Caller::admin(ClientId::new()),
            backend,
            ctx,
        }
    }

    /// A context sharing this harness's stores, whose order writes can be
    /// made to fail for one order.
    pub fn with_poisonable_orders(&self) -> (Arc<PoisonedSaves>, ServiceContext) {
        let orders = Arc::new(PoisonedSaves::new(self.backend.orders.clone()));
        let mut ctx = self.ctx.clone();
        ctx.orders = orders.clone();
        (orders, ctx)
    }

    /// A verified shop and the caller acting as it.
    pub fn shop(&self, name: &str, tier: Tier) -> (Client, Caller) {
        let email = format!("{}@shops.test", name.to_lowercase().replace(' ', "-"));
        let client = self
            .clients
            .create_client(
                &self.admin,
                ClientProfile::new(name, format!("FR-{name}"), email),
                ClientRole::shop(tier),
            )
            .unwrap();
        let caller = Caller::from(&client);
        (client, caller)
    }

    pub fn manager(&self, name: &str, shops: &[ClientId]) -> Caller {
        let email = format!("{}@managers.test", name.to_lowercase());
        let client = self
            .clients
            .create_client(
                &self.admin,
                ClientProfile::new(name, format!("FR-{name}"), email),
                ClientRole::manager(shops.iter().copied()),
            )
            .unwrap();
        Caller::from(&client)
    }

    pub fn place(&self, caller: &Caller, reference: &str, options: JobOptions) -> Order {
        self.orders
            .create_order(caller, None, OrderDetails::new(reference, options))
            .unwrap()
    }

    /// Place an order as `caller` and have the workshop finish it.
    pub fn finished(&self, caller: &Caller, reference: &str, options: JobOptions) -> Order {
        let order = self.place(caller, reference, options);
        self.orders
            .change_status(&self.admin, order.id_typed(), OrderStatus::Done)
            .unwrap()
            .order
    }
}

/// Order store whose writes fail for one chosen order.
pub struct PoisonedSaves {
    inner: Arc<InMemoryOrderRepository>,
    poisoned: Mutex<Option<OrderId>>,
}

impl PoisonedSaves {
    pub fn new(inner: Arc<InMemoryOrderRepository>) -> Self {
        Self {
            inner,
            poisoned: Mutex::new(None),
        }
    }

    pub fn poison(&self, id: OrderId) {
        *self.poisoned.lock().unwrap() = Some(id);
    }

    pub fn heal(&self) {
        *self.poisoned.lock().unwrap() = None;
    }
}

impl OrderRepository for PoisonedSaves {
    fn insert(&self, order: Order) -> Result<(), RepositoryError> {
        self.inner.insert(order)
    }

    fn save(&self, order: Order, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        if *self.poisoned.lock().unwrap() == Some(order.id_typed()) {
            return Err(RepositoryError::Poisoned);
        }
        self.inner.save(order, expected)
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.inner.get(id)
    }

    fn remove(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.inner.remove(id)
    }

    fn by_owner(&self, owner: ClientId) -> Result<Vec<Order>, RepositoryError> {
        self.inner.by_owner(owner)
    }

    fn by_owners(&self, owners: &BTreeSet<ClientId>) -> Result<Vec<Order>, RepositoryError> {
        self.inner.by_owners(owners)
    }

    fn by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        self.inner.by_status(status)
    }

    fn list(&self) -> Result<Vec<Order>, RepositoryError> {
        self.inner.list()
    }
}

pub fn rimmed() -> JobOptions {
    JobOptions::new("rimmed")
}
