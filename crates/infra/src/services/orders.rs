use chrono::Utc;

use atelier_auth::{AccessScope, Caller, OwnerFilter, Permission};
use atelier_clients::Client;
use atelier_core::{Aggregate, AggregateRoot, ClientId, DomainError, ExpectedVersion, OrderId};
use atelier_orders::{
    AttachPhoto, ChangeStatus, DeleteOrder, EditOrder, Order, OrderCommand, OrderDetails,
    OrderEvent, OrderStatus, PlaceOrder,
};
use atelier_pricing::{PriceBreakdown, PricingEngine};

use crate::collaborators::{Notification, PhotoUpload};

use super::{ServiceContext, ServiceResult};

const AGGREGATE_TYPE: &str = "orders.order";

/// Result of a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChangeOutcome {
    pub order: Order,
    /// False when the order was already in the requested status.
    pub changed: bool,
    /// Whether the owner notification went out.
    pub notified: bool,
}

#[derive(Debug, Clone)]
pub struct OrderService {
    ctx: ServiceContext,
}

impl OrderService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Place an order. Shops may omit `target`; managers and admins must
    /// name the shop the order is for.
    pub fn create_order(
        &self,
        caller: &Caller,
        target: Option<ClientId>,
        details: OrderDetails,
    ) -> ServiceResult<Order> {
        let scope = AccessScope::new(caller);
        scope.require(&Permission::ORDERS_CREATE)?;

        // A named target that does not exist is NotFound, whatever the scope.
        if let Some(target_id) = target {
            self.load_client(target_id)?;
        }
        let resolved = scope.creation_target(target)?;

        let owner = self.load_client(resolved.owner_id)?;
        if !owner.role().is_shop() {
            return Err(DomainError::validation(format!(
                "orders are placed for shops, client {} is a {}",
                resolved.owner_id,
                owner.role().label()
            ))
            .into());
        }
        if !owner.can_receive_orders() {
            return Err(DomainError::forbidden(format!(
                "shop {} is not verified yet",
                resolved.owner_id
            ))
            .into());
        }

        let order_id = OrderId::new();
        let mut order = Order::empty(order_id);
        let events = order.execute(&OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            owner_id: resolved.owner_id,
            details,
            created_by: resolved.created_by,
            occurred_at: Utc::now(),
        }))?;

        self.ctx.orders.insert(order.clone())?;
        self.ctx
            .publish(resolved.owner_id, order_id, AGGREGATE_TYPE, 0, &events);
        tracing::info!(
            %order_id,
            owner_id = %resolved.owner_id,
            reference = order.reference(),
            "order placed"
        );
        Ok(order)
    }

    pub fn get_order(&self, caller: &Caller, order_id: OrderId) -> ServiceResult<Order> {
        let order = self.load_visible(caller, order_id)?;
        tracing::debug!(%order_id, "order read");
        Ok(order)
    }

    /// Orders visible to the caller, oldest first, optionally by status.
    pub fn list_orders(
        &self,
        caller: &Caller,
        status: Option<OrderStatus>,
    ) -> ServiceResult<Vec<Order>> {
        let scope = AccessScope::new(caller);
        scope.require(&Permission::ORDERS_READ)?;

        let orders = match (scope.visible_owners(), status) {
            (OwnerFilter::All, Some(status)) => self.ctx.orders.by_status(status)?,
            (OwnerFilter::All, None) => self.ctx.orders.list()?,
            (OwnerFilter::Only(owners), status) => self
                .ctx
                .orders
                .by_owners(&owners)?
                .into_iter()
                .filter(|o| status.is_none_or(|s| o.status() == s))
                .collect(),
        };
        tracing::debug!(caller = %caller.id, count = orders.len(), "orders listed");
        Ok(orders)
    }

    /// Replace the editable details. Locked once fabrication has started.
    pub fn edit_order(
        &self,
        caller: &Caller,
        order_id: OrderId,
        details: OrderDetails,
    ) -> ServiceResult<Order> {
        AccessScope::new(caller).require(&Permission::ORDERS_EDIT)?;
        let (order, _) = self.mutate(caller, order_id, |id| {
            OrderCommand::EditOrder(EditOrder {
                order_id: id,
                details,
                occurred_at: Utc::now(),
            })
        })?;
        tracing::info!(%order_id, "order edited");
        Ok(order)
    }

    /// Remove an order that has not entered fabrication.
    pub fn delete_order(&self, caller: &Caller, order_id: OrderId) -> ServiceResult<()> {
        AccessScope::new(caller).require(&Permission::ORDERS_EDIT)?;
        // The deletion is versioned first so a concurrent status change wins.
        self.mutate(caller, order_id, |id| {
            OrderCommand::DeleteOrder(DeleteOrder {
                order_id: id,
                occurred_at: Utc::now(),
            })
        })?;
        self.ctx.orders.remove(order_id)?;
        tracing::info!(%order_id, "order deleted");
        Ok(())
    }

    /// Move the order to `status` and tell the owner. Notification failure
    /// leaves the change in place.
    pub fn change_status(
        &self,
        caller: &Caller,
        order_id: OrderId,
        status: OrderStatus,
    ) -> ServiceResult<StatusChangeOutcome> {
        AccessScope::new(caller).require(&Permission::ORDERS_STATUS)?;
        let (order, events) = self.mutate(caller, order_id, |id| {
            OrderCommand::ChangeStatus(ChangeStatus {
                order_id: id,
                status,
                occurred_at: Utc::now(),
            })
        })?;

        let Some(OrderEvent::StatusChanged(changed)) = events.first() else {
            tracing::debug!(%order_id, %status, "status unchanged");
            return Ok(StatusChangeOutcome {
                order,
                changed: false,
                notified: false,
            });
        };
        tracing::info!(%order_id, from = %changed.from, to = %changed.to, "order status changed");

        let notification = Notification::new(
            format!("Order {}: {}", changed.reference, changed.to),
            format!(
                "Your order {} is now \"{}\" (previously \"{}\").",
                changed.reference, changed.to, changed.from
            ),
        );
        let notified = self.notify_owner(&order, &notification);

        Ok(StatusChangeOutcome {
            order,
            changed: true,
            notified,
        })
    }

    /// Store the upload and attach its reference. Allowed in every status.
    /// If the order write fails, the stored photo is discarded.
    pub fn attach_photo(
        &self,
        caller: &Caller,
        order_id: OrderId,
        upload: PhotoUpload,
    ) -> ServiceResult<Order> {
        AccessScope::new(caller).require(&Permission::ORDERS_EDIT)?;
        self.load_visible(caller, order_id)?;

        let photo = self.ctx.photos.store(order_id, upload)?;
        let attached = self.mutate(caller, order_id, |id| {
            OrderCommand::AttachPhoto(AttachPhoto {
                order_id: id,
                photo: photo.clone(),
                occurred_at: Utc::now(),
            })
        });
        let (order, _) = match attached {
            Ok(attached) => attached,
            Err(error) => {
                if let Err(discard_error) = self.ctx.photos.discard(&photo) {
                    tracing::warn!(
                        %order_id,
                        photo = photo.as_str(),
                        error = %discard_error,
                        "unattached photo not discarded"
                    );
                }
                return Err(error);
            }
        };
        tracing::info!(%order_id, photo = photo.as_str(), "photo attached");
        Ok(order)
    }

    /// Current price of an order at its owner's tier.
    pub fn quote_order(&self, caller: &Caller, order_id: OrderId) -> ServiceResult<PriceBreakdown> {
        let order = self.load_visible(caller, order_id)?;
        let owner_id = order
            .owner_id()
            .ok_or_else(|| DomainError::invariant(format!("order {order_id} has no owner")))?;
        let tier = self.load_client(owner_id)?.tier().ok_or_else(|| {
            DomainError::validation(format!("owner {owner_id} of order {order_id} is not a shop"))
        })?;

        let options = order
            .options()
            .ok_or_else(|| DomainError::invariant(format!("order {order_id} has no options")))?;
        let breakdown = PricingEngine::new(&self.ctx.catalog).breakdown(options, tier);
        tracing::debug!(%order_id, total = %breakdown.total, "order quoted");
        Ok(breakdown)
    }

    fn mutate(
        &self,
        caller: &Caller,
        order_id: OrderId,
        command: impl FnOnce(OrderId) -> OrderCommand,
    ) -> ServiceResult<(Order, Vec<OrderEvent>)> {
        let mut order = self.load_visible(caller, order_id)?;
        let base_version = order.version();

        let events = order.execute(&command(order_id))?;
        if events.is_empty() {
            return Ok((order, events));
        }

        self.ctx
            .orders
            .save(order.clone(), ExpectedVersion::Exact(base_version))?;
        if let Some(owner_id) = order.owner_id() {
            self.ctx
                .publish(owner_id, order_id, AGGREGATE_TYPE, base_version, &events);
        }
        Ok((order, events))
    }

    /// NotFound for absent orders, Forbidden for orders outside the scope.
    fn load_visible(&self, caller: &Caller, order_id: OrderId) -> ServiceResult<Order> {
        let scope = AccessScope::new(caller);
        scope.require(&Permission::ORDERS_READ)?;

        let order = self
            .ctx
            .orders
            .get(order_id)?
            .filter(|o| !o.is_deleted())
            .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))?;
        if let Some(owner_id) = order.owner_id() {
            scope.ensure_can_view(owner_id)?;
        }
        Ok(order)
    }

    fn load_client(&self, client_id: ClientId) -> ServiceResult<Client> {
        self.ctx
            .clients
            .get(client_id)?
            .ok_or_else(|| DomainError::not_found(format!("client {client_id}")).into())
    }

    fn notify_owner(&self, order: &Order, notification: &Notification) -> bool {
        let order_id = order.id_typed();
        let recipient = match order.owner_id().map(|id| self.ctx.clients.get(id)) {
            Some(Ok(Some(owner))) => owner.email().to_string(),
            Some(Err(error)) => {
                tracing::warn!(%order_id, %error, "owner lookup failed, notification skipped");
                return false;
            }
            _ => {
                tracing::warn!(%order_id, "order owner not found, notification skipped");
                return false;
            }
        };

        match self.ctx.notifier.notify(&recipient, notification) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%order_id, %error, "status notification failed");
                false
            }
        }
    }
}
