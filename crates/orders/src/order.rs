use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, AggregateRoot, ClientId, DomainError, InvoiceId, OrderId};
use atelier_events::Event;

use crate::options::JobOptions;

/// Production status, in production order.
///
/// Any transition between these values is accepted; the workshop may skip
/// or revisit stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Received,
    InProgress,
    Done,
    Shipped,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Received,
        OrderStatus::InProgress,
        OrderStatus::Done,
        OrderStatus::Shipped,
    ];

    /// Edit and delete are only allowed before fabrication starts.
    pub fn is_editable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Received)
    }

    /// Only finished jobs can be billed.
    pub fn is_invoiceable(self) -> bool {
        self == OrderStatus::Done
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Received => "Received",
            OrderStatus::InProgress => "In progress",
            OrderStatus::Done => "Done",
            OrderStatus::Shipped => "Shipped",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Who placed the order on the owner's books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreatedBy {
    Owner,
    ManagerOnBehalf { manager_id: ClientId },
    /// Entered by workshop staff, e.g. for a phoned-in job.
    StaffOnBehalf { staff_id: ClientId },
}

/// Retrievable reference to a stored photo, as returned by the storage
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoRef(String);

impl PhotoRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The editable part of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    /// Shop-side job reference (customer name, file number...).
    pub reference: String,
    #[serde(default)]
    pub frame: String,
    pub options: JobOptions,
    #[serde(default)]
    pub note: Option<String>,
}

impl OrderDetails {
    pub fn new(reference: impl Into<String>, options: JobOptions) -> Self {
        Self {
            reference: reference.into(),
            frame: String::new(),
            options,
            note: None,
        }
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = frame.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn normalized(&self) -> Result<Self, DomainError> {
        let reference = self.reference.trim();
        if reference.is_empty() {
            return Err(DomainError::validation("order reference is required"));
        }

        let note = self
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(Self {
            reference: reference.to_string(),
            frame: self.frame.trim().to_string(),
            options: self.options.normalized()?,
            note,
        })
    }
}

/// Aggregate root: Order (a fabrication job).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    owner_id: Option<ClientId>,
    details: Option<OrderDetails>,
    status: OrderStatus,
    photo: Option<PhotoRef>,
    created_by: CreatedBy,
    created_at: Option<DateTime<Utc>>,
    invoiced_in: Option<InvoiceId>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            owner_id: None,
            details: None,
            status: OrderStatus::Pending,
            photo: None,
            created_by: CreatedBy::Owner,
            created_at: None,
            invoiced_in: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn owner_id(&self) -> Option<ClientId> {
        self.owner_id
    }

    pub fn details(&self) -> Option<&OrderDetails> {
        self.details.as_ref()
    }

    pub fn reference(&self) -> &str {
        self.details.as_ref().map(|d| d.reference.as_str()).unwrap_or_default()
    }

    pub fn options(&self) -> Option<&JobOptions> {
        self.details.as_ref().map(|d| &d.options)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn photo(&self) -> Option<&PhotoRef> {
        self.photo.as_ref()
    }

    pub fn created_by(&self) -> CreatedBy {
        self.created_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn invoiced_in(&self) -> Option<InvoiceId> {
        self.invoiced_in
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Pending or Received, and not covered by an invoice.
    pub fn is_editable(&self) -> bool {
        self.status.is_editable() && self.invoiced_in.is_none()
    }

    /// Done and not yet covered by an invoice.
    pub fn is_invoice_candidate(&self) -> bool {
        self.created && !self.deleted && self.status.is_invoiceable() && self.invoiced_in.is_none()
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub owner_id: ClientId,
    pub details: OrderDetails,
    pub created_by: CreatedBy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditOrder (replaces the editable details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOrder {
    pub order_id: OrderId,
    pub details: OrderDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachPhoto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachPhoto {
    pub order_id: OrderId,
    pub photo: PhotoRef,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkInvoiced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInvoiced {
    pub order_id: OrderId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseInvoice (the covering invoice was deleted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInvoice {
    pub order_id: OrderId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    EditOrder(EditOrder),
    ChangeStatus(ChangeStatus),
    AttachPhoto(AttachPhoto),
    DeleteOrder(DeleteOrder),
    MarkInvoiced(MarkInvoiced),
    ReleaseInvoice(ReleaseInvoice),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub owner_id: ClientId,
    pub details: OrderDetails,
    pub created_by: CreatedBy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderEdited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEdited {
    pub order_id: OrderId,
    pub details: OrderDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub order_id: OrderId,
    pub reference: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PhotoAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoAttached {
    pub order_id: OrderId,
    pub photo: PhotoRef,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeleted {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderInvoiced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInvoiced {
    pub order_id: OrderId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceReleased {
    pub order_id: OrderId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderEdited(OrderEdited),
    StatusChanged(StatusChanged),
    PhotoAttached(PhotoAttached),
    OrderDeleted(OrderDeleted),
    OrderInvoiced(OrderInvoiced),
    InvoiceReleased(InvoiceReleased),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderEdited(_) => "orders.order.edited",
            OrderEvent::StatusChanged(_) => "orders.order.status_changed",
            OrderEvent::PhotoAttached(_) => "orders.order.photo_attached",
            OrderEvent::OrderDeleted(_) => "orders.order.deleted",
            OrderEvent::OrderInvoiced(_) => "orders.order.invoiced",
            OrderEvent::InvoiceReleased(_) => "orders.order.invoice_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderEdited(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
            OrderEvent::PhotoAttached(e) => e.occurred_at,
            OrderEvent::OrderDeleted(e) => e.occurred_at,
            OrderEvent::OrderInvoiced(e) => e.occurred_at,
            OrderEvent::InvoiceReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.owner_id = Some(e.owner_id);
                self.details = Some(e.details.clone());
                self.status = OrderStatus::Pending;
                self.created_by = e.created_by;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::OrderEdited(e) => {
                self.details = Some(e.details.clone());
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            OrderEvent::PhotoAttached(e) => {
                self.photo = Some(e.photo.clone());
            }
            OrderEvent::OrderDeleted(_) => {
                self.deleted = true;
            }
            OrderEvent::OrderInvoiced(e) => {
                self.invoiced_in = Some(e.invoice_id);
            }
            OrderEvent::InvoiceReleased(_) => {
                self.invoiced_in = None;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::EditOrder(cmd) => self.handle_edit(cmd),
            OrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            OrderCommand::AttachPhoto(cmd) => self.handle_attach_photo(cmd),
            OrderCommand::DeleteOrder(cmd) => self.handle_delete(cmd),
            OrderCommand::MarkInvoiced(cmd) => self.handle_mark_invoiced(cmd),
            OrderCommand::ReleaseInvoice(cmd) => self.handle_release_invoice(cmd),
        }
    }
}

impl Order {
    fn ensure_live(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found(format!("order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), DomainError> {
        if let Some(invoice_id) = self.invoiced_in {
            return Err(DomainError::conflict(format!(
                "order is covered by invoice {invoice_id}"
            )));
        }
        if !self.is_editable() {
            return Err(DomainError::conflict(format!(
                "order is locked once fabrication has started (status: {})",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            owner_id: cmd.owner_id,
            details: cmd.details.normalized()?,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live(cmd.order_id)?;
        self.ensure_editable()?;

        Ok(vec![OrderEvent::OrderEdited(OrderEdited {
            order_id: cmd.order_id,
            details: cmd.details.normalized()?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live(cmd.order_id)?;

        if self.status == cmd.status {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::StatusChanged(StatusChanged {
            order_id: cmd.order_id,
            reference: self.reference().to_string(),
            from: self.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_photo(&self, cmd: &AttachPhoto) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live(cmd.order_id)?;

        if cmd.photo.as_str().trim().is_empty() {
            return Err(DomainError::validation("photo reference must not be empty"));
        }

        Ok(vec![OrderEvent::PhotoAttached(PhotoAttached {
            order_id: cmd.order_id,
            photo: cmd.photo.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live(cmd.order_id)?;
        self.ensure_editable()?;

        Ok(vec![OrderEvent::OrderDeleted(OrderDeleted {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_invoiced(&self, cmd: &MarkInvoiced) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live(cmd.order_id)?;

        if !self.status.is_invoiceable() {
            return Err(DomainError::invariant(format!(
                "cannot invoice an order that is not done (status: {})",
                self.status
            )));
        }

        match self.invoiced_in {
            Some(existing) if existing == cmd.invoice_id => Ok(vec![]),
            Some(existing) => Err(DomainError::conflict(format!(
                "order already covered by invoice {existing}"
            ))),
            None => Ok(vec![OrderEvent::OrderInvoiced(OrderInvoiced {
                order_id: cmd.order_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_release_invoice(&self, cmd: &ReleaseInvoice) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live(cmd.order_id)?;

        if self.invoiced_in != Some(cmd.invoice_id) {
            return Err(DomainError::invariant(
                "order is not covered by the released invoice",
            ));
        }

        Ok(vec![OrderEvent::InvoiceReleased(InvoiceReleased {
            order_id: cmd.order_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_details() -> OrderDetails {
        OrderDetails::new("DUPONT-0142", JobOptions::new("rimmed")).with_frame("Ray-Ban 5154")
    }

    fn placed_order() -> Order {
        let order_id = OrderId::new();
        let mut order = Order::empty(order_id);
        order
            .execute(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                owner_id: ClientId::new(),
                details: test_details(),
                created_by: CreatedBy::Owner,
                occurred_at: test_time(),
            }))
            .unwrap();
        order
    }

    fn set_status(order: &mut Order, status: OrderStatus) -> Vec<OrderEvent> {
        order
            .execute(&OrderCommand::ChangeStatus(ChangeStatus {
                order_id: order.id_typed(),
                status,
                occurred_at: test_time(),
            }))
            .unwrap()
    }

    fn edit(order: &Order) -> Result<Vec<OrderEvent>, DomainError> {
        order.handle(&OrderCommand::EditOrder(EditOrder {
            order_id: order.id_typed(),
            details: test_details().with_note("left lens only"),
            occurred_at: test_time(),
        }))
    }

    fn delete(order: &Order) -> Result<Vec<OrderEvent>, DomainError> {
        order.handle(&OrderCommand::DeleteOrder(DeleteOrder {
            order_id: order.id_typed(),
            occurred_at: test_time(),
        }))
    }

    #[test]
    fn place_order_starts_pending_with_audit_trail() {
        let order_id = OrderId::new();
        let owner_id = ClientId::new();
        let manager_id = ClientId::new();
        let order = Order::empty(order_id);

        let events = order
            .handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                owner_id,
                details: test_details(),
                created_by: CreatedBy::ManagerOnBehalf { manager_id },
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);

        let mut order = order;
        order.apply(&events[0]);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.owner_id(), Some(owner_id));
        assert_eq!(order.created_by(), CreatedBy::ManagerOnBehalf { manager_id });
        assert_eq!(order.reference(), "DUPONT-0142");
        assert!(order.created_at().is_some());
        assert!(order.invoiced_in().is_none());
    }

    #[test]
    fn place_order_rejects_missing_reference() {
        let order_id = OrderId::new();
        let err = Order::empty(order_id)
            .handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                owner_id: ClientId::new(),
                details: OrderDetails::new("   ", JobOptions::new("rimmed")),
                created_by: CreatedBy::Owner,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn edit_and_delete_allowed_while_pending_or_received() {
        let mut order = placed_order();
        assert!(edit(&order).is_ok());
        assert!(delete(&order).is_ok());

        set_status(&mut order, OrderStatus::Received);
        assert!(edit(&order).is_ok());
        assert!(delete(&order).is_ok());
    }

    #[test]
    fn edit_and_delete_rejected_with_conflict_once_in_progress() {
        for locked in [OrderStatus::InProgress, OrderStatus::Done, OrderStatus::Shipped] {
            let mut order = placed_order();
            set_status(&mut order, locked);

            match edit(&order).unwrap_err() {
                DomainError::Conflict(msg) if msg.contains("locked") => {}
                other => panic!("expected Conflict for edit in {locked:?}, got {other:?}"),
            }
            assert!(delete(&order).unwrap_err().is_conflict());
        }
    }

    #[test]
    fn photo_can_be_attached_after_fabrication_started() {
        let mut order = placed_order();
        set_status(&mut order, OrderStatus::Done);

        order
            .execute(&OrderCommand::AttachPhoto(AttachPhoto {
                order_id: order.id_typed(),
                photo: PhotoRef::new("photos/abc.jpg"),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(order.photo().map(PhotoRef::as_str), Some("photos/abc.jpg"));
    }

    #[test]
    fn any_status_transition_is_accepted() {
        let mut order = placed_order();
        set_status(&mut order, OrderStatus::Shipped);
        set_status(&mut order, OrderStatus::Received);
        set_status(&mut order, OrderStatus::Done);
        assert_eq!(order.status(), OrderStatus::Done);
    }

    #[test]
    fn status_change_event_names_reference_and_new_status() {
        let mut order = placed_order();
        let events = set_status(&mut order, OrderStatus::InProgress);

        match &events[0] {
            OrderEvent::StatusChanged(e) => {
                assert_eq!(e.reference, "DUPONT-0142");
                assert_eq!(e.from, OrderStatus::Pending);
                assert_eq!(e.to, OrderStatus::InProgress);
            }
            other => panic!("Expected StatusChanged event, got {other:?}"),
        }
    }

    #[test]
    fn same_status_emits_nothing() {
        let mut order = placed_order();
        let version = order.version();
        let events = set_status(&mut order, OrderStatus::Pending);
        assert!(events.is_empty());
        assert_eq!(order.version(), version);
    }

    #[test]
    fn deleted_order_is_not_found() {
        let mut order = placed_order();
        order
            .execute(&OrderCommand::DeleteOrder(DeleteOrder {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(order.is_deleted());
        assert!(matches!(edit(&order).unwrap_err(), DomainError::NotFound(_)));
    }

    #[test]
    fn only_done_orders_can_be_marked_invoiced() {
        let mut order = placed_order();
        let invoice_id = InvoiceId::new();
        let mark = |order: &Order| {
            order.handle(&OrderCommand::MarkInvoiced(MarkInvoiced {
                order_id: order.id_typed(),
                invoice_id,
                occurred_at: test_time(),
            }))
        };

        assert!(matches!(mark(&order).unwrap_err(), DomainError::InvariantViolation(_)));

        set_status(&mut order, OrderStatus::Done);
        assert!(order.is_invoice_candidate());
        let events = mark(&order).unwrap();
        order.apply(&events[0]);
        assert_eq!(order.invoiced_in(), Some(invoice_id));
        assert!(!order.is_invoice_candidate());

        // Re-marking with the same invoice is idempotent; another invoice conflicts.
        assert!(mark(&order).unwrap().is_empty());
        let err = order
            .handle(&OrderCommand::MarkInvoiced(MarkInvoiced {
                order_id: order.id_typed(),
                invoice_id: InvoiceId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn releasing_invoice_makes_order_a_candidate_again() {
        let mut order = placed_order();
        let invoice_id = InvoiceId::new();
        set_status(&mut order, OrderStatus::Done);
        order
            .execute(&OrderCommand::MarkInvoiced(MarkInvoiced {
                order_id: order.id_typed(),
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();

        order
            .execute(&OrderCommand::ReleaseInvoice(ReleaseInvoice {
                order_id: order.id_typed(),
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(order.is_invoice_candidate());
        assert_eq!(order.status(), OrderStatus::Done);
    }

    #[test]
    fn invoiced_order_stays_locked_after_moving_back_to_pending() {
        let mut order = placed_order();
        let invoice_id = InvoiceId::new();
        set_status(&mut order, OrderStatus::Done);
        order
            .execute(&OrderCommand::MarkInvoiced(MarkInvoiced {
                order_id: order.id_typed(),
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();

        set_status(&mut order, OrderStatus::Pending);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(!order.is_editable());
        assert!(edit(&order).unwrap_err().is_conflict());
        assert!(delete(&order).unwrap_err().is_conflict());
        assert_eq!(order.invoiced_in(), Some(invoice_id));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let order = placed_order();
        let before = order.clone();

        let events1 = edit(&order).unwrap();
        let events2 = edit(&order).unwrap();

        assert_eq!(order, before);
        assert_eq!(events1.len(), events2.len());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = OrderStatus> {
            prop::sample::select(OrderStatus::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: after any sequence of transitions, edits are allowed
            /// exactly when the final status is Pending or Received.
            #[test]
            fn edit_lock_follows_final_status(path in prop::collection::vec(any_status(), 0..8)) {
                let mut order = placed_order();
                for status in path {
                    set_status(&mut order, status);
                }

                let editable = matches!(order.status(), OrderStatus::Pending | OrderStatus::Received);
                prop_assert_eq!(edit(&order).is_ok(), editable);
                prop_assert_eq!(delete(&order).is_ok(), editable);
            }

            /// Property: version grows by exactly one per status change that
            /// actually changes the status.
            #[test]
            fn version_counts_effective_transitions(path in prop::collection::vec(any_status(), 0..8)) {
                let mut order = placed_order();
                let mut expected = order.version();
                for status in path {
                    if status != order.status() {
                        expected += 1;
                    }
                    set_status(&mut order, status);
                }
                prop_assert_eq!(order.version(), expected);
            }
        }
    }
}
