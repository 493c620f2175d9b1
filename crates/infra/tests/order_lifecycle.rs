//! Order lifecycle through the services: placement, locking, status changes
//! and best-effort owner notification.

mod common;

use atelier_auth::Caller;
use atelier_clients::ClientProfile;
use atelier_core::{ClientId, DomainError, Money, OrderId};
use atelier_infra::collaborators::PhotoUpload;
use atelier_infra::repository::RepositoryError;
use atelier_infra::{OrderService, ServiceError};
use atelier_invoicing::BillingPeriod;
use atelier_orders::{CreatedBy, OrderDetails, OrderStatus};
use atelier_pricing::Tier;

use common::{Harness, rimmed};

#[test]
fn shop_places_order_for_itself() {
    let h = Harness::new();
    let (shop, caller) = h.shop("Vision", Tier::Tier1);

    let order = h.place(&caller, "DUPONT-01", rimmed());

    assert_eq!(order.owner_id(), Some(shop.id_typed()));
    assert_eq!(order.created_by(), CreatedBy::Owner);
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(h.orders.get_order(&caller, order.id_typed()).unwrap(), order);
}

#[test]
fn unverified_shop_cannot_order() {
    let h = Harness::new();
    let client = h
        .clients
        .register_client(ClientProfile::new("New shop", "FR1", " New@Shop.FR "))
        .unwrap();
    assert_eq!(client.email(), "new@shop.fr");
    assert!(!client.is_verified());

    let caller = Caller::from(&client);
    let err = h
        .orders
        .create_order(&caller, None, OrderDetails::new("R1", rimmed()))
        .unwrap_err();
    assert!(err.is_forbidden());

    h.clients.verify_client(&h.admin, client.id_typed()).unwrap();
    assert!(h
        .orders
        .create_order(&caller, None, OrderDetails::new("R1", rimmed()))
        .is_ok());
}

#[test]
fn duplicate_email_is_a_conflict() {
    let h = Harness::new();
    h.clients
        .register_client(ClientProfile::new("A", "FR1", "shop@vision.fr"))
        .unwrap();
    let err = h
        .clients
        .register_client(ClientProfile::new("B", "FR2", "SHOP@vision.fr"))
        .unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn orders_lock_once_fabrication_starts() {
    let h = Harness::new();
    let (_, caller) = h.shop("Vision", Tier::Tier1);
    let order = h.place(&caller, "R1", rimmed());
    let id = order.id_typed();

    let edited = h
        .orders
        .edit_order(&caller, id, OrderDetails::new("R1", rimmed().with_engravings(1)))
        .unwrap();
    assert_eq!(edited.options().unwrap().engraving_count, 1);

    h.orders
        .change_status(&h.admin, id, OrderStatus::InProgress)
        .unwrap();

    for later in [OrderStatus::InProgress, OrderStatus::Done, OrderStatus::Shipped] {
        h.orders.change_status(&h.admin, id, later).unwrap();
        let edit = h
            .orders
            .edit_order(&caller, id, OrderDetails::new("R1", rimmed()))
            .unwrap_err();
        assert!(edit.is_conflict(), "edit in {later}: {edit}");
        let delete = h.orders.delete_order(&caller, id).unwrap_err();
        assert!(delete.is_conflict(), "delete in {later}: {delete}");
    }

    // Photos and status changes stay allowed.
    let with_photo = h
        .orders
        .attach_photo(
            &caller,
            id,
            PhotoUpload::new("frame.jpg", "image/jpeg", vec![0xFF, 0xD8]),
        )
        .unwrap();
    assert!(with_photo.photo().is_some());
    assert_eq!(h.backend.photos.len(), 1);
}

#[test]
fn failed_photo_attachment_leaves_no_stored_photo() {
    let h = Harness::new();
    let (_, caller) = h.shop("Vision", Tier::Tier1);
    let order = h.place(&caller, "R1", rimmed());
    let id = order.id_typed();

    let (orders, ctx) = h.with_poisonable_orders();
    let service = OrderService::new(ctx);
    orders.poison(id);

    let err = service
        .attach_photo(
            &caller,
            id,
            PhotoUpload::new("frame.jpg", "image/jpeg", vec![0xFF, 0xD8]),
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Repository(RepositoryError::Poisoned)));
    assert!(h.backend.photos.is_empty());
    assert!(h.orders.get_order(&caller, id).unwrap().photo().is_none());

    orders.heal();
    let attached = service
        .attach_photo(
            &caller,
            id,
            PhotoUpload::new("frame.jpg", "image/jpeg", vec![0xFF, 0xD8]),
        )
        .unwrap();
    assert!(attached.photo().is_some());
    assert_eq!(h.backend.photos.len(), 1);
}

#[test]
fn pending_order_can_be_deleted() {
    let h = Harness::new();
    let (_, caller) = h.shop("Vision", Tier::Tier1);
    let order = h.place(&caller, "R1", rimmed());

    h.orders.delete_order(&caller, order.id_typed()).unwrap();

    let err = h.orders.get_order(&caller, order.id_typed()).unwrap_err();
    assert!(err.is_not_found());
    assert!(h.orders.list_orders(&caller, None).unwrap().is_empty());
}

#[test]
fn invoiced_order_cannot_be_edited_or_deleted_after_moving_back() {
    let h = Harness::new();
    let (shop, caller) = h.shop("Vision", Tier::Tier1);
    let order = h.finished(&caller, "P-1", rimmed());
    let id = order.id_typed();

    let invoice = h
        .invoices
        .generate_invoice(&h.admin, shop.id_typed(), BillingPeriod::new(2024, 6).unwrap())
        .unwrap()
        .invoice;

    h.orders.change_status(&h.admin, id, OrderStatus::Pending).unwrap();

    let edit = h
        .orders
        .edit_order(&caller, id, OrderDetails::new("P-1-EDITED", rimmed()))
        .unwrap_err();
    assert!(edit.is_conflict(), "{edit}");
    let delete = h.orders.delete_order(&caller, id).unwrap_err();
    assert!(delete.is_conflict(), "{delete}");

    let stored = h.orders.get_order(&caller, id).unwrap();
    assert_eq!(stored.reference(), "P-1");
    assert_eq!(stored.invoiced_in(), Some(invoice.id_typed()));
    assert_eq!(
        h.invoices.get_invoice(&h.admin, invoice.id_typed()).unwrap().order_ids(),
        vec![id]
    );
}

#[test]
fn status_change_notifies_owner_once() {
    let h = Harness::new();
    let (shop, caller) = h.shop("Vision", Tier::Tier1);
    let order = h.place(&caller, "DUPONT-01", rimmed());

    let outcome = h
        .orders
        .change_status(&h.admin, order.id_typed(), OrderStatus::Received)
        .unwrap();
    assert!(outcome.changed);
    assert!(outcome.notified);

    let repeat = h
        .orders
        .change_status(&h.admin, order.id_typed(), OrderStatus::Received)
        .unwrap();
    assert!(!repeat.changed);
    assert!(!repeat.notified);

    let sent = h.backend.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, shop.email());
    assert!(sent[0].notification.subject.contains("DUPONT-01"));
    assert!(sent[0].notification.subject.contains("Received"));
}

#[test]
fn notification_failure_does_not_undo_status_change() {
    let h = Harness::new();
    let (_, caller) = h.shop("Vision", Tier::Tier1);
    let order = h.place(&caller, "R1", rimmed());
    h.backend.notifier.set_failing(true);

    let outcome = h
        .orders
        .change_status(&h.admin, order.id_typed(), OrderStatus::Done)
        .unwrap();

    assert!(outcome.changed);
    assert!(!outcome.notified);
    assert_eq!(
        h.orders.get_order(&caller, order.id_typed()).unwrap().status(),
        OrderStatus::Done
    );
}

#[test]
fn only_staff_change_status() {
    let h = Harness::new();
    let (_, caller) = h.shop("Vision", Tier::Tier1);
    let order = h.place(&caller, "R1", rimmed());

    let err = h
        .orders
        .change_status(&caller, order.id_typed(), OrderStatus::Done)
        .unwrap_err();
    assert!(err.is_forbidden());
}

#[test]
fn quote_uses_the_owner_tier() {
    let h = Harness::new();
    let (_, tier1) = h.shop("Vision", Tier::Tier1);
    let (_, tier2) = h.shop("Optique", Tier::Tier2);

    let a = h.place(&tier1, "A", rimmed());
    let b = h.place(&tier2, "B", rimmed());

    assert_eq!(
        h.orders.quote_order(&tier1, a.id_typed()).unwrap().total,
        Money::from_cents(700)
    );
    assert_eq!(
        h.orders.quote_order(&h.admin, b.id_typed()).unwrap().total,
        Money::from_cents(600)
    );

    let options = rimmed()
        .with_diamond_finish("facet")
        .with_urgency("same-day");
    let c = h.place(&tier1, "C", options);
    let quote = h.orders.quote_order(&tier1, c.id_typed()).unwrap();
    assert_eq!(quote.subtotal, Money::from_cents(4680));
    assert_eq!(quote.surcharge, Money::from_cents(2340));
    assert_eq!(quote.total, Money::from_cents(7020));
}

#[test]
fn missing_records_are_not_found_not_forbidden() {
    let h = Harness::new();
    let (_, caller) = h.shop("Vision", Tier::Tier1);

    let err = h.orders.get_order(&caller, OrderId::new()).unwrap_err();
    assert!(matches!(err, ServiceError::Domain(DomainError::NotFound(_))));

    let err = h
        .orders
        .create_order(&h.admin, Some(ClientId::new()), OrderDetails::new("R1", rimmed()))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn committed_changes_are_published() {
    let h = Harness::new();
    let subscription = atelier_events::EventBus::subscribe(&*h.backend.bus);
    let (_, caller) = h.shop("Vision", Tier::Tier1);
    let order = h.place(&caller, "R1", rimmed());
    h.orders
        .change_status(&h.admin, order.id_typed(), OrderStatus::Received)
        .unwrap();

    let types: Vec<String> = subscription
        .drain()
        .into_iter()
        .map(|e| e.event_type().to_string())
        .collect();
    assert!(types.iter().any(|t| t.starts_with("clients.client.")));
    assert!(types.iter().any(|t| t.starts_with("orders.order.")));
    assert!(types.len() >= 3);
}
