//! Checkout: turns a cart and delivery details into a paid order.
//!
//! The sequence is create order, attach items, collect payment, record the
//! payment reference. A session remembers how far it got, so a retry after a
//! cancelled payment (or a failed step) resumes on the same order instead of
//! inserting another one.

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::cart_store::CartStore;
use crate::domain::aggregates::{Cart, NewOrder, OrderId, OrderItem, PendingOrder};
use crate::domain::events::OrderEvent;
use crate::payment::{payment_request, PaymentGateway, PaymentOutcome};
use crate::storage::LocalStorage;
use crate::store::{OrderStore, StoreError};

/// The signed-in customer, as resolved by the auth provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct DeliveryDetails {
    #[validate(custom = "not_blank")]
    pub delivery_address: String,
    #[validate(custom = "not_blank")]
    pub phone_number: String,
    #[validate(length(max = 500))]
    pub special_instructions: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() { return Err(ValidationError::new("blank")); }
    Ok(())
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("User not authenticated")]
    NotAuthenticated,
    #[error("Please provide delivery address and phone number")]
    InvalidDetails(#[from] validator::ValidationErrors),
    #[error("Your cart is empty")]
    EmptyCart,
    #[error("An order is already being submitted")]
    AlreadySubmitting,
    #[error("Failed to create order: {0}")]
    OrderCreation(#[source] StoreError),
    #[error("Failed to process order {order_id}: {source}")]
    ItemInsertion { order_id: OrderId, #[source] source: StoreError },
    #[error("Payment cancelled")]
    PaymentCancelled { order_id: OrderId },
    #[error("Payment failed: {message}")]
    PaymentFailed { order_id: OrderId, message: String },
    #[error("Payment {reference} was taken but order {order_id} could not be updated. Please contact support.")]
    Reconciliation { order_id: OrderId, reference: String, #[source] source: StoreError },
}

impl CheckoutError {
    /// Local validation problems the customer can fix without anything being written.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::InvalidDetails(_) | Self::EmptyCart | Self::AlreadySubmitting)
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::ItemInsertion { order_id, .. }
            | Self::PaymentCancelled { order_id }
            | Self::PaymentFailed { order_id, .. }
            | Self::Reconciliation { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckoutReceipt {
    pub order: PendingOrder,
    pub payment_reference: String,
    /// Where the customer lands next.
    pub redirect_to: String,
}

#[derive(Debug)]
struct HeldOrder {
    order: PendingOrder,
    snapshot: Cart,
    items_attached: bool,
    captured_reference: Option<String>,
}

pub struct CheckoutSession<'a, S: ?Sized, G: ?Sized> {
    store: &'a S,
    gateway: &'a G,
    currency: String,
    /// The last order insert sent, so a retry of identical values reuses its idempotency key.
    attempt: Option<NewOrder>,
    held: Option<HeldOrder>,
    submitting: bool,
    events: Vec<OrderEvent>,
}

impl<'a, S: OrderStore + ?Sized, G: PaymentGateway + ?Sized> CheckoutSession<'a, S, G> {
    pub fn new(store: &'a S, gateway: &'a G, currency: impl Into<String>) -> Self {
        Self { store, gateway, currency: currency.into(), attempt: None, held: None, submitting: false, events: vec![] }
    }

    pub fn is_submitting(&self) -> bool { self.submitting }
    pub fn held_order(&self) -> Option<&PendingOrder> { self.held.as_ref().map(|h| &h.order) }
    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }

    /// Forgets any held order. The order row, if one was created, stays `pending`.
    /// Also clears the in-flight flag left behind by a submission that was dropped before finishing.
    pub fn reset(&mut self) {
        if let Some(held) = self.held.take() {
            info!(order_id = held.order.id, "Checkout reset; order left pending");
        }
        self.attempt = None;
        self.submitting = false;
    }

    pub async fn place_order<L: LocalStorage>(
        &mut self,
        cart: &mut CartStore<L>,
        customer: Option<&Customer>,
        details: &DeliveryDetails,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        if self.submitting { return Err(CheckoutError::AlreadySubmitting); }
        self.submitting = true;
        let result = self.submit(cart, customer, details).await;
        self.submitting = false;
        if let Err(e) = &result {
            if e.is_validation() { warn!(error = %e, "Checkout rejected") } else { error!(error = %e, "Checkout failed") }
        }
        result
    }

    async fn submit<L: LocalStorage>(
        &mut self,
        cart: &mut CartStore<L>,
        customer: Option<&Customer>,
        details: &DeliveryDetails,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let customer = customer.ok_or(CheckoutError::NotAuthenticated)?;
        details.validate()?;

        let stale = self.held.as_ref().and_then(|h| {
            if h.order.user_id != customer.id {
                Some((h.order.id, "Held order belongs to another customer; starting a new order"))
            } else if h.captured_reference.is_none() && &h.snapshot != cart.cart() {
                Some((h.order.id, "Cart changed since order was created; starting a new order"))
            } else {
                None
            }
        });
        if let Some((order_id, reason)) = stale {
            warn!(order_id, "{reason}");
            self.reset();
            self.submitting = true;
        }

        if cart.is_empty() && self.held.as_ref().map_or(true, |h| h.captured_reference.is_none()) {
            return Err(CheckoutError::EmptyCart);
        }

        let mut held = match self.held.take() {
            Some(held) => held,
            None => self.create_order(cart.cart(), customer, details).await?,
        };

        if !held.items_attached {
            let items = OrderItem::from_cart(held.order.id, &held.snapshot);
            if let Err(source) = self.store.insert_order_items(&items).await {
                let order_id = held.order.id;
                self.held = Some(held);
                return Err(CheckoutError::ItemInsertion { order_id, source });
            }
            held.items_attached = true;
            self.events.push(OrderEvent::ItemsAttached { order_id: held.order.id, count: items.len() });
        }

        let reference = match held.captured_reference.clone() {
            Some(reference) => reference,
            None => match self.collect_payment(&held.order, &customer.email).await {
                Ok(reference) => reference,
                Err(e) => {
                    self.held = Some(held);
                    return Err(e);
                }
            },
        };
        held.captured_reference = Some(reference.clone());

        let order = match self.store.record_payment(held.order.id, &reference).await {
            Ok(order) => order,
            Err(source) => {
                let order_id = held.order.id;
                error!(order_id, %reference, error = %source, "Payment captured but order status update failed");
                self.held = Some(held);
                return Err(CheckoutError::Reconciliation { order_id, reference, source });
            }
        };
        self.events.push(OrderEvent::PaymentRecorded { order_id: order.id, reference: reference.clone() });
        info!(order_id = order.id, %reference, total = %order.total, "Order placed successfully!");

        cart.clear_cart();
        self.attempt = None;
        Ok(CheckoutReceipt { redirect_to: format!("/orders/{}", order.id), order, payment_reference: reference })
    }

    async fn collect_payment(&mut self, order: &PendingOrder, email: &str) -> Result<String, CheckoutError> {
        let order_id = order.id;
        let failed = |message: String| CheckoutError::PaymentFailed { order_id, message };
        let request = payment_request(order, &self.currency, email, Utc::now()).map_err(|e| failed(e.to_string()))?;
        match self.gateway.collect(&request).await.map_err(|e| failed(e.to_string()))? {
            PaymentOutcome::Success { reference } => Ok(reference),
            PaymentOutcome::Cancelled => {
                self.events.push(OrderEvent::PaymentAbandoned { order_id, reference: request.reference });
                Err(CheckoutError::PaymentCancelled { order_id })
            }
            PaymentOutcome::Failed { message } => Err(failed(message)),
        }
    }

    async fn create_order(&mut self, cart: &Cart, customer: &Customer, details: &DeliveryDetails) -> Result<HeldOrder, CheckoutError> {
        let mut new = NewOrder::from_cart(
            cart,
            customer.id,
            &details.delivery_address,
            &details.phone_number,
            details.special_instructions.as_deref(),
            Uuid::nil(),
        );
        // An earlier insert may have committed without us seeing the reply; only identical values may replay it.
        new.idempotency_key = match self.attempt.take() {
            Some(prev) if (NewOrder { idempotency_key: Uuid::nil(), ..prev.clone() }) == new => prev.idempotency_key,
            _ => Uuid::now_v7(),
        };
        self.attempt = Some(new.clone());

        let order = self.store.insert_order(&new).await.map_err(CheckoutError::OrderCreation)?;
        if order.total != new.total || order.user_id != new.user_id {
            self.attempt = None;
            return Err(CheckoutError::OrderCreation(StoreError::Rejected(format!(
                "order {} was stored with total {}, expected {}",
                order.id, order.total, new.total
            ))));
        }
        info!(order_id = order.id, total = %order.total, items = cart.item_count(), "Pending order created");
        self.events.push(OrderEvent::Created { order_id: order.id, total: order.total });
        Ok(HeldOrder { order, snapshot: cart.clone(), items_attached: false, captured_reference: None })
    }
}

impl<S: ?Sized, G: ?Sized> std::fmt::Debug for CheckoutSession<'_, S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSession")
            .field("attempt", &self.attempt.as_ref().map(|a| a.idempotency_key))
            .field("held", &self.held)
            .field("submitting", &self.submitting)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::domain::aggregates::{AppliedPromotion, CartLine, OrderStatus};
    use crate::payment::{order_id_from_reference, GatewayError, PaymentRequest};
    use crate::storage::MemoryStorage;
    use crate::store::memory::{InMemoryStore, Operation};

    #[derive(Default)]
    struct ScriptedGateway {
        outcomes: Mutex<VecDeque<PaymentOutcome>>,
        requests: Mutex<Vec<PaymentRequest>>,
    }

    impl ScriptedGateway {
        fn new(outcomes: impl IntoIterator<Item = PaymentOutcome>) -> Self {
            Self { outcomes: Mutex::new(outcomes.into_iter().collect()), requests: Mutex::default() }
        }
        fn requests(&self) -> Vec<PaymentRequest> { self.requests.lock().unwrap().clone() }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn collect(&self, request: &PaymentRequest) -> Result<PaymentOutcome, GatewayError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.outcomes.lock().unwrap().pop_front() {
                Some(PaymentOutcome::Success { .. }) => Ok(PaymentOutcome::Success { reference: request.reference.clone() }),
                Some(other) => Ok(other),
                None => Err(GatewayError("no scripted outcome".into())),
            }
        }
    }

    fn success() -> PaymentOutcome { PaymentOutcome::Success { reference: String::new() } }

    fn customer() -> Customer { Customer { id: Uuid::from_u128(0x0190_8a5c_e5a1_7000_8000_0000_0000_0001), email: "esi@example.com".into() } }

    fn details() -> DeliveryDetails {
        DeliveryDetails { delivery_address: "7 Labone Crescent".into(), phone_number: "0244123456".into(), special_instructions: Some("Write 'Happy 30th'".into()) }
    }

    fn filled_cart(storage: &MemoryStorage) -> CartStore<&MemoryStorage> {
        let mut cart = CartStore::load(storage);
        cart.add_item(CartLine { item_id: 1, name: "Chocolate Fudge".into(), unit_price: Decimal::new(40, 0), quantity: 2, image_ref: None });
        cart.add_item(CartLine { item_id: 2, name: "Lemon Drizzle".into(), unit_price: Decimal::new(20, 0), quantity: 1, image_ref: None });
        cart
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_store_call() {
        let store = InMemoryStore::new();
        let gateway = ScriptedGateway::new([success()]);
        let storage = MemoryStorage::new();
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let mut empty = CartStore::load(&storage);
        let err = session.place_order(&mut empty, Some(&customer()), &details()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));

        let mut cart = filled_cart(&storage);
        let err = session.place_order(&mut cart, None, &details()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotAuthenticated));

        let blank = DeliveryDetails { delivery_address: "   ".into(), ..details() };
        let err = session.place_order(&mut cart, Some(&customer()), &blank).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Please provide delivery address and phone number");

        assert_eq!(store.calls(), 0);
        assert!(gateway.requests().is_empty());
        assert!(!session.is_submitting());
    }

    #[tokio::test]
    async fn test_successful_checkout() {
        let store = InMemoryStore::new();
        let gateway = ScriptedGateway::new([success()]);
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        cart.apply_promo_code(AppliedPromotion { id: 4, code: "TEN".into(), discount_percentage: 10, expiry: Utc::now() });
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let receipt = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap();

        assert_eq!(receipt.order.status, OrderStatus::Processing);
        assert!(!receipt.payment_reference.is_empty());
        assert_eq!(receipt.order.payment_reference.as_deref(), Some(receipt.payment_reference.as_str()));
        assert_eq!(receipt.redirect_to, format!("/orders/{}", receipt.order.id));
        assert!(cart.is_empty());
        assert!(CartStore::load(&storage).is_empty());

        // 100 - 10 + 15
        assert_eq!(receipt.order.total, Decimal::new(105, 0));
        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount, 10500);
        assert_eq!(requests[0].currency, "GHS");
        assert_eq!(order_id_from_reference(&requests[0].reference), Some(receipt.order.id));

        let detail = store.fetch_order(receipt.order.id).await.unwrap().unwrap();
        assert_eq!(detail.items.len(), 2);
        assert!(detail.is_consistent());
        assert_eq!(detail.order.special_instructions.as_deref(), Some("Write 'Happy 30th'"));

        let events = session.take_events();
        assert!(matches!(events[0], OrderEvent::Created { .. }));
        assert!(matches!(events[2], OrderEvent::PaymentRecorded { .. }));
        assert!(events.iter().all(|e| e.order_id() == receipt.order.id));
    }

    #[tokio::test]
    async fn test_order_creation_failure_leaves_nothing_behind() {
        let store = InMemoryStore::new();
        store.fail(Operation::InsertOrder);
        let gateway = ScriptedGateway::new([success()]);
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let err = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::OrderCreation(_)));
        assert_eq!(err.order_id(), None);
        assert!(store.orders().is_empty());
        assert!(session.held_order().is_none());
        assert!(!cart.is_empty());
    }

    #[tokio::test]
    async fn test_item_failure_leaves_pending_order_without_items() {
        let store = InMemoryStore::new();
        store.fail(Operation::InsertItems);
        let gateway = ScriptedGateway::new([success()]);
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let err = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap_err();
        let CheckoutError::ItemInsertion { order_id, .. } = err else { panic!("unexpected {err:?}") };
        let orders = store.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert!(store.items_for(order_id).is_empty());
        assert!(gateway.requests().is_empty());

        store.recover(Operation::InsertItems);
        let receipt = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap();
        assert_eq!(receipt.order.id, order_id);
        assert_eq!(store.orders().len(), 1);
        assert_eq!(store.items_for(order_id).len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_payment_retries_on_same_order() {
        let store = InMemoryStore::new();
        let gateway = ScriptedGateway::new([PaymentOutcome::Cancelled, success()]);
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let err = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap_err();
        let CheckoutError::PaymentCancelled { order_id } = err else { panic!("unexpected {err:?}") };
        assert_eq!(store.orders()[0].status, OrderStatus::Pending);
        assert!(!cart.is_empty());

        let receipt = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap();
        assert_eq!(receipt.order.id, order_id);
        assert_eq!(store.orders().len(), 1);
        assert_eq!(store.items_for(order_id).len(), 2);

        let references: Vec<String> = gateway.requests().into_iter().map(|r| r.reference).collect();
        assert_eq!(references.len(), 2);
        assert!(references.iter().all(|r| order_id_from_reference(r) == Some(order_id)));
    }

    #[tokio::test]
    async fn test_changed_cart_starts_new_order() {
        let store = InMemoryStore::new();
        let gateway = ScriptedGateway::new([PaymentOutcome::Failed { message: "card declined".into() }, success()]);
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let err = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentFailed { ref message, .. } if message == "card declined"));
        let first = err.order_id().unwrap();

        cart.update_quantity(2, 3);
        let receipt = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap();
        assert_ne!(receipt.order.id, first);
        assert_eq!(receipt.order.total, Decimal::new(155, 0));
        assert_eq!(store.orders().len(), 2);
        assert_eq!(store.orders()[0].status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_lost_insert_reply_then_cart_edit_creates_new_order() {
        let store = InMemoryStore::new();
        store.lose_next_reply(Operation::InsertOrder);
        let gateway = ScriptedGateway::new([success()]);
        let storage = MemoryStorage::new();
        let mut cart = CartStore::load(&storage);
        cart.add_item(CartLine { item_id: 1, name: "Red Velvet".into(), unit_price: Decimal::new(40, 0), quantity: 1, image_ref: None });
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let err = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::OrderCreation(_)));
        assert_eq!(store.orders().len(), 1);

        cart.update_quantity(1, 5);
        let receipt = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap();
        assert_eq!(store.orders().len(), 2);
        assert_eq!(receipt.order.total, Decimal::new(215, 0));
        assert_eq!(gateway.requests()[0].amount, 21500);

        let detail = store.fetch_order(receipt.order.id).await.unwrap().unwrap();
        assert_eq!(detail.items.iter().map(|i| i.quantity).collect::<Vec<_>>(), vec![5]);
        assert!(detail.is_consistent());
    }

    #[tokio::test]
    async fn test_lost_insert_reply_retry_reuses_row() {
        let store = InMemoryStore::new();
        store.lose_next_reply(Operation::InsertOrder);
        let gateway = ScriptedGateway::new([success()]);
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        let buyer = customer();
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        assert!(session.place_order(&mut cart, Some(&buyer), &details()).await.is_err());
        let committed = store.orders()[0].id;

        let receipt = session.place_order(&mut cart, Some(&buyer), &details()).await.unwrap();
        assert_eq!(receipt.order.id, committed);
        assert_eq!(store.orders().len(), 1);
        assert_eq!(store.items_for(committed).len(), 2);
    }

    #[tokio::test]
    async fn test_held_order_not_reused_for_another_customer() {
        let store = InMemoryStore::new();
        let gateway = ScriptedGateway::new([PaymentOutcome::Cancelled, success()]);
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let first = customer();
        let err = session.place_order(&mut cart, Some(&first), &details()).await.unwrap_err();
        let abandoned = err.order_id().unwrap();

        let second = Customer { id: Uuid::now_v7(), email: "kofi@example.com".into() };
        let receipt = session.place_order(&mut cart, Some(&second), &details()).await.unwrap();
        assert_ne!(receipt.order.id, abandoned);
        assert_eq!(receipt.order.user_id, second.id);
        assert_eq!(gateway.requests()[1].email, "kofi@example.com");
        assert_eq!(order_id_from_reference(&gateway.requests()[1].reference), Some(receipt.order.id));

        let left = store.fetch_order(abandoned).await.unwrap().unwrap();
        assert_eq!(left.order.status, OrderStatus::Pending);
        assert_eq!(left.order.user_id, first.id);
    }

    struct StalledGateway;

    #[async_trait]
    impl PaymentGateway for StalledGateway {
        async fn collect(&self, _: &PaymentRequest) -> Result<PaymentOutcome, GatewayError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_second_submission_while_in_flight_is_rejected() {
        let store = InMemoryStore::new();
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        let mut session = CheckoutSession::new(&store, &StalledGateway, "GHS");

        let (buyer, delivery) = (customer(), details());
        let in_flight = session.place_order(&mut cart, Some(&buyer), &delivery);
        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), in_flight).await.is_err());
        assert!(session.is_submitting());

        let calls = store.calls();
        let err = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::AlreadySubmitting));
        assert!(err.is_validation());
        assert_eq!(store.calls(), calls);
        assert_eq!(store.orders().len(), 1);

        session.reset();
        assert!(!session.is_submitting());
        assert!(session.held_order().is_none());
    }

    #[tokio::test]
    async fn test_reconciliation_failure_does_not_charge_twice() {
        let store = InMemoryStore::new();
        store.fail(Operation::RecordPayment);
        let gateway = ScriptedGateway::new([success()]);
        let storage = MemoryStorage::new();
        let mut cart = filled_cart(&storage);
        let mut session = CheckoutSession::new(&store, &gateway, "GHS");

        let err = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap_err();
        let CheckoutError::Reconciliation { order_id, ref reference, .. } = err else { panic!("unexpected {err:?}") };
        let reference = reference.clone();
        assert_eq!(store.orders()[0].status, OrderStatus::Pending);
        assert!(!cart.is_empty());

        store.recover(Operation::RecordPayment);
        let receipt = session.place_order(&mut cart, Some(&customer()), &details()).await.unwrap();
        assert_eq!(receipt.order.id, order_id);
        assert_eq!(receipt.payment_reference, reference);
        assert_eq!(gateway.requests().len(), 1);
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_replayed_insert_returns_same_order() {
        let store = InMemoryStore::new();
        let storage = MemoryStorage::new();
        let cart = filled_cart(&storage);
        let new = NewOrder::from_cart(cart.cart(), Uuid::now_v7(), "a", "b", None, Uuid::now_v7());
        let first = store.insert_order(&new).await.unwrap();
        let second = store.insert_order(&new).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.orders().len(), 1);
    }
}
