//! In-process store with the same semantics as the Postgres one, plus failure injection.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Catalog, OrderStore, PromotionLookup, StoreError};
use crate::domain::aggregates::{MenuItem, NewOrder, NewPromotion, OrderDetail, OrderId, OrderItem, OrderStatus, PendingOrder, PromotionRecord};
use crate::domain::value_objects::PromoCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation { InsertOrder, InsertItems, RecordPayment, UpdateStatus }

#[derive(Debug, Default)]
struct State {
    next_id: OrderId,
    orders: Vec<PendingOrder>,
    items: Vec<OrderItem>,
    promotions: Vec<PromotionRecord>,
    menu: Vec<MenuItem>,
    failing: HashSet<Operation>,
    lost_replies: HashSet<Operation>,
    calls: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) }

    pub fn add_promotion(&self, record: PromotionRecord) { self.state().promotions.push(record); }
    pub fn add_menu_item(&self, item: MenuItem) { self.state().menu.push(item); }

    /// Makes every call of `op` fail until [`InMemoryStore::recover`] is called.
    pub fn fail(&self, op: Operation) { self.state().failing.insert(op); }
    pub fn recover(&self, op: Operation) { self.state().failing.remove(&op); }

    /// The next call of `op` commits its write and then reports a connection error.
    pub fn lose_next_reply(&self, op: Operation) { self.state().lost_replies.insert(op); }

    /// Number of store calls made so far.
    pub fn calls(&self) -> usize { self.state().calls }
    pub fn orders(&self) -> Vec<PendingOrder> { self.state().orders.clone() }
    pub fn items_for(&self, order_id: OrderId) -> Vec<OrderItem> {
        self.state().items.iter().filter(|i| i.order_id == order_id).cloned().collect()
    }

    fn begin(&self, op: Operation) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self.state();
        state.calls += 1;
        if state.failing.contains(&op) { return Err(StoreError::Rejected(format!("{op:?} unavailable"))); }
        Ok(state)
    }
}

fn reply<T>(state: &mut State, op: Operation, value: T) -> Result<T, StoreError> {
    if state.lost_replies.remove(&op) { return Err(StoreError::Rejected("connection reset".into())); }
    Ok(value)
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &NewOrder) -> Result<PendingOrder, StoreError> {
        let mut state = self.begin(Operation::InsertOrder)?;
        if let Some(existing) = state.orders.iter().find(|o| o.idempotency_key == order.idempotency_key) {
            return Ok(existing.clone());
        }
        state.next_id += 1;
        let row = PendingOrder {
            id: state.next_id,
            user_id: order.user_id,
            status: OrderStatus::Pending,
            delivery_address: order.delivery_address.clone(),
            phone_number: order.phone_number.clone(),
            special_instructions: order.special_instructions.clone(),
            total: order.total,
            payment_reference: None,
            promo_code_id: order.promo_code_id,
            discount_amount: order.discount_amount,
            idempotency_key: order.idempotency_key,
            created_at: Utc::now(),
        };
        state.orders.push(row.clone());
        reply(&mut state, Operation::InsertOrder, row)
    }

    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<(), StoreError> {
        let mut state = self.begin(Operation::InsertItems)?;
        if let Some(missing) = items.iter().find(|i| !state.orders.iter().any(|o| o.id == i.order_id)) {
            return Err(StoreError::OrderNotFound(missing.order_id));
        }
        state.items.extend_from_slice(items);
        Ok(())
    }

    async fn record_payment(&self, order_id: OrderId, reference: &str) -> Result<PendingOrder, StoreError> {
        let mut state = self.begin(Operation::RecordPayment)?;
        let order = state.orders.iter_mut().find(|o| o.id == order_id).ok_or(StoreError::OrderNotFound(order_id))?;
        order.record_payment(reference)?;
        Ok(order.clone())
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<OrderDetail>, StoreError> {
        let state = self.state();
        Ok(state.orders.iter().find(|o| o.id == order_id).map(|order| OrderDetail {
            order: order.clone(),
            items: state.items.iter().filter(|i| i.order_id == order_id).cloned().collect(),
        }))
    }

    async fn list_orders(&self, limit: i64) -> Result<Vec<PendingOrder>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.state().orders.iter().rev().take(limit).cloned().collect())
    }

    async fn list_customer_orders(&self, user_id: Uuid, limit: i64) -> Result<Vec<PendingOrder>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.state().orders.iter().rev().filter(|o| o.user_id == user_id).take(limit).cloned().collect())
    }

    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<PendingOrder, StoreError> {
        let mut state = self.begin(Operation::UpdateStatus)?;
        let order = state.orders.iter_mut().find(|o| o.id == order_id).ok_or(StoreError::OrderNotFound(order_id))?;
        order.transition(status)?;
        Ok(order.clone())
    }
}

#[async_trait]
impl PromotionLookup for InMemoryStore {
    async fn find_active_promotion(&self, code: &PromoCode) -> Result<Option<PromotionRecord>, StoreError> {
        Ok(self.state().promotions.iter().find(|p| p.is_active && p.code == code.as_str()).cloned())
    }

    async fn list_promotions(&self) -> Result<Vec<PromotionRecord>, StoreError> {
        let mut promotions = self.state().promotions.clone();
        promotions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(promotions)
    }

    async fn create_promotion(&self, p: &NewPromotion) -> Result<PromotionRecord, StoreError> {
        let mut state = self.state();
        if state.promotions.iter().any(|existing| existing.code == p.code) {
            return Err(StoreError::DuplicatePromotion(p.code.clone()));
        }
        let id = state.promotions.iter().map(|existing| existing.id).max().unwrap_or(0) + 1;
        let record = PromotionRecord {
            id, code: p.code.clone(), discount_percentage: p.discount_percentage, is_active: p.is_active,
            expiry_date: p.expiry_date, created_at: Utc::now(),
        };
        state.promotions.push(record.clone());
        Ok(record)
    }

    async fn set_promotion_active(&self, id: i64, is_active: bool) -> Result<PromotionRecord, StoreError> {
        let mut state = self.state();
        let record = state.promotions.iter_mut().find(|p| p.id == id).ok_or(StoreError::PromotionNotFound(id))?;
        record.is_active = is_active;
        Ok(record.clone())
    }

    async fn delete_promotion(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state();
        let before = state.promotions.len();
        state.promotions.retain(|p| p.id != id);
        if state.promotions.len() == before { return Err(StoreError::PromotionNotFound(id)); }
        for order in state.orders.iter_mut().filter(|o| o.promo_code_id == Some(id)) {
            order.promo_code_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryStore {
    async fn list_menu_items(&self) -> Result<Vec<MenuItem>, StoreError> {
        let mut menu = self.state().menu.clone();
        menu.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(menu)
    }
}
