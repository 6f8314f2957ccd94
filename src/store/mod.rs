//! Data store seams: orders, promotions and the catalog.
//!
//! Clients are built once at start-up and handed to the code that needs them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{MenuItem, NewOrder, NewPromotion, OrderDetail, OrderError, OrderId, OrderItem, OrderStatus, PendingOrder, PromotionRecord};
use crate::domain::value_objects::PromoCode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Promo code {0} not found")]
    PromotionNotFound(i64),

    #[error("Promo code {0} already exists")]
    DuplicatePromotion(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Store rejected the request: {0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a `pending` order. Re-inserting with an existing idempotency key returns the stored row.
    async fn insert_order(&self, order: &NewOrder) -> Result<PendingOrder, StoreError>;

    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<(), StoreError>;

    /// Attaches a payment reference and moves the order to `processing`.
    /// Repeating the reference already on the order succeeds without changing it, whatever its status.
    async fn record_payment(&self, order_id: OrderId, reference: &str) -> Result<PendingOrder, StoreError>;

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<OrderDetail>, StoreError>;

    async fn list_orders(&self, limit: i64) -> Result<Vec<PendingOrder>, StoreError>;

    /// One customer's orders, newest first.
    async fn list_customer_orders(&self, user_id: Uuid, limit: i64) -> Result<Vec<PendingOrder>, StoreError>;

    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<PendingOrder, StoreError>;
}

#[async_trait]
pub trait PromotionLookup: Send + Sync {
    /// Active promotion with exactly this (upper-cased) code, if any.
    async fn find_active_promotion(&self, code: &PromoCode) -> Result<Option<PromotionRecord>, StoreError>;

    /// Every promo code, newest first.
    async fn list_promotions(&self) -> Result<Vec<PromotionRecord>, StoreError>;

    /// Expects a [`NewPromotion::normalized`] value.
    async fn create_promotion(&self, promotion: &NewPromotion) -> Result<PromotionRecord, StoreError>;

    async fn set_promotion_active(&self, id: i64, is_active: bool) -> Result<PromotionRecord, StoreError>;

    async fn delete_promotion(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_menu_items(&self) -> Result<Vec<MenuItem>, StoreError>;
}
