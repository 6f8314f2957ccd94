//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::cart::{Cart, PriceBreakdown};

pub type OrderId = i64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Completed, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Administrative transitions. Payment moves pending to processing; the rest is back-office work.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing | Self::Cancelled) | (Self::Processing, Self::Completed | Self::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// A durable order record as returned by the data store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: OrderId,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub delivery_address: String,
    pub phone_number: String,
    pub special_instructions: Option<String>,
    pub total: Decimal,
    pub payment_reference: Option<String>,
    pub promo_code_id: Option<i64>,
    pub discount_amount: Option<Decimal>,
    pub idempotency_key: Uuid,
    pub created_at: DateTime<Utc>,
}

impl PendingOrder {
    /// Records a payment reference. Repeating the same reference is a no-op in any later status.
    pub fn record_payment(&mut self, reference: &str) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending && self.payment_reference.as_deref() == Some(reference) {
            return Ok(());
        }
        if self.status != OrderStatus::Pending {
            return Err(OrderError::AlreadyPaid { order_id: self.id, status: self.status });
        }
        self.payment_reference = Some(reference.to_string());
        self.status = OrderStatus::Processing;
        Ok(())
    }

    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        Ok(())
    }
}

/// Values for a new order row; the store assigns the id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub delivery_address: String,
    pub phone_number: String,
    pub special_instructions: Option<String>,
    pub total: Decimal,
    pub promo_code_id: Option<i64>,
    pub discount_amount: Option<Decimal>,
    pub idempotency_key: Uuid,
}

impl NewOrder {
    pub fn from_cart(cart: &Cart, user_id: Uuid, address: &str, phone: &str, instructions: Option<&str>, idempotency_key: Uuid) -> Self {
        let PriceBreakdown { discount, total, .. } = cart.pricing();
        let promotion = cart.promotion();
        Self {
            user_id,
            delivery_address: address.trim().to_string(),
            phone_number: phone.trim().to_string(),
            special_instructions: instructions.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            total,
            promo_code_id: promotion.map(|p| p.id),
            discount_amount: promotion.map(|_| discount),
            idempotency_key,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub menu_item_id: i64,
    pub quantity: u32,
    pub price_at_time: Decimal,
}

impl OrderItem {
    /// Snapshot of every cart line at its current unit price.
    pub fn from_cart(order_id: OrderId, cart: &Cart) -> Vec<Self> {
        cart.lines().iter().map(|l| Self { order_id, menu_item_id: l.item_id, quantity: l.quantity, price_at_time: l.unit_price }).collect()
    }

    pub fn line_total(&self) -> Decimal { self.price_at_time * Decimal::from(self.quantity) }
}

/// An order with its items, as shown on the order detail view.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderDetail {
    pub order: PendingOrder,
    pub items: Vec<OrderItem>,
}

impl OrderDetail {
    /// Checks `total = Σ price × qty − discount + delivery fee`.
    pub fn is_consistent(&self) -> bool {
        let subtotal: Decimal = self.items.iter().map(OrderItem::line_total).sum();
        let discount = self.order.discount_amount.unwrap_or(Decimal::ZERO);
        subtotal - discount + crate::domain::value_objects::DELIVERY_FEE == self.order.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    UnknownStatus(String),
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    AlreadyPaid { order_id: OrderId, status: OrderStatus },
}
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStatus(s) => write!(f, "Unknown order status '{s}'"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
            Self::AlreadyPaid { order_id, status } => write!(f, "Order {order_id} is already {status}; payment not recorded"),
        }
    }
}
