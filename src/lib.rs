//! Cake Storefront
//!
//! Cart pricing, promo codes and the checkout sequence for a cake shop, plus
//! the order back office served by the `cake-storefront` binary.
//!
//! ## Features
//! - Persistent cart with promo-code discounts and a flat delivery fee
//! - Promo code validation against the store
//! - Checkout: pending order, order items, payment handoff, reconciliation
//! - Signed payment webhooks as the authoritative payment record
//! - Order detail, customer order history and admin status transitions
//! - Promo code management for the back office

pub mod cart_store;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod payment;
pub mod storage;
pub mod store;

use thiserror::Error;

pub use cart_store::CartStore;
pub use checkout::{CheckoutError, CheckoutReceipt, CheckoutSession, Customer, DeliveryDetails};
pub use domain::aggregates::{AppliedPromotion, Cart, CartLine, OrderStatus, PendingOrder, PriceBreakdown};
pub use payment::{PaymentGateway, PaymentOutcome, PaymentRequest};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Promotion(#[from] domain::aggregates::PromotionError),

    #[error(transparent)]
    Webhook(#[from] payment::WebhookError),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
