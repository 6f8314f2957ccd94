//! Aggregates module
pub mod menu;
pub mod cart;
pub mod order;
pub mod promotion;

pub use menu::MenuItem;
pub use cart::{AppliedPromotion, Cart, CartLine, PriceBreakdown};
pub use order::{NewOrder, OrderDetail, OrderError, OrderId, OrderItem, OrderStatus, PendingOrder};
pub use promotion::{NewPromotion, PromotionError, PromotionRecord};
