//! Storefront domain: cart, promotions, orders.
pub mod aggregates;
pub mod events;
pub mod value_objects;
