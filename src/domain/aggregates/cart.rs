//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::menu::MenuItem;
use crate::domain::value_objects::DELIVERY_FEE;

/// One catalog item plus quantity. Name, price and image are copied at add time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(rename = "id")]
    pub item_id: i64,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(rename = "image", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl CartLine {
    pub fn from_menu_item(item: &MenuItem, quantity: u32) -> Self {
        Self { item_id: item.id, name: item.name.clone(), unit_price: item.price, quantity, image_ref: item.image_url.clone() }
    }

    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

/// A validated promotion attached to the cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    pub id: i64,
    pub code: String,
    pub discount_percentage: u8,
    #[serde(rename = "expiry_date")]
    pub expiry: DateTime<Utc>,
}

/// Derived amounts for a cart at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

impl PriceBreakdown {
    pub fn compute(lines: &[CartLine], promotion: Option<&AppliedPromotion>) -> Self {
        let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
        let discount = promotion
            .map(|p| (subtotal * Decimal::from(p.discount_percentage) / Decimal::ONE_HUNDRED).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
            .unwrap_or(Decimal::ZERO);
        Self { subtotal, discount, delivery_fee: DELIVERY_FEE, total: subtotal - discount + DELIVERY_FEE }
    }
}

/// In-progress selection. Lines keep insertion order and unique item ids.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
    promotion: Option<AppliedPromotion>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds a cart from stored parts, re-applying the line invariants.
    pub fn restore(lines: Vec<CartLine>, promotion: Option<AppliedPromotion>) -> Self {
        let mut cart = Self { lines: Vec::with_capacity(lines.len()), promotion };
        for line in lines { cart.add_item(line); }
        cart
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn promotion(&self) -> Option<&AppliedPromotion> { self.promotion.as_ref() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }
    pub fn pricing(&self) -> PriceBreakdown { PriceBreakdown::compute(&self.lines, self.promotion.as_ref()) }
    pub fn total(&self) -> Decimal { self.pricing().total }

    /// Merges into an existing line for the same item, otherwise appends.
    /// A zero-quantity line is ignored.
    pub fn add_item(&mut self, line: CartLine) {
        if line.quantity == 0 { return; }
        if let Some(existing) = self.lines.iter_mut().find(|l| l.item_id == line.item_id) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            self.lines.push(line);
        }
    }

    /// Returns whether a line was removed.
    pub fn remove_item(&mut self, item_id: i64) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.item_id != item_id);
        self.lines.len() != before
    }

    /// Quantities below 1 remove the line.
    pub fn update_quantity(&mut self, item_id: i64, quantity: i64) {
        if quantity < 1 { self.remove_item(item_id); return; }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.lines.iter_mut().find(|l| l.item_id == item_id) { line.quantity = quantity; }
    }

    pub fn apply_promotion(&mut self, promotion: AppliedPromotion) { self.promotion = Some(promotion); }
    pub fn remove_promotion(&mut self) -> Option<AppliedPromotion> { self.promotion.take() }

    pub fn clear(&mut self) { self.lines.clear(); self.promotion = None; }
}
