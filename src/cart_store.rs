//! Persistent cart: the [`Cart`] aggregate mirrored into [`LocalStorage`] on every mutation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::aggregates::cart::{AppliedPromotion, Cart, CartLine, PriceBreakdown};
use crate::domain::aggregates::promotion::{self, PromotionError};
use crate::storage::LocalStorage;
use crate::store::PromotionLookup;

pub const CART_KEY: &str = "cart";
pub const PROMO_KEY: &str = "promo";

pub struct CartStore<L> {
    cart: Cart,
    storage: L,
}

impl<L: LocalStorage> CartStore<L> {
    /// Restores the cart from storage. Unreadable or malformed entries yield an empty cart / no promotion.
    pub fn load(storage: L) -> Self {
        let lines: Vec<CartLine> = read_json(&storage, CART_KEY).unwrap_or_default();
        let promotion: Option<AppliedPromotion> = read_json(&storage, PROMO_KEY);
        let cart = Cart::restore(lines, promotion);
        debug!(lines = cart.lines().len(), promo = cart.promotion().is_some(), "cart restored");
        Self { cart, storage }
    }

    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn lines(&self) -> &[CartLine] { self.cart.lines() }
    pub fn applied_promotion(&self) -> Option<&AppliedPromotion> { self.cart.promotion() }
    pub fn pricing(&self) -> PriceBreakdown { self.cart.pricing() }
    pub fn total(&self) -> Decimal { self.cart.total() }
    pub fn is_empty(&self) -> bool { self.cart.is_empty() }

    pub fn add_item(&mut self, line: CartLine) {
        self.cart.add_item(line);
        self.persist();
    }

    pub fn remove_item(&mut self, item_id: i64) {
        if self.cart.remove_item(item_id) {
            info!(item_id, "Item removed from cart");
        }
        self.persist();
    }

    pub fn update_quantity(&mut self, item_id: i64, quantity: i64) {
        if quantity < 1 { return self.remove_item(item_id); }
        self.cart.update_quantity(item_id, quantity);
        self.persist();
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear();
        self.persist();
        info!("Cart cleared");
    }

    pub fn apply_promo_code(&mut self, promotion: AppliedPromotion) {
        info!(code = %promotion.code, "Promo code applied! {}% off", promotion.discount_percentage);
        self.cart.apply_promotion(promotion);
        self.persist();
    }

    pub fn remove_promo_code(&mut self) {
        self.cart.remove_promotion();
        self.persist();
        info!("Promo code removed");
    }

    fn persist(&self) {
        if let Err(e) = self.write() {
            warn!(error = %e, "Failed to persist cart");
        }
    }

    fn write(&self) -> std::io::Result<()> {
        self.storage.set(CART_KEY, &serde_json::to_string(self.cart.lines())?)?;
        match self.cart.promotion() {
            Some(promo) => self.storage.set(PROMO_KEY, &serde_json::to_string(promo)?),
            None => self.storage.remove(PROMO_KEY),
        }
    }
}

impl<L> std::fmt::Debug for CartStore<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore").field("cart", &self.cart).finish_non_exhaustive()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(storage: &impl LocalStorage, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(raw) => raw?,
        Err(e) => { warn!(key, error = %e, "Failed to read local storage"); return None; }
    };
    serde_json::from_str(&raw).map_err(|e| warn!(key, error = %e, "Discarding malformed local storage entry")).ok()
}

/// Runs the full promo validation and applies the result to the cart.
pub async fn redeem_promo_code<L: LocalStorage, P: PromotionLookup + ?Sized>(
    cart: &mut CartStore<L>,
    lookup: &P,
    input: &str,
    now: DateTime<Utc>,
) -> Result<AppliedPromotion, PromotionError> {
    let code = promotion::parse_code(input, cart.applied_promotion().is_some())?;
    let found = lookup.find_active_promotion(&code).await.map_err(|e| {
        warn!(code = %code, error = %e, "Error applying promo code");
        PromotionError::Lookup(e.to_string())
    })?;
    let applied = promotion::evaluate(&code, found, now)?;
    cart.apply_promo_code(applied.clone());
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::promotion::PromotionRecord;
    use crate::storage::{FileStorage, MemoryStorage};
    use crate::store::memory::InMemoryStore;
    use chrono::Duration;

    fn line(id: i64, price: i64, qty: u32) -> CartLine {
        CartLine { item_id: id, name: format!("Cake {id}"), unit_price: Decimal::new(price, 0), quantity: qty, image_ref: None }
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let storage = MemoryStorage::new();
        let mut store = CartStore::load(&storage);
        store.add_item(line(1, 20, 2));
        store.add_item(line(2, 10, 1));
        store.update_quantity(2, 3);

        let reloaded = CartStore::load(&storage);
        assert_eq!(reloaded.cart(), store.cart());
        assert_eq!(reloaded.total(), Decimal::new(85, 0));
    }

    #[test]
    fn test_malformed_storage_falls_back_to_empty() {
        let storage = MemoryStorage::new();
        storage.set(CART_KEY, "{not json").unwrap();
        storage.set(PROMO_KEY, "42").unwrap();
        let store = CartStore::load(&storage);
        assert!(store.is_empty());
        assert!(store.applied_promotion().is_none());
    }

    #[test]
    fn test_clear_removes_promo_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let mut store = CartStore::load(storage.clone());
        store.add_item(line(1, 100, 1));
        store.apply_promo_code(AppliedPromotion { id: 1, code: "OFF20".into(), discount_percentage: 20, expiry: Utc::now() + Duration::days(1) });
        assert_eq!(CartStore::load(storage.clone()).total(), Decimal::new(95, 0));

        store.clear_cart();
        assert_eq!(storage.get(PROMO_KEY).unwrap(), None);
        let reloaded = CartStore::load(storage);
        assert!(reloaded.is_empty());
        assert!(reloaded.applied_promotion().is_none());
    }

    #[tokio::test]
    async fn test_redeem_promo_code() {
        let lookup = InMemoryStore::new();
        let now = Utc::now();
        lookup.add_promotion(PromotionRecord { id: 3, code: "BDAY15".into(), discount_percentage: 15, is_active: true, expiry_date: now + Duration::days(2), created_at: now });
        lookup.add_promotion(PromotionRecord { id: 4, code: "OLD".into(), discount_percentage: 50, is_active: true, expiry_date: now - Duration::days(2), created_at: now });

        let storage = MemoryStorage::new();
        let mut cart = CartStore::load(&storage);
        cart.add_item(line(1, 100, 1));

        assert_eq!(redeem_promo_code(&mut cart, &lookup, "", now).await, Err(PromotionError::Empty));
        assert_eq!(redeem_promo_code(&mut cart, &lookup, "nope", now).await, Err(PromotionError::NotFound));
        assert_eq!(redeem_promo_code(&mut cart, &lookup, "old", now).await, Err(PromotionError::Expired));
        let applied = redeem_promo_code(&mut cart, &lookup, "bday15", now).await.unwrap();
        assert_eq!(applied.id, 3);
        assert_eq!(cart.total(), Decimal::new(100, 0));
        assert_eq!(redeem_promo_code(&mut cart, &lookup, "bday15", now).await, Err(PromotionError::AlreadyApplied));

        cart.remove_promo_code();
        assert!(CartStore::load(&storage).applied_promotion().is_none());
    }
}
