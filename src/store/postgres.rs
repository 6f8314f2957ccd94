//! Postgres-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Catalog, OrderStore, PromotionLookup, StoreError};
use crate::domain::aggregates::{MenuItem, NewOrder, NewPromotion, OrderDetail, OrderId, OrderItem, OrderStatus, PendingOrder, PromotionRecord};
use crate::domain::value_objects::PromoCode;

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64, user_id: Uuid, status: String, delivery_address: String, phone_number: String,
    special_instructions: Option<String>, total: Decimal, payment_reference: Option<String>,
    promo_code_id: Option<i64>, discount_amount: Option<Decimal>, idempotency_key: Uuid, created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for PendingOrder {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(PendingOrder {
            id: r.id, user_id: r.user_id, status: r.status.parse()?, delivery_address: r.delivery_address,
            phone_number: r.phone_number, special_instructions: r.special_instructions, total: r.total,
            payment_reference: r.payment_reference, promo_code_id: r.promo_code_id, discount_amount: r.discount_amount,
            idempotency_key: r.idempotency_key, created_at: r.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow { order_id: i64, menu_item_id: i64, quantity: i32, price_at_time: Decimal }

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        OrderItem { order_id: r.order_id, menu_item_id: r.menu_item_id, quantity: u32::try_from(r.quantity).unwrap_or(0), price_at_time: r.price_at_time }
    }
}

const ORDER_COLUMNS: &str = "id, user_id, status, delivery_address, phone_number, special_instructions, total, payment_reference, promo_code_id, discount_amount, idempotency_key, created_at";

#[derive(Clone, Debug)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    async fn order(&self, order_id: OrderId) -> Result<Option<PendingOrder>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id).fetch_optional(&self.pool).await?
            .map(PendingOrder::try_from).transpose()
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, o: &NewOrder) -> Result<PendingOrder, StoreError> {
        // The no-op update makes RETURNING yield the existing row on key replay.
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (user_id, status, delivery_address, phone_number, special_instructions, total, promo_code_id, discount_amount, idempotency_key, created_at) \
             VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7, $8, NOW()) \
             ON CONFLICT (idempotency_key) DO UPDATE SET idempotency_key = EXCLUDED.idempotency_key \
             RETURNING {ORDER_COLUMNS}"))
            .bind(o.user_id).bind(&o.delivery_address).bind(&o.phone_number).bind(&o.special_instructions)
            .bind(o.total).bind(o.promo_code_id).bind(o.discount_amount).bind(o.idempotency_key)
            .fetch_one(&self.pool).await?;
        row.try_into()
    }

    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<(), StoreError> {
        if items.is_empty() { return Ok(()); }
        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO order_items (order_id, menu_item_id, quantity, price_at_time) ");
        qb.push_values(items, |mut b, item| {
            b.push_bind(item.order_id).push_bind(item.menu_item_id).push_bind(i32::try_from(item.quantity).unwrap_or(i32::MAX)).push_bind(item.price_at_time);
        });
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn record_payment(&self, order_id: OrderId, reference: &str) -> Result<PendingOrder, StoreError> {
        let updated = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET payment_reference = $2, status = CASE WHEN status = 'pending' THEN 'processing' ELSE status END \
             WHERE id = $1 AND (status = 'pending' OR payment_reference = $2) \
             RETURNING {ORDER_COLUMNS}"))
            .bind(order_id).bind(reference).fetch_optional(&self.pool).await?;
        match updated {
            Some(row) => row.try_into(),
            None => {
                // Report why through the aggregate so both stores agree on the error.
                let mut order = self.order(order_id).await?.ok_or(StoreError::OrderNotFound(order_id))?;
                order.record_payment(reference)?;
                Err(StoreError::Rejected(format!("order {order_id} changed concurrently")))
            }
        }
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<OrderDetail>, StoreError> {
        let Some(order) = self.order(order_id).await? else { return Ok(None) };
        let items = sqlx::query_as::<_, OrderItemRow>("SELECT order_id, menu_item_id, quantity, price_at_time FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(order_id).fetch_all(&self.pool).await?
            .into_iter().map(OrderItem::from).collect();
        Ok(Some(OrderDetail { order, items }))
    }

    async fn list_orders(&self, limit: i64) -> Result<Vec<PendingOrder>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC LIMIT $1"))
            .bind(limit).fetch_all(&self.pool).await?
            .into_iter().map(PendingOrder::try_from).collect()
    }

    async fn list_customer_orders(&self, user_id: Uuid, limit: i64) -> Result<Vec<PendingOrder>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"))
            .bind(user_id).bind(limit).fetch_all(&self.pool).await?
            .into_iter().map(PendingOrder::try_from).collect()
    }

    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<PendingOrder, StoreError> {
        let mut order = self.order(order_id).await?.ok_or(StoreError::OrderNotFound(order_id))?;
        let from = order.status;
        order.transition(status)?;
        let row = sqlx::query_as::<_, OrderRow>(&format!("UPDATE orders SET status = $2 WHERE id = $1 AND status = $3 RETURNING {ORDER_COLUMNS}"))
            .bind(order_id).bind(status.as_str()).bind(from.as_str())
            .fetch_optional(&self.pool).await?
            .ok_or_else(|| StoreError::Rejected(format!("order {order_id} changed concurrently")))?;
        row.try_into()
    }
}

const PROMOTION_COLUMNS: &str = "id, code, discount_percentage, is_active, expiry_date, created_at";

#[async_trait]
impl PromotionLookup for PgStore {
    async fn find_active_promotion(&self, code: &PromoCode) -> Result<Option<PromotionRecord>, StoreError> {
        Ok(sqlx::query_as::<_, PromotionRecord>(&format!("SELECT {PROMOTION_COLUMNS} FROM promo_codes WHERE code = $1 AND is_active = TRUE"))
            .bind(code.as_str()).fetch_optional(&self.pool).await?)
    }

    async fn list_promotions(&self) -> Result<Vec<PromotionRecord>, StoreError> {
        Ok(sqlx::query_as::<_, PromotionRecord>(&format!("SELECT {PROMOTION_COLUMNS} FROM promo_codes ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool).await?)
    }

    async fn create_promotion(&self, p: &NewPromotion) -> Result<PromotionRecord, StoreError> {
        sqlx::query_as::<_, PromotionRecord>(&format!(
            "INSERT INTO promo_codes (code, discount_percentage, is_active, expiry_date, created_at) VALUES ($1, $2, $3, $4, NOW()) RETURNING {PROMOTION_COLUMNS}"))
            .bind(&p.code).bind(p.discount_percentage).bind(p.is_active).bind(p.expiry_date)
            .fetch_one(&self.pool).await
            .map_err(|e| {
                if e.as_database_error().is_some_and(|db| db.is_unique_violation()) { StoreError::DuplicatePromotion(p.code.clone()) } else { StoreError::Database(e) }
            })
    }

    async fn set_promotion_active(&self, id: i64, is_active: bool) -> Result<PromotionRecord, StoreError> {
        sqlx::query_as::<_, PromotionRecord>(&format!("UPDATE promo_codes SET is_active = $2 WHERE id = $1 RETURNING {PROMOTION_COLUMNS}"))
            .bind(id).bind(is_active).fetch_optional(&self.pool).await?
            .ok_or(StoreError::PromotionNotFound(id))
    }

    async fn delete_promotion(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM promo_codes WHERE id = $1").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(StoreError::PromotionNotFound(id)); }
        Ok(())
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn list_menu_items(&self) -> Result<Vec<MenuItem>, StoreError> {
        Ok(sqlx::query_as::<_, MenuItem>("SELECT id, name, price, description, category_id, image_url, created_at FROM menu_items ORDER BY name")
            .fetch_all(&self.pool).await?)
    }
}
