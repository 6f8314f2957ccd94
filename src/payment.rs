//! Payment gateway handoff and server-side confirmation.
//!
//! The checkout hands the gateway a [`PaymentRequest`] and awaits a
//! [`PaymentOutcome`]. Independently, the gateway posts signed webhook events;
//! [`reconcile_charge`] treats those as the authoritative record of a capture.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::aggregates::{OrderId, PendingOrder};
use crate::domain::value_objects::Money;
use crate::store::{OrderStore, StoreError};

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    pub reference: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success { reference: String },
    Cancelled,
    Failed { message: String },
}

#[derive(Debug, Error)]
#[error("Payment gateway error: {0}")]
pub struct GatewayError(pub String);

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens the hosted payment flow and resolves once the payer finishes or closes it.
    async fn collect(&self, request: &PaymentRequest) -> Result<PaymentOutcome, GatewayError>;
}

/// `order_<id>_<unix millis>`: unique per attempt, and carries the order id back to us.
pub fn payment_reference(order_id: OrderId, at: DateTime<Utc>) -> String {
    format!("order_{order_id}_{}", at.timestamp_millis())
}

pub fn order_id_from_reference(reference: &str) -> Option<OrderId> {
    let rest = reference.strip_prefix("order_")?;
    let (id, stamp) = rest.split_once('_')?;
    stamp.parse::<i64>().ok()?;
    id.parse().ok()
}

pub fn payment_request(order: &PendingOrder, currency: &str, email: &str, at: DateTime<Utc>) -> Result<PaymentRequest, GatewayError> {
    let amount = Money::new(order.total, currency).minor_units().map_err(|e| GatewayError(e.to_string()))?;
    Ok(PaymentRequest { amount, currency: currency.to_string(), reference: payment_reference(order.id, at), email: email.to_string() })
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid webhook signature")]
    InvalidSignature,
    #[error("Malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Reference '{0}' does not identify an order")]
    UnknownReference(String),
    #[error("Order {order_id} total is {expected} minor units, charge was {charged}")]
    AmountMismatch { order_id: OrderId, expected: i64, charged: i64 },
    #[error("Order {order_id} is priced in {expected}, charge was in {charged}")]
    CurrencyMismatch { order_id: OrderId, expected: String, charged: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Checks the hex HMAC-SHA512 of the raw body against the signature header.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else { return false };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: ChargeData,
}

#[derive(Debug, Deserialize)]
pub struct ChargeData {
    pub reference: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum Reconciliation {
    Recorded(PendingOrder),
    Ignored { event: String },
}

/// Verifies and applies a gateway webhook body. `currency` is the store currency orders are priced in.
pub async fn reconcile_charge<S: OrderStore + ?Sized>(
    store: &S,
    secret: &str,
    currency: &str,
    payload: &[u8],
    signature: &str,
) -> Result<Reconciliation, WebhookError> {
    if !verify_signature(secret, payload, signature) {
        warn!("Rejected webhook with bad signature");
        return Err(WebhookError::InvalidSignature);
    }
    let event: WebhookEvent = serde_json::from_slice(payload)?;
    if event.event != "charge.success" || event.data.status.as_deref().is_some_and(|s| s != "success") {
        info!(event = %event.event, reference = %event.data.reference, "Ignoring webhook event");
        return Ok(Reconciliation::Ignored { event: event.event });
    }

    let reference = event.data.reference;
    let order_id = order_id_from_reference(&reference).ok_or_else(|| WebhookError::UnknownReference(reference.clone()))?;
    let detail = store.fetch_order(order_id).await?.ok_or_else(|| WebhookError::UnknownReference(reference.clone()))?;
    if let Some(charged) = event.data.currency.filter(|c| !c.eq_ignore_ascii_case(currency)) {
        warn!(order_id, expected = currency, %charged, "Charge currency does not match store currency");
        return Err(WebhookError::CurrencyMismatch { order_id, expected: currency.to_string(), charged });
    }
    let expected = Money::new(detail.order.total, currency).minor_units().map_err(|_| WebhookError::AmountMismatch { order_id, expected: i64::MAX, charged: event.data.amount })?;
    if expected != event.data.amount {
        warn!(order_id, expected, charged = event.data.amount, "Charge amount does not match order total");
        return Err(WebhookError::AmountMismatch { order_id, expected, charged: event.data.amount });
    }

    let order = store.record_payment(order_id, &reference).await.map_err(|e| {
        error!(order_id, %reference, error = %e, "Captured payment could not be recorded against the order");
        e
    })?;
    info!(order_id, %reference, "Payment confirmed by gateway webhook");
    Ok(Reconciliation::Recorded(order))
}
