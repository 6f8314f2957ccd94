//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use crate::domain::aggregates::order::OrderId;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: OrderId, total: Decimal },
    ItemsAttached { order_id: OrderId, count: usize },
    PaymentRecorded { order_id: OrderId, reference: String },
    PaymentAbandoned { order_id: OrderId, reference: String },
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::Created { order_id, .. }
            | Self::ItemsAttached { order_id, .. }
            | Self::PaymentRecorded { order_id, .. }
            | Self::PaymentAbandoned { order_id, .. } => *order_id,
        }
    }
}
