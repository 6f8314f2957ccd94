//! Cake Storefront - order back office and payment webhook service

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use cake_storefront::{
    config::Config,
    domain::aggregates::{promotion, AppliedPromotion, MenuItem, NewPromotion, OrderDetail, OrderId, OrderStatus, PendingOrder, PromotionError, PromotionRecord},
    payment::{self, Reconciliation, WebhookError, SIGNATURE_HEADER},
    store::{postgres::PgStore, Catalog, OrderStore, PromotionLookup, StoreError},
    StorefrontError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderStore>,
    pub promotions: Arc<dyn PromotionLookup>,
    pub catalog: Arc<dyn Catalog>,
    pub webhook_secret: Arc<str>,
    /// Currency every order is priced and charged in.
    pub currency: Arc<str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let store = Arc::new(PgStore::new(db));
    let port = config.port;
    tracing::info!("🎂 Cake Storefront listening on 0.0.0.0:{} ({})", port, config.currency);
    let state = AppState {
        orders: store.clone(),
        promotions: store.clone(),
        catalog: store,
        webhook_secret: config.paystack_secret_key.into(),
        currency: config.currency.into(),
    };

    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, router(state)).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "cake-storefront"})) }))
        .route("/api/v1/menu", get(list_menu))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/customers/:user_id/orders", get(list_customer_orders))
        .route("/api/v1/promo-codes", get(list_promo_codes).post(create_promo_code))
        .route("/api/v1/promo-codes/:id", delete(delete_promo_code))
        .route("/api/v1/promo-codes/:id/active", put(set_promo_code_active))
        .route("/api/v1/promo-codes/validate", post(validate_promo_code))
        .route("/api/v1/payments/webhook", post(payment_webhook))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

struct ApiError(StorefrontError);

impl<E: Into<StorefrontError>> From<E> for ApiError {
    fn from(e: E) -> Self { Self(e.into()) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StorefrontError::Store(StoreError::OrderNotFound(_) | StoreError::PromotionNotFound(_)) => StatusCode::NOT_FOUND,
            StorefrontError::Store(StoreError::DuplicatePromotion(_)) => StatusCode::CONFLICT,
            StorefrontError::Store(StoreError::Order(_)) => StatusCode::CONFLICT,
            StorefrontError::Promotion(PromotionError::Lookup(_)) => StatusCode::BAD_GATEWAY,
            StorefrontError::Promotion(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StorefrontError::Webhook(WebhookError::InvalidSignature) => StatusCode::UNAUTHORIZED,
            StorefrontError::Webhook(WebhookError::Malformed(_)) => StatusCode::BAD_REQUEST,
            StorefrontError::Webhook(WebhookError::UnknownReference(_)) => StatusCode::NOT_FOUND,
            StorefrontError::Webhook(WebhookError::AmountMismatch { .. } | WebhookError::CurrencyMismatch { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            StorefrontError::Webhook(WebhookError::Store(StoreError::Order(_))) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() { tracing::error!(error = %self.0, "request failed"); }
        (status, self.0.to_string()).into_response()
    }
}

async fn list_menu(State(s): State<AppState>) -> Result<Json<Vec<MenuItem>>, ApiError> {
    Ok(Json(s.catalog.list_menu_items().await?))
}

#[derive(Debug, Deserialize)] pub struct ListParams { pub limit: Option<i64> }

async fn list_orders(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Vec<PendingOrder>>, ApiError> {
    let limit = p.limit.unwrap_or(20).clamp(1, 100);
    Ok(Json(s.orders.list_orders(limit).await?))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<OrderId>) -> Result<Json<OrderDetail>, ApiError> {
    s.orders.fetch_order(id).await?.map(Json).ok_or_else(|| StoreError::OrderNotFound(id).into())
}

async fn list_customer_orders(State(s): State<AppState>, Path(user_id): Path<Uuid>, Query(p): Query<ListParams>) -> Result<Json<Vec<PendingOrder>>, ApiError> {
    let limit = p.limit.unwrap_or(20).clamp(1, 100);
    Ok(Json(s.orders.list_customer_orders(user_id, limit).await?))
}

#[derive(Debug, Deserialize)] pub struct UpdateStatusRequest { pub status: OrderStatus }

async fn update_order_status(State(s): State<AppState>, Path(id): Path<OrderId>, Json(r): Json<UpdateStatusRequest>) -> Result<Json<PendingOrder>, ApiError> {
    let order = s.orders.update_status(id, r.status).await?;
    tracing::info!(order_id = id, status = %order.status, "Order status updated");
    Ok(Json(order))
}

#[derive(Debug, Deserialize)] pub struct ValidatePromoRequest { pub code: String, #[serde(default)] pub already_applied: bool }
#[derive(Debug, Serialize)] pub struct ValidatePromoResponse { pub promotion: AppliedPromotion, pub message: String }

async fn validate_promo_code(State(s): State<AppState>, Json(r): Json<ValidatePromoRequest>) -> Result<Json<ValidatePromoResponse>, ApiError> {
    let code = promotion::parse_code(&r.code, r.already_applied)?;
    let found = s.promotions.find_active_promotion(&code).await.map_err(|e| PromotionError::Lookup(e.to_string()))?;
    let applied = promotion::evaluate(&code, found, Utc::now())?;
    let message = format!("Promo code applied! {}% off", applied.discount_percentage);
    Ok(Json(ValidatePromoResponse { promotion: applied, message }))
}

async fn list_promo_codes(State(s): State<AppState>) -> Result<Json<Vec<PromotionRecord>>, ApiError> {
    Ok(Json(s.promotions.list_promotions().await?))
}

async fn create_promo_code(State(s): State<AppState>, Json(r): Json<NewPromotion>) -> Result<(StatusCode, Json<PromotionRecord>), ApiError> {
    let record = s.promotions.create_promotion(&r.normalized()?).await?;
    tracing::info!(id = record.id, code = %record.code, "Promo code created successfully");
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)] pub struct SetActiveRequest { pub is_active: bool }

async fn set_promo_code_active(State(s): State<AppState>, Path(id): Path<i64>, Json(r): Json<SetActiveRequest>) -> Result<Json<PromotionRecord>, ApiError> {
    let record = s.promotions.set_promotion_active(id, r.is_active).await?;
    tracing::info!(id, is_active = record.is_active, "Promo code status updated");
    Ok(Json(record))
}

async fn delete_promo_code(State(s): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    s.promotions.delete_promotion(id).await?;
    tracing::info!(id, "Promo code deleted successfully");
    Ok(StatusCode::NO_CONTENT)
}

async fn payment_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<StatusCode, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
    match payment::reconcile_charge(&*s.orders, &s.webhook_secret, &s.currency, &body, signature).await? {
        Reconciliation::Recorded(_) | Reconciliation::Ignored { .. } => Ok(StatusCode::OK),
    }
}
