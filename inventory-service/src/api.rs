use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::models::{Reservation, StockMovement, StockOperation, StockSnapshot};
use crate::reservations::ReserveOutcome;
use crate::service::InventoryService;
use crate::store::BulkCheckResult;
use shared::ReservationLine;

#[derive(Clone)]
pub struct AppState {
    pub service: InventoryService,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/stock/:product_id", get(get_stock))
        .route("/stock/:product_id/check", get(check_stock))
        .route("/stock/:product_id/movements", get(get_movements))
        .route("/stock/check", post(bulk_check_stock))
        .route("/stock", put(update_stock))
        .route("/reservations", post(reserve_stock))
        .route("/reservations/:identifier", get(get_reservations))
        .route("/reservations/:identifier/commit", post(commit_reservation))
        .route("/reservations/:identifier/release", post(release_reservation))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub variant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub variant_id: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CheckStockResponse {
    pub available: bool,
    pub available_quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct MovementsQuery {
    pub variant_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCheckRequest {
    pub items: Vec<ReservationLine>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStockRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i32,
    pub operation: String,
    #[serde(default)]
    pub reason: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReserveStockRequest {
    pub order_id: String,
    pub items: Vec<ReservationLine>,
    #[serde(default)]
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub success: bool,
    pub settled: usize,
}

async fn get_stock(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<StockQuery>,
) -> Result<Json<StockSnapshot>> {
    require_id(&product_id, "product_id")?;
    let snapshot = state
        .service
        .get_stock(&product_id, query.variant_id.as_deref())
        .await?;
    Ok(Json(snapshot))
}

async fn check_stock(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckStockResponse>> {
    require_id(&product_id, "product_id")?;
    require_positive(query.quantity, "quantity")?;

    let (available, available_quantity) = state
        .service
        .check_stock(&product_id, query.variant_id.as_deref(), query.quantity)
        .await?;
    Ok(Json(CheckStockResponse {
        available,
        available_quantity,
    }))
}

async fn get_movements(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<MovementsQuery>,
) -> Result<Json<Vec<StockMovement>>> {
    require_id(&product_id, "product_id")?;
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let movements = state
        .service
        .get_movements(&product_id, query.variant_id.as_deref(), limit)
        .await?;
    Ok(Json(movements))
}

async fn bulk_check_stock(
    State(state): State<AppState>,
    Json(request): Json<BulkCheckRequest>,
) -> Result<Json<Vec<BulkCheckResult>>> {
    if request.items.is_empty() {
        return Err(InventoryError::InvalidArgument("items are required".into()));
    }
    for item in &request.items {
        require_id(&item.product_id, "product_id")?;
        require_positive(item.quantity, "quantity")?;
    }

    let results = state.service.bulk_check_stock(&request.items).await?;
    Ok(Json(results))
}

async fn update_stock(
    State(state): State<AppState>,
    Json(request): Json<UpdateStockRequest>,
) -> Result<Json<StockSnapshot>> {
    require_id(&request.product_id, "product_id")?;
    let operation = StockOperation::parse(&request.operation).ok_or_else(|| {
        InventoryError::InvalidArgument(format!("invalid operation: {}", request.operation))
    })?;
    match operation {
        StockOperation::Set => require_non_negative(request.quantity, "quantity")?,
        _ => require_positive(request.quantity, "quantity")?,
    }

    let snapshot = state
        .service
        .update_stock(
            &request.product_id,
            request.variant_id.as_deref(),
            request.quantity,
            operation,
            &request.reason,
            request.created_by.as_deref(),
        )
        .await?;
    Ok(Json(snapshot))
}

async fn reserve_stock(
    State(state): State<AppState>,
    Json(request): Json<ReserveStockRequest>,
) -> Result<Json<ReserveOutcome>> {
    require_id(&request.order_id, "order_id")?;
    if request.items.is_empty() {
        return Err(InventoryError::InvalidArgument("items are required".into()));
    }
    for item in &request.items {
        require_id(&item.product_id, "product_id")?;
        require_positive(item.quantity, "quantity")?;
    }

    let outcome = state
        .service
        .reserve_stock(&request.order_id, &request.items, request.ttl_seconds)
        .await?;
    Ok(Json(outcome))
}

async fn get_reservations(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<Vec<Reservation>>> {
    require_id(&identifier, "identifier")?;
    let reservations = state.service.find_reservations(&identifier).await?;
    if reservations.is_empty() {
        return Err(InventoryError::NotFound(format!(
            "no reservations for {identifier}"
        )));
    }
    Ok(Json(reservations))
}

async fn commit_reservation(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<SettleResponse>> {
    require_id(&identifier, "identifier")?;
    let settled = state.service.commit_reservation(&identifier).await?;
    Ok(Json(SettleResponse {
        success: true,
        settled,
    }))
}

async fn release_reservation(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<SettleResponse>> {
    require_id(&identifier, "identifier")?;
    let settled = state.service.release_reservation(&identifier).await?;
    Ok(Json(SettleResponse {
        success: true,
        settled,
    }))
}

async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

fn require_id(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(InventoryError::InvalidArgument(format!(
            "{field} is required"
        )));
    }
    Ok(())
}

fn require_positive(value: i32, field: &str) -> Result<()> {
    if value <= 0 {
        return Err(InventoryError::InvalidArgument(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

fn require_non_negative(value: i32, field: &str) -> Result<()> {
    if value < 0 {
        return Err(InventoryError::InvalidArgument(format!(
            "{field} must not be negative"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validators_reject_bad_input() {
        assert!(require_id("", "product_id").is_err());
        assert!(require_id("   ", "product_id").is_err());
        assert!(require_id("p1", "product_id").is_ok());

        assert!(require_positive(0, "quantity").is_err());
        assert!(require_positive(-1, "quantity").is_err());
        assert!(require_positive(1, "quantity").is_ok());

        assert!(require_non_negative(-1, "quantity").is_err());
        assert!(require_non_negative(0, "quantity").is_ok());
    }
}
