use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{RecommendationError, Result};
use crate::recommend::RecommendationService;

#[derive(Clone)]
pub struct AppState {
    pub service: RecommendationService,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/interactions", post(record_interaction))
        .route("/recommendations/users/:user_id", get(user_recommendations))
        .route(
            "/recommendations/products/:product_id",
            get(product_recommendations),
        )
        .route("/recommendations/trending", get(trending_products))
        .route("/jobs/similarity", post(calculate_similarities))
        .route("/jobs/trending", post(calculate_trending))
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
pub struct RecordInteractionRequest {
    pub user_id: String,
    pub product_id: String,
    pub interaction_type: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct RecordInteractionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<i64>,
    pub algorithm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserRecommendationsResponse {
    pub product_ids: Vec<String>,
    pub algorithm: String,
}

#[derive(Debug, Serialize)]
pub struct ProductIdsResponse {
    pub product_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct JobStartedResponse {
    pub started: bool,
}

async fn record_interaction(
    State(state): State<AppState>,
    Json(request): Json<RecordInteractionRequest>,
) -> Result<Json<RecordInteractionResponse>> {
    require_id(&request.user_id, "user_id")?;
    require_id(&request.product_id, "product_id")?;

    state
        .service
        .record_interaction(
            &request.user_id,
            &request.product_id,
            &request.interaction_type,
            request.metadata,
        )
        .await?;

    Ok(Json(RecordInteractionResponse {
        success: true,
        message: "Interaction recorded successfully".to_string(),
    }))
}

async fn user_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<UserRecommendationsResponse>> {
    require_id(&user_id, "user_id")?;
    let algorithm = query.algorithm.unwrap_or_default();

    let product_ids = state
        .service
        .user_recommendations(&user_id, query.limit.unwrap_or(0), &algorithm)
        .await?;

    Ok(Json(UserRecommendationsResponse {
        product_ids,
        algorithm: if algorithm.is_empty() {
            "hybrid".to_string()
        } else {
            algorithm
        },
    }))
}

async fn product_recommendations(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ProductIdsResponse>> {
    require_id(&product_id, "product_id")?;

    let product_ids = state
        .service
        .product_recommendations(&product_id, query.limit.unwrap_or(0))
        .await?;
    Ok(Json(ProductIdsResponse { product_ids }))
}

async fn trending_products(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ProductIdsResponse>> {
    let product_ids = state
        .service
        .trending_products(query.limit.unwrap_or(0))
        .await?;
    Ok(Json(ProductIdsResponse { product_ids }))
}

async fn calculate_similarities(
    State(state): State<AppState>,
) -> (StatusCode, Json<JobStartedResponse>) {
    let service = state.service.clone();
    tokio::spawn(async move {
        if let Err(err) = service.recalculate_similarities().await {
            error!(%err, "manual similarity recalculation failed");
        }
    });
    (StatusCode::ACCEPTED, Json(JobStartedResponse { started: true }))
}

async fn calculate_trending(
    State(state): State<AppState>,
) -> (StatusCode, Json<JobStartedResponse>) {
    let service = state.service.clone();
    tokio::spawn(async move {
        if let Err(err) = service.recalculate_trending().await {
            error!(%err, "manual trending recalculation failed");
        }
    });
    (StatusCode::ACCEPTED, Json(JobStartedResponse { started: true }))
}

async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

fn require_id(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RecommendationError::InvalidArgument(format!(
            "{field} is required"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ids_are_rejected() {
        assert!(require_id("", "user_id").is_err());
        assert!(require_id("  ", "user_id").is_err());
        assert!(require_id("u1", "user_id").is_ok());
    }
}
