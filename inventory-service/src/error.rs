use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, InventoryError>;

/// Error taxonomy for the inventory core. Every public operation either
/// returns its declared result or exactly one of these.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock: available={available}, requested={requested}")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("conflict: {0}")]
    Conflict(String),

    /// Lock timeouts, serialization failures, pool exhaustion. The caller
    /// may retry with backoff.
    #[error("transient: {0}")]
    Transient(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl InventoryError {
    pub fn code(&self) -> &'static str {
        match self {
            InventoryError::InvalidArgument(_) => "INVALID_ARGUMENT",
            InventoryError::NotFound(_) => "NOT_FOUND",
            InventoryError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            InventoryError::Conflict(_) => "CONFLICT",
            InventoryError::Transient(_) => "TRANSIENT",
            InventoryError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            InventoryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
            InventoryError::InsufficientStock { .. } | InventoryError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            InventoryError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            InventoryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<diesel::result::Error> for InventoryError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => InventoryError::NotFound("record not found".into()),
            Error::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
                InventoryError::Transient(info.message().to_string())
            }
            other => InventoryError::Internal(other.to_string()),
        }
    }
}

impl From<diesel_async::pooled_connection::bb8::RunError> for InventoryError {
    fn from(err: diesel_async::pooled_connection::bb8::RunError) -> Self {
        InventoryError::Transient(format!("connection pool: {err}"))
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Internal(format!("serialization: {err}"))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_quantity: Option<i32>,
}

impl IntoResponse for InventoryError {
    fn into_response(self) -> Response {
        let available_quantity = match &self {
            InventoryError::InsufficientStock { available, .. } => Some(*available),
            _ => None,
        };
        let body = ErrorBody {
            code: self.code(),
            error: self.to_string(),
            available_quantity,
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err = InventoryError::from(diesel::result::Error::NotFound);
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn insufficient_stock_carries_availability() {
        let err = InventoryError::InsufficientStock {
            available: 3,
            requested: 5,
        };
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert!(err.to_string().contains("available=3"));
    }
}
