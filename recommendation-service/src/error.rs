use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, RecommendationError>;

#[derive(Debug, thiserror::Error)]
pub enum RecommendationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid recommendation algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient: {0}")]
    Transient(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl RecommendationError {
    pub fn code(&self) -> &'static str {
        match self {
            RecommendationError::InvalidArgument(_) => "INVALID_ARGUMENT",
            RecommendationError::InvalidAlgorithm(_) => "INVALID_ALGORITHM",
            RecommendationError::NotFound(_) => "NOT_FOUND",
            RecommendationError::Transient(_) => "TRANSIENT",
            RecommendationError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RecommendationError::InvalidArgument(_)
            | RecommendationError::InvalidAlgorithm(_) => StatusCode::BAD_REQUEST,
            RecommendationError::NotFound(_) => StatusCode::NOT_FOUND,
            RecommendationError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            RecommendationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<diesel::result::Error> for RecommendationError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => RecommendationError::NotFound("record not found".into()),
            Error::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
                RecommendationError::Transient(info.message().to_string())
            }
            other => RecommendationError::Internal(other.to_string()),
        }
    }
}

impl From<diesel_async::pooled_connection::bb8::RunError> for RecommendationError {
    fn from(err: diesel_async::pooled_connection::bb8::RunError) -> Self {
        RecommendationError::Transient(format!("connection pool: {err}"))
    }
}

impl From<serde_json::Error> for RecommendationError {
    fn from(err: serde_json::Error) -> Self {
        RecommendationError::Internal(format!("serialization: {err}"))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
}

impl IntoResponse for RecommendationError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_algorithm_has_its_own_code() {
        let err = RecommendationError::InvalidAlgorithm("magic".into());
        assert_eq!(err.code(), "INVALID_ALGORITHM");
    }
}
