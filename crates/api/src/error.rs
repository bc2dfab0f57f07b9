use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use stockfolio_core::optimizer::OptimizeError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
    }

    /// Engine failures keep their message; anything else is reported and hidden.
    pub fn internal(err: anyhow::Error) -> Self {
        if let Some(opt) = err.downcast_ref::<OptimizeError>() {
            return Self::bad_request(opt.to_string());
        }
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server error")
    }
}

impl From<OptimizeError> for ApiError {
    fn from(err: OptimizeError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: &self.message,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimize_errors_are_bad_requests_with_engine_message() {
        let e = ApiError::from(OptimizeError::NoStocks);
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.message, "no stocks provided for optimization");

        let wrapped = anyhow::Error::new(OptimizeError::BudgetNotPositive);
        let e = ApiError::internal(wrapped);
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.message, "budget must be greater than 0");
    }

    #[test]
    fn other_errors_are_hidden() {
        let e = ApiError::internal(anyhow::anyhow!("connection reset by peer"));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message, "server error");
    }
}
