use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

/// SQLSTATE raised when Postgres picks this transaction as a deadlock victim.
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Device not registered: {0}")]
    UnknownDevice(String),

    #[error("Invalid timestamp '{0}', expected ISO 8601")]
    InvalidTimestamp(String),

    #[error("Invalid soil value for {field}: '{value}'")]
    InvalidSoilValue { field: String, value: String },

    #[error("Insufficient soil data: {0}")]
    InsufficientSoilData(String),

    #[error("Missing climate data: {0}")]
    MissingClimateData(String),

    #[error("Prediction model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Text generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Could not parse generated response: {0}")]
    ParseFailure(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AppError {
    /// Map a unique-constraint violation to `Conflict`, anything else to `DatabaseError`.
    pub fn conflict_on_unique(err: sqlx::Error, message: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(message.into())
            }
            _ => AppError::DatabaseError(err),
        }
    }

    /// True when Postgres aborted this transaction to break a lock cycle.
    fn is_deadlock(&self) -> bool {
        match self {
            AppError::DatabaseError(err) => err
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .is_some_and(|code| code == DEADLOCK_DETECTED),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        if self.is_deadlock() {
            return StatusCode::CONFLICT;
        }
        match self {
            AppError::NotFound(_) | AppError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::InvalidTimestamp(_)
            | AppError::InvalidSoilValue { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientSoilData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::MissingClimateData(_) | AppError::ModelUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::GenerationUnavailable(_)
            | AppError::ParseFailure(_)
            | AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(_) | AppError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::DatabaseError(err) if self.is_deadlock() => {
                tracing::warn!("Deadlock detected: {:?}", err);
                "Conflicting concurrent update, please retry".to_string()
            }
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                "Internal database error".to_string()
            }
            other => other.to_string(),
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;

    #[derive(Debug)]
    struct PgError {
        code: &'static str,
    }

    impl std::fmt::Display for PgError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "error with SQLSTATE {}", self.code)
        }
    }

    impl std::error::Error for PgError {}

    impl DatabaseError for PgError {
        fn message(&self) -> &str {
            "deadlock detected"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn pg_error(code: &'static str) -> AppError {
        AppError::DatabaseError(sqlx::Error::Database(Box::new(PgError { code })))
    }

    #[test]
    fn test_deadlock_maps_to_conflict() {
        let response = pg_error("40P01").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_other_database_codes_stay_internal() {
        assert_eq!(
            pg_error("22003").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_pipeline_errors_have_distinct_statuses() {
        assert_eq!(
            AppError::UnknownDevice("hw-1".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidTimestamp("yesterday".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InsufficientSoilData("no NPK".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::ModelUnavailable("crop".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::GenerationUnavailable("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_conflict_on_unique_passes_other_errors_through() {
        let err = AppError::conflict_on_unique(sqlx::Error::RowNotFound, "taken");
        assert!(matches!(err, AppError::DatabaseError(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_database_error_hides_details() {
        let response = AppError::DatabaseError(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
