//! HTTP error type for the SolarTales API
//!
//! Handlers return [`ApiResult`]; an [`ApiError`] renders as a JSON body
//! `{code, message, details?}` with the status its [`ErrorCode`] maps to.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use solartales_core::{ProviderError, StorageError, StoryError, ValidationError};
use std::fmt;

// ============================================================================
// ERROR CODES
// ============================================================================

/// Machine-readable error category, serialized in SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or wrong admin token (401)
    Unauthorized,

    /// Malformed or out-of-range value (400)
    InvalidInput,

    /// Subject key fails validation (400)
    InvalidSubject,

    /// Required body field absent (400)
    MissingField,

    /// Scheduler refused the operation (409)
    StateConflict,

    /// Client over its request budget (429)
    TooManyRequests,

    InternalError,
    DatabaseError,

    /// LLM or space-weather feed failed (502)
    UpstreamError,

    /// Dependency down or not configured (503)
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::InvalidInput | ErrorCode::InvalidSubject | ErrorCode::MissingField => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::StateConflict => StatusCode::CONFLICT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR
// ============================================================================

/// Error body returned by every SolarTales endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
    /// Seconds the client should wait, sent as `Retry-After`.
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_subject(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSubject, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Missing required field `{}`", field),
        )
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Create a TooManyRequests error carrying the wait time.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Too many requests, try again in {}s", secs),
            None => "Too many requests".to_string(),
        };
        let mut err = Self::new(ErrorCode::TooManyRequests, message);
        if let Some(secs) = retry_after_secs {
            err.details = Some(serde_json::json!({ "retry_after_secs": secs }));
        }
        err.retry_after_secs = retry_after_secs;
        err
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Render as JSON with the mapped status; rate-limit errors also carry
/// a `Retry-After` header.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs;
        let mut response = (status, Json(self)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidSubject { .. } => ApiError::invalid_subject(err.to_string()),
            ValidationError::InvalidValue { .. } => ApiError::invalid_input(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Story store error");
        match err {
            StorageError::Unavailable { .. } => {
                ApiError::service_unavailable("Story store unavailable")
            }
            _ => ApiError::database_error("Story store operation failed"),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        tracing::warn!(error = %err, "Provider error");
        match err {
            ProviderError::NotConfigured { .. } => {
                ApiError::service_unavailable("Provider not configured")
            }
            _ => ApiError::upstream_error("Upstream provider failed"),
        }
    }
}

impl From<StoryError> for ApiError {
    fn from(err: StoryError) -> Self {
        match err {
            StoryError::Throttled(reason) => ApiError::state_conflict(reason.to_string())
                .with_details(serde_json::json!({ "reason": reason })),
            StoryError::Provider(e) => e.into(),
            StoryError::Storage(e) => e.into(),
            StoryError::Validation(e) => e.into(),
            StoryError::RateLimitExceeded { retry_after_secs } => {
                ApiError::too_many_requests(Some(retry_after_secs))
            }
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!(error = %err, "Postgres query failed");
        ApiError::database_error("Story store query failed")
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!(error = %err, "Postgres pool error");
        match err {
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Story store pool closed")
            }
            _ => ApiError::database_error("No story store connection available"),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
