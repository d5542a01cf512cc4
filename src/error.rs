use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorCode {
    // HTTP 基础错误码
    BadRequest,
    NotFound,
    Internal,

    // 业务错误码
    InvalidInput,
    InvalidIdempotencyKey,
    IdempotencyConflict,
    QuoteExpired,
    InvalidStateTransition,
    InsufficientBalance,
    RateUnavailable,
    ProviderFailure,
    DatabaseError,
    CacheError,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    pub status: StatusCode,
}

/// 统一错误响应体：{error, code?, message?}
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self.code {
            AppErrorCode::BadRequest => "bad_request",
            AppErrorCode::NotFound => "not_found",
            AppErrorCode::Internal => "internal",
            AppErrorCode::InvalidInput => "invalid_input",
            AppErrorCode::InvalidIdempotencyKey => "invalid_idempotency_key",
            AppErrorCode::IdempotencyConflict => "idempotency_conflict",
            AppErrorCode::QuoteExpired => "quote_expired",
            AppErrorCode::InvalidStateTransition => "invalid_state_transition",
            AppErrorCode::InsufficientBalance => "insufficient_balance",
            AppErrorCode::RateUnavailable => "rate_unavailable",
            AppErrorCode::ProviderFailure => "provider_failure",
            AppErrorCode::DatabaseError => "database_error",
            AppErrorCode::CacheError => "cache_error",
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code_str(),
            code: Some(self.code_str()),
            message: Some(&self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    fn new(code: AppErrorCode, status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            status,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::BadRequest, StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::NotFound, StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Internal, StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::InvalidInput, StatusCode::BAD_REQUEST, msg)
    }

    pub fn invalid_idempotency_key(msg: impl Into<String>) -> Self {
        Self::new(
            AppErrorCode::InvalidIdempotencyKey,
            StatusCode::BAD_REQUEST,
            msg,
        )
    }

    pub fn idempotency_conflict(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::IdempotencyConflict, StatusCode::CONFLICT, msg)
    }

    pub fn quote_expired(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::QuoteExpired, StatusCode::BAD_REQUEST, msg)
    }

    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::new(
            AppErrorCode::InvalidStateTransition,
            StatusCode::BAD_REQUEST,
            msg,
        )
    }

    pub fn insufficient_balance(msg: impl Into<String>) -> Self {
        Self::new(
            AppErrorCode::InsufficientBalance,
            StatusCode::BAD_REQUEST,
            msg,
        )
    }

    pub fn rate_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            AppErrorCode::RateUnavailable,
            StatusCode::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn provider_failure(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::ProviderFailure, StatusCode::BAD_GATEWAY, msg)
    }

    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::new(
            AppErrorCode::DatabaseError,
            StatusCode::INTERNAL_SERVER_ERROR,
            msg,
        )
    }

    pub fn cache_error(msg: impl Into<String>) -> Self {
        Self::new(
            AppErrorCode::CacheError,
            StatusCode::INTERNAL_SERVER_ERROR,
            msg,
        )
    }
}

// 从 serde_json 错误转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON serialization error: {}", err))
    }
}

// 从 SQLx 错误转换
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Resource not found"),
            sqlx::Error::Database(ref db_err) => {
                // 唯一约束冲突（如 quote_id 重复创建）
                if let Some(code) = db_err.code() {
                    if code == "23505" {
                        return Self::bad_request("Resource already exists");
                    }
                    if code == "23503" {
                        return Self::bad_request("Foreign key constraint violation");
                    }
                }
                Self::database_error(format!("Database error: {}", db_err))
            }
            _ => Self::database_error(format!("Database operation failed: {}", err)),
        }
    }
}

// 从 UUID 错误转换
impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        Self::bad_request(format!("Invalid UUID: {}", err))
    }
}

// 从 anyhow 错误转换
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{}", err))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::cache_error(format!("Cache operation failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::invalid_input("x").status, StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::idempotency_conflict("x").status,
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::not_found("x").status, StatusCode::NOT_FOUND);
        assert_eq!(AppError::quote_expired("x").status, StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::provider_failure("x").status,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_code_strings() {
        assert_eq!(AppError::quote_expired("x").code_str(), "quote_expired");
        assert_eq!(
            AppError::invalid_idempotency_key("x").code_str(),
            "invalid_idempotency_key"
        );
    }
}
