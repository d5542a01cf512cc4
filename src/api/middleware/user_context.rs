//! 用户上下文提取器
//!
//! 认证在核心之外（API网关完成），网关将已验证的用户身份
//! 通过 X-User-Id 头注入；这里只做提取与格式校验。

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// 已认证的请求上下文
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = user_id_from_parts(parts)?;
        Ok(AuthContext { user_id })
    }
}

/// 从请求头解析用户id（中间件与提取器共用）
pub fn user_id_from_parts(parts: &Parts) -> Result<Uuid, AppError> {
    let raw = parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::bad_request(format!("Missing {} header", USER_ID_HEADER)))?;

    raw.parse::<Uuid>()
        .map_err(|_| AppError::bad_request(format!("{} must be a valid UUID", USER_ID_HEADER)))
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    #[test]
    fn test_user_id_parsing() {
        let req = Request::builder()
            .header(USER_ID_HEADER, "550e8400-e29b-41d4-a716-446655440000")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert!(user_id_from_parts(&parts).is_ok());
    }

    #[test]
    fn test_missing_header_rejected() {
        let req = Request::builder().body(()).unwrap();
        let (parts, _) = req.into_parts();
        assert!(user_id_from_parts(&parts).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        let req = Request::builder()
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert!(user_id_from_parts(&parts).is_err());
    }
}
