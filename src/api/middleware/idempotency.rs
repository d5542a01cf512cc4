//! 幂等性中间件
//!
//! 应用于 initiate / confirm 两个变更端点。键按 (端点, 用户, 幂等键) 划分，
//! 记录TTL 24小时。指纹一致时逐字节重放已存响应并附加
//! `Idempotent-Replayed: true`；指纹不一致返回409；两个并发首请求
//! 允许同时执行，重复创建由支付表的唯一约束兜底。

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{api::middleware::user_context, app_state::AppState, error::AppError};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const REPLAYED_HEADER: &str = "Idempotent-Replayed";

const RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// 请求体大小上限（幂等端点均为小JSON体）
const MAX_BODY_BYTES: usize = 64 * 1024;

/// 缓存的响应记录
#[derive(Serialize, Deserialize)]
struct IdempotencyRecord {
    fingerprint: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

/// 请求体指纹：原始字节的SHA-256 hex
pub fn body_fingerprint(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// 幂等性中间件
pub async fn idempotency_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 1. 端点作用域：键在端点间相互独立
    let endpoint = request
        .uri()
        .path()
        .rsplit('/')
        .next()
        .unwrap_or("unknown")
        .to_string();

    // 2. 幂等键必须是UUID v4
    let idempotency_key = match request.headers().get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => {
            let raw = value.to_str().map_err(|_| {
                AppError::invalid_idempotency_key("Idempotency-Key must be valid ASCII")
            })?;
            let parsed = uuid::Uuid::parse_str(raw).map_err(|_| {
                AppError::invalid_idempotency_key("Idempotency-Key must be a valid UUID")
            })?;
            if parsed.get_version_num() != 4 {
                return Err(AppError::invalid_idempotency_key(
                    "Idempotency-Key must be a version 4 UUID",
                ));
            }
            parsed
        }
        None => {
            return Err(AppError::invalid_idempotency_key(
                "Missing Idempotency-Key header",
            ));
        }
    };

    // 3. 用户作用域
    let (parts, body) = request.into_parts();
    let user_id = user_context::user_id_from_parts(&parts)?;

    // 4. 缓冲请求体并计算指纹
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::bad_request("Request body too large"))?;
    let fingerprint = body_fingerprint(&body_bytes);

    let cache_key = format!("idempotency:{}:{}:{}", endpoint, user_id, idempotency_key);

    // 5. 命中检查
    if let Some(cached) = state.redis.get(&cache_key).await? {
        match serde_json::from_str::<IdempotencyRecord>(&cached) {
            Ok(record) => {
                if record.fingerprint == fingerprint {
                    tracing::info!(
                        endpoint = %endpoint,
                        idempotency_key = %idempotency_key,
                        "Replaying cached response for duplicate request"
                    );
                    return Ok(replay_response(record));
                }

                tracing::warn!(
                    endpoint = %endpoint,
                    idempotency_key = %idempotency_key,
                    "Idempotency key reused with different request body"
                );
                return Err(AppError::idempotency_conflict(
                    "Idempotency-Key was already used with a different request body",
                ));
            }
            Err(e) => {
                // 记录损坏按未命中处理
                tracing::warn!(error = ?e, key = %cache_key, "Failed to parse idempotency record");
            }
        }
    }

    // 6. 执行实际请求（重建请求体）
    let request = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(request).await;

    // 7. 缓冲响应并存储记录；5xx不缓存，瞬时故障允许重试成功
    let (res_parts, res_body) = response.into_parts();
    let res_bytes = axum::body::to_bytes(res_body, usize::MAX)
        .await
        .map_err(|e| AppError::internal(format!("Failed to buffer response: {}", e)))?;

    if res_parts.status.as_u16() < 500 {
        let record = IdempotencyRecord {
            fingerprint,
            status: res_parts.status.as_u16(),
            headers: res_parts
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect(),
            body: String::from_utf8_lossy(&res_bytes).into_owned(),
        };

        let record_json = serde_json::to_string(&record)
            .map_err(|e| AppError::internal(format!("Failed to serialize record: {}", e)))?;

        if let Err(e) = state.redis.set_ex(&cache_key, &record_json, RECORD_TTL).await {
            // 存储失败不影响本次响应；下次重试会重新执行
            tracing::warn!(error = ?e, key = %cache_key, "Failed to store idempotency record");
        }
    }

    Ok(Response::from_parts(res_parts, Body::from(res_bytes)))
}

/// 逐字节重放已存响应
fn replay_response(record: IdempotencyRecord) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(record.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));

    for (name, value) in &record.headers {
        builder = builder.header(name, value);
    }

    let mut response = builder
        .body(Body::from(record.body))
        .unwrap_or_else(|_| Response::new(Body::empty()));

    response
        .headers_mut()
        .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));

    response
}
