//! 支付API
//!
//! POST /api/v1/initiate — 创建支付意图（幂等）
//! POST /api/v1/confirm  — 确认并入队处理（幂等）
//! GET  /api/v1/payments/:id, GET /api/v1/payments — 只读查询

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        middleware::AuthContext,
        quote_api::{parse_corridor, parse_fee_handling, parse_method},
    },
    app_state::AppState,
    domain::payment::{FeeBreakdown, Payment, PaymentStatus},
    error::AppError,
    service::payment_service::InitiateRequest,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiateBody {
    /// 来源报价id（仅关联信息，服务端重新计费）
    pub quote_id: Option<Uuid>,
    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
    #[schema(example = "MXN")]
    pub destination_currency: String,
    #[schema(example = "ach")]
    pub payment_method: String,
    #[schema(example = "inclusive")]
    pub fee_handling: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InitiateResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub quote_expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmBody {
    pub payment_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub processing: bool,
}

/// 支付只读视图
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentView {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub source_currency: String,
    pub destination_currency: String,
    pub payment_method: String,
    pub fee_handling: String,
    pub fees: FeeBreakdown,
    #[schema(value_type = String)]
    pub usdc_sent: Decimal,
    #[schema(value_type = String)]
    pub exchange_rate: Decimal,
    #[schema(value_type = String)]
    pub destination_amount: Decimal,
    pub quote_id: Option<Uuid>,
    pub quote_expires_at: DateTime<Utc>,
    pub onramp_tx_id: Option<String>,
    pub offramp_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            payment_id: p.id,
            status: p.status,
            amount: p.amount,
            source_currency: p.source_currency,
            destination_currency: p.destination_currency.as_str().to_string(),
            payment_method: p.payment_method.as_str().to_string(),
            fee_handling: p.fee_handling.as_str().to_string(),
            fees: p.fees,
            usdc_sent: p.usdc_sent,
            exchange_rate: p.exchange_rate,
            destination_amount: p.destination_amount,
            quote_id: p.quote_id,
            quote_expires_at: p.quote_expires_at,
            onramp_tx_id: p.onramp_tx_id,
            offramp_tx_id: p.offramp_tx_id,
            created_at: p.created_at,
            updated_at: p.updated_at,
            completed_at: p.completed_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/initiate",
    request_body = InitiateBody,
    responses(
        (status = 200, description = "支付已创建", body = InitiateResponse),
        (status = 400, description = "参数非法 / 余额不足"),
        (status = 409, description = "幂等键冲突"),
    ),
    tag = "payments"
)]
pub async fn initiate_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(body): Json<InitiateBody>,
) -> Result<Json<InitiateResponse>, AppError> {
    let request = InitiateRequest {
        quote_id: body.quote_id,
        amount: body.amount,
        destination_currency: parse_corridor(&body.destination_currency)?,
        payment_method: parse_method(&body.payment_method)?,
        fee_handling: parse_fee_handling(Some(&body.fee_handling))?,
    };

    let payment = state.payments.initiate(auth.user_id, request).await?;

    Ok(Json(InitiateResponse {
        payment_id: payment.id,
        status: payment.status,
        quote_expires_at: payment.quote_expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/confirm",
    request_body = ConfirmBody,
    responses(
        (status = 200, description = "支付已确认，处理已入队", body = ConfirmResponse),
        (status = 400, description = "报价过期 / 状态非法"),
        (status = 404, description = "支付不存在"),
        (status = 409, description = "幂等键冲突"),
    ),
    tag = "payments"
)]
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let payment = state.payments.confirm(auth.user_id, body.payment_id).await?;

    Ok(Json(ConfirmResponse {
        payment_id: payment.id,
        status: payment.status,
        processing: true,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "支付id")),
    responses(
        (status = 200, description = "支付详情", body = PaymentView),
        (status = 404, description = "支付不存在"),
    ),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentView>, AppError> {
    let payment = state
        .payment_repo
        .find_by_id(id)
        .await?
        .filter(|p| p.user_id == auth.user_id)
        .ok_or_else(|| AppError::not_found(format!("payment {} not found", id)))?;

    Ok(Json(payment.into()))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/payments",
    responses((status = 200, description = "用户支付列表（新→旧）", body = [PaymentView])),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PaymentView>>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let payments = state
        .payment_repo
        .list_for_user(auth.user_id, limit)
        .await?;

    Ok(Json(payments.into_iter().map(PaymentView::from).collect()))
}
