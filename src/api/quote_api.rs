//! 报价API
//!
//! POST /api/v1/quote — 无状态，不落库；报价60秒有效

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    domain::payment::{Corridor, FeeBreakdown, FeeHandling, PaymentMethod},
    error::AppError,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuoteRequest {
    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
    #[schema(example = "MXN")]
    pub destination_currency: String,
    #[schema(example = "ach")]
    pub payment_method: String,
    /// 缺省为 inclusive
    #[schema(example = "inclusive")]
    pub fee_handling: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteResponse {
    pub quote_id: Uuid,
    pub expires_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub exchange_rate: Decimal,
    pub breakdown: QuoteBreakdownBody,
    #[schema(value_type = String)]
    pub margin: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteBreakdownBody {
    #[schema(value_type = String)]
    pub input_amount: Decimal,
    pub fees: FeeBreakdown,
    #[schema(value_type = String)]
    pub usdc_sent: Decimal,
    #[schema(value_type = String)]
    pub destination_amount: Decimal,
    #[schema(value_type = String)]
    pub effective_rate: Decimal,
}

/// 解析请求中的枚举字段（未知值 → 400 invalid_input）
pub(crate) fn parse_corridor(s: &str) -> Result<Corridor, AppError> {
    Corridor::from_str(s)
        .ok_or_else(|| AppError::invalid_input(format!("unsupported destination currency: {}", s)))
}

pub(crate) fn parse_method(s: &str) -> Result<PaymentMethod, AppError> {
    PaymentMethod::from_str(s)
        .ok_or_else(|| AppError::invalid_input(format!("unsupported payment method: {}", s)))
}

pub(crate) fn parse_fee_handling(s: Option<&str>) -> Result<FeeHandling, AppError> {
    match s {
        None => Ok(FeeHandling::Inclusive),
        Some(raw) => FeeHandling::from_str(raw)
            .ok_or_else(|| AppError::invalid_input(format!("unsupported fee handling: {}", raw))),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "报价成功", body = QuoteResponse),
        (status = 400, description = "参数非法"),
        (status = 503, description = "汇率不可用"),
    ),
    tag = "quotes"
)]
pub async fn create_quote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let corridor = parse_corridor(&req.destination_currency)?;
    let method = parse_method(&req.payment_method)?;
    let handling = parse_fee_handling(req.fee_handling.as_deref())?;

    let quote = state
        .quotes
        .quote(req.amount, corridor, method, handling)
        .await?;

    Ok(Json(QuoteResponse {
        quote_id: quote.quote_id,
        expires_at: quote.expires_at,
        exchange_rate: quote.exchange_rate,
        breakdown: QuoteBreakdownBody {
            input_amount: quote.breakdown.input_amount,
            fees: quote.breakdown.fees,
            usdc_sent: quote.breakdown.usdc_sent,
            destination_amount: quote.breakdown.destination_amount,
            effective_rate: quote.breakdown.effective_rate,
        },
        margin: quote.margin,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_corridor_case_insensitive() {
        assert!(parse_corridor("mxn").is_ok());
        assert!(parse_corridor("MXN").is_ok());
        assert!(parse_corridor("EUR").is_err());
    }

    #[test]
    fn test_fee_handling_defaults_to_inclusive() {
        assert_eq!(parse_fee_handling(None).unwrap(), FeeHandling::Inclusive);
        assert_eq!(
            parse_fee_handling(Some("additive")).unwrap(),
            FeeHandling::Additive
        );
        assert!(parse_fee_handling(Some("split")).is_err());
    }
}
