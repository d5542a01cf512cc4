//! 报价服务
//!
//! 无状态组合：费用引擎 + 汇率缓存。报价句柄60秒过期，
//! 不持久化；initiate时服务端重新计费，quote_id仅作关联信息。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::{
    domain::payment::{Corridor, FeeBreakdown, FeeHandling, PaymentMethod},
    error::AppError,
    service::{fee_engine, rate_service::RateService},
};

/// 报价有效期（秒）
pub const QUOTE_TTL_SECS: i64 = 60;

/// 报价明细
#[derive(Debug, Clone)]
pub struct QuoteBreakdown {
    pub input_amount: Decimal,
    pub fees: FeeBreakdown,
    pub usdc_sent: Decimal,
    pub destination_amount: Decimal,
    /// destination_amount / input_amount，6位小数
    pub effective_rate: Decimal,
}

/// 报价结果
#[derive(Debug, Clone)]
pub struct Quote {
    pub quote_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub exchange_rate: Decimal,
    pub breakdown: QuoteBreakdown,
    /// 总费用占输入金额的比例，6位小数
    pub margin: Decimal,
}

pub struct QuoteService {
    rates: Arc<RateService>,
}

impl QuoteService {
    pub fn new(rates: Arc<RateService>) -> Self {
        Self { rates }
    }

    /// 生成报价
    pub async fn quote(
        &self,
        amount: Decimal,
        destination_currency: Corridor,
        method: PaymentMethod,
        handling: FeeHandling,
    ) -> Result<Quote, AppError> {
        let fee_quote = fee_engine::compute(amount, method, destination_currency, handling)
            .map_err(|e| AppError::invalid_input(e.to_string()))?;

        let rate = self
            .rates
            .rate(destination_currency)
            .await
            .map_err(|e| AppError::rate_unavailable(e.to_string()))?;

        let destination_amount = (fee_quote.usdc_sent * rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let effective_rate = (destination_amount / amount)
            .round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero);
        let margin = (fee_quote.breakdown.total / amount)
            .round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero);

        Ok(Quote {
            // 128位随机不透明句柄
            quote_id: Uuid::from_bytes(rand::random::<[u8; 16]>()),
            expires_at: Utc::now() + Duration::seconds(QUOTE_TTL_SECS),
            exchange_rate: rate,
            breakdown: QuoteBreakdown {
                input_amount: amount,
                fees: fee_quote.breakdown,
                usdc_sent: fee_quote.usdc_sent,
                destination_amount,
                effective_rate,
            },
            margin,
        })
    }
}

/// 目标金额 = round2(usdc_sent × 汇率)，报价与initiate共用
pub fn destination_amount(usdc_sent: Decimal, rate: Decimal) -> Decimal {
    (usdc_sent * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
