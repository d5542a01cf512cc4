//! Webhook投递记录与签名载荷
//!
//! 载荷在状态变更入队时冻结；重试只复用已冻结的载荷，
//! 一个投递组（同一事件的所有尝试）只对应一条持久记录。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    event::PaymentEvent,
    payment::{Corridor, FeeBreakdown, Payment, PaymentStatus},
};

/// 投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    Exhausted,
}

impl DeliveryStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "delivered" => DeliveryStatus::Delivered,
            "failed" => DeliveryStatus::Failed,
            "exhausted" => DeliveryStatus::Exhausted,
            _ => DeliveryStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Exhausted => "exhausted",
        }
    }
}

/// 投递记录
///
/// payload保存签名时的原始字节；重试逐字节复用，保证签名始终可验证。
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub event_type: String,
    pub payload: String,
    pub signature: String,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Webhook载荷信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// 事件id，消费方以此去重
    pub id: Uuid,
    pub event_type: String,
    pub api_version: String,
    pub created_at: DateTime<Utc>,
    pub data: WebhookPaymentData,
}

/// 载荷中的支付快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPaymentData {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub destination_currency: Corridor,
    pub exchange_rate: Decimal,
    pub fees: FeeBreakdown,
    pub usdc_sent: Decimal,
    pub destination_amount: Decimal,
    pub onramp_tx_id: Option<String>,
    pub offramp_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WebhookPayload {
    /// 从变更后的支付快照冻结载荷
    pub fn freeze(payment: &Payment, event: &PaymentEvent, api_version: &str) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type.clone(),
            api_version: api_version.to_string(),
            created_at: event.created_at,
            data: WebhookPaymentData {
                payment_id: payment.id,
                status: payment.status,
                amount: payment.amount,
                destination_currency: payment.destination_currency,
                exchange_rate: payment.exchange_rate,
                fees: payment.fees.clone(),
                usdc_sent: payment.usdc_sent,
                destination_amount: payment.destination_amount,
                onramp_tx_id: payment.onramp_tx_id.clone(),
                offramp_tx_id: payment.offramp_tx_id.clone(),
                created_at: payment.created_at,
                updated_at: payment.updated_at,
                completed_at: payment.completed_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_status_round_trip() {
        for s in ["pending", "delivered", "failed", "exhausted"] {
            assert_eq!(DeliveryStatus::from_str(s).as_str(), s);
        }
        // 未知值回退为pending
        assert_eq!(DeliveryStatus::from_str("bogus"), DeliveryStatus::Pending);
    }
}
