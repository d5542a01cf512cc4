//! 支付事件：仅追加的状态变更记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::PaymentStatus;

/// 单条事件记录，属于一个支付
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: Uuid,
    pub payment_id: Uuid,
    /// 点分小写事件类型，如 `onramp.completed`
    pub event_type: String,
    /// 变更后的支付状态
    pub status: PaymentStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PaymentEvent {
    /// 为一次状态变更构造事件（id在此生成，写库前即确定）
    pub fn for_transition(
        payment_id: Uuid,
        status: PaymentStatus,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            event_type: status.event_type().to_string(),
            status,
            metadata,
            created_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_follows_status() {
        let at = Utc::now();
        let ev = PaymentEvent::for_transition(
            Uuid::new_v4(),
            PaymentStatus::OnrampCompleted,
            serde_json::json!({}),
            at,
        );
        assert_eq!(ev.event_type, "onramp.completed");
        assert_eq!(ev.status, PaymentStatus::OnrampCompleted);
        assert_eq!(ev.created_at, at);
    }
}
