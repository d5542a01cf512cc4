//! 支付聚合根与状态机
//!
//! 费用快照在创建时写入且不可变更；状态只沿状态机定义的边前进，
//! 每次变更恰好产生一条事件和一个webhook投递任务。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// 支持的出金通道（USD → 本地法币）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Corridor {
    Mxn,
    Ngn,
    Php,
    Inr,
    Brl,
}

impl Corridor {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MXN" => Some(Corridor::Mxn),
            "NGN" => Some(Corridor::Ngn),
            "PHP" => Some(Corridor::Php),
            "INR" => Some(Corridor::Inr),
            "BRL" => Some(Corridor::Brl),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Corridor::Mxn => "MXN",
            Corridor::Ngn => "NGN",
            Corridor::Php => "PHP",
            Corridor::Inr => "INR",
            Corridor::Brl => "BRL",
        }
    }

    /// 通道费率
    pub fn fee_rate(&self) -> Decimal {
        match self {
            Corridor::Mxn => Decimal::new(10, 3),  // 1.0%
            Corridor::Ngn => Decimal::new(20, 3),  // 2.0%
            Corridor::Php => Decimal::new(15, 3),  // 1.5%
            Corridor::Inr => Decimal::new(12, 3),  // 1.2%
            Corridor::Brl => Decimal::new(18, 3),  // 1.8%
        }
    }

    pub fn all() -> [Corridor; 5] {
        [
            Corridor::Mxn,
            Corridor::Ngn,
            Corridor::Php,
            Corridor::Inr,
            Corridor::Brl,
        ]
    }
}

/// 入金支付方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Ach,
    Card,
}

impl PaymentMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ach" => Some(PaymentMethod::Ach),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Ach => "ach",
            PaymentMethod::Card => "card",
        }
    }

    /// 入金费率
    pub fn onramp_fee_rate(&self) -> Decimal {
        match self {
            PaymentMethod::Ach => Decimal::ZERO,
            PaymentMethod::Card => Decimal::new(29, 3), // 2.9%
        }
    }
}

/// 费用承担模式：inclusive从转账金额内扣费，additive在金额之外加收
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FeeHandling {
    Inclusive,
    Additive,
}

impl FeeHandling {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inclusive" => Some(FeeHandling::Inclusive),
            "additive" => Some(FeeHandling::Additive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeeHandling::Inclusive => "inclusive",
            FeeHandling::Additive => "additive",
        }
    }
}

/// 费用快照：创建后不可变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeeBreakdown {
    pub onramp: Decimal,
    pub corridor: Decimal,
    pub platform: Decimal,
    pub network_gas: Decimal,
    pub total: Decimal,
}

/// 支付状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Quoted,
    Initiated,
    Confirmed,
    OnrampPending,
    OnrampCompleted,
    OnrampFailed,
    OfframpPending,
    OfframpCompleted,
    OfframpFailed,
    Completed,
    Failed,
}

/// 非法状态转换
#[derive(Debug, Clone, Error)]
#[error("invalid state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub to: &'static str,
}

impl PaymentStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "QUOTED" => Some(PaymentStatus::Quoted),
            "INITIATED" => Some(PaymentStatus::Initiated),
            "CONFIRMED" => Some(PaymentStatus::Confirmed),
            "ONRAMP_PENDING" => Some(PaymentStatus::OnrampPending),
            "ONRAMP_COMPLETED" => Some(PaymentStatus::OnrampCompleted),
            "ONRAMP_FAILED" => Some(PaymentStatus::OnrampFailed),
            "OFFRAMP_PENDING" => Some(PaymentStatus::OfframpPending),
            "OFFRAMP_COMPLETED" => Some(PaymentStatus::OfframpCompleted),
            "OFFRAMP_FAILED" => Some(PaymentStatus::OfframpFailed),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Quoted => "QUOTED",
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::OnrampPending => "ONRAMP_PENDING",
            PaymentStatus::OnrampCompleted => "ONRAMP_COMPLETED",
            PaymentStatus::OnrampFailed => "ONRAMP_FAILED",
            PaymentStatus::OfframpPending => "OFFRAMP_PENDING",
            PaymentStatus::OfframpCompleted => "OFFRAMP_COMPLETED",
            PaymentStatus::OfframpFailed => "OFFRAMP_FAILED",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// 状态对应的事件类型（点分小写）
    pub fn event_type(&self) -> &'static str {
        match self {
            PaymentStatus::Quoted => "payment.quoted",
            PaymentStatus::Initiated => "payment.initiated",
            PaymentStatus::Confirmed => "payment.confirmed",
            PaymentStatus::OnrampPending => "onramp.pending",
            PaymentStatus::OnrampCompleted => "onramp.completed",
            PaymentStatus::OnrampFailed => "onramp.failed",
            PaymentStatus::OfframpPending => "offramp.pending",
            PaymentStatus::OfframpCompleted => "offramp.completed",
            PaymentStatus::OfframpFailed => "offramp.failed",
            PaymentStatus::Completed => "payment.completed",
            PaymentStatus::Failed => "payment.failed",
        }
    }

    /// 判断是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }

    /// 失败子状态（粘性：重试不会重新处理已失败的阶段）
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            PaymentStatus::OnrampFailed | PaymentStatus::OfframpFailed
        )
    }

    /// 验证状态转换是否合法
    ///
    /// # 状态转换规则
    /// ```text
    /// INITIATED         -> CONFIRMED
    /// CONFIRMED         -> ONRAMP_PENDING
    /// ONRAMP_PENDING    -> ONRAMP_COMPLETED | ONRAMP_FAILED
    /// ONRAMP_COMPLETED  -> OFFRAMP_PENDING
    /// OFFRAMP_PENDING   -> OFFRAMP_COMPLETED | OFFRAMP_FAILED
    /// OFFRAMP_COMPLETED -> COMPLETED
    /// ONRAMP_FAILED     -> FAILED
    /// OFFRAMP_FAILED    -> FAILED
    /// ```
    pub fn validate_transition(from: Self, to: Self) -> Result<(), InvalidTransition> {
        let valid = match from {
            PaymentStatus::Initiated => matches!(to, PaymentStatus::Confirmed),
            PaymentStatus::Confirmed => matches!(to, PaymentStatus::OnrampPending),
            PaymentStatus::OnrampPending => matches!(
                to,
                PaymentStatus::OnrampCompleted | PaymentStatus::OnrampFailed
            ),
            PaymentStatus::OnrampCompleted => matches!(to, PaymentStatus::OfframpPending),
            PaymentStatus::OfframpPending => matches!(
                to,
                PaymentStatus::OfframpCompleted | PaymentStatus::OfframpFailed
            ),
            PaymentStatus::OfframpCompleted => matches!(to, PaymentStatus::Completed),
            PaymentStatus::OnrampFailed => matches!(to, PaymentStatus::Failed),
            PaymentStatus::OfframpFailed => matches!(to, PaymentStatus::Failed),
            // QUOTED 不落库；终态不允许再转换
            PaymentStatus::Quoted | PaymentStatus::Completed | PaymentStatus::Failed => false,
        };

        if valid {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            })
        }
    }

    /// 获取状态的下一个可能状态列表
    pub fn next_states(&self) -> Vec<PaymentStatus> {
        match self {
            PaymentStatus::Initiated => vec![PaymentStatus::Confirmed],
            PaymentStatus::Confirmed => vec![PaymentStatus::OnrampPending],
            PaymentStatus::OnrampPending => vec![
                PaymentStatus::OnrampCompleted,
                PaymentStatus::OnrampFailed,
            ],
            PaymentStatus::OnrampCompleted => vec![PaymentStatus::OfframpPending],
            PaymentStatus::OfframpPending => vec![
                PaymentStatus::OfframpCompleted,
                PaymentStatus::OfframpFailed,
            ],
            PaymentStatus::OfframpCompleted => vec![PaymentStatus::Completed],
            PaymentStatus::OnrampFailed | PaymentStatus::OfframpFailed => {
                vec![PaymentStatus::Failed]
            }
            _ => vec![],
        }
    }
}

/// 支付聚合根
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_currency: String,
    pub destination_currency: Corridor,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub fee_handling: FeeHandling,
    pub fees: FeeBreakdown,
    pub usdc_sent: Decimal,
    pub exchange_rate: Decimal,
    pub destination_amount: Decimal,
    pub quote_id: Option<Uuid>,
    pub quote_expires_at: DateTime<Utc>,
    pub status: PaymentStatus,
    pub onramp_tx_id: Option<String>,
    pub offramp_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// 向用户实际收取的总额
    pub fn total_charged(&self) -> Decimal {
        match self.fee_handling {
            FeeHandling::Inclusive => self.amount,
            FeeHandling::Additive => self.amount + self.fees.total,
        }
    }

    /// 报价是否已过期
    pub fn quote_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.quote_expires_at
    }
}
