//! 外部服务商契约
//!
//! 入金（USD → USDC）、出金（USDC → 本地法币）、汇率源、余额查询
//! 均通过窄接口消费；HTTP实现见各client模块。

pub mod balance_oracle;
pub mod offramp_client;
pub mod onramp_client;
pub mod rate_source;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::payment::{Corridor, PaymentMethod};

pub use balance_oracle::HttpBalanceOracle;
pub use offramp_client::HttpOfframpProvider;
pub use onramp_client::HttpOnrampProvider;
pub use rate_source::HttpRateSource;

/// 服务商错误：worker据此决定失败转移与重试
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 服务商明确拒绝（业务失败，不可重试出同样结果）
    #[error("provider rejected request: {0}")]
    Rejected(String),
    /// 传输层失败（含超时）
    #[error("provider transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// 响应无法解析
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// 入金请求
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub user_id: Uuid,
}

/// 入金回执
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeReceipt {
    pub tx_id: String,
    pub usdc_received: Decimal,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// 出金请求
#[derive(Debug, Clone, Serialize)]
pub struct SettleRequest {
    pub usdc: Decimal,
    pub currency: Corridor,
    pub user_id: Uuid,
}

/// 出金回执
#[derive(Debug, Clone, Deserialize)]
pub struct SettleReceipt {
    pub tx_id: String,
    pub local_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// 入金服务商：USD扣款并换成USDC
#[async_trait]
pub trait OnrampProvider: Send + Sync {
    async fn charge(&self, req: ChargeRequest) -> Result<ChargeReceipt, ProviderError>;
}

/// 出金服务商：USDC结算为目标法币
#[async_trait]
pub trait OfframpProvider: Send + Sync {
    async fn settle(&self, req: SettleRequest) -> Result<SettleReceipt, ProviderError>;
}

/// 汇率源：返回 USD → 各币种 的汇率表
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self) -> Result<HashMap<String, Decimal>, ProviderError>;
}

/// 余额oracle：返回用户的非负USD余额（记账系统在核心之外）
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, ProviderError>;
}
