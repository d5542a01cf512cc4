//! 余额oracle HTTP客户端
//!
//! 记账系统在核心之外；这里只消费一个窄接口：
//! GET {base}/v1/balances/{user_id} → {"user_id": ..., "balance": "123.45"}

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::{BalanceOracle, ProviderError};

pub struct HttpBalanceOracle {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

impl HttpBalanceOracle {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .context("Failed to create HTTP client")?,
        })
    }
}

#[async_trait]
impl BalanceOracle for HttpBalanceOracle {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, ProviderError> {
        let url = format!("{}/v1/balances/{}", self.base_url, user_id);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "balance oracle returned HTTP {}",
                response.status()
            )));
        }

        let body: BalanceResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(body.balance)
    }
}
