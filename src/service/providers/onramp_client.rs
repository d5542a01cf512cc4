//! 入金服务商HTTP客户端
//!
//! 契约: POST {base}/v1/charges {amount, method, user_id}
//! 成功返回 {tx_id, usdc_received, status, timestamp}，失败返回 {error}

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{ChargeReceipt, ChargeRequest, OnrampProvider, ProviderError};

pub struct HttpOnrampProvider {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
}

impl HttpOnrampProvider {
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
impl OnrampProvider for HttpOnrampProvider {
    async fn charge(&self, req: ChargeRequest) -> Result<ChargeReceipt, ProviderError> {
        let url = format!("{}/v1/charges", self.base_url);

        tracing::debug!(user_id = %req.user_id, amount = %req.amount, "onramp charge request");

        let response = self.client.post(&url).json(&req).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = match response.json::<ProviderErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => format!("onramp returned HTTP {}", status),
            };
            return Err(ProviderError::Rejected(message));
        }

        let receipt: ChargeReceipt = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(receipt)
    }
}
