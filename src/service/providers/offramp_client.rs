//! 出金服务商HTTP客户端
//!
//! 契约: POST {base}/v1/settlements {usdc, currency, user_id}
//! 成功返回 {tx_id, local_amount, currency, status, timestamp}

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{OfframpProvider, ProviderError, SettleReceipt, SettleRequest};

pub struct HttpOfframpProvider {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
}

impl HttpOfframpProvider {
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
impl OfframpProvider for HttpOfframpProvider {
    async fn settle(&self, req: SettleRequest) -> Result<SettleReceipt, ProviderError> {
        let url = format!("{}/v1/settlements", self.base_url);

        tracing::debug!(
            user_id = %req.user_id,
            usdc = %req.usdc,
            currency = req.currency.as_str(),
            "offramp settle request"
        );

        let response = self.client.post(&url).json(&req).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = match response.json::<ProviderErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => format!("offramp returned HTTP {}", status),
            };
            return Err(ProviderError::Rejected(message));
        }

        let receipt: SettleReceipt = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(receipt)
    }
}
