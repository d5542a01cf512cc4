//! 汇率源HTTP客户端
//!
//! 契约: GET {url}?base=USD → {"rates": {"MXN": 17.234, ...}}
//! API key 可选，通过 apikey 请求头传递

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{ProviderError, RateSource};

pub struct HttpRateSource {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    rates: HashMap<String, Decimal>,
}

impl HttpRateSource {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            url: url.to_string(),
            api_key,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .context("Failed to create HTTP client")?,
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch(&self) -> Result<HashMap<String, Decimal>, ProviderError> {
        let mut request = self.client.get(&self.url).query(&[("base", "USD")]);

        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "rate source returned HTTP {}",
                response.status()
            )));
        }

        let body: RateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(body.rates)
    }
}
