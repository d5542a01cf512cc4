//! 汇率缓存服务
//!
//! Redis键 rate:USD:<to>，TTL 30秒；未命中时请求上游汇率源，
//! 上游失败降级到硬编码兜底汇率表并记录警告。
//! 缓存无锁；并发未命中允许各自回源。

use std::{collections::HashMap, sync::Arc, time::Duration};

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    domain::payment::Corridor,
    infrastructure::cache::RedisCtx,
    service::providers::RateSource,
};

/// 兜底汇率表：仅作为上游不可用时的最后保障
static FALLBACK_RATES: Lazy<HashMap<&'static str, Decimal>> = Lazy::new(|| {
    HashMap::from([
        ("MXN", Decimal::new(17_050_000, 6)),    // 17.05
        ("NGN", Decimal::new(1_540_000_000, 6)), // 1540.00
        ("PHP", Decimal::new(58_750_000, 6)),    // 58.75
        ("INR", Decimal::new(84_200_000, 6)),    // 84.20
        ("BRL", Decimal::new(5_850_000, 6)),     // 5.85
    ])
});

#[derive(Debug, Clone, Error)]
pub enum RateError {
    #[error("exchange rate unavailable for USD->{0}")]
    Unavailable(String),
}

pub struct RateService {
    redis: Arc<RedisCtx>,
    source: Arc<dyn RateSource>,
    ttl: Duration,
}

impl RateService {
    pub fn new(redis: Arc<RedisCtx>, source: Arc<dyn RateSource>, ttl_secs: u64) -> Self {
        Self {
            redis,
            source,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// 获取 USD → 目标币种 的汇率
    pub async fn rate(&self, to: Corridor) -> Result<Decimal, RateError> {
        let key = format!("rate:USD:{}", to.as_str());

        // 1. 缓存命中直接返回；缓存故障按未命中处理
        match self.redis.get(&key).await {
            Ok(Some(cached)) => {
                if let Ok(rate) = cached.parse::<Decimal>() {
                    tracing::debug!(key = %key, "rate cache hit");
                    return Ok(rate);
                }
                tracing::warn!(key = %key, value = %cached, "unparseable cached rate, refetching");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "rate cache read failed, falling through");
            }
        }

        // 2. 回源
        match self.source.fetch().await {
            Ok(rates) => {
                if let Some(rate) = rates.get(to.as_str()).copied() {
                    // 写缓存失败不影响主流程
                    if let Err(e) = self.redis.set_ex(&key, &rate.to_string(), self.ttl).await {
                        tracing::warn!(key = %key, error = %e, "rate cache write failed");
                    }
                    return Ok(rate);
                }
                tracing::warn!(
                    corridor = to.as_str(),
                    "upstream rate source missing corridor, using fallback"
                );
            }
            Err(e) => {
                tracing::warn!(
                    corridor = to.as_str(),
                    error = %e,
                    "rate source fetch failed, using fallback table"
                );
            }
        }

        // 3. 兜底表
        FALLBACK_RATES
            .get(to.as_str())
            .copied()
            .ok_or_else(|| RateError::Unavailable(to.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::service::providers::ProviderError;

    struct StaticSource(HashMap<String, Decimal>);

    #[async_trait]
    impl RateSource for StaticSource {
        async fn fetch(&self) -> Result<HashMap<String, Decimal>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RateSource for FailingSource {
        async fn fetch(&self) -> Result<HashMap<String, Decimal>, ProviderError> {
            Err(ProviderError::Rejected("upstream down".into()))
        }
    }

    fn offline_redis() -> Arc<RedisCtx> {
        // 指向无服务的端口：连接在调用时失败，服务按缓存未命中处理
        Arc::new(RedisCtx::new("redis://127.0.0.1:1").unwrap())
    }

    #[test]
    fn test_fallback_covers_all_corridors() {
        for corridor in Corridor::all() {
            assert!(
                FALLBACK_RATES.contains_key(corridor.as_str()),
                "missing fallback for {}",
                corridor.as_str()
            );
        }
    }

    #[tokio::test]
    async fn test_rate_from_upstream_without_cache() {
        let rates = HashMap::from([("MXN".to_string(), Decimal::new(17_234_000, 6))]);
        let service = RateService::new(offline_redis(), Arc::new(StaticSource(rates)), 30);

        let rate = service.rate(Corridor::Mxn).await.unwrap();
        assert_eq!(rate, Decimal::new(17_234_000, 6));
    }

    #[tokio::test]
    async fn test_rate_falls_back_when_upstream_fails() {
        let service = RateService::new(offline_redis(), Arc::new(FailingSource), 30);

        let rate = service.rate(Corridor::Php).await.unwrap();
        assert_eq!(rate, *FALLBACK_RATES.get("PHP").unwrap());
    }

    #[tokio::test]
    async fn test_rate_falls_back_when_corridor_missing_upstream() {
        // 上游只返回MXN，请求BRL时走兜底表
        let rates = HashMap::from([("MXN".to_string(), Decimal::new(17_234_000, 6))]);
        let service = RateService::new(offline_redis(), Arc::new(StaticSource(rates)), 30);

        let rate = service.rate(Corridor::Brl).await.unwrap();
        assert_eq!(rate, *FALLBACK_RATES.get("BRL").unwrap());
    }
}
