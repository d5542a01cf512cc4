//! 测试辅助模块
//! 提供测试工具和辅助函数

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use ironramp::{
    config::WebhookConfig,
    infrastructure::{cache::RedisCtx, db::PgPool, job_queue::JobQueue},
    service::{
        payment_service::PaymentService,
        providers::{
            BalanceOracle, ChargeReceipt, ChargeRequest, OfframpProvider, OnrampProvider,
            ProviderError, RateSource, SettleReceipt, SettleRequest,
        },
        rate_service::RateService,
    },
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// 测试数据库URL
pub fn test_database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost:5432/ironramp_test".into())
}

/// 创建测试数据库连接池（并运行迁移）
pub async fn create_test_pool() -> PgPool {
    let url = test_database_url();
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to create test database pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// 无Redis环境：连接在调用时失败，缓存层按未命中处理
pub fn offline_redis() -> Arc<RedisCtx> {
    Arc::new(RedisCtx::new("redis://127.0.0.1:1").expect("Failed to create Redis client"))
}

/// 固定汇率源
pub struct StaticRateSource(pub HashMap<String, Decimal>);

#[async_trait]
impl RateSource for StaticRateSource {
    async fn fetch(&self) -> Result<HashMap<String, Decimal>, ProviderError> {
        Ok(self.0.clone())
    }
}

/// 固定余额oracle
pub struct StaticBalanceOracle(pub Decimal);

#[async_trait]
impl BalanceOracle for StaticBalanceOracle {
    async fn balance(&self, _user_id: Uuid) -> Result<Decimal, ProviderError> {
        Ok(self.0)
    }
}

/// Mock入金服务商
pub struct MockOnramp {
    pub fail: bool,
}

#[async_trait]
impl OnrampProvider for MockOnramp {
    async fn charge(&self, req: ChargeRequest) -> Result<ChargeReceipt, ProviderError> {
        if self.fail {
            return Err(ProviderError::Rejected("card declined".into()));
        }
        Ok(ChargeReceipt {
            tx_id: format!("onramp_{}", Uuid::new_v4().simple()),
            usdc_received: req.amount,
            status: "completed".into(),
            timestamp: Utc::now(),
        })
    }
}

/// Mock出金服务商
pub struct MockOfframp {
    pub fail: bool,
}

#[async_trait]
impl OfframpProvider for MockOfframp {
    async fn settle(&self, req: SettleRequest) -> Result<SettleReceipt, ProviderError> {
        if self.fail {
            return Err(ProviderError::Rejected("corridor suspended".into()));
        }
        Ok(SettleReceipt {
            tx_id: format!("offramp_{}", Uuid::new_v4().simple()),
            local_amount: req.usdc * Decimal::new(17_234_000, 6),
            currency: req.currency.as_str().into(),
            status: "settled".into(),
            timestamp: Utc::now(),
        })
    }
}

pub fn test_webhook_config() -> WebhookConfig {
    WebhookConfig {
        secret: "test_webhook_secret_32_chars_min".into(),
        // 无服务端口：投递以传输错误失败
        sink_url: "http://127.0.0.1:1/webhooks".into(),
        max_attempts: 3,
        api_version: "2025-03-01".into(),
    }
}

/// 构建测试支付服务（MXN固定汇率17.234，余额充足）
pub fn create_payment_service(pool: PgPool) -> Arc<PaymentService> {
    let rates = Arc::new(RateService::new(
        offline_redis(),
        Arc::new(StaticRateSource(HashMap::from([
            ("MXN".to_string(), Decimal::new(17_234_000, 6)),
            ("NGN".to_string(), Decimal::new(745_500_000, 6)),
        ]))),
        30,
    ));

    Arc::new(PaymentService::new(
        pool.clone(),
        rates,
        Arc::new(StaticBalanceOracle(Decimal::new(100_000_00, 2))),
        JobQueue::new(pool),
        test_webhook_config(),
    ))
}
