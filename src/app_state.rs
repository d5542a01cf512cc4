use std::sync::Arc;

use crate::{
    config::Config,
    infrastructure::{cache::RedisCtx, db::PgPool, job_queue::JobQueue},
    repository::{EventRepository, PaymentRepository, WebhookRepository},
    service::{
        payment_service::PaymentService,
        providers::{HttpBalanceOracle, HttpRateSource},
        quote_service::QuoteService,
        rate_service::RateService,
    },
};

/// 应用状态
/// 包含所有共享资源
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: Arc<RedisCtx>,
    pub config: Arc<Config>,
    pub queue: JobQueue,
    pub rates: Arc<RateService>,
    pub quotes: Arc<QuoteService>,
    pub payments: Arc<PaymentService>,
    pub payment_repo: PaymentRepository,
    pub event_repo: EventRepository,
    pub webhook_repo: WebhookRepository,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(pool: PgPool, redis: RedisCtx, config: Arc<Config>) -> anyhow::Result<Self> {
        let redis = Arc::new(redis);

        let rate_source = Arc::new(HttpRateSource::new(
            &config.rate_api.url,
            config.rate_api.api_key.clone(),
        )?);
        let rates = Arc::new(RateService::new(
            redis.clone(),
            rate_source,
            config.rate_api.cache_ttl_secs,
        ));

        let quotes = Arc::new(QuoteService::new(rates.clone()));

        let balance_oracle = Arc::new(HttpBalanceOracle::new(
            &config.providers.balance_oracle_url,
            config.providers.timeout_secs,
        )?);

        let queue = JobQueue::new(pool.clone());

        let payments = Arc::new(PaymentService::new(
            pool.clone(),
            rates.clone(),
            balance_oracle,
            queue.clone(),
            config.webhook.clone(),
        ));

        Ok(Self {
            payment_repo: PaymentRepository::new(pool.clone()),
            event_repo: EventRepository::new(pool.clone()),
            webhook_repo: WebhookRepository::new(pool.clone()),
            pool,
            redis,
            config,
            queue,
            rates,
            quotes,
            payments,
        })
    }
}
