//! IronRamp 主入口
//! 跨境支付编排服务后端

use std::sync::Arc;

use anyhow::Result;
use ironramp::{
    api,
    app_state::AppState,
    config::Config,
    infrastructure::{cache::RedisCtx, db, job_queue::JobQueue, logging},
    repository::{PaymentRepository, WebhookRepository},
    service::{
        orchestrator::PaymentOrchestrator,
        providers::{HttpOfframpProvider, HttpOnrampProvider},
        webhook_dispatcher::WebhookDispatcher,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // ✅ 1. 加载环境变量
    dotenvy::dotenv().ok();

    // ✅ 2. 加载配置（CONFIG_PATH存在时文件覆盖环境变量）
    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => Config::from_env_and_file(Some(path.as_str()))?,
        Err(_) => Config::from_env()?,
    };
    config.validate()?;
    let config = Arc::new(config);

    // ✅ 3. 初始化日志（结构化日志）
    logging::init_logging(&config.logging)
        .unwrap_or_else(|e| eprintln!("Failed to initialize logging: {}", e));

    tracing::info!("🚀 Starting IronRamp payment orchestrator");

    if config.webhook.secret.starts_with("default-webhook-secret") {
        tracing::warn!("⚠️ WEBHOOK_SECRET not set, using insecure default");
    }

    // ✅ 4. 连接数据库
    let pool = db::init_pool(&config.database).await?;
    tracing::info!("✅ Database connected");

    // ✅ 5. 运行数据库迁移（生产环境可单独执行，SKIP_MIGRATIONS=1 跳过）
    if std::env::var("SKIP_MIGRATIONS").is_err() {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("✅ Database migrations completed");
    } else {
        tracing::info!("⏭️ Database migrations skipped (SKIP_MIGRATIONS=1)");
    }

    // ✅ 6. 初始化Redis（汇率缓存 + 幂等记录）
    let redis = RedisCtx::new(&config.redis.url)?;
    match redis.ping().await {
        Ok(_) => tracing::info!("✅ Redis connected"),
        Err(e) => tracing::warn!("⚠️ Redis unreachable at startup (continuing): {}", e),
    }

    // ✅ 7. 初始化应用状态
    let state = Arc::new(AppState::new(pool.clone(), redis, config.clone())?);

    // ✅ 8. 启动后台worker

    // 8.1 支付编排worker
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        state.payments.clone(),
        PaymentRepository::new(pool.clone()),
        JobQueue::new(pool.clone()),
        Arc::new(HttpOnrampProvider::new(
            &config.providers.onramp_url,
            config.providers.timeout_secs,
        )?),
        Arc::new(HttpOfframpProvider::new(
            &config.providers.offramp_url,
            config.providers.timeout_secs,
        )?),
    ));
    tokio::spawn(orchestrator.run());
    tracing::info!("✅ Payment orchestrator started");

    // 8.2 Webhook投递worker（功能开关控制）
    if config.features.enable_webhook_delivery {
        let dispatcher = Arc::new(WebhookDispatcher::new(
            WebhookRepository::new(pool.clone()),
            JobQueue::new(pool.clone()),
            config.webhook.sink_url.clone(),
            config.providers.timeout_secs,
        )?);
        tokio::spawn(dispatcher.run());
        tracing::info!("✅ Webhook dispatcher started");
    } else {
        tracing::info!("⏭️ Webhook delivery disabled (WEBHOOK_DELIVERY_ENABLED=0)");
    }

    // 8.3 队列清理任务：每小时删除7天前的已完成任务
    let cleanup_queue = JobQueue::new(pool.clone());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            match cleanup_queue.cleanup_old_jobs().await {
                Ok(deleted) => {
                    if deleted > 0 {
                        tracing::info!(count = deleted, "Cleaned up old completed jobs");
                    }
                }
                Err(e) => {
                    tracing::warn!("Job queue cleanup failed: {}", e);
                }
            }
        }
    });
    tracing::info!("✅ Job queue cleanup task started");

    // ✅ 9. 构建API路由并启动服务器
    let app = api::routes(state);

    let bind_addr = config.server.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("🎉 Server listening on http://{}", bind_addr);
    tracing::info!("📖 Swagger UI: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
