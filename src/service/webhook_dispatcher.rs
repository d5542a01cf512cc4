//! Webhook投递worker
//!
//! 消费 webhook-delivery 队列，投递在变更时冻结的载荷。
//! 至少一次投递；同一支付的投递在重试下可能乱序，
//! 消费方以载荷中的事件id去重。

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use tokio::time::interval;
use uuid::Uuid;

use crate::{
    domain::webhook::DeliveryStatus,
    infrastructure::job_queue::{Job, JobKind, JobQueue},
    repository::WebhookRepository,
    security::webhook_signer,
};

/// 单worker并发投递数
const WORKER_CONCURRENCY: usize = 10;
/// 队列轮询间隔
const POLL_INTERVAL_MS: u64 = 500;
/// 重试退避基数
const BACKOFF_BASE: Duration = Duration::from_secs(2);
/// 响应体入库截断长度
const RESPONSE_BODY_LIMIT: usize = 2048;

pub struct WebhookDispatcher {
    deliveries: WebhookRepository,
    queue: JobQueue,
    client: reqwest::Client,
    sink_url: String,
}

impl WebhookDispatcher {
    pub fn new(
        deliveries: WebhookRepository,
        queue: JobQueue,
        sink_url: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            deliveries,
            queue,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?,
            sink_url,
        })
    }

    /// 启动后台worker（持续运行）
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));

        tracing::info!(
            concurrency = WORKER_CONCURRENCY,
            sink = %self.sink_url,
            "Webhook dispatcher started"
        );

        loop {
            ticker.tick().await;

            match self.process_pending().await {
                Ok(processed) => {
                    if processed > 0 {
                        tracing::debug!(count = processed, "Processed webhook jobs");
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to process webhook jobs");
                }
            }
        }
    }

    /// 认领并处理一批到期投递（批内并发，上限为worker并发数）
    pub async fn process_pending(&self) -> Result<usize> {
        let jobs = self
            .queue
            .claim_due(JobKind::WebhookDelivery, WORKER_CONCURRENCY as i64)
            .await?;

        let count = jobs.len();
        futures::future::join_all(jobs.into_iter().map(|job| self.handle_job(job))).await;

        Ok(count)
    }

    async fn handle_job(&self, job: Job) {
        let job_id = job.id;
        match self.process_job(&job).await {
            Ok(()) => {
                if let Err(e) = self.queue.mark_completed(job_id).await {
                    tracing::error!(job_id = %job_id, error = ?e, "Failed to mark job completed");
                }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    attempt = job.attempts,
                    error = ?e,
                    "Webhook delivery attempt failed"
                );
                if let Err(e) = self
                    .queue
                    .mark_failed(&job, &format!("{:#}", e), BACKOFF_BASE)
                    .await
                {
                    tracing::error!(job_id = %job_id, error = ?e, "Failed to record job failure");
                }
            }
        }
    }

    async fn process_job(&self, job: &Job) -> Result<()> {
        let delivery_id: Uuid = job
            .payload
            .get("delivery_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("job payload missing delivery_id"))?;

        let Some(delivery) = self.deliveries.find_by_id(delivery_id).await? else {
            tracing::error!(delivery_id = %delivery_id, "Webhook delivery record missing, skipping");
            return Ok(());
        };

        // 重入任务：已投递/已耗尽按成功跳过
        if matches!(
            delivery.status,
            DeliveryStatus::Delivered | DeliveryStatus::Exhausted
        ) {
            return Ok(());
        }

        if delivery.status == DeliveryStatus::Failed {
            self.deliveries.mark_retrying(delivery.id).await?;
        }

        // 载荷与签名在入队时冻结，重试字节级一致
        let body = delivery.payload.clone();

        let result = self
            .client
            .post(&self.sink_url)
            .header("Content-Type", "application/json")
            .header(webhook_signer::SIGNATURE_HEADER, &delivery.signature)
            .header("X-Ironramp-Event", &delivery.event_type)
            .body(body)
            .send()
            .await;

        let exhausted = job.attempts >= job.max_attempts;
        let next_retry_at = if exhausted {
            None
        } else {
            let delay = BACKOFF_BASE * 2u32.saturating_pow((job.attempts - 1).max(0) as u32);
            Some(Utc::now() + chrono::Duration::from_std(delay)?)
        };

        match result {
            Ok(response) => {
                let status = response.status();
                let response_body = response.text().await.unwrap_or_default();
                let truncated: String = response_body.chars().take(RESPONSE_BODY_LIMIT).collect();

                if status.is_success() {
                    self.deliveries
                        .mark_delivered(
                            delivery.id,
                            job.attempts,
                            status.as_u16() as i32,
                            Some(&truncated),
                        )
                        .await?;

                    tracing::info!(
                        delivery_id = %delivery.id,
                        event_type = %delivery.event_type,
                        status = status.as_u16(),
                        "Webhook delivered"
                    );
                    Ok(())
                } else {
                    self.deliveries
                        .mark_failed(
                            delivery.id,
                            job.attempts,
                            exhausted,
                            Some(status.as_u16() as i32),
                            Some(&truncated),
                            next_retry_at,
                        )
                        .await?;

                    bail!("webhook sink returned HTTP {}", status);
                }
            }
            Err(e) => {
                self.deliveries
                    .mark_failed(
                        delivery.id,
                        job.attempts,
                        exhausted,
                        None,
                        Some(&e.to_string()),
                        next_retry_at,
                    )
                    .await?;

                bail!("webhook transport error: {}", e);
            }
        }
    }
}
