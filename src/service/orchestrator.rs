//! 支付编排worker
//!
//! 消费 payment-processing 队列，驱动状态机走完入金/出金两个阶段。
//! 重入任务从当前状态恢复（provider调用at-least-once，要求服务商幂等）；
//! 失败子状态是粘性的：重试不会重新处理已失败的阶段。

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use tokio::time::interval;
use uuid::Uuid;

use crate::{
    domain::payment::{Payment, PaymentStatus},
    infrastructure::job_queue::{Job, JobKind, JobQueue},
    repository::PaymentRepository,
    service::{
        payment_service::{PaymentService, StageUpdate},
        providers::{ChargeRequest, OfframpProvider, OnrampProvider, SettleRequest},
    },
};

/// 单worker并发支付数
const WORKER_CONCURRENCY: usize = 5;
/// 队列轮询间隔
const POLL_INTERVAL_MS: u64 = 500;
/// 重试退避基数
const BACKOFF_BASE: Duration = Duration::from_secs(1);

pub struct PaymentOrchestrator {
    payments: Arc<PaymentService>,
    repo: PaymentRepository,
    queue: JobQueue,
    onramp: Arc<dyn OnrampProvider>,
    offramp: Arc<dyn OfframpProvider>,
}

impl PaymentOrchestrator {
    pub fn new(
        payments: Arc<PaymentService>,
        repo: PaymentRepository,
        queue: JobQueue,
        onramp: Arc<dyn OnrampProvider>,
        offramp: Arc<dyn OfframpProvider>,
    ) -> Self {
        Self {
            payments,
            repo,
            queue,
            onramp,
            offramp,
        }
    }

    /// 启动后台worker（持续运行）
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));

        tracing::info!(
            concurrency = WORKER_CONCURRENCY,
            "Payment orchestrator started"
        );

        loop {
            ticker.tick().await;

            match self.process_pending().await {
                Ok(processed) => {
                    if processed > 0 {
                        tracing::debug!(count = processed, "Processed payment jobs");
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to process payment jobs");
                }
            }
        }
    }

    /// 认领并处理一批到期任务（批内并发，上限为worker并发数）
    pub async fn process_pending(&self) -> Result<usize> {
        let jobs = self
            .queue
            .claim_due(JobKind::PaymentProcessing, WORKER_CONCURRENCY as i64)
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
                    "Payment job failed"
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
        let payment_id: Uuid = job
            .payload
            .get("payment_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("job payload missing payment_id"))?;

        let Some(payment) = self.repo.find_by_id(payment_id).await? else {
            // 支付已不存在（理论上不会发生：支付不删除）；任务无事可做
            tracing::error!(payment_id = %payment_id, "Payment not found for job, skipping");
            return Ok(());
        };

        self.drive(payment).await
    }

    /// 从当前状态推进到终态
    async fn drive(&self, mut payment: Payment) -> Result<()> {
        loop {
            payment = match payment.status {
                // 全新任务：进入入金阶段
                PaymentStatus::Confirmed => {
                    self.payments
                        .transition(
                            payment.id,
                            PaymentStatus::Confirmed,
                            PaymentStatus::OnrampPending,
                            StageUpdate::default(),
                        )
                        .await?
                }
                PaymentStatus::OnrampPending => self.execute_onramp(payment).await?,
                PaymentStatus::OnrampCompleted => {
                    self.payments
                        .transition(
                            payment.id,
                            PaymentStatus::OnrampCompleted,
                            PaymentStatus::OfframpPending,
                            StageUpdate::default(),
                        )
                        .await?
                }
                PaymentStatus::OfframpPending => self.execute_offramp(payment).await?,
                PaymentStatus::OfframpCompleted => {
                    self.payments
                        .transition(
                            payment.id,
                            PaymentStatus::OfframpCompleted,
                            PaymentStatus::Completed,
                            StageUpdate::default(),
                        )
                        .await?
                }
                // 崩溃恢复：失败子状态落库后进程死亡，这里补写终态
                PaymentStatus::OnrampFailed | PaymentStatus::OfframpFailed => {
                    let from = payment.status;
                    self.payments
                        .transition(payment.id, from, PaymentStatus::Failed, StageUpdate::default())
                        .await?
                }
                // 终态或未确认：重入任务按成功跳过
                PaymentStatus::Completed | PaymentStatus::Failed => {
                    tracing::debug!(
                        payment_id = %payment.id,
                        status = payment.status.as_str(),
                        "Payment already terminal, skipping"
                    );
                    return Ok(());
                }
                PaymentStatus::Quoted | PaymentStatus::Initiated => {
                    tracing::warn!(
                        payment_id = %payment.id,
                        status = payment.status.as_str(),
                        "Payment not confirmed yet, skipping job"
                    );
                    return Ok(());
                }
            };

            if payment.status == PaymentStatus::Completed {
                tracing::info!(payment_id = %payment.id, "Payment completed");
                return Ok(());
            }
        }
    }

    /// 入金阶段：USD扣款换USDC
    async fn execute_onramp(&self, payment: Payment) -> Result<Payment> {
        let request = ChargeRequest {
            amount: payment.amount,
            method: payment.payment_method,
            user_id: payment.user_id,
        };

        match self.onramp.charge(request).await {
            Ok(receipt) => {
                let updated = self
                    .payments
                    .transition(
                        payment.id,
                        PaymentStatus::OnrampPending,
                        PaymentStatus::OnrampCompleted,
                        StageUpdate {
                            onramp_tx_id: Some(receipt.tx_id.clone()),
                            metadata: Some(serde_json::json!({
                                "onramp_tx_id": receipt.tx_id,
                                "usdc_received": receipt.usdc_received,
                            })),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(updated)
            }
            Err(e) => {
                self.fail_stage(payment.id, PaymentStatus::OnrampPending, &e.to_string())
                    .await?;
                Err(anyhow!(e).context("onramp charge failed"))
            }
        }
    }

    /// 出金阶段：USDC结算为目标法币
    async fn execute_offramp(&self, payment: Payment) -> Result<Payment> {
        let request = SettleRequest {
            usdc: payment.usdc_sent,
            currency: payment.destination_currency,
            user_id: payment.user_id,
        };

        match self.offramp.settle(request).await {
            Ok(receipt) => {
                let updated = self
                    .payments
                    .transition(
                        payment.id,
                        PaymentStatus::OfframpPending,
                        PaymentStatus::OfframpCompleted,
                        StageUpdate {
                            offramp_tx_id: Some(receipt.tx_id.clone()),
                            metadata: Some(serde_json::json!({
                                "offramp_tx_id": receipt.tx_id,
                                "local_amount": receipt.local_amount,
                                "currency": receipt.currency,
                            })),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(updated)
            }
            Err(e) => {
                self.fail_stage(payment.id, PaymentStatus::OfframpPending, &e.to_string())
                    .await?;
                Err(anyhow!(e).context("offramp settle failed"))
            }
        }
    }

    /// 失败收敛：pending子状态 → 对应失败子状态 → FAILED
    async fn fail_stage(
        &self,
        payment_id: Uuid,
        pending: PaymentStatus,
        error_msg: &str,
    ) -> Result<()> {
        let failed = match pending {
            PaymentStatus::OnrampPending => PaymentStatus::OnrampFailed,
            PaymentStatus::OfframpPending => PaymentStatus::OfframpFailed,
            other => return Err(anyhow!("no failure state for {}", other.as_str())),
        };

        let metadata = serde_json::json!({ "error": error_msg });

        self.payments
            .transition(
                payment_id,
                pending,
                failed,
                StageUpdate {
                    metadata: Some(metadata.clone()),
                    ..Default::default()
                },
            )
            .await
            .context("failed to record stage failure")?;

        self.payments
            .transition(
                payment_id,
                failed,
                PaymentStatus::Failed,
                StageUpdate {
                    metadata: Some(metadata),
                    ..Default::default()
                },
            )
            .await
            .context("failed to record terminal failure")?;

        Ok(())
    }
}
