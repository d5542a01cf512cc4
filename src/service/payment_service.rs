//! 支付流程服务
//!
//! initiate / confirm 两个变更入口，以及orchestrator使用的状态推进原语。
//! 每次状态变更在同一数据库事务内完成三件事：更新支付行、追加事件、
//! 入队webhook投递（事务性发件箱），对观察者表现为原子。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::WebhookConfig,
    domain::{
        event::PaymentEvent,
        payment::{Corridor, FeeHandling, Payment, PaymentMethod, PaymentStatus},
        webhook::{DeliveryStatus, WebhookDelivery, WebhookPayload},
    },
    error::AppError,
    infrastructure::job_queue::{JobKind, JobQueue},
    repository::{EventRepository, PaymentRepository},
    security::webhook_signer,
    service::{
        fee_engine,
        providers::BalanceOracle,
        quote_service,
        rate_service::RateService,
    },
};

/// payment-processing 任务的最大尝试次数
const PAYMENT_JOB_MAX_ATTEMPTS: i32 = 3;

/// initiate请求（校验后的领域输入）
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub quote_id: Option<Uuid>,
    pub amount: Decimal,
    pub destination_currency: Corridor,
    pub payment_method: PaymentMethod,
    pub fee_handling: FeeHandling,
}

/// 阶段推进时携带的可变字段
#[derive(Debug, Clone, Default)]
pub struct StageUpdate {
    pub onramp_tx_id: Option<String>,
    pub offramp_tx_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub struct PaymentService {
    pool: PgPool,
    rates: Arc<RateService>,
    balance_oracle: Arc<dyn BalanceOracle>,
    queue: JobQueue,
    webhook: WebhookConfig,
}

impl PaymentService {
    pub fn new(
        pool: PgPool,
        rates: Arc<RateService>,
        balance_oracle: Arc<dyn BalanceOracle>,
        queue: JobQueue,
        webhook: WebhookConfig,
    ) -> Self {
        Self {
            pool,
            rates,
            balance_oracle,
            queue,
            webhook,
        }
    }

    /// 创建支付意图
    ///
    /// 服务端重新计费（quote_id仅作关联）；校验全部通过后才开始写库，
    /// 失败的initiate不会留下任何支付记录。
    pub async fn initiate(
        &self,
        user_id: Uuid,
        req: InitiateRequest,
    ) -> Result<Payment, AppError> {
        let fee_quote = fee_engine::compute(
            req.amount,
            req.payment_method,
            req.destination_currency,
            req.fee_handling,
        )
        .map_err(|e| AppError::invalid_input(e.to_string()))?;

        let rate = self
            .rates
            .rate(req.destination_currency)
            .await
            .map_err(|e| AppError::rate_unavailable(e.to_string()))?;

        let balance = self
            .balance_oracle
            .balance(user_id)
            .await
            .map_err(|e| AppError::provider_failure(format!("balance oracle: {}", e)))?;

        if balance < fee_quote.total_charged {
            return Err(AppError::insufficient_balance(format!(
                "balance {} is below required {}",
                balance, fee_quote.total_charged
            )));
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id,
            source_currency: "USD".to_string(),
            destination_currency: req.destination_currency,
            amount: req.amount,
            payment_method: req.payment_method,
            fee_handling: req.fee_handling,
            fees: fee_quote.breakdown,
            usdc_sent: fee_quote.usdc_sent,
            exchange_rate: rate,
            destination_amount: quote_service::destination_amount(fee_quote.usdc_sent, rate),
            quote_id: req.quote_id,
            quote_expires_at: now + Duration::seconds(quote_service::QUOTE_TTL_SECS),
            status: PaymentStatus::Initiated,
            onramp_tx_id: None,
            offramp_tx_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut tx = self.pool.begin().await?;

        PaymentRepository::insert(&mut tx, &payment).await?;
        self.write_outbox(&mut tx, &payment, serde_json::json!({})).await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            user_id = %user_id,
            amount = %payment.amount,
            currency = payment.destination_currency.as_str(),
            "payment initiated"
        );

        Ok(payment)
    }

    /// 确认支付并入队处理
    ///
    /// 报价过期在此强制执行（不依赖后台定时器）；
    /// 失败的confirm不改变状态、不入队任何任务。
    pub async fn confirm(&self, user_id: Uuid, payment_id: Uuid) -> Result<Payment, AppError> {
        let mut tx = self.pool.begin().await?;

        let payment = PaymentRepository::lock(&mut tx, payment_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::not_found(format!("payment {} not found", payment_id)))?;

        if payment.status != PaymentStatus::Initiated {
            return Err(AppError::invalid_state_transition(format!(
                "cannot confirm payment in status {}",
                payment.status.as_str()
            )));
        }

        let now = Utc::now();
        if payment.quote_expired(now) {
            return Err(AppError::quote_expired(format!(
                "quote expired at {}",
                payment.quote_expires_at
            )));
        }

        let updated = advance(payment, PaymentStatus::Confirmed, StageUpdate::default(), now)?;

        PaymentRepository::apply_status(&mut tx, &updated).await?;
        self.write_outbox(&mut tx, &updated, serde_json::json!({})).await?;

        JobQueue::enqueue_in_tx(
            &mut tx,
            JobKind::PaymentProcessing,
            serde_json::json!({ "payment_id": updated.id }),
            PAYMENT_JOB_MAX_ATTEMPTS,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(payment_id = %updated.id, "payment confirmed, processing enqueued");

        Ok(updated)
    }

    /// 状态推进原语（orchestrator使用）
    ///
    /// 行锁下校验期望状态，非法转换不改变任何状态。
    pub async fn transition(
        &self,
        payment_id: Uuid,
        expected: PaymentStatus,
        to: PaymentStatus,
        update: StageUpdate,
    ) -> Result<Payment, AppError> {
        let mut tx = self.pool.begin().await?;

        let payment = PaymentRepository::lock(&mut tx, payment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("payment {} not found", payment_id)))?;

        if payment.status != expected {
            return Err(AppError::invalid_state_transition(format!(
                "expected status {}, found {}",
                expected.as_str(),
                payment.status.as_str()
            )));
        }

        let metadata = update.metadata.clone().unwrap_or_else(|| serde_json::json!({}));
        let updated = advance(payment, to, update, Utc::now())?;

        PaymentRepository::apply_status(&mut tx, &updated).await?;
        self.write_outbox(&mut tx, &updated, metadata).await?;

        tx.commit().await?;

        tracing::debug!(
            payment_id = %updated.id,
            status = updated.status.as_str(),
            "payment transitioned"
        );

        Ok(updated)
    }

    /// 事务性发件箱写入：事件 + 冻结的webhook载荷 + 投递任务
    async fn write_outbox(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment: &Payment,
        metadata: serde_json::Value,
    ) -> Result<PaymentEvent, AppError> {
        let event =
            PaymentEvent::for_transition(payment.id, payment.status, metadata, payment.updated_at);
        EventRepository::insert(tx, &event).await?;

        let payload = WebhookPayload::freeze(payment, &event, &self.webhook.api_version);
        // 签名覆盖冻结的原始字节；投递时逐字节复用，不重新序列化
        let payload_body = serde_json::to_string(&payload)?;
        let signature = webhook_signer::sign_payload(&payload_body, &self.webhook.secret)?;

        let delivery = WebhookDelivery {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            event_type: event.event_type.clone(),
            payload: payload_body,
            signature,
            status: DeliveryStatus::Pending,
            attempts: 0,
            max_attempts: self.webhook.max_attempts,
            last_attempt_at: None,
            next_retry_at: None,
            response_status: None,
            response_body: None,
            created_at: payment.updated_at,
        };
        crate::repository::WebhookRepository::insert(tx, &delivery).await?;

        JobQueue::enqueue_in_tx(
            tx,
            JobKind::WebhookDelivery,
            serde_json::json!({ "delivery_id": delivery.id, "payment_id": payment.id }),
            self.webhook.max_attempts,
        )
        .await?;

        Ok(event)
    }
}

/// 在内存中推进支付状态
///
/// updated_at 严格单调：系统时钟回拨时也保证每次变更时间戳前进，
/// 事件流以 created_at > 水位线 轮询，相等时间戳会丢事件。
fn advance(
    mut payment: Payment,
    to: PaymentStatus,
    update: StageUpdate,
    now: DateTime<Utc>,
) -> Result<Payment, AppError> {
    PaymentStatus::validate_transition(payment.status, to)
        .map_err(|e| AppError::invalid_state_transition(e.to_string()))?;

    let ts = if now > payment.updated_at {
        now
    } else {
        payment.updated_at + Duration::microseconds(1)
    };

    payment.status = to;
    payment.updated_at = ts;
    if let Some(tx_id) = update.onramp_tx_id {
        payment.onramp_tx_id = Some(tx_id);
    }
    if let Some(tx_id) = update.offramp_tx_id {
        payment.offramp_tx_id = Some(tx_id);
    }
    if to.is_terminal() {
        payment.completed_at = Some(ts);
    }

    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::FeeBreakdown;

    fn sample_payment(status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source_currency: "USD".into(),
            destination_currency: Corridor::Mxn,
            amount: Decimal::new(10000, 2),
            payment_method: PaymentMethod::Ach,
            fee_handling: FeeHandling::Inclusive,
            fees: FeeBreakdown {
                onramp: Decimal::ZERO,
                corridor: Decimal::new(100, 2),
                platform: Decimal::new(349, 2),
                network_gas: Decimal::new(5, 2),
                total: Decimal::new(454, 2),
            },
            usdc_sent: Decimal::new(9546, 2),
            exchange_rate: Decimal::new(17_234_000, 6),
            destination_amount: Decimal::new(164516, 2),
            quote_id: None,
            quote_expires_at: now + Duration::seconds(60),
            status,
            onramp_tx_id: None,
            offramp_tx_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_advance_sets_completed_at_on_terminal() {
        let p = sample_payment(PaymentStatus::OfframpCompleted);
        let updated = advance(
            p,
            PaymentStatus::Completed,
            StageUpdate::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(updated.status, PaymentStatus::Completed);
        assert_eq!(updated.completed_at, Some(updated.updated_at));
    }

    #[test]
    fn test_advance_rejects_illegal_transition() {
        let p = sample_payment(PaymentStatus::Initiated);
        let err = advance(
            p,
            PaymentStatus::Completed,
            StageUpdate::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "invalid_state_transition");
    }

    #[test]
    fn test_advance_timestamp_is_monotonic() {
        let mut p = sample_payment(PaymentStatus::Confirmed);
        // 模拟时钟回拨：updated_at在未来
        let future = Utc::now() + Duration::seconds(30);
        p.updated_at = future;

        let updated = advance(
            p,
            PaymentStatus::OnrampPending,
            StageUpdate::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(updated.updated_at, future + Duration::microseconds(1));
    }

    #[test]
    fn test_advance_records_stage_tx_ids() {
        let p = sample_payment(PaymentStatus::OnrampPending);
        let updated = advance(
            p,
            PaymentStatus::OnrampCompleted,
            StageUpdate {
                onramp_tx_id: Some("onramp_tx_123".into()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(updated.onramp_tx_id.as_deref(), Some("onramp_tx_123"));
        assert!(updated.offramp_tx_id.is_none());
    }
}
