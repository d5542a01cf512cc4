//! Webhook投递记录持久化
//!
//! 每个投递组（一次状态变更对应的全部投递尝试）只有一条记录；
//! 尝试结果原地更新。

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::webhook::{DeliveryStatus, WebhookDelivery};

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: Uuid,
    payment_id: Uuid,
    event_type: String,
    payload: String,
    signature: String,
    status: String,
    attempts: i32,
    max_attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    response_status: Option<i32>,
    response_body: Option<String>,
    created_at: DateTime<Utc>,
}

impl DeliveryRow {
    fn into_delivery(self) -> WebhookDelivery {
        WebhookDelivery {
            id: self.id,
            payment_id: self.payment_id,
            event_type: self.event_type,
            payload: self.payload,
            signature: self.signature,
            status: DeliveryStatus::from_str(&self.status),
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            last_attempt_at: self.last_attempt_at,
            next_retry_at: self.next_retry_at,
            response_status: self.response_status,
            response_body: self.response_body,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone)]
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 冻结载荷并落库（事务内，与状态变更一起提交）
    pub async fn insert(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        delivery: &WebhookDelivery,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO webhook_deliveries
             (id, payment_id, event_type, payload, signature, status, attempts, max_attempts,
              created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(delivery.id)
        .bind(delivery.payment_id)
        .bind(&delivery.event_type)
        .bind(&delivery.payload)
        .bind(&delivery.signature)
        .bind(delivery.status.as_str())
        .bind(delivery.attempts)
        .bind(delivery.max_attempts)
        .bind(delivery.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookDelivery>> {
        let row = sqlx::query_as::<_, DeliveryRow>(
            "SELECT id, payment_id, event_type, payload, signature, status, attempts,
                    max_attempts, last_attempt_at, next_retry_at, response_status, response_body,
                    created_at
             FROM webhook_deliveries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeliveryRow::into_delivery))
    }

    /// 记录一次成功投递
    pub async fn mark_delivered(
        &self,
        id: Uuid,
        attempts: i32,
        response_status: i32,
        response_body: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_deliveries
             SET status = 'delivered', attempts = $2, last_attempt_at = CURRENT_TIMESTAMP,
                 next_retry_at = NULL, response_status = $3, response_body = $4,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = $1",
        )
        .bind(id)
        .bind(attempts)
        .bind(response_status)
        .bind(response_body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 记录一次失败尝试；耗尽后置为 exhausted
    pub async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        exhausted: bool,
        response_status: Option<i32>,
        response_body: Option<&str>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let status = if exhausted {
            DeliveryStatus::Exhausted
        } else {
            DeliveryStatus::Failed
        };

        sqlx::query(
            "UPDATE webhook_deliveries
             SET status = $2, attempts = $3, last_attempt_at = CURRENT_TIMESTAMP,
                 next_retry_at = $4, response_status = $5, response_body = $6,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(attempts)
        .bind(next_retry_at)
        .bind(response_status)
        .bind(response_body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 重试开始时回到 pending（failed → (retry) → pending）
    pub async fn mark_retrying(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_deliveries
             SET status = 'pending', updated_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND status = 'failed'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
