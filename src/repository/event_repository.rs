//! 事件持久化：仅追加，按 (payment_id, created_at) 读取

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{event::PaymentEvent, payment::PaymentStatus};

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    payment_id: Uuid,
    event_type: String,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> Result<PaymentEvent> {
        Ok(PaymentEvent {
            id: self.id,
            payment_id: self.payment_id,
            event_type: self.event_type,
            status: PaymentStatus::from_str(&self.status)
                .ok_or_else(|| anyhow!("unknown event status: {}", self.status))?,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, payment_id, event_type, status, metadata, created_at";

#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 追加事件（事务内，与状态变更一起提交）
    pub async fn insert(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event: &PaymentEvent,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO payment_events (id, payment_id, event_type, status, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.payment_id)
        .bind(&event.event_type)
        .bind(event.status.as_str())
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// 单个支付的全部事件（旧→新）
    pub async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payment_events
             WHERE payment_id = $1
             ORDER BY created_at ASC"
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// 单个支付在水位线之后的事件（旧→新）
    pub async fn list_for_payment_since(
        &self,
        payment_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Vec<PaymentEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payment_events
             WHERE payment_id = $1 AND created_at > $2
             ORDER BY created_at ASC"
        ))
        .bind(payment_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// 多个支付的全部事件（新→旧，用户流初始快照）
    pub async fn list_recent_for_payments(
        &self,
        payment_ids: &[Uuid],
    ) -> Result<Vec<PaymentEvent>> {
        if payment_ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payment_events
             WHERE payment_id = ANY($1)
             ORDER BY created_at DESC"
        ))
        .bind(payment_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// 多个支付在水位线之后的事件（旧→新，用户流增量）
    pub async fn list_for_payments_since(
        &self,
        payment_ids: &[Uuid],
        after: DateTime<Utc>,
    ) -> Result<Vec<PaymentEvent>> {
        if payment_ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payment_events
             WHERE payment_id = ANY($1) AND created_at > $2
             ORDER BY created_at ASC"
        ))
        .bind(payment_ids)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }
}
