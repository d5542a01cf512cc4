//! 支付持久化
//!
//! 同一支付的写入通过行锁串行化（SELECT ... FOR UPDATE），
//! 保证状态与事件时间戳单调前进。

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::payment::{
    Corridor, FeeBreakdown, FeeHandling, Payment, PaymentMethod, PaymentStatus,
};

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: Uuid,
    source_currency: String,
    destination_currency: String,
    amount: Decimal,
    payment_method: String,
    fee_handling: String,
    fee_onramp: Decimal,
    fee_corridor: Decimal,
    fee_platform: Decimal,
    fee_network_gas: Decimal,
    fee_total: Decimal,
    usdc_sent: Decimal,
    exchange_rate: Decimal,
    destination_amount: Decimal,
    quote_id: Option<Uuid>,
    quote_expires_at: DateTime<Utc>,
    status: String,
    onramp_tx_id: Option<String>,
    offramp_tx_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

const SELECT_COLUMNS: &str = "id, user_id, source_currency, destination_currency, amount, \
     payment_method, fee_handling, fee_onramp, fee_corridor, fee_platform, fee_network_gas, \
     fee_total, usdc_sent, exchange_rate, destination_amount, quote_id, quote_expires_at, \
     status, onramp_tx_id, offramp_tx_id, created_at, updated_at, completed_at";

impl PaymentRow {
    fn into_payment(self) -> Result<Payment> {
        Ok(Payment {
            id: self.id,
            user_id: self.user_id,
            source_currency: self.source_currency,
            destination_currency: Corridor::from_str(&self.destination_currency)
                .ok_or_else(|| anyhow!("unknown corridor: {}", self.destination_currency))?,
            amount: self.amount,
            payment_method: PaymentMethod::from_str(&self.payment_method)
                .ok_or_else(|| anyhow!("unknown payment method: {}", self.payment_method))?,
            fee_handling: FeeHandling::from_str(&self.fee_handling)
                .ok_or_else(|| anyhow!("unknown fee handling: {}", self.fee_handling))?,
            fees: FeeBreakdown {
                onramp: self.fee_onramp,
                corridor: self.fee_corridor,
                platform: self.fee_platform,
                network_gas: self.fee_network_gas,
                total: self.fee_total,
            },
            usdc_sent: self.usdc_sent,
            exchange_rate: self.exchange_rate,
            destination_amount: self.destination_amount,
            quote_id: self.quote_id,
            quote_expires_at: self.quote_expires_at,
            status: PaymentStatus::from_str(&self.status)
                .ok_or_else(|| anyhow!("unknown payment status: {}", self.status))?,
            onramp_tx_id: self.onramp_tx_id,
            offramp_tx_id: self.offramp_tx_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM payments WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// 用户支付列表（新→旧）
    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    /// 用户的全部支付id（用户事件流每次轮询都会刷新，以捕获新建支付）
    pub async fn payment_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM payments WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    /// 行锁加载：同一支付的状态变更由此串行化
    pub async fn lock(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    /// 插入新支付（事务内，与初始事件/投递任务一起提交）
    pub async fn insert(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment: &Payment,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO payments
             (id, user_id, source_currency, destination_currency, amount, payment_method,
              fee_handling, fee_onramp, fee_corridor, fee_platform, fee_network_gas, fee_total,
              usdc_sent, exchange_rate, destination_amount, quote_id, quote_expires_at, status,
              created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                     $18, $19, $20)",
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(&payment.source_currency)
        .bind(payment.destination_currency.as_str())
        .bind(payment.amount)
        .bind(payment.payment_method.as_str())
        .bind(payment.fee_handling.as_str())
        .bind(payment.fees.onramp)
        .bind(payment.fees.corridor)
        .bind(payment.fees.platform)
        .bind(payment.fees.network_gas)
        .bind(payment.fees.total)
        .bind(payment.usdc_sent)
        .bind(payment.exchange_rate)
        .bind(payment.destination_amount)
        .bind(payment.quote_id)
        .bind(payment.quote_expires_at)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// 写入状态变更（事务内；费用字段创建后不再变更，此处只更新可变列）
    pub async fn apply_status(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment: &Payment,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE payments
             SET status = $2, onramp_tx_id = $3, offramp_tx_id = $4,
                 updated_at = $5, completed_at = $6
             WHERE id = $1",
        )
        .bind(payment.id)
        .bind(payment.status.as_str())
        .bind(&payment.onramp_tx_id)
        .bind(&payment.offramp_tx_id)
        .bind(payment.updated_at)
        .bind(payment.completed_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
