//! 持久化任务队列
//! 数据库持久化的FIFO队列，支持重试、退避与尝试计数，重启可恢复

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// 任务种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    PaymentProcessing,
    WebhookDelivery,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::PaymentProcessing => "payment-processing",
            JobKind::WebhookDelivery => "webhook-delivery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Exhausted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Exhausted => "exhausted",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "exhausted" => JobStatus::Exhausted,
            _ => JobStatus::Pending,
        }
    }
}

/// 队列任务项
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    max_attempts: i32,
    next_run_at: DateTime<Utc>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self, kind: JobKind) -> Job {
        Job {
            id: self.id,
            kind,
            payload: self.payload,
            status: JobStatus::from_str(&self.status),
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            next_run_at: self.next_run_at,
            last_error: self.last_error,
            created_at: self.created_at,
        }
    }
}

/// 队列管理器
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在调用方事务内入队（事务性发件箱写入）
    ///
    /// 入队只发生在状态变更事务内，没有独立的非事务入口：
    /// 状态、事件、投递任务三者要么一起生效要么一起回滚。
    pub async fn enqueue_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        kind: JobKind,
        payload: serde_json::Value,
        max_attempts: i32,
    ) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO jobs (id, kind, payload, status, attempts, max_attempts, next_run_at)
             VALUES ($1, $2, $3, 'pending', 0, $4, CURRENT_TIMESTAMP)",
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(payload)
        .bind(max_attempts)
        .execute(&mut **tx)
        .await?;

        Ok(id)
    }

    /// 认领到期任务
    ///
    /// FOR UPDATE SKIP LOCKED 保证多消费者下同一任务只被一个worker认领；
    /// 认领即计一次尝试。
    pub async fn claim_due(&self, kind: JobKind, limit: i64) -> Result<Vec<Job>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT id, kind, payload, status, attempts, max_attempts, next_run_at, last_error, created_at
             FROM jobs
             WHERE kind = $1
               AND status = 'pending'
               AND next_run_at <= CURRENT_TIMESTAMP
             ORDER BY created_at ASC
             LIMIT $2
             FOR UPDATE SKIP LOCKED",
        )
        .bind(kind.as_str())
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            sqlx::query(
                "UPDATE jobs
                 SET status = 'running', attempts = attempts + 1, updated_at = CURRENT_TIMESTAMP
                 WHERE id = $1",
            )
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

            let mut job = row.into_job(kind);
            job.status = JobStatus::Running;
            job.attempts += 1;
            jobs.push(job);
        }

        tx.commit().await?;

        Ok(jobs)
    }

    /// 标记为成功
    pub async fn mark_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs
             SET status = 'completed', updated_at = CURRENT_TIMESTAMP
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 标记失败并安排重试（指数退避）
    ///
    /// 超过最大尝试次数则置为 exhausted。
    pub async fn mark_failed(&self, job: &Job, error: &str, backoff_base: Duration) -> Result<()> {
        if job.attempts >= job.max_attempts {
            sqlx::query(
                "UPDATE jobs
                 SET status = 'exhausted', last_error = $2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = $1",
            )
            .bind(job.id)
            .bind(error)
            .execute(&self.pool)
            .await?;

            return Ok(());
        }

        // base, base*2, base*4, ...
        let delay = backoff_base * 2u32.saturating_pow((job.attempts - 1).max(0) as u32);
        let next_run_at = Utc::now() + chrono::Duration::from_std(delay)?;

        sqlx::query(
            "UPDATE jobs
             SET status = 'pending', last_error = $2, next_run_at = $3,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = $1",
        )
        .bind(job.id)
        .bind(error)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 清理旧的成功记录（超过7天）
    pub async fn cleanup_old_jobs(&self) -> Result<i64> {
        let result = sqlx::query(
            "DELETE FROM jobs
             WHERE status = 'completed'
               AND created_at < CURRENT_TIMESTAMP - INTERVAL '7 days'",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_round_trip() {
        assert_eq!(JobKind::PaymentProcessing.as_str(), "payment-processing");
        assert_eq!(JobKind::WebhookDelivery.as_str(), "webhook-delivery");
    }

    #[test]
    fn test_backoff_schedule() {
        // 认领时计数：第1次失败退避base，第2次base*2
        let base = Duration::from_secs(1);
        let first = base * 2u32.pow(0);
        let second = base * 2u32.pow(1);
        assert_eq!(first, Duration::from_secs(1));
        assert_eq!(second, Duration::from_secs(2));
    }
}
