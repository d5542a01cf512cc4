//! 支付全流程集成测试
//!
//! 覆盖：initiate → confirm → 编排worker驱动状态机到终态，
//! 事件序列、费用恒等式、webhook投递记录、报价过期。
//!
//! 运行方式（需要Postgres）：
//! ```bash
//! TEST_DATABASE_URL=postgres://... cargo test --test payment_flow_test -- --ignored
//! ```

mod common;

use std::sync::Arc;

use ironramp::{
    domain::payment::{Corridor, FeeHandling, PaymentMethod, PaymentStatus},
    infrastructure::job_queue::JobQueue,
    repository::{EventRepository, PaymentRepository},
    service::{
        orchestrator::PaymentOrchestrator,
        payment_service::InitiateRequest,
    },
};
use rust_decimal::Decimal;
use uuid::Uuid;

use common::{create_payment_service, create_test_pool, MockOfframp, MockOnramp};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn initiate_request() -> InitiateRequest {
    InitiateRequest {
        quote_id: Some(Uuid::new_v4()),
        amount: dec("100.00"),
        destination_currency: Corridor::Mxn,
        payment_method: PaymentMethod::Ach,
        fee_handling: FeeHandling::Inclusive,
    }
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_happy_path_event_sequence() {
    let pool = create_test_pool().await;
    let payments = create_payment_service(pool.clone());
    let user_id = Uuid::new_v4();

    // initiate
    let payment = payments.initiate(user_id, initiate_request()).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Initiated);
    assert_eq!(payment.fees.total, dec("4.54"));
    assert_eq!(payment.usdc_sent, dec("95.46"));

    // confirm
    let payment = payments.confirm(user_id, payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Confirmed);

    // worker驱动到终态
    let orchestrator = PaymentOrchestrator::new(
        payments.clone(),
        PaymentRepository::new(pool.clone()),
        JobQueue::new(pool.clone()),
        Arc::new(MockOnramp { fail: false }),
        Arc::new(MockOfframp { fail: false }),
    );
    let processed = orchestrator.process_pending().await.unwrap();
    assert_eq!(processed, 1);

    let repo = PaymentRepository::new(pool.clone());
    let final_payment = repo.find_by_id(payment.id).await.unwrap().unwrap();
    assert_eq!(final_payment.status, PaymentStatus::Completed);
    assert!(final_payment.completed_at.is_some());
    assert!(final_payment.onramp_tx_id.is_some());
    assert!(final_payment.offramp_tx_id.is_some());

    // 费用恒等式（inclusive）
    assert_eq!(
        final_payment.usdc_sent + final_payment.fees.total,
        final_payment.amount
    );

    // 事件序列是状态机的合法路径且以终态结束
    let events = EventRepository::new(pool.clone())
        .list_for_payment(payment.id)
        .await
        .unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "payment.initiated",
            "payment.confirmed",
            "onramp.pending",
            "onramp.completed",
            "offramp.pending",
            "offramp.completed",
            "payment.completed",
        ]
    );

    // 事件时间戳严格单调
    for pair in events.windows(2) {
        assert!(pair[0].created_at < pair[1].created_at);
    }

    // 每个事件恰好一条webhook投递记录
    let delivery_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM webhook_deliveries WHERE payment_id = $1")
            .bind(payment.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(delivery_count, events.len() as i64);
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_onramp_failure_path() {
    let pool = create_test_pool().await;
    let payments = create_payment_service(pool.clone());
    let user_id = Uuid::new_v4();

    let payment = payments.initiate(user_id, initiate_request()).await.unwrap();
    payments.confirm(user_id, payment.id).await.unwrap();

    let orchestrator = PaymentOrchestrator::new(
        payments.clone(),
        PaymentRepository::new(pool.clone()),
        JobQueue::new(pool.clone()),
        Arc::new(MockOnramp { fail: true }),
        Arc::new(MockOfframp { fail: false }),
    );
    orchestrator.process_pending().await.unwrap();

    let repo = PaymentRepository::new(pool.clone());
    let failed = repo.find_by_id(payment.id).await.unwrap().unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(failed.completed_at.is_some());
    assert!(failed.onramp_tx_id.is_none());

    let events = EventRepository::new(pool.clone())
        .list_for_payment(payment.id)
        .await
        .unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "payment.initiated",
            "payment.confirmed",
            "onramp.pending",
            "onramp.failed",
            "payment.failed",
        ]
    );

    // 失败是粘性的：重试任务按成功跳过，不产生新事件
    // （把退避中的任务拨回到期，模拟重试时刻到来）
    sqlx::query(
        "UPDATE jobs SET status = 'pending', next_run_at = CURRENT_TIMESTAMP
         WHERE kind = 'payment-processing' AND payload->>'payment_id' = $1",
    )
    .bind(payment.id.to_string())
    .execute(&pool)
    .await
    .unwrap();
    orchestrator.process_pending().await.unwrap();
    let events_after = EventRepository::new(pool.clone())
        .list_for_payment(payment.id)
        .await
        .unwrap();
    assert_eq!(events_after.len(), events.len());
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_confirm_rejects_expired_quote() {
    let pool = create_test_pool().await;
    let payments = create_payment_service(pool.clone());
    let user_id = Uuid::new_v4();

    let payment = payments.initiate(user_id, initiate_request()).await.unwrap();

    // 将报价过期时间拨到过去
    sqlx::query(
        "UPDATE payments SET quote_expires_at = CURRENT_TIMESTAMP - INTERVAL '1 second'
         WHERE id = $1",
    )
    .bind(payment.id)
    .execute(&pool)
    .await
    .unwrap();

    let err = payments.confirm(user_id, payment.id).await.unwrap_err();
    assert_eq!(err.code_str(), "quote_expired");

    // 状态不变，未入队任何处理任务
    let repo = PaymentRepository::new(pool.clone());
    let unchanged = repo.find_by_id(payment.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Initiated);

    let job_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM jobs WHERE kind = 'payment-processing'
         AND payload->>'payment_id' = $1",
    )
    .bind(payment.id.to_string())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(job_count, 0);
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_confirm_twice_is_invalid_transition() {
    let pool = create_test_pool().await;
    let payments = create_payment_service(pool.clone());
    let user_id = Uuid::new_v4();

    let payment = payments.initiate(user_id, initiate_request()).await.unwrap();
    payments.confirm(user_id, payment.id).await.unwrap();

    // 幂等层之外的二次confirm是非法状态转换
    let err = payments.confirm(user_id, payment.id).await.unwrap_err();
    assert_eq!(err.code_str(), "invalid_state_transition");
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_confirm_foreign_payment_not_found() {
    let pool = create_test_pool().await;
    let payments = create_payment_service(pool.clone());

    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let payment = payments.initiate(owner, initiate_request()).await.unwrap();

    let err = payments.confirm(stranger, payment.id).await.unwrap_err();
    assert_eq!(err.code_str(), "not_found");
}
