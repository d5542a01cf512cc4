//! 事件流API（SSE）
//!
//! GET /api/v1/events/:payment_id — 单支付流：先推历史（旧→新），
//! 之后以500ms轮询水位线推增量；支付到达终态时发送 payment.complete 帧并关闭。
//! GET /api/v1/events/user/:user_id — 用户流：初始快照新→旧并附payment块，
//! 增量按时间顺序推送；服务端不主动关闭。
//!
//! 客户端断开后发送端失败，生产任务在一个tick内退出。
//! 客户端跨重连以事件id去重。

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    response::sse::{Event as SseFrame, KeepAlive, Sse},
};
use chrono::{DateTime, TimeZone, Utc};
use futures::{channel::mpsc, SinkExt, Stream, StreamExt};
use tokio::time::interval;
use uuid::Uuid;

use crate::{app_state::AppState, domain::event::PaymentEvent, error::AppError};

/// 事件日志轮询间隔
const POLL_INTERVAL_MS: u64 = 500;
/// 每连接发送队列上限：慢消费者阻塞生产任务
const CHANNEL_CAPACITY: usize = 64;

type FrameStream = Box<dyn Stream<Item = Result<SseFrame, Infallible>> + Send + Unpin>;

#[utoipa::path(
    get,
    path = "/api/v1/events/{payment_id}",
    params(("payment_id" = Uuid, Path, description = "支付id")),
    responses(
        (status = 200, description = "SSE流，帧类型 payment.event / payment.complete"),
        (status = 404, description = "支付不存在"),
    ),
    tag = "events"
)]
pub async fn payment_event_stream(
    State(state): State<Arc<AppState>>,
    Path(payment_id): Path<Uuid>,
) -> Result<Sse<FrameStream>, AppError> {
    if !state.payment_repo.exists(payment_id).await? {
        return Err(AppError::not_found(format!(
            "payment {} not found",
            payment_id
        )));
    }

    let (tx, rx) = mpsc::channel::<SseFrame>(CHANNEL_CAPACITY);

    tokio::spawn(run_payment_stream(state, payment_id, tx));

    Ok(Sse::new(Box::new(rx.map(Ok::<SseFrame, Infallible>)) as FrameStream).keep_alive(KeepAlive::default()))
}

#[utoipa::path(
    get,
    path = "/api/v1/events/user/{user_id}",
    params(("user_id" = Uuid, Path, description = "用户id")),
    responses((status = 200, description = "SSE流，帧类型 user.event；服务端不主动关闭")),
    tag = "events"
)]
pub async fn user_event_stream(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Sse<FrameStream>, AppError> {
    let (tx, rx) = mpsc::channel::<SseFrame>(CHANNEL_CAPACITY);

    tokio::spawn(run_user_stream(state, user_id, tx));

    Ok(Sse::new(Box::new(rx.map(Ok::<SseFrame, Infallible>)) as FrameStream).keep_alive(KeepAlive::default()))
}

/// 单支付流生产任务
async fn run_payment_stream(
    state: Arc<AppState>,
    payment_id: Uuid,
    mut tx: mpsc::Sender<SseFrame>,
) {
    let mut hwm: Option<DateTime<Utc>> = None;
    let mut ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));

    loop {
        // 客户端断开后在一个tick内停止轮询
        if tx.is_closed() {
            return;
        }

        // 先读状态再取事件：终态对应的事件一定在本轮可见
        let terminal = match state.payment_repo.find_by_id(payment_id).await {
            Ok(Some(p)) => p.status.is_terminal(),
            Ok(None) => {
                tracing::warn!(payment_id = %payment_id, "Payment vanished mid-stream");
                return;
            }
            Err(e) => {
                tracing::error!(payment_id = %payment_id, error = ?e, "Stream status check failed");
                false
            }
        };

        let batch = match hwm {
            None => state.event_repo.list_for_payment(payment_id).await,
            Some(since) => {
                state
                    .event_repo
                    .list_for_payment_since(payment_id, since)
                    .await
            }
        };

        match batch {
            Ok(events) => {
                for event in events {
                    let created_at = event.created_at;
                    let frame = match SseFrame::default().event("payment.event").json_data(&event)
                    {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!(error = ?e, "Failed to encode event frame");
                            continue;
                        }
                    };

                    if tx.send(frame).await.is_err() {
                        // 客户端断开
                        return;
                    }
                    hwm = Some(created_at);
                }
            }
            Err(e) => {
                tracing::error!(payment_id = %payment_id, error = ?e, "Stream poll failed");
            }
        }

        if terminal {
            let frame = SseFrame::default()
                .event("payment.complete")
                .data(payment_id.to_string());
            let _ = tx.send(frame).await;
            return;
        }

        ticker.tick().await;
    }
}

/// 用户流生产任务
async fn run_user_stream(state: Arc<AppState>, user_id: Uuid, mut tx: mpsc::Sender<SseFrame>) {
    let mut ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));

    // 初始快照：所有支付的事件，新→旧
    let mut hwm = Utc.timestamp_opt(0, 0).unwrap();

    match state.payment_repo.payment_ids_for_user(user_id).await {
        Ok(ids) => match state.event_repo.list_recent_for_payments(&ids).await {
            Ok(events) => {
                if let Some(newest) = events.first() {
                    hwm = newest.created_at;
                }
                for event in &events {
                    match enrich_frame(&state, event).await {
                        Some(frame) => {
                            if tx.send(frame).await.is_err() {
                                return;
                            }
                        }
                        None => continue,
                    }
                }
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = ?e, "User stream snapshot failed")
            }
        },
        Err(e) => tracing::error!(user_id = %user_id, error = ?e, "User stream id lookup failed"),
    }

    // 增量：每轮刷新支付id集合，新建支付自动纳入
    loop {
        ticker.tick().await;

        // 客户端断开后在一个tick内停止轮询
        if tx.is_closed() {
            return;
        }

        let ids = match state.payment_repo.payment_ids_for_user(user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = ?e, "User stream id refresh failed");
                continue;
            }
        };

        let events = match state.event_repo.list_for_payments_since(&ids, hwm).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = ?e, "User stream poll failed");
                continue;
            }
        };

        for event in &events {
            match enrich_frame(&state, event).await {
                Some(frame) => {
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                None => continue,
            }
            hwm = event.created_at;
        }
    }
}

/// 用户流帧：事件附带payment块
async fn enrich_frame(state: &AppState, event: &PaymentEvent) -> Option<SseFrame> {
    let payment = match state.payment_repo.find_by_id(event.payment_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return None,
        Err(e) => {
            tracing::error!(payment_id = %event.payment_id, error = ?e, "Enrichment load failed");
            return None;
        }
    };

    let body = serde_json::json!({
        "id": event.id,
        "payment_id": event.payment_id,
        "event_type": event.event_type,
        "status": event.status,
        "metadata": event.metadata,
        "created_at": event.created_at,
        "payment": {
            "id": payment.id,
            "amount": payment.amount,
            "destination_currency": payment.destination_currency,
            "status": payment.status,
            "created_at": payment.created_at,
        },
    });

    match SseFrame::default().event("user.event").json_data(&body) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!(error = ?e, "Failed to encode user event frame");
            None
        }
    }
}
