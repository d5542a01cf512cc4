use std::sync::Arc;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{app_state::AppState, error::AppError, infrastructure::db};

pub mod event_stream_api;
pub mod middleware;
pub mod payment_api;
pub mod quote_api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "IronRamp API",
        version = "1.0.0",
        description = "Cross-border payment orchestrator: USD → stable digital dollar → local fiat"
    ),
    paths(
        quote_api::create_quote,
        payment_api::initiate_payment,
        payment_api::confirm_payment,
        payment_api::get_payment,
        payment_api::list_payments,
        event_stream_api::payment_event_stream,
        event_stream_api::user_event_stream,
    ),
    components(schemas(
        quote_api::QuoteRequest,
        quote_api::QuoteResponse,
        quote_api::QuoteBreakdownBody,
        payment_api::InitiateBody,
        payment_api::InitiateResponse,
        payment_api::ConfirmBody,
        payment_api::ConfirmResponse,
        payment_api::PaymentView,
        crate::domain::payment::FeeBreakdown,
        crate::domain::payment::PaymentStatus,
        crate::domain::payment::Corridor,
        crate::domain::payment::PaymentMethod,
        crate::domain::payment::FeeHandling,
    )),
    tags(
        (name = "quotes", description = "费用与汇率报价"),
        (name = "payments", description = "支付意图创建与确认"),
        (name = "events", description = "事件流（SSE）"),
    )
)]
struct ApiDoc;

/// 存活探针
async fn healthz() -> &'static str {
    "ok"
}

/// 健康检查：数据库 + 缓存
async fn api_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let database = match db::health_check(&state.pool).await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!(error = ?e, "Database health check failed");
            "down"
        }
    };

    let cache = match state.redis.ping().await {
        Ok(_) => "up",
        Err(e) => {
            tracing::warn!(error = ?e, "Redis health check failed");
            "down"
        }
    };

    Ok(Json(serde_json::json!({
        "status": if database == "up" && cache == "up" { "ok" } else { "degraded" },
        "database": database,
        "cache": cache,
    })))
}

/// 构建完整路由
pub fn routes(state: Arc<AppState>) -> Router {
    // initiate/confirm 挂幂等性中间件
    let idempotent_routes = Router::new()
        .route("/api/v1/initiate", post(payment_api::initiate_payment))
        .route("/api/v1/confirm", post(payment_api::confirm_payment))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::idempotency_middleware,
        ));

    Router::new()
        .route("/api/v1/quote", post(quote_api::create_quote))
        .merge(idempotent_routes)
        .route("/api/v1/payments", get(payment_api::list_payments))
        .route("/api/v1/payments/:id", get(payment_api::get_payment))
        .route(
            "/api/v1/events/:payment_id",
            get(event_stream_api::payment_event_stream),
        )
        .route(
            "/api/v1/events/user/:user_id",
            get(event_stream_api::user_event_stream),
        )
        .route("/healthz", get(healthz))
        .route("/api/health", get(api_health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(middleware::trace_id_middleware))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
