//! HTTP/JSON API and push transport
//!
//! Stable ingress surface under `/api/v1`. Domain errors carry their machine
//! code in the body; per-IP rate limiting sits in front of every route.

pub mod handlers;
pub mod models;
pub mod ws;

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

type IpLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Map a domain error onto a status code and structured body
pub fn error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::ConstraintViolationHard { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::ConstraintViolationSoft { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::TimeConflict { .. } => StatusCode::CONFLICT,
        EngineError::NoCompatibleBerth => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NoSlotFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        EngineError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
    };
    let mut body = serde_json::json!({
        "code": error.code(),
        "message": error.to_string(),
    });
    if let EngineError::TimeConflict { conflicts } = &error {
        body["conflicts"] = serde_json::json!(conflicts);
    }
    (status, Json(body)).into_response()
}

async fn rate_limit(
    State(limiter): State<Arc<IpLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.check_key(&addr.ip()).is_err() {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "code": "RATE_LIMITED",
                "message": "per-ip request budget exhausted",
            })),
        )
            .into_response();
    }
    next.run(request).await
}

/// Build the full router
pub fn router(engine: Arc<Engine>) -> Router {
    let per_minute = NonZeroU32::new(engine.config.server.rate_limit_per_ip_per_minute)
        .unwrap_or(NonZeroU32::MIN);
    let limiter: Arc<IpLimiter> = Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/vessels",
            get(handlers::list_vessels).post(handlers::create_vessel),
        )
        .route("/vessels/:id", get(handlers::get_vessel))
        .route(
            "/berths",
            get(handlers::list_berths).post(handlers::create_berth),
        )
        .route("/berths/:id", get(handlers::get_berth))
        .route(
            "/terminals",
            get(handlers::list_terminals).post(handlers::create_terminal),
        )
        .route(
            "/ports",
            get(handlers::list_ports).post(handlers::create_port),
        )
        .route("/schedules/active", get(handlers::active_schedules))
        .route("/schedules/allocate", post(handlers::allocate_schedule))
        .route("/schedules/clear-all", delete(handlers::clear_all))
        .route("/schedules/:id", delete(handlers::cancel_schedule))
        .route("/schedules/:id/eta", put(handlers::update_eta))
        .route("/schedules/:id/arrival", put(handlers::record_arrival))
        .route("/schedules/:id/berthing", put(handlers::record_berthing))
        .route("/schedules/:id/departure", put(handlers::record_departure))
        .route(
            "/suggestions/berth/:vessel_id",
            get(handlers::suggest_berths),
        )
        .route(
            "/predictions/eta/active",
            get(handlers::active_eta_predictions),
        )
        .route("/dashboard/metrics", get(handlers::dashboard_metrics))
        .route(
            "/dashboard/berth-status",
            get(handlers::dashboard_berth_status),
        )
        .route("/dashboard/alerts", get(handlers::dashboard_alerts))
        .route("/alerts/:id/read", put(handlers::mark_alert_read))
        .route("/conflicts", get(handlers::list_conflicts))
        .route("/conflicts/:id/resolve", post(handlers::resolve_conflict))
        .route("/ws", get(ws::websocket))
        .with_state(engine);

    Router::new()
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(limiter, rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the shutdown future resolves
pub async fn serve(
    engine: Arc<Engine>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> EngineResult<()> {
    let addr: SocketAddr = engine
        .config
        .server
        .bind_addr
        .parse()
        .map_err(|e| EngineError::Validation(format!("bind_addr: {}", e)))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| EngineError::TransientStore(format!("bind {}: {}", addr, e)))?;
    info!(%addr, "http server listening");
    axum::serve(
        listener,
        router(engine).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| EngineError::TransientStore(format!("serve: {}", e)))
}
