extern crate washbay_core;
use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod capacity;
pub mod error;
pub mod reservations;
pub mod state;
pub mod stream;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route("/v1/capacity", get(capacity::get_snapshot))
        .route("/v1/capacity/stream", get(stream::capacity_stream))
        .route(
            "/v1/admin/capacity/{date}/reset",
            post(capacity::reset_capacity),
        )
        .route("/v1/reservations", post(reservations::create_reservation))
        .route(
            "/v1/reservations/verify",
            post(reservations::verify_reservation),
        )
        .route(
            "/v1/reservations/{id}/cancel",
            post(reservations::cancel_reservation),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

/// Coarse per-IP budget in front of every route; the per-phone reservation
/// budget is enforced separately inside the coordinator.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let ip = addr.ip().to_string();
    let key = format!("ratelimit:{}", ip);

    match state.redis.check_rate_limit(&key, 100, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded",
        )),
        Err(_) => Ok(next.run(req).await), // Fail open
    }
}
