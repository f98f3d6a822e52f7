pub mod companies;
pub mod partners;
pub mod qr;
pub mod tracking;
pub mod users;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = ServeDir::new(&state.static_dir);

    Router::new()
        .merge(companies::router())
        .merge(partners::router())
        .merge(qr::router())
        .merge(tracking::router())
        .merge(users::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .fallback_service(static_dir)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    qr_codes: usize,
    active_sessions: i64,
    companies: usize,
    users: usize,
    partners: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        qr_codes: state.qr_codes.len(),
        active_sessions: state.metrics.active_tracking_sessions.get(),
        companies: state.companies.len(),
        users: state.users.len(),
        partners: state.partners.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
