use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::lifecycle::{self, Activation, NewQrCode, PositionReport};
use crate::engine::view::AccessDecision;
use crate::error::AppError;
use crate::models::qr::{QrCode, QrId};
use crate::models::tracking::{StopReason, TrackingView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/qr", post(create_qr).get(list_qr))
        .route("/qr/:qr_id", get(get_qr))
        .route("/qr/:qr_id/activate", post(activate_qr))
        .route("/qr/:qr_id/position", post(record_position))
        .route("/qr/:qr_id/delivered", post(mark_delivered))
        .route("/qr/:qr_id/stop", post(stop_tracking))
        .route("/qr/:qr_id/tracking", get(tracking_view))
        .route("/qr/:qr_id/access/:user_id", get(check_access))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub company_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct DeliveredRequest {
    #[serde(default)]
    pub partner_name: String,
}

#[derive(Deserialize)]
pub struct StopRequest {
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub reason: StopReason,
}

async fn create_qr(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewQrCode>, JsonRejection>,
) -> Result<Json<QrCode>, AppError> {
    let Json(payload) = payload?;
    let code = lifecycle::create_qr(&state, payload).await?;
    Ok(Json(code))
}

async fn list_qr(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<QrCode>> {
    let mut codes: Vec<QrCode> = state
        .qr_codes
        .iter()
        .filter(|entry| query.company_id.is_none() || entry.value().company_id == query.company_id)
        .map(|entry| entry.value().clone())
        .collect();
    codes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    Json(codes)
}

async fn get_qr(
    State(state): State<Arc<AppState>>,
    Path(qr_id): Path<QrId>,
) -> Result<Json<QrCode>, AppError> {
    Ok(Json(lifecycle::get_qr(&state, &qr_id)?))
}

async fn activate_qr(
    State(state): State<Arc<AppState>>,
    Path(qr_id): Path<QrId>,
    payload: Result<Json<Activation>, JsonRejection>,
) -> Result<Json<TrackingView>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(lifecycle::activate(&state, &qr_id, payload)?))
}

async fn record_position(
    State(state): State<Arc<AppState>>,
    Path(qr_id): Path<QrId>,
    payload: Result<Json<PositionReport>, JsonRejection>,
) -> Result<Json<TrackingView>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(lifecycle::record_position(&state, &qr_id, payload)?))
}

async fn mark_delivered(
    State(state): State<Arc<AppState>>,
    Path(qr_id): Path<QrId>,
    payload: Result<Json<DeliveredRequest>, JsonRejection>,
) -> Result<Json<TrackingView>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(lifecycle::mark_delivered(
        &state,
        &qr_id,
        &payload.partner_name,
    )?))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    Path(qr_id): Path<QrId>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<TrackingView>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(lifecycle::stop_tracking(
        &state,
        &qr_id,
        &payload.user_email,
        payload.reason,
    )?))
}

async fn tracking_view(
    State(state): State<Arc<AppState>>,
    Path(qr_id): Path<QrId>,
) -> Result<Json<TrackingView>, AppError> {
    Ok(Json(lifecycle::tracking_view(&state, &qr_id)?))
}

async fn check_access(
    State(state): State<Arc<AppState>>,
    Path((qr_id, user_id)): Path<(QrId, Uuid)>,
) -> Result<Json<AccessDecision>, AppError> {
    Ok(Json(lifecycle::check_access(&state, &qr_id, user_id)?))
}
