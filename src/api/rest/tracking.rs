use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::lifecycle::{self, PositionReport};
use crate::error::AppError;
use crate::models::qr::QrId;
use crate::models::tracking::{PersonalLocation, TrackingView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/live-location", post(store_live_location))
        .route("/live-locations", get(list_live_locations))
}

#[derive(Deserialize)]
pub struct LiveLocationRequest {
    #[serde(default)]
    pub qr_id: Option<QrId>,
    #[serde(flatten)]
    pub report: PositionReport,
}

#[derive(Serialize)]
#[serde(tag = "tracking_mode", rename_all = "snake_case")]
pub enum LiveLocationResponse {
    QrOnly { tracking: TrackingView },
    Normal { location: PersonalLocation },
}

/// A report carrying a QR id feeds that code's session; anything else
/// updates the partner's personal location.
async fn store_live_location(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LiveLocationRequest>, JsonRejection>,
) -> Result<Json<LiveLocationResponse>, AppError> {
    let Json(payload) = payload?;
    let response = match payload.qr_id {
        Some(qr_id) => LiveLocationResponse::QrOnly {
            tracking: lifecycle::record_position(&state, &qr_id, payload.report)?,
        },
        None => LiveLocationResponse::Normal {
            location: lifecycle::record_personal_location(&state, payload.report)?,
        },
    };

    Ok(Json(response))
}

async fn list_live_locations(State(state): State<Arc<AppState>>) -> Json<Vec<PersonalLocation>> {
    let mut locations: Vec<PersonalLocation> = state
        .personal_locations
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    locations.sort_by(|a, b| a.partner_email.cmp(&b.partner_email));

    Json(locations)
}
