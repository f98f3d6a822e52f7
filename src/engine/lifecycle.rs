//! QR tracking lifecycle.
//!
//! ```text
//! PendingDownload --activate--> Active --position--> Tracking
//! Active | Tracking --delivered--> Delivered
//! PendingDownload | Active | Tracking --stop--> Stopped
//! ```
//!
//! Delivered and Stopped are terminal: every further mutation is a conflict.

use std::time::Instant;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::notifier::{enqueue_notification, Notification};
use crate::engine::qr_id::insert_with_unique_id;
use crate::engine::view::{access_decision, build_view, AccessDecision};
use crate::error::AppError;
use crate::geo::validate_coordinates;
use crate::models::partner::PartnerRole;
use crate::models::qr::{Destination, QrCode, QrId, QrStatus};
use crate::models::tracking::{
    CompletionMarker, Coordinates, DestinationRecord, LivePosition, PersonalLocation, PositionFix,
    StopMarker, StopReason, TrackingSession, TrackingView,
};
use crate::state::AppState;
use crate::validate::required;

#[derive(Debug, Clone, Deserialize)]
pub struct NewQrCode {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub google_maps_url: Option<String>,
    #[serde(default)]
    pub here_maps_url: Option<String>,
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Activation {
    #[serde(default)]
    pub partner_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionReport {
    #[serde(default)]
    pub partner_email: String,
    #[serde(default)]
    pub partner_name: Option<String>,
    #[serde(default)]
    pub role: Option<PartnerRole>,
    #[serde(default)]
    pub role_only: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

pub async fn create_qr(state: &AppState, request: NewQrCode) -> Result<QrCode, AppError> {
    let name = required("name", &request.name)?;
    let address = required("address", &request.address)?;
    let coordinates = validate_coordinates(request.latitude, request.longitude)?;

    let company = match request.company_id {
        Some(id) => Some(
            state
                .companies
                .get(&id)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| AppError::NotFound(format!("company {id} not found")))?,
        ),
        None => None,
    };

    let user = match request.assigned_user_id {
        Some(id) => Some(
            state
                .users
                .get(&id)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?,
        ),
        None => None,
    };

    let destination = Destination {
        name,
        address,
        coordinates,
        google_maps_url: non_empty(request.google_maps_url),
        here_maps_url: non_empty(request.here_maps_url),
    };

    let code = {
        let mut rng = rand::thread_rng();
        insert_with_unique_id(&state.qr_codes, &mut rng, state.qr_id_max_attempts, |id| {
            QrCode {
                id,
                destination,
                company_id: request.company_id,
                assigned_user_id: request.assigned_user_id,
                status: QrStatus::PendingDownload,
                created_at: Utc::now(),
                tracking: TrackingSession::default(),
            }
        })?
    };

    state.metrics.qr_codes_created_total.inc();
    state
        .metrics
        .lifecycle_transitions_total
        .with_label_values(&[QrStatus::PendingDownload.as_str()])
        .inc();

    info!(
        qr_id = %code.id,
        company_id = ?code.company_id,
        assigned_user_id = ?code.assigned_user_id,
        "qr code generated"
    );

    if let (Some(user), Some(company)) = (user, company) {
        let notification = Notification {
            recipient_email: user.email,
            recipient_name: user.name,
            qr_id: code.id.clone(),
            company_name: company.name,
            location_name: code.destination.name.clone(),
            assigned_at: code.created_at,
        };

        if let Err(err) = enqueue_notification(state, notification).await {
            warn!(qr_id = %code.id, error = %err, "qr created but notification was not queued");
        }
    }

    Ok(code)
}

pub fn activate(
    state: &AppState,
    qr_id: &QrId,
    activation: Activation,
) -> Result<TrackingView, AppError> {
    let activated_by = non_empty(activation.partner_name).unwrap_or_else(|| "Unknown".to_string());
    let user_email = non_empty(activation.user_email).map(|email| email.to_lowercase());

    let mut code = state
        .qr_codes
        .get_mut(qr_id)
        .ok_or_else(|| not_found(qr_id))?;

    ensure_open(&code)?;

    let record = DestinationRecord {
        name: code.destination.name.clone(),
        address: code.destination.address.clone(),
        coordinates: code.destination.coordinates,
        activated_at: Utc::now(),
        activated_by: activated_by.clone(),
        user_email,
    };
    code.tracking.destination = Some(record);

    let first_activation = code.status == QrStatus::PendingDownload;
    if first_activation {
        code.status = QrStatus::Active;
    }

    let view = build_view(&code);
    drop(code);

    if first_activation {
        state.metrics.active_tracking_sessions.inc();
        record_transition(state, QrStatus::Active);
    }

    info!(qr_id = %qr_id, activated_by = %activated_by, "qr code activated");
    publish(state, &view);
    Ok(view)
}

pub fn record_position(
    state: &AppState,
    qr_id: &QrId,
    report: PositionReport,
) -> Result<TrackingView, AppError> {
    let start = Instant::now();
    let result = apply_position(state, qr_id, report);

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .position_update_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    result
}

fn apply_position(
    state: &AppState,
    qr_id: &QrId,
    report: PositionReport,
) -> Result<TrackingView, AppError> {
    let position = resolve_position(state, report)?;
    let kind = match position.fix {
        PositionFix::Coordinates { .. } => "coordinates",
        PositionFix::RoleOnly => "role_only",
    };

    let mut code = state
        .qr_codes
        .get_mut(qr_id)
        .ok_or_else(|| not_found(qr_id))?;

    ensure_open(&code)?;
    if code.status == QrStatus::PendingDownload {
        return Err(AppError::Conflict(format!(
            "qr {qr_id} has not been activated"
        )));
    }

    if let Some(previous) = &code.tracking.position {
        if previous.partner_email != position.partner_email {
            info!(
                qr_id = %qr_id,
                from = %previous.partner_email,
                to = %position.partner_email,
                "tracking handed over to another partner"
            );
        }
    }

    let partner_email = position.partner_email.clone();
    code.tracking.position = Some(position);

    let started_tracking = code.status == QrStatus::Active;
    code.status = QrStatus::Tracking;

    let view = build_view(&code);
    drop(code);

    state
        .metrics
        .position_updates_total
        .with_label_values(&[kind])
        .inc();
    if started_tracking {
        record_transition(state, QrStatus::Tracking);
    }

    info!(qr_id = %qr_id, partner = %partner_email, kind, "live position stored");
    publish(state, &view);
    Ok(view)
}

/// Builds coordinate B from a report, filling name and role from the partner
/// directory when the sender is registered.
fn resolve_position(state: &AppState, report: PositionReport) -> Result<LivePosition, AppError> {
    let partner_email = required("partner_email", &report.partner_email)?.to_lowercase();
    let registered = state.partner_by_email(&partner_email);

    if let Some(partner) = &registered {
        if !partner.active {
            return Err(AppError::Conflict(format!(
                "partner {partner_email} is deactivated"
            )));
        }
    }

    let partner_name = non_empty(report.partner_name)
        .or_else(|| registered.as_ref().map(|partner| partner.name.clone()))
        .unwrap_or_else(|| "Unknown".to_string());
    let role = report
        .role
        .or_else(|| registered.as_ref().map(|partner| partner.role))
        .unwrap_or_default();

    let fix = if report.role_only && role.is_aviation() {
        PositionFix::RoleOnly
    } else {
        let coordinates = required_coordinates(report.latitude, report.longitude)?;
        PositionFix::Coordinates { coordinates }
    };

    Ok(LivePosition {
        partner_email,
        partner_name,
        role,
        fix,
        timestamp: Utc::now(),
    })
}

pub fn mark_delivered(
    state: &AppState,
    qr_id: &QrId,
    partner_name: &str,
) -> Result<TrackingView, AppError> {
    let partner_name = required("partner_name", partner_name)?;

    let mut code = state
        .qr_codes
        .get_mut(qr_id)
        .ok_or_else(|| not_found(qr_id))?;

    ensure_open(&code)?;
    if code.status == QrStatus::PendingDownload {
        return Err(AppError::Conflict(format!(
            "qr {qr_id} has not been activated"
        )));
    }

    code.tracking.completion = Some(CompletionMarker {
        partner_name: partner_name.clone(),
        completed_at: Utc::now(),
    });
    code.status = QrStatus::Delivered;

    let view = build_view(&code);
    drop(code);

    state.metrics.active_tracking_sessions.dec();
    record_transition(state, QrStatus::Delivered);

    info!(qr_id = %qr_id, partner = %partner_name, "order marked as delivered");
    publish(state, &view);
    Ok(view)
}

pub fn stop_tracking(
    state: &AppState,
    qr_id: &QrId,
    stopped_by: &str,
    reason: StopReason,
) -> Result<TrackingView, AppError> {
    let stopped_by = required("user_email", stopped_by)?.to_lowercase();

    let mut code = state
        .qr_codes
        .get_mut(qr_id)
        .ok_or_else(|| not_found(qr_id))?;

    ensure_open(&code)?;

    let was_active = matches!(code.status, QrStatus::Active | QrStatus::Tracking);
    code.tracking.stop = Some(StopMarker {
        stopped_by: stopped_by.clone(),
        reason,
        stopped_at: Utc::now(),
    });
    code.status = QrStatus::Stopped;

    let view = build_view(&code);
    drop(code);

    if was_active {
        state.metrics.active_tracking_sessions.dec();
    }
    record_transition(state, QrStatus::Stopped);

    info!(qr_id = %qr_id, stopped_by = %stopped_by, reason = ?reason, "qr tracking stopped");
    publish(state, &view);
    Ok(view)
}

pub fn tracking_view(state: &AppState, qr_id: &QrId) -> Result<TrackingView, AppError> {
    state
        .qr_codes
        .get(qr_id)
        .map(|entry| build_view(entry.value()))
        .ok_or_else(|| not_found(qr_id))
}

pub fn get_qr(state: &AppState, qr_id: &QrId) -> Result<QrCode, AppError> {
    state
        .qr_codes
        .get(qr_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| not_found(qr_id))
}

pub fn check_access(
    state: &AppState,
    qr_id: &QrId,
    user_id: Uuid,
) -> Result<AccessDecision, AppError> {
    state
        .qr_codes
        .get(qr_id)
        .map(|entry| access_decision(entry.value(), user_id))
        .ok_or_else(|| not_found(qr_id))
}

/// Upserts a partner's position when no QR session is involved.
pub fn record_personal_location(
    state: &AppState,
    report: PositionReport,
) -> Result<PersonalLocation, AppError> {
    let partner_email = required("partner_email", &report.partner_email)?.to_lowercase();
    let coordinates = required_coordinates(report.latitude, report.longitude)?;

    let partner_name = non_empty(report.partner_name)
        .or_else(|| {
            state
                .partner_by_email(&partner_email)
                .map(|partner| partner.name)
        })
        .unwrap_or_else(|| "Unknown".to_string());

    let location = PersonalLocation {
        partner_email: partner_email.clone(),
        partner_name,
        coordinates,
        timestamp: Utc::now(),
    };

    state
        .personal_locations
        .insert(partner_email.clone(), location.clone());
    state
        .metrics
        .position_updates_total
        .with_label_values(&["personal"])
        .inc();

    info!(partner = %partner_email, "personal location stored");
    Ok(location)
}

fn ensure_open(code: &QrCode) -> Result<(), AppError> {
    if code.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "tracking for qr {} is closed ({})",
            code.id,
            code.status.as_str()
        )));
    }
    Ok(())
}

fn publish(state: &AppState, view: &TrackingView) {
    let _ = state.tracking_events_tx.send(view.clone());
}

fn record_transition(state: &AppState, status: QrStatus) {
    state
        .metrics
        .lifecycle_transitions_total
        .with_label_values(&[status.as_str()])
        .inc();
}

fn not_found(qr_id: &QrId) -> AppError {
    AppError::NotFound(format!("qr code {qr_id} not found"))
}

fn required_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Coordinates, AppError> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => validate_coordinates(latitude, longitude),
        _ => Err(AppError::BadRequest(
            "latitude and longitude are required".to_string(),
        )),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}
