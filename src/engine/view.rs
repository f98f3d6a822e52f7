use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::qr::{QrCode, QrId};
use crate::models::tracking::{
    DestinationView, PartnerView, PositionFix, TrackingStatus, TrackingView, BOARDED_AND_ARRIVING,
};

pub fn tracking_status(code: &QrCode) -> TrackingStatus {
    let session = &code.tracking;

    if session.completion.is_some() {
        return TrackingStatus::Delivered;
    }
    if session.stop.is_some() {
        return TrackingStatus::Stopped;
    }

    match session.position.as_ref().map(|position| &position.fix) {
        None => TrackingStatus::Pending,
        Some(PositionFix::RoleOnly) => TrackingStatus::BoardedAndArriving,
        Some(PositionFix::Coordinates { .. }) => TrackingStatus::InProgress,
    }
}

/// Projects a QR record into the payload served to tracking viewers.
///
/// The activated destination record wins over the creation-time destination
/// so that a re-activation is reflected immediately.
pub fn build_view(code: &QrCode) -> TrackingView {
    let destination = match &code.tracking.destination {
        Some(record) => DestinationView {
            name: record.name.clone(),
            address: record.address.clone(),
            coordinates: record.coordinates,
        },
        None => DestinationView {
            name: code.destination.name.clone(),
            address: code.destination.address.clone(),
            coordinates: code.destination.coordinates,
        },
    };

    let delivery_partner = code.tracking.position.as_ref().map(|position| match &position.fix {
        PositionFix::Coordinates { coordinates } => PartnerView {
            name: position.partner_name.clone(),
            email: position.partner_email.clone(),
            role: position.role,
            coordinates: Some(*coordinates),
            status: None,
            distance_km: Some(haversine_km(coordinates, &destination.coordinates)),
            last_updated: position.timestamp,
        },
        PositionFix::RoleOnly => PartnerView {
            name: position.partner_name.clone(),
            email: position.partner_email.clone(),
            role: position.role,
            coordinates: None,
            status: Some(BOARDED_AND_ARRIVING.to_string()),
            distance_km: None,
            last_updated: position.timestamp,
        },
    });

    TrackingView {
        qr_id: code.id.clone(),
        qr_status: code.status,
        status: tracking_status(code),
        destination,
        delivery_partner,
        delivered: code.tracking.completion.clone(),
        stopped: code.tracking.stop.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub qr_id: QrId,
    pub destination: String,
    pub delivery_partner: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub fn order_summary(code: &QrCode) -> OrderSummary {
    let destination = code
        .tracking
        .destination
        .as_ref()
        .map(|record| record.name.clone())
        .unwrap_or_else(|| code.destination.name.clone());

    let delivery_partner = code
        .tracking
        .position
        .as_ref()
        .map(|position| position.partner_name.clone())
        .or_else(|| {
            code.tracking
                .completion
                .as_ref()
                .map(|marker| marker.partner_name.clone())
        })
        .unwrap_or_else(|| "Not assigned".to_string());

    OrderSummary {
        order_id: format!("ORD-{}", code.id),
        qr_id: code.id.clone(),
        destination,
        delivery_partner,
        status: tracking_status(code).label().to_string(),
        created_at: code.created_at,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub access: bool,
    pub message: String,
    pub qr_id: QrId,
    pub assigned_user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

pub fn access_decision(code: &QrCode, user_id: Uuid) -> AccessDecision {
    let granted = code.assigned_user_id == Some(user_id);

    AccessDecision {
        access: granted,
        message: if granted {
            "Access granted".to_string()
        } else {
            "Access denied. This QR code is assigned to another user.".to_string()
        },
        qr_id: code.id.clone(),
        assigned_user_id: code.assigned_user_id,
        company_id: granted.then_some(code.company_id).flatten(),
    }
}
