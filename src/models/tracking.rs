use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::partner::PartnerRole;
use crate::models::qr::{QrId, QrStatus};

pub const BOARDED_AND_ARRIVING: &str = "BOARDED AND ARRIVING";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Coordinate A: written when a partner activates the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub name: String,
    pub address: String,
    pub coordinates: Coordinates,
    pub activated_at: DateTime<Utc>,
    pub activated_by: String,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "location_type", rename_all = "snake_case")]
pub enum PositionFix {
    Coordinates { coordinates: Coordinates },
    RoleOnly,
}

/// Coordinate B: the partner's latest reported position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivePosition {
    pub partner_email: String,
    pub partner_name: String,
    pub role: PartnerRole,
    pub fix: PositionFix,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub partner_name: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    #[serde(alias = "done_button")]
    DoneButton,
    #[serde(alias = "other_scan")]
    OtherScan,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::DoneButton => "DoneButton",
            StopReason::OtherScan => "OtherScan",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopMarker {
    pub stopped_by: String,
    pub reason: StopReason,
    pub stopped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingSession {
    pub destination: Option<DestinationRecord>,
    pub position: Option<LivePosition>,
    pub completion: Option<CompletionMarker>,
    pub stop: Option<StopMarker>,
}

/// Latest position of a partner outside of any QR session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalLocation {
    pub partner_email: String,
    pub partner_name: String,
    pub coordinates: Coordinates,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackingStatus {
    Pending,
    InProgress,
    BoardedAndArriving,
    Delivered,
    Stopped,
}

impl TrackingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingStatus::Pending => "Pending",
            TrackingStatus::InProgress => "InProgress",
            TrackingStatus::BoardedAndArriving => "BoardedAndArriving",
            TrackingStatus::Delivered => "Delivered",
            TrackingStatus::Stopped => "Stopped",
        }
    }

    /// Label shown on the company order board.
    pub fn label(self) -> &'static str {
        match self {
            TrackingStatus::Pending => "Pending",
            TrackingStatus::InProgress => "In Progress",
            TrackingStatus::BoardedAndArriving => "Boarded and Arriving",
            TrackingStatus::Delivered => "Delivered",
            TrackingStatus::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationView {
    pub name: String,
    pub address: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerView {
    pub name: String,
    pub email: String,
    pub role: PartnerRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingView {
    pub qr_id: QrId,
    pub qr_status: QrStatus,
    pub status: TrackingStatus,
    pub destination: DestinationView,
    pub delivery_partner: Option<PartnerView>,
    pub delivered: Option<CompletionMarker>,
    pub stopped: Option<StopMarker>,
}
