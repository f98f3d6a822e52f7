use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::tracking::{Coordinates, TrackingSession};

/// Four-digit code printed on the QR label, `1000..=9999`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QrId(String);

impl QrId {
    pub const MIN: u16 = 1000;
    pub const MAX: u16 = 9999;

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        let valid = trimmed.len() == 4
            && trimmed.bytes().all(|b| b.is_ascii_digit())
            && !trimmed.starts_with('0');

        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(AppError::BadRequest(format!(
                "invalid qr id {raw:?}: expected a number between {} and {}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn from_number(value: u16) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then(|| Self(value.to_string()))
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(Self::MIN..=Self::MAX).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QrId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<QrId> for String {
    fn from(value: QrId) -> Self {
        value.0
    }
}

impl fmt::Display for QrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QrStatus {
    PendingDownload,
    Active,
    Tracking,
    Delivered,
    Stopped,
}

impl QrStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QrStatus::Delivered | QrStatus::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QrStatus::PendingDownload => "PendingDownload",
            QrStatus::Active => "Active",
            QrStatus::Tracking => "Tracking",
            QrStatus::Delivered => "Delivered",
            QrStatus::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    pub address: String,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_maps_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub here_maps_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrCode {
    pub id: QrId,
    pub destination: Destination,
    pub company_id: Option<Uuid>,
    pub assigned_user_id: Option<Uuid>,
    pub status: QrStatus,
    pub created_at: DateTime<Utc>,
    pub tracking: TrackingSession,
}
