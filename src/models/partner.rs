use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PartnerRole {
    #[default]
    #[serde(alias = "regular", alias = "Boy")]
    Regular,
    #[serde(alias = "captain")]
    Captain,
    #[serde(alias = "pilot")]
    Pilot,
    #[serde(alias = "tc", alias = "TC")]
    Tc,
}

impl PartnerRole {
    /// Aviation crew roles report "boarded" instead of coordinates.
    pub fn is_aviation(self) -> bool {
        matches!(self, PartnerRole::Captain | PartnerRole::Pilot | PartnerRole::Tc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartnerRole::Regular => "Regular",
            PartnerRole::Captain => "Captain",
            PartnerRole::Pilot => "Pilot",
            PartnerRole::Tc => "Tc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "regular" | "boy" => Some(PartnerRole::Regular),
            "captain" => Some(PartnerRole::Captain),
            "pilot" => Some(PartnerRole::Pilot),
            "tc" => Some(PartnerRole::Tc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryPartner {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: PartnerRole,
    pub vehicle_type: String,
    pub company_ids: Vec<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
