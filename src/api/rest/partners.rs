use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::partner::{DeliveryPartner, PartnerRole};
use crate::state::AppState;
use crate::validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/partners", post(create_partner).get(list_partners))
        .route("/partners/:id", get(get_partner))
        .route("/partners/:id/status", patch(update_partner_status))
}

#[derive(Deserialize)]
pub struct CreatePartnerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: PartnerRole,
    #[serde(default, alias = "vehicleType")]
    pub vehicle_type: String,
    #[serde(default, alias = "companies")]
    pub company_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub active: bool,
}

async fn create_partner(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePartnerRequest>, JsonRejection>,
) -> Result<Json<DeliveryPartner>, AppError> {
    let Json(payload) = payload?;
    let name = validate::required("name", &payload.name)?;
    let phone = validate::required("phone", &payload.phone)?;
    let vehicle_type = validate::required("vehicle_type", &payload.vehicle_type)?;
    let email = validate::email(&payload.email)?;

    if let Some(missing) = payload
        .company_ids
        .iter()
        .find(|id| !state.companies.contains_key(*id))
    {
        return Err(AppError::BadRequest(format!("unknown company {missing}")));
    }

    let mut company_ids = payload.company_ids;
    company_ids.sort();
    company_ids.dedup();

    let partner = state.register_partner(DeliveryPartner {
        id: Uuid::new_v4(),
        name,
        email,
        phone,
        role: payload.role,
        vehicle_type,
        company_ids,
        active: true,
        created_at: Utc::now(),
    })?;
    info!(partner_id = %partner.id, role = partner.role.as_str(), "delivery partner registered");

    Ok(Json(partner))
}

async fn list_partners(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryPartner>> {
    let mut partners: Vec<DeliveryPartner> = state
        .partners
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    partners.sort_by_key(|partner| partner.created_at);

    Json(partners)
}

async fn get_partner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryPartner>, AppError> {
    let partner = state
        .partners
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("partner {} not found", id)))?;

    Ok(Json(partner.value().clone()))
}

async fn update_partner_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<DeliveryPartner>, AppError> {
    let Json(payload) = payload?;
    let mut partner = state
        .partners
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("partner {} not found", id)))?;

    partner.active = payload.active;
    info!(partner_id = %id, active = payload.active, "partner status updated");

    Ok(Json(partner.clone()))
}
