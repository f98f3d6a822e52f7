use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::view::{order_summary, OrderSummary};
use crate::error::AppError;
use crate::models::company::{Company, CompanyStatus};
use crate::models::partner::DeliveryPartner;
use crate::state::AppState;
use crate::validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/companies", post(create_company).get(list_companies))
        .route("/companies/:id", get(get_company))
        .route("/companies/:id/orders", get(company_orders))
        .route("/companies/:id/partners", get(company_partners))
}

#[derive(Deserialize)]
pub struct CreateCompanyRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "contactPerson")]
    pub contact_person: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Serialize)]
pub struct CompanyOrders {
    pub orders: Vec<OrderSummary>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct CompanyPartners {
    pub partners: Vec<DeliveryPartner>,
    pub total: usize,
}

async fn create_company(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateCompanyRequest>, JsonRejection>,
) -> Result<Json<Company>, AppError> {
    let Json(payload) = payload?;
    let name = validate::required("name", &payload.name)?;
    let contact_person = validate::required("contact_person", &payload.contact_person)?;
    let phone = validate::required("phone", &payload.phone)?;
    let address = validate::required("address", &payload.address)?;
    let email = validate::email(&payload.email)?;

    let company = state.register_company(Company {
        id: Uuid::new_v4(),
        name,
        contact_person,
        email,
        phone,
        address,
        status: CompanyStatus::Active,
        created_at: Utc::now(),
    })?;
    info!(company_id = %company.id, name = %company.name, "company registered");

    Ok(Json(company))
}

async fn list_companies(State(state): State<Arc<AppState>>) -> Json<Vec<Company>> {
    let mut companies: Vec<Company> = state
        .companies
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    companies.sort_by_key(|company| company.created_at);

    Json(companies)
}

async fn get_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Company>, AppError> {
    let company = state
        .companies
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("company {} not found", id)))?;

    Ok(Json(company.value().clone()))
}

async fn company_orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyOrders>, AppError> {
    if !state.companies.contains_key(&id) {
        return Err(AppError::NotFound(format!("company {} not found", id)));
    }

    let mut orders: Vec<OrderSummary> = state
        .qr_codes
        .iter()
        .filter(|entry| entry.value().company_id == Some(id))
        .map(|entry| order_summary(entry.value()))
        .collect();
    orders.sort_by_key(|order| order.created_at);

    Ok(Json(CompanyOrders {
        total: orders.len(),
        orders,
    }))
}

async fn company_partners(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyPartners>, AppError> {
    if !state.companies.contains_key(&id) {
        return Err(AppError::NotFound(format!("company {} not found", id)));
    }

    let mut partners: Vec<DeliveryPartner> = state
        .partners
        .iter()
        .filter(|entry| {
            let partner = entry.value();
            partner.active && partner.company_ids.contains(&id)
        })
        .map(|entry| entry.value().clone())
        .collect();
    partners.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(CompanyPartners {
        total: partners.len(),
        partners,
    }))
}
