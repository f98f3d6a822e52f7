use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::User;
use crate::state::AppState;
use crate::validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/:id", get(get_user))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(payload) = payload?;
    let name = validate::required("name", &payload.name)?;
    let phone = validate::required("phone", &payload.phone)?;
    let address = validate::required("address", &payload.address)?;
    let email = validate::email(&payload.email)?;

    let user = state.register_user(User {
        id: Uuid::new_v4(),
        name,
        email,
        phone,
        address,
        active: true,
        created_at: Utc::now(),
    })?;
    info!(user_id = %user.id, "user registered");

    Ok(Json(user))
}

async fn list_users(State(state): State<Arc<AppState>>) -> Json<Vec<User>> {
    let mut users: Vec<User> = state
        .users
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    users.sort_by_key(|user| user.created_at);

    Json(users)
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = state
        .users
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;

    Ok(Json(user.value().clone()))
}
