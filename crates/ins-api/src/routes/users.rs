//! Account routes

use super::form::{FormData, UploadedFile};
use super::parse_id;
use crate::auth::{create_token, AuthUser};
use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use ins_core::{Account, AccountPatch, NewAccount, StoredUpload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct AccountResponse {
    pub message: String,
    pub user: Account,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Account,
}

async fn store_avatar(
    state: &AppState,
    file: Option<UploadedFile>,
) -> Result<Option<StoredUpload>, ApiError> {
    match file {
        Some(file) => Ok(Some(state.uploads.store(&file.file_name, &file.bytes).await?)),
        None => Ok(None),
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    form: FormData,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let payload: NewAccount = form.parse()?;
    let user = state.accounts.register(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            message: "User registered successfully".to_string(),
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    form: FormData,
) -> Result<Json<LoginResponse>, ApiError> {
    let payload: LoginRequest = form.parse()?;
    let user = state.accounts.login(&payload.email, &payload.password).await?;

    let secret = state
        .config
        .jwt_secret
        .as_deref()
        .ok_or_else(ApiError::configuration)?;
    let token = create_token(&user, secret, state.config.token_ttl_hours).map_err(|e| {
        error!("Failed to sign token: {}", e);
        ApiError::configuration()
    })?;

    Ok(Json(LoginResponse { token, user }))
}

pub async fn add(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    mut form: FormData,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let payload: NewAccount = form.parse()?;
    let avatar = store_avatar(&state, form.take_file("image")).await?;
    let user = state.accounts.add(&caller, payload, avatar).await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            message: "User added successfully".to_string(),
            user,
        }),
    ))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    mut form: FormData,
) -> Result<Json<Account>, ApiError> {
    let id = parse_id(&id, "User not found")?;
    let file = form.take_file("image");
    let patch: AccountPatch = form.without_blank().parse()?;
    let avatar = store_avatar(&state, file).await?;

    let user = state.accounts.update(&caller, id, patch, avatar).await?;
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id, "User not found")?;
    state.accounts.delete(&caller, id).await?;

    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}

pub async fn current(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Account>, ApiError> {
    Ok(Json(state.accounts.current(&caller).await?))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<Account>>, ApiError> {
    Ok(Json(state.accounts.list(&caller).await?))
}
