//! Contract routes

use super::form::FormData;
use super::parse_id;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use ins_core::{Contract, ContractDraft, ContractView};
use std::sync::Arc;
use tracing::debug;

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    form: FormData,
) -> Result<(StatusCode, Json<Contract>), ApiError> {
    let draft: ContractDraft = form.parse()?;
    let contract = state.contracts.create(&caller, draft).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn list_agent(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<ContractView>>, ApiError> {
    Ok(Json(state.contracts.list_for_agent(&caller).await?))
}

pub async fn list_client(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<ContractView>>, ApiError> {
    Ok(Json(state.contracts.list_for_client(&caller).await?))
}

pub async fn list_all(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<ContractView>>, ApiError> {
    Ok(Json(state.contracts.list_all(&caller).await?))
}

pub async fn list_available(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<ContractView>>, ApiError> {
    Ok(Json(state.contracts.list_available(&caller).await?))
}

pub async fn get_contract(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ContractView>, ApiError> {
    let id = parse_id(&id, "Contract not found")?;
    Ok(Json(state.contracts.get(&caller, id).await?))
}

/// Attach the uploaded `signature` image and sign. The stored image is
/// removed again when signing fails.
pub async fn sign(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    mut form: FormData,
) -> Result<Json<Contract>, ApiError> {
    let file = form
        .take_file("signature")
        .ok_or_else(|| ApiError::BadRequest("Signature file is required".to_string()))?;
    let id = parse_id(&id, "Contract not found")?;

    let signature = state.uploads.store(&file.file_name, &file.bytes).await?;
    match state.contracts.sign(&caller, id, &signature).await {
        Ok(contract) => Ok(Json(contract)),
        Err(e) => {
            debug!("Signing {} failed, discarding {}", id, signature.url);
            state.uploads.remove(&signature.url).await;
            Err(e.into())
        }
    }
}
