use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;
use zenkey_core::{Role, verify_secret};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "email")]
    pub identity: String,
    #[serde(alias = "password")]
    pub secret: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub identity: String,
    #[serde(alias = "password")]
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub msg: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub msg: String,
    pub role: Role,
    /// Pass as `?token=` when opening the realtime socket
    pub token: String,
}

pub async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let account = state
        .accounts
        .create_account(&request.identity, &request.secret, request.role)
        .await?;

    info!(identity = %account.identity, role = ?account.role, "account registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            msg: "Account created".to_string(),
        }),
    ))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let account = state
        .accounts
        .find_account_by_identity(&request.identity)
        .await
        .ok_or_else(|| AppError::bad_request("Account not found"))?;

    if !verify_secret(&request.secret, &account.secret_hash) {
        return Err(AppError::unauthorized("Incorrect secret"));
    }

    let token = state.sessions.issue(&account);
    info!(identity = %account.identity, "operator logged in");

    Ok(Json(LoginResponse {
        msg: "Login successful".to_string(),
        role: account.role,
        token,
    }))
}
