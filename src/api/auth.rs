use axum::extract::State;
use serde::{Deserialize, Serialize};
use tower::Service;

use crate::{
    commands::{Login, Signup},
    domain::user::User,
};

use super::{error::AppError, extract::Json, response::ApiResponse, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
}

fn session(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let access_token = state
        .tokens
        .issue(&user)
        .map_err(|err| AppError::Internal(err.to_string()))?;

    Ok(AuthResponse { user, access_token })
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<ApiResponse<AuthResponse>, AppError> {
    let user = state
        .logic
        .clone()
        .call(Signup {
            email: req.email,
            name: req.name,
            password: req.password,
        })
        .await?;

    Ok(ApiResponse::created("Signed up successfully", session(&state, user)?))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<ApiResponse<AuthResponse>, AppError> {
    let user = state
        .logic
        .clone()
        .call(Login {
            email: req.email,
            password: req.password,
        })
        .await?;

    Ok(ApiResponse::ok("Logged in successfully", session(&state, user)?))
}
