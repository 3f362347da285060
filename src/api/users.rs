use axum::{extract::State, Extension};
use tower::Service;
use uuid::Uuid;

use crate::{
    commands::{
        Actor, ChangePassword, CreditHistory, DeleteUser, GetUser, SearchUsers, UpdateProfile,
        UpdateUser,
    },
    domain::{
        credit::CreditEvent,
        search::{Page, SearchOptions},
        user::User,
    },
};

use super::{
    error::AppError,
    extract::{Json, Path},
    response::ApiResponse,
    state::AppState,
};

pub async fn me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<ApiResponse<User>, AppError> {
    let user = state
        .logic
        .clone()
        .call(GetUser {
            user_id: actor.user_id,
        })
        .await?;

    Ok(ApiResponse::ok("Profile retrieved successfully", user))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<UpdateProfile>,
) -> Result<ApiResponse<User>, AppError> {
    let user = state
        .logic
        .clone()
        .call(UpdateProfile {
            user_id: actor.user_id,
            ..req
        })
        .await?;

    Ok(ApiResponse::ok("Profile updated successfully", user))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ChangePassword>,
) -> Result<ApiResponse<()>, AppError> {
    state
        .logic
        .clone()
        .call(ChangePassword {
            user_id: actor.user_id,
            ..req
        })
        .await?;

    Ok(ApiResponse::ok("Password updated successfully", ()))
}

pub async fn my_credits(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<ApiResponse<Vec<CreditEvent>>, AppError> {
    let events = state
        .logic
        .clone()
        .call(CreditHistory {
            user_id: actor.user_id,
        })
        .await?;

    Ok(ApiResponse::ok("Credit history retrieved successfully", events))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(options): Json<SearchOptions>,
) -> Result<ApiResponse<Page<User>>, AppError> {
    actor.require_admin()?;
    let page = state.logic.clone().call(SearchUsers { options }).await?;

    Ok(ApiResponse::ok("Users retrieved successfully", page))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<Uuid>,
) -> Result<ApiResponse<User>, AppError> {
    actor.require_admin()?;
    let user = state.logic.clone().call(GetUser { user_id }).await?;

    Ok(ApiResponse::ok("User retrieved successfully", user))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUser>,
) -> Result<ApiResponse<User>, AppError> {
    actor.require_admin()?;
    let user = state
        .logic
        .clone()
        .call(UpdateUser { user_id, ..req })
        .await?;

    Ok(ApiResponse::ok("User updated successfully", user))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    actor.require_admin()?;
    state.logic.clone().call(DeleteUser { user_id }).await?;

    Ok(ApiResponse::ok("User deleted successfully", ()))
}

pub async fn credits(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<CreditEvent>>, AppError> {
    actor.require_admin()?;
    let events = state.logic.clone().call(CreditHistory { user_id }).await?;

    Ok(ApiResponse::ok("Credit history retrieved successfully", events))
}
