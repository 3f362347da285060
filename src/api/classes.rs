use axum::{extract::State, Extension};
use tower::Service;
use uuid::Uuid;

use crate::{
    commands::{Actor, CreateClass, DeleteClass, GetClass, SearchClasses, UpdateClass},
    domain::{
        class::{ClassChanges, ClassSession, NewClass},
        search::{Page, SearchOptions},
    },
};

use super::{
    error::AppError,
    extract::{Json, Path},
    response::ApiResponse,
    state::AppState,
};

pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(class): Json<NewClass>,
) -> Result<ApiResponse<ClassSession>, AppError> {
    actor.require_admin()?;
    let class = state.logic.clone().call(CreateClass { class }).await?;

    Ok(ApiResponse::created("Class created successfully", class))
}

pub async fn get(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
) -> Result<ApiResponse<ClassSession>, AppError> {
    let class = state.logic.clone().call(GetClass { class_id }).await?;

    Ok(ApiResponse::ok("Class retrieved successfully", class))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(class_id): Path<Uuid>,
    Json(changes): Json<ClassChanges>,
) -> Result<ApiResponse<ClassSession>, AppError> {
    actor.require_admin()?;
    let class = state
        .logic
        .clone()
        .call(UpdateClass { class_id, changes })
        .await?;

    Ok(ApiResponse::ok("Class updated successfully", class))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(class_id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    actor.require_admin()?;
    state.logic.clone().call(DeleteClass { class_id }).await?;

    Ok(ApiResponse::ok("Class deleted successfully", ()))
}

pub async fn search(
    State(state): State<AppState>,
    Json(options): Json<SearchOptions>,
) -> Result<ApiResponse<Page<ClassSession>>, AppError> {
    let page = state.logic.clone().call(SearchClasses { options }).await?;

    Ok(ApiResponse::ok("Classes retrieved successfully", page))
}
