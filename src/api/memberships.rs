use axum::{extract::State, Extension};
use serde::Deserialize;
use tower::Service;
use uuid::Uuid;

use crate::{
    commands::{
        Actor, GrantMembership, MembershipGranted, MembershipRevoked, RevokeMembership,
        SearchMemberships,
    },
    domain::{
        membership::MembershipDetails,
        search::{Page, SearchOptions},
    },
};

use super::{
    error::AppError,
    extract::{Json, Path},
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantMembershipRequest {
    pub user_id: Uuid,
    #[serde(alias = "creditsToAdded")]
    pub credits_to_add: u32,
}

pub async fn grant(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<GrantMembershipRequest>,
) -> Result<ApiResponse<MembershipGranted>, AppError> {
    actor.require_admin()?;
    let granted = state
        .logic
        .clone()
        .call(GrantMembership {
            user_id: req.user_id,
            credits_to_add: req.credits_to_add,
        })
        .await?;

    Ok(ApiResponse::created("Membership created successfully", granted))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(membership_id): Path<Uuid>,
) -> Result<ApiResponse<MembershipRevoked>, AppError> {
    actor.require_admin()?;
    let revoked = state
        .logic
        .clone()
        .call(RevokeMembership { membership_id })
        .await?;

    Ok(ApiResponse::ok("Membership deleted successfully", revoked))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(options): Json<SearchOptions>,
) -> Result<ApiResponse<Page<MembershipDetails>>, AppError> {
    let page = state
        .logic
        .clone()
        .call(SearchMemberships { options, actor })
        .await?;

    Ok(ApiResponse::ok("Memberships retrieved successfully", page))
}
