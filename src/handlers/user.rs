use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::hierarchy::provisioner::{BulkReport, ProvisionOutcome, UserRequest, UserUpdate};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::models::{NodeRef, User, UserId};

/// POST /api/user - create a user under a node (201), or re-home a known email (200)
pub async fn user_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<UserRequest>,
) -> ApiResult<ProvisionOutcome> {
    let outcome = state
        .hierarchy
        .provisioner
        .provision_user(&auth.requester(), body)
        .await?;
    Ok(match outcome {
        ProvisionOutcome::Created(_) => ApiResponse::created(outcome),
        ProvisionOutcome::Rehomed(_) => ApiResponse::success(outcome),
    })
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub users: Vec<UserRequest>,
}

/// POST /api/user/bulk - provision many users, reporting each row
pub async fn user_bulk_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<BulkRequest>,
) -> ApiResult<BulkReport> {
    let report = state
        .hierarchy
        .provisioner
        .provision_users_bulk(&auth.requester(), body.users)
        .await?;
    Ok(ApiResponse::success(report))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub user_id: UserId,
    #[serde(flatten)]
    pub update: UserUpdate,
}

/// PATCH /api/user - update profile fields or admin status
pub async fn user_patch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    let user = state
        .hierarchy
        .provisioner
        .update_user(&auth.requester(), body.user_id, body.update)
        .await?;
    Ok(ApiResponse::success(user))
}

#[derive(Debug, Deserialize)]
pub struct PlacementRequest {
    pub user_id: UserId,
    pub target: NodeRef,
}

/// PUT /api/user/placement - move a user to another node
pub async fn placement_put(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<PlacementRequest>,
) -> ApiResult<User> {
    let user = state
        .hierarchy
        .provisioner
        .rehome_user(&auth.requester(), body.user_id, body.target)
        .await?;
    Ok(ApiResponse::success(user))
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserRequest {
    pub user_id: UserId,
}

/// DELETE /api/user - soft delete a user
pub async fn user_delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<DeleteUserRequest>,
) -> ApiResult<UserId> {
    state
        .hierarchy
        .provisioner
        .delete_user(&auth.requester(), body.user_id)
        .await?;
    Ok(ApiResponse::success(body.user_id))
}
