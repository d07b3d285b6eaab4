use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;
use crate::hierarchy::provisioner::{DivisionRequest, EntityRequest};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::models::{Entity, EntityDivision, NodeRef};
use crate::store::DeleteSummary;

#[derive(Debug, Deserialize)]
#[serde(tag = "tier", rename_all = "lowercase")]
pub enum CreateNodeRequest {
    Entity(EntityRequest),
    Division(DivisionRequest),
}

#[derive(Debug, Serialize)]
#[serde(tag = "tier", content = "node", rename_all = "lowercase")]
pub enum CreatedNode {
    Entity(Entity),
    Division(EntityDivision),
}

/// POST /api/entity - create an entity or a division
pub async fn entity_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateNodeRequest>,
) -> ApiResult<CreatedNode> {
    let provisioner = &state.hierarchy.provisioner;
    let requester = auth.requester();

    let created = match body {
        CreateNodeRequest::Entity(request) => {
            CreatedNode::Entity(provisioner.provision_entity(&requester, request).await?)
        }
        CreateNodeRequest::Division(request) => {
            CreatedNode::Division(provisioner.provision_division(&requester, request).await?)
        }
    };
    Ok(ApiResponse::created(created))
}

#[derive(Debug, Deserialize)]
pub struct UpdateNodeRequest {
    pub node: NodeRef,
    pub name: Option<String>,
    pub logo_path: Option<String>,
}

/// PATCH /api/entity - rename a node and/or replace an entity's logo
pub async fn entity_patch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<UpdateNodeRequest>,
) -> ApiResult<NodeRef> {
    let provisioner = &state.hierarchy.provisioner;
    let requester = auth.requester();

    if body.name.is_none() && body.logo_path.is_none() {
        return Err(ApiError::validation_error("nothing to update: provide name or logo_path"));
    }
    if body.logo_path.is_some() && !matches!(body.node, NodeRef::Entity(_)) {
        return Err(ApiError::validation_error("only entities carry a logo"));
    }
    if let Some(name) = &body.name {
        provisioner.rename_node(&requester, body.node, name).await?;
    }
    if let (Some(logo_path), NodeRef::Entity(entity_id)) = (body.logo_path, body.node) {
        provisioner.set_entity_logo(&requester, entity_id, Some(logo_path)).await?;
    }
    Ok(ApiResponse::success(body.node))
}

#[derive(Debug, Deserialize)]
pub struct DeleteNodeRequest {
    pub node: NodeRef,
}

/// DELETE /api/entity - soft delete a node, its subtree and its users
pub async fn entity_delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<DeleteNodeRequest>,
) -> ApiResult<DeleteSummary> {
    let summary = state
        .hierarchy
        .provisioner
        .delete_node(&auth.requester(), body.node)
        .await?;
    Ok(ApiResponse::success(summary))
}
