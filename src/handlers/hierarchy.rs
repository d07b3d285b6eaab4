use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::hierarchy::provisioner::{ExpiryChange, ExpiryTarget};
use crate::hierarchy::{AncestorChain, AuthorizationDecision, HierarchyError, Level, LevelAssignment, TargetSpec, Tier};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::models::{Entity, EntityId, LicenseAllotment};

/// Loose target fields as sent by admin forms; zero means absent
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub level: Option<i64>,
    pub entity_id: Option<i64>,
    pub division_id: Option<i64>,
    pub user_id: Option<i64>,
}

impl AuthorizeRequest {
    fn target(&self) -> TargetSpec {
        match self.user_id.filter(|id| *id != 0) {
            Some(user_id) => TargetSpec::User(user_id),
            None => TargetSpec::from_fields(self.level, self.entity_id, self.division_id),
        }
    }
}

/// POST /api/authorize - check whether the caller may act on a target
pub async fn authorize_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<AuthorizeRequest>,
) -> ApiResult<AuthorizationDecision> {
    let decision = state.hierarchy.gate.authorize(auth.user_type, &body.target()).await?;
    Ok(ApiResponse::success(decision))
}

#[derive(Debug, Deserialize)]
pub struct ChainQuery {
    pub level: i64,
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub chain: AncestorChain,
    pub assignment: LevelAssignment,
}

/// GET /api/hierarchy/chain?level=&id= - ancestor chain of a node
pub async fn chain_get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ChainQuery>,
) -> ApiResult<ChainResponse> {
    let level = Level::new(query.level)?;
    let target = match level.tier() {
        Tier::Division => TargetSpec::Level {
            level: query.level,
            entity_id: None,
            division_id: Some(query.id),
        },
        Tier::Entity => TargetSpec::Level {
            level: query.level,
            entity_id: Some(query.id),
            division_id: None,
        },
    };
    state.hierarchy.gate.authorize(auth.user_type, &target).await?;

    let chain = state.hierarchy.resolver.resolve(query.id, level).await?;
    let assignment = chain.to_assignment();
    Ok(ApiResponse::success(ChainResponse { chain, assignment }))
}

#[derive(Debug, Serialize)]
pub struct LicencesResponse {
    pub entity: Entity,
    pub allotments: Vec<LicenseAllotment>,
}

/// GET /api/entity/:id/licences - granted and consumed quota per licence kind
pub async fn licences_get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<EntityId>,
) -> ApiResult<LicencesResponse> {
    let hierarchy = &state.hierarchy;
    let entity = hierarchy
        .store
        .entity(id)
        .await
        .map_err(HierarchyError::from)?
        .filter(Entity::is_active)
        .ok_or(HierarchyError::NodeNotFound { tier: Tier::Entity, id })?;

    hierarchy
        .gate
        .authorize(
            auth.user_type,
            &TargetSpec::Level {
                level: entity.level.into(),
                entity_id: Some(entity.id),
                division_id: None,
            },
        )
        .await?;

    let allotments = hierarchy.store.allotments(id).await.map_err(HierarchyError::from)?;
    Ok(ApiResponse::success(LicencesResponse { entity, allotments }))
}

#[derive(Debug, Deserialize)]
pub struct ExpiryRequest {
    pub target: ExpiryTarget,
    pub expires_on: NaiveDate,
}

/// PATCH /api/expiry - move the renewal date of a user, or of everyone under an entity
pub async fn expiry_patch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ExpiryRequest>,
) -> ApiResult<ExpiryChange> {
    let change = state
        .hierarchy
        .provisioner
        .change_expiry(&auth.requester(), body.target, body.expires_on)
        .await?;
    Ok(ApiResponse::success(change))
}
