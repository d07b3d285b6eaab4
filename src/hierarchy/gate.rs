use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hierarchy::catalog::{HierarchyCatalog, Level, Tier};
use crate::hierarchy::error::{HierarchyError, HierarchyResult};
use crate::models::{DivisionId, EntityDivision, Entity, EntityId, NodeRef, UserId};
use crate::store::HierarchyStore;

/// The authenticated caller, decoded upstream from a signed token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: UserId,
    pub user_type: i32,
}

/// What a request claims to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSpec {
    Entity(EntityId),
    Division {
        division_id: DivisionId,
        entity_id: Option<EntityId>,
    },
    Level {
        level: i64,
        entity_id: Option<EntityId>,
        division_id: Option<DivisionId>,
    },
    User(UserId),
    Unspecified,
}

impl TargetSpec {
    /// Build a target from loose request fields; zero ids count as absent
    pub fn from_fields(level: Option<i64>, entity_id: Option<i64>, division_id: Option<i64>) -> Self {
        let entity_id = entity_id.filter(|id| *id != 0);
        let division_id = division_id.filter(|id| *id != 0);
        match (level.filter(|l| *l != 0), division_id, entity_id) {
            (Some(level), _, _) => TargetSpec::Level {
                level,
                entity_id,
                division_id,
            },
            (None, Some(division_id), _) => TargetSpec::Division {
                division_id,
                entity_id,
            },
            (None, None, Some(entity_id)) => TargetSpec::Entity(entity_id),
            (None, None, None) => TargetSpec::Unspecified,
        }
    }
}

/// Result of a successful authorization check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub requester_level: Level,
    /// `None` only when a platform root acted without naming a target
    pub target_level: Option<Level>,
    pub target: Option<NodeRef>,
}

/// Allow iff the requester ranks at or above the target
pub fn allows(requester: Level, target: Level) -> bool {
    requester >= target
}

/// Stateless allow/deny decisions over the hierarchy
#[derive(Clone)]
pub struct AuthorizationGate {
    store: Arc<dyn HierarchyStore>,
    catalog: Arc<HierarchyCatalog>,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn HierarchyStore>, catalog: Arc<HierarchyCatalog>) -> Self {
        Self { store, catalog }
    }

    pub async fn authorize(&self, requester_type: i32, target: &TargetSpec) -> HierarchyResult<AuthorizationDecision> {
        let requester_level = self
            .catalog
            .privilege_level_of(requester_type)
            .ok_or(HierarchyError::UnknownUserType(requester_type))?;

        let (target_level, node) = match *target {
            TargetSpec::Unspecified => {
                if self.catalog.is_platform_root(requester_type) {
                    return Ok(AuthorizationDecision {
                        requester_level,
                        target_level: None,
                        target: None,
                    });
                }
                tracing::warn!("authorization denied: user type {} named no target", requester_type);
                return Err(HierarchyError::AmbiguousTarget);
            }
            TargetSpec::Level {
                level,
                entity_id,
                division_id,
            } => {
                self.explicit_level(requester_type, requester_level, level, entity_id, division_id)
                    .await?
            }
            TargetSpec::Division {
                division_id,
                entity_id,
            } => {
                let division = self.division(division_id).await?;
                if let Some(owner) = entity_id {
                    if division.entity_id != owner {
                        return Err(HierarchyError::validation(format!(
                            "division {} does not belong to entity {}",
                            division_id, owner
                        )));
                    }
                }
                (division.level, Some(NodeRef::Division(division.id)))
            }
            TargetSpec::Entity(id) => self.entity_or_division(id).await?,
            TargetSpec::User(user_id) => {
                let user = self
                    .store
                    .user(user_id)
                    .await?
                    .filter(|u| u.is_active())
                    .ok_or(HierarchyError::UserNotFound(user_id))?;
                let level = self
                    .catalog
                    .privilege_level_of(user.user_type)
                    .ok_or(HierarchyError::UnknownUserType(user.user_type))?;
                (level, None)
            }
        };

        if !allows(requester_level, target_level) {
            return Err(deny(requester_type, requester_level, target_level));
        }

        Ok(AuthorizationDecision {
            requester_level,
            target_level: Some(target_level),
            target: node,
        })
    }

    /// Explicit level: validate it, then compare against the level the named node really has
    async fn explicit_level(
        &self,
        requester_type: i32,
        requester_level: Level,
        level: i64,
        entity_id: Option<EntityId>,
        division_id: Option<DivisionId>,
    ) -> HierarchyResult<(Level, Option<NodeRef>)> {
        let stated = Level::new(level)?;
        if !allows(requester_level, stated) {
            return Err(deny(requester_type, requester_level, stated));
        }

        let (actual, node) = match stated.tier() {
            Tier::Division => {
                let id = division_id.ok_or(HierarchyError::AmbiguousTarget)?;
                let division = self.division(id).await?;
                (division.level, NodeRef::Division(id))
            }
            Tier::Entity => {
                let id = entity_id.ok_or(HierarchyError::AmbiguousTarget)?;
                let entity = self.entity(id).await?.ok_or(HierarchyError::NodeNotFound {
                    tier: Tier::Entity,
                    id,
                })?;
                (entity.level, NodeRef::Entity(id))
            }
        };

        if actual < stated {
            tracing::warn!(
                "authorization denied: node {} is at level {}, below the stated level {}",
                node.id(),
                actual,
                stated
            );
            return Err(HierarchyError::Unauthorized {
                requester_level: requester_level.get(),
                target_level: stated.get(),
            });
        }

        Ok((actual, Some(node)))
    }

    /// An id with no level: entity tier first, division tier only when no entity matches
    async fn entity_or_division(&self, id: i64) -> HierarchyResult<(Level, Option<NodeRef>)> {
        if let Some(entity) = self.entity(id).await? {
            return Ok((entity.level, Some(NodeRef::Entity(entity.id))));
        }
        let division = self.division(id).await.map_err(|e| match e {
            HierarchyError::NodeNotFound { .. } => HierarchyError::NodeNotFound {
                tier: Tier::Entity,
                id,
            },
            other => other,
        })?;
        Ok((division.level, Some(NodeRef::Division(division.id))))
    }

    async fn entity(&self, id: EntityId) -> HierarchyResult<Option<Entity>> {
        Ok(self.store.entity(id).await?.filter(Entity::is_active))
    }

    async fn division(&self, id: DivisionId) -> HierarchyResult<EntityDivision> {
        self.store
            .division(id)
            .await?
            .filter(EntityDivision::is_active)
            .ok_or(HierarchyError::NodeNotFound {
                tier: Tier::Division,
                id,
            })
    }
}

fn deny(requester_type: i32, requester: Level, target: Level) -> HierarchyError {
    tracing::warn!(
        "authorization denied: requester level {} (type {}) below target level {}",
        requester,
        requester_type,
        target
    );
    HierarchyError::Unauthorized {
        requester_level: requester.get(),
        target_level: target.get(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::catalog::PLATFORM_ROOT_USER_TYPE;
    use crate::testing::Fixture;

    // Standard admin codes: 3 = level 6, 6 = level 5, 9 = level 4, 12 = level 3
    const UNIVERSITY_ADMIN: i32 = 3;
    const COLLEGE_ADMIN: i32 = 6;
    const DEPARTMENT_ADMIN: i32 = 9;

    #[test]
    fn allow_is_monotone_in_requester_level() {
        for target in Level::all() {
            for requester in Level::all() {
                assert_eq!(allows(requester, target), requester >= target);
            }
        }
    }

    #[test]
    fn zero_ids_are_absent() {
        assert_eq!(TargetSpec::from_fields(None, Some(0), Some(0)), TargetSpec::Unspecified);
        assert_eq!(TargetSpec::from_fields(Some(0), Some(5), None), TargetSpec::Entity(5));
        assert_eq!(
            TargetSpec::from_fields(None, Some(5), Some(9)),
            TargetSpec::Division {
                division_id: 9,
                entity_id: Some(5)
            }
        );
    }

    #[tokio::test]
    async fn department_admin_cannot_touch_university() {
        let fx = Fixture::standard().await;
        let err = fx
            .gate()
            .authorize(DEPARTMENT_ADMIN, &TargetSpec::Entity(fx.university))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HierarchyError::Unauthorized {
                requester_level: 4,
                target_level: 6
            }
        ));
    }

    #[tokio::test]
    async fn equal_level_is_allowed() {
        let fx = Fixture::standard().await;
        let decision = fx
            .gate()
            .authorize(COLLEGE_ADMIN, &TargetSpec::Entity(fx.college))
            .await
            .unwrap();
        assert_eq!(decision.target_level.map(Level::get), Some(5));
        assert_eq!(decision.target, Some(NodeRef::Entity(fx.college)));
    }

    #[tokio::test]
    async fn missing_target_requires_platform_root() {
        let fx = Fixture::standard().await;
        let gate = fx.gate();

        let err = gate.authorize(UNIVERSITY_ADMIN, &TargetSpec::Unspecified).await.unwrap_err();
        assert!(matches!(err, HierarchyError::AmbiguousTarget));

        let decision = gate
            .authorize(PLATFORM_ROOT_USER_TYPE, &TargetSpec::Unspecified)
            .await
            .unwrap();
        assert_eq!(decision.target_level, None);
    }

    #[tokio::test]
    async fn explicit_level_is_validated() {
        let fx = Fixture::standard().await;
        let target = TargetSpec::Level {
            level: 9,
            entity_id: Some(fx.college),
            division_id: None,
        };
        let err = fx.gate().authorize(PLATFORM_ROOT_USER_TYPE, &target).await.unwrap_err();
        assert!(matches!(err, HierarchyError::InvalidLevel(9)));
    }

    #[tokio::test]
    async fn stated_level_must_match_the_node() {
        let fx = Fixture::standard().await;
        // The university sits at level 6; claiming level 7 names a node that is not there
        let overstated = TargetSpec::Level {
            level: 7,
            entity_id: Some(fx.university),
            division_id: None,
        };
        assert!(matches!(
            fx.gate().authorize(PLATFORM_ROOT_USER_TYPE, &overstated).await,
            Err(HierarchyError::Unauthorized { .. })
        ));

        // Claiming level 5 does not let a college admin reach a level-6 node
        let understated = TargetSpec::Level {
            level: 5,
            entity_id: Some(fx.university),
            division_id: None,
        };
        assert!(matches!(
            fx.gate().authorize(COLLEGE_ADMIN, &understated).await,
            Err(HierarchyError::Unauthorized { requester_level: 5, target_level: 6 })
        ));
        let decision = fx.gate().authorize(UNIVERSITY_ADMIN, &understated).await.unwrap();
        assert_eq!(decision.target_level.map(Level::get), Some(6));
    }

    #[tokio::test]
    async fn division_levels_use_division_id() {
        let fx = Fixture::standard().await;
        let target = TargetSpec::Level {
            level: 3,
            entity_id: Some(fx.college),
            division_id: None,
        };
        let err = fx.gate().authorize(DEPARTMENT_ADMIN, &target).await.unwrap_err();
        assert!(matches!(err, HierarchyError::AmbiguousTarget));

        let target = TargetSpec::Level {
            level: 3,
            entity_id: Some(fx.college),
            division_id: Some(fx.degree),
        };
        assert!(fx.gate().authorize(DEPARTMENT_ADMIN, &target).await.is_ok());
    }

    #[tokio::test]
    async fn bare_id_falls_back_to_division_tier() {
        let fx = Fixture::standard().await;
        let decision = fx
            .gate()
            .authorize(DEPARTMENT_ADMIN, &TargetSpec::Entity(fx.semester))
            .await
            .unwrap();
        assert_eq!(decision.target, Some(NodeRef::Division(fx.semester)));
        assert_eq!(decision.target_level.map(Level::get), Some(2));

        let err = fx
            .gate()
            .authorize(DEPARTMENT_ADMIN, &TargetSpec::Entity(424_242))
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::NodeNotFound { .. }));
    }

    #[tokio::test]
    async fn user_targets_compare_privilege_levels() {
        let fx = Fixture::standard().await;
        let college_admin = fx.add_user("dean@example.edu", COLLEGE_ADMIN, fx.college).await;

        assert!(fx
            .gate()
            .authorize(UNIVERSITY_ADMIN, &TargetSpec::User(college_admin))
            .await
            .is_ok());
        assert!(matches!(
            fx.gate()
                .authorize(DEPARTMENT_ADMIN, &TargetSpec::User(college_admin))
                .await,
            Err(HierarchyError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_requester_type_is_rejected() {
        let fx = Fixture::standard().await;
        let err = fx.gate().authorize(77, &TargetSpec::Entity(fx.college)).await.unwrap_err();
        assert!(matches!(err, HierarchyError::UnknownUserType(77)));
    }
}
