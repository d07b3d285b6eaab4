use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ProvisioningConfig;
use crate::hierarchy::catalog::{HierarchyCatalog, Level, Tier, INDIVIDUAL_USER_TYPE};
use crate::hierarchy::chain::{AncestorChainResolver, LevelAssignment};
use crate::hierarchy::error::{HierarchyError, HierarchyResult};
use crate::hierarchy::events::{EventSink, ProvisionEvent, ProvisionEventKind};
use crate::hierarchy::gate::{allows, AuthorizationGate, Requester, TargetSpec};
use crate::hierarchy::ledger::{capacity_error, log_debits, LicenseKind, LicenseLedger, LicenseRequest};
use crate::models::{
    DivisionId, Entity, EntityDivision, EntityId, NewDivision, NewEntity, NewUser, NodeRef, User, UserId,
};
use crate::store::{DeleteSummary, HierarchyStore, LicenseGrant, StoreError, UserChanges};

/// A user to place under a hierarchy node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub mobile: Option<String>,
    pub password: String,
    /// Defaults to an individual (non-admin) user
    #[serde(default)]
    pub user_type: Option<i32>,
    pub target: NodeRef,
    #[serde(default)]
    pub document_credits: i64,
    #[serde(default)]
    pub certification_credits: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "user", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    Created(User),
    /// Email already known under the same local entity; the existing user was moved instead
    Rehomed(User),
}

impl ProvisionOutcome {
    pub fn user(&self) -> &User {
        match self {
            ProvisionOutcome::Created(user) | ProvisionOutcome::Rehomed(user) => user,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRequest {
    pub name: String,
    pub entity_type: String,
    /// `None` creates a new root, which only the platform root may do
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    /// Seats to carve out of the parent; document and certification credits follow from it
    #[serde(default)]
    pub seats: i64,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_mobile: Option<String>,
    #[serde(default)]
    pub logo_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivisionRequest {
    pub name: String,
    pub division_type: String,
    pub entity_id: EntityId,
    #[serde(default)]
    pub parent_division_id: Option<DivisionId>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_mobile: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// `Some(true)` promotes to admin of the user's own node, `Some(false)` demotes to individual
    #[serde(default)]
    pub admin: Option<bool>,
}

/// Whose expiry an admin is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ExpiryTarget {
    User(UserId),
    /// Every user placed under the entity, plus the entity's licence validity
    Entity(EntityId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryChange {
    pub target: ExpiryTarget,
    pub expires_at: DateTime<Utc>,
    pub users: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkOutcome {
    Created { user_id: UserId },
    Rehomed { user_id: UserId },
    Duplicate,
    InvalidEmail,
    NoLicence { kind: LicenseKind },
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRow {
    pub row: usize,
    pub email: String,
    #[serde(flatten)]
    pub outcome: BulkOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkReport {
    pub created: usize,
    pub rehomed: usize,
    pub failed: usize,
    pub rows: Vec<BulkRow>,
}

/// Materializes users, entities and divisions in the hierarchy
#[derive(Clone)]
pub struct HierarchyProvisioner {
    store: Arc<dyn HierarchyStore>,
    catalog: Arc<HierarchyCatalog>,
    resolver: AncestorChainResolver,
    gate: AuthorizationGate,
    ledger: LicenseLedger,
    events: Arc<dyn EventSink>,
    settings: ProvisioningConfig,
}

impl HierarchyProvisioner {
    pub fn new(
        store: Arc<dyn HierarchyStore>,
        catalog: Arc<HierarchyCatalog>,
        events: Arc<dyn EventSink>,
        settings: ProvisioningConfig,
    ) -> Self {
        Self {
            resolver: AncestorChainResolver::new(store.clone()),
            gate: AuthorizationGate::new(store.clone(), catalog.clone()),
            ledger: LicenseLedger::new(store.clone()),
            store,
            catalog,
            events,
            settings,
        }
    }

    /// Create a user under a division or entity, or re-home an existing user with the same email
    pub async fn provision_user(&self, requester: &Requester, request: UserRequest) -> HierarchyResult<ProvisionOutcome> {
        let name = required("name", &request.name)?;
        let email = normalize_email(&request.email)?;
        let mobile = request.mobile.as_deref().map(str::trim).filter(|m| !m.is_empty()).map(str::to_string);
        if request.password.is_empty() {
            return Err(HierarchyError::validation("password must not be empty"));
        }

        let user_type = request.user_type.unwrap_or(INDIVIDUAL_USER_TYPE);
        self.check_grantable_type(requester, user_type)?;
        self.gate.authorize(requester.user_type, &target_of(request.target)).await?;

        let chain = self.resolver.resolve_node(request.target).await?;
        let assignment = chain.to_assignment();
        let local = chain.local_entity().ok_or_else(|| HierarchyError::InconsistentHierarchy {
            node_id: request.target.id(),
            reason: "chain has no entity-tier node".to_string(),
        })?;

        let existing = self.store.user_by_email(&email).await?;
        if let Some(mobile) = &mobile {
            let holder = self.store.user_by_mobile(mobile).await?;
            if holder.is_some_and(|holder| existing.as_ref().map(|u| u.id) != Some(holder.id)) {
                return Err(HierarchyError::DuplicateSubject { subject: mobile.clone() });
            }
        }

        if let Some(existing) = existing {
            if !existing.assignment.is_under(local.level, local.id) {
                return Err(HierarchyError::DuplicateSubject { subject: email });
            }
            // The existing subject must also be within the requester's reach
            self.gate.authorize(requester.user_type, &TargetSpec::User(existing.id)).await?;
            let user = self.reassign(existing.id, &assignment).await?;
            tracing::info!("re-homed user {} to {:?}", user.id, request.target);
            self.publish(ProvisionEventKind::UserRehomed {
                user_id: user.id,
                email: user.email.clone(),
                node: request.target,
            })
            .await;
            return Ok(ProvisionOutcome::Rehomed(user));
        }

        let licences = LicenseRequest::new()
            .with(LicenseKind::Seat, 1)
            .with(LicenseKind::DocumentCredit, request.document_credits)
            .with(LicenseKind::CertificationCredit, request.certification_credits);
        let allocation = self.ledger.plan(local.id, &licences).await?;

        let new_user = NewUser {
            name,
            email: email.clone(),
            mobile,
            password_hash: hash_password(&request.password),
            user_type,
            renewal_date: Utc::now() + Duration::days(self.settings.licence_validity_days),
        };

        let user = self
            .store
            .insert_user(new_user, &assignment, &allocation.debits)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => HierarchyError::DuplicateSubject { subject: email.clone() },
                other => capacity_error(other, &allocation.debits),
            })?;
        log_debits(&allocation.debits);
        tracing::info!("created user {} under {:?}", user.id, request.target);

        self.publish(ProvisionEventKind::UserCreated {
            user_id: user.id,
            email: user.email.clone(),
            node: request.target,
        })
        .await;
        Ok(ProvisionOutcome::Created(user))
    }

    /// Move a user to another node, rewriting all seven level slots
    pub async fn rehome_user(&self, requester: &Requester, user_id: UserId, target: NodeRef) -> HierarchyResult<User> {
        self.gate.authorize(requester.user_type, &TargetSpec::User(user_id)).await?;
        self.gate.authorize(requester.user_type, &target_of(target)).await?;

        let chain = self.resolver.resolve_node(target).await?;
        let user = self.reassign(user_id, &chain.to_assignment()).await?;
        tracing::info!("re-homed user {} to {:?}", user.id, target);

        self.publish(ProvisionEventKind::UserRehomed {
            user_id: user.id,
            email: user.email.clone(),
            node: target,
        })
        .await;
        Ok(user)
    }

    /// Create an entity-tier node. Its seats and credits are carved out of the parent.
    pub async fn provision_entity(&self, requester: &Requester, request: EntityRequest) -> HierarchyResult<Entity> {
        let name = required("name", &request.name)?;
        let level = self.catalog.level_of_type(&request.entity_type, Tier::Entity)?;
        if request.seats < 0 {
            return Err(HierarchyError::validation("seats must not be negative"));
        }

        let debits = match request.parent_id {
            None => {
                if !self.catalog.is_platform_root(requester.user_type) {
                    let requester_level = self.requester_level(requester)?;
                    tracing::warn!("authorization denied: user type {} cannot create a root entity", requester.user_type);
                    return Err(HierarchyError::Unauthorized {
                        requester_level: requester_level.get(),
                        target_level: Level::TOP.get(),
                    });
                }
                Vec::new()
            }
            Some(parent_id) => {
                let parent = self.active_entity(parent_id).await?;
                self.gate
                    .authorize(
                        requester.user_type,
                        &TargetSpec::Level {
                            level: parent.level.into(),
                            entity_id: Some(parent.id),
                            division_id: None,
                        },
                    )
                    .await?;
                if level >= parent.level {
                    return Err(HierarchyError::InvalidLevel(level.into()));
                }
                // Surfaces dangling ancestors before anything is written
                self.resolver.resolve_from_entity(parent.clone()).await?;

                let allocation = self.ledger.plan(parent.id, &self.entity_licences(request.seats)?).await?;
                allocation.debits
            }
        };

        if self.store.entity_name_taken(request.parent_id, &name).await? {
            return Err(HierarchyError::NameTaken(name));
        }

        let valid_till = Utc::now() + Duration::days(self.settings.licence_validity_days);
        let grants: Vec<LicenseGrant> = self
            .entity_licences(request.seats)?
            .iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|(kind, quantity)| LicenseGrant {
                entity_id: 0,
                kind,
                quantity,
                valid_till: Some(valid_till),
            })
            .collect();

        let entity = self
            .store
            .insert_entity(
                NewEntity {
                    name,
                    entity_type: request.entity_type,
                    level,
                    parent_id: request.parent_id,
                    contact_name: request.contact_name,
                    contact_email: request.contact_email,
                    contact_mobile: request.contact_mobile,
                    logo_path: request.logo_path,
                },
                &grants,
                &debits,
            )
            .await
            .map_err(|e| capacity_error(e, &debits))?;
        log_debits(&debits);
        tracing::info!("created entity {} '{}' at level {}", entity.id, entity.name, entity.level);

        self.publish(ProvisionEventKind::EntityCreated {
            entity_id: entity.id,
            name: entity.name.clone(),
        })
        .await;
        Ok(entity)
    }

    /// Create a division under an entity, optionally below another division
    pub async fn provision_division(
        &self,
        requester: &Requester,
        request: DivisionRequest,
    ) -> HierarchyResult<EntityDivision> {
        let name = required("name", &request.name)?;
        let level = self.catalog.level_of_type(&request.division_type, Tier::Division)?;

        match request.parent_division_id {
            Some(parent_id) => {
                let parent = self.active_division(parent_id).await?;
                if parent.entity_id != request.entity_id {
                    return Err(HierarchyError::validation(format!(
                        "division {} does not belong to entity {}",
                        parent_id, request.entity_id
                    )));
                }
                self.gate
                    .authorize(
                        requester.user_type,
                        &TargetSpec::Division {
                            division_id: parent.id,
                            entity_id: Some(parent.entity_id),
                        },
                    )
                    .await?;
                if level >= parent.level {
                    return Err(HierarchyError::InvalidLevel(level.into()));
                }
            }
            None => {
                let entity = self.active_entity(request.entity_id).await?;
                self.gate
                    .authorize(
                        requester.user_type,
                        &TargetSpec::Level {
                            level: entity.level.into(),
                            entity_id: Some(entity.id),
                            division_id: None,
                        },
                    )
                    .await?;
            }
        }

        if self
            .store
            .division_name_taken(request.entity_id, request.parent_division_id, &name)
            .await?
        {
            return Err(HierarchyError::NameTaken(name));
        }

        let division = self
            .store
            .insert_division(NewDivision {
                name,
                division_type: request.division_type,
                level,
                entity_id: request.entity_id,
                parent_division_id: request.parent_division_id,
                contact_name: request.contact_name,
                contact_email: request.contact_email,
                contact_mobile: request.contact_mobile,
            })
            .await?;
        tracing::info!(
            "created division {} '{}' at level {} under entity {}",
            division.id,
            division.name,
            division.level,
            division.entity_id
        );

        self.publish(ProvisionEventKind::DivisionCreated {
            division_id: division.id,
            entity_id: division.entity_id,
            name: division.name.clone(),
        })
        .await;
        Ok(division)
    }

    pub async fn rename_node(&self, requester: &Requester, node: NodeRef, name: &str) -> HierarchyResult<()> {
        let name = required("name", name)?;
        self.gate.authorize(requester.user_type, &target_of(node)).await?;

        match node {
            NodeRef::Entity(id) => {
                let entity = self.active_entity(id).await?;
                if self.store.entity_name_taken(entity.parent_id, &name).await? {
                    return Err(HierarchyError::NameTaken(name));
                }
                self.store.rename_entity(id, &name).await?;
            }
            NodeRef::Division(id) => {
                let division = self.active_division(id).await?;
                if self
                    .store
                    .division_name_taken(division.entity_id, division.parent_division_id, &name)
                    .await?
                {
                    return Err(HierarchyError::NameTaken(name));
                }
                self.store.rename_division(id, &name).await?;
            }
        }
        tracing::info!("renamed {:?} to '{}'", node, name);
        Ok(())
    }

    pub async fn set_entity_logo(
        &self,
        requester: &Requester,
        entity_id: EntityId,
        logo_path: Option<String>,
    ) -> HierarchyResult<()> {
        self.gate.authorize(requester.user_type, &TargetSpec::Entity(entity_id)).await?;
        self.active_entity(entity_id).await?;
        self.store.set_entity_logo(entity_id, logo_path.as_deref()).await?;
        Ok(())
    }

    /// Soft delete a node with its whole subtree and every user placed below it
    pub async fn delete_node(&self, requester: &Requester, node: NodeRef) -> HierarchyResult<DeleteSummary> {
        self.gate.authorize(requester.user_type, &target_of(node)).await?;
        let suffix = &self.settings.deleted_suffix;

        let summary = match node {
            NodeRef::Entity(id) => {
                let entity = self.active_entity(id).await?;
                self.store.soft_delete_entity(id, entity.level, suffix).await?
            }
            NodeRef::Division(id) => {
                let division = self.active_division(id).await?;
                self.store.soft_delete_division(id, division.level, suffix).await?
            }
        };
        tracing::info!(
            "deleted {:?}: {} entities, {} divisions, {} users",
            node,
            summary.entities,
            summary.divisions,
            summary.users
        );

        self.publish(ProvisionEventKind::NodeDeleted {
            node,
            users: summary.users,
        })
        .await;
        Ok(summary)
    }

    pub async fn delete_user(&self, requester: &Requester, user_id: UserId) -> HierarchyResult<()> {
        self.gate.authorize(requester.user_type, &TargetSpec::User(user_id)).await?;
        self.store
            .soft_delete_user(user_id, &self.settings.deleted_suffix)
            .await
            .map_err(|e| not_found_as(e, HierarchyError::UserNotFound(user_id)))?;
        tracing::info!("deleted user {}", user_id);
        Ok(())
    }

    /// Change name or email, and promote to or demote from admin of the user's own node
    pub async fn update_user(&self, requester: &Requester, user_id: UserId, update: UserUpdate) -> HierarchyResult<User> {
        self.gate.authorize(requester.user_type, &TargetSpec::User(user_id)).await?;
        let user = self.active_user(user_id).await?;

        let mut changes = UserChanges {
            name: update.name.as_deref().map(|name| required("name", name)).transpose()?,
            email: update.email.as_deref().map(normalize_email).transpose()?,
            user_type: None,
        };
        if let Some(admin) = update.admin {
            let user_type = if admin {
                self.admin_type_of_placement(&user).await?
            } else {
                INDIVIDUAL_USER_TYPE
            };
            self.check_grantable_type(requester, user_type)?;
            changes.user_type = Some(user_type);
        }

        if !changes.is_empty() {
            self.store.update_user(user_id, &changes).await.map_err(|e| match e {
                StoreError::Conflict(_) => HierarchyError::DuplicateSubject {
                    subject: changes.email.clone().unwrap_or_default(),
                },
                other => not_found_as(other, HierarchyError::UserNotFound(user_id)),
            })?;
            if let Some(user_type) = changes.user_type {
                tracing::info!("user {} now has type {}", user_id, user_type);
            }
        }

        self.active_user(user_id).await
    }

    /// Set a user's renewal date, or the renewal date of everyone under an entity together
    /// with the validity of that entity's licences
    pub async fn change_expiry(
        &self,
        requester: &Requester,
        target: ExpiryTarget,
        expires_on: NaiveDate,
    ) -> HierarchyResult<ExpiryChange> {
        let expires_at = expires_on.and_time(NaiveTime::MIN).and_utc();

        let users = match target {
            ExpiryTarget::User(user_id) => {
                self.gate.authorize(requester.user_type, &TargetSpec::User(user_id)).await?;
                self.store
                    .set_user_renewal(user_id, expires_at)
                    .await
                    .map_err(|e| not_found_as(e, HierarchyError::UserNotFound(user_id)))?;
                1
            }
            ExpiryTarget::Entity(entity_id) => {
                self.gate.authorize(requester.user_type, &TargetSpec::Entity(entity_id)).await?;
                let entity = self.active_entity(entity_id).await?;
                self.store
                    .set_entity_expiry(entity_id, entity.level, expires_at)
                    .await
                    .map_err(|e| {
                        not_found_as(e, HierarchyError::NodeNotFound { tier: Tier::Entity, id: entity_id })
                    })?
            }
        };
        tracing::info!("expiry of {:?} moved to {} for {} users", target, expires_on, users);

        Ok(ExpiryChange {
            target,
            expires_at,
            users,
        })
    }

    /// Run `provision_user` for each row in order. Rows succeed or fail on their own;
    /// an integrity fault stops the batch.
    pub async fn provision_users_bulk(
        &self,
        requester: &Requester,
        rows: Vec<UserRequest>,
    ) -> HierarchyResult<BulkReport> {
        if rows.len() > self.settings.max_bulk_users {
            return Err(HierarchyError::validation(format!(
                "bulk import is limited to {} users, got {}",
                self.settings.max_bulk_users,
                rows.len()
            )));
        }

        let results: Vec<BulkRow> = stream::iter(rows.into_iter().enumerate())
            .then(|(index, row)| async move {
                let email = row.email.clone();
                let outcome = match self.provision_user(requester, row).await {
                    Ok(ProvisionOutcome::Created(user)) => BulkOutcome::Created { user_id: user.id },
                    Ok(ProvisionOutcome::Rehomed(user)) => BulkOutcome::Rehomed { user_id: user.id },
                    Err(e) if e.is_integrity_fault() => return Err(e),
                    Err(HierarchyError::DuplicateSubject { .. }) => BulkOutcome::Duplicate,
                    Err(HierarchyError::InvalidEmail(_)) => BulkOutcome::InvalidEmail,
                    Err(HierarchyError::NoLicenseCapacity { kind, .. }) => BulkOutcome::NoLicence { kind },
                    Err(e) => BulkOutcome::Failed { message: e.to_string() },
                };
                Ok(BulkRow {
                    row: index + 1,
                    email,
                    outcome,
                })
            })
            .try_collect()
            .await?;

        let mut report = BulkReport::default();
        for row in &results {
            match row.outcome {
                BulkOutcome::Created { .. } => report.created += 1,
                BulkOutcome::Rehomed { .. } => report.rehomed += 1,
                _ => report.failed += 1,
            }
        }
        report.rows = results;
        tracing::info!(
            "bulk import: {} created, {} re-homed, {} failed",
            report.created,
            report.rehomed,
            report.failed
        );
        Ok(report)
    }

    async fn reassign(&self, user_id: UserId, assignment: &LevelAssignment) -> HierarchyResult<User> {
        self.store
            .reassign_user(user_id, assignment)
            .await
            .map_err(|e| not_found_as(e, HierarchyError::UserNotFound(user_id)))?;
        self.active_user(user_id).await
    }

    /// Admin user type for the node type at the user's own placement
    async fn admin_type_of_placement(&self, user: &User) -> HierarchyResult<i32> {
        let level = user
            .assignment
            .level()
            .ok_or_else(|| HierarchyError::validation(format!("user {} has no placement", user.id)))?;
        let node_id = user.assignment.slot(level).unwrap_or_default();

        let node_type = match level.tier() {
            Tier::Entity => self.active_entity(node_id).await?.entity_type,
            Tier::Division => self.active_division(node_id).await?.division_type,
        };
        self.catalog
            .admin_type_for(&node_type)
            .ok_or_else(|| HierarchyError::validation(format!("no admin type for node type '{}'", node_type)))
    }

    /// A requester may only hand out user types at or below their own privilege
    fn check_grantable_type(&self, requester: &Requester, user_type: i32) -> HierarchyResult<()> {
        let requester_level = self.requester_level(requester)?;
        let granted_level = self
            .catalog
            .privilege_level_of(user_type)
            .ok_or(HierarchyError::UnknownUserType(user_type))?;
        if !allows(requester_level, granted_level) {
            tracing::warn!(
                "authorization denied: user type {} cannot grant user type {}",
                requester.user_type,
                user_type
            );
            return Err(HierarchyError::Unauthorized {
                requester_level: requester_level.get(),
                target_level: granted_level.get(),
            });
        }
        Ok(())
    }

    fn requester_level(&self, requester: &Requester) -> HierarchyResult<Level> {
        self.catalog
            .privilege_level_of(requester.user_type)
            .ok_or(HierarchyError::UnknownUserType(requester.user_type))
    }

    fn entity_licences(&self, seats: i64) -> HierarchyResult<LicenseRequest> {
        let documents = seats
            .checked_mul(self.settings.documents_per_seat)
            .ok_or_else(|| HierarchyError::validation("seats out of range"))?;
        Ok(LicenseRequest::new()
            .with(LicenseKind::Seat, seats)
            .with(LicenseKind::DocumentCredit, documents)
            .with(LicenseKind::CertificationCredit, seats))
    }

    async fn active_entity(&self, id: EntityId) -> HierarchyResult<Entity> {
        self.store
            .entity(id)
            .await?
            .filter(Entity::is_active)
            .ok_or(HierarchyError::NodeNotFound { tier: Tier::Entity, id })
    }

    async fn active_division(&self, id: DivisionId) -> HierarchyResult<EntityDivision> {
        self.store
            .division(id)
            .await?
            .filter(EntityDivision::is_active)
            .ok_or(HierarchyError::NodeNotFound {
                tier: Tier::Division,
                id,
            })
    }

    async fn active_user(&self, id: UserId) -> HierarchyResult<User> {
        self.store
            .user(id)
            .await?
            .filter(User::is_active)
            .ok_or(HierarchyError::UserNotFound(id))
    }

    async fn publish(&self, kind: ProvisionEventKind) {
        self.events.publish(ProvisionEvent::new(kind)).await;
    }
}

fn target_of(node: NodeRef) -> TargetSpec {
    match node {
        NodeRef::Entity(id) => TargetSpec::Entity(id),
        NodeRef::Division(id) => TargetSpec::Division {
            division_id: id,
            entity_id: None,
        },
    }
}

fn not_found_as(err: StoreError, replacement: HierarchyError) -> HierarchyError {
    match err {
        StoreError::NotFound(_) => replacement,
        other => HierarchyError::Store(other),
    }
}

fn required(field: &str, value: &str) -> HierarchyResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(HierarchyError::validation(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

/// Trim and lowercase an email after a basic syntax check
pub fn normalize_email(raw: &str) -> HierarchyResult<String> {
    let email = raw.trim().to_lowercase();
    let invalid = || HierarchyError::InvalidEmail(raw.trim().to_string());

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty());
    if !well_formed {
        return Err(invalid());
    }
    Ok(email)
}

/// Hex SHA-256 digest of a password
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}
