use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{DeleteSummary, HierarchyStore, LicenseGrant, StoreError, StoreResult, UserChanges};
use crate::hierarchy::catalog::{HierarchyCatalog, Level, UserTypeLevel};
use crate::hierarchy::chain::LevelAssignment;
use crate::hierarchy::ledger::{Debit, LicenseKind};
use crate::models::{
    DivisionId, Entity, EntityDivision, EntityId, LicenseAllotment, NewDivision, NewEntity, NewUser, NodeStatus,
    User, UserId,
};

#[derive(Default)]
struct State {
    next_id: i64,
    entities: BTreeMap<EntityId, Entity>,
    divisions: BTreeMap<DivisionId, EntityDivision>,
    users: BTreeMap<UserId, User>,
    password_hashes: HashMap<UserId, String>,
    allotments: BTreeMap<(EntityId, LicenseKind), LicenseAllotment>,
    user_types: Vec<UserTypeLevel>,
}

impl State {
    /// Ids are unique across all tables, which keeps tier fallbacks unambiguous in tests
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Validate the whole batch against a scratch copy, then commit it
    fn debit(&mut self, debits: &[Debit]) -> StoreResult<()> {
        let mut staged: BTreeMap<(EntityId, LicenseKind), i64> = BTreeMap::new();
        for debit in debits {
            let key = (debit.entity_id, debit.kind);
            let row = self.allotments.get(&key).ok_or(StoreError::CapacityExceeded {
                entity_id: debit.entity_id,
                kind: debit.kind,
            })?;
            let consumed = staged.entry(key).or_insert(row.consumed);
            if *consumed + debit.quantity > row.granted {
                return Err(StoreError::CapacityExceeded {
                    entity_id: debit.entity_id,
                    kind: debit.kind,
                });
            }
            *consumed += debit.quantity;
        }
        for (key, consumed) in staged {
            if let Some(row) = self.allotments.get_mut(&key) {
                row.consumed = consumed;
            }
        }
        Ok(())
    }

    fn grant(&mut self, grant: LicenseGrant) -> LicenseAllotment {
        let row = self
            .allotments
            .entry((grant.entity_id, grant.kind))
            .or_insert_with(|| LicenseAllotment {
                entity_id: grant.entity_id,
                kind: grant.kind,
                granted: 0,
                consumed: 0,
                purchased_at: Some(Utc::now()),
                valid_till: None,
            });
        row.granted += grant.quantity;
        if grant.valid_till.is_some() {
            row.valid_till = grant.valid_till;
        }
        row.clone()
    }

    fn email_in_use(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.is_active() && u.email == email && Some(u.id) != except)
    }

    fn mobile_in_use(&self, mobile: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.is_active() && u.mobile.as_deref() == Some(mobile) && Some(u.id) != except)
    }

    fn delete_users_under(&mut self, level: Level, id: i64, suffix: &str) -> u64 {
        let now = Utc::now();
        let mut count = 0;
        for user in self.users.values_mut() {
            if user.is_active() && user.assignment.is_under(level, id) {
                user.status = NodeStatus::Deleted;
                user.email = format!("{}{}", user.email, suffix);
                user.updated_at = now;
                count += 1;
            }
        }
        count
    }

    fn delete_divisions(&mut self, ids: &[DivisionId], suffix: &str) -> u64 {
        let now = Utc::now();
        let mut count = 0;
        for id in ids {
            if let Some(division) = self.divisions.get_mut(id).filter(|d| d.is_active()) {
                division.status = NodeStatus::Deleted;
                division.name = format!("{}{}", division.name, suffix);
                division.updated_at = now;
                count += 1;
            }
        }
        count
    }

    fn division_subtree(&self, root: DivisionId) -> Vec<DivisionId> {
        let mut found = vec![root];
        let mut cursor = 0;
        while cursor < found.len() {
            let parent = found[cursor];
            found.extend(
                self.divisions
                    .values()
                    .filter(|d| d.parent_division_id == Some(parent) && d.id != parent)
                    .map(|d| d.id),
            );
            cursor += 1;
        }
        found
    }
}

/// Lock-guarded in-process store for tests and local runs
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let state = State {
            user_types: standard_user_types(),
            ..State::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    /// Set an allotment row to exact granted/consumed values
    pub async fn seed_allotment(&self, entity_id: EntityId, kind: LicenseKind, granted: i64, consumed: i64) {
        let mut state = self.state.write().await;
        state.allotments.insert(
            (entity_id, kind),
            LicenseAllotment {
                entity_id,
                kind,
                granted,
                consumed,
                purchased_at: Some(Utc::now()),
                valid_till: None,
            },
        );
    }

    pub async fn password_hash(&self, user_id: UserId) -> Option<String> {
        self.state.read().await.password_hashes.get(&user_id).cloned()
    }

    /// Rewrite a division's parent pointer without any checks
    #[cfg(test)]
    pub async fn force_division_parent(&self, id: DivisionId, parent: Option<DivisionId>) {
        if let Some(division) = self.state.write().await.divisions.get_mut(&id) {
            division.parent_division_id = parent;
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn standard_user_types() -> Vec<UserTypeLevel> {
    let catalog = HierarchyCatalog::standard();
    let mut types: Vec<UserTypeLevel> = (1..=17).filter_map(|code| catalog.user_type(code).cloned()).collect();
    types.sort_by_key(|t| t.code);
    types
}

#[async_trait]
impl HierarchyStore for InMemoryStore {
    async fn entity(&self, id: EntityId) -> StoreResult<Option<Entity>> {
        Ok(self.state.read().await.entities.get(&id).cloned())
    }

    async fn division(&self, id: DivisionId) -> StoreResult<Option<EntityDivision>> {
        Ok(self.state.read().await.divisions.get(&id).cloned())
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.is_active() && u.email == email)
            .cloned())
    }

    async fn user_by_mobile(&self, mobile: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.is_active() && u.mobile.as_deref() == Some(mobile))
            .cloned())
    }

    async fn user_types(&self) -> StoreResult<Vec<UserTypeLevel>> {
        Ok(self.state.read().await.user_types.clone())
    }

    async fn allotment(&self, entity_id: EntityId, kind: LicenseKind) -> StoreResult<Option<LicenseAllotment>> {
        Ok(self.state.read().await.allotments.get(&(entity_id, kind)).cloned())
    }

    async fn allotments(&self, entity_id: EntityId) -> StoreResult<Vec<LicenseAllotment>> {
        let state = self.state.read().await;
        Ok(state
            .allotments
            .range((entity_id, LicenseKind::Seat)..=(entity_id, LicenseKind::CertificationCredit))
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn entity_name_taken(&self, parent_id: Option<EntityId>, name: &str) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .values()
            .any(|e| e.is_active() && e.parent_id == parent_id && e.name.eq_ignore_ascii_case(name)))
    }

    async fn division_name_taken(
        &self,
        entity_id: EntityId,
        parent_division_id: Option<DivisionId>,
        name: &str,
    ) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state.divisions.values().any(|d| {
            d.is_active()
                && d.entity_id == entity_id
                && d.parent_division_id == parent_division_id
                && d.name.eq_ignore_ascii_case(name)
        }))
    }

    async fn apply_debits(&self, debits: &[Debit]) -> StoreResult<()> {
        self.state.write().await.debit(debits)
    }

    async fn insert_user(&self, user: NewUser, assignment: &LevelAssignment, debits: &[Debit]) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.email_in_use(&user.email, None) {
            return Err(StoreError::Conflict(format!("email '{}' already in use", user.email)));
        }
        if let Some(mobile) = user.mobile.as_deref().filter(|m| state.mobile_in_use(m, None)) {
            return Err(StoreError::Conflict(format!("mobile '{}' already in use", mobile)));
        }
        state.debit(debits)?;

        let id = state.next_id();
        let now = Utc::now();
        let row = User {
            id,
            name: user.name,
            email: user.email,
            mobile: user.mobile,
            user_type: user.user_type,
            status: NodeStatus::Active,
            renewal_date: Some(user.renewal_date),
            assignment: *assignment,
            created_at: now,
            updated_at: now,
        };
        state.password_hashes.insert(id, user.password_hash);
        state.users.insert(id, row.clone());
        Ok(row)
    }

    async fn reassign_user(&self, id: UserId, assignment: &LevelAssignment) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id)
            .filter(|u| u.is_active())
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        user.assignment = *assignment;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_entity(&self, entity: NewEntity, grants: &[LicenseGrant], debits: &[Debit]) -> StoreResult<Entity> {
        let mut state = self.state.write().await;
        state.debit(debits)?;

        let id = state.next_id();
        let now = Utc::now();
        let row = Entity {
            id,
            name: entity.name,
            entity_type: entity.entity_type,
            level: entity.level,
            parent_id: entity.parent_id,
            status: NodeStatus::Active,
            contact_name: entity.contact_name,
            contact_email: entity.contact_email,
            contact_mobile: entity.contact_mobile,
            logo_path: entity.logo_path,
            created_at: now,
            updated_at: now,
        };
        state.entities.insert(id, row.clone());
        for grant in grants {
            state.grant(LicenseGrant {
                entity_id: id,
                ..*grant
            });
        }
        Ok(row)
    }

    async fn insert_division(&self, division: NewDivision) -> StoreResult<EntityDivision> {
        let mut state = self.state.write().await;
        if !state.entities.contains_key(&division.entity_id) {
            return Err(StoreError::NotFound(format!("entity {}", division.entity_id)));
        }
        let id = state.next_id();
        let now = Utc::now();
        let row = EntityDivision {
            id,
            name: division.name,
            division_type: division.division_type,
            level: division.level,
            entity_id: division.entity_id,
            parent_division_id: division.parent_division_id,
            status: NodeStatus::Active,
            contact_name: division.contact_name,
            contact_email: division.contact_email,
            contact_mobile: division.contact_mobile,
            created_at: now,
            updated_at: now,
        };
        state.divisions.insert(id, row.clone());
        Ok(row)
    }

    async fn rename_entity(&self, id: EntityId, name: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let entity = state
            .entities
            .get_mut(&id)
            .filter(|e| e.is_active())
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))?;
        entity.name = name.to_string();
        entity.updated_at = Utc::now();
        Ok(())
    }

    async fn rename_division(&self, id: DivisionId, name: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let division = state
            .divisions
            .get_mut(&id)
            .filter(|d| d.is_active())
            .ok_or_else(|| StoreError::NotFound(format!("division {}", id)))?;
        division.name = name.to_string();
        division.updated_at = Utc::now();
        Ok(())
    }

    async fn set_entity_logo(&self, id: EntityId, logo_path: Option<&str>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let entity = state
            .entities
            .get_mut(&id)
            .filter(|e| e.is_active())
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))?;
        entity.logo_path = logo_path.map(str::to_string);
        entity.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete_entity(&self, id: EntityId, level: Level, suffix: &str) -> StoreResult<DeleteSummary> {
        let mut state = self.state.write().await;
        if !state.entities.get(&id).is_some_and(Entity::is_active) {
            return Err(StoreError::NotFound(format!("entity {}", id)));
        }

        let mut subtree = vec![id];
        let mut cursor = 0;
        while cursor < subtree.len() {
            let parent = subtree[cursor];
            subtree.extend(
                state
                    .entities
                    .values()
                    .filter(|e| e.parent_id == Some(parent) && e.id != parent)
                    .map(|e| e.id),
            );
            cursor += 1;
        }

        let now = Utc::now();
        let mut summary = DeleteSummary::default();
        for entity_id in &subtree {
            if let Some(entity) = state.entities.get_mut(entity_id).filter(|e| e.is_active()) {
                entity.status = NodeStatus::Deleted;
                entity.name = format!("{}{}", entity.name, suffix);
                entity.updated_at = now;
                summary.entities += 1;
            }
        }

        let divisions: Vec<DivisionId> = state
            .divisions
            .values()
            .filter(|d| subtree.contains(&d.entity_id))
            .map(|d| d.id)
            .collect();
        summary.divisions = state.delete_divisions(&divisions, suffix);
        summary.users = state.delete_users_under(level, id, suffix);
        Ok(summary)
    }

    async fn soft_delete_division(&self, id: DivisionId, level: Level, suffix: &str) -> StoreResult<DeleteSummary> {
        let mut state = self.state.write().await;
        if !state.divisions.get(&id).is_some_and(EntityDivision::is_active) {
            return Err(StoreError::NotFound(format!("division {}", id)));
        }
        let subtree = state.division_subtree(id);
        Ok(DeleteSummary {
            entities: 0,
            divisions: state.delete_divisions(&subtree, suffix),
            users: state.delete_users_under(level, id, suffix),
        })
    }

    async fn update_user(&self, id: UserId, changes: &UserChanges) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(email) = changes.email.as_deref().filter(|e| state.email_in_use(e, Some(id))) {
            return Err(StoreError::Conflict(format!("email '{}' already in use", email)));
        }
        let user = state
            .users
            .get_mut(&id)
            .filter(|u| u.is_active())
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        if let Some(name) = &changes.name {
            user.name = name.clone();
        }
        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        if let Some(user_type) = changes.user_type {
            user.user_type = user_type;
        }
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_user_renewal(&self, id: UserId, renewal_date: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id)
            .filter(|u| u.is_active())
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        user.renewal_date = Some(renewal_date);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_entity_expiry(&self, id: EntityId, level: Level, expires_at: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        if !state.entities.get(&id).is_some_and(Entity::is_active) {
            return Err(StoreError::NotFound(format!("entity {}", id)));
        }
        let now = Utc::now();
        let mut users = 0;
        for user in state.users.values_mut() {
            if user.is_active() && user.assignment.is_under(level, id) {
                user.renewal_date = Some(expires_at);
                user.updated_at = now;
                users += 1;
            }
        }
        for allotment in state
            .allotments
            .range_mut((id, LicenseKind::Seat)..=(id, LicenseKind::CertificationCredit))
            .map(|(_, row)| row)
        {
            allotment.valid_till = Some(expires_at);
        }
        Ok(users)
    }

    async fn soft_delete_user(&self, id: UserId, suffix: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id)
            .filter(|u| u.is_active())
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        user.status = NodeStatus::Deleted;
        user.email = format!("{}{}", user.email, suffix);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn grant_licences(&self, grant: LicenseGrant) -> StoreResult<LicenseAllotment> {
        let mut state = self.state.write().await;
        if !state.entities.contains_key(&grant.entity_id) {
            return Err(StoreError::NotFound(format!("entity {}", grant.entity_id)));
        }
        Ok(state.grant(grant))
    }
}
