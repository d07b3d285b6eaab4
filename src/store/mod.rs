//! Persistence contract for the hierarchy core.
//!
//! `HierarchyStore` is the only seam through which the resolver, gate, ledger and
//! provisioner touch rows. Every multi-row mutation is atomic: callers observe either
//! all of its writes or none.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hierarchy::catalog::{Level, UserTypeLevel};
use crate::hierarchy::chain::LevelAssignment;
use crate::hierarchy::ledger::{Debit, LicenseKind};
use crate::models::{
    DivisionId, Entity, EntityDivision, EntityId, LicenseAllotment, NewDivision, NewEntity, NewUser, User,
    UserId,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("licence capacity exceeded for {kind} at entity {entity_id}")]
    CapacityExceeded { entity_id: EntityId, kind: LicenseKind },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Quota added to an entity's allotment row (created when absent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseGrant {
    pub entity_id: EntityId,
    pub kind: LicenseKind,
    pub quantity: i64,
    pub valid_till: Option<DateTime<Utc>>,
}

/// Profile and role changes applied to a user in one write; `None` leaves a column as is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub user_type: Option<i32>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.user_type.is_none()
    }
}

/// Row counts touched by a cascading soft delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSummary {
    pub entities: u64,
    pub divisions: u64,
    pub users: u64,
}

#[async_trait]
pub trait HierarchyStore: Send + Sync {
    async fn entity(&self, id: EntityId) -> StoreResult<Option<Entity>>;

    async fn division(&self, id: DivisionId) -> StoreResult<Option<EntityDivision>>;

    async fn user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Active user holding this email, if any
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Active user holding this mobile number, if any
    async fn user_by_mobile(&self, mobile: &str) -> StoreResult<Option<User>>;

    async fn user_types(&self) -> StoreResult<Vec<UserTypeLevel>>;

    async fn allotment(&self, entity_id: EntityId, kind: LicenseKind) -> StoreResult<Option<LicenseAllotment>>;

    async fn allotments(&self, entity_id: EntityId) -> StoreResult<Vec<LicenseAllotment>>;

    /// Whether an active sibling entity under `parent_id` already uses `name`
    async fn entity_name_taken(&self, parent_id: Option<EntityId>, name: &str) -> StoreResult<bool>;

    async fn division_name_taken(
        &self,
        entity_id: EntityId,
        parent_division_id: Option<DivisionId>,
        name: &str,
    ) -> StoreResult<bool>;

    /// Apply every debit or none. A debit that would push `consumed` past `granted`
    /// fails the whole batch with `CapacityExceeded`.
    async fn apply_debits(&self, debits: &[Debit]) -> StoreResult<()>;

    /// Debits, the user row and its level slots in one unit
    async fn insert_user(&self, user: NewUser, assignment: &LevelAssignment, debits: &[Debit]) -> StoreResult<User>;

    /// Overwrite all seven level slots of a user
    async fn reassign_user(&self, id: UserId, assignment: &LevelAssignment) -> StoreResult<()>;

    /// Entity row, its own allotments and the debits against its ancestors in one unit
    async fn insert_entity(&self, entity: NewEntity, grants: &[LicenseGrant], debits: &[Debit]) -> StoreResult<Entity>;

    async fn insert_division(&self, division: NewDivision) -> StoreResult<EntityDivision>;

    async fn rename_entity(&self, id: EntityId, name: &str) -> StoreResult<()>;

    async fn rename_division(&self, id: DivisionId, name: &str) -> StoreResult<()>;

    async fn set_entity_logo(&self, id: EntityId, logo_path: Option<&str>) -> StoreResult<()>;

    /// Soft delete the entity, every descendant entity and division, and every user placed below it
    async fn soft_delete_entity(&self, id: EntityId, level: Level, suffix: &str) -> StoreResult<DeleteSummary>;

    async fn soft_delete_division(&self, id: DivisionId, level: Level, suffix: &str) -> StoreResult<DeleteSummary>;

    /// Apply every populated field of `changes` or none of them
    async fn update_user(&self, id: UserId, changes: &UserChanges) -> StoreResult<()>;

    async fn set_user_renewal(&self, id: UserId, renewal_date: DateTime<Utc>) -> StoreResult<()>;

    /// Move the renewal date of every user placed under the entity and the validity of its
    /// licence rows, in one unit. Returns the number of users touched.
    async fn set_entity_expiry(&self, id: EntityId, level: Level, expires_at: DateTime<Utc>) -> StoreResult<u64>;

    async fn soft_delete_user(&self, id: UserId, suffix: &str) -> StoreResult<()>;

    async fn grant_licences(&self, grant: LicenseGrant) -> StoreResult<LicenseAllotment>;
}
