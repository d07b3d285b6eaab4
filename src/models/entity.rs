use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{DivisionId, EntityId, UnknownVariant};
use crate::hierarchy::catalog::{Level, Tier};

/// Soft-delete state shared by entities, divisions and users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Active,
    Deleted,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "Active",
            NodeStatus::Deleted => "Deleted",
        }
    }
}

impl TryFrom<String> for NodeStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "Active" => Ok(NodeStatus::Active),
            "Deleted" => Ok(NodeStatus::Deleted),
            _ => Err(UnknownVariant { kind: "status", value }),
        }
    }
}

/// Upper-tier hierarchy node (levels 5-7)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub entity_type: String,
    #[sqlx(try_from = "i16")]
    pub level: Level,
    /// `None` marks a root entity
    pub parent_id: Option<EntityId>,
    #[sqlx(try_from = "String")]
    pub status: NodeStatus,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_mobile: Option<String>,
    pub logo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lower-tier hierarchy node (levels 1-4), owned by an entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityDivision {
    pub id: DivisionId,
    pub name: String,
    pub division_type: String,
    #[sqlx(try_from = "i16")]
    pub level: Level,
    /// The entity-tier node this division subtree hangs from
    pub entity_id: EntityId,
    /// `None` marks the top division of a subtree
    pub parent_division_id: Option<DivisionId>,
    #[sqlx(try_from = "String")]
    pub status: NodeStatus,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_mobile: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

impl EntityDivision {
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    pub entity_type: String,
    pub level: Level,
    pub parent_id: Option<EntityId>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_mobile: Option<String>,
    pub logo_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDivision {
    pub name: String,
    pub division_type: String,
    pub level: Level,
    pub entity_id: EntityId,
    pub parent_division_id: Option<DivisionId>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_mobile: Option<String>,
}

/// Reference to a node in either tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "tier", content = "id", rename_all = "lowercase")]
pub enum NodeRef {
    Entity(EntityId),
    Division(DivisionId),
}

impl NodeRef {
    pub fn id(&self) -> i64 {
        match self {
            NodeRef::Entity(id) | NodeRef::Division(id) => *id,
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            NodeRef::Entity(_) => Tier::Entity,
            NodeRef::Division(_) => Tier::Division,
        }
    }
}
