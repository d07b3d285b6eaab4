use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};

use super::{NodeStatus, UserId};
use crate::hierarchy::chain::LevelAssignment;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub user_type: i32,
    pub status: NodeStatus,
    pub renewal_date: Option<DateTime<Utc>>,
    pub assignment: LevelAssignment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

// The seven level slots are separate columns; fold them into one LevelAssignment
impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = NodeStatus::try_from(status).map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: Box::new(e),
        })?;

        let slots = [
            row.try_get::<Option<i64>, _>("level_1")?,
            row.try_get::<Option<i64>, _>("level_2")?,
            row.try_get::<Option<i64>, _>("level_3")?,
            row.try_get::<Option<i64>, _>("level_4")?,
            row.try_get::<Option<i64>, _>("level_5")?,
            row.try_get::<Option<i64>, _>("level_6")?,
            row.try_get::<Option<i64>, _>("level_7")?,
        ];

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            mobile: row.try_get("mobile")?,
            user_type: row.try_get("user_type")?,
            status,
            renewal_date: row.try_get("renewal_date")?,
            assignment: LevelAssignment::from_slots(slots),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields of a user about to be inserted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub password_hash: String,
    pub user_type: i32,
    pub renewal_date: DateTime<Utc>,
}
