use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::EntityId;
use crate::hierarchy::ledger::LicenseKind;

/// Granted vs. consumed quota of one licence kind at one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LicenseAllotment {
    pub entity_id: EntityId,
    #[sqlx(try_from = "String")]
    pub kind: LicenseKind,
    pub granted: i64,
    pub consumed: i64,
    pub purchased_at: Option<DateTime<Utc>>,
    pub valid_till: Option<DateTime<Utc>>,
}

impl LicenseAllotment {
    pub fn remaining(&self) -> i64 {
        self.granted - self.consumed
    }

    pub fn can_satisfy(&self, requested: i64) -> bool {
        self.remaining() >= requested
    }
}
