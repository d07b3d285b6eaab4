pub mod entity;
pub mod licence;
pub mod user;

pub use entity::{Entity, EntityDivision, NewDivision, NewEntity, NodeRef, NodeStatus};
pub use licence::LicenseAllotment;
pub use user::{NewUser, User};

use thiserror::Error;

pub type EntityId = i64;
pub type DivisionId = i64;
pub type UserId = i64;

/// A persisted string column held a value no enum variant matches
#[derive(Debug, Error)]
#[error("unrecognized {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
