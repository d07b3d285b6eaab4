use thiserror::Error;

use crate::hierarchy::catalog::Tier;
use crate::hierarchy::ledger::LicenseKind;
use crate::store::StoreError;

/// Errors raised by the hierarchy core (catalog, resolver, gate, ledger, provisioner)
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("invalid level: {0}")]
    InvalidLevel(i64),

    #[error("dangling ancestor: {tier:?} node {missing_id} referenced from {from_id} does not exist")]
    DanglingAncestor {
        tier: Tier,
        from_id: i64,
        missing_id: i64,
    },

    #[error("inconsistent hierarchy at node {node_id}: {reason}")]
    InconsistentHierarchy { node_id: i64, reason: String },

    #[error("requester level {requester_level} is below target level {target_level}")]
    Unauthorized {
        requester_level: u8,
        target_level: u8,
    },

    #[error("request does not identify a target")]
    AmbiguousTarget,

    #[error("no licence available for {kind}: requested {requested}")]
    NoLicenseCapacity { kind: LicenseKind, requested: i64 },

    /// Email or mobile already held by a user placed elsewhere
    #[error("subject '{subject}' is already placed elsewhere in the hierarchy")]
    DuplicateSubject { subject: String },

    #[error("{tier:?} node {id} not found")]
    NodeNotFound { tier: Tier, id: i64 },

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("unknown user type: {0}")]
    UnknownUserType(i32),

    #[error("name '{0}' already exists at this position")]
    NameTaken(String),

    #[error("invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HierarchyError {
    pub fn validation(message: impl Into<String>) -> Self {
        HierarchyError::Validation(message.into())
    }

    /// Data-integrity faults that must alert rather than be shown to the caller
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            HierarchyError::DanglingAncestor { .. } | HierarchyError::InconsistentHierarchy { .. }
        )
    }
}

pub type HierarchyResult<T> = Result<T, HierarchyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_faults_are_flagged() {
        let dangling = HierarchyError::DanglingAncestor {
            tier: Tier::Entity,
            from_id: 4,
            missing_id: 9,
        };
        assert!(dangling.is_integrity_fault());
        assert!(!HierarchyError::AmbiguousTarget.is_integrity_fault());
        assert!(!HierarchyError::InvalidLevel(9).is_integrity_fault());
    }

    #[test]
    fn capacity_error_names_the_kind() {
        let err = HierarchyError::NoLicenseCapacity {
            kind: LicenseKind::Seat,
            requested: 3,
        };
        assert_eq!(err.to_string(), "no licence available for seat: requested 3");
    }
}
