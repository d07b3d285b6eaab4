use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hierarchy::error::{HierarchyError, HierarchyResult};
use crate::models::{Entity, EntityId, UnknownVariant};
use crate::store::{HierarchyStore, StoreError};

/// Kinds of licence quota tracked per entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseKind {
    Seat,
    DocumentCredit,
    CertificationCredit,
}

impl LicenseKind {
    pub const ALL: [LicenseKind; 3] = [
        LicenseKind::Seat,
        LicenseKind::DocumentCredit,
        LicenseKind::CertificationCredit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseKind::Seat => "seat",
            LicenseKind::DocumentCredit => "document_credit",
            LicenseKind::CertificationCredit => "certification_credit",
        }
    }

    /// Numeric licence type id used by legacy records
    pub fn legacy_id(&self) -> i32 {
        match self {
            LicenseKind::DocumentCredit => 1,
            LicenseKind::Seat => 4,
            LicenseKind::CertificationCredit => 5,
        }
    }

    pub fn from_legacy_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.legacy_id() == id)
    }
}

impl fmt::Display for LicenseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for LicenseKind {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for LicenseKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == value)
            .ok_or_else(|| UnknownVariant {
                kind: "licence kind",
                value: value.to_string(),
            })
    }
}

/// Where a licence request is drawn from, relative to the subject's local entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerTier {
    Local,
    Parent,
}

const LOCAL_THEN_PARENT: &[LedgerTier] = &[LedgerTier::Local, LedgerTier::Parent];

// Tiers tried in order for each kind; the first tier with enough remaining quota wins
const RESOLUTION_RULES: &[(LicenseKind, &[LedgerTier])] = &[
    (LicenseKind::Seat, LOCAL_THEN_PARENT),
    (LicenseKind::DocumentCredit, LOCAL_THEN_PARENT),
    (LicenseKind::CertificationCredit, LOCAL_THEN_PARENT),
];

fn tiers_for(kind: LicenseKind) -> &'static [LedgerTier] {
    RESOLUTION_RULES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, tiers)| *tiers)
        .unwrap_or(&[])
}

/// One conditional increment of `consumed` on an allotment row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debit {
    pub entity_id: EntityId,
    pub kind: LicenseKind,
    pub quantity: i64,
    pub tier: LedgerTier,
}

/// Requested quantities per licence kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRequest(BTreeMap<LicenseKind, i64>);

impl LicenseRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: LicenseKind, quantity: i64) -> Self {
        *self.0.entry(kind).or_insert(0) += quantity;
        self
    }

    pub fn quantity(&self, kind: LicenseKind) -> i64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LicenseKind, i64)> + '_ {
        self.0.iter().map(|(k, q)| (*k, *q))
    }

    /// Reject negative quantities and drop zeros
    fn normalized(&self) -> HierarchyResult<Vec<(LicenseKind, i64)>> {
        let mut out = Vec::with_capacity(self.0.len());
        for (kind, quantity) in self.iter() {
            if quantity < 0 {
                return Err(HierarchyError::validation(format!(
                    "licence quantity for {} must not be negative",
                    kind
                )));
            }
            if quantity > 0 {
                out.push((kind, quantity));
            }
        }
        Ok(out)
    }
}

/// Outcome of planning: which tier serves each requested kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub local_entity_id: EntityId,
    pub parent_entity_id: Option<EntityId>,
    pub debits: Vec<Debit>,
}

impl Allocation {
    pub fn tier_for(&self, kind: LicenseKind) -> Option<LedgerTier> {
        self.debits.iter().find(|d| d.kind == kind).map(|d| d.tier)
    }

    pub fn is_empty(&self) -> bool {
        self.debits.is_empty()
    }
}

/// Licence quota lookups and debits with local-then-parent fallback
#[derive(Clone)]
pub struct LicenseLedger {
    store: Arc<dyn HierarchyStore>,
}

impl LicenseLedger {
    pub fn new(store: Arc<dyn HierarchyStore>) -> Self {
        Self { store }
    }

    /// Decide, per kind, which tier's allotment will be debited. Writes nothing.
    pub async fn plan(&self, local_entity_id: EntityId, request: &LicenseRequest) -> HierarchyResult<Allocation> {
        let wanted = request.normalized()?;
        let local = self.load_entity(local_entity_id).await?;
        let mut allocation = Allocation {
            local_entity_id,
            parent_entity_id: local.parent_id,
            debits: Vec::with_capacity(wanted.len()),
        };

        for (kind, quantity) in wanted {
            let mut chosen = None;
            for tier in tiers_for(kind) {
                let Some(entity_id) = self.entity_for_tier(&local, *tier) else {
                    continue;
                };
                let allotment = self.store.allotment(entity_id, kind).await?;
                if allotment.is_some_and(|a| a.can_satisfy(quantity)) {
                    chosen = Some(Debit {
                        entity_id,
                        kind,
                        quantity,
                        tier: *tier,
                    });
                    break;
                }
            }

            match chosen {
                Some(debit) => allocation.debits.push(debit),
                None => {
                    tracing::info!(
                        "no {} capacity for {} at entity {} or its parent",
                        kind,
                        quantity,
                        local_entity_id
                    );
                    return Err(HierarchyError::NoLicenseCapacity {
                        kind,
                        requested: quantity,
                    });
                }
            }
        }

        Ok(allocation)
    }

    /// Plan and apply the debits atomically
    pub async fn allocate(&self, local_entity_id: EntityId, request: &LicenseRequest) -> HierarchyResult<Allocation> {
        let allocation = self.plan(local_entity_id, request).await?;
        if allocation.is_empty() {
            return Ok(allocation);
        }
        self.store
            .apply_debits(&allocation.debits)
            .await
            .map_err(|e| capacity_error(e, &allocation.debits))?;
        log_debits(&allocation.debits);
        Ok(allocation)
    }

    fn entity_for_tier(&self, local: &Entity, tier: LedgerTier) -> Option<EntityId> {
        match tier {
            LedgerTier::Local => Some(local.id),
            LedgerTier::Parent => local.parent_id,
        }
    }

    async fn load_entity(&self, id: EntityId) -> HierarchyResult<Entity> {
        self.store
            .entity(id)
            .await?
            .filter(Entity::is_active)
            .ok_or(HierarchyError::NodeNotFound {
                tier: crate::hierarchy::catalog::Tier::Entity,
                id,
            })
    }
}

/// Map a lost race on a conditional debit to the caller-facing capacity error
pub fn capacity_error(err: StoreError, debits: &[Debit]) -> HierarchyError {
    match err {
        StoreError::CapacityExceeded { kind, .. } => HierarchyError::NoLicenseCapacity {
            kind,
            requested: debits
                .iter()
                .filter(|d| d.kind == kind)
                .map(|d| d.quantity)
                .sum(),
        },
        other => HierarchyError::Store(other),
    }
}

pub fn log_debits(debits: &[Debit]) {
    for debit in debits {
        tracing::info!(
            "debited {} {} from entity {} ({:?} tier)",
            debit.quantity,
            debit.kind,
            debit.entity_id,
            debit.tier
        );
    }
}
