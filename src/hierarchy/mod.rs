//! Hierarchy core: level catalog, ancestor chains, authorization, licence ledger and provisioning.

pub mod catalog;
pub mod chain;
pub mod error;
pub mod events;
pub mod gate;
pub mod ledger;
pub mod provisioner;

use std::sync::Arc;

pub use catalog::{HierarchyCatalog, Level, Tier};
pub use chain::{AncestorChain, AncestorChainResolver, ChainLink, LevelAssignment};
pub use error::{HierarchyError, HierarchyResult};
pub use events::{BroadcastSink, EventSink, ProvisionEvent, ProvisionEventKind};
pub use gate::{AuthorizationDecision, AuthorizationGate, Requester, TargetSpec};
pub use ledger::{Allocation, LedgerTier, LicenseKind, LicenseLedger, LicenseRequest};
pub use provisioner::HierarchyProvisioner;

use crate::config::ProvisioningConfig;
use crate::store::HierarchyStore;

/// All hierarchy services wired to one store
#[derive(Clone)]
pub struct Hierarchy {
    pub store: Arc<dyn HierarchyStore>,
    pub catalog: Arc<HierarchyCatalog>,
    pub resolver: AncestorChainResolver,
    pub gate: AuthorizationGate,
    pub ledger: LicenseLedger,
    pub provisioner: HierarchyProvisioner,
}

impl Hierarchy {
    pub fn new(
        store: Arc<dyn HierarchyStore>,
        catalog: HierarchyCatalog,
        events: Arc<dyn EventSink>,
        settings: ProvisioningConfig,
    ) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            resolver: AncestorChainResolver::new(store.clone()),
            gate: AuthorizationGate::new(store.clone(), catalog.clone()),
            ledger: LicenseLedger::new(store.clone()),
            provisioner: HierarchyProvisioner::new(store.clone(), catalog.clone(), events, settings),
            store,
            catalog,
        }
    }

    /// Build with the user type table read from the store
    pub async fn load(
        store: Arc<dyn HierarchyStore>,
        events: Arc<dyn EventSink>,
        settings: ProvisioningConfig,
    ) -> HierarchyResult<Self> {
        let user_types = store.user_types().await?;
        let catalog = if user_types.is_empty() {
            tracing::warn!("user_type table is empty, falling back to the standard catalog");
            HierarchyCatalog::standard()
        } else {
            HierarchyCatalog::standard().with_user_types(user_types)
        };
        Ok(Self::new(store, catalog, events, settings))
    }
}
