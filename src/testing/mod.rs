use std::sync::Arc;

use chrono::Utc;

use crate::config::ProvisioningConfig;
use crate::hierarchy::catalog::{HierarchyCatalog, Level};
use crate::hierarchy::chain::AncestorChainResolver;
use crate::hierarchy::events::BroadcastSink;
use crate::hierarchy::gate::AuthorizationGate;
use crate::hierarchy::ledger::{LicenseKind, LicenseLedger};
use crate::hierarchy::provisioner::HierarchyProvisioner;
use crate::models::{EntityId, NewDivision, NewEntity, NewUser, NodeRef, UserId};
use crate::store::{HierarchyStore, InMemoryStore, LicenseGrant};

/// A seeded seven-level hierarchy on the in-memory store:
///
/// ```text
/// Platform (7)
/// └── State University (6)
///     ├── North College (5)
///     │   ├── Engineering (4) ── B.Tech (3) ── Semester 1 (2) ── Section A (1)
///     │   └── Grade 10 (3, subtree root with no parent division)
///     └── South College (5)
/// ```
pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub platform: EntityId,
    pub university: EntityId,
    pub college: EntityId,
    pub sister_college: EntityId,
    pub department: i64,
    pub degree: i64,
    pub semester: i64,
    pub section: i64,
    pub orphan_grade: i64,
}

impl Fixture {
    pub async fn standard() -> Self {
        let store = Arc::new(InMemoryStore::new());

        let platform = entity(&store, "Platform", "Platform", 7, None, 10_000).await;
        let university = entity(&store, "State University", "University", 6, Some(platform), 100).await;
        let college = entity(&store, "North College", "College", 5, Some(university), 100).await;
        let sister_college = entity(&store, "South College", "College", 5, Some(university), 10).await;

        let department = division(&store, "Engineering", "Department", 4, college, None).await;
        let degree = division(&store, "B.Tech", "Degree", 3, college, Some(department)).await;
        let semester = division(&store, "Semester 1", "Semester", 2, college, Some(degree)).await;
        let section = division(&store, "Section A", "Section", 1, college, Some(semester)).await;
        let orphan_grade = division(&store, "Grade 10", "Grade", 3, college, None).await;

        Self {
            store,
            platform,
            university,
            college,
            sister_college,
            department,
            degree,
            semester,
            section,
            orphan_grade,
        }
    }

    pub fn resolver(&self) -> AncestorChainResolver {
        AncestorChainResolver::new(self.store.clone())
    }

    pub fn gate(&self) -> AuthorizationGate {
        AuthorizationGate::new(self.store.clone(), Arc::new(HierarchyCatalog::standard()))
    }

    pub fn ledger(&self) -> LicenseLedger {
        LicenseLedger::new(self.store.clone())
    }

    pub fn provisioner(&self) -> HierarchyProvisioner {
        HierarchyProvisioner::new(
            self.store.clone(),
            Arc::new(HierarchyCatalog::standard()),
            Arc::new(BroadcastSink::default()),
            ProvisioningConfig::default(),
        )
    }

    pub async fn set_allotment(&self, entity_id: EntityId, kind: LicenseKind, granted: i64, consumed: i64) {
        self.store.seed_allotment(entity_id, kind, granted, consumed).await;
    }

    pub async fn consumed(&self, entity_id: EntityId, kind: LicenseKind) -> i64 {
        self.store
            .allotment(entity_id, kind)
            .await
            .unwrap()
            .map(|a| a.consumed)
            .unwrap_or(0)
    }

    /// Insert a user placed at an entity, bypassing licences
    pub async fn add_user(&self, email: &str, user_type: i32, entity_id: EntityId) -> UserId {
        let chain = self.resolver().resolve_node(NodeRef::Entity(entity_id)).await.unwrap();
        let user = NewUser {
            name: email.to_string(),
            email: email.to_string(),
            mobile: None,
            password_hash: String::new(),
            user_type,
            renewal_date: Utc::now(),
        };
        self.store
            .insert_user(user, &chain.to_assignment(), &[])
            .await
            .unwrap()
            .id
    }
}

async fn entity(
    store: &InMemoryStore,
    name: &str,
    entity_type: &str,
    level: i64,
    parent_id: Option<EntityId>,
    seats: i64,
) -> EntityId {
    let grants: Vec<LicenseGrant> = [
        (LicenseKind::Seat, seats),
        (LicenseKind::DocumentCredit, seats * 10),
        (LicenseKind::CertificationCredit, seats),
    ]
    .into_iter()
    .map(|(kind, quantity)| LicenseGrant {
        entity_id: 0,
        kind,
        quantity,
        valid_till: None,
    })
    .collect();

    store
        .insert_entity(
            NewEntity {
                name: name.to_string(),
                entity_type: entity_type.to_string(),
                level: Level::new(level).unwrap(),
                parent_id,
                contact_name: None,
                contact_email: None,
                contact_mobile: None,
                logo_path: None,
            },
            &grants,
            &[],
        )
        .await
        .unwrap()
        .id
}

async fn division(
    store: &InMemoryStore,
    name: &str,
    division_type: &str,
    level: i64,
    entity_id: EntityId,
    parent_division_id: Option<i64>,
) -> i64 {
    store
        .insert_division(NewDivision {
            name: name.to_string(),
            division_type: division_type.to_string(),
            level: Level::new(level).unwrap(),
            entity_id,
            parent_division_id,
            contact_name: None,
            contact_email: None,
            contact_mobile: None,
        })
        .await
        .unwrap()
        .id
}
