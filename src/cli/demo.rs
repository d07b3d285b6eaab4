//! In-memory walkthrough: builds a small hierarchy through the provisioner and prints what it produced.

use std::sync::Arc;

use serde_json::json;

use crate::cli::{output, OutputFormat};
use crate::config::ProvisioningConfig;
use crate::hierarchy::provisioner::{DivisionRequest, EntityRequest, UserRequest};
use crate::hierarchy::catalog::PLATFORM_ROOT_USER_TYPE;
use crate::hierarchy::{BroadcastSink, Hierarchy, HierarchyCatalog, Requester};
use crate::models::NodeRef;
use crate::store::{HierarchyStore, InMemoryStore};

pub async fn run(output_format: &OutputFormat) -> anyhow::Result<()> {
    let store: Arc<dyn HierarchyStore> = Arc::new(InMemoryStore::new());
    let hierarchy = Hierarchy::new(
        store,
        HierarchyCatalog::standard(),
        Arc::new(BroadcastSink::default()),
        ProvisioningConfig::default(),
    );
    let provisioner = &hierarchy.provisioner;
    let root = Requester {
        user_id: 0,
        user_type: PLATFORM_ROOT_USER_TYPE,
    };

    let platform = provisioner.provision_entity(&root, entity("Platform", "Platform", None, 1000)).await?;
    let university = provisioner
        .provision_entity(&root, entity("Demo University", "University", Some(platform.id), 200))
        .await?;
    let college = provisioner
        .provision_entity(&root, entity("Demo College", "College", Some(university.id), 50))
        .await?;
    let department = provisioner
        .provision_division(&root, division("Computer Science", "Department", college.id, None))
        .await?;
    let section = provisioner
        .provision_division(&root, division("Section A", "Section", college.id, Some(department.id)))
        .await?;

    let outcome = provisioner
        .provision_user(
            &root,
            UserRequest {
                name: "Demo Student".to_string(),
                email: "student@demo.example".to_string(),
                mobile: None,
                password: "demo-password".to_string(),
                user_type: None,
                target: NodeRef::Division(section.id),
                document_credits: 5,
                certification_credits: 1,
            },
        )
        .await?;

    let chain = hierarchy.resolver.resolve_node(NodeRef::Division(section.id)).await?;
    output::output_success(
        output_format,
        &format!("Placed user {} under section {}", outcome.user().id, section.id),
        Some(json!({ "user": outcome.user() })),
    )?;
    output::output_chain(output_format, &chain)?;

    for entity_id in [college.id, university.id] {
        let allotments = hierarchy.store.allotments(entity_id).await?;
        output::output_allotments(output_format, entity_id, &allotments)?;
    }
    Ok(())
}

fn entity(name: &str, entity_type: &str, parent_id: Option<i64>, seats: i64) -> EntityRequest {
    EntityRequest {
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        parent_id,
        seats,
        contact_name: None,
        contact_email: None,
        contact_mobile: None,
        logo_path: None,
    }
}

fn division(name: &str, division_type: &str, entity_id: i64, parent_division_id: Option<i64>) -> DivisionRequest {
    DivisionRequest {
        name: name.to_string(),
        division_type: division_type.to_string(),
        entity_id,
        parent_division_id,
        contact_name: None,
        contact_email: None,
        contact_mobile: None,
    }
}
