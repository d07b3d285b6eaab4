#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use forge_admin_rust::app::{app, AppState};
use forge_admin_rust::auth::{generate_jwt, Claims};
use forge_admin_rust::config::ProvisioningConfig;
use forge_admin_rust::hierarchy::catalog::PLATFORM_ROOT_USER_TYPE;
use forge_admin_rust::hierarchy::provisioner::{DivisionRequest, EntityRequest};
use forge_admin_rust::hierarchy::{BroadcastSink, Hierarchy, HierarchyCatalog, Requester};
use forge_admin_rust::store::{HierarchyStore, InMemoryStore};

pub const ROOT_ADMIN: i32 = PLATFORM_ROOT_USER_TYPE;
pub const UNIVERSITY_ADMIN: i32 = 3;
pub const COLLEGE_ADMIN: i32 = 6;
pub const DEPARTMENT_ADMIN: i32 = 9;
pub const SECTION_ADMIN: i32 = 17;
pub const INDIVIDUAL: i32 = 1;

/// In-process app over a seeded in-memory hierarchy
pub struct TestApp {
    pub router: Router,
    pub hierarchy: Hierarchy,
    pub events: Arc<BroadcastSink>,
    pub platform: i64,
    pub university: i64,
    pub college: i64,
    pub department: i64,
    pub section: i64,
}

impl TestApp {
    /// Platform (1000 seats) > University (100) > College (20) > Department > Section
    pub async fn seeded() -> Result<Self> {
        let store: Arc<dyn HierarchyStore> = Arc::new(InMemoryStore::new());
        let events = Arc::new(BroadcastSink::default());
        let hierarchy = Hierarchy::new(
            store,
            HierarchyCatalog::standard(),
            events.clone(),
            ProvisioningConfig::default(),
        );

        let root = Requester {
            user_id: 0,
            user_type: ROOT_ADMIN,
        };
        let provisioner = &hierarchy.provisioner;
        let platform = provisioner.provision_entity(&root, entity("Platform", "Platform", None, 1000)).await?;
        let university = provisioner
            .provision_entity(&root, entity("State University", "University", Some(platform.id), 100))
            .await?;
        let college = provisioner
            .provision_entity(&root, entity("North College", "College", Some(university.id), 20))
            .await?;
        let department = provisioner
            .provision_division(&root, division("Engineering", "Department", college.id, None))
            .await?;
        let section = provisioner
            .provision_division(&root, division("Section A", "Section", college.id, Some(department.id)))
            .await?;

        Ok(Self {
            router: app(AppState::new(hierarchy.clone(), false)),
            hierarchy,
            events,
            platform: platform.id,
            university: university.id,
            college: college.id,
            department: department.id,
            section: section.id,
        })
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, json))
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn seats_consumed(&self, entity_id: i64) -> Result<i64> {
        let allotments = self.hierarchy.store.allotments(entity_id).await?;
        Ok(allotments
            .iter()
            .find(|a| a.kind.as_str() == "seat")
            .map(|a| a.consumed)
            .unwrap_or(0))
    }
}

/// Mint a bearer token for a caller of the given user type
pub fn token_for(user_type: i32) -> String {
    let claims = Claims::new(1000 + user_type as i64, format!("admin{}@example.org", user_type), user_type);
    generate_jwt(&claims).expect("development secret is configured")
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
