mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{token_for, TestApp, COLLEGE_ADMIN, DEPARTMENT_ADMIN, SECTION_ADMIN, UNIVERSITY_ADMIN};
use serde_json::json;

#[tokio::test]
async fn chain_of_a_section_climbs_to_the_platform() -> Result<()> {
    let app = TestApp::seeded().await?;
    let uri = format!("/api/hierarchy/chain?level=1&id={}", app.section);

    let (status, body) = app.get(&uri, &token_for(COLLEGE_ADMIN)).await?;

    assert_eq!(status, StatusCode::OK, "{body}");
    let links = body["data"]["chain"]["links"].as_array().cloned().unwrap_or_default();
    let levels: Vec<i64> = links.iter().filter_map(|l| l["level"].as_i64()).collect();
    let ids: Vec<i64> = links.iter().filter_map(|l| l["id"].as_i64()).collect();
    assert_eq!(levels, vec![1, 4, 5, 6, 7]);
    assert_eq!(ids, vec![app.section, app.department, app.college, app.university, app.platform]);

    let slots = &body["data"]["assignment"]["slots"];
    assert_eq!(slots[0], json!(app.section));
    assert_eq!(slots[1], json!(null));
    assert_eq!(slots[6], json!(app.platform));
    Ok(())
}

#[tokio::test]
async fn chain_rejects_a_level_mismatch() -> Result<()> {
    let app = TestApp::seeded().await?;
    let uri = format!("/api/hierarchy/chain?level=9&id={}", app.section);

    let (status, _) = app.get(&uri, &token_for(COLLEGE_ADMIN)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn authorize_compares_levels() -> Result<()> {
    let app = TestApp::seeded().await?;

    let (status, body) = app
        .post(
            "/api/authorize",
            &token_for(COLLEGE_ADMIN),
            json!({ "level": 4, "division_id": app.department }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["requester_level"], 5);
    assert_eq!(body["data"]["target_level"], 4);

    let (status, body) = app
        .post(
            "/api/authorize",
            &token_for(DEPARTMENT_ADMIN),
            json!({ "entity_id": app.university }),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn authorize_without_target_is_a_bad_request() -> Result<()> {
    let app = TestApp::seeded().await?;

    let (status, _) = app
        .post(
            "/api/authorize",
            &token_for(UNIVERSITY_ADMIN),
            json!({ "level": 0, "entity_id": 0 }),
        )
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn licences_are_listed_for_admins_above_the_entity() -> Result<()> {
    let app = TestApp::seeded().await?;
    let uri = format!("/api/entity/{}/licences", app.college);

    let (status, body) = app.get(&uri, &token_for(UNIVERSITY_ADMIN)).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    let seats = body["data"]["allotments"]
        .as_array()
        .and_then(|rows| rows.iter().find(|row| row["kind"] == "seat").cloned())
        .unwrap_or_default();
    assert_eq!(seats["granted"], 20);
    assert_eq!(seats["consumed"], 0);

    let (status, _) = app.get(&uri, &token_for(SECTION_ADMIN)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/entity/999999/licences", &token_for(UNIVERSITY_ADMIN)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
