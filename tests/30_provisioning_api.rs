mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use common::{token_for, TestApp, COLLEGE_ADMIN, DEPARTMENT_ADMIN, ROOT_ADMIN, SECTION_ADMIN, UNIVERSITY_ADMIN};
use serde_json::{json, Value};

fn user_body(email: &str, target: Value) -> Value {
    json!({
        "name": "Ada Student",
        "email": email,
        "password": "s3cret",
        "target": target,
        "document_credits": 3
    })
}

#[tokio::test]
async fn creating_a_user_consumes_a_local_seat() -> Result<()> {
    let app = TestApp::seeded().await?;
    let token = token_for(COLLEGE_ADMIN);

    let (status, body) = app
        .post(
            "/api/user",
            &token,
            user_body("ada@example.org", json!({ "tier": "division", "id": app.section })),
        )
        .await?;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["outcome"], "created");
    let slots = &body["data"]["user"]["assignment"]["slots"];
    assert_eq!(slots[0], json!(app.section));
    assert_eq!(slots[4], json!(app.college));
    assert_eq!(app.seats_consumed(app.college).await?, 1);
    assert_eq!(app.seats_consumed(app.university).await?, 20);
    Ok(())
}

#[tokio::test]
async fn repeated_email_under_the_same_entity_is_rehomed() -> Result<()> {
    let app = TestApp::seeded().await?;
    let token = token_for(COLLEGE_ADMIN);

    let (status, _) = app
        .post(
            "/api/user",
            &token,
            user_body("ada@example.org", json!({ "tier": "division", "id": app.section })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post(
            "/api/user",
            &token,
            user_body("ADA@example.org", json!({ "tier": "division", "id": app.department })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["outcome"], "rehomed");
    assert_eq!(body["data"]["user"]["assignment"]["slots"][0], json!(null));
    assert_eq!(body["data"]["user"]["assignment"]["slots"][3], json!(app.department));
    assert_eq!(app.seats_consumed(app.college).await?, 1);
    Ok(())
}

#[tokio::test]
async fn email_placed_under_another_entity_conflicts() -> Result<()> {
    let app = TestApp::seeded().await?;
    let token = token_for(UNIVERSITY_ADMIN);

    let (status, _) = app
        .post(
            "/api/user",
            &token,
            user_body("ada@example.org", json!({ "tier": "entity", "id": app.university })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post(
            "/api/user",
            &token,
            user_body("ada@example.org", json!({ "tier": "division", "id": app.section })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    Ok(())
}

#[tokio::test]
async fn low_level_admins_cannot_place_above_themselves() -> Result<()> {
    let app = TestApp::seeded().await?;

    let (status, _) = app
        .post(
            "/api/user",
            &token_for(SECTION_ADMIN),
            user_body("bob@example.org", json!({ "tier": "entity", "id": app.college })),
        )
        .await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.seats_consumed(app.college).await?, 0);
    Ok(())
}

#[tokio::test]
async fn entity_creation_carves_seats_from_the_parent() -> Result<()> {
    let app = TestApp::seeded().await?;

    let (status, body) = app
        .post(
            "/api/entity",
            &token_for(UNIVERSITY_ADMIN),
            json!({
                "tier": "entity",
                "name": "South College",
                "entity_type": "College",
                "parent_id": app.university,
                "seats": 30
            }),
        )
        .await?;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["tier"], "entity");
    assert_eq!(body["data"]["node"]["level"], 5);
    assert_eq!(app.seats_consumed(app.university).await?, 50);

    let (status, _) = app
        .post(
            "/api/entity",
            &token_for(UNIVERSITY_ADMIN),
            json!({
                "tier": "entity",
                "name": "Huge College",
                "entity_type": "College",
                "parent_id": app.university,
                "seats": 51
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.seats_consumed(app.university).await?, 50);
    Ok(())
}

#[tokio::test]
async fn divisions_are_created_and_renamed() -> Result<()> {
    let app = TestApp::seeded().await?;
    let token = token_for(COLLEGE_ADMIN);

    let (status, body) = app
        .post(
            "/api/entity",
            &token,
            json!({
                "tier": "division",
                "name": "B.Tech",
                "division_type": "Degree",
                "entity_id": app.college,
                "parent_division_id": app.department
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let degree = body["data"]["node"]["id"].as_i64().unwrap_or_default();
    assert_eq!(body["data"]["node"]["level"], 3);

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/entity",
            Some(&token),
            Some(json!({ "node": { "tier": "division", "id": degree }, "name": "B.Tech (Hons)" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app
        .send(
            Method::PATCH,
            "/api/entity",
            Some(&token),
            Some(json!({ "node": { "tier": "division", "id": degree } })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn deleting_a_division_cascades_to_its_users() -> Result<()> {
    let app = TestApp::seeded().await?;
    let token = token_for(COLLEGE_ADMIN);

    let (_, body) = app
        .post(
            "/api/user",
            &token,
            user_body("ada@example.org", json!({ "tier": "division", "id": app.section })),
        )
        .await?;
    let user_id = body["data"]["user"]["id"].as_i64().unwrap_or_default();

    let (status, body) = app
        .send(
            Method::DELETE,
            "/api/entity",
            Some(&token),
            Some(json!({ "node": { "tier": "division", "id": app.department } })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["divisions"], 2);
    assert_eq!(body["data"]["users"], 1);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/user/placement",
            Some(&token),
            Some(json!({ "user_id": user_id, "target": { "tier": "entity", "id": app.college } })),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn users_are_moved_updated_and_deleted() -> Result<()> {
    let app = TestApp::seeded().await?;
    let token = token_for(COLLEGE_ADMIN);

    let (_, body) = app
        .post(
            "/api/user",
            &token,
            user_body("ada@example.org", json!({ "tier": "division", "id": app.section })),
        )
        .await?;
    let user_id = body["data"]["user"]["id"].as_i64().unwrap_or_default();

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/user/placement",
            Some(&token),
            Some(json!({ "user_id": user_id, "target": { "tier": "entity", "id": app.college } })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["assignment"]["slots"][0], json!(null));
    assert_eq!(body["data"]["assignment"]["slots"][4], json!(app.college));

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/user",
            Some(&token),
            Some(json!({ "user_id": user_id, "name": "Ada Lovelace", "admin": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["name"], "Ada Lovelace");
    assert_eq!(body["data"]["user_type"], COLLEGE_ADMIN);

    let (status, _) = app
        .send(Method::DELETE, "/api/user", Some(&token_for(DEPARTMENT_ADMIN)), Some(json!({ "user_id": user_id })))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::DELETE, "/api/user", Some(&token), Some(json!({ "user_id": user_id })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn bulk_import_reports_each_row() -> Result<()> {
    let app = TestApp::seeded().await?;
    let section = json!({ "tier": "division", "id": app.section });

    let (status, body) = app
        .post(
            "/api/user/bulk",
            &token_for(ROOT_ADMIN),
            json!({
                "users": [
                    user_body("one@example.org", section.clone()),
                    user_body("not-an-email", section.clone()),
                    user_body("two@example.org", section.clone()),
                ]
            }),
        )
        .await?;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["created"], 2);
    assert_eq!(body["data"]["failed"], 1);
    assert_eq!(body["data"]["rows"][1]["status"], "invalid_email");
    assert_eq!(app.seats_consumed(app.college).await?, 2);
    Ok(())
}

#[tokio::test]
async fn logo_on_a_division_is_refused_before_any_rename() -> Result<()> {
    let app = TestApp::seeded().await?;
    let token = token_for(COLLEGE_ADMIN);

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/entity",
            Some(&token),
            Some(json!({
                "node": { "tier": "division", "id": app.department },
                "name": "Applied Engineering",
                "logo_path": "/logos/engineering.png"
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let department = app.hierarchy.store.division(app.department).await?;
    assert_eq!(department.map(|d| d.name).as_deref(), Some("Engineering"));
    Ok(())
}

#[tokio::test]
async fn expiry_moves_for_a_user_and_for_an_entity() -> Result<()> {
    let app = TestApp::seeded().await?;
    let token = token_for(COLLEGE_ADMIN);

    let (status, body) = app
        .post(
            "/api/user",
            &token,
            user_body("ada@example.org", json!({ "tier": "division", "id": app.section })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let ada = body["data"]["user"]["id"].as_i64().unwrap_or_default();

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/expiry",
            Some(&token),
            Some(json!({ "target": { "kind": "user", "id": ada }, "expires_on": "2027-06-30" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["users"], 1);
    let user = app.hierarchy.store.user(ada).await?;
    let renewal = user.and_then(|u| u.renewal_date).map(|d| d.date_naive().to_string());
    assert_eq!(renewal.as_deref(), Some("2027-06-30"));

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/expiry",
            Some(&token),
            Some(json!({ "target": { "kind": "entity", "id": app.college }, "expires_on": "2028-01-31" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["users"], 1);
    for allotment in app.hierarchy.store.allotments(app.college).await? {
        let valid_till = allotment.valid_till.map(|d| d.date_naive().to_string());
        assert_eq!(valid_till.as_deref(), Some("2028-01-31"));
    }

    // The college admin cannot move the university's expiry
    let (status, _) = app
        .send(
            Method::PATCH,
            "/api/expiry",
            Some(&token),
            Some(json!({ "target": { "kind": "entity", "id": app.university }, "expires_on": "2028-01-31" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}
