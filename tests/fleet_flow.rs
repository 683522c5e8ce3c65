mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn staff_cannot_manage_organizations() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("staffer", "pw", "staff").await?;
    let token = app.login_token("staffer", "pw").await?;

    let response = app
        .post_json("/api/orgs", &json!({ "name": "Camps" }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn org_department_budget_crud() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("mod", "pw", "moderator").await?;
    let token = app.login_token("mod", "pw").await?;

    let response = app
        .post_json("/api/orgs", &json!({ "name": "Camps" }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let org = body_to_json(response.into_body()).await?;
    let org_id = org["id"].as_str().unwrap().to_string();

    let response = app
        .post_json(
            &format!("/api/orgs/{org_id}/departments"),
            &json!({ "num": "210", "name": "Youth" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let department = body_to_json(response.into_body()).await?;
    let department_id = department["id"].as_str().unwrap().to_string();

    // Same number twice in the same org is rejected.
    let response = app
        .post_json(
            &format!("/api/orgs/{org_id}/departments"),
            &json!({ "num": "210", "name": "Duplicate" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            &format!("/api/orgs/{org_id}/budgets"),
            &json!({ "num": "8100", "name": "Travel" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .patch_json(
            &format!("/api/orgs/{org_id}/departments/{department_id}"),
            &json!({ "name": "Youth Ministries" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_to_json(response.into_body()).await?;
    assert_eq!(updated["name"], "Youth Ministries");

    let response = app
        .get(&format!("/api/orgs/{org_id}"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_to_json(response.into_body()).await?;
    assert_eq!(detail["departments"].as_array().unwrap().len(), 1);
    assert_eq!(detail["budgets"].as_array().unwrap().len(), 1);

    let response = app
        .delete(
            &format!("/api/orgs/{org_id}/departments/{department_id}"),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn org_cannot_be_renamed_to_an_existing_name() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("mod", "pw", "moderator").await?;
    let token = app.login_token("mod", "pw").await?;

    let response = app
        .post_json("/api/orgs", &json!({ "name": "Camps" }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json("/api/orgs", &json!({ "name": "Retreats" }), Some(&token))
        .await?;
    let org = body_to_json(response.into_body()).await?;
    let org_id = org["id"].as_str().unwrap().to_string();

    let response = app
        .patch_json(
            &format!("/api/orgs/{org_id}"),
            &json!({ "name": "Camps" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn dropdown_loaders_filter_by_org() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("staffer", "pw", "staff").await?;
    let token = app.login_token("staffer", "pw").await?;

    let first = app.seed_fleet().await?;
    let second = app.seed_fleet().await?;

    let response = app
        .get(
            &format!("/api/departments?orgs={}", first.org_id),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let departments = body_to_json(response.into_body()).await?;
    let departments = departments.as_array().unwrap();
    assert_eq!(departments.len(), 1);
    assert_eq!(
        departments[0]["org_id"].as_str().unwrap(),
        first.org_id.to_string()
    );

    let response = app
        .get(
            &format!("/api/budgets?orgs={},{}", first.org_id, second.org_id),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let budgets = body_to_json(response.into_body()).await?;
    assert_eq!(budgets.as_array().unwrap().len(), 2);

    // No orgs selected means an empty dropdown, not an error.
    let response = app.get("/api/departments", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let empty = body_to_json(response.into_body()).await?;
    assert_eq!(empty.as_array().unwrap().len(), 0);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn org_in_use_by_requests_cannot_be_deleted() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("staffer", "pw", "staff").await?;
    app.insert_user("mod", "pw", "moderator").await?;
    let staff_token = app.login_token("staffer", "pw").await?;
    let mod_token = app.login_token("mod", "pw").await?;

    let fleet = app.seed_fleet().await?;
    let response = app
        .post_json(
            "/api/requests",
            &json!({
                "org_id": fleet.org_id,
                "department_id": fleet.department_id,
                "budget_id": fleet.budget_id,
                "contact_first_name": "Avery",
                "contact_last_name": "Banks",
                "contact_phone": "555-0100",
                "contact_email": "avery@portal.test",
                "vehicle_type": "passenger_van",
                "party_count": 8,
                "depart_est": "2026-09-01T08:00:00Z",
                "return_est": "2026-09-01T18:00:00Z",
                "destination": "Lake Retreat",
                "purpose": "Youth trip",
                "agreement_accepted": true,
                "mileage_est": 90
            }),
            Some(&staff_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .delete(&format!("/api/orgs/{}", fleet.org_id), Some(&mod_token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}
