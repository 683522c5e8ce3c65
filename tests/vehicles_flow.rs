mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn vehicle_crud_writes_activity() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("mod", "pw", "moderator").await?;
    let token = app.login_token("mod", "pw").await?;
    let fleet = app.seed_fleet().await?;

    let response = app
        .post_json(
            "/api/vehicles",
            &json!({
                "org_id": fleet.org_id,
                "num": 12,
                "vehicle_type": "passenger_van",
                "year": 2019,
                "make": "Ford",
                "model": "Transit",
                "reg_expire_date": "2027-01-01",
                "mileage": 1000
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let vehicle = body_to_json(response.into_body()).await?;
    let vehicle_id = vehicle["id"].as_str().unwrap().to_string();
    assert_eq!(vehicle["status"], "active");

    let response = app
        .patch_json(
            &format!("/api/vehicles/{vehicle_id}"),
            &json!({ "storage_location": "North Lot" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .get(&format!("/api/vehicles/{vehicle_id}/activity"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let activity = body_to_json(response.into_body()).await?;
    let events: Vec<&str> = activity
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["event"].as_str().unwrap())
        .collect();
    assert_eq!(events, vec!["created", "edited"]);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn list_filters_by_type_and_org() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("mod", "pw", "moderator").await?;
    let token = app.login_token("mod", "pw").await?;
    let fleet = app.seed_fleet().await?;

    app.seed_vehicle(fleet.org_id, 1, 100).await?;
    app.seed_vehicle(fleet.org_id, 2, 200).await?;

    let response = app
        .get(
            &format!("/api/vehicles?org={}&type=passenger_van", fleet.org_id),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_to_json(response.into_body()).await?;
    assert_eq!(listed.as_array().unwrap().len(), 2);

    let response = app.get("/api/vehicles?type=bus", Some(&token)).await?;
    let listed = body_to_json(response.into_body()).await?;
    assert_eq!(listed.as_array().unwrap().len(), 0);

    let response = app.get("/api/vehicles?type=warpdrive", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn maintenance_moves_the_odometer_forward_only() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("mod", "pw", "moderator").await?;
    let token = app.login_token("mod", "pw").await?;
    let fleet = app.seed_fleet().await?;
    let vehicle_id = app.seed_vehicle(fleet.org_id, 12, 1000).await?;

    let response = app
        .post_json(
            &format!("/api/vehicles/{vehicle_id}/maintenance"),
            &json!({
                "date": "2026-08-01",
                "category": "engine",
                "cost": "230.00",
                "mileage": 1500,
                "notes": "oil and filter"
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let record = body_to_json(response.into_body()).await?;
    let maintenance_id = record["id"].as_str().unwrap().to_string();

    let response = app
        .get(&format!("/api/vehicles/{vehicle_id}"), Some(&token))
        .await?;
    let vehicle = body_to_json(response.into_body()).await?;
    assert_eq!(vehicle["mileage"], 1500);

    // A record with an older reading never lowers the odometer.
    let response = app
        .post_json(
            &format!("/api/vehicles/{vehicle_id}/maintenance"),
            &json!({
                "date": "2026-07-01",
                "category": "inspection",
                "cost": "45.00",
                "mileage": 1200
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .get(&format!("/api/vehicles/{vehicle_id}"), Some(&token))
        .await?;
    let vehicle = body_to_json(response.into_body()).await?;
    assert_eq!(vehicle["mileage"], 1500);

    let response = app
        .patch_json(
            &format!("/api/vehicles/{vehicle_id}/maintenance/{maintenance_id}"),
            &json!({ "mileage": 1600 }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .get(&format!("/api/vehicles/{vehicle_id}"), Some(&token))
        .await?;
    let vehicle = body_to_json(response.into_body()).await?;
    assert_eq!(vehicle["mileage"], 1600);

    let response = app
        .delete(
            &format!("/api/vehicles/{vehicle_id}/maintenance/{maintenance_id}"),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .get(&format!("/api/vehicles/{vehicle_id}/activity"), Some(&token))
        .await?;
    let activity = body_to_json(response.into_body()).await?;
    let events: Vec<&str> = activity
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["event"].as_str().unwrap())
        .collect();
    assert_eq!(
        events,
        vec![
            "maintenance_created",
            "maintenance_created",
            "maintenance_edited",
            "maintenance_deleted"
        ]
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn vehicle_mileage_cannot_be_lowered_by_edit() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("mod", "pw", "moderator").await?;
    let token = app.login_token("mod", "pw").await?;
    let fleet = app.seed_fleet().await?;
    let vehicle_id = app.seed_vehicle(fleet.org_id, 12, 1000).await?;

    let response = app
        .patch_json(
            &format!("/api/vehicles/{vehicle_id}"),
            &json!({ "mileage": 900 }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn referenced_vehicle_cannot_be_deleted() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("staffer", "pw", "staff").await?;
    app.insert_user("mod", "pw", "moderator").await?;
    let staff_token = app.login_token("staffer", "pw").await?;
    let mod_token = app.login_token("mod", "pw").await?;

    let fleet = app.seed_fleet().await?;
    let vehicle_id = app.seed_vehicle(fleet.org_id, 12, 1000).await?;

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
    let created = body_to_json(response.into_body()).await?;
    let request_id = created["id"].as_str().unwrap().to_string();

    app.patch_json(
        &format!("/api/requests/{request_id}"),
        &json!({ "vehicle_id": vehicle_id }),
        Some(&mod_token),
    )
    .await?;

    let response = app
        .delete(&format!("/api/vehicles/{vehicle_id}"), Some(&mod_token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}
