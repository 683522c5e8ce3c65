use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::{dsl::count_star, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{AuthenticatedUser, Moderator},
    domain::{DriverStatus, TripStatus},
    error::{AppError, AppResult},
    models::{Driver, NewDriver, NewDriverOrganization},
    schema::{driver_organizations, drivers, trip_requests},
    state::AppState,
};

use super::requests::{to_iso, RequestSummary};

#[derive(Serialize)]
pub struct DriverSummary {
    pub id: Uuid,
    pub status: DriverStatus,
    pub first_name: String,
    pub last_name: String,
    pub license_num: Option<String>,
    pub license_expires: Option<NaiveDate>,
    pub birth_date: Option<NaiveDate>,
    pub state: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub restrictions: Option<String>,
    pub has_cdl: bool,
    pub notes: String,
    pub org_ids: Vec<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct DriverDetail {
    #[serde(flatten)]
    pub driver: DriverSummary,
    pub assigned_trips: Vec<RequestSummary>,
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub status: Option<DriverStatus>,
    #[serde(default)]
    pub license_num: Option<String>,
    #[serde(default)]
    pub license_expires: Option<NaiveDate>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub restrictions: Option<String>,
    #[serde(default)]
    pub has_cdl: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub org_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateDriverRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<DriverStatus>,
    pub license_num: Option<Option<String>>,
    pub license_expires: Option<Option<NaiveDate>>,
    pub birth_date: Option<Option<NaiveDate>>,
    pub state: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub restrictions: Option<Option<String>>,
    pub has_cdl: Option<bool>,
    pub notes: Option<String>,
    pub org_ids: Option<Vec<Uuid>>,
}

#[derive(Deserialize)]
pub struct DriverFilter {
    pub status: Option<String>,
    pub has_cdl: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct DriverMatch {
    pub id: Uuid,
    pub full_name: String,
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub driver_id: Uuid,
    pub available: bool,
    pub conflicting_trips: i64,
}

pub async fn list_drivers(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Query(filter): Query<DriverFilter>,
) -> AppResult<Json<Vec<DriverSummary>>> {
    let mut conn = state.db()?;

    let mut query = drivers::table.into_boxed();
    if let Some(ref status) = filter.status {
        let status = DriverStatus::parse(status)
            .ok_or_else(|| AppError::bad_request("unknown driver status"))?;
        query = query.filter(drivers::status.eq(status.as_str()));
    }
    if let Some(has_cdl) = filter.has_cdl {
        query = query.filter(drivers::has_cdl.eq(has_cdl));
    }
    if let Some(ref first_name) = filter.first_name {
        query = query.filter(drivers::first_name.ilike(format!("{}%", escape_like(first_name))));
    }
    if let Some(ref last_name) = filter.last_name {
        query = query.filter(drivers::last_name.ilike(format!("{}%", escape_like(last_name))));
    }

    let rows: Vec<Driver> = query
        .order((drivers::last_name.asc(), drivers::first_name.asc()))
        .load(&mut conn)?;

    let mut response = Vec::with_capacity(rows.len());
    for driver in rows {
        let org_ids = load_org_ids(&mut conn, driver.id)?;
        response.push(driver_summary(driver, org_ids)?);
    }
    Ok(Json(response))
}

pub async fn create_driver(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Json(payload): Json<CreateDriverRequest>,
) -> AppResult<Json<DriverSummary>> {
    let first_name = payload.first_name.trim();
    let last_name = payload.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::bad_request("driver name must not be empty"));
    }

    let mut conn = state.db()?;
    let new_driver = NewDriver {
        id: Uuid::new_v4(),
        status: payload.status.unwrap_or(DriverStatus::Active).as_str().to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        license_num: payload.license_num,
        license_expires: payload.license_expires,
        birth_date: payload.birth_date,
        state: payload.state,
        phone: payload.phone,
        email: payload.email,
        restrictions: payload.restrictions,
        has_cdl: payload.has_cdl,
        notes: payload.notes,
    };

    let driver = conn.transaction::<Driver, AppError, _>(|conn| {
        diesel::insert_into(drivers::table)
            .values(&new_driver)
            .execute(conn)?;
        replace_org_links(conn, new_driver.id, &payload.org_ids)?;
        let driver: Driver = drivers::table.find(new_driver.id).first(conn)?;
        Ok(driver)
    })?;

    tracing::info!(driver_id = %driver.id, user = %user.username, "driver created");

    let org_ids = load_org_ids(&mut conn, driver.id)?;
    Ok(Json(driver_summary(driver, org_ids)?))
}

pub async fn get_driver(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
) -> AppResult<Json<DriverDetail>> {
    let mut conn = state.db()?;
    let driver: Driver = drivers::table.find(driver_id).first(&mut conn)?;
    let org_ids = load_org_ids(&mut conn, driver.id)?;

    let trips = super::requests::load_summaries_for_driver(&mut conn, driver_id)?;

    Ok(Json(DriverDetail {
        driver: driver_summary(driver, org_ids)?,
        assigned_trips: trips,
    }))
}

pub async fn update_driver(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
    Json(payload): Json<UpdateDriverRequest>,
) -> AppResult<Json<DriverSummary>> {
    let mut conn = state.db()?;
    let existing: Driver = drivers::table.find(driver_id).first(&mut conn)?;

    let first_name = match payload.first_name {
        Some(ref value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("first_name must not be empty"));
            }
            trimmed.to_string()
        }
        None => existing.first_name.clone(),
    };
    let last_name = match payload.last_name {
        Some(ref value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("last_name must not be empty"));
            }
            trimmed.to_string()
        }
        None => existing.last_name.clone(),
    };

    let updated = conn.transaction::<Driver, AppError, _>(|conn| {
        diesel::update(drivers::table.find(driver_id))
            .set((
                drivers::status.eq(payload
                    .status
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| existing.status.clone())),
                drivers::first_name.eq(&first_name),
                drivers::last_name.eq(&last_name),
                drivers::license_num
                    .eq(payload.license_num.clone().unwrap_or_else(|| existing.license_num.clone())),
                drivers::license_expires
                    .eq(payload.license_expires.unwrap_or(existing.license_expires)),
                drivers::birth_date.eq(payload.birth_date.unwrap_or(existing.birth_date)),
                drivers::state.eq(payload.state.clone().unwrap_or_else(|| existing.state.clone())),
                drivers::phone.eq(payload.phone.clone().unwrap_or_else(|| existing.phone.clone())),
                drivers::email.eq(payload.email.clone().unwrap_or_else(|| existing.email.clone())),
                drivers::restrictions.eq(payload
                    .restrictions
                    .clone()
                    .unwrap_or_else(|| existing.restrictions.clone())),
                drivers::has_cdl.eq(payload.has_cdl.unwrap_or(existing.has_cdl)),
                drivers::notes.eq(payload.notes.clone().unwrap_or_else(|| existing.notes.clone())),
                drivers::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;

        if let Some(ref org_ids) = payload.org_ids {
            replace_org_links(conn, driver_id, org_ids)?;
        }

        let driver: Driver = drivers::table.find(driver_id).first(conn)?;
        Ok(driver)
    })?;

    tracing::info!(driver_id = %driver_id, user = %user.username, "driver updated");

    let org_ids = load_org_ids(&mut conn, driver_id)?;
    Ok(Json(driver_summary(updated, org_ids)?))
}

pub async fn delete_driver(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;

    let in_use: i64 = trip_requests::table
        .filter(trip_requests::driver_id.eq(driver_id))
        .select(count_star())
        .first(&mut conn)?;
    if in_use > 0 {
        return Err(AppError::bad_request(
            "driver cannot be deleted while assigned to trip requests",
        ));
    }

    let deleted = conn.transaction::<usize, AppError, _>(|conn| {
        diesel::delete(
            driver_organizations::table.filter(driver_organizations::driver_id.eq(driver_id)),
        )
        .execute(conn)?;
        Ok(diesel::delete(drivers::table.find(driver_id)).execute(conn)?)
    })?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    tracing::info!(driver_id = %driver_id, user = %user.username, "driver deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deactivate_driver(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
) -> AppResult<Json<DriverSummary>> {
    set_driver_status(state, driver_id, DriverStatus::Inactive, &user.username).await
}

pub async fn reactivate_driver(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
) -> AppResult<Json<DriverSummary>> {
    set_driver_status(state, driver_id, DriverStatus::Active, &user.username).await
}

/// Typeahead used by the request form: case-insensitive prefix match on
/// either name component. Open to every authenticated user.
pub async fn search_drivers(
    _user: AuthenticatedUser,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<DriverMatch>>> {
    let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        return Ok(Json(Vec::new()));
    };

    let mut conn = state.db()?;
    let pattern = format!("{}%", escape_like(q));
    let rows: Vec<Driver> = drivers::table
        .filter(
            drivers::first_name
                .ilike(&pattern)
                .or(drivers::last_name.ilike(&pattern)),
        )
        .order((drivers::last_name.asc(), drivers::first_name.asc()))
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|driver| DriverMatch {
                id: driver.id,
                full_name: driver.full_name(),
            })
            .collect(),
    ))
}

/// A driver is available for a window when none of their live assigned trips
/// overlaps it. Denied and cancelled trips do not hold the driver.
pub async fn driver_availability(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
    Query(window): Query<AvailabilityQuery>,
) -> AppResult<Json<AvailabilityResponse>> {
    if window.end <= window.start {
        return Err(AppError::bad_request("end must be after start"));
    }

    let mut conn = state.db()?;
    drivers::table
        .find(driver_id)
        .first::<Driver>(&mut conn)?;

    let conflicting: i64 = trip_requests::table
        .filter(trip_requests::driver_id.eq(driver_id))
        .filter(trip_requests::depart_est.lt(window.end.naive_utc()))
        .filter(trip_requests::return_est.gt(window.start.naive_utc()))
        .filter(trip_requests::status.ne_all(vec![
            TripStatus::Denied.as_str(),
            TripStatus::Cancelled.as_str(),
        ]))
        .select(count_star())
        .first(&mut conn)?;

    Ok(Json(AvailabilityResponse {
        driver_id,
        available: conflicting == 0,
        conflicting_trips: conflicting,
    }))
}

async fn set_driver_status(
    state: AppState,
    driver_id: Uuid,
    status: DriverStatus,
    username: &str,
) -> AppResult<Json<DriverSummary>> {
    let mut conn = state.db()?;

    let updated = diesel::update(drivers::table.find(driver_id))
        .set((
            drivers::status.eq(status.as_str()),
            drivers::updated_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found());
    }

    tracing::info!(driver_id = %driver_id, status = %status, user = %username, "driver status changed");

    let driver: Driver = drivers::table.find(driver_id).first(&mut conn)?;
    let org_ids = load_org_ids(&mut conn, driver_id)?;
    Ok(Json(driver_summary(driver, org_ids)?))
}

fn driver_summary(driver: Driver, org_ids: Vec<Uuid>) -> AppResult<DriverSummary> {
    let status = DriverStatus::parse(&driver.status)
        .ok_or_else(|| AppError::internal(format!("corrupt driver status: {}", driver.status)))?;
    Ok(DriverSummary {
        id: driver.id,
        status,
        first_name: driver.first_name,
        last_name: driver.last_name,
        license_num: driver.license_num,
        license_expires: driver.license_expires,
        birth_date: driver.birth_date,
        state: driver.state,
        phone: driver.phone,
        email: driver.email,
        restrictions: driver.restrictions,
        has_cdl: driver.has_cdl,
        notes: driver.notes,
        org_ids,
        created_at: to_iso(driver.created_at),
        updated_at: to_iso(driver.updated_at),
    })
}

fn load_org_ids(conn: &mut PgConnection, driver_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = driver_organizations::table
        .filter(driver_organizations::driver_id.eq(driver_id))
        .select(driver_organizations::org_id)
        .load(conn)?;
    Ok(ids)
}

fn replace_org_links(
    conn: &mut PgConnection,
    driver_id: Uuid,
    org_ids: &[Uuid],
) -> Result<(), diesel::result::Error> {
    diesel::delete(
        driver_organizations::table.filter(driver_organizations::driver_id.eq(driver_id)),
    )
    .execute(conn)?;

    let links: Vec<NewDriverOrganization> = org_ids
        .iter()
        .map(|org_id| NewDriverOrganization {
            driver_id,
            org_id: *org_id,
        })
        .collect();
    if !links.is_empty() {
        diesel::insert_into(driver_organizations::table)
            .values(&links)
            .execute(conn)?;
    }
    Ok(())
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
