//! Trip request lifecycle.
//!
//! Requests are created pending, then moderators assign a manager, driver
//! and vehicle and walk the request through approve / deny / return /
//! finalize / cancel. Every mutation writes one activity row in the same
//! transaction as the change, and lifecycle transitions queue notification
//! emails through the job queue.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use diesel::{dsl::count_star, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    activity::log_trip_event,
    auth::{AuthenticatedUser, Moderator},
    domain::{KeyColor, TripEvent, TripStatus, VehicleType},
    emails,
    error::{AppError, AppResult},
    models::{NewTripRequest, TripRequest, TripRequestActivity, User},
    schema::{budgets, departments, trip_request_activity, trip_requests, users},
    state::AppState,
};

pub fn to_iso(ts: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_naive(ts: DateTime<Utc>) -> NaiveDateTime {
    ts.naive_utc()
}

#[derive(Serialize)]
pub struct RequestSummary {
    pub id: Uuid,
    pub status: TripStatus,
    pub org_id: Uuid,
    pub contact_name: String,
    pub destination: String,
    pub party_count: i32,
    pub depart_est: String,
    pub return_est: String,
    pub submitted_at: String,
    pub dispatch_ready: bool,
}

#[derive(Serialize)]
pub struct ActivityEntry {
    pub event: TripEvent,
    pub user: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct RequestDetail {
    pub id: Uuid,
    pub status: TripStatus,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub budget_id: Uuid,
    pub requestor: Option<String>,
    pub manager: Option<String>,
    pub contact_first_name: String,
    pub contact_last_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub requested_driver: Option<String>,
    pub driver_id: Option<Uuid>,
    pub vehicle_type: VehicleType,
    pub vehicle_id: Option<Uuid>,
    pub party_count: i32,
    pub depart_est: String,
    pub return_est: String,
    pub depart_act: Option<String>,
    pub return_act: Option<String>,
    pub destination: String,
    pub purpose: String,
    pub trailer: bool,
    pub agreement_accepted: bool,
    pub mileage_est: i32,
    pub mileage_act: Option<i32>,
    pub card_num: Option<String>,
    pub key_color: KeyColor,
    pub fuel_cost: Option<BigDecimal>,
    pub vehicle_clean: bool,
    pub vehicle_parked_proper: bool,
    pub vehicle_problems: Option<String>,
    pub submitted_at: String,
    pub updated_at: String,
    pub dispatch_ready: bool,
    pub missing_requirements: Vec<&'static str>,
    pub activity: Vec<ActivityEntry>,
}

#[derive(Deserialize)]
pub struct CreateRequestPayload {
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub budget_id: Uuid,
    pub contact_first_name: String,
    pub contact_last_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    #[serde(default)]
    pub requested_driver: Option<String>,
    pub vehicle_type: VehicleType,
    pub party_count: i32,
    pub depart_est: DateTime<Utc>,
    pub return_est: DateTime<Utc>,
    pub destination: String,
    pub purpose: String,
    #[serde(default)]
    pub trailer: bool,
    pub agreement_accepted: bool,
    pub mileage_est: i32,
}

/// Double options follow the usual convention: missing means leave alone,
/// null means clear.
#[derive(Deserialize, Default)]
pub struct UpdateRequestPayload {
    pub org_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub budget_id: Option<Uuid>,
    pub contact_first_name: Option<String>,
    pub contact_last_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    #[serde(default)]
    pub requested_driver: Option<Option<String>>,
    pub vehicle_type: Option<VehicleType>,
    pub party_count: Option<i32>,
    pub depart_est: Option<DateTime<Utc>>,
    pub return_est: Option<DateTime<Utc>>,
    pub destination: Option<String>,
    pub purpose: Option<String>,
    pub trailer: Option<bool>,
    pub mileage_est: Option<i32>,
    // Assignment and trip-completion fields, moderators only.
    #[serde(default)]
    pub driver_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub vehicle_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub card_num: Option<Option<String>>,
    pub key_color: Option<KeyColor>,
    #[serde(default)]
    pub depart_act: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub return_act: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub mileage_act: Option<Option<i32>>,
    #[serde(default)]
    pub fuel_cost: Option<Option<BigDecimal>>,
    pub vehicle_clean: Option<bool>,
    pub vehicle_parked_proper: Option<bool>,
    #[serde(default)]
    pub vehicle_problems: Option<Option<String>>,
}

impl UpdateRequestPayload {
    fn touches_moderator_fields(&self) -> bool {
        self.driver_id.is_some()
            || self.vehicle_id.is_some()
            || self.card_num.is_some()
            || self.key_color.is_some()
            || self.depart_act.is_some()
            || self.return_act.is_some()
            || self.mileage_act.is_some()
            || self.fuel_cost.is_some()
            || self.vehicle_clean.is_some()
            || self.vehicle_parked_proper.is_some()
            || self.vehicle_problems.is_some()
    }
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = trip_requests)]
struct TripRequestChanges {
    org_id: Option<Uuid>,
    department_id: Option<Uuid>,
    budget_id: Option<Uuid>,
    contact_first_name: Option<String>,
    contact_last_name: Option<String>,
    contact_phone: Option<String>,
    contact_email: Option<String>,
    requested_driver: Option<Option<String>>,
    vehicle_type: Option<String>,
    party_count: Option<i32>,
    depart_est: Option<NaiveDateTime>,
    return_est: Option<NaiveDateTime>,
    destination: Option<String>,
    purpose: Option<String>,
    trailer: Option<bool>,
    mileage_est: Option<i32>,
    driver_id: Option<Option<Uuid>>,
    vehicle_id: Option<Option<Uuid>>,
    card_num: Option<Option<String>>,
    key_color: Option<String>,
    depart_act: Option<Option<NaiveDateTime>>,
    return_act: Option<Option<NaiveDateTime>>,
    mileage_act: Option<Option<i32>>,
    fuel_cost: Option<Option<BigDecimal>>,
    vehicle_clean: Option<bool>,
    vehicle_parked_proper: Option<bool>,
    vehicle_problems: Option<Option<String>>,
    updated_at: Option<NaiveDateTime>,
}

#[derive(Deserialize)]
pub struct RequestFilter {
    pub status: Option<String>,
    pub org: Option<Uuid>,
    pub depart_after: Option<DateTime<Utc>>,
    pub depart_before: Option<DateTime<Utc>>,
    pub contact_first_name: Option<String>,
    pub contact_last_name: Option<String>,
    pub contact_email: Option<String>,
    pub department_num: Option<String>,
    pub budget_num: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ReturnPayload {
    #[serde(default)]
    pub depart_act: Option<DateTime<Utc>>,
    #[serde(default)]
    pub return_act: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mileage_act: Option<i32>,
    #[serde(default)]
    pub fuel_cost: Option<BigDecimal>,
    #[serde(default)]
    pub vehicle_clean: Option<bool>,
    #[serde(default)]
    pub vehicle_parked_proper: Option<bool>,
    #[serde(default)]
    pub vehicle_problems: Option<String>,
}

pub async fn create_request(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateRequestPayload>,
) -> AppResult<(StatusCode, Json<RequestSummary>)> {
    if !payload.agreement_accepted {
        return Err(AppError::bad_request(
            "the vehicle use agreement must be accepted",
        ));
    }
    if payload.return_est <= payload.depart_est {
        return Err(AppError::bad_request(
            "estimated return must be after estimated departure",
        ));
    }
    if payload.party_count < 1 {
        return Err(AppError::bad_request("party_count must be at least 1"));
    }
    if payload.mileage_est < 0 {
        return Err(AppError::bad_request("mileage_est must not be negative"));
    }
    let contact_email = payload.contact_email.trim();
    if !contact_email.contains('@') {
        return Err(AppError::bad_request("contact_email is not valid"));
    }

    let mut conn = state.db()?;
    ensure_department_in_org(&mut conn, payload.org_id, payload.department_id)?;
    ensure_budget_in_org(&mut conn, payload.org_id, payload.budget_id)?;

    let new_request = NewTripRequest {
        id: Uuid::new_v4(),
        status: TripStatus::Pending.as_str().to_string(),
        org_id: payload.org_id,
        department_id: payload.department_id,
        budget_id: payload.budget_id,
        requestor_id: Some(user.user_id),
        contact_first_name: payload.contact_first_name.trim().to_string(),
        contact_last_name: payload.contact_last_name.trim().to_string(),
        contact_phone: payload.contact_phone.trim().to_string(),
        contact_email: contact_email.to_string(),
        requested_driver: payload.requested_driver,
        vehicle_type: payload.vehicle_type.as_str().to_string(),
        party_count: payload.party_count,
        depart_est: to_naive(payload.depart_est),
        return_est: to_naive(payload.return_est),
        destination: payload.destination.trim().to_string(),
        purpose: payload.purpose,
        trailer: payload.trailer,
        agreement_accepted: true,
        mileage_est: payload.mileage_est,
    };

    let request = conn.transaction::<TripRequest, AppError, _>(|conn| {
        diesel::insert_into(trip_requests::table)
            .values(&new_request)
            .execute(conn)?;
        let request: TripRequest = trip_requests::table.find(new_request.id).first(conn)?;
        log_trip_event(conn, request.id, Some(user.user_id), TripEvent::Created)?;
        emails::enqueue(conn, emails::request_submitted(&state.config, &request))?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request.id, user = %user.username, "trip request submitted");
    Ok((StatusCode::CREATED, Json(request_summary(&request)?)))
}

pub async fn list_requests(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Query(filter): Query<RequestFilter>,
) -> AppResult<Json<Vec<RequestSummary>>> {
    let mut conn = state.db()?;

    let mut query = trip_requests::table.into_boxed();

    // Staff only ever see their own submissions.
    if !user.is_moderator() {
        query = query.filter(trip_requests::requestor_id.eq(user.user_id));
    }

    if let Some(ref status) = filter.status {
        let status = TripStatus::parse(status)
            .ok_or_else(|| AppError::bad_request("unknown request status"))?;
        query = query.filter(trip_requests::status.eq(status.as_str()));
    }
    if let Some(org_id) = filter.org {
        query = query.filter(trip_requests::org_id.eq(org_id));
    }
    if let Some(after) = filter.depart_after {
        query = query.filter(trip_requests::depart_est.ge(to_naive(after)));
    }
    if let Some(before) = filter.depart_before {
        query = query.filter(trip_requests::depart_est.le(to_naive(before)));
    }
    if let Some(ref first) = filter.contact_first_name {
        query = query.filter(trip_requests::contact_first_name.ilike(prefix_pattern(first)));
    }
    if let Some(ref last) = filter.contact_last_name {
        query = query.filter(trip_requests::contact_last_name.ilike(prefix_pattern(last)));
    }
    if let Some(ref email) = filter.contact_email {
        query = query.filter(trip_requests::contact_email.ilike(prefix_pattern(email)));
    }
    if let Some(ref num) = filter.department_num {
        let ids: Vec<Uuid> = departments::table
            .filter(departments::num.eq(num))
            .select(departments::id)
            .load(&mut conn)?;
        query = query.filter(trip_requests::department_id.eq_any(ids));
    }
    if let Some(ref num) = filter.budget_num {
        let ids: Vec<Uuid> = budgets::table
            .filter(budgets::num.eq(num))
            .select(budgets::id)
            .load(&mut conn)?;
        query = query.filter(trip_requests::budget_id.eq_any(ids));
    }

    let rows: Vec<TripRequest> = query
        .order(trip_requests::depart_est.asc())
        .load(&mut conn)?;

    let summaries = rows
        .iter()
        .map(request_summary)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(summaries))
}

pub async fn get_request(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDetail>> {
    let mut conn = state.db()?;
    let request = load_visible_request(&mut conn, request_id, &user)?;
    Ok(Json(request_detail(&mut conn, request)?))
}

pub async fn update_request(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<UpdateRequestPayload>,
) -> AppResult<Json<RequestDetail>> {
    if payload.touches_moderator_fields() && !user.is_moderator() {
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "assignment fields can only be changed by moderators",
        ));
    }

    let mut conn = state.db()?;
    let existing = load_visible_request(&mut conn, request_id, &user)?;
    let status = parse_status(&existing)?;
    if !status.is_modifiable() {
        return Err(AppError::conflict(format!(
            "a {} request can no longer be edited",
            status.display_name().to_lowercase()
        )));
    }

    let org_id = payload.org_id.unwrap_or(existing.org_id);
    let department_id = payload.department_id.unwrap_or(existing.department_id);
    let budget_id = payload.budget_id.unwrap_or(existing.budget_id);
    if payload.org_id.is_some() || payload.department_id.is_some() {
        ensure_department_in_org(&mut conn, org_id, department_id)?;
    }
    if payload.org_id.is_some() || payload.budget_id.is_some() {
        ensure_budget_in_org(&mut conn, org_id, budget_id)?;
    }
    if let Some(count) = payload.party_count {
        if count < 1 {
            return Err(AppError::bad_request("party_count must be at least 1"));
        }
    }

    let depart_est = payload
        .depart_est
        .map(to_naive)
        .unwrap_or(existing.depart_est);
    let return_est = payload
        .return_est
        .map(to_naive)
        .unwrap_or(existing.return_est);
    if return_est <= depart_est {
        return Err(AppError::bad_request(
            "estimated return must be after estimated departure",
        ));
    }

    let changes = TripRequestChanges {
        org_id: payload.org_id,
        department_id: payload.department_id,
        budget_id: payload.budget_id,
        contact_first_name: payload.contact_first_name,
        contact_last_name: payload.contact_last_name,
        contact_phone: payload.contact_phone,
        contact_email: payload.contact_email,
        requested_driver: payload.requested_driver,
        vehicle_type: payload.vehicle_type.map(|v| v.as_str().to_string()),
        party_count: payload.party_count,
        depart_est: payload.depart_est.map(to_naive),
        return_est: payload.return_est.map(to_naive),
        destination: payload.destination,
        purpose: payload.purpose,
        trailer: payload.trailer,
        mileage_est: payload.mileage_est,
        driver_id: payload.driver_id,
        vehicle_id: payload.vehicle_id,
        card_num: payload.card_num,
        key_color: payload.key_color.map(|k| k.as_str().to_string()),
        depart_act: payload.depart_act.map(|v| v.map(to_naive)),
        return_act: payload.return_act.map(|v| v.map(to_naive)),
        mileage_act: payload.mileage_act,
        fuel_cost: payload.fuel_cost,
        vehicle_clean: payload.vehicle_clean,
        vehicle_parked_proper: payload.vehicle_parked_proper,
        vehicle_problems: payload.vehicle_problems,
        updated_at: Some(Utc::now().naive_utc()),
    };

    let updated = conn.transaction::<TripRequest, AppError, _>(|conn| {
        diesel::update(trip_requests::table.find(request_id))
            .set(&changes)
            .execute(conn)?;
        log_trip_event(conn, request_id, Some(user.user_id), TripEvent::Edited)?;
        let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request_id, user = %user.username, "trip request edited");
    Ok(Json(request_detail(&mut conn, updated)?))
}

pub async fn delete_request(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(trip_requests::table.find(request_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    tracing::info!(request_id = %request_id, user = %user.username, "trip request deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// The calling moderator claims the request. First come, first served.
pub async fn assign_request_moderator(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDetail>> {
    let mut conn = state.db()?;

    let updated = conn.transaction::<TripRequest, AppError, _>(|conn| {
        let request: TripRequest = trip_requests::table
            .find(request_id)
            .for_update()
            .first(conn)?;
        if request.manager_id.is_some() {
            return Err(AppError::conflict(
                "this request already has a moderator assigned",
            ));
        }
        diesel::update(trip_requests::table.find(request_id))
            .set((
                trip_requests::manager_id.eq(user.user_id),
                trip_requests::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;
        log_trip_event(conn, request_id, Some(user.user_id), TripEvent::Edited)?;
        let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request_id, user = %user.username, "moderator assigned");
    Ok(Json(request_detail(&mut conn, updated)?))
}

pub async fn approve_request(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDetail>> {
    let mut conn = state.db()?;

    let updated = conn.transaction::<TripRequest, AppError, _>(|conn| {
        let request: TripRequest = trip_requests::table
            .find(request_id)
            .for_update()
            .first(conn)?;
        let status = parse_status(&request)?;
        if status == TripStatus::Approved {
            return Err(AppError::conflict("request is already approved"));
        }
        if !status.is_modifiable() {
            return Err(AppError::conflict(format!(
                "a {} request cannot be approved",
                status.display_name().to_lowercase()
            )));
        }
        if request.driver_id.is_none() || request.vehicle_id.is_none() {
            return Err(AppError::bad_request(
                "a driver and a vehicle must be assigned before approval",
            ));
        }

        set_status(conn, request_id, TripStatus::Approved)?;
        log_trip_event(conn, request_id, Some(user.user_id), TripEvent::Approved)?;
        let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
        emails::enqueue(conn, emails::request_approved(&state.config, &request))?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request_id, user = %user.username, "trip request approved");
    Ok(Json(request_detail(&mut conn, updated)?))
}

pub async fn deny_request(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDetail>> {
    let mut conn = state.db()?;

    let updated = conn.transaction::<TripRequest, AppError, _>(|conn| {
        let request: TripRequest = trip_requests::table
            .find(request_id)
            .for_update()
            .first(conn)?;
        let status = parse_status(&request)?;
        if status == TripStatus::Denied {
            return Err(AppError::conflict("request is already denied"));
        }
        if !status.is_modifiable() {
            return Err(AppError::conflict(format!(
                "a {} request cannot be denied",
                status.display_name().to_lowercase()
            )));
        }

        set_status(conn, request_id, TripStatus::Denied)?;
        log_trip_event(conn, request_id, Some(user.user_id), TripEvent::Denied)?;
        let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
        emails::enqueue(conn, emails::request_denied(&state.config, &request))?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request_id, user = %user.username, "trip request denied");
    Ok(Json(request_detail(&mut conn, updated)?))
}

/// Puts a request back in the pending queue, e.g. after a deny made in
/// error or when an approved trip has to be re-planned.
pub async fn reopen_request(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDetail>> {
    let mut conn = state.db()?;

    let updated = conn.transaction::<TripRequest, AppError, _>(|conn| {
        let request: TripRequest = trip_requests::table
            .find(request_id)
            .for_update()
            .first(conn)?;
        let status = parse_status(&request)?;
        if status == TripStatus::Pending {
            return Err(AppError::conflict("request is already pending"));
        }
        if status == TripStatus::Completed {
            return Err(AppError::conflict("a completed request cannot be reopened"));
        }

        set_status(conn, request_id, TripStatus::Pending)?;
        log_trip_event(conn, request_id, Some(user.user_id), TripEvent::Pending)?;
        let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
        emails::enqueue(
            conn,
            emails::status_changed(&state.config, &request, status, TripStatus::Pending),
        )?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request_id, user = %user.username, "trip request reopened");
    Ok(Json(request_detail(&mut conn, updated)?))
}

/// Records the vehicle as returned, along with whatever trip-completion
/// details the moderator captured at the key drop.
pub async fn return_request_vehicle(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    payload: Option<Json<ReturnPayload>>,
) -> AppResult<Json<RequestDetail>> {
    let details = payload.map(|Json(p)| p).unwrap_or_default();
    let mut conn = state.db()?;

    let updated = conn.transaction::<TripRequest, AppError, _>(|conn| {
        let request: TripRequest = trip_requests::table
            .find(request_id)
            .for_update()
            .first(conn)?;
        let status = parse_status(&request)?;
        if status == TripStatus::Returned {
            return Err(AppError::conflict("the vehicle has already been returned"));
        }
        if !status.is_modifiable() {
            return Err(AppError::conflict(
                "the request can no longer have its vehicle returned",
            ));
        }
        if request.driver_id.is_none() || request.vehicle_id.is_none() {
            return Err(AppError::bad_request(
                "a driver and a vehicle must be assigned before the vehicle can be returned",
            ));
        }

        diesel::update(trip_requests::table.find(request_id))
            .set((
                trip_requests::status.eq(TripStatus::Returned.as_str()),
                trip_requests::depart_act
                    .eq(details.depart_act.map(to_naive).or(request.depart_act)),
                trip_requests::return_act
                    .eq(details.return_act.map(to_naive).or(request.return_act)),
                trip_requests::mileage_act.eq(details.mileage_act.or(request.mileage_act)),
                trip_requests::fuel_cost
                    .eq(details.fuel_cost.clone().or(request.fuel_cost.clone())),
                trip_requests::vehicle_clean
                    .eq(details.vehicle_clean.unwrap_or(request.vehicle_clean)),
                trip_requests::vehicle_parked_proper.eq(details
                    .vehicle_parked_proper
                    .unwrap_or(request.vehicle_parked_proper)),
                trip_requests::vehicle_problems.eq(details
                    .vehicle_problems
                    .clone()
                    .or(request.vehicle_problems.clone())),
                trip_requests::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;

        // The odometer only ever moves forward.
        if let (Some(vehicle_id), Some(mileage_act)) = (request.vehicle_id, details.mileage_act) {
            super::vehicles::raise_vehicle_mileage(conn, vehicle_id, mileage_act)?;
        }

        log_trip_event(conn, request_id, Some(user.user_id), TripEvent::Finished)?;
        let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
        emails::enqueue(
            conn,
            emails::status_changed(&state.config, &request, status, TripStatus::Returned),
        )?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request_id, user = %user.username, "vehicle returned");
    Ok(Json(request_detail(&mut conn, updated)?))
}

pub async fn finalize_request(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDetail>> {
    let mut conn = state.db()?;

    let updated = conn.transaction::<TripRequest, AppError, _>(|conn| {
        let request: TripRequest = trip_requests::table
            .find(request_id)
            .for_update()
            .first(conn)?;
        let status = parse_status(&request)?;
        if !status.can_finalize() {
            return Err(AppError::conflict(
                "only a returned request can be finalized",
            ));
        }

        set_status(conn, request_id, TripStatus::Completed)?;
        log_trip_event(conn, request_id, Some(user.user_id), TripEvent::Finished)?;
        let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
        emails::enqueue(
            conn,
            emails::status_changed(&state.config, &request, status, TripStatus::Completed),
        )?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request_id, user = %user.username, "trip request finalized");
    Ok(Json(request_detail(&mut conn, updated)?))
}

pub async fn cancel_request(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDetail>> {
    let mut conn = state.db()?;

    let updated = conn.transaction::<TripRequest, AppError, _>(|conn| {
        let request: TripRequest = trip_requests::table
            .find(request_id)
            .for_update()
            .first(conn)?;
        if !user.is_moderator() && request.requestor_id != Some(user.user_id) {
            return Err(AppError::not_found());
        }
        let status = parse_status(&request)?;
        if status == TripStatus::Cancelled {
            return Err(AppError::conflict("request is already cancelled"));
        }
        if !status.is_modifiable() {
            return Err(AppError::conflict(format!(
                "a {} request cannot be cancelled",
                status.display_name().to_lowercase()
            )));
        }

        set_status(conn, request_id, TripStatus::Cancelled)?;
        log_trip_event(conn, request_id, Some(user.user_id), TripEvent::Cancelled)?;
        let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
        emails::enqueue(conn, emails::request_cancelled(&state.config, &request))?;
        Ok(request)
    })?;

    tracing::info!(request_id = %request_id, user = %user.username, "trip request cancelled");
    Ok(Json(request_detail(&mut conn, updated)?))
}

pub fn load_summaries_for_driver(
    conn: &mut PgConnection,
    driver_id: Uuid,
) -> AppResult<Vec<RequestSummary>> {
    let rows: Vec<TripRequest> = trip_requests::table
        .filter(trip_requests::driver_id.eq(driver_id))
        .order(trip_requests::depart_est.asc())
        .load(conn)?;
    rows.iter().map(request_summary).collect()
}

pub fn count_for_vehicle(conn: &mut PgConnection, vehicle_id: Uuid) -> AppResult<i64> {
    let count = trip_requests::table
        .filter(trip_requests::vehicle_id.eq(vehicle_id))
        .select(count_star())
        .first(conn)?;
    Ok(count)
}

fn load_visible_request(
    conn: &mut PgConnection,
    request_id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<TripRequest> {
    let request: TripRequest = trip_requests::table.find(request_id).first(conn)?;
    // Hide other people's requests from staff rather than admitting they
    // exist.
    if !user.is_moderator() && request.requestor_id != Some(user.user_id) {
        return Err(AppError::not_found());
    }
    Ok(request)
}

fn request_summary(request: &TripRequest) -> AppResult<RequestSummary> {
    Ok(RequestSummary {
        id: request.id,
        status: parse_status(request)?,
        org_id: request.org_id,
        contact_name: request.contact_full_name(),
        destination: request.destination.clone(),
        party_count: request.party_count,
        depart_est: to_iso(request.depart_est),
        return_est: to_iso(request.return_est),
        submitted_at: to_iso(request.submitted_at),
        dispatch_ready: request.is_dispatch_ready(),
    })
}

fn request_detail(conn: &mut PgConnection, request: TripRequest) -> AppResult<RequestDetail> {
    let status = parse_status(&request)?;
    let vehicle_type = VehicleType::parse(&request.vehicle_type).ok_or_else(|| {
        AppError::internal(format!("corrupt vehicle type: {}", request.vehicle_type))
    })?;
    let key_color = KeyColor::parse(&request.key_color)
        .ok_or_else(|| AppError::internal(format!("corrupt key color: {}", request.key_color)))?;

    let requestor = full_name_of(conn, request.requestor_id)?;
    let manager = full_name_of(conn, request.manager_id)?;

    let rows: Vec<(TripRequestActivity, Option<String>)> = trip_request_activity::table
        .left_join(users::table)
        .filter(trip_request_activity::request_id.eq(request.id))
        .order(trip_request_activity::created_at.asc())
        .select((
            trip_request_activity::all_columns,
            users::username.nullable(),
        ))
        .load(conn)?;

    let mut activity = Vec::with_capacity(rows.len());
    for (entry, username) in rows {
        let event = TripEvent::parse(&entry.event)
            .ok_or_else(|| AppError::internal(format!("corrupt activity event: {}", entry.event)))?;
        activity.push(ActivityEntry {
            event,
            user: username,
            created_at: to_iso(entry.created_at),
        });
    }

    Ok(RequestDetail {
        id: request.id,
        status,
        org_id: request.org_id,
        department_id: request.department_id,
        budget_id: request.budget_id,
        requestor,
        manager,
        contact_first_name: request.contact_first_name.clone(),
        contact_last_name: request.contact_last_name.clone(),
        contact_phone: request.contact_phone.clone(),
        contact_email: request.contact_email.clone(),
        requested_driver: request.requested_driver.clone(),
        driver_id: request.driver_id,
        vehicle_type,
        vehicle_id: request.vehicle_id,
        party_count: request.party_count,
        depart_est: to_iso(request.depart_est),
        return_est: to_iso(request.return_est),
        depart_act: request.depart_act.map(to_iso),
        return_act: request.return_act.map(to_iso),
        destination: request.destination.clone(),
        purpose: request.purpose.clone(),
        trailer: request.trailer,
        agreement_accepted: request.agreement_accepted,
        mileage_est: request.mileage_est,
        mileage_act: request.mileage_act,
        card_num: request.card_num.clone(),
        key_color,
        fuel_cost: request.fuel_cost.clone(),
        vehicle_clean: request.vehicle_clean,
        vehicle_parked_proper: request.vehicle_parked_proper,
        vehicle_problems: request.vehicle_problems.clone(),
        submitted_at: to_iso(request.submitted_at),
        updated_at: to_iso(request.updated_at),
        dispatch_ready: request.is_dispatch_ready(),
        missing_requirements: request.missing_requirements(),
        activity,
    })
}

fn full_name_of(conn: &mut PgConnection, user_id: Option<Uuid>) -> AppResult<Option<String>> {
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    let user: Option<User> = users::table.find(user_id).first(conn).optional()?;
    Ok(user.map(|u| u.full_name()))
}

fn parse_status(request: &TripRequest) -> AppResult<TripStatus> {
    TripStatus::parse(&request.status)
        .ok_or_else(|| AppError::internal(format!("corrupt request status: {}", request.status)))
}

fn set_status(
    conn: &mut PgConnection,
    request_id: Uuid,
    status: TripStatus,
) -> Result<(), diesel::result::Error> {
    diesel::update(trip_requests::table.find(request_id))
        .set((
            trip_requests::status.eq(status.as_str()),
            trip_requests::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;
    Ok(())
}

fn ensure_department_in_org(
    conn: &mut PgConnection,
    org_id: Uuid,
    department_id: Uuid,
) -> AppResult<()> {
    let found: i64 = departments::table
        .filter(departments::id.eq(department_id))
        .filter(departments::org_id.eq(org_id))
        .select(count_star())
        .first(conn)?;
    if found == 0 {
        return Err(AppError::bad_request(
            "department does not belong to the selected organization",
        ));
    }
    Ok(())
}

fn ensure_budget_in_org(conn: &mut PgConnection, org_id: Uuid, budget_id: Uuid) -> AppResult<()> {
    let found: i64 = budgets::table
        .filter(budgets::id.eq(budget_id))
        .filter(budgets::org_id.eq(org_id))
        .select(count_star())
        .first(conn)?;
    if found == 0 {
        return Err(AppError::bad_request(
            "budget does not belong to the selected organization",
        ));
    }
    Ok(())
}

fn prefix_pattern(raw: &str) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}
