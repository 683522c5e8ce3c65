use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    activity::log_vehicle_event,
    auth::Moderator,
    domain::{MaintenanceCategory, VehicleEvent, VehicleStatus, VehicleType},
    error::{AppError, AppResult},
    models::{NewVehicle, NewVehicleMaintenance, Vehicle, VehicleActivity, VehicleMaintenance},
    schema::{users, vehicle_activity, vehicle_maintenance, vehicles},
    state::AppState,
};

use super::requests::to_iso;

#[derive(Serialize)]
pub struct VehicleSummary {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: i32,
    pub vehicle_type: VehicleType,
    pub status: VehicleStatus,
    pub year: i32,
    pub make: String,
    pub model: String,
    pub title_num: String,
    pub vin: String,
    pub license_plate: String,
    pub reg_expire_date: NaiveDate,
    pub mileage: i32,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_cost: Option<BigDecimal>,
    pub storage_location: Option<String>,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize)]
pub struct CreateVehicleRequest {
    pub org_id: Uuid,
    pub num: i32,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub status: Option<VehicleStatus>,
    pub year: i32,
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub title_num: String,
    #[serde(default)]
    pub vin: String,
    #[serde(default)]
    pub license_plate: String,
    pub reg_expire_date: NaiveDate,
    #[serde(default)]
    pub mileage: i32,
    #[serde(default)]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default)]
    pub purchase_cost: Option<BigDecimal>,
    #[serde(default)]
    pub storage_location: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize)]
pub struct UpdateVehicleRequest {
    pub org_id: Option<Uuid>,
    pub num: Option<i32>,
    pub vehicle_type: Option<VehicleType>,
    pub status: Option<VehicleStatus>,
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub title_num: Option<String>,
    pub vin: Option<String>,
    pub license_plate: Option<String>,
    pub reg_expire_date: Option<NaiveDate>,
    pub mileage: Option<i32>,
    #[serde(default)]
    pub purchase_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub purchase_cost: Option<Option<BigDecimal>>,
    #[serde(default)]
    pub storage_location: Option<Option<String>>,
    pub notes: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = vehicles)]
struct VehicleChanges {
    org_id: Option<Uuid>,
    num: Option<i32>,
    vehicle_type: Option<String>,
    status: Option<String>,
    year: Option<i32>,
    make: Option<String>,
    model: Option<String>,
    title_num: Option<String>,
    vin: Option<String>,
    license_plate: Option<String>,
    reg_expire_date: Option<NaiveDate>,
    mileage: Option<i32>,
    purchase_date: Option<Option<NaiveDate>>,
    purchase_cost: Option<Option<BigDecimal>>,
    storage_location: Option<Option<String>>,
    notes: Option<String>,
    updated_at: Option<chrono::NaiveDateTime>,
}

#[derive(Deserialize)]
pub struct VehicleFilter {
    pub org: Option<Uuid>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub vehicle_type: Option<String>,
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
}

#[derive(Serialize)]
pub struct VehicleActivityEntry {
    pub event: VehicleEvent,
    pub user: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub date: NaiveDate,
    pub category: MaintenanceCategory,
    pub cost: BigDecimal,
    pub mileage: i32,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize)]
pub struct MaintenanceFilter {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateMaintenanceRequest {
    pub date: NaiveDate,
    pub category: MaintenanceCategory,
    pub cost: BigDecimal,
    pub mileage: i32,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize)]
pub struct UpdateMaintenanceRequest {
    pub date: Option<NaiveDate>,
    pub category: Option<MaintenanceCategory>,
    pub cost: Option<BigDecimal>,
    pub mileage: Option<i32>,
    pub notes: Option<String>,
}

pub async fn list_vehicles(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Query(filter): Query<VehicleFilter>,
) -> AppResult<Json<Vec<VehicleSummary>>> {
    let mut conn = state.db()?;

    let mut query = vehicles::table.into_boxed();
    if let Some(org_id) = filter.org {
        query = query.filter(vehicles::org_id.eq(org_id));
    }
    if let Some(ref status) = filter.status {
        let status = VehicleStatus::parse(status)
            .ok_or_else(|| AppError::bad_request("unknown vehicle status"))?;
        query = query.filter(vehicles::status.eq(status.as_str()));
    }
    if let Some(ref vehicle_type) = filter.vehicle_type {
        let vehicle_type = VehicleType::parse(vehicle_type)
            .ok_or_else(|| AppError::bad_request("unknown vehicle type"))?;
        query = query.filter(vehicles::vehicle_type.eq(vehicle_type.as_str()));
    }
    if let Some(year) = filter.year {
        query = query.filter(vehicles::year.eq(year));
    }
    if let Some(ref make) = filter.make {
        query = query.filter(vehicles::make.ilike(make));
    }
    if let Some(ref model) = filter.model {
        query = query.filter(vehicles::model.ilike(model));
    }

    let rows: Vec<Vehicle> = query.order(vehicles::num.asc()).load(&mut conn)?;
    let summaries = rows
        .into_iter()
        .map(vehicle_summary)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(summaries))
}

pub async fn create_vehicle(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Json(payload): Json<CreateVehicleRequest>,
) -> AppResult<(StatusCode, Json<VehicleSummary>)> {
    if payload.mileage < 0 {
        return Err(AppError::bad_request("mileage must not be negative"));
    }

    let mut conn = state.db()?;
    let new_vehicle = NewVehicle {
        id: Uuid::new_v4(),
        org_id: payload.org_id,
        num: payload.num,
        vehicle_type: payload
            .vehicle_type
            .unwrap_or(VehicleType::Unknown)
            .as_str()
            .to_string(),
        status: payload
            .status
            .unwrap_or(VehicleStatus::Active)
            .as_str()
            .to_string(),
        year: payload.year,
        make: payload.make.trim().to_string(),
        model: payload.model.trim().to_string(),
        title_num: payload.title_num,
        vin: payload.vin,
        license_plate: payload.license_plate,
        reg_expire_date: payload.reg_expire_date,
        mileage: payload.mileage,
        purchase_date: payload.purchase_date,
        purchase_cost: payload.purchase_cost,
        storage_location: payload.storage_location,
        notes: payload.notes,
    };

    let vehicle = conn.transaction::<Vehicle, AppError, _>(|conn| {
        diesel::insert_into(vehicles::table)
            .values(&new_vehicle)
            .execute(conn)?;
        log_vehicle_event(conn, new_vehicle.id, Some(user.user_id), VehicleEvent::Created)?;
        let vehicle: Vehicle = vehicles::table.find(new_vehicle.id).first(conn)?;
        Ok(vehicle)
    })?;

    tracing::info!(vehicle_id = %vehicle.id, user = %user.username, "vehicle created");
    Ok((StatusCode::CREATED, Json(vehicle_summary(vehicle)?)))
}

pub async fn get_vehicle(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<VehicleSummary>> {
    let mut conn = state.db()?;
    let vehicle: Vehicle = vehicles::table.find(vehicle_id).first(&mut conn)?;
    Ok(Json(vehicle_summary(vehicle)?))
}

pub async fn update_vehicle(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
    Json(payload): Json<UpdateVehicleRequest>,
) -> AppResult<Json<VehicleSummary>> {
    if matches!(payload.mileage, Some(m) if m < 0) {
        return Err(AppError::bad_request("mileage must not be negative"));
    }

    let mut conn = state.db()?;
    let existing: Vehicle = vehicles::table.find(vehicle_id).first(&mut conn)?;
    if matches!(payload.mileage, Some(m) if m < existing.mileage) {
        return Err(AppError::bad_request("vehicle mileage cannot be lowered"));
    }

    let changes = VehicleChanges {
        org_id: payload.org_id,
        num: payload.num,
        vehicle_type: payload.vehicle_type.map(|v| v.as_str().to_string()),
        status: payload.status.map(|s| s.as_str().to_string()),
        year: payload.year,
        make: payload.make,
        model: payload.model,
        title_num: payload.title_num,
        vin: payload.vin,
        license_plate: payload.license_plate,
        reg_expire_date: payload.reg_expire_date,
        mileage: payload.mileage,
        purchase_date: payload.purchase_date,
        purchase_cost: payload.purchase_cost,
        storage_location: payload.storage_location,
        notes: payload.notes,
        updated_at: Some(chrono::Utc::now().naive_utc()),
    };

    let vehicle = conn.transaction::<Vehicle, AppError, _>(|conn| {
        diesel::update(vehicles::table.find(vehicle_id))
            .set(&changes)
            .execute(conn)?;
        log_vehicle_event(conn, vehicle_id, Some(user.user_id), VehicleEvent::Edited)?;
        let vehicle: Vehicle = vehicles::table.find(vehicle_id).first(conn)?;
        Ok(vehicle)
    })?;

    tracing::info!(vehicle_id = %vehicle_id, user = %user.username, "vehicle edited");
    Ok(Json(vehicle_summary(vehicle)?))
}

pub async fn delete_vehicle(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;

    let in_use = super::requests::count_for_vehicle(&mut conn, vehicle_id)?;
    if in_use > 0 {
        return Err(AppError::bad_request(
            "vehicle cannot be deleted while referenced by trip requests",
        ));
    }

    let deleted = diesel::delete(vehicles::table.find(vehicle_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    tracing::info!(vehicle_id = %vehicle_id, user = %user.username, "vehicle deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_vehicle_activity(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<Vec<VehicleActivityEntry>>> {
    let mut conn = state.db()?;
    vehicles::table.find(vehicle_id).first::<Vehicle>(&mut conn)?;

    let rows: Vec<(VehicleActivity, Option<String>)> = vehicle_activity::table
        .left_join(users::table)
        .filter(vehicle_activity::vehicle_id.eq(vehicle_id))
        .order(vehicle_activity::created_at.asc())
        .select((vehicle_activity::all_columns, users::username.nullable()))
        .load(&mut conn)?;

    let mut entries = Vec::with_capacity(rows.len());
    for (row, username) in rows {
        let event = VehicleEvent::parse(&row.event)
            .ok_or_else(|| AppError::internal(format!("corrupt vehicle event: {}", row.event)))?;
        entries.push(VehicleActivityEntry {
            event,
            user: username,
            created_at: to_iso(row.created_at),
        });
    }
    Ok(Json(entries))
}

pub async fn list_maintenance(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
    Query(filter): Query<MaintenanceFilter>,
) -> AppResult<Json<Vec<MaintenanceRecord>>> {
    let mut conn = state.db()?;
    vehicles::table.find(vehicle_id).first::<Vehicle>(&mut conn)?;

    let mut query = vehicle_maintenance::table
        .filter(vehicle_maintenance::vehicle_id.eq(vehicle_id))
        .into_boxed();
    if let Some(ref category) = filter.category {
        let category = MaintenanceCategory::parse(category)
            .ok_or_else(|| AppError::bad_request("unknown maintenance category"))?;
        query = query.filter(vehicle_maintenance::category.eq(category.as_str()));
    }

    let rows: Vec<VehicleMaintenance> = query
        .order(vehicle_maintenance::date.desc())
        .load(&mut conn)?;
    let records = rows
        .into_iter()
        .map(maintenance_record)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(records))
}

pub async fn create_maintenance(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
    Json(payload): Json<CreateMaintenanceRequest>,
) -> AppResult<(StatusCode, Json<MaintenanceRecord>)> {
    if payload.mileage < 0 {
        return Err(AppError::bad_request("mileage must not be negative"));
    }

    let mut conn = state.db()?;
    vehicles::table.find(vehicle_id).first::<Vehicle>(&mut conn)?;

    let new_record = NewVehicleMaintenance {
        id: Uuid::new_v4(),
        vehicle_id,
        date: payload.date,
        category: payload.category.as_str().to_string(),
        cost: payload.cost,
        mileage: payload.mileage,
        notes: payload.notes,
    };

    let record = conn.transaction::<VehicleMaintenance, AppError, _>(|conn| {
        diesel::insert_into(vehicle_maintenance::table)
            .values(&new_record)
            .execute(conn)?;
        raise_vehicle_mileage(conn, vehicle_id, new_record.mileage)?;
        log_vehicle_event(
            conn,
            vehicle_id,
            Some(user.user_id),
            VehicleEvent::MaintenanceCreated,
        )?;
        let record: VehicleMaintenance =
            vehicle_maintenance::table.find(new_record.id).first(conn)?;
        Ok(record)
    })?;

    tracing::info!(vehicle_id = %vehicle_id, maintenance_id = %record.id, user = %user.username, "maintenance recorded");
    Ok((StatusCode::CREATED, Json(maintenance_record(record)?)))
}

pub async fn update_maintenance(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path((vehicle_id, maintenance_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateMaintenanceRequest>,
) -> AppResult<Json<MaintenanceRecord>> {
    if matches!(payload.mileage, Some(m) if m < 0) {
        return Err(AppError::bad_request("mileage must not be negative"));
    }

    let mut conn = state.db()?;
    let existing: VehicleMaintenance = vehicle_maintenance::table
        .filter(vehicle_maintenance::id.eq(maintenance_id))
        .filter(vehicle_maintenance::vehicle_id.eq(vehicle_id))
        .first(&mut conn)?;

    let record = conn.transaction::<VehicleMaintenance, AppError, _>(|conn| {
        diesel::update(vehicle_maintenance::table.find(maintenance_id))
            .set((
                vehicle_maintenance::date.eq(payload.date.unwrap_or(existing.date)),
                vehicle_maintenance::category.eq(payload
                    .category
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_else(|| existing.category.clone())),
                vehicle_maintenance::cost
                    .eq(payload.cost.clone().unwrap_or_else(|| existing.cost.clone())),
                vehicle_maintenance::mileage.eq(payload.mileage.unwrap_or(existing.mileage)),
                vehicle_maintenance::notes
                    .eq(payload.notes.clone().unwrap_or_else(|| existing.notes.clone())),
                vehicle_maintenance::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;
        if let Some(mileage) = payload.mileage {
            raise_vehicle_mileage(conn, vehicle_id, mileage)?;
        }
        log_vehicle_event(
            conn,
            vehicle_id,
            Some(user.user_id),
            VehicleEvent::MaintenanceEdited,
        )?;
        let record: VehicleMaintenance =
            vehicle_maintenance::table.find(maintenance_id).first(conn)?;
        Ok(record)
    })?;

    tracing::info!(vehicle_id = %vehicle_id, maintenance_id = %maintenance_id, user = %user.username, "maintenance edited");
    Ok(Json(maintenance_record(record)?))
}

pub async fn delete_maintenance(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path((vehicle_id, maintenance_id)): Path<(Uuid, Uuid)>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;

    conn.transaction::<(), AppError, _>(|conn| {
        let deleted = diesel::delete(
            vehicle_maintenance::table
                .filter(vehicle_maintenance::id.eq(maintenance_id))
                .filter(vehicle_maintenance::vehicle_id.eq(vehicle_id)),
        )
        .execute(conn)?;
        if deleted == 0 {
            return Err(AppError::not_found());
        }
        log_vehicle_event(
            conn,
            vehicle_id,
            Some(user.user_id),
            VehicleEvent::MaintenanceDeleted,
        )?;
        Ok(())
    })?;

    tracing::info!(vehicle_id = %vehicle_id, maintenance_id = %maintenance_id, user = %user.username, "maintenance deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Bumps the odometer to `mileage` when that is higher than the current
/// reading. Never lowers it.
pub fn raise_vehicle_mileage(
    conn: &mut PgConnection,
    vehicle_id: Uuid,
    mileage: i32,
) -> Result<(), diesel::result::Error> {
    diesel::update(
        vehicles::table
            .filter(vehicles::id.eq(vehicle_id))
            .filter(vehicles::mileage.lt(mileage)),
    )
    .set((
        vehicles::mileage.eq(mileage),
        vehicles::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)?;
    Ok(())
}

fn vehicle_summary(vehicle: Vehicle) -> AppResult<VehicleSummary> {
    let status = VehicleStatus::parse(&vehicle.status)
        .ok_or_else(|| AppError::internal(format!("corrupt vehicle status: {}", vehicle.status)))?;
    let vehicle_type = VehicleType::parse(&vehicle.vehicle_type).ok_or_else(|| {
        AppError::internal(format!("corrupt vehicle type: {}", vehicle.vehicle_type))
    })?;
    Ok(VehicleSummary {
        id: vehicle.id,
        org_id: vehicle.org_id,
        num: vehicle.num,
        vehicle_type,
        status,
        year: vehicle.year,
        make: vehicle.make,
        model: vehicle.model,
        title_num: vehicle.title_num,
        vin: vehicle.vin,
        license_plate: vehicle.license_plate,
        reg_expire_date: vehicle.reg_expire_date,
        mileage: vehicle.mileage,
        purchase_date: vehicle.purchase_date,
        purchase_cost: vehicle.purchase_cost,
        storage_location: vehicle.storage_location,
        notes: vehicle.notes,
        created_at: to_iso(vehicle.created_at),
        updated_at: to_iso(vehicle.updated_at),
    })
}

fn maintenance_record(record: VehicleMaintenance) -> AppResult<MaintenanceRecord> {
    let category = MaintenanceCategory::parse(&record.category).ok_or_else(|| {
        AppError::internal(format!("corrupt maintenance category: {}", record.category))
    })?;
    Ok(MaintenanceRecord {
        id: record.id,
        vehicle_id: record.vehicle_id,
        date: record.date,
        category,
        cost: record.cost,
        mileage: record.mileage,
        notes: record.notes,
        created_at: to_iso(record.created_at),
        updated_at: to_iso(record.updated_at),
    })
}
