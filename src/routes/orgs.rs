use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use diesel::{dsl::count_star, prelude::*, result::DatabaseErrorKind, PgConnection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::Moderator,
    error::{AppError, AppResult},
    models::{Budget, Department, NewBudget, NewDepartment, NewOrganization, Organization},
    schema::{budgets, departments, organizations, trip_requests},
    state::AppState,
};

use super::requests::to_iso;

#[derive(Serialize)]
pub struct OrgSummary {
    pub id: Uuid,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrgDetail {
    pub org: OrgSummary,
    pub departments: Vec<DepartmentInfo>,
    pub budgets: Vec<BudgetInfo>,
}

#[derive(Serialize)]
pub struct DepartmentInfo {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct BudgetInfo {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateOrgRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct UpdateOrgRequest {
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateScopedRequest {
    pub num: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct UpdateScopedRequest {
    pub num: Option<String>,
    pub name: Option<String>,
}

fn org_summary(org: Organization) -> OrgSummary {
    OrgSummary {
        id: org.id,
        name: org.name,
        created_at: to_iso(org.created_at),
        updated_at: to_iso(org.updated_at),
    }
}

fn department_info(department: Department) -> DepartmentInfo {
    DepartmentInfo {
        id: department.id,
        org_id: department.org_id,
        num: department.num,
        name: department.name,
    }
}

fn budget_info(budget: Budget) -> BudgetInfo {
    BudgetInfo {
        id: budget.id,
        org_id: budget.org_id,
        num: budget.num,
        name: budget.name,
    }
}

pub async fn list_orgs(
    Moderator(_): Moderator,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<OrgSummary>>> {
    let mut conn = state.db()?;
    let orgs: Vec<Organization> = organizations::table
        .order(organizations::name.asc())
        .load(&mut conn)?;
    Ok(Json(orgs.into_iter().map(org_summary).collect()))
}

pub async fn create_org(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrgRequest>,
) -> AppResult<Json<OrgSummary>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let mut conn = state.db()?;
    let new_org = NewOrganization {
        id: Uuid::new_v4(),
        name: name.to_string(),
    };
    diesel::insert_into(organizations::table)
        .values(&new_org)
        .execute(&mut conn)?;

    tracing::info!(org_id = %new_org.id, user = %user.username, "organization created");

    let org: Organization = organizations::table.find(new_org.id).first(&mut conn)?;
    Ok(Json(org_summary(org)))
}

pub async fn get_org(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<OrgDetail>> {
    let mut conn = state.db()?;
    let org: Organization = organizations::table.find(org_id).first(&mut conn)?;

    let department_rows: Vec<Department> = departments::table
        .filter(departments::org_id.eq(org_id))
        .order(departments::name.asc())
        .load(&mut conn)?;
    let budget_rows: Vec<Budget> = budgets::table
        .filter(budgets::org_id.eq(org_id))
        .order(budgets::name.asc())
        .load(&mut conn)?;

    Ok(Json(OrgDetail {
        org: org_summary(org),
        departments: department_rows.into_iter().map(department_info).collect(),
        budgets: budget_rows.into_iter().map(budget_info).collect(),
    }))
}

pub async fn update_org(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<UpdateOrgRequest>,
) -> AppResult<Json<OrgSummary>> {
    let mut conn = state.db()?;
    let existing: Organization = organizations::table.find(org_id).first(&mut conn)?;

    if let Some(ref candidate) = payload.name {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return Err(AppError::bad_request("name must not be empty"));
        }
        if trimmed != existing.name {
            match diesel::update(organizations::table.find(org_id))
                .set((
                    organizations::name.eq(trimmed),
                    organizations::updated_at.eq(diesel::dsl::now),
                ))
                .execute(&mut conn)
            {
                Ok(_) => {}
                Err(diesel::result::Error::DatabaseError(
                    DatabaseErrorKind::UniqueViolation,
                    _,
                )) => {
                    return Err(AppError::bad_request("organization name already exists"));
                }
                Err(err) => return Err(AppError::from(err)),
            }
        }
    }

    let updated: Organization = organizations::table.find(org_id).first(&mut conn)?;
    Ok(Json(org_summary(updated)))
}

pub async fn delete_org(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;

    let in_use: i64 = trip_requests::table
        .filter(trip_requests::org_id.eq(org_id))
        .select(count_star())
        .first(&mut conn)?;
    if in_use > 0 {
        return Err(AppError::bad_request(
            "organization cannot be deleted while it is in use by trip requests",
        ));
    }

    let deleted = diesel::delete(organizations::table.find(org_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    tracing::info!(org_id = %org_id, user = %user.username, "organization deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_departments(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<Vec<DepartmentInfo>>> {
    let mut conn = state.db()?;
    ensure_org_exists(&mut conn, org_id)?;
    let rows: Vec<Department> = departments::table
        .filter(departments::org_id.eq(org_id))
        .order(departments::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(department_info).collect()))
}

pub async fn create_department(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateScopedRequest>,
) -> AppResult<Json<DepartmentInfo>> {
    let (num, name) = validate_scoped_fields(&payload.num, &payload.name)?;

    let mut conn = state.db()?;
    ensure_org_exists(&mut conn, org_id)?;

    let new_department = NewDepartment {
        id: Uuid::new_v4(),
        org_id,
        num,
        name,
    };
    match diesel::insert_into(departments::table)
        .values(&new_department)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(
                "department number already exists in this organization",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let department: Department = departments::table.find(new_department.id).first(&mut conn)?;
    Ok(Json(department_info(department)))
}

pub async fn update_department(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path((org_id, dept_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateScopedRequest>,
) -> AppResult<Json<DepartmentInfo>> {
    let mut conn = state.db()?;
    let existing: Department = departments::table
        .filter(departments::id.eq(dept_id))
        .filter(departments::org_id.eq(org_id))
        .first(&mut conn)?;

    let num = scoped_update_value(payload.num.as_deref(), &existing.num, "num")?;
    let name = scoped_update_value(payload.name.as_deref(), &existing.name, "name")?;

    diesel::update(departments::table.find(dept_id))
        .set((
            departments::num.eq(num),
            departments::name.eq(name),
            departments::updated_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)?;

    let updated: Department = departments::table.find(dept_id).first(&mut conn)?;
    Ok(Json(department_info(updated)))
}

pub async fn delete_department(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path((org_id, dept_id)): Path<(Uuid, Uuid)>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;

    let in_use: i64 = trip_requests::table
        .filter(trip_requests::department_id.eq(dept_id))
        .select(count_star())
        .first(&mut conn)?;
    if in_use > 0 {
        return Err(AppError::bad_request(
            "department cannot be deleted while it is in use by trip requests",
        ));
    }

    let deleted = diesel::delete(
        departments::table
            .filter(departments::id.eq(dept_id))
            .filter(departments::org_id.eq(org_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    tracing::info!(org_id = %org_id, department_id = %dept_id, user = %user.username, "department deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_budgets(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<Vec<BudgetInfo>>> {
    let mut conn = state.db()?;
    ensure_org_exists(&mut conn, org_id)?;
    let rows: Vec<Budget> = budgets::table
        .filter(budgets::org_id.eq(org_id))
        .order(budgets::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(budget_info).collect()))
}

pub async fn create_budget(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateScopedRequest>,
) -> AppResult<Json<BudgetInfo>> {
    let (num, name) = validate_scoped_fields(&payload.num, &payload.name)?;

    let mut conn = state.db()?;
    ensure_org_exists(&mut conn, org_id)?;

    let new_budget = NewBudget {
        id: Uuid::new_v4(),
        org_id,
        num,
        name,
    };
    match diesel::insert_into(budgets::table)
        .values(&new_budget)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(
                "budget number already exists in this organization",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let budget: Budget = budgets::table.find(new_budget.id).first(&mut conn)?;
    Ok(Json(budget_info(budget)))
}

pub async fn update_budget(
    Moderator(_): Moderator,
    State(state): State<AppState>,
    Path((org_id, budget_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateScopedRequest>,
) -> AppResult<Json<BudgetInfo>> {
    let mut conn = state.db()?;
    let existing: Budget = budgets::table
        .filter(budgets::id.eq(budget_id))
        .filter(budgets::org_id.eq(org_id))
        .first(&mut conn)?;

    let num = scoped_update_value(payload.num.as_deref(), &existing.num, "num")?;
    let name = scoped_update_value(payload.name.as_deref(), &existing.name, "name")?;

    diesel::update(budgets::table.find(budget_id))
        .set((
            budgets::num.eq(num),
            budgets::name.eq(name),
            budgets::updated_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)?;

    let updated: Budget = budgets::table.find(budget_id).first(&mut conn)?;
    Ok(Json(budget_info(updated)))
}

pub async fn delete_budget(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path((org_id, budget_id)): Path<(Uuid, Uuid)>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;

    let in_use: i64 = trip_requests::table
        .filter(trip_requests::budget_id.eq(budget_id))
        .select(count_star())
        .first(&mut conn)?;
    if in_use > 0 {
        return Err(AppError::bad_request(
            "budget cannot be deleted while it is in use by trip requests",
        ));
    }

    let deleted = diesel::delete(
        budgets::table
            .filter(budgets::id.eq(budget_id))
            .filter(budgets::org_id.eq(org_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    tracing::info!(org_id = %org_id, budget_id = %budget_id, user = %user.username, "budget deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct OrgScopedQuery {
    /// Comma-separated organization ids.
    pub orgs: Option<String>,
}

/// Dropdown loader used by the request form: departments for a set of orgs.
pub async fn load_departments(
    State(state): State<AppState>,
    Query(query): Query<OrgScopedQuery>,
) -> AppResult<Json<Vec<DepartmentInfo>>> {
    let org_ids = parse_org_ids(query.orgs.as_deref())?;
    if org_ids.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let mut conn = state.db()?;
    let rows: Vec<Department> = departments::table
        .filter(departments::org_id.eq_any(&org_ids))
        .order(departments::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(department_info).collect()))
}

pub async fn load_budgets(
    State(state): State<AppState>,
    Query(query): Query<OrgScopedQuery>,
) -> AppResult<Json<Vec<BudgetInfo>>> {
    let org_ids = parse_org_ids(query.orgs.as_deref())?;
    if org_ids.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let mut conn = state.db()?;
    let rows: Vec<Budget> = budgets::table
        .filter(budgets::org_id.eq_any(&org_ids))
        .order(budgets::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(budget_info).collect()))
}

fn parse_org_ids(raw: Option<&str>) -> AppResult<Vec<Uuid>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part)
                .map_err(|_| AppError::bad_request(format!("invalid organization id: {part}")))
        })
        .collect()
}

fn ensure_org_exists(conn: &mut PgConnection, org_id: Uuid) -> AppResult<()> {
    let exists: i64 = organizations::table
        .filter(organizations::id.eq(org_id))
        .select(count_star())
        .first(conn)?;
    if exists == 0 {
        return Err(AppError::not_found());
    }
    Ok(())
}

fn validate_scoped_fields(num: &str, name: &str) -> AppResult<(String, String)> {
    let num = num.trim();
    let name = name.trim();
    if num.is_empty() {
        return Err(AppError::bad_request("num must not be empty"));
    }
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    Ok((num.to_string(), name.to_string()))
}

fn scoped_update_value(
    candidate: Option<&str>,
    current: &str,
    field: &str,
) -> AppResult<String> {
    match candidate {
        None => Ok(current.to_string()),
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request(format!("{field} must not be empty")));
            }
            Ok(trimmed.to_string())
        }
    }
}
