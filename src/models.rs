use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = organizations)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = organizations)]
pub struct NewOrganization {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = departments)]
#[diesel(belongs_to(Organization, foreign_key = org_id))]
pub struct Department {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: String,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = departments)]
pub struct NewDepartment {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: String,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = budgets)]
#[diesel(belongs_to(Organization, foreign_key = org_id))]
pub struct Budget {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: String,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = budgets)]
pub struct NewBudget {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: String,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = drivers)]
pub struct Driver {
    pub id: Uuid,
    pub status: String,
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
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = drivers)]
pub struct NewDriver {
    pub id: Uuid,
    pub status: String,
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
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = driver_organizations)]
#[diesel(belongs_to(Driver))]
#[diesel(belongs_to(Organization, foreign_key = org_id))]
#[diesel(primary_key(driver_id, org_id))]
pub struct DriverOrganization {
    pub driver_id: Uuid,
    pub org_id: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = driver_organizations)]
pub struct NewDriverOrganization {
    pub driver_id: Uuid,
    pub org_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = vehicles)]
#[diesel(belongs_to(Organization, foreign_key = org_id))]
pub struct Vehicle {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: i32,
    pub vehicle_type: String,
    pub status: String,
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
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Vehicle {
    pub fn full_name(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vehicles)]
pub struct NewVehicle {
    pub id: Uuid,
    pub org_id: Uuid,
    pub num: i32,
    pub vehicle_type: String,
    pub status: String,
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
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = vehicle_maintenance)]
#[diesel(belongs_to(Vehicle))]
pub struct VehicleMaintenance {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub date: NaiveDate,
    pub category: String,
    pub cost: BigDecimal,
    pub mileage: i32,
    pub notes: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vehicle_maintenance)]
pub struct NewVehicleMaintenance {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub date: NaiveDate,
    pub category: String,
    pub cost: BigDecimal,
    pub mileage: i32,
    pub notes: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = vehicle_activity)]
#[diesel(belongs_to(Vehicle))]
pub struct VehicleActivity {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vehicle_activity)]
pub struct NewVehicleActivity {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = trip_requests)]
pub struct TripRequest {
    pub id: Uuid,
    pub status: String,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub budget_id: Uuid,
    pub requestor_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub contact_first_name: String,
    pub contact_last_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub requested_driver: Option<String>,
    pub driver_id: Option<Uuid>,
    pub vehicle_type: String,
    pub vehicle_id: Option<Uuid>,
    pub party_count: i32,
    pub depart_est: NaiveDateTime,
    pub return_est: NaiveDateTime,
    pub depart_act: Option<NaiveDateTime>,
    pub return_act: Option<NaiveDateTime>,
    pub destination: String,
    pub purpose: String,
    pub trailer: bool,
    pub agreement_accepted: bool,
    pub mileage_est: i32,
    pub mileage_act: Option<i32>,
    pub card_num: Option<String>,
    pub key_color: String,
    pub fuel_cost: Option<BigDecimal>,
    pub vehicle_clean: bool,
    pub vehicle_parked_proper: bool,
    pub vehicle_problems: Option<String>,
    pub submitted_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TripRequest {
    pub fn contact_full_name(&self) -> String {
        format!("{} {}", self.contact_first_name, self.contact_last_name)
    }

    /// Dispatch readiness: manager, driver, vehicle and card number must all
    /// be assigned before a request can go out.
    pub fn is_dispatch_ready(&self) -> bool {
        self.manager_id.is_some()
            && self.driver_id.is_some()
            && self.vehicle_id.is_some()
            && self.card_num.is_some()
    }

    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.manager_id.is_none() {
            missing.push("manager");
        }
        if self.vehicle_id.is_none() {
            missing.push("vehicle");
        }
        if self.driver_id.is_none() {
            missing.push("driver");
        }
        if self.card_num.is_none() {
            missing.push("card number");
        }
        if matches!(self.status.as_str(), "approved" | "returned") && self.mileage_act.is_none() {
            missing.push("actual mileage");
        }
        missing
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = trip_requests)]
pub struct NewTripRequest {
    pub id: Uuid,
    pub status: String,
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub budget_id: Uuid,
    pub requestor_id: Option<Uuid>,
    pub contact_first_name: String,
    pub contact_last_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub requested_driver: Option<String>,
    pub vehicle_type: String,
    pub party_count: i32,
    pub depart_est: NaiveDateTime,
    pub return_est: NaiveDateTime,
    pub destination: String,
    pub purpose: String,
    pub trailer: bool,
    pub agreement_accepted: bool,
    pub mileage_est: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = trip_request_activity)]
#[diesel(belongs_to(TripRequest, foreign_key = request_id))]
pub struct TripRequestActivity {
    pub id: Uuid,
    pub request_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = trip_request_activity)]
pub struct NewTripRequestActivity {
    pub id: Uuid,
    pub request_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}
