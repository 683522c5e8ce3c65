//! Append-only audit trails for trip requests and vehicles.
//!
//! Callers invoke these inside the same transaction as the row they mutate,
//! so a save and its activity record commit or roll back together.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{TripEvent, VehicleEvent};
use crate::models::{NewTripRequestActivity, NewVehicleActivity};
use crate::schema::{trip_request_activity, vehicle_activity};

pub fn log_trip_event(
    conn: &mut PgConnection,
    request_id: Uuid,
    user_id: Option<Uuid>,
    event: TripEvent,
) -> QueryResult<()> {
    diesel::insert_into(trip_request_activity::table)
        .values(&NewTripRequestActivity {
            id: Uuid::new_v4(),
            request_id,
            user_id,
            event: event.as_str().to_string(),
        })
        .execute(conn)?;
    Ok(())
}

pub fn log_vehicle_event(
    conn: &mut PgConnection,
    vehicle_id: Uuid,
    user_id: Option<Uuid>,
    event: VehicleEvent,
) -> QueryResult<()> {
    diesel::insert_into(vehicle_activity::table)
        .values(&NewVehicleActivity {
            id: Uuid::new_v4(),
            vehicle_id,
            user_id,
            event: event.as_str().to_string(),
        })
        .execute(conn)?;
    Ok(())
}
