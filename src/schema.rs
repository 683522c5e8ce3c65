diesel::table! {
    budgets (id) {
        id -> Uuid,
        org_id -> Uuid,
        #[max_length = 20]
        num -> Varchar,
        #[max_length = 50]
        name -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    departments (id) {
        id -> Uuid,
        org_id -> Uuid,
        #[max_length = 20]
        num -> Varchar,
        #[max_length = 50]
        name -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    driver_organizations (driver_id, org_id) {
        driver_id -> Uuid,
        org_id -> Uuid,
    }
}

diesel::table! {
    drivers (id) {
        id -> Uuid,
        #[max_length = 16]
        status -> Varchar,
        #[max_length = 32]
        first_name -> Varchar,
        #[max_length = 32]
        last_name -> Varchar,
        #[max_length = 10]
        license_num -> Nullable<Varchar>,
        license_expires -> Nullable<Date>,
        birth_date -> Nullable<Date>,
        #[max_length = 2]
        state -> Nullable<Varchar>,
        #[max_length = 31]
        phone -> Nullable<Varchar>,
        #[max_length = 254]
        email -> Nullable<Varchar>,
        #[max_length = 30]
        restrictions -> Nullable<Varchar>,
        has_cdl -> Bool,
        notes -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    jobs (id) {
        id -> Uuid,
        job_type -> Text,
        payload -> Jsonb,
        status -> Text,
        attempts -> Int4,
        run_after -> Timestamptz,
        last_error -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    organizations (id) {
        id -> Uuid,
        #[max_length = 50]
        name -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    trip_request_activity (id) {
        id -> Uuid,
        request_id -> Uuid,
        user_id -> Nullable<Uuid>,
        #[max_length = 16]
        event -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    trip_requests (id) {
        id -> Uuid,
        #[max_length = 16]
        status -> Varchar,
        org_id -> Uuid,
        department_id -> Uuid,
        budget_id -> Uuid,
        requestor_id -> Nullable<Uuid>,
        manager_id -> Nullable<Uuid>,
        #[max_length = 32]
        contact_first_name -> Varchar,
        #[max_length = 32]
        contact_last_name -> Varchar,
        #[max_length = 31]
        contact_phone -> Varchar,
        #[max_length = 254]
        contact_email -> Varchar,
        #[max_length = 255]
        requested_driver -> Nullable<Varchar>,
        driver_id -> Nullable<Uuid>,
        #[max_length = 16]
        vehicle_type -> Varchar,
        vehicle_id -> Nullable<Uuid>,
        party_count -> Int4,
        depart_est -> Timestamptz,
        return_est -> Timestamptz,
        depart_act -> Nullable<Timestamptz>,
        return_act -> Nullable<Timestamptz>,
        #[max_length = 255]
        destination -> Varchar,
        purpose -> Text,
        trailer -> Bool,
        agreement_accepted -> Bool,
        mileage_est -> Int4,
        mileage_act -> Nullable<Int4>,
        #[max_length = 32]
        card_num -> Nullable<Varchar>,
        #[max_length = 16]
        key_color -> Varchar,
        fuel_cost -> Nullable<Numeric>,
        vehicle_clean -> Bool,
        vehicle_parked_proper -> Bool,
        #[max_length = 256]
        vehicle_problems -> Nullable<Varchar>,
        submitted_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        #[max_length = 100]
        username -> Varchar,
        #[max_length = 255]
        password_hash -> Varchar,
        #[max_length = 32]
        first_name -> Varchar,
        #[max_length = 32]
        last_name -> Varchar,
        #[max_length = 254]
        email -> Varchar,
        #[max_length = 16]
        role -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    vehicle_activity (id) {
        id -> Uuid,
        vehicle_id -> Uuid,
        user_id -> Nullable<Uuid>,
        #[max_length = 32]
        event -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    vehicle_maintenance (id) {
        id -> Uuid,
        vehicle_id -> Uuid,
        date -> Date,
        #[max_length = 16]
        category -> Varchar,
        cost -> Numeric,
        mileage -> Int4,
        notes -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    vehicles (id) {
        id -> Uuid,
        org_id -> Uuid,
        num -> Int4,
        #[max_length = 16]
        vehicle_type -> Varchar,
        #[max_length = 16]
        status -> Varchar,
        year -> Int4,
        #[max_length = 30]
        make -> Varchar,
        #[max_length = 30]
        model -> Varchar,
        #[max_length = 30]
        title_num -> Varchar,
        #[max_length = 40]
        vin -> Varchar,
        #[max_length = 10]
        license_plate -> Varchar,
        reg_expire_date -> Date,
        mileage -> Int4,
        purchase_date -> Nullable<Date>,
        purchase_cost -> Nullable<Numeric>,
        #[max_length = 128]
        storage_location -> Nullable<Varchar>,
        notes -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(budgets -> organizations (org_id));
diesel::joinable!(departments -> organizations (org_id));
diesel::joinable!(driver_organizations -> drivers (driver_id));
diesel::joinable!(driver_organizations -> organizations (org_id));
diesel::joinable!(trip_request_activity -> trip_requests (request_id));
diesel::joinable!(trip_request_activity -> users (user_id));
diesel::joinable!(trip_requests -> budgets (budget_id));
diesel::joinable!(trip_requests -> departments (department_id));
diesel::joinable!(trip_requests -> drivers (driver_id));
diesel::joinable!(trip_requests -> organizations (org_id));
diesel::joinable!(trip_requests -> vehicles (vehicle_id));
diesel::joinable!(vehicle_activity -> users (user_id));
diesel::joinable!(vehicle_activity -> vehicles (vehicle_id));
diesel::joinable!(vehicle_maintenance -> vehicles (vehicle_id));
diesel::joinable!(vehicles -> organizations (org_id));

diesel::allow_tables_to_appear_in_same_query!(
    budgets,
    departments,
    driver_organizations,
    drivers,
    jobs,
    organizations,
    trip_request_activity,
    trip_requests,
    users,
    vehicle_activity,
    vehicle_maintenance,
    vehicles,
);
