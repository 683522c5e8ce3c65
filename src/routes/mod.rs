use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod drivers;
pub mod health;
pub mod orgs;
pub mod requests;
pub mod vehicles;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let orgs_routes = Router::new()
        .route("/", get(orgs::list_orgs).post(orgs::create_org))
        .route(
            "/:id",
            get(orgs::get_org)
                .patch(orgs::update_org)
                .delete(orgs::delete_org),
        )
        .route(
            "/:id/departments",
            get(orgs::list_departments).post(orgs::create_department),
        )
        .route(
            "/:id/departments/:dept_id",
            patch(orgs::update_department).delete(orgs::delete_department),
        )
        .route(
            "/:id/budgets",
            get(orgs::list_budgets).post(orgs::create_budget),
        )
        .route(
            "/:id/budgets/:budget_id",
            patch(orgs::update_budget).delete(orgs::delete_budget),
        );

    let drivers_routes = Router::new()
        .route("/", get(drivers::list_drivers).post(drivers::create_driver))
        .route("/search", get(drivers::search_drivers))
        .route(
            "/:id",
            get(drivers::get_driver)
                .patch(drivers::update_driver)
                .delete(drivers::delete_driver),
        )
        .route("/:id/deactivate", post(drivers::deactivate_driver))
        .route("/:id/reactivate", post(drivers::reactivate_driver))
        .route("/:id/availability", get(drivers::driver_availability));

    let vehicles_routes = Router::new()
        .route(
            "/",
            get(vehicles::list_vehicles).post(vehicles::create_vehicle),
        )
        .route(
            "/:id",
            get(vehicles::get_vehicle)
                .patch(vehicles::update_vehicle)
                .delete(vehicles::delete_vehicle),
        )
        .route("/:id/activity", get(vehicles::list_vehicle_activity))
        .route(
            "/:id/maintenance",
            get(vehicles::list_maintenance).post(vehicles::create_maintenance),
        )
        .route(
            "/:id/maintenance/:maintenance_id",
            patch(vehicles::update_maintenance).delete(vehicles::delete_maintenance),
        );

    let requests_routes = Router::new()
        .route(
            "/",
            get(requests::list_requests).post(requests::create_request),
        )
        .route(
            "/:id",
            get(requests::get_request)
                .patch(requests::update_request)
                .delete(requests::delete_request),
        )
        .route(
            "/:id/assign-moderator",
            post(requests::assign_request_moderator),
        )
        .route("/:id/approve", post(requests::approve_request))
        .route("/:id/deny", post(requests::deny_request))
        .route("/:id/reopen", post(requests::reopen_request))
        .route("/:id/return", post(requests::return_request_vehicle))
        .route("/:id/finalize", post(requests::finalize_request))
        .route("/:id/cancel", post(requests::cancel_request));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/orgs", orgs_routes)
        .route("/api/departments", get(orgs::load_departments))
        .route("/api/budgets", get(orgs::load_budgets))
        .nest("/api/drivers", drivers_routes)
        .nest("/api/vehicles", vehicles_routes)
        .nest("/api/requests", requests_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
