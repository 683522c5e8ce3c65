pub mod activity;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod emails;
pub mod error;
pub mod jobs;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod workers;

pub use config::AppConfig;
pub use state::AppState;
pub use workers::{default_handlers, Worker};
