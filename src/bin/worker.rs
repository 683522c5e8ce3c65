use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use motorpool::{
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    mailer::{Mailer, NoopMailer, SmtpMailer},
    state::AppState,
    workers::{default_handlers, Worker},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        "starting motorpool worker"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;

    let mailer: Arc<dyn Mailer> = if config.smtp_host.is_some() {
        Arc::new(SmtpMailer::from_config(&config)?)
    } else {
        tracing::warn!("SMTP_HOST not set, outbound email is disabled");
        Arc::new(NoopMailer)
    };

    let jwt = JwtService::from_config(&config)?;
    let state = Arc::new(AppState::new(pool, config, mailer, jwt));

    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));
    worker.run().await;
    Ok(())
}
