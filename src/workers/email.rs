use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use crate::{jobs::JOB_SEND_EMAIL, mailer::OutboundEmail, models::Job, state::AppState};

use super::{JobExecution, JobHandler};

const MAX_ATTEMPTS: i32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(60);

pub struct SendEmailJob;

impl SendEmailJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendEmailJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for SendEmailJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_EMAIL
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let email: OutboundEmail = match serde_json::from_value(job.payload.clone()) {
            Ok(email) => email,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid email payload: {err}"),
                }
            }
        };

        match state.mailer.send(&email).await {
            Ok(()) => {
                info!(job_id = %job.id, to = %email.to, "notification email delivered");
                JobExecution::Success
            }
            Err(err) if job.attempts >= MAX_ATTEMPTS => JobExecution::Failed {
                error: format!("giving up after {} attempts: {err}", job.attempts),
            },
            Err(err) => JobExecution::Retry {
                delay: RETRY_DELAY,
                error: err.to_string(),
            },
        }
    }
}
