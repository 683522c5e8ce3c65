//! Trip-request lifecycle notifications.
//!
//! Each builder returns the plain-text messages for one lifecycle event:
//! the requestor always gets a copy, and submission/cancellation also notify
//! the moderators' shared inbox when one is configured. Delivery happens via
//! the job queue, never inline with the request.

use diesel::pg::PgConnection;

use crate::config::AppConfig;
use crate::domain::TripStatus;
use crate::error::AppResult;
use crate::jobs::{enqueue_job, JOB_SEND_EMAIL};
use crate::mailer::OutboundEmail;
use crate::models::TripRequest;

pub fn request_submitted(config: &AppConfig, request: &TripRequest) -> Vec<OutboundEmail> {
    let detail_url = config.request_detail_url(request.id);
    let mut messages = vec![OutboundEmail {
        to: request.contact_email.clone(),
        subject: format!("Vehicle request {} submitted", request.id),
        body: format!(
            "{},\r\nYour vehicle request {} has been submitted and will be \
             processed in due time. You will be notified when it has been \
             processed. You can follow its progress here: {}. If you have \
             questions or problems with your request contact the \
             transportation office at {}.",
            request.contact_first_name, request.id, detail_url, config.mail_from
        ),
    }];

    if let Some(moderator_inbox) = &config.moderator_email {
        messages.push(OutboundEmail {
            to: moderator_inbox.clone(),
            subject: format!("New vehicle request {}", request.id),
            body: format!(
                "New vehicle request from {}: {}",
                request.contact_full_name(),
                detail_url
            ),
        });
    }

    messages
}

pub fn request_approved(config: &AppConfig, request: &TripRequest) -> Vec<OutboundEmail> {
    vec![requestor_message(
        config,
        request,
        format!("Your vehicle request {} has been APPROVED", request.id),
        "approved",
    )]
}

pub fn request_denied(config: &AppConfig, request: &TripRequest) -> Vec<OutboundEmail> {
    vec![requestor_message(
        config,
        request,
        format!("Your vehicle request {} has been DENIED", request.id),
        "denied",
    )]
}

pub fn request_cancelled(config: &AppConfig, request: &TripRequest) -> Vec<OutboundEmail> {
    let detail_url = config.request_detail_url(request.id);
    let mut messages = vec![OutboundEmail {
        to: request.contact_email.clone(),
        subject: format!("Vehicle request {} has been cancelled", request.id),
        body: format!(
            "{},\r\nYour vehicle request {} has been cancelled and will no \
             longer be processed. If you believe this is an error please \
             contact the transportation office at {}. Request details: {}",
            request.contact_first_name, request.id, config.mail_from, detail_url
        ),
    }];

    if let Some(moderator_inbox) = &config.moderator_email {
        messages.push(OutboundEmail {
            to: moderator_inbox.clone(),
            subject: format!("Vehicle request {} cancelled", request.id),
            body: format!(
                "Vehicle request from {} has been cancelled: {}",
                request.contact_full_name(),
                detail_url
            ),
        });
    }

    messages
}

pub fn status_changed(
    config: &AppConfig,
    request: &TripRequest,
    old_status: TripStatus,
    new_status: TripStatus,
) -> Vec<OutboundEmail> {
    vec![OutboundEmail {
        to: request.contact_email.clone(),
        subject: format!(
            "Vehicle request {} status updated to '{}'",
            request.id,
            new_status.display_name()
        ),
        body: format!(
            "{},\r\nYour vehicle request {} has had its status changed from \
             '{}' to '{}'. Check the request to see whether you need to \
             provide more information: {}",
            request.contact_first_name,
            request.id,
            old_status.display_name(),
            new_status.display_name(),
            config.request_detail_url(request.id)
        ),
    }]
}

/// Queue one `send-email` job per message.
pub fn enqueue(conn: &mut PgConnection, messages: Vec<OutboundEmail>) -> AppResult<()> {
    for message in messages {
        enqueue_job(conn, JOB_SEND_EMAIL, serde_json::to_value(&message)?, None)
            .map_err(anyhow::Error::from)?;
    }
    Ok(())
}

fn requestor_message(
    config: &AppConfig,
    request: &TripRequest,
    subject: String,
    verdict: &str,
) -> OutboundEmail {
    OutboundEmail {
        to: request.contact_email.clone(),
        subject,
        body: format!(
            "{},\r\nYour vehicle request {} has been {}. You can verify this \
             for yourself here: {}. If you have questions or problems with \
             your request contact the transportation office at {}.",
            request.contact_first_name,
            request.id,
            verdict,
            config.request_detail_url(request.id),
            config.mail_from
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_config(moderator_email: Option<&str>) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/motorpool".into(),
            database_max_pool_size: 2,
            server_host: "127.0.0.1".into(),
            server_port: 0,
            jwt_secret: "secret".into(),
            jwt_issuer: "motorpool".into(),
            jwt_audience: "motorpool-clients".into(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            portal_base_url: "https://transportation.example.org/".into(),
            mail_from: "transportation@example.org".into(),
            moderator_email: moderator_email.map(str::to_string),
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
        }
    }

    fn test_request() -> TripRequest {
        let now = Utc::now().naive_utc();
        TripRequest {
            id: Uuid::new_v4(),
            status: "pending".into(),
            org_id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            budget_id: Uuid::new_v4(),
            requestor_id: None,
            manager_id: None,
            contact_first_name: "Avery".into(),
            contact_last_name: "Banks".into(),
            contact_phone: "555-0100".into(),
            contact_email: "avery@example.org".into(),
            requested_driver: None,
            driver_id: None,
            vehicle_type: "bus".into(),
            vehicle_id: None,
            party_count: 12,
            depart_est: now,
            return_est: now,
            depart_act: None,
            return_act: None,
            destination: "Summer camp".into(),
            purpose: "Youth retreat".into(),
            trailer: false,
            agreement_accepted: true,
            mileage_est: 120,
            mileage_act: None,
            card_num: None,
            key_color: "none".into(),
            fuel_cost: None,
            vehicle_clean: false,
            vehicle_parked_proper: false,
            vehicle_problems: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn submission_notifies_requestor_and_moderators() {
        let config = test_config(Some("fleet@example.org"));
        let request = test_request();
        let messages = request_submitted(&config, &request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].to, "avery@example.org");
        assert!(messages[0].body.starts_with("Avery,"));
        assert!(messages[0]
            .body
            .contains(&format!("https://transportation.example.org/requests/{}", request.id)));
        assert_eq!(messages[1].to, "fleet@example.org");
        assert!(messages[1].body.contains("Avery Banks"));
    }

    #[test]
    fn submission_without_moderator_inbox_is_single_message() {
        let config = test_config(None);
        let messages = request_submitted(&config, &test_request());
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn status_change_names_both_statuses() {
        let config = test_config(None);
        let messages = status_changed(
            &config,
            &test_request(),
            TripStatus::Approved,
            TripStatus::Returned,
        );
        assert_eq!(messages.len(), 1);
        assert!(messages[0].subject.contains("Returned"));
        assert!(messages[0].body.contains("'Approved' to 'Returned'"));
    }
}
