//! Outbound notification fanout.
//!
//! Notifications are best-effort side effects: they are handed off to
//! detached tasks, never prolong the request path, and never fail the
//! triggering transition. Failures are logged per recipient.

use std::sync::Arc;

use cb_tokio::task::CbTask;
use tracing::warn;

use crate::traits::{EmailApi, EmailMessage};

/// The transactional email templates, by wire name.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EmailTemplate {
    BookingConfirmation,
    BookingAccepted,
    BookingCancelled,
    BookingCompleted,
    CleanerApproved,
    CleanerRejected,
    PayoutProcessed,
    Welcome,
}

impl EmailTemplate {
    /// The `templateName` sent to the email transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingConfirmation => "booking-confirmation",
            Self::BookingAccepted => "booking-accepted",
            Self::BookingCancelled => "booking-cancelled",
            Self::BookingCompleted => "booking-completed",
            Self::CleanerApproved => "cleaner-approved",
            Self::CleanerRejected => "cleaner-rejected",
            Self::PayoutProcessed => "payout-processed",
            Self::Welcome => "welcome",
        }
    }
}

/// Fans out transactional emails without coupling callers to the
/// transport's failure modes.
#[derive(Clone)]
pub struct Notifier {
    email_api: Arc<dyn EmailApi>,
}

impl Notifier {
    pub fn new(email_api: Arc<dyn EmailApi>) -> Self {
        Self { email_api }
    }

    /// Fire-and-forget send on a detached task. Skips silently when the
    /// recipient has no email on file (phone-only users).
    pub fn send_detached(
        &self,
        to: Option<&str>,
        template: EmailTemplate,
        props: serde_json::Value,
    ) {
        let Some(to) = to else { return };

        let message = EmailMessage::Template {
            to: to.to_owned(),
            template,
            props,
        };
        let email_api = self.email_api.clone();

        CbTask::spawn_unnamed(async move {
            if let Err(e) = email_api.send(&message).await {
                warn!("Failed to send {} email: {e:#}", template.as_str());
            }
        })
        .detach();
    }

    /// Awaited send for callers already running on a background task.
    /// Failures are still logged and swallowed.
    pub async fn send_logged(
        &self,
        to: Option<&str>,
        template: EmailTemplate,
        props: serde_json::Value,
    ) {
        let Some(to) = to else { return };

        let message = EmailMessage::Template {
            to: to.to_owned(),
            template,
            props,
        };
        if let Err(e) = self.email_api.send(&message).await {
            warn!("Failed to send {} email: {e:#}", template.as_str());
        }
    }
}
