use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::models::qr::QrId;
use crate::state::AppState;

/// QR assignment notice for the user a code was generated for.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recipient_email: String,
    pub recipient_name: String,
    pub qr_id: QrId,
    pub company_name: String,
    pub location_name: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub async fn enqueue_notification(
    state: &AppState,
    notification: Notification,
) -> Result<(), AppError> {
    // Counted before the send so the worker's decrement never runs first.
    state.metrics.notifications_in_queue.inc();

    if let Err(err) = state.notification_tx.send(notification).await {
        state.metrics.notifications_in_queue.dec();
        return Err(AppError::Internal(format!(
            "notification queue send failed: {err}"
        )));
    }

    Ok(())
}

pub fn render_email(notification: &Notification, sender: &str) -> EmailMessage {
    let body = format!(
        "Dear {name},\n\n\
         You have been assigned a new QR code for tracking by {company}.\n\n\
         QR Code Details:\n\
         - QR Code ID: {qr_id}\n\
         - Location: {location}\n\
         - Company: {company}\n\
         - Assigned Date: {assigned}\n\n\
         Use this QR code ID to follow your delivery in real time.\n",
        name = notification.recipient_name,
        company = notification.company_name,
        qr_id = notification.qr_id,
        location = notification.location_name,
        assigned = notification.assigned_at.format("%Y-%m-%d %H:%M:%S"),
    );

    EmailMessage {
        from: sender.to_string(),
        to: notification.recipient_email.clone(),
        subject: format!("QR Code Assignment: {}", notification.qr_id),
        body,
    }
}

/// Stand-in for a mail transport: the rendered message is only logged.
fn deliver(message: &EmailMessage) -> Result<(), AppError> {
    if message.to.trim().is_empty() {
        return Err(AppError::BadRequest("notification has no recipient".to_string()));
    }

    info!(
        from = %message.from,
        to = %message.to,
        subject = %message.subject,
        body = %message.body,
        "email notification"
    );
    Ok(())
}

pub async fn run_notification_worker(
    state: Arc<AppState>,
    mut notification_rx: mpsc::Receiver<Notification>,
    sender: String,
) {
    info!("notification worker started");

    while let Some(notification) = notification_rx.recv().await {
        state.metrics.notifications_in_queue.dec();

        let message = render_email(&notification, &sender);
        match deliver(&message) {
            Ok(()) => {
                state
                    .metrics
                    .notifications_total
                    .with_label_values(&["success"])
                    .inc();
            }
            Err(err) => {
                state
                    .metrics
                    .notifications_total
                    .with_label_values(&["error"])
                    .inc();
                error!(qr_id = %notification.qr_id, error = %err, "failed to send notification");
            }
        }
    }

    warn!("notification worker stopped: queue channel closed");
}
