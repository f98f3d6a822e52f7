use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::engine::notifier::Notification;
use crate::error::AppError;
use crate::models::company::Company;
use crate::models::partner::DeliveryPartner;
use crate::models::qr::{QrCode, QrId};
use crate::models::tracking::{PersonalLocation, TrackingView};
use crate::models::user::User;
use crate::observability::metrics::Metrics;

pub const DEFAULT_QR_ID_ATTEMPTS: usize = 100;
pub const DEFAULT_STATIC_DIR: &str = "static";

pub struct AppState {
    pub companies: DashMap<Uuid, Company>,
    pub users: DashMap<Uuid, User>,
    pub partners: DashMap<Uuid, DeliveryPartner>,
    pub company_emails: DashMap<String, Uuid>,
    pub user_emails: DashMap<String, Uuid>,
    pub partner_emails: DashMap<String, Uuid>,
    pub qr_codes: DashMap<QrId, QrCode>,
    pub personal_locations: DashMap<String, PersonalLocation>,
    pub notification_tx: mpsc::Sender<Notification>,
    pub tracking_events_tx: broadcast::Sender<TrackingView>,
    pub metrics: Metrics,
    pub qr_id_max_attempts: usize,
    pub static_dir: String,
}

impl AppState {
    pub fn new(
        notification_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (notification_tx, notification_rx) = mpsc::channel(notification_queue_size);
        let (tracking_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                companies: DashMap::new(),
                users: DashMap::new(),
                partners: DashMap::new(),
                company_emails: DashMap::new(),
                user_emails: DashMap::new(),
                partner_emails: DashMap::new(),
                qr_codes: DashMap::new(),
                personal_locations: DashMap::new(),
                notification_tx,
                tracking_events_tx,
                metrics: Metrics::new(),
                qr_id_max_attempts: DEFAULT_QR_ID_ATTEMPTS,
                static_dir: DEFAULT_STATIC_DIR.to_string(),
            },
            notification_rx,
        )
    }

    pub fn with_qr_id_attempts(mut self, attempts: usize) -> Self {
        self.qr_id_max_attempts = attempts.max(1);
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<String>) -> Self {
        self.static_dir = dir.into();
        self
    }

    pub fn register_company(&self, company: Company) -> Result<Company, AppError> {
        reserve_email(&self.company_emails, &company.email, company.id)?;
        self.companies.insert(company.id, company.clone());
        Ok(company)
    }

    pub fn register_user(&self, user: User) -> Result<User, AppError> {
        reserve_email(&self.user_emails, &user.email, user.id)?;
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn register_partner(&self, partner: DeliveryPartner) -> Result<DeliveryPartner, AppError> {
        reserve_email(&self.partner_emails, &partner.email, partner.id)?;
        self.partners.insert(partner.id, partner.clone());
        Ok(partner)
    }

    pub fn partner_by_email(&self, email: &str) -> Option<DeliveryPartner> {
        let id = *self.partner_emails.get(email)?;
        self.partners.get(&id).map(|entry| entry.value().clone())
    }
}

/// Claims `email` for `id`. Check and claim share one shard lock, so two
/// concurrent registrations cannot both win.
fn reserve_email(index: &DashMap<String, Uuid>, email: &str, id: Uuid) -> Result<(), AppError> {
    match index.entry(email.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(id);
            Ok(())
        }
        Entry::Occupied(_) => Err(AppError::Conflict(format!(
            "email {email} already registered"
        ))),
    }
}
