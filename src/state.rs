use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::errors::{BookingError, BookingResult};
use crate::models::BookingConfiguration;
use crate::services::events::EventHub;
use crate::services::messaging::Notifier;
use crate::services::payments::PaymentGateway;
use crate::services::settings::SettingsProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub settings: SettingsProvider,
    pub events: EventHub,
    pub notifier: Arc<dyn Notifier>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        let settings = SettingsProvider::new(Duration::from_secs(config.settings_cache_ttl_secs));
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            settings,
            events: EventHub::default(),
            notifier,
            payments: None,
        }
    }

    pub fn with_payments(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(gateway);
        self
    }

    /// Lock the connection. Never hold the guard across an `.await`.
    pub fn conn(&self) -> BookingResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| BookingError::Internal(anyhow::anyhow!("database mutex poisoned")))
    }

    pub fn booking_config(&self) -> BookingResult<BookingConfiguration> {
        let db = self.conn()?;
        self.settings.load(&db)
    }
}
