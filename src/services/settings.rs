use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingResult;
use crate::models::BookingConfiguration;

/// Reads [`BookingConfiguration`] from the settings table, caching it for
/// `ttl`. Writers go through [`SettingsProvider::set`], which drops the cache.
pub struct SettingsProvider {
    ttl: Duration,
    cached: Mutex<Option<(Instant, BookingConfiguration)>>,
}

impl SettingsProvider {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    pub fn load(&self, conn: &Connection) -> BookingResult<BookingConfiguration> {
        if let Ok(cached) = self.cached.lock() {
            if let Some((loaded_at, config)) = cached.as_ref() {
                if loaded_at.elapsed() < self.ttl {
                    return Ok(config.clone());
                }
            }
        }

        let config = BookingConfiguration::from_map(&queries::get_settings(conn)?);
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((Instant::now(), config.clone()));
        }
        Ok(config)
    }

    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }

    pub fn set(&self, conn: &Connection, key: &str, value: &str) -> BookingResult<()> {
        queries::set_setting(conn, key, value)?;
        self.invalidate();
        tracing::info!(key, value, "setting updated");
        Ok(())
    }
}

impl Default for SettingsProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::settings::{KEY_LEAD_TIME, KEY_SLOT_INTERVAL};

    #[test]
    fn test_defaults_then_override() {
        let conn = db::init_db(":memory:").unwrap();
        let provider = SettingsProvider::default();
        assert_eq!(provider.load(&conn).unwrap(), BookingConfiguration::default());

        provider.set(&conn, KEY_LEAD_TIME, "5").unwrap();
        assert_eq!(provider.load(&conn).unwrap().lead_time_hours, 5);
    }

    #[test]
    fn test_cache_holds_until_invalidated() {
        let conn = db::init_db(":memory:").unwrap();
        let provider = SettingsProvider::new(Duration::from_secs(3600));
        assert_eq!(provider.load(&conn).unwrap().slot_interval_minutes, 30);

        // Written behind the provider's back.
        queries::set_setting(&conn, KEY_SLOT_INTERVAL, "15").unwrap();
        assert_eq!(provider.load(&conn).unwrap().slot_interval_minutes, 30);

        provider.invalidate();
        assert_eq!(provider.load(&conn).unwrap().slot_interval_minutes, 15);
    }

    #[test]
    fn test_zero_ttl_always_reloads() {
        let conn = db::init_db(":memory:").unwrap();
        let provider = SettingsProvider::new(Duration::ZERO);
        provider.load(&conn).unwrap();
        queries::set_setting(&conn, KEY_SLOT_INTERVAL, "20").unwrap();
        assert_eq!(provider.load(&conn).unwrap().slot_interval_minutes, 20);
    }
}
