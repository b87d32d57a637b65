use serde::{Deserialize, Serialize};

use super::booking::VehicleSize;

/// A bookable wash program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub duration_minutes: i64,
    /// Minor currency units.
    pub price_cents: i64,
    /// Concurrent bookings allowed under the service-capacity policy.
    pub capacity: i64,
    pub is_active: bool,
}

/// A physical wash bay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WashBay {
    pub id: i64,
    pub bay_number: i64,
    pub name: Option<String>,
    pub is_enabled: bool,
    pub min_size: VehicleSize,
    pub max_size: VehicleSize,
}

impl WashBay {
    pub fn accepts(&self, size: VehicleSize) -> bool {
        self.min_size <= size && size <= self.max_size
    }
}
