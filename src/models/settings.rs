use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How many concurrent bookings a single start time can take.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotCapacityPolicy {
    /// Capacity is the number of enabled wash bays; every booking of the day counts.
    #[default]
    BayPool,
    /// Capacity is `service.capacity`; only bookings of the same service count.
    ServiceCapacity,
}

impl SlotCapacityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotCapacityPolicy::BayPool => "bay_pool",
            SlotCapacityPolicy::ServiceCapacity => "service_capacity",
        }
    }
}

impl FromStr for SlotCapacityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bay_pool" => Ok(SlotCapacityPolicy::BayPool),
            "service_capacity" => Ok(SlotCapacityPolicy::ServiceCapacity),
            _ => Err(format!("unknown slot capacity policy: {s}")),
        }
    }
}

pub const KEY_SLOT_INTERVAL: &str = "slot_interval_minutes";
pub const KEY_LEAD_TIME: &str = "lead_time_hours";
pub const KEY_MAX_ADVANCE: &str = "max_advance_days";
pub const KEY_CANCELLATION_DEADLINE: &str = "cancellation_deadline_hours";
pub const KEY_AUTO_ASSIGN: &str = "auto_assign_bays";
pub const KEY_AUTO_CONFIRM: &str = "auto_confirm";
pub const KEY_CAPACITY_POLICY: &str = "slot_capacity_policy";
pub const KEY_NO_SHOW_GRACE: &str = "no_show_grace_minutes";

/// Tunable business parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingConfiguration {
    pub slot_interval_minutes: i64,
    pub lead_time_hours: i64,
    pub max_advance_days: i64,
    pub cancellation_deadline_hours: i64,
    pub auto_assign_bays: bool,
    pub auto_confirm: bool,
    pub capacity_policy: SlotCapacityPolicy,
    pub no_show_grace_minutes: i64,
}

impl Default for BookingConfiguration {
    fn default() -> Self {
        Self {
            slot_interval_minutes: 30,
            lead_time_hours: 2,
            max_advance_days: 30,
            cancellation_deadline_hours: 24,
            auto_assign_bays: true,
            auto_confirm: false,
            capacity_policy: SlotCapacityPolicy::BayPool,
            no_show_grace_minutes: 30,
        }
    }
}

impl BookingConfiguration {
    /// Build from raw key/value rows. Missing or unparsable keys keep their
    /// default; a zero or negative slot interval is rejected the same way.
    pub fn from_map(values: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let int = |key: &str, fallback: i64| -> i64 {
            match values.get(key).map(|v| v.trim().parse::<i64>()) {
                Some(Ok(v)) if v >= 0 => v,
                Some(_) => {
                    tracing::warn!(key, "ignoring invalid setting, using default");
                    fallback
                }
                None => fallback,
            }
        };
        let flag = |key: &str, fallback: bool| -> bool {
            match values.get(key).map(|v| v.trim().to_lowercase()) {
                Some(v) if matches!(v.as_str(), "1" | "true" | "on" | "yes") => true,
                Some(v) if matches!(v.as_str(), "0" | "false" | "off" | "no") => false,
                Some(_) => {
                    tracing::warn!(key, "ignoring invalid setting, using default");
                    fallback
                }
                None => fallback,
            }
        };

        let mut interval = int(KEY_SLOT_INTERVAL, defaults.slot_interval_minutes);
        if interval == 0 {
            interval = defaults.slot_interval_minutes;
        }

        let capacity_policy = match values.get(KEY_CAPACITY_POLICY) {
            Some(v) => v.trim().parse::<SlotCapacityPolicy>().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "ignoring invalid setting, using default");
                defaults.capacity_policy
            }),
            None => defaults.capacity_policy,
        };

        Self {
            slot_interval_minutes: interval,
            lead_time_hours: int(KEY_LEAD_TIME, defaults.lead_time_hours),
            max_advance_days: int(KEY_MAX_ADVANCE, defaults.max_advance_days),
            cancellation_deadline_hours: int(
                KEY_CANCELLATION_DEADLINE,
                defaults.cancellation_deadline_hours,
            ),
            auto_assign_bays: flag(KEY_AUTO_ASSIGN, defaults.auto_assign_bays),
            auto_confirm: flag(KEY_AUTO_CONFIRM, defaults.auto_confirm),
            capacity_policy,
            no_show_grace_minutes: int(KEY_NO_SHOW_GRACE, defaults.no_show_grace_minutes),
        }
    }
}
