use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::errors::BookingError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub service_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Always `start_time + service.duration`, fixed at creation.
    pub end_time: NaiveTime,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub vehicle_size: VehicleSize,
    pub vehicle_plate: Option<String>,
    pub notes: Option<String>,
    pub assigned_bay_id: Option<i64>,
    pub bay_assigned_at: Option<NaiveDateTime>,
    pub bay_assigned_by: Option<String>,
    pub confirmation_code: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub cancelled_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Hours from `now` until the appointment starts (negative once it has begun).
    pub fn hours_until_start(&self, now: NaiveDateTime) -> f64 {
        (self.starts_at() - now).num_seconds() as f64 / 3600.0
    }
}

/// What a customer submits when booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub service_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[serde(default)]
    pub vehicle_size: VehicleSize,
    pub vehicle_plate: Option<String>,
    pub notes: Option<String>,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.customer_name.trim().is_empty() {
            return Err(BookingError::Validation("customer name is required".into()));
        }
        if !self.customer_email.contains('@') {
            return Err(BookingError::Validation(format!(
                "invalid email address: {}",
                self.customer_email
            )));
        }
        if self.customer_phone.trim().is_empty() {
            return Err(BookingError::Validation("customer phone is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    }

    /// Whether a booking in this status holds its slot on the calendar.
    pub fn occupies_calendar(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::NoShow)
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| BookingError::Validation(format!("unknown booking status: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(BookingError::Validation(format!("unknown payment status: {s}"))),
        }
    }
}

/// Vehicle size class, chosen from a closed set when the booking is taken.
/// Ordered so bays can declare an inclusive `min..=max` range.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum VehicleSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl VehicleSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleSize::Small => "small",
            VehicleSize::Medium => "medium",
            VehicleSize::Large => "large",
        }
    }
}

impl FromStr for VehicleSize {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(VehicleSize::Small),
            "medium" => Ok(VehicleSize::Medium),
            "large" => Ok(VehicleSize::Large),
            _ => Err(BookingError::Validation(format!(
                "vehicle size must be one of small, medium, large (got '{s}')"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest {
            service_id: 1,
            date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            customer_name: "Alice".to_string(),
            customer_email: "alice@example.com".to_string(),
            customer_phone: "+15551110000".to_string(),
            vehicle_size: VehicleSize::Medium,
            vehicle_plate: None,
            notes: None,
        }
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in BookingStatus::ALL {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("done".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_terminal_and_occupying() {
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::NoShow.is_terminal());
        assert!(!BookingStatus::InProgress.is_terminal());
        assert!(BookingStatus::Pending.occupies_calendar());
        assert!(BookingStatus::Completed.occupies_calendar());
        assert!(!BookingStatus::Cancelled.occupies_calendar());
        assert!(!BookingStatus::NoShow.occupies_calendar());
    }

    #[test]
    fn test_vehicle_size_closed_set() {
        assert_eq!(" Large ".parse::<VehicleSize>().unwrap(), VehicleSize::Large);
        assert!("pickup truck".parse::<VehicleSize>().is_err());
        assert!(VehicleSize::Small < VehicleSize::Medium);
        assert!(VehicleSize::Medium < VehicleSize::Large);
    }

    #[test]
    fn test_request_validation() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.customer_email = "nope".to_string();
        assert!(matches!(bad.validate(), Err(BookingError::Validation(_))));

        let mut bad = request();
        bad.customer_name = "  ".to_string();
        assert!(bad.validate().is_err());
    }
}
