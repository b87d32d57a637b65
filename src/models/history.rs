use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::booking::BookingStatus;
use crate::errors::BookingError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Customer,
    Staff,
    Admin,
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Customer => "customer",
            ActorRole::Staff => "staff",
            ActorRole::Admin => "admin",
            ActorRole::System => "system",
        }
    }

    /// Roles that may override customer-facing time limits.
    pub fn is_privileged(&self) -> bool {
        matches!(self, ActorRole::Admin | ActorRole::System)
    }
}

impl FromStr for ActorRole {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(ActorRole::Customer),
            "staff" => Ok(ActorRole::Staff),
            "admin" => Ok(ActorRole::Admin),
            "system" => Ok(ActorRole::System),
            _ => Err(BookingError::Validation(format!("unknown actor role: {s}"))),
        }
    }
}

/// Who is performing an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn system() -> Self {
        Self::new("system", ActorRole::System)
    }
}

/// One append-only audit row. `from_status` is `None` for the creation row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingStatusHistory {
    pub id: i64,
    pub booking_id: String,
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Written by a saga compensation rather than a workflow transition.
    pub is_compensation: bool,
    pub created_at: NaiveDateTime,
}
