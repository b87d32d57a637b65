use crate::models::{ActorRole, BookingStatus};

/// Why the status workflow refused a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDenial {
    /// No rule exists for this (from, to) pair.
    NoRule,
    /// A rule exists but the actor's role is not in its allowed set.
    RoleNotPermitted(ActorRole),
    /// The rule's eligibility condition evaluated false.
    ConditionFailed(&'static str),
    /// The rule requires a reason and none was given.
    ReasonRequired,
}

impl std::fmt::Display for TransitionDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionDenial::NoRule => write!(f, "no transition rule"),
            TransitionDenial::RoleNotPermitted(role) => {
                write!(f, "role '{}' may not perform this transition", role.as_str())
            }
            TransitionDenial::ConditionFailed(condition) => {
                write!(f, "eligibility condition failed: {condition}")
            }
            TransitionDenial::ReasonRequired => write!(f, "a reason is required"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("invalid transition {} -> {}: {denial}", from_label(.from), .to.as_str())]
    InvalidTransition {
        from: Option<BookingStatus>,
        to: BookingStatus,
        denial: TransitionDenial,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("payment failed: {0}")]
    Payment(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    /// Failures worth retrying inside a saga step. Business outcomes
    /// (conflicts, denials, not-found) never are.
    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::Database(_) | BookingError::Internal(_))
    }

    pub fn denial(&self) -> Option<&TransitionDenial> {
        match self {
            BookingError::InvalidTransition { denial, .. } => Some(denial),
            _ => None,
        }
    }
}

fn from_label(from: &Option<BookingStatus>) -> &'static str {
    from.as_ref().map(BookingStatus::as_str).unwrap_or("(none)")
}

pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_message_names_rule() {
        let err = BookingError::InvalidTransition {
            from: Some(BookingStatus::Confirmed),
            to: BookingStatus::Cancelled,
            denial: TransitionDenial::ConditionFailed("cancellation deadline passed"),
        };
        assert_eq!(
            err.to_string(),
            "invalid transition confirmed -> cancelled: eligibility condition failed: cancellation deadline passed"
        );
    }

    #[test]
    fn test_initial_transition_message() {
        let err = BookingError::InvalidTransition {
            from: None,
            to: BookingStatus::Completed,
            denial: TransitionDenial::NoRule,
        };
        assert_eq!(err.to_string(), "invalid transition (none) -> completed: no transition rule");
    }

    #[test]
    fn test_transient_classification() {
        assert!(BookingError::Internal(anyhow::anyhow!("disk")).is_transient());
        assert!(!BookingError::SlotUnavailable("10:00".into()).is_transient());
        assert!(!BookingError::NotFound("booking x".into()).is_transient());
    }
}
