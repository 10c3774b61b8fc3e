use crate::domain::policy::PolicyViolation;
use crate::domain::reschedule::RescheduleExhausted;
use crate::infrastructure::error::InfraError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("calendar authentication failed: {0}")]
    Unauthenticated(String),
    #[error("calendar request failed: {0}")]
    Upstream(String),
    #[error("no legal slot found for '{title}' within {attempts} attempts")]
    SchedulingExhausted { title: String, attempts: u32 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlannerError {
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Policy(violation) => match violation {
                PolicyViolation::OutsideAllowedHours { .. }
                | PolicyViolation::DescriptionIncomplete(_) => 400,
                PolicyViolation::ConflictsWithPrimary(_)
                | PolicyViolation::InsufficientSpacing(_)
                | PolicyViolation::DeletionBlocked { .. } => 409,
            },
            Self::Unauthenticated(_) => 401,
            Self::NotFound(_) => 404,
            Self::SchedulingExhausted { .. } => 409,
            Self::Upstream(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Policy(PolicyViolation::OutsideAllowedHours { .. }) => "outside_allowed_hours",
            Self::Policy(PolicyViolation::ConflictsWithPrimary(_)) => "conflicts_with_primary",
            Self::Policy(PolicyViolation::InsufficientSpacing(_)) => "insufficient_spacing",
            Self::Policy(PolicyViolation::DeletionBlocked { .. }) => "deletion_blocked",
            Self::Policy(PolicyViolation::DescriptionIncomplete(_)) => "description_incomplete",
            Self::NotFound(_) => "not_found",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Upstream(_) => "upstream_failure",
            Self::SchedulingExhausted { .. } => "scheduling_exhausted",
            Self::Internal(_) => "internal",
        }
    }

    pub fn is_reschedulable(&self) -> bool {
        matches!(self, Self::Policy(violation) if violation.is_reschedulable())
    }
}

impl From<InfraError> for PlannerError {
    fn from(error: InfraError) -> Self {
        match error {
            InfraError::Unauthenticated(message) => Self::Unauthenticated(message),
            InfraError::NotFound(message) => Self::NotFound(message),
            InfraError::Upstream(message) | InfraError::Transient(message) => Self::Upstream(message),
            InfraError::InvalidConfig(message) => Self::Validation(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<RescheduleExhausted> for PlannerError {
    fn from(error: RescheduleExhausted) -> Self {
        Self::SchedulingExhausted {
            title: error.title,
            attempts: error.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_failure_kind() {
        assert_eq!(PlannerError::Validation("bad".to_string()).status(), 400);
        assert_eq!(
            PlannerError::Policy(PolicyViolation::OutsideAllowedHours {
                start: "a".to_string(),
                end: "b".to_string(),
            })
            .status(),
            400
        );
        assert_eq!(
            PlannerError::Policy(PolicyViolation::DeletionBlocked {
                title: "Spring Race 5k".to_string(),
            })
            .status(),
            409
        );
        assert_eq!(PlannerError::from(InfraError::NotFound("evt".to_string())).status(), 404);
        assert_eq!(
            PlannerError::from(InfraError::Unauthenticated("expired".to_string())).status(),
            401
        );
        assert_eq!(PlannerError::from(InfraError::Transient("reset".to_string())).status(), 502);
        assert_eq!(
            PlannerError::from(InfraError::State("poisoned".to_string())).kind(),
            "internal"
        );
    }

    #[test]
    fn upstream_message_does_not_assume_a_write() {
        let error = PlannerError::Upstream("freeBusy returned 503".to_string());
        assert_eq!(error.to_string(), "calendar request failed: freeBusy returned 503");
        assert_eq!(error.kind(), "upstream_failure");
    }

    #[test]
    fn only_hours_conflict_and_spacing_are_reschedulable() {
        assert!(PlannerError::Policy(PolicyViolation::InsufficientSpacing(Vec::new())).is_reschedulable());
        assert!(
            !PlannerError::Policy(PolicyViolation::DescriptionIncomplete(vec!["TSS".to_string()]))
                .is_reschedulable()
        );
        assert!(!PlannerError::Upstream("down".to_string()).is_reschedulable());
    }
}
