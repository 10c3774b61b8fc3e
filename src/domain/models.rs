use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Interval {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self, String> {
        if end <= start {
            return Err("interval end must be after start".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutCandidate {
    pub title: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub description: String,
    pub source_event_id: Option<String>,
}

impl WorkoutCandidate {
    pub fn new(
        title: impl Into<String>,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            description: description.into(),
            source_event_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "workout.title")?;
        if self.end <= self.start {
            return Err("workout.end must be after workout.start".to_string());
        }
        Ok(())
    }

    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            end: self.end,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn moved_to(&self, start: DateTime<Tz>) -> Self {
        let duration = self.duration();
        Self {
            start,
            end: start + duration,
            ..self.clone()
        }
    }

    pub fn to_draft(&self) -> EventDraft {
        EventDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTiming {
    Timed {
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    },
    /// Date-only event; `end_date` is exclusive.
    AllDay {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub timing: EventTiming,
}

impl CalendarEvent {
    pub fn interval(&self) -> Option<Interval> {
        match self.timing {
            EventTiming::Timed { start, end } => Some(Interval { start, end }),
            EventTiming::AllDay { .. } => None,
        }
    }

    pub fn span_in(&self, timezone: Tz) -> Option<Interval> {
        match self.timing {
            EventTiming::Timed { start, end } => Some(Interval { start, end }),
            EventTiming::AllDay {
                start_date,
                end_date,
            } => {
                let start = local_midnight(timezone, start_date)?;
                let end = local_midnight(timezone, end_date)?;
                (end > start).then_some(Interval { start, end })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.start.is_none() && self.end.is_none()
    }

    pub fn touches_interval(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("update must change at least one field".to_string());
        }
        if let Some(title) = self.title.as_deref() {
            validate_non_empty(title, "update.title")?;
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end <= start {
                return Err("update.end must be after update.start".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledWorkout {
    pub title: String,
    pub interval: Interval,
    pub event_id: Option<String>,
}

impl ScheduledWorkout {
    pub fn from_event(event: &CalendarEvent) -> Option<Self> {
        Some(Self {
            title: event.title.clone(),
            interval: event.interval()?,
            event_id: Some(event.id.clone()),
        })
    }

    pub fn from_candidate(candidate: &WorkoutCandidate) -> Self {
        Self {
            title: candidate.title.clone(),
            interval: candidate.interval(),
            event_id: candidate.source_event_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Create,
    Update,
    Delete,
}

impl ProposalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalPayload {
    Create(EventDraft),
    Update { target_id: String, patch: EventPatch },
    Delete { target_id: String },
}

impl ProposalPayload {
    pub fn kind(&self) -> ProposalKind {
        match self {
            Self::Create(_) => ProposalKind::Create,
            Self::Update { .. } => ProposalKind::Update,
            Self::Delete { .. } => ProposalKind::Delete,
        }
    }

    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::Create(_) => None,
            Self::Update { target_id, .. } | Self::Delete { target_id } => Some(target_id),
        }
    }

    /// Shape check run again at approval time; policy checks are not repeated.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Create(draft) => {
                validate_non_empty(&draft.title, "proposal.create.title")?;
                if draft.end <= draft.start {
                    return Err("proposal.create.end must be after start".to_string());
                }
                Ok(())
            }
            Self::Update { target_id, patch } => {
                validate_non_empty(target_id, "proposal.update.target_id")?;
                patch.validate()
            }
            Self::Delete { target_id } => validate_non_empty(target_id, "proposal.delete.target_id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub id: String,
    pub kind: ProposalKind,
    pub payload: ProposalPayload,
    pub created_at: DateTime<Utc>,
    pub diff_text: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    Created(CalendarEvent),
    Updated(CalendarEvent),
    Deleted { event_id: String },
}

/// Resolves a wall-clock time on `date` in `timezone`; a time skipped by a
/// DST gap resolves to `None`, an ambiguous one to the earlier instant.
pub fn local_instant(timezone: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    timezone.from_local_datetime(&date.and_time(time)).earliest()
}

fn local_midnight(timezone: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    local_instant(timezone, date, NaiveTime::MIN)
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
