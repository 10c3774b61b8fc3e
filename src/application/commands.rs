use crate::application::bootstrap::open_workspace;
use crate::application::error::PlannerError;
use crate::application::modifications::{
    ModificationAction, ModificationFields, ModificationIntent, apply_modifications,
};
use crate::application::proposals::{NowProvider, ProposalService, ProposalStore};
use crate::application::week_plan::{SkippedWorkout, WeekPlanner};
use crate::domain::models::{
    CalendarEvent, CommitResult, EventPatch, EventTiming, Proposal, ProposalPayload,
    WorkoutCandidate,
};
use crate::infrastructure::calendar::{RetryingCalendar, WorkoutCalendar};
use crate::infrastructure::config::load_access_token_from_lookup;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::GoogleWorkoutCalendar;
use crate::infrastructure::logging::init_logging;
use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const LOCAL_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub type GoogleCalendar = RetryingCalendar<GoogleWorkoutCalendar>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CommandError {
    pub status: u16,
    pub kind: String,
    pub message: String,
}

impl From<&PlannerError> for CommandError {
    fn from(error: &PlannerError) -> Self {
        Self {
            status: error.status(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

pub struct AppState<C: WorkoutCalendar> {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    timezone: Tz,
    proposals: Arc<ProposalService<C>>,
    planner: WeekPlanner<C>,
}

impl<C: WorkoutCalendar> AppState<C> {
    pub fn new(workspace_root: PathBuf, calendar: Arc<C>) -> Result<Self, InfraError> {
        Self::with_now_provider(workspace_root, calendar, Arc::new(chrono::Utc::now))
    }

    pub fn with_now_provider(
        workspace_root: PathBuf,
        calendar: Arc<C>,
        now_provider: NowProvider,
    ) -> Result<Self, InfraError> {
        let workspace = open_workspace(&workspace_root)?;
        init_logging(&workspace.logs_dir)?;

        let timezone = workspace.timezone;
        let proposals = Arc::new(
            ProposalService::new(
                calendar,
                Arc::new(ProposalStore::default()),
                workspace.policy,
                workspace.calendars,
            )
            .with_now_provider(now_provider),
        );
        let planner = WeekPlanner::new(Arc::clone(&proposals));
        tracing::info!(
            workspace_root = %workspace.root.display(),
            timezone = timezone.name(),
            "workout planner initialized"
        );

        Ok(Self {
            config_dir: workspace.config_dir,
            logs_dir: workspace.logs_dir,
            timezone,
            proposals,
            planner,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn command_error(&self, command: &str, error: &PlannerError) -> CommandError {
        tracing::error!(
            command,
            status = error.status(),
            kind = error.kind(),
            %error,
            "command failed"
        );
        CommandError::from(error)
    }

    pub fn log_info(&self, command: &str, message: &str) {
        tracing::info!(command, detail = message, "command completed");
    }
}

impl AppState<GoogleCalendar> {
    pub fn from_env(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::from_lookup(workspace_root, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(workspace_root: PathBuf, lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace = open_workspace(&workspace_root)?;
        let access_token = load_access_token_from_lookup(lookup)?;
        let calendar =
            RetryingCalendar::new(GoogleWorkoutCalendar::new(access_token, workspace.timezone)?);
        Self::new(workspace_root, Arc::new(calendar))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkoutInput {
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldsInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModificationIntentInput {
    pub action: ModificationAction,
    #[serde(default, alias = "targetId")]
    pub target_id: Option<String>,
    #[serde(default)]
    pub fields: Option<FieldsInput>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProposalResponse {
    pub id: String,
    pub kind: String,
    pub diff: String,
    pub warnings: Vec<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProposeResponse {
    pub proposal: ProposalResponse,
    pub diff: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventResponse {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub all_day: bool,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommitResponse {
    pub proposal_id: String,
    pub outcome: String,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeleteEventResponse {
    pub event_id: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedResponse {
    pub title: String,
    pub reason: String,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WeekPlanResponse {
    pub accepted: Vec<ProposalResponse>,
    pub skipped: Vec<SkippedResponse>,
    pub combined_diff: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModificationErrorResponse {
    pub index: usize,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub status: u16,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModificationsResponse {
    pub proposals: Vec<ProposalResponse>,
    pub errors: Vec<ModificationErrorResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BusyIntervalResponse {
    pub start: String,
    pub end: String,
}

pub async fn propose_create_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    workout: WorkoutInput,
) -> Result<ProposeResponse, PlannerError> {
    let candidate = parse_workout(&workout, state.timezone)?;
    let proposal = state.proposals.propose_create(&candidate).await?;
    state.log_info("propose_create", &format!("proposal_id={}", proposal.id));
    Ok(propose_response(&proposal))
}

pub async fn propose_update_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    target_id: String,
    fields: FieldsInput,
) -> Result<ProposeResponse, PlannerError> {
    let fields = parse_fields(&fields, state.timezone)?;
    let patch = EventPatch {
        title: fields.title,
        description: fields.description,
        start: fields.start,
        end: fields.end,
    };
    let proposal = state.proposals.propose_update(&target_id, patch).await?;
    state.log_info("propose_update", &format!("proposal_id={}", proposal.id));
    Ok(propose_response(&proposal))
}

pub async fn propose_delete_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    target_id: String,
) -> Result<ProposeResponse, PlannerError> {
    let proposal = state.proposals.propose_delete(&target_id).await?;
    state.log_info("propose_delete", &format!("proposal_id={}", proposal.id));
    Ok(propose_response(&proposal))
}

pub async fn approve_proposal_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    proposal_id: String,
) -> Result<CommitResponse, PlannerError> {
    let proposal_id = proposal_id.trim().to_string();
    let result = state.proposals.approve(&proposal_id).await?;
    let response = match result {
        CommitResult::Created(event) => CommitResponse {
            proposal_id,
            outcome: "created".to_string(),
            event_id: event.id.clone(),
            event: Some(event_response(&event, state.timezone)),
        },
        CommitResult::Updated(event) => CommitResponse {
            proposal_id,
            outcome: "updated".to_string(),
            event_id: event.id.clone(),
            event: Some(event_response(&event, state.timezone)),
        },
        CommitResult::Deleted { event_id } => CommitResponse {
            proposal_id,
            outcome: "deleted".to_string(),
            event_id,
            event: None,
        },
    };
    state.log_info(
        "approve_proposal",
        &format!("proposal_id={} outcome={}", response.proposal_id, response.outcome),
    );
    Ok(response)
}

pub fn reject_proposal_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    proposal_id: String,
) -> Result<ProposalResponse, PlannerError> {
    let proposal = state.proposals.reject(proposal_id.trim())?;
    Ok(proposal_response(&proposal))
}

pub fn list_proposals_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
) -> Result<Vec<ProposalResponse>, PlannerError> {
    Ok(state
        .proposals
        .list()?
        .iter()
        .map(proposal_response)
        .collect())
}

pub async fn delete_event_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    event_id: String,
) -> Result<DeleteEventResponse, PlannerError> {
    let event_id = state.proposals.delete_now(&event_id).await?;
    state.log_info("delete_event", &format!("event_id={event_id}"));
    Ok(DeleteEventResponse {
        event_id,
        deleted: true,
    })
}

pub async fn plan_week_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    workouts: Vec<WorkoutInput>,
    allow_early_start: Option<bool>,
) -> Result<WeekPlanResponse, PlannerError> {
    let mut candidates = Vec::with_capacity(workouts.len());
    let mut skipped = Vec::new();
    for workout in &workouts {
        match parse_workout(workout, state.timezone) {
            Ok(candidate) => candidates.push(candidate),
            Err(error) => {
                tracing::warn!(title = %workout.title, %error, "skipping unparseable workout");
                skipped.push(SkippedWorkout::from_error(&workout.title, &error));
            }
        }
    }

    let outcome = state
        .planner
        .plan_week(candidates, allow_early_start.unwrap_or(false))
        .await?;
    skipped.extend(outcome.skipped);

    state.log_info(
        "plan_week",
        &format!(
            "accepted={} skipped={}",
            outcome.accepted.len(),
            skipped.len()
        ),
    );
    Ok(WeekPlanResponse {
        accepted: outcome.accepted.iter().map(proposal_response).collect(),
        skipped: skipped
            .into_iter()
            .map(|skipped| SkippedResponse {
                title: skipped.title,
                reason: skipped.reason,
                status: skipped.status,
            })
            .collect(),
        combined_diff: outcome.combined_diff,
    })
}

pub async fn apply_modifications_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    intents: Vec<ModificationIntentInput>,
) -> Result<ModificationsResponse, PlannerError> {
    let mut parsed = Vec::with_capacity(intents.len());
    let mut parse_errors = Vec::new();
    for (index, intent) in intents.into_iter().enumerate() {
        let fields = match intent.fields.as_ref().map(|fields| parse_fields(fields, state.timezone)) {
            Some(Ok(fields)) => Some(fields),
            Some(Err(error)) => {
                parse_errors.push(ModificationErrorResponse {
                    index,
                    action: intent.action.as_str().to_string(),
                    target_id: intent.target_id.clone(),
                    status: error.status(),
                    kind: error.kind().to_string(),
                    message: error.to_string(),
                });
                continue;
            }
            None => None,
        };
        parsed.push((
            index,
            ModificationIntent {
                action: intent.action,
                target_id: intent.target_id,
                fields,
            },
        ));
    }

    let (indices, intents): (Vec<usize>, Vec<ModificationIntent>) = parsed.into_iter().unzip();
    let outcome = apply_modifications(&state.proposals, intents).await;

    let mut errors = parse_errors;
    errors.extend(outcome.errors.into_iter().map(|error| ModificationErrorResponse {
        index: indices.get(error.index).copied().unwrap_or(error.index),
        action: error.action.as_str().to_string(),
        target_id: error.target_id,
        status: error.status,
        kind: error.kind.to_string(),
        message: error.message,
    }));
    errors.sort_by_key(|error| error.index);

    state.log_info(
        "apply_modifications",
        &format!("proposals={} errors={}", outcome.proposals.len(), errors.len()),
    );
    Ok(ModificationsResponse {
        proposals: outcome.proposals.iter().map(proposal_response).collect(),
        errors,
    })
}

pub async fn list_busy_intervals_impl<C: WorkoutCalendar>(
    state: &AppState<C>,
    time_min: String,
    time_max: String,
) -> Result<Vec<BusyIntervalResponse>, PlannerError> {
    let start = parse_instant_input(&time_min, "time_min", state.timezone)?;
    let end = parse_instant_input(&time_max, "time_max", state.timezone)?;
    if end <= start {
        return Err(PlannerError::Validation(
            "time_max must be after time_min".to_string(),
        ));
    }
    let busy = state
        .proposals
        .calendar()
        .fetch_free_busy(&state.proposals.calendars().primary_calendar_id, start, end)
        .await?;
    Ok(busy
        .iter()
        .map(|interval| BusyIntervalResponse {
            start: interval.start.to_rfc3339(),
            end: interval.end.to_rfc3339(),
        })
        .collect())
}

fn parse_workout(workout: &WorkoutInput, timezone: Tz) -> Result<WorkoutCandidate, PlannerError> {
    let start = parse_instant_input(&workout.start, "start", timezone)?;
    let end = parse_instant_input(&workout.end, "end", timezone)?;
    let candidate = WorkoutCandidate::new(workout.title.trim(), start, end, workout.description.clone());
    candidate.validate().map_err(PlannerError::Validation)?;
    Ok(candidate)
}

fn parse_fields(fields: &FieldsInput, timezone: Tz) -> Result<ModificationFields, PlannerError> {
    Ok(ModificationFields {
        title: fields.title.as_deref().map(str::trim).map(ToOwned::to_owned),
        description: fields.description.clone(),
        start: fields
            .start
            .as_deref()
            .map(|value| parse_instant_input(value, "start", timezone))
            .transpose()?,
        end: fields
            .end
            .as_deref()
            .map(|value| parse_instant_input(value, "end", timezone))
            .transpose()?,
    })
}

/// RFC 3339 with an offset, or a naive local date-time interpreted in the
/// configured timezone. Local times skipped or repeated by a DST change are
/// rejected.
fn parse_instant_input(value: &str, field_name: &str, timezone: Tz) -> Result<DateTime<Tz>, PlannerError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&timezone));
    }
    let naive = LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| {
            PlannerError::Validation(format!(
                "{field_name} must be RFC3339 or a local date-time like 2026-02-16T07:00"
            ))
        })?;
    timezone.from_local_datetime(&naive).single().ok_or_else(|| {
        PlannerError::Validation(format!(
            "{field_name} '{value}' is ambiguous or does not exist in {}",
            timezone.name()
        ))
    })
}

fn propose_response(proposal: &Proposal) -> ProposeResponse {
    ProposeResponse {
        proposal: proposal_response(proposal),
        diff: proposal.diff_text.clone(),
    }
}

fn proposal_response(proposal: &Proposal) -> ProposalResponse {
    let (title, start, end) = match &proposal.payload {
        ProposalPayload::Create(draft) => (
            Some(draft.title.clone()),
            Some(draft.start.to_rfc3339()),
            Some(draft.end.to_rfc3339()),
        ),
        ProposalPayload::Update { patch, .. } => (
            patch.title.clone(),
            patch.start.map(|start| start.to_rfc3339()),
            patch.end.map(|end| end.to_rfc3339()),
        ),
        ProposalPayload::Delete { .. } => (None, None, None),
    };
    ProposalResponse {
        id: proposal.id.clone(),
        kind: proposal.kind.as_str().to_string(),
        diff: proposal.diff_text.clone(),
        warnings: proposal.warnings.clone(),
        created_at: proposal.created_at.to_rfc3339(),
        target_id: proposal.payload.target_id().map(ToOwned::to_owned),
        title,
        start,
        end,
    }
}

fn event_response(event: &CalendarEvent, timezone: Tz) -> EventResponse {
    let (all_day, start, end) = match event.timing {
        EventTiming::Timed { start, end } => (
            false,
            start.with_timezone(&timezone).to_rfc3339(),
            end.with_timezone(&timezone).to_rfc3339(),
        ),
        EventTiming::AllDay {
            start_date,
            end_date,
        } => (true, start_date.to_string(), end_date.to_string()),
    };
    EventResponse {
        id: event.id.clone(),
        title: event.title.clone(),
        description: event.description.clone(),
        all_day,
        start,
        end,
    }
}
