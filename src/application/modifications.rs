use crate::application::error::PlannerError;
use crate::application::proposals::ProposalService;
use crate::domain::models::{EventPatch, Proposal, WorkoutCandidate};
use crate::infrastructure::calendar::WorkoutCalendar;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationAction {
    Create,
    Update,
    Delete,
}

impl ModificationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
}

impl ModificationFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.start.is_none() && self.end.is_none()
    }

    fn into_candidate(self) -> Result<WorkoutCandidate, PlannerError> {
        let title = self
            .title
            .ok_or_else(|| PlannerError::Validation("create requires fields.title".to_string()))?;
        let start = self
            .start
            .ok_or_else(|| PlannerError::Validation("create requires fields.start".to_string()))?;
        let end = self
            .end
            .ok_or_else(|| PlannerError::Validation("create requires fields.end".to_string()))?;
        Ok(WorkoutCandidate::new(
            title,
            start,
            end,
            self.description.unwrap_or_default(),
        ))
    }

    fn into_patch(self) -> EventPatch {
        EventPatch {
            title: self.title,
            description: self.description,
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationIntent {
    pub action: ModificationAction,
    pub target_id: Option<String>,
    pub fields: Option<ModificationFields>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationError {
    pub index: usize,
    pub action: ModificationAction,
    pub target_id: Option<String>,
    pub status: u16,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModificationOutcome {
    pub proposals: Vec<Proposal>,
    pub errors: Vec<ModificationError>,
}

pub async fn apply_modifications<C: WorkoutCalendar>(
    service: &ProposalService<C>,
    intents: Vec<ModificationIntent>,
) -> ModificationOutcome {
    let mut outcome = ModificationOutcome::default();

    for (index, intent) in intents.into_iter().enumerate() {
        let action = intent.action;
        let target_id = intent.target_id.clone();
        match apply_one(service, intent).await {
            Ok(proposal) => outcome.proposals.push(proposal),
            Err(error) => {
                tracing::warn!(index, action = action.as_str(), kind = error.kind(), %error, "modification intent failed");
                outcome.errors.push(ModificationError {
                    index,
                    action,
                    target_id,
                    status: error.status(),
                    kind: error.kind(),
                    message: error.to_string(),
                });
            }
        }
    }

    outcome
}

async fn apply_one<C: WorkoutCalendar>(
    service: &ProposalService<C>,
    intent: ModificationIntent,
) -> Result<Proposal, PlannerError> {
    match intent.action {
        ModificationAction::Create => {
            let fields = intent
                .fields
                .filter(|fields| !fields.is_empty())
                .ok_or_else(|| PlannerError::Validation("create requires fields".to_string()))?;
            service.propose_create(&fields.into_candidate()?).await
        }
        ModificationAction::Update => {
            let target_id = required_target(intent.target_id, ModificationAction::Update)?;
            let fields = intent
                .fields
                .filter(|fields| !fields.is_empty())
                .ok_or_else(|| PlannerError::Validation("update requires fields".to_string()))?;
            service.propose_update(&target_id, fields.into_patch()).await
        }
        ModificationAction::Delete => {
            let target_id = required_target(intent.target_id, ModificationAction::Delete)?;
            service.propose_delete(&target_id).await
        }
    }
}

fn required_target(target_id: Option<String>, action: ModificationAction) -> Result<String, PlannerError> {
    target_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PlannerError::Validation(format!("{} requires target_id", action.as_str())))
}
