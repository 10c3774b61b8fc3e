pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    AppState, BusyIntervalResponse, CommandError, CommitResponse, DeleteEventResponse,
    EventResponse, FieldsInput, GoogleCalendar, ModificationErrorResponse,
    ModificationIntentInput, ModificationsResponse, ProposalResponse, ProposeResponse,
    SkippedResponse, WeekPlanResponse, WorkoutInput, apply_modifications_impl,
    approve_proposal_impl, delete_event_impl, list_busy_intervals_impl, list_proposals_impl,
    plan_week_impl, propose_create_impl, propose_delete_impl, propose_update_impl,
    reject_proposal_impl,
};
pub use application::error::PlannerError;
pub use application::proposals::{ProposalService, ProposalStore};
pub use application::week_plan::{WeekPlanOutcome, WeekPlanner};
pub use domain::models::{CalendarEvent, Proposal, ProposalKind, WorkoutCandidate};
pub use domain::policy::SchedulePolicy;
pub use infrastructure::calendar::{InMemoryWorkoutCalendar, RetryingCalendar, WorkoutCalendar};
pub use infrastructure::error::InfraError;
