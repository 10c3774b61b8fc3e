use crate::application::error::PlannerError;
use crate::domain::conflicts::{ConflictReport, classify_conflicts};
use crate::domain::diff::{create_diff, delete_diff, update_diff};
use crate::domain::models::{
    CalendarEvent, CommitResult, EventPatch, EventTiming, Interval, Proposal, ProposalPayload,
    WorkoutCandidate,
};
use crate::domain::policy::{
    SchedulePolicy, check_allowed_hours, check_deletion_allowed, check_description,
};
use crate::infrastructure::calendar::WorkoutCalendar;
use crate::infrastructure::config::CalendarRefs;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Pending proposals in insertion order. Removal is atomic, so of two
/// concurrent approvals of one id only the first sees the proposal.
#[derive(Debug, Default)]
pub struct ProposalStore {
    pending: Mutex<Vec<Proposal>>,
    next_sequence: AtomicU64,
}

impl ProposalStore {
    pub fn next_id(&self, now: DateTime<Utc>) -> String {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("proposal-{}-{sequence}", now.timestamp_micros())
    }

    pub fn insert(&self, proposal: Proposal) -> Result<(), PlannerError> {
        self.lock()?.push(proposal);
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Proposal>, PlannerError> {
        Ok(self.lock()?.clone())
    }

    pub fn take(&self, proposal_id: &str) -> Result<Option<(usize, Proposal)>, PlannerError> {
        let mut pending = self.lock()?;
        let Some(index) = pending.iter().position(|proposal| proposal.id == proposal_id) else {
            return Ok(None);
        };
        Ok(Some((index, pending.remove(index))))
    }

    pub fn restore(&self, index: usize, proposal: Proposal) -> Result<(), PlannerError> {
        let mut pending = self.lock()?;
        let index = index.min(pending.len());
        pending.insert(index, proposal);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Proposal>>, PlannerError> {
        self.pending
            .lock()
            .map_err(|error| PlannerError::from(InfraError::State(format!("proposal store lock poisoned: {error}"))))
    }
}

pub struct ProposalService<C: WorkoutCalendar> {
    calendar: Arc<C>,
    store: Arc<ProposalStore>,
    policy: SchedulePolicy,
    calendars: CalendarRefs,
    now_provider: NowProvider,
}

impl<C: WorkoutCalendar> ProposalService<C> {
    pub fn new(
        calendar: Arc<C>,
        store: Arc<ProposalStore>,
        policy: SchedulePolicy,
        calendars: CalendarRefs,
    ) -> Self {
        Self {
            calendar,
            store,
            policy,
            calendars,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    pub fn calendars(&self) -> &CalendarRefs {
        &self.calendars
    }

    pub fn calendar(&self) -> &Arc<C> {
        &self.calendar
    }

    pub async fn check_conflicts(
        &self,
        interval: &Interval,
        ignore_event_id: Option<&str>,
    ) -> Result<ConflictReport, PlannerError> {
        let events = self
            .calendar
            .fetch_events_in_range(&self.calendars.primary_calendar_id, interval.start, interval.end)
            .await?;
        Ok(classify_conflicts(
            interval,
            &events,
            self.policy.timezone,
            ignore_event_id,
        ))
    }

    pub async fn propose_create(&self, candidate: &WorkoutCandidate) -> Result<Proposal, PlannerError> {
        candidate.validate().map_err(PlannerError::Validation)?;
        check_allowed_hours(candidate, &self.policy)?;
        check_description(&candidate.description, &self.policy)?;
        let report = self
            .check_conflicts(&candidate.interval(), candidate.source_event_id.as_deref())
            .await?;
        report.to_result()?;

        let draft = candidate.to_draft();
        let diff_text = create_diff(&draft, self.policy.timezone);
        self.stage(ProposalPayload::Create(draft), diff_text, report.warning_messages())
    }

    pub async fn propose_update(
        &self,
        target_id: &str,
        patch: EventPatch,
    ) -> Result<Proposal, PlannerError> {
        patch.validate().map_err(PlannerError::Validation)?;
        let before = self.fetch_workout(target_id).await?;
        let after = apply_patch(&before, &patch)?;

        let mut warnings = Vec::new();
        if patch.touches_interval() {
            let interval = after.interval().ok_or_else(|| {
                PlannerError::Validation(format!("event {target_id} is all-day and cannot be retimed"))
            })?;
            let candidate = WorkoutCandidate {
                title: after.title.clone(),
                start: interval.start,
                end: interval.end,
                description: after.description.clone().unwrap_or_default(),
                source_event_id: Some(before.id.clone()),
            };
            check_allowed_hours(&candidate, &self.policy)?;
            let report = self.check_conflicts(&interval, Some(&before.id)).await?;
            report.to_result()?;
            warnings = report.warning_messages();
        }
        if let Some(description) = patch.description.as_deref() {
            check_description(description, &self.policy)?;
        }

        let diff_text = update_diff(&before, &after, self.policy.timezone);
        self.stage(
            ProposalPayload::Update {
                target_id: before.id,
                patch,
            },
            diff_text,
            warnings,
        )
    }

    pub async fn propose_delete(&self, target_id: &str) -> Result<Proposal, PlannerError> {
        let event = self.fetch_workout(target_id).await?;
        check_deletion_allowed(&event.title)?;
        let diff_text = delete_diff(&event, self.policy.timezone);
        self.stage(
            ProposalPayload::Delete { target_id: event.id },
            diff_text,
            Vec::new(),
        )
    }

    pub async fn approve(&self, proposal_id: &str) -> Result<CommitResult, PlannerError> {
        let (index, proposal) = self
            .store
            .take(proposal_id)?
            .ok_or_else(|| PlannerError::NotFound(format!("proposal {proposal_id}")))?;

        if let Err(message) = proposal.payload.validate() {
            self.store.restore(index, proposal)?;
            return Err(PlannerError::Validation(message));
        }

        match self.commit(&proposal.payload).await {
            Ok(result) => {
                tracing::info!(
                    proposal_id = %proposal.id,
                    kind = proposal.kind.as_str(),
                    "proposal approved and committed"
                );
                Ok(result)
            }
            // A vanished target can never commit, so the proposal is not restored.
            Err(InfraError::NotFound(message)) => {
                tracing::warn!(
                    proposal_id = %proposal.id,
                    kind = proposal.kind.as_str(),
                    %message,
                    "proposal target no longer exists; proposal retired"
                );
                Err(PlannerError::NotFound(message))
            }
            Err(error) => {
                tracing::error!(
                    proposal_id = %proposal.id,
                    kind = proposal.kind.as_str(),
                    %error,
                    "proposal commit failed; proposal stays pending"
                );
                self.store.restore(index, proposal)?;
                Err(match error {
                    InfraError::Unauthenticated(message) => PlannerError::Unauthenticated(message),
                    other => PlannerError::Upstream(other.to_string()),
                })
            }
        }
    }

    pub fn reject(&self, proposal_id: &str) -> Result<Proposal, PlannerError> {
        let (_, proposal) = self
            .store
            .take(proposal_id)?
            .ok_or_else(|| PlannerError::NotFound(format!("proposal {proposal_id}")))?;
        tracing::info!(proposal_id = %proposal.id, kind = proposal.kind.as_str(), "proposal rejected");
        Ok(proposal)
    }

    pub fn list(&self) -> Result<Vec<Proposal>, PlannerError> {
        self.store.list()
    }

    pub async fn delete_now(&self, target_id: &str) -> Result<String, PlannerError> {
        let event = self.fetch_workout(target_id).await?;
        check_deletion_allowed(&event.title)?;
        self.calendar
            .delete_event(&self.calendars.workouts_calendar_id, &event.id)
            .await?;
        tracing::info!(event_id = %event.id, "workout deleted directly");
        Ok(event.id)
    }

    pub fn withdraw(&self, proposal_id: &str) -> Result<bool, PlannerError> {
        Ok(self.store.take(proposal_id)?.is_some())
    }

    async fn fetch_workout(&self, target_id: &str) -> Result<CalendarEvent, PlannerError> {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(PlannerError::Validation("target_id must not be empty".to_string()));
        }
        self.calendar
            .fetch_event(&self.calendars.workouts_calendar_id, target_id)
            .await?
            .ok_or_else(|| PlannerError::NotFound(format!("event {target_id}")))
    }

    fn stage(
        &self,
        payload: ProposalPayload,
        diff_text: String,
        warnings: Vec<String>,
    ) -> Result<Proposal, PlannerError> {
        let created_at = (self.now_provider)();
        let proposal = Proposal {
            id: self.store.next_id(created_at),
            kind: payload.kind(),
            payload,
            created_at,
            diff_text,
            warnings,
        };
        self.store.insert(proposal.clone())?;
        tracing::info!(
            proposal_id = %proposal.id,
            kind = proposal.kind.as_str(),
            warnings = proposal.warnings.len(),
            "proposal created"
        );
        Ok(proposal)
    }

    async fn commit(&self, payload: &ProposalPayload) -> Result<CommitResult, InfraError> {
        let calendar_id = &self.calendars.workouts_calendar_id;
        match payload {
            ProposalPayload::Create(draft) => self
                .calendar
                .create_event(calendar_id, draft)
                .await
                .map(CommitResult::Created),
            ProposalPayload::Update { target_id, patch } => self
                .calendar
                .update_event(calendar_id, target_id, patch)
                .await
                .map(CommitResult::Updated),
            ProposalPayload::Delete { target_id } => {
                self.calendar.delete_event(calendar_id, target_id).await?;
                Ok(CommitResult::Deleted {
                    event_id: target_id.clone(),
                })
            }
        }
    }
}

fn apply_patch(event: &CalendarEvent, patch: &EventPatch) -> Result<CalendarEvent, PlannerError> {
    let timing = match event.timing {
        EventTiming::Timed { start, end } => {
            let start = patch.start.unwrap_or(start);
            let end = patch.end.unwrap_or(end);
            if end <= start {
                return Err(PlannerError::Validation(
                    "update.end must be after update.start".to_string(),
                ));
            }
            EventTiming::Timed { start, end }
        }
        EventTiming::AllDay { .. } if patch.touches_interval() => {
            return Err(PlannerError::Validation(format!(
                "event {} is all-day and cannot be retimed",
                event.id
            )));
        }
        timing => timing,
    };
    Ok(CalendarEvent {
        id: event.id.clone(),
        title: patch.title.clone().unwrap_or_else(|| event.title.clone()),
        description: patch.description.clone().or_else(|| event.description.clone()),
        timing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EventDraft, ProposalKind};
    use crate::domain::policy::PolicyViolation;
    use crate::infrastructure::calendar::InMemoryWorkoutCalendar;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use chrono_tz::Europe::Berlin;
    use chrono_tz::Tz;
    use std::sync::atomic::AtomicBool;

    const COMPLETE_DESCRIPTION: &str =
        "Duration: 60 min\nTargets: Z2\nIntervals: none\nNotes: easy\nTSS: 45\nkcal: 550";

    fn fixed_time(value: &str) -> DateTime<Tz> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Berlin)
    }

    fn refs() -> CalendarRefs {
        CalendarRefs {
            primary_calendar_id: "primary".to_string(),
            workouts_calendar_id: "workouts".to_string(),
        }
    }

    fn service<C: WorkoutCalendar>(calendar: Arc<C>) -> ProposalService<C> {
        ProposalService::new(
            calendar,
            Arc::new(ProposalStore::default()),
            SchedulePolicy::with_timezone(Berlin),
            refs(),
        )
        .with_now_provider(Arc::new(|| {
            DateTime::parse_from_rfc3339("2026-02-15T12:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc)
        }))
    }

    fn candidate(title: &str, start: &str, end: &str) -> WorkoutCandidate {
        WorkoutCandidate::new(title, fixed_time(start), fixed_time(end), COMPLETE_DESCRIPTION)
    }

    async fn seeded_workout(calendar: &InMemoryWorkoutCalendar, title: &str) -> CalendarEvent {
        calendar
            .create_event(
                "workouts",
                &EventDraft {
                    title: title.to_string(),
                    description: COMPLETE_DESCRIPTION.to_string(),
                    start: fixed_time("2026-02-16T07:00:00+01:00"),
                    end: fixed_time("2026-02-16T08:00:00+01:00"),
                },
            )
            .await
            .expect("seed workout")
    }

    #[tokio::test]
    async fn create_proposal_is_pending_with_diff() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let service = service(Arc::clone(&calendar));

        let proposal = service
            .propose_create(&candidate(
                "Run - Tempo",
                "2026-02-16T07:00:00+01:00",
                "2026-02-16T08:00:00+01:00",
            ))
            .await
            .expect("proposal");

        assert_eq!(proposal.kind, ProposalKind::Create);
        assert!(proposal.diff_text.starts_with("Create → Run - Tempo | Mon 2026-02-16 07:00 CET"));
        assert_eq!(service.list().expect("list"), vec![proposal]);
        assert!(calendar.events("workouts").expect("events").is_empty());
    }

    #[tokio::test]
    async fn create_rejects_outside_hours_incomplete_description_and_conflicts() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        calendar
            .create_event(
                "primary",
                &EventDraft {
                    title: "Standup".to_string(),
                    description: String::new(),
                    start: fixed_time("2026-02-16T07:30:00+01:00"),
                    end: fixed_time("2026-02-16T07:45:00+01:00"),
                },
            )
            .await
            .expect("seed primary");
        let service = service(Arc::clone(&calendar));

        let midday = service
            .propose_create(&candidate("Run", "2026-02-16T12:00:00+01:00", "2026-02-16T13:00:00+01:00"))
            .await;
        assert!(matches!(
            midday,
            Err(PlannerError::Policy(PolicyViolation::OutsideAllowedHours { .. }))
        ));

        let mut missing_tss = candidate("Run", "2026-02-16T18:00:00+01:00", "2026-02-16T19:00:00+01:00");
        missing_tss.description = COMPLETE_DESCRIPTION.replace("TSS: 45\n", "");
        let error = service.propose_create(&missing_tss).await.expect_err("incomplete");
        assert_eq!(error.status(), 400);
        assert!(matches!(
            error,
            PlannerError::Policy(PolicyViolation::DescriptionIncomplete(ref missing)) if missing == &vec!["TSS".to_string()]
        ));

        let conflict = service
            .propose_create(&candidate("Run", "2026-02-16T07:00:00+01:00", "2026-02-16T08:00:00+01:00"))
            .await
            .expect_err("conflict");
        assert_eq!(conflict.status(), 409);
        assert!(service.list().expect("list").is_empty());
    }

    #[tokio::test]
    async fn all_day_events_become_warnings_not_failures() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        calendar
            .seed(
                "primary",
                CalendarEvent {
                    id: "trip".to_string(),
                    title: "Conference".to_string(),
                    description: None,
                    timing: EventTiming::AllDay {
                        start_date: NaiveDate::from_ymd_opt(2026, 2, 16).expect("date"),
                        end_date: NaiveDate::from_ymd_opt(2026, 2, 17).expect("date"),
                    },
                },
            )
            .expect("seed");
        let service = service(calendar);

        let proposal = service
            .propose_create(&candidate("Swim", "2026-02-16T18:00:00+01:00", "2026-02-16T19:00:00+01:00"))
            .await
            .expect("proposal");
        assert_eq!(proposal.warnings, vec!["overlaps all-day event 'Conference'".to_string()]);
    }

    // Feature: workout-planner, Property 7: approval is terminal and idempotence surfaces NotFound
    #[tokio::test]
    async fn property7_approve_commits_once_then_not_found() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let service = service(Arc::clone(&calendar));
        let proposal = service
            .propose_create(&candidate(
                "Run - Tempo",
                "2026-02-16T07:00:00+01:00",
                "2026-02-16T08:00:00+01:00",
            ))
            .await
            .expect("proposal");

        let result = service.approve(&proposal.id).await.expect("approve");
        assert!(matches!(result, CommitResult::Created(ref event) if event.title == "Run - Tempo"));
        assert!(service.list().expect("list").is_empty());
        assert_eq!(calendar.events("workouts").expect("events").len(), 1);

        let second = service.approve(&proposal.id).await;
        assert!(matches!(second, Err(PlannerError::NotFound(_))));
        assert!(matches!(service.reject(&proposal.id), Err(PlannerError::NotFound(_))));
        assert_eq!(calendar.events("workouts").expect("events").len(), 1);
    }

    #[tokio::test]
    async fn concurrent_approvals_commit_exactly_once() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let service = Arc::new(service(Arc::clone(&calendar)));
        let proposal = service
            .propose_create(&candidate(
                "Run - Tempo",
                "2026-02-16T07:00:00+01:00",
                "2026-02-16T08:00:00+01:00",
            ))
            .await
            .expect("proposal");

        let first = {
            let service = Arc::clone(&service);
            let id = proposal.id.clone();
            tokio::spawn(async move { service.approve(&id).await })
        };
        let second = {
            let service = Arc::clone(&service);
            let id = proposal.id.clone();
            tokio::spawn(async move { service.approve(&id).await })
        };
        let outcomes = [first.await.expect("join"), second.await.expect("join")];

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(PlannerError::NotFound(_)))));
        assert_eq!(calendar.events("workouts").expect("events").len(), 1);
    }

    #[tokio::test]
    async fn reject_removes_without_committing() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let service = service(Arc::clone(&calendar));
        let proposal = service
            .propose_create(&candidate("Swim", "2026-02-16T18:00:00+01:00", "2026-02-16T19:00:00+01:00"))
            .await
            .expect("proposal");

        let rejected = service.reject(&proposal.id).expect("reject");
        assert_eq!(rejected.id, proposal.id);
        assert!(service.list().expect("list").is_empty());
        assert!(calendar.events("workouts").expect("events").is_empty());
        assert!(matches!(service.approve(&proposal.id).await, Err(PlannerError::NotFound(_))));
    }

    struct FailingWritesCalendar {
        inner: InMemoryWorkoutCalendar,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl WorkoutCalendar for FailingWritesCalendar {
        async fn fetch_events_in_range(
            &self,
            calendar_id: &str,
            start: DateTime<Tz>,
            end: DateTime<Tz>,
        ) -> Result<Vec<CalendarEvent>, InfraError> {
            self.inner.fetch_events_in_range(calendar_id, start, end).await
        }

        async fn fetch_free_busy(
            &self,
            calendar_id: &str,
            start: DateTime<Tz>,
            end: DateTime<Tz>,
        ) -> Result<Vec<Interval>, InfraError> {
            self.inner.fetch_free_busy(calendar_id, start, end).await
        }

        async fn fetch_event(
            &self,
            calendar_id: &str,
            event_id: &str,
        ) -> Result<Option<CalendarEvent>, InfraError> {
            self.inner.fetch_event(calendar_id, event_id).await
        }

        async fn create_event(
            &self,
            calendar_id: &str,
            draft: &EventDraft,
        ) -> Result<CalendarEvent, InfraError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(InfraError::Upstream("http 503".to_string()));
            }
            self.inner.create_event(calendar_id, draft).await
        }

        async fn update_event(
            &self,
            calendar_id: &str,
            event_id: &str,
            patch: &EventPatch,
        ) -> Result<CalendarEvent, InfraError> {
            self.inner.update_event(calendar_id, event_id, patch).await
        }

        async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), InfraError> {
            self.inner.delete_event(calendar_id, event_id).await
        }
    }

    #[tokio::test]
    async fn failed_commit_keeps_proposal_pending_for_manual_retry() {
        let calendar = Arc::new(FailingWritesCalendar {
            inner: InMemoryWorkoutCalendar::new(Berlin),
            fail_writes: AtomicBool::new(true),
        });
        let service = service(Arc::clone(&calendar));
        let proposal = service
            .propose_create(&candidate("Run", "2026-02-16T18:00:00+01:00", "2026-02-16T19:00:00+01:00"))
            .await
            .expect("proposal");

        let error = service.approve(&proposal.id).await.expect_err("commit fails");
        assert_eq!(error.status(), 502);
        assert_eq!(service.list().expect("list"), vec![proposal.clone()]);

        calendar.fail_writes.store(false, Ordering::SeqCst);
        service.approve(&proposal.id).await.expect("retry succeeds");
        assert!(service.list().expect("list").is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_event_is_not_found() {
        let service = service(Arc::new(InMemoryWorkoutCalendar::new(Berlin)));
        let patch = EventPatch {
            title: Some("Run - Easy".to_string()),
            ..EventPatch::default()
        };
        let error = service.propose_update("evt-missing", patch).await.expect_err("missing");
        assert_eq!(error.status(), 404);
    }

    #[tokio::test]
    async fn approving_delete_of_vanished_event_is_not_found_and_retired() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let existing = seeded_workout(&calendar, "Run - Easy").await;
        let service = service(Arc::clone(&calendar));
        let proposal = service.propose_delete(&existing.id).await.expect("proposal");

        calendar
            .delete_event("workouts", &existing.id)
            .await
            .expect("removed outside the planner");

        let error = service.approve(&proposal.id).await.expect_err("target gone");
        assert!(matches!(error, PlannerError::NotFound(_)));
        assert_eq!(error.status(), 404);
        assert!(service.list().expect("list").is_empty());

        let again = service.approve(&proposal.id).await.expect_err("already retired");
        assert_eq!(again.status(), 404);
    }

    #[tokio::test]
    async fn update_retime_is_checked_and_committed_on_approval() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let existing = seeded_workout(&calendar, "Run - Easy").await;
        let service = service(Arc::clone(&calendar));

        let illegal = EventPatch {
            start: Some(fixed_time("2026-02-16T12:00:00+01:00")),
            end: Some(fixed_time("2026-02-16T13:00:00+01:00")),
            ..EventPatch::default()
        };
        assert!(matches!(
            service.propose_update(&existing.id, illegal).await,
            Err(PlannerError::Policy(PolicyViolation::OutsideAllowedHours { .. }))
        ));

        let evening = EventPatch {
            start: Some(fixed_time("2026-02-16T18:00:00+01:00")),
            end: Some(fixed_time("2026-02-16T19:00:00+01:00")),
            ..EventPatch::default()
        };
        let proposal = service.propose_update(&existing.id, evening).await.expect("proposal");
        assert!(proposal.diff_text.starts_with("Update → Run - Easy | Mon 2026-02-16 07:00 CET"));
        assert!(proposal.diff_text.contains("⟶ Run - Easy | Mon 2026-02-16 18:00 CET"));

        let result = service.approve(&proposal.id).await.expect("approve");
        let CommitResult::Updated(updated) = result else {
            panic!("expected update result");
        };
        assert_eq!(
            updated.interval().map(|interval| interval.start),
            Some(fixed_time("2026-02-16T18:00:00+01:00"))
        );
    }

    #[tokio::test]
    async fn update_with_incomplete_description_is_rejected() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let existing = seeded_workout(&calendar, "Run - Easy").await;
        let service = service(calendar);
        let patch = EventPatch {
            description: Some("Duration: 45 min".to_string()),
            ..EventPatch::default()
        };
        assert!(matches!(
            service.propose_update(&existing.id, patch).await,
            Err(PlannerError::Policy(PolicyViolation::DescriptionIncomplete(_)))
        ));
    }

    // Feature: workout-planner, Property 5: race-titled events are never deleted
    #[tokio::test]
    async fn property5_deletion_guard_blocks_race_titles() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let race = seeded_workout(&calendar, "Spring Race 5k").await;
        let prep = seeded_workout(&calendar, "Race Prep Run").await;
        let tempo = seeded_workout(&calendar, "Tempo Run").await;
        let service = service(Arc::clone(&calendar));

        for blocked in [&race, &prep] {
            let error = service.propose_delete(&blocked.id).await.expect_err("blocked");
            assert_eq!(error.kind(), "deletion_blocked");
            assert_eq!(error.status(), 409);
            assert!(matches!(
                service.delete_now(&blocked.id).await,
                Err(PlannerError::Policy(PolicyViolation::DeletionBlocked { .. }))
            ));
        }

        let proposal = service.propose_delete(&tempo.id).await.expect("allowed");
        assert!(proposal.diff_text.starts_with("Delete → Tempo Run |"));
        let result = service.approve(&proposal.id).await.expect("approve");
        assert_eq!(
            result,
            CommitResult::Deleted {
                event_id: tempo.id.clone()
            }
        );
        assert_eq!(calendar.events("workouts").expect("events").len(), 2);
    }

    #[test]
    fn store_restore_keeps_insertion_order() {
        let store = ProposalStore::default();
        let now = Utc::now();
        for title in ["a", "b", "c"] {
            store
                .insert(Proposal {
                    id: title.to_string(),
                    kind: ProposalKind::Delete,
                    payload: ProposalPayload::Delete {
                        target_id: title.to_string(),
                    },
                    created_at: now,
                    diff_text: String::new(),
                    warnings: Vec::new(),
                })
                .expect("insert");
        }

        let (index, taken) = store.take("b").expect("take").expect("present");
        assert_eq!(index, 1);
        store.restore(index, taken).expect("restore");
        let ids = store
            .list()
            .expect("list")
            .into_iter()
            .map(|proposal| proposal.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_ne!(store.next_id(now), store.next_id(now));
    }
}
