use crate::application::error::PlannerError;
use crate::application::proposals::ProposalService;
use crate::domain::models::{
    Proposal, ProposalPayload, ScheduledWorkout, WorkoutCandidate, local_instant,
};
use crate::domain::policy::{SchedulePolicy, check_description, is_weekend, within_allowed_hours};
use crate::domain::reschedule::{RescheduleContext, attempt_reschedule};
use crate::domain::spacing::check_spacing;
use crate::infrastructure::calendar::WorkoutCalendar;
use chrono::{DateTime, Days, NaiveTime};
use chrono_tz::Tz;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedWorkout {
    pub title: String,
    pub reason: String,
    pub status: u16,
}

impl SkippedWorkout {
    pub fn from_error(title: &str, error: &PlannerError) -> Self {
        Self {
            title: title.to_string(),
            reason: error.to_string(),
            status: error.status(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WeekPlanOutcome {
    pub accepted: Vec<Proposal>,
    pub skipped: Vec<SkippedWorkout>,
    pub combined_diff: String,
}

pub struct WeekPlanner<C: WorkoutCalendar> {
    service: Arc<ProposalService<C>>,
}

impl<C: WorkoutCalendar> WeekPlanner<C> {
    pub fn new(service: Arc<ProposalService<C>>) -> Self {
        Self { service }
    }

    pub async fn plan_week(
        &self,
        candidates: Vec<WorkoutCandidate>,
        allow_early_start: bool,
    ) -> Result<WeekPlanOutcome, PlannerError> {
        let mut outcome = WeekPlanOutcome::default();
        if candidates.is_empty() {
            return Ok(outcome);
        }

        let mut working_set = self.committed_workouts(&candidates).await?;
        for candidate in candidates {
            let candidate = apply_time_bias(candidate, self.service.policy(), allow_early_start);
            match self.plan_one(candidate.clone(), &working_set).await {
                Ok((proposal, placed)) => {
                    working_set.push(ScheduledWorkout::from_candidate(&placed));
                    outcome.accepted.push(proposal);
                }
                Err(error) => {
                    tracing::warn!(title = %candidate.title, kind = error.kind(), %error, "week plan skipped workout");
                    outcome.skipped.push(SkippedWorkout::from_error(&candidate.title, &error));
                }
            }
        }

        self.drop_accepted_outside_hours(&mut outcome)?;
        outcome.combined_diff = outcome
            .accepted
            .iter()
            .map(|proposal| proposal.diff_text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        tracing::info!(
            accepted = outcome.accepted.len(),
            skipped = outcome.skipped.len(),
            "week plan finished"
        );
        Ok(outcome)
    }

    async fn plan_one(
        &self,
        mut candidate: WorkoutCandidate,
        working_set: &[ScheduledWorkout],
    ) -> Result<(Proposal, WorkoutCandidate), PlannerError> {
        let policy = self.service.policy();
        let rounds = policy.batch_rounds.max(1);

        // Moving a workout cannot fix its shape or description.
        candidate.validate().map_err(PlannerError::Validation)?;
        check_description(&candidate.description, policy)?;

        for round in 0..rounds {
            let spacing = check_spacing(&candidate, working_set, policy.min_gap());
            if !spacing.valid {
                tracing::debug!(title = %candidate.title, warnings = ?spacing.warnings, "workout too close to another");
                candidate = self.reschedule(&candidate, working_set).await?;
            }

            match self.service.propose_create(&candidate).await {
                Ok(proposal) => return Ok((proposal, candidate)),
                Err(error) if error.is_reschedulable() && round + 1 < rounds => {
                    tracing::debug!(title = %candidate.title, round, %error, "rescheduling rejected workout");
                    candidate = self.reschedule(&candidate, working_set).await?;
                }
                Err(error) => return Err(error),
            }
        }

        Err(PlannerError::SchedulingExhausted {
            title: candidate.title,
            attempts: rounds,
        })
    }

    async fn reschedule(
        &self,
        candidate: &WorkoutCandidate,
        working_set: &[ScheduledWorkout],
    ) -> Result<WorkoutCandidate, PlannerError> {
        let policy = self.service.policy();
        let budget = policy.reschedule_attempts;
        let window_start = day_start(&candidate.start, policy.timezone);
        let window_end = candidate.end + chrono::Duration::days(i64::from(budget) + 1);
        let primary_events = self
            .service
            .calendar()
            .fetch_events_in_range(&self.service.calendars().primary_calendar_id, window_start, window_end)
            .await?;

        let context = RescheduleContext {
            policy,
            primary_events: &primary_events,
            working_set,
        };
        match attempt_reschedule(candidate, &context, budget) {
            Ok(moved) => {
                tracing::info!(
                    title = %candidate.title,
                    from = %candidate.start.to_rfc3339(),
                    to = %moved.start.to_rfc3339(),
                    "workout rescheduled"
                );
                Ok(moved)
            }
            Err(exhausted) => {
                tracing::warn!(title = %exhausted.title, attempts = exhausted.attempts, "reschedule budget exhausted");
                Err(exhausted.into())
            }
        }
    }

    async fn committed_workouts(
        &self,
        candidates: &[WorkoutCandidate],
    ) -> Result<Vec<ScheduledWorkout>, PlannerError> {
        let policy = self.service.policy();
        let (Some(earliest), Some(latest)) = (
            candidates.iter().map(|candidate| candidate.start).min(),
            candidates.iter().map(|candidate| candidate.end).max(),
        ) else {
            return Ok(Vec::new());
        };
        let window_start = day_start(&earliest, policy.timezone);
        let window_end = latest + chrono::Duration::days(i64::from(policy.reschedule_attempts) + 1);

        let events = self
            .service
            .calendar()
            .fetch_events_in_range(&self.service.calendars().workouts_calendar_id, window_start, window_end)
            .await?;
        Ok(events.iter().filter_map(ScheduledWorkout::from_event).collect())
    }

    fn drop_accepted_outside_hours(&self, outcome: &mut WeekPlanOutcome) -> Result<(), PlannerError> {
        let policy = self.service.policy();
        let mut kept = Vec::with_capacity(outcome.accepted.len());
        for proposal in outcome.accepted.drain(..) {
            let legal = match &proposal.payload {
                ProposalPayload::Create(draft) => {
                    within_allowed_hours(&draft.start, &draft.end, policy)
                }
                _ => true,
            };
            if legal {
                kept.push(proposal);
                continue;
            }
            self.service.withdraw(&proposal.id)?;
            outcome.skipped.push(SkippedWorkout {
                title: proposal_title(&proposal),
                reason: "outside allowed hours after planning".to_string(),
                status: 400,
            });
        }
        outcome.accepted = kept;
        Ok(())
    }
}

pub fn apply_time_bias(
    candidate: WorkoutCandidate,
    policy: &SchedulePolicy,
    allow_early_start: bool,
) -> WorkoutCandidate {
    if allow_early_start {
        return candidate;
    }
    let local_start = candidate.start.with_timezone(&policy.timezone);
    let date = local_start.date_naive();
    let Some(preferred) = local_instant(policy.timezone, date, policy.preferred_morning_start) else {
        return candidate;
    };
    if local_start >= preferred {
        return candidate;
    }

    if is_weekend(&local_start, policy.timezone) {
        if policy.is_long_workout(candidate.duration()) {
            return candidate;
        }
        return candidate.moved_to(preferred);
    }

    let shifted = candidate.moved_to(preferred);
    let Some(morning_end) = local_instant(policy.timezone, date, policy.morning_end) else {
        return candidate;
    };
    if shifted.end <= morning_end {
        shifted
    } else {
        candidate
    }
}

fn day_start(instant: &DateTime<Tz>, timezone: Tz) -> DateTime<Tz> {
    let date = instant.with_timezone(&timezone).date_naive();
    local_instant(timezone, date, NaiveTime::MIN)
        .or_else(|| {
            date.checked_sub_days(Days::new(1))
                .and_then(|previous| local_instant(timezone, previous, NaiveTime::MIN))
        })
        .unwrap_or(*instant)
}

fn proposal_title(proposal: &Proposal) -> String {
    match &proposal.payload {
        ProposalPayload::Create(draft) => draft.title.clone(),
        _ => proposal.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::proposals::ProposalStore;
    use crate::domain::models::{CalendarEvent, EventDraft, EventTiming};
    use crate::infrastructure::calendar::InMemoryWorkoutCalendar;
    use crate::infrastructure::config::CalendarRefs;
    use chrono::{Duration, NaiveDateTime, TimeZone};
    use chrono_tz::Europe::Berlin;

    const COMPLETE_DESCRIPTION: &str =
        "Duration: 60 min\nTargets: Z2\nIntervals: none\nNotes: easy\nTSS: 45\nkcal: 550";

    fn at(value: &str) -> DateTime<Tz> {
        let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid local time");
        Berlin.from_local_datetime(&naive).single().expect("unambiguous")
    }

    fn candidate(title: &str, start: &str, end: &str) -> WorkoutCandidate {
        WorkoutCandidate::new(title, at(start), at(end), COMPLETE_DESCRIPTION)
    }

    fn planner(calendar: Arc<InMemoryWorkoutCalendar>) -> WeekPlanner<InMemoryWorkoutCalendar> {
        let service = ProposalService::new(
            calendar,
            Arc::new(ProposalStore::default()),
            SchedulePolicy::with_timezone(Berlin),
            CalendarRefs {
                primary_calendar_id: "primary".to_string(),
                workouts_calendar_id: "workouts".to_string(),
            },
        );
        WeekPlanner::new(Arc::new(service))
    }

    fn draft_start(proposal: &Proposal) -> DateTime<Tz> {
        match &proposal.payload {
            ProposalPayload::Create(draft) => draft.start,
            other => panic!("expected create payload, got {other:?}"),
        }
    }

    // Feature: workout-planner, Property 8: batch failures are isolated per workout
    #[tokio::test]
    async fn property8_one_incomplete_workout_is_skipped_others_accepted() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let planner = planner(Arc::clone(&calendar));
        let mut incomplete = candidate("Bike - Sweet Spot", "2026-02-18 18:00", "2026-02-18 19:30");
        incomplete.description = COMPLETE_DESCRIPTION.replace("TSS: 45\n", "");

        let outcome = planner
            .plan_week(
                vec![
                    candidate("Run - Easy", "2026-02-16 07:00", "2026-02-16 08:00"),
                    candidate("Swim - Drills", "2026-02-17 18:00", "2026-02-17 19:00"),
                    incomplete,
                    candidate("Strength", "2026-02-19 07:00", "2026-02-19 07:45"),
                    candidate("Ride - Long", "2026-02-21 08:00", "2026-02-21 12:00"),
                ],
                false,
            )
            .await
            .expect("plan");

        assert_eq!(outcome.accepted.len(), 4);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].title, "Bike - Sweet Spot");
        assert_eq!(outcome.skipped[0].status, 400);
        assert_eq!(outcome.combined_diff.lines().count(), 4);
        assert_eq!(planner.service.list().expect("list").len(), 4);
        assert!(calendar.events("workouts").expect("events").is_empty());
    }

    #[tokio::test]
    async fn colliding_batch_workouts_are_spaced_apart() {
        let planner = planner(Arc::new(InMemoryWorkoutCalendar::new(Berlin)));
        let outcome = planner
            .plan_week(
                vec![
                    candidate("Swim - Endurance", "2026-02-16 18:00", "2026-02-16 19:00"),
                    candidate("Strength", "2026-02-16 18:00", "2026-02-16 19:00"),
                ],
                false,
            )
            .await
            .expect("plan");

        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(draft_start(&outcome.accepted[0]), at("2026-02-16 18:00"));
        assert_eq!(draft_start(&outcome.accepted[1]), at("2026-02-16 19:30"));
    }

    #[tokio::test]
    async fn committed_workouts_push_candidate_past_minimum_gap() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        calendar
            .create_event(
                "workouts",
                &EventDraft {
                    title: "Swim - Endurance".to_string(),
                    description: COMPLETE_DESCRIPTION.to_string(),
                    start: at("2026-02-16 18:00"),
                    end: at("2026-02-16 19:00"),
                },
            )
            .await
            .expect("seed committed workout");
        let planner = planner(calendar);

        let outcome = planner
            .plan_week(vec![candidate("Run - Easy", "2026-02-16 18:50", "2026-02-16 19:50")], false)
            .await
            .expect("plan");
        assert_eq!(draft_start(&outcome.accepted[0]), at("2026-02-16 19:30"));
    }

    #[tokio::test]
    async fn brick_pair_in_batch_stays_back_to_back() {
        let planner = planner(Arc::new(InMemoryWorkoutCalendar::new(Berlin)));
        let outcome = planner
            .plan_week(
                vec![
                    candidate("Bike - Tempo", "2026-02-21 08:00", "2026-02-21 10:00"),
                    candidate("Run - Off the bike", "2026-02-21 10:00", "2026-02-21 10:30"),
                ],
                false,
            )
            .await
            .expect("plan");
        assert_eq!(draft_start(&outcome.accepted[1]), at("2026-02-21 10:00"));
    }

    #[tokio::test]
    async fn fully_booked_primary_calendar_skips_with_exhaustion() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let first_day = at("2026-02-16 00:00");
        for hour in 0..(24 * 17) {
            let start = first_day + Duration::hours(hour);
            calendar
                .seed(
                    "primary",
                    CalendarEvent {
                        id: format!("busy-{hour}"),
                        title: "Busy".to_string(),
                        description: None,
                        timing: EventTiming::Timed {
                            start,
                            end: start + Duration::hours(1),
                        },
                    },
                )
                .expect("seed");
        }
        let planner = planner(calendar);

        let outcome = planner
            .plan_week(vec![candidate("Run - Easy", "2026-02-16 07:00", "2026-02-16 08:00")], false)
            .await
            .expect("plan");
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].status, 409);
        assert!(outcome.skipped[0].reason.contains("no legal slot"));
    }

    #[tokio::test]
    async fn incomplete_description_is_skipped_before_any_rescheduling() {
        let calendar = Arc::new(InMemoryWorkoutCalendar::new(Berlin));
        let first_day = at("2026-02-16 00:00");
        for hour in 0..(24 * 17) {
            let start = first_day + Duration::hours(hour);
            calendar
                .seed(
                    "primary",
                    CalendarEvent {
                        id: format!("busy-{hour}"),
                        title: "Busy".to_string(),
                        description: None,
                        timing: EventTiming::Timed {
                            start,
                            end: start + Duration::hours(1),
                        },
                    },
                )
                .expect("seed");
        }
        calendar
            .create_event(
                "workouts",
                &EventDraft {
                    title: "Swim - Endurance".to_string(),
                    description: COMPLETE_DESCRIPTION.to_string(),
                    start: at("2026-02-16 07:00"),
                    end: at("2026-02-16 08:00"),
                },
            )
            .await
            .expect("seed committed workout");
        let planner = planner(calendar);
        let mut incomplete = candidate("Run - Easy", "2026-02-16 07:00", "2026-02-16 08:00");
        incomplete.description = "Duration: 60".to_string();

        let outcome = planner.plan_week(vec![incomplete], false).await.expect("plan");

        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].status, 400);
        assert!(outcome.skipped[0].reason.contains("description incomplete"));
        assert!(outcome.skipped[0].reason.contains("TSS"));
    }

    #[tokio::test]
    async fn early_weekday_start_is_biased_to_seven() {
        let planner = planner(Arc::new(InMemoryWorkoutCalendar::new(Berlin)));
        let outcome = planner
            .plan_week(vec![candidate("Run - Tempo", "2026-02-16 06:15", "2026-02-16 07:15")], false)
            .await
            .expect("plan");
        let proposal = &outcome.accepted[0];
        assert_eq!(draft_start(proposal), at("2026-02-16 07:00"));
        assert!(proposal.diff_text.contains("Mon 2026-02-16 07:00 CET → Mon 2026-02-16 08:00 CET"));
    }

    #[test]
    fn time_bias_respects_explicit_early_requests_and_long_weekends() {
        let policy = SchedulePolicy::with_timezone(Berlin);

        let early = candidate("Run", "2026-02-16 06:45", "2026-02-16 07:45");
        assert_eq!(apply_time_bias(early.clone(), &policy, false).start, at("2026-02-16 07:00"));
        assert_eq!(apply_time_bias(early, &policy, true).start, at("2026-02-16 06:45"));

        let overruns = candidate("Run", "2026-02-16 06:30", "2026-02-16 09:15");
        assert_eq!(apply_time_bias(overruns, &policy, false).start, at("2026-02-16 06:30"));

        let long_weekend = candidate("Ride - Long", "2026-02-21 05:30", "2026-02-21 09:30");
        assert_eq!(apply_time_bias(long_weekend, &policy, false).start, at("2026-02-21 05:30"));

        let short_weekend = candidate("Swim", "2026-02-22 06:00", "2026-02-22 07:00");
        assert_eq!(apply_time_bias(short_weekend, &policy, false).start, at("2026-02-22 07:00"));
    }
}
