use crate::domain::conflicts::classify_conflicts;
use crate::domain::models::{
    CalendarEvent, Interval, ScheduledWorkout, WorkoutCandidate, local_instant,
};
use crate::domain::policy::{
    SchedulePolicy, intervals_overlap, is_lunch_exempt, is_weekend, within_allowed_hours,
};
use crate::domain::spacing::check_spacing;
use chrono::{DateTime, Days, Duration, NaiveDate};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct RescheduleContext<'a> {
    pub policy: &'a SchedulePolicy,
    pub primary_events: &'a [CalendarEvent],
    pub working_set: &'a [ScheduledWorkout],
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no legal slot found for '{title}' within {attempts} attempts")]
pub struct RescheduleExhausted {
    pub title: String,
    pub attempts: u32,
}

pub fn attempt_reschedule(
    candidate: &WorkoutCandidate,
    context: &RescheduleContext<'_>,
    budget: u32,
) -> Result<WorkoutCandidate, RescheduleExhausted> {
    let policy = context.policy;
    let timezone = policy.timezone;
    let duration = candidate.duration();
    let base_date = candidate.start.with_timezone(&timezone).date_naive();

    for attempt in 0..budget {
        let Some(date) = base_date.checked_add_days(Days::new(u64::from(attempt))) else {
            break;
        };
        let seed = if attempt == 0 {
            Some(candidate.start.with_timezone(&timezone))
        } else {
            preferred_day_start(date, duration, policy)
        };
        let Some(seed) = seed else {
            continue;
        };

        for start in day_options(candidate, seed, date, context) {
            let moved = candidate.moved_to(start);
            if is_acceptable(&moved, context) {
                return Ok(moved);
            }
        }
    }

    Err(RescheduleExhausted {
        title: candidate.title.clone(),
        attempts: budget,
    })
}

pub fn snap_to_valid_slot(
    seed: DateTime<Tz>,
    duration: Duration,
    policy: &SchedulePolicy,
) -> Option<DateTime<Tz>> {
    let local = seed.with_timezone(&policy.timezone);
    if within_allowed_hours(&local, &(local + duration), policy) {
        return Some(local);
    }

    let date = local.date_naive();
    if local.time() < policy.morning_end {
        for time in [policy.preferred_morning_start, policy.morning_start] {
            let Some(start) = local_instant(policy.timezone, date, time) else {
                continue;
            };
            if within_allowed_hours(&start, &(start + duration), policy) {
                return Some(start);
            }
        }
    }
    local_instant(policy.timezone, date, policy.evening_start)
}

fn preferred_day_start(
    date: NaiveDate,
    duration: Duration,
    policy: &SchedulePolicy,
) -> Option<DateTime<Tz>> {
    let reference = local_instant(policy.timezone, date, policy.evening_start)?;
    let time = if is_weekend(&reference, policy.timezone) && policy.is_long_workout(duration) {
        policy.morning_start
    } else {
        policy.preferred_morning_start
    };
    local_instant(policy.timezone, date, time)
}

fn day_options(
    candidate: &WorkoutCandidate,
    seed: DateTime<Tz>,
    date: NaiveDate,
    context: &RescheduleContext<'_>,
) -> Vec<DateTime<Tz>> {
    let policy = context.policy;
    let duration = candidate.duration();
    let gap = policy.min_gap();
    let mut options = Vec::new();

    let snapped = snap_to_valid_slot(seed, duration, policy);
    if let Some(snapped) = snapped {
        options.push(snapped);
    }

    let blockers = same_day_blockers(candidate, date, context);
    if !blockers.is_empty() {
        let probe_start = snapped.unwrap_or(seed);
        let probe = Interval {
            start: probe_start,
            end: probe_start + duration,
        };
        let anchor = blockers
            .iter()
            .find(|blocker| too_close(&probe, blocker, gap))
            .or_else(|| blockers.first());
        if let Some(anchor) = anchor {
            if let Some(before) = place_before(anchor.start, duration, date, policy) {
                options.push(before);
            }
        }
        if let Some(latest_end) = blockers.iter().map(|blocker| blocker.end).max() {
            if let Some(after) = place_after(latest_end, duration, date, policy) {
                options.push(after);
            }
        }
    }

    options.dedup();
    options
}

fn place_before(
    anchor_start: DateTime<Tz>,
    duration: Duration,
    date: NaiveDate,
    policy: &SchedulePolicy,
) -> Option<DateTime<Tz>> {
    let start = (anchor_start - policy.min_gap() - duration).with_timezone(&policy.timezone);
    if start.date_naive() != date {
        return None;
    }
    let floor_time = if is_weekend(&start, policy.timezone) && policy.is_long_workout(duration) {
        policy.long_weekend_earliest_start
    } else {
        policy.preferred_morning_start
    };
    let floor = local_instant(policy.timezone, date, floor_time)?;
    (start >= floor).then_some(start)
}

fn place_after(
    latest_end: DateTime<Tz>,
    duration: Duration,
    date: NaiveDate,
    policy: &SchedulePolicy,
) -> Option<DateTime<Tz>> {
    let earliest = (latest_end + policy.min_gap()).with_timezone(&policy.timezone);
    if earliest.date_naive() != date {
        return None;
    }
    if within_allowed_hours(&earliest, &(earliest + duration), policy) {
        return Some(earliest);
    }

    if let Some(morning) = local_instant(policy.timezone, date, policy.preferred_morning_start) {
        if earliest <= morning && within_allowed_hours(&morning, &(morning + duration), policy) {
            return Some(morning);
        }
    }
    let evening = local_instant(policy.timezone, date, policy.evening_start)?;
    Some(earliest.max(evening))
}

fn same_day_blockers(
    candidate: &WorkoutCandidate,
    date: NaiveDate,
    context: &RescheduleContext<'_>,
) -> Vec<Interval> {
    let timezone = context.policy.timezone;
    let Some(day_start) = local_instant(timezone, date, chrono::NaiveTime::MIN) else {
        return Vec::new();
    };
    let day_end = date
        .checked_add_days(Days::new(1))
        .and_then(|next| local_instant(timezone, next, chrono::NaiveTime::MIN))
        .unwrap_or(day_start + Duration::days(1));
    let day = Interval {
        start: day_start,
        end: day_end,
    };

    let primary = context
        .primary_events
        .iter()
        .filter(|event| !is_lunch_exempt(&event.title))
        .filter(|event| {
            candidate
                .source_event_id
                .as_deref()
                .is_none_or(|own_id| own_id != event.id)
        })
        .filter_map(CalendarEvent::interval);
    let workouts = context
        .working_set
        .iter()
        .filter(|workout| match (candidate.source_event_id.as_deref(), workout.event_id.as_deref()) {
            (Some(own_id), Some(other_id)) => own_id != other_id,
            _ => true,
        })
        .map(|workout| workout.interval);

    let mut blockers = primary
        .chain(workouts)
        .filter(|interval| intervals_overlap(interval, &day))
        .collect::<Vec<_>>();
    blockers.sort_by_key(|interval| interval.start);
    blockers
}

fn too_close(probe: &Interval, blocker: &Interval, gap: Duration) -> bool {
    if intervals_overlap(probe, blocker) {
        return true;
    }
    if blocker.end <= probe.start {
        probe.start - blocker.end < gap
    } else {
        blocker.start - probe.end < gap
    }
}

fn is_acceptable(candidate: &WorkoutCandidate, context: &RescheduleContext<'_>) -> bool {
    let policy = context.policy;
    within_allowed_hours(&candidate.start, &candidate.end, policy)
        && !classify_conflicts(
            &candidate.interval(),
            context.primary_events,
            policy.timezone,
            candidate.source_event_id.as_deref(),
        )
        .is_blocked()
        && check_spacing(candidate, context.working_set, policy.min_gap()).valid
}
