use crate::domain::models::{ScheduledWorkout, WorkoutCandidate};
use crate::domain::policy::{intervals_overlap, is_brick_pair};
use chrono::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpacingReport {
    pub valid: bool,
    pub conflicts: Vec<ScheduledWorkout>,
    pub warnings: Vec<String>,
}

/// Overlap always conflicts. Otherwise each side needs `min_gap`, except a
/// bike followed by a run, which may be back to back.
pub fn check_spacing(
    candidate: &WorkoutCandidate,
    existing: &[ScheduledWorkout],
    min_gap: Duration,
) -> SpacingReport {
    let interval = candidate.interval();
    let mut conflicts = Vec::new();
    let mut warnings = Vec::new();

    for workout in existing {
        if let (Some(own_id), Some(other_id)) =
            (candidate.source_event_id.as_deref(), workout.event_id.as_deref())
        {
            if own_id == other_id {
                continue;
            }
        }

        if intervals_overlap(&interval, &workout.interval) {
            warnings.push(format!(
                "'{}' overlaps existing workout '{}'",
                candidate.title, workout.title
            ));
            conflicts.push(workout.clone());
            continue;
        }

        let (gap, earlier_title, later_title) = if workout.interval.end <= interval.start {
            (
                interval.start - workout.interval.end,
                workout.title.as_str(),
                candidate.title.as_str(),
            )
        } else {
            (
                workout.interval.start - interval.end,
                candidate.title.as_str(),
                workout.title.as_str(),
            )
        };

        if gap < min_gap && !is_brick_pair(earlier_title, later_title) {
            warnings.push(format!(
                "only {} min between '{}' and '{}' (minimum {} min)",
                gap.num_minutes(),
                earlier_title,
                later_title,
                min_gap.num_minutes()
            ));
            conflicts.push(workout.clone());
        }
    }

    SpacingReport {
        valid: conflicts.is_empty(),
        conflicts,
        warnings,
    }
}
