use crate::domain::models::{CalendarEvent, EventTiming, Interval};
use crate::domain::policy::{
    PolicyResult, PolicyViolation, intervals_overlap, is_all_day_and_overlapping, is_lunch_exempt,
};
use chrono_tz::Tz;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub blocking: Vec<CalendarEvent>,
    pub warnings: Vec<CalendarEvent>,
}

impl ConflictReport {
    pub fn is_blocked(&self) -> bool {
        !self.blocking.is_empty()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings
            .iter()
            .map(|event| format!("overlaps all-day event '{}'", event.title))
            .collect()
    }

    pub fn to_result(&self) -> PolicyResult {
        if self.is_blocked() {
            return Err(PolicyViolation::ConflictsWithPrimary(self.blocking.clone()));
        }
        Ok(())
    }
}

pub fn classify_conflicts(
    interval: &Interval,
    events: &[CalendarEvent],
    timezone: Tz,
    ignore_event_id: Option<&str>,
) -> ConflictReport {
    let candidate_date = interval.start.with_timezone(&timezone).date_naive();
    let mut report = ConflictReport::default();

    for event in events {
        if ignore_event_id.is_some_and(|ignored| ignored == event.id) {
            continue;
        }
        if is_lunch_exempt(&event.title) {
            continue;
        }
        match event.timing {
            EventTiming::AllDay { .. } => {
                if is_all_day_and_overlapping(event, candidate_date) {
                    report.warnings.push(event.clone());
                }
            }
            EventTiming::Timed { start, end } => {
                if intervals_overlap(interval, &Interval { start, end }) {
                    report.blocking.push(event.clone());
                }
            }
        }
    }

    report
}
