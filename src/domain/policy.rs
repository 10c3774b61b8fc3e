use crate::domain::models::{CalendarEvent, EventTiming, Interval, WorkoutCandidate};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use thiserror::Error;

pub const REQUIRED_DESCRIPTION_FIELDS: [&str; 6] =
    ["Duration", "Targets", "Intervals", "Notes", "TSS", "kcal"];
pub const EXTENDED_DESCRIPTION_FIELDS: [&str; 2] = ["Distance", "Time"];

const LUNCH_KEYWORD: &str = "lunch";
const DELETION_GUARD_KEYWORD: &str = "race";
const BIKE_KEYWORDS: [&str; 3] = ["bike", "ride", "cycling"];
const RUN_KEYWORDS: [&str; 1] = ["run"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub timezone: Tz,
    pub morning_start: NaiveTime,
    pub morning_end: NaiveTime,
    pub evening_start: NaiveTime,
    pub preferred_morning_start: NaiveTime,
    pub long_weekend_earliest_start: NaiveTime,
    pub min_gap_minutes: i64,
    pub long_workout_minutes: i64,
    pub reschedule_attempts: u32,
    pub batch_rounds: u32,
    pub extended_description: bool,
}

impl SchedulePolicy {
    pub fn with_timezone(timezone: Tz) -> Self {
        Self {
            timezone,
            morning_start: hm(6, 30),
            morning_end: hm(9, 30),
            evening_start: hm(18, 0),
            preferred_morning_start: hm(7, 0),
            long_weekend_earliest_start: hm(5, 0),
            min_gap_minutes: 30,
            long_workout_minutes: 180,
            reschedule_attempts: 14,
            batch_rounds: 3,
            extended_description: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.morning_end <= self.morning_start {
            return Err("policy.allowed_hours.morning_end must be after morning_start".to_string());
        }
        if self.evening_start < self.morning_end {
            return Err("policy.allowed_hours.evening_start must not precede morning_end".to_string());
        }
        if self.min_gap_minutes < 0 {
            return Err("policy.min_gap_minutes must be >= 0".to_string());
        }
        if self.long_workout_minutes <= 0 {
            return Err("policy.long_workout_minutes must be > 0".to_string());
        }
        if self.reschedule_attempts == 0 {
            return Err("policy.reschedule_attempts must be > 0".to_string());
        }
        if self.batch_rounds == 0 {
            return Err("policy.batch_rounds must be > 0".to_string());
        }
        Ok(())
    }

    pub fn min_gap(&self) -> Duration {
        Duration::minutes(self.min_gap_minutes)
    }

    pub fn is_long_workout(&self, duration: Duration) -> bool {
        duration >= Duration::minutes(self.long_workout_minutes)
    }

    pub fn required_description_fields(&self) -> Vec<&'static str> {
        let mut fields = REQUIRED_DESCRIPTION_FIELDS.to_vec();
        if self.extended_description {
            fields.extend(EXTENDED_DESCRIPTION_FIELDS);
        }
        fields
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::with_timezone(Tz::UTC)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("workout {start} -> {end} is outside allowed hours")]
    OutsideAllowedHours { start: String, end: String },
    #[error("conflicts with primary calendar: {}", event_titles(.0))]
    ConflictsWithPrimary(Vec<CalendarEvent>),
    #[error("insufficient spacing: {}", .0.join("; "))]
    InsufficientSpacing(Vec<String>),
    #[error("deletion blocked for protected event '{title}'")]
    DeletionBlocked { title: String },
    #[error("description incomplete, missing: {}", .0.join(", "))]
    DescriptionIncomplete(Vec<String>),
}

impl PolicyViolation {
    pub fn is_reschedulable(&self) -> bool {
        matches!(
            self,
            Self::OutsideAllowedHours { .. }
                | Self::ConflictsWithPrimary(_)
                | Self::InsufficientSpacing(_)
        )
    }
}

pub type PolicyResult = Result<(), PolicyViolation>;

pub fn overlaps(
    a_start: &DateTime<Tz>,
    a_end: &DateTime<Tz>,
    b_start: &DateTime<Tz>,
    b_end: &DateTime<Tz>,
) -> bool {
    a_start < b_end && a_end > b_start
}

pub fn intervals_overlap(a: &Interval, b: &Interval) -> bool {
    overlaps(&a.start, &a.end, &b.start, &b.end)
}

pub fn is_weekend(instant: &DateTime<Tz>, timezone: Tz) -> bool {
    matches!(
        instant.with_timezone(&timezone).weekday(),
        Weekday::Sat | Weekday::Sun
    )
}

pub fn within_allowed_hours(start: &DateTime<Tz>, end: &DateTime<Tz>, policy: &SchedulePolicy) -> bool {
    if end <= start {
        return false;
    }
    let local_start = start.with_timezone(&policy.timezone);
    if is_weekend(&local_start, policy.timezone) {
        return true;
    }

    let start_time = local_start.time();
    if start_time >= policy.evening_start {
        return true;
    }
    if start_time < policy.morning_start || start_time >= policy.morning_end {
        return false;
    }

    let local_end = end.with_timezone(&policy.timezone);
    local_end.date_naive() == local_start.date_naive() && local_end.time() <= policy.morning_end
}

pub fn check_allowed_hours(candidate: &WorkoutCandidate, policy: &SchedulePolicy) -> PolicyResult {
    if within_allowed_hours(&candidate.start, &candidate.end, policy) {
        return Ok(());
    }
    Err(PolicyViolation::OutsideAllowedHours {
        start: display_instant(&candidate.start, policy.timezone),
        end: display_instant(&candidate.end, policy.timezone),
    })
}

pub fn is_all_day_and_overlapping(event: &CalendarEvent, candidate_date: NaiveDate) -> bool {
    match event.timing {
        EventTiming::AllDay {
            start_date,
            end_date,
        } => candidate_date >= start_date && candidate_date < end_date,
        EventTiming::Timed { .. } => false,
    }
}

pub fn missing_description_fields(description: &str, fields: &[&str]) -> Vec<String> {
    let lowered = description.to_lowercase();
    fields
        .iter()
        .filter(|label| !has_labeled_value(&lowered, label))
        .map(|label| (*label).to_string())
        .collect()
}

pub fn check_description(description: &str, policy: &SchedulePolicy) -> PolicyResult {
    let missing = missing_description_fields(description, &policy.required_description_fields());
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PolicyViolation::DescriptionIncomplete(missing))
    }
}

pub fn title_blocks_deletion(title: &str) -> bool {
    title.to_lowercase().contains(DELETION_GUARD_KEYWORD)
}

pub fn check_deletion_allowed(title: &str) -> PolicyResult {
    if title_blocks_deletion(title) {
        return Err(PolicyViolation::DeletionBlocked {
            title: title.to_string(),
        });
    }
    Ok(())
}

pub fn is_lunch_exempt(title: &str) -> bool {
    title.to_lowercase().contains(LUNCH_KEYWORD)
}

pub fn is_bike_title(title: &str) -> bool {
    let lowered = title.to_lowercase();
    BIKE_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

pub fn is_run_title(title: &str) -> bool {
    let lowered = title.to_lowercase();
    RUN_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

pub fn is_brick_pair(earlier_title: &str, later_title: &str) -> bool {
    is_bike_title(earlier_title) && is_run_title(later_title)
}

pub fn display_instant(instant: &DateTime<Tz>, timezone: Tz) -> String {
    instant
        .with_timezone(&timezone)
        .format("%a %Y-%m-%d %H:%M %Z")
        .to_string()
}

fn has_labeled_value(lowered_description: &str, label: &str) -> bool {
    let needle = format!("{}:", label.to_lowercase());
    let mut search_from = 0;
    while let Some(offset) = lowered_description[search_from..].find(&needle) {
        let index = search_from + offset;
        let at_boundary = lowered_description[..index]
            .chars()
            .next_back()
            .map(|previous| !previous.is_alphanumeric())
            .unwrap_or(true);
        let value = lowered_description[index + needle.len()..]
            .lines()
            .next()
            .unwrap_or("")
            .trim();
        if at_boundary && !value.is_empty() {
            return true;
        }
        search_from = index + needle.len();
    }
    false
}

fn event_titles(events: &[CalendarEvent]) -> String {
    events
        .iter()
        .map(|event| event.title.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};
    use chrono_tz::Europe::Berlin;
    use proptest::prelude::*;

    fn at(value: &str) -> DateTime<Tz> {
        let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid local time");
        Berlin
            .from_local_datetime(&naive)
            .single()
            .expect("unambiguous local time")
    }

    fn policy() -> SchedulePolicy {
        SchedulePolicy::with_timezone(Berlin)
    }

    const COMPLETE_DESCRIPTION: &str = "Duration: 60 min\nTargets: Z2 HR\nIntervals: 3x10 min\nNotes: stay relaxed\nTSS: 55\nkcal: 600";

    #[test]
    fn weekday_morning_boundaries() {
        let policy = policy();
        // 2026-02-16 is a Monday.
        assert!(within_allowed_hours(&at("2026-02-16 06:30"), &at("2026-02-16 09:30"), &policy));
        assert!(!within_allowed_hours(&at("2026-02-16 06:30"), &at("2026-02-16 09:31"), &policy));
        assert!(!within_allowed_hours(&at("2026-02-16 06:29"), &at("2026-02-16 07:29"), &policy));
        assert!(!within_allowed_hours(&at("2026-02-16 09:30"), &at("2026-02-16 09:45"), &policy));
    }

    #[test]
    fn weekday_evening_boundaries() {
        let policy = policy();
        assert!(!within_allowed_hours(&at("2026-02-16 17:59"), &at("2026-02-16 18:59"), &policy));
        assert!(within_allowed_hours(&at("2026-02-16 18:00"), &at("2026-02-16 19:00"), &policy));
        assert!(within_allowed_hours(&at("2026-02-16 21:00"), &at("2026-02-16 23:30"), &policy));
    }

    #[test]
    fn weekend_accepts_any_hour() {
        let policy = policy();
        // 2026-02-21 is a Saturday.
        assert!(within_allowed_hours(&at("2026-02-21 05:00"), &at("2026-02-21 09:00"), &policy));
        assert!(within_allowed_hours(&at("2026-02-22 12:00"), &at("2026-02-22 13:00"), &policy));
        assert!(is_weekend(&at("2026-02-21 12:00"), Berlin));
        assert!(!is_weekend(&at("2026-02-20 12:00"), Berlin));
    }

    #[test]
    fn weekday_is_judged_in_configured_timezone() {
        let policy = policy();
        // 06:00 UTC on a Monday is 07:00 in Berlin.
        let start = DateTime::parse_from_rfc3339("2026-02-16T06:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Tz::UTC);
        let end = start + Duration::minutes(60);
        assert!(within_allowed_hours(&start, &end, &policy));
    }

    #[test]
    fn check_allowed_hours_reports_reason() {
        let candidate = WorkoutCandidate::new(
            "Run - Tempo",
            at("2026-02-16 06:15"),
            at("2026-02-16 07:15"),
            COMPLETE_DESCRIPTION,
        );
        match check_allowed_hours(&candidate, &policy()) {
            Err(PolicyViolation::OutsideAllowedHours { start, .. }) => {
                assert!(start.contains("06:15"));
            }
            other => panic!("expected outside allowed hours, got {other:?}"),
        }
    }

    #[test]
    fn all_day_containment_uses_exclusive_end() {
        let event = CalendarEvent {
            id: "evt-1".to_string(),
            title: "Travel".to_string(),
            description: None,
            timing: EventTiming::AllDay {
                start_date: NaiveDate::from_ymd_opt(2026, 2, 16).expect("date"),
                end_date: NaiveDate::from_ymd_opt(2026, 2, 17).expect("date"),
            },
        };
        assert!(is_all_day_and_overlapping(&event, NaiveDate::from_ymd_opt(2026, 2, 16).expect("date")));
        assert!(!is_all_day_and_overlapping(&event, NaiveDate::from_ymd_opt(2026, 2, 17).expect("date")));
    }

    #[test]
    fn description_completeness_lists_missing_labels() {
        let policy = policy();
        assert!(check_description(COMPLETE_DESCRIPTION, &policy).is_ok());

        let without_tss = COMPLETE_DESCRIPTION.replace("TSS: 55", "");
        assert_eq!(
            check_description(&without_tss, &policy),
            Err(PolicyViolation::DescriptionIncomplete(vec!["TSS".to_string()]))
        );

        let lowercase_labels = COMPLETE_DESCRIPTION.to_lowercase();
        assert!(check_description(&lowercase_labels, &policy).is_ok());

        let empty_value = COMPLETE_DESCRIPTION.replace("Notes: stay relaxed", "Notes:   ");
        assert_eq!(
            missing_description_fields(&empty_value, &REQUIRED_DESCRIPTION_FIELDS),
            vec!["Notes".to_string()]
        );
    }

    #[test]
    fn extended_description_requires_distance_and_time() {
        let mut policy = policy();
        policy.extended_description = true;
        match check_description(COMPLETE_DESCRIPTION, &policy) {
            Err(PolicyViolation::DescriptionIncomplete(missing)) => {
                assert_eq!(missing, vec!["Distance".to_string(), "Time".to_string()]);
            }
            other => panic!("expected incomplete description, got {other:?}"),
        }
        let extended = format!("{COMPLETE_DESCRIPTION}\nDistance: 12 km\nTime: 60 min");
        assert!(check_description(&extended, &policy).is_ok());
    }

    #[test]
    fn deletion_guard_matches_race_substring() {
        assert!(title_blocks_deletion("Spring Race 5k"));
        assert!(title_blocks_deletion("Race Prep Run"));
        assert!(title_blocks_deletion("half marathon RACE day"));
        assert!(!title_blocks_deletion("Tempo Run"));
        assert!(matches!(
            check_deletion_allowed("Spring Race 5k"),
            Err(PolicyViolation::DeletionBlocked { .. })
        ));
    }

    #[test]
    fn brick_pair_is_order_sensitive() {
        assert!(is_brick_pair("Bike - Sweet Spot", "Run - Brick"));
        assert!(is_brick_pair("Long Ride", "Easy Running"));
        assert!(!is_brick_pair("Run - Easy", "Bike - Recovery"));
        assert!(!is_brick_pair("Swim - Drills", "Run - Easy"));
    }

    #[test]
    fn reschedulable_violations() {
        assert!(PolicyViolation::InsufficientSpacing(vec![]).is_reschedulable());
        assert!(PolicyViolation::ConflictsWithPrimary(vec![]).is_reschedulable());
        assert!(!PolicyViolation::DescriptionIncomplete(vec![]).is_reschedulable());
        assert!(!PolicyViolation::DeletionBlocked { title: "Race".to_string() }.is_reschedulable());
    }

    fn instant_strategy() -> impl Strategy<Value = DateTime<Tz>> {
        (0i64..(60 * 24 * 14)).prop_map(|minutes| at("2026-02-16 00:00") + Duration::minutes(minutes))
    }

    // Feature: workout-planner, Property 1: overlap is symmetric
    proptest! {
        #[test]
        fn property1_overlap_is_symmetric(
            a_start in instant_strategy(),
            a_len in 1i64..600,
            b_start in instant_strategy(),
            b_len in 1i64..600
        ) {
            let a_end = a_start + Duration::minutes(a_len);
            let b_end = b_start + Duration::minutes(b_len);
            prop_assert_eq!(
                overlaps(&a_start, &a_end, &b_start, &b_end),
                overlaps(&b_start, &b_end, &a_start, &a_end)
            );
        }
    }

    // Feature: workout-planner, Property 2: accepted weekday slots are morning or evening
    proptest! {
        #[test]
        fn property2_accepted_weekday_slots_are_morning_or_evening(
            start in instant_strategy(),
            length in 15i64..240
        ) {
            let policy = policy();
            let end = start + Duration::minutes(length);
            if within_allowed_hours(&start, &end, &policy) && !is_weekend(&start, Berlin) {
                let start_time = start.time();
                let morning = start_time >= policy.morning_start
                    && end.time() <= policy.morning_end
                    && end.date_naive() == start.date_naive();
                prop_assert!(morning || start_time >= policy.evening_start);
            }
        }
    }
}
