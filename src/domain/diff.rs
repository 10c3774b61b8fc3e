use crate::domain::models::{CalendarEvent, EventDraft, EventTiming};
use crate::domain::policy::display_instant;
use chrono::{DateTime, Days, NaiveDate};
use chrono_tz::Tz;

pub fn render_span(start: &DateTime<Tz>, end: &DateTime<Tz>, timezone: Tz) -> String {
    format!(
        "{} → {}",
        display_instant(start, timezone),
        display_instant(end, timezone)
    )
}

pub fn render_event_summary(event: &CalendarEvent, timezone: Tz) -> String {
    match event.timing {
        EventTiming::Timed { start, end } => {
            format!("{} | {}", event.title, render_span(&start, &end, timezone))
        }
        EventTiming::AllDay {
            start_date,
            end_date,
        } => {
            let last_day = end_date.checked_sub_days(Days::new(1)).unwrap_or(start_date);
            if last_day <= start_date {
                format!("{} | all day {}", event.title, render_date(start_date))
            } else {
                format!(
                    "{} | all day {} → {}",
                    event.title,
                    render_date(start_date),
                    render_date(last_day)
                )
            }
        }
    }
}

pub fn create_diff(draft: &EventDraft, timezone: Tz) -> String {
    format!(
        "Create → {} | {}",
        draft.title,
        render_span(&draft.start, &draft.end, timezone)
    )
}

pub fn update_diff(before: &CalendarEvent, after: &CalendarEvent, timezone: Tz) -> String {
    format!(
        "Update → {} ⟶ {}",
        render_event_summary(before, timezone),
        render_event_summary(after, timezone)
    )
}

pub fn delete_diff(event: &CalendarEvent, timezone: Tz) -> String {
    format!("Delete → {}", render_event_summary(event, timezone))
}

fn render_date(date: NaiveDate) -> String {
    date.format("%a %Y-%m-%d").to_string()
}
