use crate::domain::models::{CalendarEvent, EventDraft, EventPatch, EventTiming};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

const STATUS_CANCELLED: &str = "cancelled";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct GoogleCalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<CalendarEventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<CalendarEventDateTime>,
}

pub fn encode_draft(draft: &EventDraft, timezone: Tz) -> GoogleCalendarEvent {
    GoogleCalendarEvent {
        summary: Some(draft.title.clone()),
        description: Some(draft.description.clone()),
        start: Some(encode_instant(&draft.start, timezone)),
        end: Some(encode_instant(&draft.end, timezone)),
        ..GoogleCalendarEvent::default()
    }
}

pub fn encode_patch(patch: &EventPatch, timezone: Tz) -> GoogleCalendarEvent {
    GoogleCalendarEvent {
        summary: patch.title.clone(),
        description: patch.description.clone(),
        start: patch.start.map(|start| encode_instant(&start, timezone)),
        end: patch.end.map(|end| encode_instant(&end, timezone)),
        ..GoogleCalendarEvent::default()
    }
}

pub fn decode_event(event: &GoogleCalendarEvent, timezone: Tz) -> Result<Option<CalendarEvent>, InfraError> {
    if event.status.as_deref() == Some(STATUS_CANCELLED) {
        return Ok(None);
    }

    let id = event
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| InfraError::Upstream("calendar event is missing id".to_string()))?;
    let start = event
        .start
        .as_ref()
        .ok_or_else(|| InfraError::Upstream(format!("calendar event {id} is missing start")))?;
    let end = event
        .end
        .as_ref()
        .ok_or_else(|| InfraError::Upstream(format!("calendar event {id} is missing end")))?;

    let timing = match (&start.date_time, &end.date_time, &start.date, &end.date) {
        (Some(start_at), Some(end_at), _, _) => {
            let start = parse_instant(start_at, "start.dateTime", timezone)?;
            let end = parse_instant(end_at, "end.dateTime", timezone)?;
            if end <= start {
                return Err(InfraError::Upstream(format!(
                    "calendar event {id}: end is not after start"
                )));
            }
            EventTiming::Timed { start, end }
        }
        (None, None, Some(start_date), Some(end_date)) => {
            let start_date = parse_date(start_date, "start.date")?;
            let end_date = parse_date(end_date, "end.date")?;
            if end_date <= start_date {
                return Err(InfraError::Upstream(format!(
                    "calendar event {id}: end date is not after start date"
                )));
            }
            EventTiming::AllDay {
                start_date,
                end_date,
            }
        }
        _ => {
            return Err(InfraError::Upstream(format!(
                "calendar event {id} mixes or omits dateTime and date"
            )));
        }
    };

    Ok(Some(CalendarEvent {
        id: id.to_string(),
        title: event.summary.clone().unwrap_or_default(),
        description: event.description.clone().filter(|value| !value.trim().is_empty()),
        timing,
    }))
}

fn encode_instant(instant: &DateTime<Tz>, timezone: Tz) -> CalendarEventDateTime {
    CalendarEventDateTime {
        date_time: Some(instant.with_timezone(&timezone).to_rfc3339()),
        date: None,
        time_zone: Some(timezone.name().to_string()),
    }
}

fn parse_instant(value: &str, field_name: &str, timezone: Tz) -> Result<DateTime<Tz>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&timezone))
        .map_err(|error| {
            InfraError::Upstream(format!("invalid calendar event {field_name} '{value}': {error}"))
        })
}

fn parse_date(value: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|error| {
        InfraError::Upstream(format!("invalid calendar event {field_name} '{value}': {error}"))
    })
}
