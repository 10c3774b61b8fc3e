use crate::domain::models::{CalendarEvent, EventDraft, EventPatch, Interval};
use crate::infrastructure::calendar::{WorkoutCalendar, merge_intervals};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{
    GoogleCalendarEvent, decode_event, encode_draft, encode_patch,
};
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use reqwest::{Client, RequestBuilder, StatusCode};
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
const FREE_BUSY_ENDPOINT: &str = "https://www.googleapis.com/calendar/v3/freeBusy";

#[derive(Debug, Clone)]
pub struct GoogleWorkoutCalendar {
    client: Client,
    access_token: String,
    timezone: Tz,
}

impl GoogleWorkoutCalendar {
    pub fn new(access_token: impl Into<String>, timezone: Tz) -> Result<Self, InfraError> {
        let access_token = access_token.into();
        ensure_non_empty(&access_token, "access token")?;
        Ok(Self {
            client: Client::new(),
            access_token,
            timezone,
        })
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<String, InfraError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|error| InfraError::Transient(format!("network error while {action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Transient(format!("failed reading response while {action}: {error}")))?;

        if !status.is_success() {
            return Err(http_error(status, action, &body));
        }
        Ok(body)
    }

    fn decode_single(&self, body: &str, action: &str) -> Result<CalendarEvent, InfraError> {
        let parsed: GoogleCalendarEvent = serde_json::from_str(body).map_err(|error| {
            InfraError::Upstream(format!("invalid event payload while {action}: {error}"))
        })?;
        decode_event(&parsed, self.timezone)?
            .ok_or_else(|| InfraError::NotFound(format!("event cancelled while {action}")))
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct FreeBusyRequest<'a> {
    #[serde(rename = "timeMin")]
    time_min: String,
    #[serde(rename = "timeMax")]
    time_max: String,
    #[serde(rename = "timeZone")]
    time_zone: &'a str,
    items: Vec<FreeBusyItem<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, serde::Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<FreeBusySlot>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
struct FreeBusySlot {
    start: String,
    end: String,
}

#[async_trait]
impl WorkoutCalendar for GoogleWorkoutCalendar {
    async fn fetch_events_in_range(
        &self,
        calendar_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        ensure_non_empty(calendar_id, "calendar id")?;
        let endpoint = events_endpoint(calendar_id)?;
        let mut page_token: Option<String> = None;
        let mut events = Vec::new();

        loop {
            let mut request = self.client.get(endpoint.clone()).query(&[
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", "2500"),
                ("timeMin", start.to_rfc3339().as_str()),
                ("timeMax", end.to_rfc3339().as_str()),
                ("timeZone", self.timezone.name()),
            ]);
            if let Some(page_token) = page_token.as_deref() {
                request = request.query(&[("pageToken", page_token)]);
            }

            let body = self.send(request, "listing calendar events").await?;
            let mut parsed: EventsPageResponse = serde_json::from_str(&body).map_err(|error| {
                InfraError::Upstream(format!("invalid events list payload: {error}"))
            })?;

            for raw in parsed.items.take().unwrap_or_default() {
                if let Some(event) = decode_event(&raw, self.timezone)? {
                    events.push(event);
                }
            }

            match parsed.next_page_token.take() {
                Some(next_page_token) => page_token = Some(next_page_token),
                None => break,
            }
        }

        Ok(events)
    }

    async fn fetch_free_busy(
        &self,
        calendar_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Vec<Interval>, InfraError> {
        ensure_non_empty(calendar_id, "calendar id")?;
        let request = FreeBusyRequest {
            time_min: start.to_rfc3339(),
            time_max: end.to_rfc3339(),
            time_zone: self.timezone.name(),
            items: vec![FreeBusyItem { id: calendar_id }],
        };
        let body = self
            .send(self.client.post(FREE_BUSY_ENDPOINT).json(&request), "querying free/busy")
            .await?;
        let parsed: FreeBusyResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Upstream(format!("invalid free/busy payload: {error}"))
        })?;

        let calendar = parsed.calendars.get(calendar_id).ok_or_else(|| {
            InfraError::Upstream(format!("free/busy response did not include {calendar_id}"))
        })?;
        if !calendar.errors.is_empty() {
            return Err(InfraError::NotFound(format!(
                "free/busy unavailable for {calendar_id}"
            )));
        }

        let mut busy = Vec::with_capacity(calendar.busy.len());
        for slot in &calendar.busy {
            busy.push(Interval {
                start: parse_instant(&slot.start, self.timezone)?,
                end: parse_instant(&slot.end, self.timezone)?,
            });
        }
        Ok(merge_intervals(busy))
    }

    async fn fetch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>, InfraError> {
        ensure_non_empty(calendar_id, "calendar id")?;
        ensure_non_empty(event_id, "event id")?;
        let endpoint = event_endpoint(calendar_id, event_id)?;
        let body = match self.send(self.client.get(endpoint), "fetching event").await {
            Ok(body) => body,
            Err(InfraError::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error),
        };
        let parsed: GoogleCalendarEvent = serde_json::from_str(&body).map_err(|error| {
            InfraError::Upstream(format!("invalid event payload: {error}"))
        })?;
        decode_event(&parsed, self.timezone)
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, InfraError> {
        ensure_non_empty(calendar_id, "calendar id")?;
        let endpoint = events_endpoint(calendar_id)?;
        let payload = encode_draft(draft, self.timezone);
        let body = self
            .send(self.client.post(endpoint).json(&payload), "creating event")
            .await?;
        self.decode_single(&body, "creating event")
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, InfraError> {
        ensure_non_empty(calendar_id, "calendar id")?;
        ensure_non_empty(event_id, "event id")?;
        let endpoint = event_endpoint(calendar_id, event_id)?;
        let payload = encode_patch(patch, self.timezone);
        let body = self
            .send(self.client.patch(endpoint).json(&payload), "updating event")
            .await?;
        self.decode_single(&body, "updating event")
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), InfraError> {
        ensure_non_empty(calendar_id, "calendar id")?;
        ensure_non_empty(event_id, "event id")?;
        let endpoint = event_endpoint(calendar_id, event_id)?;
        self.send(self.client.delete(endpoint), "deleting event").await?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
    if value.trim().is_empty() {
        return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
    }
    Ok(())
}

fn http_error(status: StatusCode, action: &str, body: &str) -> InfraError {
    let message = if body.trim().is_empty() {
        format!("google calendar api error while {action}: http {}", status.as_u16())
    } else {
        format!(
            "google calendar api error while {action}: http {}; body={body}",
            status.as_u16()
        )
    };
    match status {
        StatusCode::UNAUTHORIZED => InfraError::Unauthenticated(message),
        StatusCode::NOT_FOUND | StatusCode::GONE => InfraError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => InfraError::Transient(message),
        status if status.is_server_error() => InfraError::Transient(message),
        _ => InfraError::Upstream(message),
    }
}

fn parse_instant(value: &str, timezone: Tz) -> Result<DateTime<Tz>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&timezone))
        .map_err(|error| InfraError::Upstream(format!("invalid free/busy instant '{value}': {error}")))
}

fn events_endpoint(calendar_id: &str) -> Result<Url, InfraError> {
    let mut url = Url::parse(CALENDAR_API_BASE)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid calendar api base url: {error}")))?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            InfraError::InvalidConfig("calendar api base URL cannot be a base".to_string())
        })?;
        segments.pop_if_empty();
        segments.push("calendars");
        segments.push(calendar_id);
        segments.push("events");
    }
    Ok(url)
}

fn event_endpoint(calendar_id: &str, event_id: &str) -> Result<Url, InfraError> {
    let mut url = events_endpoint(calendar_id)?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            InfraError::InvalidConfig("calendar events URL cannot be a base".to_string())
        })?;
        segments.push(event_id);
    }
    Ok(url)
}
