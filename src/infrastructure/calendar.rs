use crate::domain::models::{
    CalendarEvent, EventDraft, EventPatch, EventTiming, Interval,
};
use crate::domain::policy::intervals_overlap;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration as TokioDuration, sleep};

#[async_trait]
pub trait WorkoutCalendar: Send + Sync {
    async fn fetch_events_in_range(
        &self,
        calendar_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Vec<CalendarEvent>, InfraError>;

    async fn fetch_free_busy(
        &self,
        calendar_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Vec<Interval>, InfraError>;

    async fn fetch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>, InfraError>;

    async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, InfraError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, InfraError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug)]
pub struct InMemoryWorkoutCalendar {
    timezone: Tz,
    calendars: Mutex<HashMap<String, Vec<CalendarEvent>>>,
    next_sequence: AtomicU64,
}

impl InMemoryWorkoutCalendar {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            calendars: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn seed(&self, calendar_id: &str, event: CalendarEvent) -> Result<(), InfraError> {
        let mut calendars = self.lock()?;
        calendars.entry(calendar_id.to_string()).or_default().push(event);
        Ok(())
    }

    pub fn events(&self, calendar_id: &str) -> Result<Vec<CalendarEvent>, InfraError> {
        let calendars = self.lock()?;
        Ok(calendars.get(calendar_id).cloned().unwrap_or_default())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<CalendarEvent>>>, InfraError> {
        self.calendars
            .lock()
            .map_err(|error| InfraError::State(format!("calendar lock poisoned: {error}")))
    }

    fn next_event_id(&self) -> String {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        format!("evt-{sequence:06}")
    }
}

#[async_trait]
impl WorkoutCalendar for InMemoryWorkoutCalendar {
    async fn fetch_events_in_range(
        &self,
        calendar_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let window = Interval { start, end };
        let calendars = self.lock()?;
        let mut events = calendars
            .get(calendar_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| {
                        event
                            .span_in(self.timezone)
                            .is_some_and(|span| intervals_overlap(&span, &window))
                    })
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        events.sort_by_key(|event| event.span_in(self.timezone).map(|span| span.start));
        Ok(events)
    }

    async fn fetch_free_busy(
        &self,
        calendar_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Vec<Interval>, InfraError> {
        let events = self.fetch_events_in_range(calendar_id, start, end).await?;
        let busy = events
            .iter()
            .filter_map(|event| event.span_in(self.timezone))
            .map(|span| Interval {
                start: span.start.max(start),
                end: span.end.min(end),
            })
            .collect::<Vec<_>>();
        Ok(merge_intervals(busy))
    }

    async fn fetch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>, InfraError> {
        let calendars = self.lock()?;
        Ok(calendars
            .get(calendar_id)
            .and_then(|events| events.iter().find(|event| event.id == event_id))
            .cloned())
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, InfraError> {
        let event = CalendarEvent {
            id: self.next_event_id(),
            title: draft.title.clone(),
            description: Some(draft.description.clone()).filter(|value| !value.trim().is_empty()),
            timing: EventTiming::Timed {
                start: draft.start,
                end: draft.end,
            },
        };
        self.seed(calendar_id, event.clone())?;
        Ok(event)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, InfraError> {
        let mut calendars = self.lock()?;
        let event = calendars
            .get_mut(calendar_id)
            .and_then(|events| events.iter_mut().find(|event| event.id == event_id))
            .ok_or_else(|| InfraError::NotFound(format!("event {event_id} in {calendar_id}")))?;

        let timing = match event.timing {
            EventTiming::Timed { start, end } => {
                let start = patch.start.unwrap_or(start);
                let end = patch.end.unwrap_or(end);
                if end <= start {
                    return Err(InfraError::Upstream(format!(
                        "event {event_id}: end is not after start"
                    )));
                }
                EventTiming::Timed { start, end }
            }
            EventTiming::AllDay { .. } if patch.touches_interval() => {
                return Err(InfraError::Upstream(format!(
                    "event {event_id} is an all-day event and cannot be retimed"
                )));
            }
            timing => timing,
        };

        if let Some(title) = patch.title.as_ref() {
            event.title = title.clone();
        }
        if let Some(description) = patch.description.as_ref() {
            event.description = Some(description.clone());
        }
        event.timing = timing;
        Ok(event.clone())
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), InfraError> {
        let mut calendars = self.lock()?;
        let events = calendars
            .get_mut(calendar_id)
            .ok_or_else(|| InfraError::NotFound(format!("calendar {calendar_id}")))?;
        let before = events.len();
        events.retain(|event| event.id != event_id);
        if events.len() == before {
            return Err(InfraError::NotFound(format!("event {event_id} in {calendar_id}")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

/// Retries reads on transient failures with exponential backoff. Writes pass
/// straight through: a failed commit is reported, never replayed.
pub struct RetryingCalendar<C> {
    inner: C,
    retry_policy: RetryPolicy,
}

impl<C: WorkoutCalendar> RetryingCalendar<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, InfraError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, InfraError>> + Send,
        T: Send,
    {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(u32::from(attempt)));
                    tracing::warn!(operation, attempt = attempt + 1, delay_ms = delay, %error, "retrying calendar read");
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl<C: WorkoutCalendar> WorkoutCalendar for RetryingCalendar<C> {
    async fn fetch_events_in_range(
        &self,
        calendar_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        self.with_retry("fetch_events_in_range", || {
            self.inner.fetch_events_in_range(calendar_id, start, end)
        })
        .await
    }

    async fn fetch_free_busy(
        &self,
        calendar_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Vec<Interval>, InfraError> {
        self.with_retry("fetch_free_busy", || {
            self.inner.fetch_free_busy(calendar_id, start, end)
        })
        .await
    }

    async fn fetch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>, InfraError> {
        self.with_retry("fetch_event", || self.inner.fetch_event(calendar_id, event_id))
            .await
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, InfraError> {
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

pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|interval| interval.end > interval.start);
    intervals.sort_unstable_by(|left, right| left.start.cmp(&right.start));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}
