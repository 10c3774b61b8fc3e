use crate::domain::policy::SchedulePolicy;
use crate::infrastructure::error::InfraError;
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const POLICIES_JSON: &str = "policies.json";
const DEFAULT_PRIMARY_CALENDAR_ID: &str = "primary";
const DEFAULT_WORKOUTS_CALENDAR_ID: &str = "workouts";

pub const ACCESS_TOKEN_ENV_KEYS: [&str; 2] =
    ["WORKOUT_PLANNER_GOOGLE_ACCESS_TOKEN", "GOOGLE_ACCESS_TOKEN"];

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub policies: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarRefs {
    pub primary_calendar_id: String,
    pub workouts_calendar_id: String,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "timezone": "UTC",
                "primaryCalendarId": DEFAULT_PRIMARY_CALENDAR_ID,
                "workoutsCalendarId": DEFAULT_WORKOUTS_CALENDAR_ID
            }),
        ),
        (
            POLICIES_JSON,
            serde_json::json!({
                "schema": 1,
                "allowedHours": {
                    "morningStart": "06:30",
                    "morningEnd": "09:30",
                    "eveningStart": "18:00",
                    "preferredMorningStart": "07:00"
                },
                "minGapMinutes": 30,
                "longWorkoutMinutes": 180,
                "longWeekendEarliestStart": "05:00",
                "rescheduleAttempts": 14,
                "batchRounds": 3,
                "extendedDescription": false
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        policies: read_config(&config_dir.join(POLICIES_JSON))?,
    })
}

/// The configured IANA timezone. It is never inferred from the host.
pub fn read_timezone(config_dir: &Path) -> Result<Tz, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let name = string_field(&app, "timezone").ok_or_else(|| {
        InfraError::InvalidConfig(format!("timezone is required in {APP_JSON}"))
    })?;
    name.parse::<Tz>()
        .map_err(|_| InfraError::InvalidConfig(format!("unknown timezone '{name}' in {APP_JSON}")))
}

pub fn read_calendar_refs(config_dir: &Path) -> Result<CalendarRefs, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(CalendarRefs {
        primary_calendar_id: string_field(&app, "primaryCalendarId")
            .unwrap_or(DEFAULT_PRIMARY_CALENDAR_ID)
            .to_string(),
        workouts_calendar_id: string_field(&app, "workoutsCalendarId")
            .unwrap_or(DEFAULT_WORKOUTS_CALENDAR_ID)
            .to_string(),
    })
}

pub fn load_schedule_policy(config_dir: &Path, timezone: Tz) -> Result<SchedulePolicy, InfraError> {
    let policies = read_config(&config_dir.join(POLICIES_JSON))?;
    let defaults = SchedulePolicy::with_timezone(timezone);
    let hours = policies.get("allowedHours");
    let hours_time = |key: &str, fallback: NaiveTime| {
        hours
            .and_then(|value| string_field(value, key))
            .and_then(parse_clock)
            .unwrap_or(fallback)
    };

    let policy = SchedulePolicy {
        timezone,
        morning_start: hours_time("morningStart", defaults.morning_start),
        morning_end: hours_time("morningEnd", defaults.morning_end),
        evening_start: hours_time("eveningStart", defaults.evening_start),
        preferred_morning_start: hours_time("preferredMorningStart", defaults.preferred_morning_start),
        long_weekend_earliest_start: string_field(&policies, "longWeekendEarliestStart")
            .and_then(parse_clock)
            .unwrap_or(defaults.long_weekend_earliest_start),
        min_gap_minutes: policies
            .get("minGapMinutes")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(defaults.min_gap_minutes),
        long_workout_minutes: policies
            .get("longWorkoutMinutes")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(defaults.long_workout_minutes),
        reschedule_attempts: policies
            .get("rescheduleAttempts")
            .and_then(serde_json::Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(defaults.reschedule_attempts),
        batch_rounds: policies
            .get("batchRounds")
            .and_then(serde_json::Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(defaults.batch_rounds),
        extended_description: policies
            .get("extendedDescription")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(defaults.extended_description),
    };
    policy.validate().map_err(InfraError::InvalidConfig)?;
    Ok(policy)
}

pub fn load_access_token_from_lookup<F>(lookup: F) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    ACCESS_TOKEN_ENV_KEYS
        .iter()
        .find_map(|key| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
        .ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "missing calendar access token; set {}",
                ACCESS_TOKEN_ENV_KEYS.join(" or ")
            ))
        })
}

fn string_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}
