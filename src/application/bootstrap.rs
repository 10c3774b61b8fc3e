use crate::domain::policy::SchedulePolicy;
use crate::infrastructure::config::{
    CalendarRefs, ensure_default_configs, load_configs, load_schedule_policy, read_calendar_refs,
    read_timezone,
};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PlannerWorkspace {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub timezone: Tz,
    pub policy: SchedulePolicy,
    pub calendars: CalendarRefs,
}

pub fn open_workspace(workspace_root: &Path) -> Result<PlannerWorkspace, InfraError> {
    let config_dir = workspace_root.join("config");
    let logs_dir = workspace_root.join("logs");
    for dir in [&config_dir, &logs_dir] {
        fs::create_dir_all(dir)?;
    }

    ensure_default_configs(&config_dir)?;
    load_configs(&config_dir)?;
    let timezone = read_timezone(&config_dir)?;
    let policy = load_schedule_policy(&config_dir, timezone)?;
    let calendars = read_calendar_refs(&config_dir)?;

    Ok(PlannerWorkspace {
        root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        timezone,
        policy,
        calendars,
    })
}
