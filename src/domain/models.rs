use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    NotStarted,
    InProgress,
    Completed,
}

/// A unit of work scheduled on one calendar day.
///
/// Root tasks have no `parent_id`; sub-tasks point at their root. The
/// `current_*` fields are rewritten by every propagation pass, the
/// `initial_*` fields are written once and then frozen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub detail: Option<String>,
    pub date: NaiveDate,
    pub parent_id: Option<String>,
    pub order_index: u32,
    pub is_completed: bool,
    pub manual_duration: u32,
    pub current_start_time: Option<DateTime<Utc>>,
    pub current_end_time: Option<DateTime<Utc>>,
    pub initial_start_time: Option<DateTime<Utc>>,
    pub initial_end_time: Option<DateTime<Utc>>,
    pub initial_planned_duration: Option<u32>,
    pub fixed_start_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub actual_duration: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        date: NaiveDate,
        manual_duration: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            detail: None,
            date,
            parent_id: None,
            order_index: 0,
            is_completed: false,
            manual_duration,
            current_start_time: None,
            current_end_time: None,
            initial_start_time: None,
            initial_end_time: None,
            initial_planned_duration: None,
            fixed_start_time: None,
            actual_start_time: None,
            actual_end_time: None,
            actual_duration: None,
            created_at,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn has_initial_snapshot(&self) -> bool {
        self.initial_start_time.is_some() && self.initial_end_time.is_some()
    }

    /// In-progress is derived: started but not yet finished.
    pub fn phase(&self) -> TaskPhase {
        if self.actual_start_time.is_some() && self.actual_end_time.is_none() {
            TaskPhase::InProgress
        } else if self.is_completed {
            TaskPhase::Completed
        } else {
            TaskPhase::NotStarted
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err("task.parent_id must not reference the task itself".to_string());
        }
        if let Some(parent_id) = self.parent_id.as_deref() {
            validate_non_empty(parent_id, "task.parent_id")?;
        }
        if let (Some(start), Some(end)) = (self.actual_start_time, self.actual_end_time) {
            if end < start {
                return Err("task.actual_end_time must be >= task.actual_start_time".to_string());
            }
        }
        if self.initial_start_time.is_some() != self.initial_end_time.is_some() {
            return Err("task.initial_start_time and task.initial_end_time must be set together"
                .to_string());
        }
        Ok(())
    }
}

/// Whole minutes between two instants, rounded to the nearest minute and
/// clamped at zero.
pub fn rounded_minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let seconds = (end - start).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    u32::try_from((seconds + 30) / 60).unwrap_or(u32::MAX)
}

/// Whole minutes between two instants, truncated and clamped at zero.
pub fn whole_minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let minutes = (end - start).num_minutes();
    u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
}

pub fn parse_date(value: &str, field_name: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
