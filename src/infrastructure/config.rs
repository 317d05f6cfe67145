use crate::domain::stats::AccuracyTarget;
use crate::infrastructure::error::InfraError;
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const PLANNER_JSON: &str = "planner.json";

const DEFAULT_DURATION_STEP_MINUTES: u32 = 5;
const DEFAULT_MAX_NESTING_DEPTH: usize = 1;
const DEFAULT_ACCURACY_WINDOW_DAYS: u32 = 3;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub planner: serde_json::Value,
}

/// Engine tunables read from `planner.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub duration_step_minutes: u32,
    pub fallback_day_start: NaiveTime,
    pub max_nesting_depth: usize,
    pub accuracy_window_days: u32,
    pub accuracy_target: AccuracyTarget,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            duration_step_minutes: DEFAULT_DURATION_STEP_MINUTES,
            fallback_day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            accuracy_window_days: DEFAULT_ACCURACY_WINDOW_DAYS,
            accuracy_target: AccuracyTarget::default(),
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Day Planner",
                "timezone": "UTC"
            }),
        ),
        (
            PLANNER_JSON,
            serde_json::json!({
                "schema": 1,
                "durationStepMinutes": DEFAULT_DURATION_STEP_MINUTES,
                "fallbackDayStart": "09:00",
                "maxNestingDepth": DEFAULT_MAX_NESTING_DEPTH,
                "accuracyWindowDays": DEFAULT_ACCURACY_WINDOW_DAYS,
                "accuracyTarget": {
                    "low": 80,
                    "high": 120
                }
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
        planner: read_config(&config_dir.join(PLANNER_JSON))?,
    })
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

/// Configured IANA timezone, UTC when missing or unknown.
pub fn resolve_timezone(config_dir: &Path) -> Tz {
    read_timezone(config_dir)
        .ok()
        .flatten()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

/// Lenient read: each bad or missing value keeps its default.
pub fn load_planner_settings(config_dir: &Path) -> PlannerSettings {
    let mut settings = PlannerSettings::default();
    let Ok(parsed) = read_config(&config_dir.join(PLANNER_JSON)) else {
        return settings;
    };

    if let Some(value) = parsed
        .get("durationStepMinutes")
        .and_then(serde_json::Value::as_u64)
    {
        settings.duration_step_minutes = value.clamp(1, 60) as u32;
    }
    if let Some(start) = parsed
        .get("fallbackDayStart")
        .and_then(serde_json::Value::as_str)
    {
        if let Ok(parsed_start) = NaiveTime::parse_from_str(start.trim(), "%H:%M") {
            settings.fallback_day_start = parsed_start;
        }
    }
    if let Some(value) = parsed
        .get("maxNestingDepth")
        .and_then(serde_json::Value::as_u64)
    {
        settings.max_nesting_depth = value.max(1) as usize;
    }
    if let Some(value) = parsed
        .get("accuracyWindowDays")
        .and_then(serde_json::Value::as_u64)
    {
        settings.accuracy_window_days = value.clamp(1, 366) as u32;
    }
    if let Some(target) = parsed.get("accuracyTarget") {
        let low = target.get("low").and_then(serde_json::Value::as_f64);
        let high = target.get("high").and_then(serde_json::Value::as_f64);
        if let (Some(low), Some(high)) = (low, high) {
            if low <= high {
                settings.accuracy_target = AccuracyTarget { low, high };
            }
        }
    }

    settings
}
