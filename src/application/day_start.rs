use crate::infrastructure::day_start_cache::DayStartCache;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

const ANCHOR_STEP_MINUTES: u32 = 5;
const MINUTES_PER_DAY: u32 = 24 * 60;

/// Anchor used when a day has none stored yet: local `now` pushed to the
/// next 5-minute mark and placed on `date`. Falls back to `fallback` local
/// time, then to 09:00 UTC.
pub fn default_day_start(
    date: NaiveDate,
    now: DateTime<Utc>,
    timezone: Tz,
    fallback: NaiveTime,
) -> DateTime<Utc> {
    let local_now = now.with_timezone(&timezone);
    let next_mark = (local_now.minute() / ANCHOR_STEP_MINUTES + 1) * ANCHOR_STEP_MINUTES;
    let total = local_now.hour() * 60 + next_mark;

    let rounded = (total < MINUTES_PER_DAY)
        .then(|| NaiveTime::from_hms_opt(total / 60, total % 60, 0))
        .flatten()
        .and_then(|time| local_instant(timezone, date, time));
    if let Some(start) = rounded {
        return start;
    }
    if let Some(start) = local_instant(timezone, date, fallback) {
        return start;
    }
    date.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN))
        .and_utc()
}

/// Stored anchor for `date`, or the computed default which is persisted so
/// later reads agree.
pub fn resolve_day_start(
    cache: &DayStartCache,
    date: NaiveDate,
    now: DateTime<Utc>,
    timezone: Tz,
    fallback: NaiveTime,
) -> Result<DateTime<Utc>, InfraError> {
    if let Some(start) = cache.get(date)? {
        return Ok(start);
    }
    let start = default_day_start(date, now, timezone, fallback);
    cache.set(date, start)?;
    Ok(start)
}

fn local_instant(timezone: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    timezone
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
