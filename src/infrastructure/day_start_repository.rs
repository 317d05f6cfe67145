use crate::domain::models::date_key;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_existing;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persisted anchor of each day's schedule.
pub trait DayStartRepository: Send + Sync {
    fn load(&self, date: NaiveDate) -> Result<Option<DateTime<Utc>>, InfraError>;
    fn save(&self, date: NaiveDate, start_at: DateTime<Utc>) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteDayStartRepository {
    db_path: PathBuf,
}

impl SqliteDayStartRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_existing(&self.db_path)
    }
}

impl DayStartRepository for SqliteDayStartRepository {
    fn load(&self, date: NaiveDate) -> Result<Option<DateTime<Utc>>, InfraError> {
        let connection = self.connect()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT start_at FROM day_start_times WHERE date = ?1",
                params![date_key(date)],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let parsed = DateTime::parse_from_rfc3339(&raw).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid day_start_times.start_at '{raw}': {error}"))
        })?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    fn save(&self, date: NaiveDate, start_at: DateTime<Utc>) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO day_start_times (date, start_at)
             VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET
               start_at = excluded.start_at",
            params![date_key(date), start_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDayStartRepository {
    starts: Mutex<HashMap<NaiveDate, DateTime<Utc>>>,
}

impl DayStartRepository for InMemoryDayStartRepository {
    fn load(&self, date: NaiveDate) -> Result<Option<DateTime<Utc>>, InfraError> {
        let starts = self
            .starts
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("day start lock poisoned: {error}")))?;
        Ok(starts.get(&date).copied())
    }

    fn save(&self, date: NaiveDate, start_at: DateTime<Utc>) -> Result<(), InfraError> {
        let mut starts = self
            .starts
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("day start lock poisoned: {error}")))?;
        starts.insert(date, start_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn exercise(repository: &dyn DayStartRepository) {
        let day = NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date");
        assert_eq!(repository.load(day).expect("load"), None);

        repository
            .save(day, fixed_time("2026-02-16T08:30:00Z"))
            .expect("save");
        repository
            .save(day, fixed_time("2026-02-16T09:15:00Z"))
            .expect("overwrite");
        assert_eq!(
            repository.load(day).expect("load"),
            Some(fixed_time("2026-02-16T09:15:00Z"))
        );
        assert_eq!(
            repository.load(day.succ_opt().expect("next day")).expect("load"),
            None
        );
    }

    #[test]
    fn in_memory_day_start_overwrites() {
        exercise(&InMemoryDayStartRepository::default());
    }

    #[test]
    fn sqlite_day_start_overwrites() {
        let dir = std::env::temp_dir().join(format!(
            "dayplanner-day-start-tests-{}-{}",
            std::process::id(),
            NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("planner.sqlite");
        initialize_database(&path).expect("initialize database");

        exercise(&SqliteDayStartRepository::new(&path));
        let _ = fs::remove_dir_all(&dir);
    }
}
