use crate::domain::error::DomainError;
use crate::domain::models::{date_key, Task};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_existing;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const TASK_COLUMNS: &str = "id, title, detail, date, parent_id, order_index, is_completed, \
     manual_duration, current_start_time, current_end_time, initial_start_time, \
     initial_end_time, initial_planned_duration, fixed_start_time, actual_start_time, \
     actual_end_time, actual_duration, created_at";

/// Writes applied together, in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub upserts: Vec<Task>,
    pub deletions: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }

    fn validate(&self) -> Result<(), InfraError> {
        for task in &self.upserts {
            task.validate()
                .map_err(|message| InfraError::Domain(DomainError::InvalidTask(message)))?;
        }
        Ok(())
    }
}

pub trait TaskRepository: Send + Sync {
    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError>;
    /// Every task of the day, roots and sub-tasks.
    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Task>, InfraError>;
    fn list_roots(&self, date: NaiveDate) -> Result<Vec<Task>, InfraError>;
    fn list_children(&self, parent_id: &str) -> Result<Vec<Task>, InfraError>;
    fn list_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Task>, InfraError>;
    fn commit(&self, changes: &ChangeSet) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_existing(&self.db_path)
    }

    fn query_tasks(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(sql)?;
        let rows = statement
            .query_map(params, TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Task>, InfraError> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE date = ?1
                 ORDER BY order_index ASC, created_at ASC, id ASC"
            ),
            params![date_key(date)],
        )
    }

    fn list_roots(&self, date: NaiveDate) -> Result<Vec<Task>, InfraError> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE date = ?1 AND parent_id IS NULL
                 ORDER BY order_index ASC, created_at ASC, id ASC"
            ),
            params![date_key(date)],
        )
    }

    fn list_children(&self, parent_id: &str) -> Result<Vec<Task>, InfraError> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_id = ?1
                 ORDER BY order_index ASC, created_at ASC, id ASC"
            ),
            params![parent_id],
        )
    }

    fn list_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Task>, InfraError> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE date >= ?1 AND date <= ?2
                 ORDER BY date ASC, order_index ASC, created_at ASC, id ASC"
            ),
            params![date_key(start), date_key(end)],
        )
    }

    fn commit(&self, changes: &ChangeSet) -> Result<(), InfraError> {
        changes.validate()?;
        if changes.is_empty() {
            return Ok(());
        }

        let mut connection = self.connect()?;
        let tx = connection.transaction()?;
        for task_id in &changes.deletions {
            tx.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        }
        for task in &changes.upserts {
            tx.execute(
                &format!(
                    "INSERT INTO tasks ({TASK_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                     ON CONFLICT(id) DO UPDATE SET
                       title = excluded.title,
                       detail = excluded.detail,
                       date = excluded.date,
                       parent_id = excluded.parent_id,
                       order_index = excluded.order_index,
                       is_completed = excluded.is_completed,
                       manual_duration = excluded.manual_duration,
                       current_start_time = excluded.current_start_time,
                       current_end_time = excluded.current_end_time,
                       initial_start_time = excluded.initial_start_time,
                       initial_end_time = excluded.initial_end_time,
                       initial_planned_duration = excluded.initial_planned_duration,
                       fixed_start_time = excluded.fixed_start_time,
                       actual_start_time = excluded.actual_start_time,
                       actual_end_time = excluded.actual_end_time,
                       actual_duration = excluded.actual_duration"
                ),
                params![
                    task.id,
                    task.title,
                    task.detail,
                    date_key(task.date),
                    task.parent_id,
                    task.order_index,
                    task.is_completed,
                    task.manual_duration,
                    task.current_start_time.map(|value| value.to_rfc3339()),
                    task.current_end_time.map(|value| value.to_rfc3339()),
                    task.initial_start_time.map(|value| value.to_rfc3339()),
                    task.initial_end_time.map(|value| value.to_rfc3339()),
                    task.initial_planned_duration,
                    task.fixed_start_time.map(|value| value.to_rfc3339()),
                    task.actual_start_time.map(|value| value.to_rfc3339()),
                    task.actual_end_time.map(|value| value.to_rfc3339()),
                    task.actual_duration,
                    task.created_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

struct TaskRow {
    id: String,
    title: String,
    detail: Option<String>,
    date: String,
    parent_id: Option<String>,
    order_index: u32,
    is_completed: bool,
    manual_duration: u32,
    current_start_time: Option<String>,
    current_end_time: Option<String>,
    initial_start_time: Option<String>,
    initial_end_time: Option<String>,
    initial_planned_duration: Option<u32>,
    fixed_start_time: Option<String>,
    actual_start_time: Option<String>,
    actual_end_time: Option<String>,
    actual_duration: Option<u32>,
    created_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            detail: row.get(2)?,
            date: row.get(3)?,
            parent_id: row.get(4)?,
            order_index: row.get(5)?,
            is_completed: row.get(6)?,
            manual_duration: row.get(7)?,
            current_start_time: row.get(8)?,
            current_end_time: row.get(9)?,
            initial_start_time: row.get(10)?,
            initial_end_time: row.get(11)?,
            initial_planned_duration: row.get(12)?,
            fixed_start_time: row.get(13)?,
            actual_start_time: row.get(14)?,
            actual_end_time: row.get(15)?,
            actual_duration: row.get(16)?,
            created_at: row.get(17)?,
        })
    }

    fn into_task(self) -> Result<Task, InfraError> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|error| {
            InfraError::InvalidConfig(format!("invalid tasks.date '{}': {error}", self.date))
        })?;
        Ok(Task {
            date,
            current_start_time: parse_optional_time(self.current_start_time, "current_start_time")?,
            current_end_time: parse_optional_time(self.current_end_time, "current_end_time")?,
            initial_start_time: parse_optional_time(self.initial_start_time, "initial_start_time")?,
            initial_end_time: parse_optional_time(self.initial_end_time, "initial_end_time")?,
            fixed_start_time: parse_optional_time(self.fixed_start_time, "fixed_start_time")?,
            actual_start_time: parse_optional_time(self.actual_start_time, "actual_start_time")?,
            actual_end_time: parse_optional_time(self.actual_end_time, "actual_end_time")?,
            created_at: parse_time(&self.created_at, "created_at")?,
            id: self.id,
            title: self.title,
            detail: self.detail,
            parent_id: self.parent_id,
            order_index: self.order_index,
            is_completed: self.is_completed,
            manual_duration: self.manual_duration,
            initial_planned_duration: self.initial_planned_duration,
            actual_duration: self.actual_duration,
        })
    }
}

fn parse_time(raw: &str, column: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid tasks.{column} '{raw}': {error}")))
}

fn parse_optional_time(raw: Option<String>, column: &str) -> Result<Option<DateTime<Utc>>, InfraError> {
    raw.as_deref().map(|raw| parse_time(raw, column)).transpose()
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Task>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task store lock poisoned: {error}")))
    }

    fn sorted(mut tasks: Vec<Task>) -> Vec<Task> {
        tasks.sort_by(|left, right| {
            left.date
                .cmp(&right.date)
                .then_with(|| left.order_index.cmp(&right.order_index))
                .then_with(|| left.created_at.cmp(&right.created_at))
                .then_with(|| left.id.cmp(&right.id))
        });
        tasks
    }

    fn filtered(&self, predicate: impl Fn(&Task) -> bool) -> Result<Vec<Task>, InfraError> {
        let tasks = self.lock()?;
        Ok(Self::sorted(
            tasks.values().filter(|task| predicate(task)).cloned().collect(),
        ))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        Ok(self.lock()?.get(task_id).cloned())
    }

    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Task>, InfraError> {
        self.filtered(|task| task.date == date)
    }

    fn list_roots(&self, date: NaiveDate) -> Result<Vec<Task>, InfraError> {
        self.filtered(|task| task.date == date && task.parent_id.is_none())
    }

    fn list_children(&self, parent_id: &str) -> Result<Vec<Task>, InfraError> {
        self.filtered(|task| task.parent_id.as_deref() == Some(parent_id))
    }

    fn list_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Task>, InfraError> {
        self.filtered(|task| task.date >= start && task.date <= end)
    }

    fn commit(&self, changes: &ChangeSet) -> Result<(), InfraError> {
        changes.validate()?;
        let mut tasks = self.lock()?;
        let mut pending = changes.deletions.clone();
        while let Some(task_id) = pending.pop() {
            if tasks.remove(&task_id).is_none() {
                continue;
            }
            pending.extend(
                tasks
                    .values()
                    .filter(|task| task.parent_id.as_deref() == Some(task_id.as_str()))
                    .map(|task| task.id.clone()),
            );
        }
        for task in &changes.upserts {
            tasks.insert(task.id.clone(), task.clone());
        }
        Ok(())
    }
}
