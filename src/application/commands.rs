use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::day_start::resolve_day_start;
use crate::application::notifier::RefreshNotifier;
use crate::domain::duration::{effective_duration, round_down_to_step};
use crate::domain::error::DomainError;
use crate::domain::forest::TaskForest;
use crate::domain::models::{date_key, parse_date, Task, TaskPhase};
use crate::domain::ordering;
use crate::domain::schedule::{capture_initial_schedule, propagate, sibling_gaps, Gap};
use crate::domain::stats::{load_level, summarize, StatisticsSummary};
use crate::domain::tracking;
use crate::infrastructure::config::{load_planner_settings, resolve_timezone, PlannerSettings};
use crate::infrastructure::day_start_cache::DayStartCache;
use crate::infrastructure::day_start_repository::{DayStartRepository, SqliteDayStartRepository};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::{ChangeSet, SqliteTaskRepository, TaskRepository};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const MAX_STATISTICS_DAYS: i64 = 366;

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    tasks: Arc<dyn TaskRepository>,
    day_starts: DayStartCache,
    settings: PlannerSettings,
    timezone: Tz,
    notifier: RefreshNotifier,
    clock: Clock,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let tasks = Arc::new(SqliteTaskRepository::new(&bootstrap.database_path));
        let day_starts = Arc::new(SqliteDayStartRepository::new(&bootstrap.database_path));
        Ok(Self::assemble(bootstrap, tasks, day_starts))
    }

    /// Same workspace layout, caller-provided stores.
    pub fn with_repositories(
        workspace_root: PathBuf,
        tasks: Arc<dyn TaskRepository>,
        day_starts: Arc<dyn DayStartRepository>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self::assemble(bootstrap, tasks, day_starts))
    }

    fn assemble(
        bootstrap: BootstrapResult,
        tasks: Arc<dyn TaskRepository>,
        day_starts: Arc<dyn DayStartRepository>,
    ) -> Self {
        let settings = load_planner_settings(&bootstrap.config_dir);
        let timezone = resolve_timezone(&bootstrap.config_dir);
        Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            tasks,
            day_starts: DayStartCache::new(day_starts),
            settings,
            timezone,
            notifier: RefreshNotifier::new(),
            clock: Arc::new(Utc::now),
            log_guard: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.notifier.revision()
    }

    fn day_start(&self, date: NaiveDate) -> Result<DateTime<Utc>, InfraError> {
        resolve_day_start(
            &self.day_starts,
            date,
            self.now(),
            self.timezone,
            self.settings.fallback_day_start,
        )
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTaskInput {
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub fixed_start_time: Option<String>,
}

impl NewTaskInput {
    pub fn new(title: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            title: title.into(),
            duration_minutes,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledTask {
    #[serde(flatten)]
    pub task: Task,
    pub effective_duration: u32,
    pub phase: TaskPhase,
    pub active_task_id: Option<String>,
    pub current_sub_task_id: Option<String>,
    pub children: Vec<ScheduledTask>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub day_start: DateTime<Utc>,
    pub load_level: u8,
    pub total_minutes: u32,
    pub active_task_id: Option<String>,
    pub gaps: Vec<Gap>,
    pub tasks: Vec<ScheduledTask>,
    pub revision: u64,
}

/// One day's tasks loaded for a single command, plus what was read so the
/// commit only writes rows that changed.
struct DayPlan {
    date: NaiveDate,
    forest: TaskForest,
    loaded: HashMap<String, Task>,
}

impl DayPlan {
    fn load(state: &AppState, date: NaiveDate) -> Result<Self, InfraError> {
        let tasks = state.tasks.list_by_date(date)?;
        let loaded = tasks
            .iter()
            .map(|task| (task.id.clone(), task.clone()))
            .collect();
        Ok(Self {
            date,
            forest: TaskForest::from_tasks(tasks),
            loaded,
        })
    }

    fn load_for_task(state: &AppState, task_id: &str) -> Result<Self, InfraError> {
        let task = state
            .tasks
            .get(task_id)?
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        Self::load(state, task.date)
    }

    fn changes(&self) -> ChangeSet {
        let mut upserts = self
            .forest
            .tasks()
            .filter(|task| self.loaded.get(&task.id) != Some(*task))
            .cloned()
            .collect::<Vec<_>>();
        upserts.sort_by(|left, right| left.id.cmp(&right.id));

        let mut deletions = self
            .loaded
            .keys()
            .filter(|task_id| !self.forest.contains(task_id))
            .cloned()
            .collect::<Vec<_>>();
        deletions.sort();

        ChangeSet { upserts, deletions }
    }
}

/// Re-propagates the plan from the day's anchor, freezes the snapshot of
/// `captured` tasks and commits every changed row in one transaction.
/// Returns whether anything was written.
fn commit_plan(state: &AppState, plan: &mut DayPlan, captured: &[String]) -> Result<bool, InfraError> {
    let anchor = state.day_start(plan.date)?;
    propagate(&mut plan.forest, anchor);
    for task_id in captured {
        capture_initial_schedule(&mut plan.forest, task_id);
    }

    let changes = plan.changes();
    if changes.is_empty() {
        return Ok(false);
    }
    state.tasks.commit(&changes)?;
    state.notifier.bump();
    Ok(true)
}

pub fn add_task_impl(
    state: &AppState,
    date: String,
    parent_id: Option<String>,
    input: NewTaskInput,
) -> Result<Task, InfraError> {
    let date = parse_date_input(&date)?;
    let parent_id = normalized(parent_id);
    let mut plan = DayPlan::load(state, date)?;

    let task_id = next_id("tsk");
    if let Some(parent_id) = parent_id.as_deref() {
        check_parent(state, &plan, &task_id, parent_id)?;
    }
    let order_index = plan.forest.next_order_index(parent_id.as_deref());
    let task = build_task(state, task_id.clone(), input, date, parent_id, order_index)?;
    plan.forest.insert(task);

    commit_plan(state, &mut plan, std::slice::from_ref(&task_id))?;
    let created = plan.forest.require(&task_id)?.clone();

    state.log_info(
        "add_task",
        &format!("added task_id={task_id} date={}", date_key(date)),
    );
    Ok(created)
}

/// Adds a root task together with its sub-tasks; returns the parent first,
/// then the children in order.
pub fn add_task_with_subtasks_impl(
    state: &AppState,
    date: String,
    parent: NewTaskInput,
    children: Vec<NewTaskInput>,
) -> Result<Vec<Task>, InfraError> {
    let date = parse_date_input(&date)?;
    let mut plan = DayPlan::load(state, date)?;

    let parent_id = next_id("tsk");
    let order_index = plan.forest.next_order_index(None);
    let parent_task = build_task(state, parent_id.clone(), parent, date, None, order_index)?;

    let mut child_ids = Vec::with_capacity(children.len());
    let mut child_tasks = Vec::with_capacity(children.len());
    for (position, input) in children.into_iter().enumerate() {
        let child_id = next_id("tsk");
        let child = build_task(
            state,
            child_id.clone(),
            input,
            date,
            Some(parent_id.clone()),
            position as u32,
        )?;
        child_ids.push(child_id);
        child_tasks.push(child);
    }

    plan.forest.insert(parent_task);
    for child in child_tasks {
        plan.forest.insert(child);
    }
    commit_plan(state, &mut plan, std::slice::from_ref(&parent_id))?;

    let mut created = vec![plan.forest.require(&parent_id)?.clone()];
    for child_id in &child_ids {
        created.push(plan.forest.require(child_id)?.clone());
    }

    state.log_info(
        "add_task_with_subtasks",
        &format!(
            "added task_id={parent_id} with {} sub-tasks date={}",
            child_ids.len(),
            date_key(date)
        ),
    );
    Ok(created)
}

pub fn reorder_tasks_impl(
    state: &AppState,
    date: String,
    parent_id: Option<String>,
    ordered_ids: Vec<String>,
) -> Result<(), InfraError> {
    let date = parse_date_input(&date)?;
    let parent_id = normalized(parent_id);
    let mut plan = DayPlan::load(state, date)?;

    ordering::reorder(&mut plan.forest, parent_id.as_deref(), &ordered_ids)?;
    commit_plan(state, &mut plan, &[])?;

    state.log_info(
        "reorder_tasks",
        &format!(
            "reordered {} tasks parent_id={} date={}",
            ordered_ids.len(),
            parent_id.as_deref().unwrap_or("-"),
            date_key(date)
        ),
    );
    Ok(())
}

pub fn move_task_up_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let mut plan = DayPlan::load_for_task(state, task_id)?;
    let moved = ordering::move_up(&mut plan.forest, task_id)?;
    if moved {
        commit_plan(state, &mut plan, &[])?;
        state.log_info("move_task_up", &format!("moved task_id={task_id}"));
    }
    Ok(moved)
}

pub fn move_task_down_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let mut plan = DayPlan::load_for_task(state, task_id)?;
    let moved = ordering::move_down(&mut plan.forest, task_id)?;
    if moved {
        commit_plan(state, &mut plan, &[])?;
        state.log_info("move_task_down", &format!("moved task_id={task_id}"));
    }
    Ok(moved)
}

/// Drag move to the final 0-based `destination` within the sibling group.
pub fn move_task_impl(state: &AppState, task_id: String, destination: usize) -> Result<bool, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let mut plan = DayPlan::load_for_task(state, task_id)?;
    let moved = ordering::move_to(&mut plan.forest, task_id, destination)?;
    commit_plan(state, &mut plan, &[])?;
    if moved {
        state.log_info(
            "move_task",
            &format!("moved task_id={task_id} destination={destination}"),
        );
    }
    Ok(moved)
}

pub fn update_task_duration_impl(
    state: &AppState,
    task_id: String,
    minutes: u32,
) -> Result<Task, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let mut plan = DayPlan::load_for_task(state, task_id)?;
    if plan.forest.has_children(task_id) {
        return Err(DomainError::ContainerDurationLocked {
            task_id: task_id.to_string(),
        }
        .into());
    }

    let rounded = round_down_to_step(minutes, state.settings.duration_step_minutes);
    plan.forest.require_mut(task_id)?.manual_duration = rounded;
    commit_plan(state, &mut plan, &[])?;

    state.log_info(
        "update_task_duration",
        &format!("updated task_id={task_id} requested={minutes} stored={rounded}"),
    );
    Ok(plan.forest.require(task_id)?.clone())
}

pub fn set_fixed_start_time_impl(
    state: &AppState,
    task_id: String,
    fixed_start_time: Option<String>,
) -> Result<Task, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let fixed_start_time = normalized(fixed_start_time)
        .map(|value| parse_rfc3339_input(&value, "fixed_start_time"))
        .transpose()?;
    let mut plan = DayPlan::load_for_task(state, task_id)?;

    plan.forest.require_mut(task_id)?.fixed_start_time = fixed_start_time;
    commit_plan(state, &mut plan, &[])?;

    state.log_info(
        "set_fixed_start_time",
        &format!(
            "task_id={task_id} fixed_start_time={}",
            fixed_start_time
                .map(|value| value.to_rfc3339())
                .unwrap_or_else(|| "none".to_string())
        ),
    );
    Ok(plan.forest.require(task_id)?.clone())
}

/// Moves a task under `new_parent_id` (or to root level), appending it to
/// the end of the new sibling group.
pub fn reparent_task_impl(
    state: &AppState,
    task_id: String,
    new_parent_id: Option<String>,
) -> Result<Task, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let new_parent_id = normalized(new_parent_id);
    let mut plan = DayPlan::load_for_task(state, task_id)?;

    let old_parent_id = plan.forest.require(task_id)?.parent_id.clone();
    if old_parent_id == new_parent_id {
        return Ok(plan.forest.require(task_id)?.clone());
    }
    if let Some(parent_id) = new_parent_id.as_deref() {
        check_parent(state, &plan, task_id, parent_id)?;
        let target_depth = plan.forest.depth(parent_id) + 1;
        if is_within_subtree(&plan.forest, parent_id, task_id)
            || target_depth + subtree_height(&plan.forest, task_id) > state.settings.max_nesting_depth
        {
            return Err(DomainError::InvalidParent {
                task_id: task_id.to_string(),
                parent_id: parent_id.to_string(),
            }
            .into());
        }
    }

    let order_index = plan.forest.next_order_index(new_parent_id.as_deref());
    plan.forest.set_parent(task_id, new_parent_id.clone())?;
    plan.forest.require_mut(task_id)?.order_index = order_index;
    for group in [old_parent_id.as_deref(), new_parent_id.as_deref()] {
        let siblings = plan.forest.siblings(group);
        ordering::renumber(&mut plan.forest, &siblings);
    }
    commit_plan(state, &mut plan, &[])?;

    state.log_info(
        "reparent_task",
        &format!(
            "moved task_id={task_id} parent_id={}",
            new_parent_id.as_deref().unwrap_or("-")
        ),
    );
    Ok(plan.forest.require(task_id)?.clone())
}

/// Deletes a task and its descendants. Returns `false` when it did not exist.
pub fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let Some(task) = state.tasks.get(task_id)? else {
        return Ok(false);
    };
    let mut plan = DayPlan::load(state, task.date)?;

    let removed = plan.forest.remove_subtree(task_id);
    let survivors = plan.forest.siblings(task.parent_id.as_deref());
    ordering::renumber(&mut plan.forest, &survivors);
    commit_plan(state, &mut plan, &[])?;

    state.log_info(
        "delete_task",
        &format!("deleted task_id={task_id} removed={}", removed.len()),
    );
    Ok(true)
}

pub fn start_task_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    tracked_update(state, "start_task", &task_id, |forest, task_id, now| {
        tracking::start(forest, task_id, now)
    })
}

pub fn finish_task_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    tracked_update(state, "finish_task", &task_id, |forest, task_id, now| {
        tracking::finish(forest, task_id, now)
    })
}

pub fn complete_task_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    tracked_update(state, "complete_task", &task_id, |forest, task_id, _| {
        tracking::complete(forest, task_id)
    })
}

pub fn uncomplete_task_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    tracked_update(state, "uncomplete_task", &task_id, |forest, task_id, _| {
        tracking::uncomplete(forest, task_id)
    })
}

pub fn edit_actual_times_impl(
    state: &AppState,
    task_id: String,
    actual_start: Option<String>,
    actual_end: Option<String>,
) -> Result<Task, InfraError> {
    let actual_start = normalized(actual_start)
        .map(|value| parse_rfc3339_input(&value, "actual_start"))
        .transpose()?;
    let actual_end = normalized(actual_end)
        .map(|value| parse_rfc3339_input(&value, "actual_end"))
        .transpose()?;
    tracked_update(state, "edit_actual_times", &task_id, |forest, task_id, _| {
        tracking::edit_actual_times(forest, task_id, actual_start, actual_end)
    })
}

fn tracked_update(
    state: &AppState,
    command: &str,
    task_id: &str,
    apply: impl FnOnce(&mut TaskForest, &str, DateTime<Utc>) -> Result<(), DomainError>,
) -> Result<Task, InfraError> {
    let task_id = required_id(task_id, "task_id")?;
    let mut plan = DayPlan::load_for_task(state, task_id)?;
    apply(&mut plan.forest, task_id, state.now())?;
    commit_plan(state, &mut plan, &[])?;

    let task = plan.forest.require(task_id)?.clone();
    state.log_info(
        command,
        &format!(
            "task_id={task_id} completed={} actual_duration={}",
            task.is_completed,
            task.actual_duration
                .map(|minutes| minutes.to_string())
                .unwrap_or_else(|| "none".to_string())
        ),
    );
    Ok(task)
}

pub fn get_day_start_time_impl(state: &AppState, date: String) -> Result<DateTime<Utc>, InfraError> {
    let date = parse_date_input(&date)?;
    state.day_start(date)
}

/// Stores a new anchor for `date` and re-propagates that day.
pub fn set_day_start_time_impl(
    state: &AppState,
    date: String,
    start_at: String,
) -> Result<DateTime<Utc>, InfraError> {
    let date = parse_date_input(&date)?;
    let start_at = parse_rfc3339_input(&start_at, "start_at")?;
    let mut plan = DayPlan::load(state, date)?;
    let previous = state.day_start(date)?;

    state.day_starts.set(date, start_at)?;
    match commit_plan(state, &mut plan, &[]) {
        Ok(true) => {}
        Ok(false) => {
            state.notifier.bump();
        }
        Err(error) => {
            // Tasks still carry times from the previous anchor.
            if let Err(restore_error) = state.day_starts.set(date, previous) {
                state.log_error(
                    "set_day_start_time",
                    &format!("failed to restore day start for {}: {restore_error}", date_key(date)),
                );
            }
            return Err(error);
        }
    }

    state.log_info(
        "set_day_start_time",
        &format!("date={} start_at={}", date_key(date), start_at.to_rfc3339()),
    );
    Ok(start_at)
}

/// Re-propagates a day from its current anchor and returns the result.
pub fn refresh_schedule_impl(state: &AppState, date: String) -> Result<DaySchedule, InfraError> {
    let date = parse_date_input(&date)?;
    let mut plan = DayPlan::load(state, date)?;
    let written = commit_plan(state, &mut plan, &[])?;

    state.log_info(
        "refresh_schedule",
        &format!("date={} written={written}", date_key(date)),
    );
    project_day(state, &plan)
}

pub fn get_day_schedule_impl(state: &AppState, date: String) -> Result<DaySchedule, InfraError> {
    let date = parse_date_input(&date)?;
    let plan = DayPlan::load(state, date)?;
    project_day(state, &plan)
}

pub fn list_root_tasks_impl(state: &AppState, date: String) -> Result<Vec<Task>, InfraError> {
    let date = parse_date_input(&date)?;
    state.tasks.list_roots(date)
}

pub fn list_subtasks_impl(state: &AppState, parent_id: String) -> Result<Vec<Task>, InfraError> {
    let parent_id = required_id(&parent_id, "parent_id")?;
    state.tasks.list_children(parent_id)
}

/// Statistics for `start..=end`. Earlier days inside the smoothing window
/// are fetched too so the first day is smoothed like the others.
pub fn get_statistics_impl(
    state: &AppState,
    start: String,
    end: String,
) -> Result<StatisticsSummary, InfraError> {
    let start = parse_date_input(&start)?;
    let end = parse_date_input(&end)?;
    if end < start {
        return Err(InfraError::InvalidConfig(
            "end must not be before start".to_string(),
        ));
    }

    if (end - start).num_days() >= MAX_STATISTICS_DAYS {
        return Err(InfraError::InvalidConfig(format!(
            "statistics range must not exceed {MAX_STATISTICS_DAYS} days"
        )));
    }

    let window_days = state.settings.accuracy_window_days.max(1);
    let fetch_from = start
        .checked_sub_signed(Duration::days(i64::from(window_days) - 1))
        .unwrap_or(NaiveDate::MIN);
    let tasks = state.tasks.list_in_range(fetch_from, end)?;
    Ok(summarize(
        tasks,
        start,
        end,
        window_days,
        state.settings.accuracy_target,
    ))
}

fn project_day(state: &AppState, plan: &DayPlan) -> Result<DaySchedule, InfraError> {
    let forest = &plan.forest;
    let now = state.now();
    let roots = forest.roots();
    Ok(DaySchedule {
        date: plan.date,
        day_start: state.day_start(plan.date)?,
        load_level: load_level(forest),
        total_minutes: roots
            .iter()
            .map(|root_id| effective_duration(forest, root_id))
            .fold(0u32, u32::saturating_add),
        active_task_id: tracking::day_active_task(forest),
        gaps: sibling_gaps(forest),
        tasks: roots
            .iter()
            .filter_map(|root_id| project_task(forest, root_id, now))
            .collect(),
        revision: state.revision(),
    })
}

fn project_task(forest: &TaskForest, task_id: &str, now: DateTime<Utc>) -> Option<ScheduledTask> {
    let task = forest.get(task_id)?;
    let is_root = task.is_root();
    Some(ScheduledTask {
        task: task.clone(),
        effective_duration: effective_duration(forest, task_id),
        phase: task.phase(),
        active_task_id: is_root.then(|| tracking::active_task(forest, task_id)).flatten(),
        current_sub_task_id: is_root
            .then(|| tracking::current_sub_task(forest, task_id, now))
            .flatten(),
        children: forest
            .children(task_id)
            .iter()
            .filter_map(|child_id| project_task(forest, child_id, now))
            .collect(),
    })
}

fn build_task(
    state: &AppState,
    task_id: String,
    input: NewTaskInput,
    date: NaiveDate,
    parent_id: Option<String>,
    order_index: u32,
) -> Result<Task, InfraError> {
    let manual_duration = round_down_to_step(input.duration_minutes, state.settings.duration_step_minutes);
    let mut task = Task::new(task_id, input.title.trim(), date, manual_duration, state.now());
    task.detail = normalized(input.detail);
    task.parent_id = parent_id;
    task.order_index = order_index;
    task.fixed_start_time = normalized(input.fixed_start_time)
        .map(|value| parse_rfc3339_input(&value, "fixed_start_time"))
        .transpose()?;
    task.validate().map_err(DomainError::InvalidTask)?;
    Ok(task)
}

fn check_parent(
    state: &AppState,
    plan: &DayPlan,
    task_id: &str,
    parent_id: &str,
) -> Result<(), InfraError> {
    if parent_id == task_id {
        return Err(DomainError::InvalidParent {
            task_id: task_id.to_string(),
            parent_id: parent_id.to_string(),
        }
        .into());
    }
    if !plan.forest.contains(parent_id) {
        return match state.tasks.get(parent_id)? {
            Some(_) => Err(DomainError::InvalidParent {
                task_id: task_id.to_string(),
                parent_id: parent_id.to_string(),
            }
            .into()),
            None => Err(DomainError::TaskNotFound(parent_id.to_string()).into()),
        };
    }
    if plan.forest.depth(parent_id) + 1 > state.settings.max_nesting_depth {
        return Err(DomainError::NestingTooDeep {
            parent_id: parent_id.to_string(),
        }
        .into());
    }
    Ok(())
}

fn is_within_subtree(forest: &TaskForest, candidate: &str, root_id: &str) -> bool {
    let mut cursor = Some(candidate.to_string());
    let mut steps = 0;
    while let Some(current) = cursor {
        if current == root_id {
            return true;
        }
        steps += 1;
        if steps > forest.len() {
            return false;
        }
        cursor = forest.get(&current).and_then(|task| task.parent_id.clone());
    }
    false
}

fn subtree_height(forest: &TaskForest, task_id: &str) -> usize {
    forest
        .children(task_id)
        .iter()
        .map(|child_id| 1 + subtree_height(forest, child_id))
        .max()
        .unwrap_or(0)
}

fn parse_date_input(value: &str) -> Result<NaiveDate, InfraError> {
    parse_date(value, "date").map_err(InfraError::InvalidConfig)
}

fn parse_rfc3339_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::InvalidConfig(format!(
                "{field_name} must be RFC3339 date-time: {error}"
            ))
        })
}

fn required_id<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(value)
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
