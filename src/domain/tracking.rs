use crate::domain::error::DomainError;
use crate::domain::forest::TaskForest;
use crate::domain::models::{rounded_minutes_between, whole_minutes_between};
use chrono::{DateTime, Utc};

/// Records the real start. Starting a finished task reopens it.
pub fn start(forest: &mut TaskForest, task_id: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
    let task = forest.require_mut(task_id)?;
    task.actual_start_time = Some(now);
    task.actual_end_time = None;
    task.actual_duration = None;
    task.is_completed = false;
    Ok(())
}

/// Records the real end and completes the task. A task finished without a
/// recorded start is treated as started at `now`.
pub fn finish(forest: &mut TaskForest, task_id: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
    ensure_children_completed(forest, task_id)?;
    let task = forest.require_mut(task_id)?;
    let started = task.actual_start_time.unwrap_or(now);
    task.actual_start_time = Some(started);
    task.actual_end_time = Some(now);
    task.actual_duration = Some(rounded_minutes_between(started, now));
    task.is_completed = true;
    sync_parent_completion(forest, task_id);
    Ok(())
}

/// Checkbox completion. Containers need every child completed first. When no
/// explicit start/finish was recorded the planned span is used as a
/// best-effort actual duration.
pub fn complete(forest: &mut TaskForest, task_id: &str) -> Result<(), DomainError> {
    ensure_children_completed(forest, task_id)?;
    let task = forest.require_mut(task_id)?;
    task.is_completed = true;
    let recorded = task.actual_start_time.is_some() && task.actual_end_time.is_some();
    if !recorded {
        if let (Some(start), Some(end)) = (task.current_start_time, task.current_end_time) {
            task.actual_duration = Some(whole_minutes_between(start, end));
        }
    }
    sync_parent_completion(forest, task_id);
    Ok(())
}

pub fn uncomplete(forest: &mut TaskForest, task_id: &str) -> Result<(), DomainError> {
    forest.require_mut(task_id)?.is_completed = false;
    Ok(())
}

/// Completes `parent_id` once all of its children are complete. Returns
/// whether the parent flipped.
pub fn auto_complete_parent(forest: &mut TaskForest, parent_id: &str) -> bool {
    let children = forest.children(parent_id);
    if children.is_empty() || !all_completed(forest, &children) {
        return false;
    }
    match forest.get_mut(parent_id) {
        Some(parent) if !parent.is_completed => {
            parent.is_completed = true;
            true
        }
        _ => false,
    }
}

/// Manual edit of the actual record. Both times present means completed,
/// only a start means in progress, neither clears the record.
pub fn edit_actual_times(
    forest: &mut TaskForest,
    task_id: &str,
    actual_start: Option<DateTime<Utc>>,
    actual_end: Option<DateTime<Utc>>,
) -> Result<(), DomainError> {
    forest.require(task_id)?;
    match (actual_start, actual_end) {
        (Some(start), Some(end)) => {
            if end < start {
                return Err(DomainError::InvalidTask(
                    "actual end must not be before actual start".to_string(),
                ));
            }
            ensure_children_completed(forest, task_id)?;
            let task = forest.require_mut(task_id)?;
            task.actual_start_time = Some(start);
            task.actual_end_time = Some(end);
            task.actual_duration = Some(whole_minutes_between(start, end));
            task.is_completed = true;
            sync_parent_completion(forest, task_id);
        }
        (Some(start), None) => {
            let task = forest.require_mut(task_id)?;
            task.actual_start_time = Some(start);
            task.actual_end_time = None;
            task.actual_duration = None;
            task.is_completed = false;
        }
        (None, None) => {
            let task = forest.require_mut(task_id)?;
            task.actual_start_time = None;
            task.actual_end_time = None;
            task.actual_duration = None;
            task.is_completed = false;
        }
        (None, Some(_)) => {
            return Err(DomainError::InvalidTask(
                "actual end requires an actual start".to_string(),
            ));
        }
    }
    Ok(())
}

/// The task to work on inside `root_id`: its first incomplete child, or the
/// root itself when it has no children and is still open.
pub fn active_task(forest: &TaskForest, root_id: &str) -> Option<String> {
    let root = forest.get(root_id)?;
    let children = forest.children(root_id);
    if children.is_empty() {
        return (!root.is_completed).then(|| root.id.clone());
    }
    children
        .into_iter()
        .find(|child_id| forest.get(child_id).is_some_and(|child| !child.is_completed))
}

/// Active task of the first root that still has one.
pub fn day_active_task(forest: &TaskForest) -> Option<String> {
    forest
        .roots()
        .iter()
        .find_map(|root_id| active_task(forest, root_id))
}

/// The open child of `root_id` whose planned span contains `now`, falling
/// back to the first open child.
pub fn current_sub_task(forest: &TaskForest, root_id: &str, now: DateTime<Utc>) -> Option<String> {
    let open = forest
        .children(root_id)
        .into_iter()
        .filter(|child_id| forest.get(child_id).is_some_and(|child| !child.is_completed))
        .collect::<Vec<_>>();
    open.iter()
        .find(|child_id| {
            forest.get(child_id).is_some_and(|child| {
                matches!(
                    (child.current_start_time, child.current_end_time),
                    (Some(start), Some(end)) if start <= now && now <= end
                )
            })
        })
        .or_else(|| open.first())
        .cloned()
}

fn ensure_children_completed(forest: &TaskForest, task_id: &str) -> Result<(), DomainError> {
    forest.require(task_id)?;
    let children = forest.children(task_id);
    if !children.is_empty() && !all_completed(forest, &children) {
        return Err(DomainError::IncompleteChildren {
            task_id: task_id.to_string(),
        });
    }
    Ok(())
}

fn all_completed(forest: &TaskForest, ids: &[String]) -> bool {
    ids.iter()
        .all(|id| forest.get(id).is_some_and(|task| task.is_completed))
}

fn sync_parent_completion(forest: &mut TaskForest, task_id: &str) {
    let parent_id = forest.get(task_id).and_then(|task| task.parent_id.clone());
    if let Some(parent_id) = parent_id {
        auto_complete_parent(forest, &parent_id);
    }
}
