use crate::domain::error::DomainError;
use crate::domain::forest::TaskForest;
use std::collections::HashSet;

/// Assigns `order_index = position` along `ids`.
pub fn renumber(forest: &mut TaskForest, ids: &[String]) {
    for (position, id) in ids.iter().enumerate() {
        if let Some(task) = forest.get_mut(id) {
            task.order_index = position as u32;
        }
    }
}

/// Replaces the order of one sibling group. `ordered_ids` must be exactly
/// the current members of the group.
pub fn reorder(
    forest: &mut TaskForest,
    parent_id: Option<&str>,
    ordered_ids: &[String],
) -> Result<(), DomainError> {
    if let Some(parent_id) = parent_id {
        forest.require(parent_id)?;
    }
    let current = forest.siblings(parent_id);
    let expected = current.iter().map(String::as_str).collect::<HashSet<_>>();
    let requested = ordered_ids.iter().map(String::as_str).collect::<HashSet<_>>();
    if requested.len() != ordered_ids.len() {
        return Err(DomainError::InvalidOrder(
            "order contains duplicate task ids".to_string(),
        ));
    }
    if requested != expected {
        return Err(DomainError::InvalidOrder(format!(
            "order must list exactly the {} sibling tasks",
            current.len()
        )));
    }
    renumber(forest, ordered_ids);
    Ok(())
}

pub fn move_up(forest: &mut TaskForest, task_id: &str) -> Result<bool, DomainError> {
    let (mut siblings, position) = locate(forest, task_id)?;
    if position == 0 {
        return Ok(false);
    }
    siblings.swap(position - 1, position);
    renumber(forest, &siblings);
    Ok(true)
}

pub fn move_down(forest: &mut TaskForest, task_id: &str) -> Result<bool, DomainError> {
    let (mut siblings, position) = locate(forest, task_id)?;
    if position + 1 >= siblings.len() {
        return Ok(false);
    }
    siblings.swap(position, position + 1);
    renumber(forest, &siblings);
    Ok(true)
}

/// Drag move: takes the task out of its group and reinserts it so that it
/// ends up at `destination` (clamped to the last position), then renumbers
/// the whole group.
pub fn move_to(
    forest: &mut TaskForest,
    task_id: &str,
    destination: usize,
) -> Result<bool, DomainError> {
    let (mut siblings, position) = locate(forest, task_id)?;
    let moved = siblings.remove(position);
    let destination = destination.min(siblings.len());
    siblings.insert(destination, moved);
    let changed = destination != position;
    renumber(forest, &siblings);
    Ok(changed)
}

fn locate(forest: &TaskForest, task_id: &str) -> Result<(Vec<String>, usize), DomainError> {
    let task = forest.require(task_id)?;
    let siblings = forest.siblings(task.parent_id.as_deref());
    let position = siblings
        .iter()
        .position(|candidate| candidate == task_id)
        .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
    Ok((siblings, position))
}
