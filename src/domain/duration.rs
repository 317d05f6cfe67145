use crate::domain::forest::TaskForest;

/// Minutes a task occupies in the schedule: the sum of its children's
/// effective durations when it has any, else its own manual duration.
///
/// Unknown ids resolve to 0.
pub fn effective_duration(forest: &TaskForest, task_id: &str) -> u32 {
    let Some(task) = forest.get(task_id) else {
        return 0;
    };
    let children = forest.children(task_id);
    if children.is_empty() {
        return task.manual_duration;
    }
    children
        .iter()
        .map(|child_id| effective_duration(forest, child_id))
        .fold(0u32, u32::saturating_add)
}

/// Rounds a requested duration down to the configured step.
pub fn round_down_to_step(minutes: u32, step_minutes: u32) -> u32 {
    if step_minutes <= 1 {
        return minutes;
    }
    (minutes / step_minutes) * step_minutes
}
