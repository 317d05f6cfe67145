use crate::domain::error::DomainError;
use crate::domain::models::Task;
use std::collections::HashMap;

/// Arena of one day's tasks keyed by id.
///
/// Parent/child links are ids, never references. The child index is kept in
/// sync by `insert`, `set_parent` and `remove_subtree`; ordering is resolved
/// on read from `order_index` so callers can renumber freely.
#[derive(Debug, Clone, Default)]
pub struct TaskForest {
    tasks: HashMap<String, Task>,
    children: HashMap<String, Vec<String>>,
}

impl TaskForest {
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut forest = Self::default();
        for task in tasks {
            forest.insert(task);
        }
        forest
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(task_id)
    }

    pub fn require(&self, task_id: &str) -> Result<&Task, DomainError> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))
    }

    pub fn require_mut(&mut self, task_id: &str) -> Result<&mut Task, DomainError> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))
    }

    /// Inserts or replaces a task, re-linking it under its current parent.
    pub fn insert(&mut self, task: Task) {
        if let Some(previous) = self.tasks.get(&task.id) {
            if let Some(old_parent) = previous.parent_id.clone() {
                self.unlink_child(&old_parent, &task.id);
            }
        }
        if let Some(parent_id) = task.parent_id.as_deref() {
            let siblings = self.children.entry(parent_id.to_string()).or_default();
            if !siblings.iter().any(|candidate| candidate == &task.id) {
                siblings.push(task.id.clone());
            }
        }
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn set_parent(&mut self, task_id: &str, parent_id: Option<String>) -> Result<(), DomainError> {
        let mut task = self.require(task_id)?.clone();
        task.parent_id = parent_id;
        self.insert(task);
        Ok(())
    }

    /// Removes a task and every descendant, returning the removed ids
    /// (descendants first).
    pub fn remove_subtree(&mut self, task_id: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.collect_subtree(task_id, &mut removed);
        for id in &removed {
            if let Some(task) = self.tasks.remove(id) {
                if let Some(parent_id) = task.parent_id {
                    self.unlink_child(&parent_id, id);
                }
            }
            self.children.remove(id);
        }
        removed
    }

    pub fn has_children(&self, task_id: &str) -> bool {
        self.children
            .get(task_id)
            .map(|children| !children.is_empty())
            .unwrap_or(false)
    }

    /// Children of `task_id` ordered by `order_index`.
    pub fn children(&self, task_id: &str) -> Vec<String> {
        let ids = self.children.get(task_id).cloned().unwrap_or_default();
        self.sorted(ids)
    }

    /// Root tasks ordered by `order_index`.
    pub fn roots(&self) -> Vec<String> {
        let ids = self
            .tasks
            .values()
            .filter(|task| task.is_root())
            .map(|task| task.id.clone())
            .collect();
        self.sorted(ids)
    }

    /// The sibling group a task with `parent_id` belongs to.
    pub fn siblings(&self, parent_id: Option<&str>) -> Vec<String> {
        match parent_id {
            Some(parent_id) => self.children(parent_id),
            None => self.roots(),
        }
    }

    /// Number of ancestors above `task_id` (roots are depth 0).
    pub fn depth(&self, task_id: &str) -> usize {
        let mut depth = 0;
        let mut cursor = self.tasks.get(task_id).and_then(|task| task.parent_id.clone());
        while let Some(parent_id) = cursor {
            depth += 1;
            if depth > self.tasks.len() {
                break;
            }
            cursor = self.tasks.get(&parent_id).and_then(|task| task.parent_id.clone());
        }
        depth
    }

    pub fn next_order_index(&self, parent_id: Option<&str>) -> u32 {
        self.siblings(parent_id)
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .map(|task| task.order_index + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    fn collect_subtree(&self, task_id: &str, out: &mut Vec<String>) {
        if !self.tasks.contains_key(task_id) || out.iter().any(|id| id == task_id) {
            return;
        }
        for child in self.children.get(task_id).cloned().unwrap_or_default() {
            self.collect_subtree(&child, out);
        }
        out.push(task_id.to_string());
    }

    fn unlink_child(&mut self, parent_id: &str, child_id: &str) {
        if let Some(siblings) = self.children.get_mut(parent_id) {
            siblings.retain(|candidate| candidate != child_id);
        }
    }

    fn sorted(&self, mut ids: Vec<String>) -> Vec<String> {
        ids.retain(|id| self.tasks.contains_key(id));
        ids.sort_by(|left, right| {
            let left_task = &self.tasks[left];
            let right_task = &self.tasks[right];
            left_task
                .order_index
                .cmp(&right_task.order_index)
                .then_with(|| left_task.created_at.cmp(&right_task.created_at))
                .then_with(|| left.cmp(right))
        });
        ids
    }
}
