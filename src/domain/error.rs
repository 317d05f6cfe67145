use thiserror::Error;

/// Invariant violations. Raised before any state is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("cannot update duration of container task {task_id}: it is derived from its sub-tasks")]
    ContainerDurationLocked { task_id: String },
    #[error("cannot complete container task {task_id} with incomplete sub-tasks")]
    IncompleteChildren { task_id: String },
    #[error("cannot nest under {parent_id}: maximum nesting depth reached")]
    NestingTooDeep { parent_id: String },
    #[error("invalid parent {parent_id} for task {task_id}")]
    InvalidParent { task_id: String, parent_id: String },
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("invalid task: {0}")]
    InvalidTask(String),
}
