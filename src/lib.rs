//! Day planner engine: a per-day forest of tasks whose start and end times
//! are derived from a day anchor, task durations and sibling order.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{AppState, DaySchedule, NewTaskInput, ScheduledTask};
pub use infrastructure::error::InfraError;
