pub mod bootstrap;
pub mod commands;
pub mod day_start;
pub mod notifier;
