pub mod duration;
pub mod error;
pub mod forest;
pub mod models;
pub mod ordering;
pub mod schedule;
pub mod stats;
pub mod tracking;
