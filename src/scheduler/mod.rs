//! Scheduler module for periodic sync passes

pub mod simple_scheduler;

pub use simple_scheduler::{run_with_timeout, SimpleTaskManager};
