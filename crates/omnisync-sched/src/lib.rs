//! Omnisync Sched - task registry and pass scheduling
//!
//! - [`TaskManager`](manager::TaskManager) - the persisted task registry
//! - [`Scheduler`](scheduler::Scheduler) - interval tickers and on-demand
//!   pass execution with at-most-one run per task

pub mod manager;
pub mod scheduler;

pub use manager::{ManagerError, TaskManager};
pub use scheduler::{RunState, Scheduler};
