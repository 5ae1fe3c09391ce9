//! CLI command implementations

pub mod conflicts;
pub mod daemon;
pub mod status;
pub mod sync;
pub mod task;
