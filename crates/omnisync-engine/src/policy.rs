//! Conflict policy evaluation
//!
//! A policy is a pure function from a detected divergence to a
//! [`Resolution`]. Policies never perform I/O; the engine applies the
//! outcome.

use chrono::{DateTime, Utc};
use tracing::debug;

use omnisync_core::domain::conflict::Resolution;
use omnisync_core::domain::task::ConflictPolicy;

/// Evaluates a task's conflict policy for one divergent key.
///
/// `modified_a` / `modified_b` are the side-supplied modification
/// timestamps from the listing, when present. `prefer_newer` needs both:
/// with either missing, or with identical timestamps over divergent
/// content, it defers to manual resolution instead of guessing.
#[must_use]
pub fn evaluate(
    policy: ConflictPolicy,
    modified_a: Option<DateTime<Utc>>,
    modified_b: Option<DateTime<Utc>>,
) -> Resolution {
    match policy {
        ConflictPolicy::PreferA => Resolution::KeepA,
        ConflictPolicy::PreferB => Resolution::KeepB,
        ConflictPolicy::Manual => Resolution::ManualPending,
        ConflictPolicy::PreferNewer => match (modified_a, modified_b) {
            (Some(a), Some(b)) if a > b => Resolution::KeepA,
            (Some(a), Some(b)) if b > a => Resolution::KeepB,
            (Some(_), Some(_)) => {
                debug!("prefer_newer: identical timestamps, deferring to manual");
                Resolution::ManualPending
            }
            _ => {
                debug!("prefer_newer: missing modification timestamp, deferring to manual");
                Resolution::ManualPending
            }
        },
    }
}
