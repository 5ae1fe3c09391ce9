//! Conflict domain entities
//!
//! A conflict exists when both sides of a key diverged from the snapshot
//! base. Every detected conflict produces a [`ConflictRecord`], whether it
//! was auto-resolved by policy or deferred for manual handling. Pending
//! records persist until resolved and block further automated action on
//! their key only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::newtypes::{Fingerprint, ItemKey, TaskId};

/// How a conflict should be or was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep side A's version, overwriting side B
    KeepA,
    /// Keep side B's version, overwriting side A
    KeepB,
    /// Keep both versions, renaming one with a conflict suffix
    KeepBothRenamed,
    /// Deferred; awaiting operator decision
    ManualPending,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resolution::KeepA => "keep_a",
            Resolution::KeepB => "keep_b",
            Resolution::KeepBothRenamed => "keep_both_renamed",
            Resolution::ManualPending => "manual_pending",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Resolution {
    type Err = super::errors::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_a" => Ok(Resolution::KeepA),
            "keep_b" => Ok(Resolution::KeepB),
            "keep_both_renamed" => Ok(Resolution::KeepBothRenamed),
            "manual_pending" => Ok(Resolution::ManualPending),
            other => Err(super::errors::DomainError::UnknownValue {
                field: "resolution".into(),
                value: other.into(),
            }),
        }
    }
}

/// Who or what decided the resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Operator chose via the pending-conflicts interface
    Operator,
    /// Automatic resolution from the task's conflict policy
    Policy,
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionSource::Operator => "operator",
            ResolutionSource::Policy => "policy",
        };
        write!(f, "{}", s)
    }
}

/// A recorded divergence between the two sides of one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Unique identifier for this record
    pub id: Uuid,
    /// Task the conflict belongs to
    pub task_id: TaskId,
    /// The conflicted key
    pub key: ItemKey,
    /// Side A's fingerprint at detection time, if present
    pub fingerprint_a: Option<Fingerprint>,
    /// Side B's fingerprint at detection time, if present
    pub fingerprint_b: Option<Fingerprint>,
    /// Side A's modification timestamp, if the connector supplied one
    pub modified_a: Option<DateTime<Utc>>,
    /// Side B's modification timestamp, if the connector supplied one
    pub modified_b: Option<DateTime<Utc>>,
    /// When the divergence was detected
    pub detected_at: DateTime<Utc>,
    /// The chosen resolution (`ManualPending` while deferred)
    pub resolution: Resolution,
    /// When the record was resolved, if it has been
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who or what resolved it, if it has been
    pub resolved_by: Option<ResolutionSource>,
    /// When the engine applied the resolution to the actual sides.
    ///
    /// Policy resolutions are applied in the same pass that records them.
    /// Operator resolutions are applied by the next pass that touches the
    /// key; until then the record is resolved but unapplied.
    pub applied_at: Option<DateTime<Utc>>,
}

impl ConflictRecord {
    /// Creates a new pending record for a detected divergence.
    pub fn new(
        task_id: TaskId,
        key: ItemKey,
        fingerprint_a: Option<Fingerprint>,
        fingerprint_b: Option<Fingerprint>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            key,
            fingerprint_a,
            fingerprint_b,
            modified_a: None,
            modified_b: None,
            detected_at: Utc::now(),
            resolution: Resolution::ManualPending,
            resolved_at: None,
            resolved_by: None,
            applied_at: None,
        }
    }

    /// Sets the per-side modification timestamps.
    #[must_use]
    pub fn with_timestamps(
        mut self,
        modified_a: Option<DateTime<Utc>>,
        modified_b: Option<DateTime<Utc>>,
    ) -> Self {
        self.modified_a = modified_a;
        self.modified_b = modified_b;
        self
    }

    /// Whether the record is still awaiting a decision.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.resolution, Resolution::ManualPending)
    }

    /// Marks the record resolved. No-op if already resolved.
    #[must_use]
    pub fn resolve(mut self, resolution: Resolution, source: ResolutionSource) -> Self {
        if !self.is_pending() {
            return self;
        }
        self.resolution = resolution;
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(source);
        self
    }

    /// Whether the record carries a resolution the engine has not yet
    /// applied to the sides.
    #[must_use]
    pub fn is_unapplied(&self) -> bool {
        !self.is_pending() && self.applied_at.is_none()
    }

    /// Marks the resolution as applied.
    #[must_use]
    pub fn mark_applied(mut self) -> Self {
        if self.applied_at.is_none() {
            self.applied_at = Some(Utc::now());
        }
        self
    }

    /// Returns an unapplied resolution to the pending state, discarding
    /// the decision. No-op once the resolution has been applied.
    #[must_use]
    pub fn reopen(mut self) -> Self {
        if self.applied_at.is_none() {
            self.resolution = Resolution::ManualPending;
            self.resolved_at = None;
            self.resolved_by = None;
        }
        self
    }
}
