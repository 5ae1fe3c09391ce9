//! Sync task configuration
//!
//! A [`SyncTask`] is a named pairing of two connector references plus the
//! options that shape a pass: direction, conflict policy, filter rules,
//! and schedule. Tasks are created from configuration and validated at
//! construction time, not at use time.

use std::str::FromStr;
use std::time::Duration;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::TaskId;

// ============================================================================
// Side / direction / policy
// ============================================================================

/// Which of a task's two connectors is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Side A (first connector)
    A,
    /// Side B (second connector)
    B,
}

impl Side {
    /// The opposite side.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// Direction of propagation for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Changes flow both ways
    #[default]
    Bidirectional,
    /// Only side A's changes are propagated to side B
    AToB,
    /// Only side B's changes are propagated to side A
    BToA,
}

impl SyncDirection {
    /// Whether changes originating on `side` may be propagated.
    #[must_use]
    pub fn allows_from(&self, side: Side) -> bool {
        match (self, side) {
            (SyncDirection::Bidirectional, _) => true,
            (SyncDirection::AToB, Side::A) => true,
            (SyncDirection::BToA, Side::B) => true,
            _ => false,
        }
    }
}

impl FromStr for SyncDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bidirectional" => Ok(SyncDirection::Bidirectional),
            "a_to_b" => Ok(SyncDirection::AToB),
            "b_to_a" => Ok(SyncDirection::BToA),
            other => Err(DomainError::UnknownValue {
                field: "direction".into(),
                value: other.into(),
            }),
        }
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncDirection::Bidirectional => "bidirectional",
            SyncDirection::AToB => "a_to_b",
            SyncDirection::BToA => "b_to_a",
        };
        write!(f, "{}", s)
    }
}

/// Strategy applied when both sides of a key diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Side A's version wins
    PreferA,
    /// Side B's version wins
    PreferB,
    /// The side with the later modification timestamp wins; degrades to
    /// `Manual` when either side lacks a timestamp
    PreferNewer,
    /// Defer: record the conflict and wait for the operator
    #[default]
    Manual,
}

impl FromStr for ConflictPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefer_a" => Ok(ConflictPolicy::PreferA),
            "prefer_b" => Ok(ConflictPolicy::PreferB),
            "prefer_newer" => Ok(ConflictPolicy::PreferNewer),
            "manual" => Ok(ConflictPolicy::Manual),
            other => Err(DomainError::UnknownValue {
                field: "conflict_policy".into(),
                value: other.into(),
            }),
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictPolicy::PreferA => "prefer_a",
            ConflictPolicy::PreferB => "prefer_b",
            ConflictPolicy::PreferNewer => "prefer_newer",
            ConflictPolicy::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Include/exclude glob rules restricting which keys a task touches.
///
/// Semantics: a key matches when it matches at least one include pattern
/// (an empty include list means "everything") and no exclude pattern.
/// Patterns are validated when the set is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Include patterns; empty means match-all
    #[serde(default)]
    pub include: Vec<String>,
    /// Exclude patterns; an excluded key is never touched
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FilterSet {
    /// A filter that matches every key.
    #[must_use]
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Builds a set from pattern lists, validating each glob.
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Result<Self, DomainError> {
        let set = Self { include, exclude };
        set.validate()?;
        Ok(set)
    }

    /// Validates every pattern in the set.
    pub fn validate(&self) -> Result<(), DomainError> {
        for pattern in self.include.iter().chain(self.exclude.iter()) {
            Pattern::new(pattern).map_err(|e| DomainError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Whether a key passes the filter.
    ///
    /// Patterns that fail to compile are ignored here; [`validate`] is the
    /// place where bad patterns are rejected.
    ///
    /// [`validate`]: FilterSet::validate
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .filter_map(|p| Pattern::new(p).ok())
                .any(|p| p.matches(key));
        if !included {
            return false;
        }
        !self
            .exclude
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|p| p.matches(key))
    }
}

// ============================================================================
// Connector references and schedule
// ============================================================================

/// Reference to a connector backend, e.g. `local:///home/user/docs` or
/// `memory://fixtures`. The scheme selects the backend kind; the target is
/// interpreted by that backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorRef(String);

impl ConnectorRef {
    /// Parses and validates a connector reference URI.
    pub fn new(uri: impl Into<String>) -> Result<Self, DomainError> {
        let uri = uri.into();
        let Some((scheme, target)) = uri.split_once("://") else {
            return Err(DomainError::InvalidConnectorRef(format!(
                "'{uri}' has no scheme (expected e.g. local://<path>)"
            )));
        };
        if scheme.is_empty() || target.is_empty() {
            return Err(DomainError::InvalidConnectorRef(format!(
                "'{uri}' has an empty scheme or target"
            )));
        }
        Ok(Self(uri))
    }

    /// The backend scheme (`local`, `memory`, ...).
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.split_once("://").map(|(s, _)| s).unwrap_or("")
    }

    /// The backend-specific target.
    #[must_use]
    pub fn target(&self) -> &str {
        self.0.split_once("://").map(|(_, t)| t).unwrap_or("")
    }

    /// The full URI.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectorRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// When a task's passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSchedule {
    /// Seconds between scheduled passes
    pub interval_secs: u64,
}

impl TaskSchedule {
    /// Schedule with the given interval; rejects zero.
    pub fn every_secs(interval_secs: u64) -> Result<Self, DomainError> {
        if interval_secs == 0 {
            return Err(DomainError::ValidationFailed(
                "schedule interval must be at least one second".into(),
            ));
        }
        Ok(Self { interval_secs })
    }

    /// The interval as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for TaskSchedule {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

// ============================================================================
// SyncTask
// ============================================================================

/// A named, configured pairing of two connectors plus sync options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    /// Unique task identifier
    pub id: TaskId,
    /// Connector reference for side A
    pub side_a: ConnectorRef,
    /// Connector reference for side B
    pub side_b: ConnectorRef,
    /// Direction of propagation
    #[serde(default)]
    pub direction: SyncDirection,
    /// Conflict policy applied to divergent keys
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Include/exclude rules
    #[serde(default)]
    pub filters: FilterSet,
    /// Pass schedule
    #[serde(default)]
    pub schedule: TaskSchedule,
    /// Disabled tasks are skipped by the scheduler
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SyncTask {
    /// Creates a task with default options (bidirectional, manual policy,
    /// match-all filters, five-minute interval, enabled).
    pub fn new(id: TaskId, side_a: ConnectorRef, side_b: ConnectorRef) -> Self {
        Self {
            id,
            side_a,
            side_b,
            direction: SyncDirection::default(),
            conflict_policy: ConflictPolicy::default(),
            filters: FilterSet::match_all(),
            schedule: TaskSchedule::default(),
            enabled: true,
        }
    }

    /// Validates the whole configuration surface of the task.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.filters.validate()?;
        if self.schedule.interval_secs == 0 {
            return Err(DomainError::ValidationFailed(format!(
                "task '{}' has a zero schedule interval",
                self.id
            )));
        }
        if self.side_a == self.side_b {
            return Err(DomainError::ValidationFailed(format!(
                "task '{}' pairs a connector with itself",
                self.id
            )));
        }
        Ok(())
    }

    /// The connector reference for the given side.
    #[must_use]
    pub fn connector_ref(&self, side: Side) -> &ConnectorRef {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> SyncTask {
        SyncTask::new(
            TaskId::new("docs").unwrap(),
            ConnectorRef::new("local:///home/user/docs").unwrap(),
            ConnectorRef::new("memory://remote").unwrap(),
        )
    }

    #[test]
    fn test_direction_allows_from() {
        assert!(SyncDirection::Bidirectional.allows_from(Side::A));
        assert!(SyncDirection::Bidirectional.allows_from(Side::B));
        assert!(SyncDirection::AToB.allows_from(Side::A));
        assert!(!SyncDirection::AToB.allows_from(Side::B));
        assert!(!SyncDirection::BToA.allows_from(Side::A));
        assert!(SyncDirection::BToA.allows_from(Side::B));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(
            "a_to_b".parse::<SyncDirection>().unwrap(),
            SyncDirection::AToB
        );
        assert!("sideways".parse::<SyncDirection>().is_err());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "prefer_newer".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::PreferNewer
        );
        assert!("prompt".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn test_side_other() {
        assert_eq!(Side::A.other(), Side::B);
        assert_eq!(Side::B.other(), Side::A);
    }

    #[test]
    fn test_filter_match_all() {
        let f = FilterSet::match_all();
        assert!(f.matches("anything/at/all.txt"));
    }

    #[test]
    fn test_filter_include_exclude() {
        let f = FilterSet::new(
            vec!["**/*.txt".into()],
            vec!["drafts/**".into()],
        )
        .unwrap();
        assert!(f.matches("docs/a.txt"));
        assert!(!f.matches("docs/a.pdf"));
        assert!(!f.matches("drafts/a.txt"));
    }

    #[test]
    fn test_filter_exclude_only() {
        let f = FilterSet::new(vec![], vec!["*.tmp".into()]).unwrap();
        assert!(f.matches("a.txt"));
        assert!(!f.matches("a.tmp"));
    }

    #[test]
    fn test_filter_invalid_pattern_rejected() {
        let err = FilterSet::new(vec!["[bad".into()], vec![]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidPattern { .. }));
    }

    #[test]
    fn test_connector_ref_parse() {
        let r = ConnectorRef::new("local:///srv/data").unwrap();
        assert_eq!(r.scheme(), "local");
        assert_eq!(r.target(), "/srv/data");
        assert!(ConnectorRef::new("no-scheme").is_err());
        assert!(ConnectorRef::new("local://").is_err());
    }

    #[test]
    fn test_schedule_rejects_zero() {
        assert!(TaskSchedule::every_secs(0).is_err());
        assert_eq!(
            TaskSchedule::every_secs(60).unwrap().interval(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_task_defaults() {
        let t = task();
        assert!(t.enabled);
        assert_eq!(t.direction, SyncDirection::Bidirectional);
        assert_eq!(t.conflict_policy, ConflictPolicy::Manual);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_task_rejects_self_pair() {
        let mut t = task();
        t.side_b = t.side_a.clone();
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_task_serde_round_trip() {
        let t = task();
        let json = serde_json::to_string(&t).unwrap();
        let back: SyncTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let json = r#"{
            "id": "minimal",
            "side_a": "local:///a",
            "side_b": "local:///b"
        }"#;
        let t: SyncTask = serde_json::from_str(json).unwrap();
        assert!(t.enabled);
        assert_eq!(t.schedule.interval_secs, 300);
    }
}
