//! In-memory connector
//!
//! A `DashMap`-backed store implementing the full connector contract plus
//! fault injection, used by engine integration tests and dry runs. Faults
//! are scoped: `set_fail_listing` poisons listings (the whole-pass abort
//! path), `fail_key` poisons every operation on one key (the per-key
//! failure path) without touching the rest of the item set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use omnisync_core::domain::newtypes::{Fingerprint, ItemKey};
use omnisync_core::domain::task::FilterSet;
use omnisync_core::domain::ItemMeta;
use omnisync_core::ports::connector::{ConnectorError, ConnectorResult, IConnector};

use crate::digest_fingerprint;

/// Which error an injected fault raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Raise [`ConnectorError::Unavailable`] (transient).
    Unavailable,
    /// Raise [`ConnectorError::PermissionDenied`] (not retriable).
    PermissionDenied,
}

/// Per-key operation counters, for asserting what the engine touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpCounts {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

#[derive(Clone)]
struct StoredItem {
    payload: Vec<u8>,
    fingerprint: Fingerprint,
    modified_at: DateTime<Utc>,
}

/// Connector over an in-process map.
#[derive(Default)]
pub struct InMemoryConnector {
    items: DashMap<ItemKey, StoredItem>,
    fail_listing: AtomicBool,
    faults: DashMap<ItemKey, Fault>,
    ops: DashMap<ItemKey, OpCounts>,
}

impl InMemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an item, stamping `modified_at` with the current time.
    pub fn insert(&self, key: ItemKey, payload: impl Into<Vec<u8>>) -> Fingerprint {
        self.insert_at(key, payload, Utc::now())
    }

    /// Seeds an item with an explicit modification time.
    pub fn insert_at(
        &self,
        key: ItemKey,
        payload: impl Into<Vec<u8>>,
        modified_at: DateTime<Utc>,
    ) -> Fingerprint {
        let payload = payload.into();
        let fingerprint = payload_fingerprint(&payload);
        self.items.insert(
            key,
            StoredItem {
                payload,
                fingerprint: fingerprint.clone(),
                modified_at,
            },
        );
        fingerprint
    }

    /// The stored payload for a key, if present.
    #[must_use]
    pub fn payload(&self, key: &ItemKey) -> Option<Vec<u8>> {
        self.items.get(key).map(|item| item.payload.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &ItemKey) -> bool {
        self.items.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<ItemKey> {
        let mut keys: Vec<ItemKey> = self.items.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Makes the next and all following listings fail as unavailable.
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Injects a fault on every operation touching `key`.
    pub fn fail_key(&self, key: ItemKey, fault: Fault) {
        self.faults.insert(key, fault);
    }

    /// Clears an injected per-key fault.
    pub fn clear_fault(&self, key: &ItemKey) {
        self.faults.remove(key);
    }

    /// Operation counters recorded for a key.
    #[must_use]
    pub fn ops(&self, key: &ItemKey) -> OpCounts {
        self.ops.get(key).map(|c| *c).unwrap_or_default()
    }

    fn check_fault(&self, key: &ItemKey) -> ConnectorResult<()> {
        match self.faults.get(key).map(|f| *f) {
            Some(Fault::Unavailable) => Err(ConnectorError::Unavailable(format!(
                "injected fault for '{key}'"
            ))),
            Some(Fault::PermissionDenied) => Err(ConnectorError::PermissionDenied(key.clone())),
            None => Ok(()),
        }
    }

    fn count<F: FnOnce(&mut OpCounts)>(&self, key: &ItemKey, bump: F) {
        let mut counts = self.ops.entry(key.clone()).or_default();
        bump(counts.value_mut());
    }
}

fn payload_fingerprint(payload: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    match digest_fingerprint(hasher) {
        Ok(fp) => fp,
        // SHA-256 hex is never empty; unreachable in practice.
        Err(_) => unreachable!("digest produced an empty fingerprint"),
    }
}

#[async_trait]
impl IConnector for InMemoryConnector {
    async fn list_items(&self, filter: &FilterSet) -> ConnectorResult<Vec<ItemMeta>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ConnectorError::Unavailable("injected listing fault".into()));
        }
        let mut items: Vec<ItemMeta> = self
            .items
            .iter()
            .filter(|entry| filter.matches(entry.key().as_str()))
            .map(|entry| {
                ItemMeta::new(
                    entry.key().clone(),
                    entry.key().as_str(),
                    entry.value().fingerprint.clone(),
                )
                .with_modified_at(entry.value().modified_at)
            })
            .collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }

    async fn read(&self, key: &ItemKey) -> ConnectorResult<Vec<u8>> {
        self.check_fault(key)?;
        self.count(key, |c| c.reads += 1);
        self.items
            .get(key)
            .map(|item| item.payload.clone())
            .ok_or_else(|| ConnectorError::ItemNotFound(key.clone()))
    }

    async fn write(&self, key: &ItemKey, payload: &[u8]) -> ConnectorResult<Fingerprint> {
        self.check_fault(key)?;
        self.count(key, |c| c.writes += 1);
        Ok(self.insert(key.clone(), payload))
    }

    async fn delete(&self, key: &ItemKey) -> ConnectorResult<()> {
        self.check_fault(key)?;
        self.count(key, |c| c.deletes += 1);
        self.items
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ConnectorError::ItemNotFound(key.clone()))
    }
}

static REGISTRY: OnceLock<DashMap<String, Arc<InMemoryConnector>>> = OnceLock::new();

/// Process-wide shared instance per name, backing `memory://<name>` URIs.
pub fn shared(name: &str) -> Arc<InMemoryConnector> {
    REGISTRY
        .get_or_init(DashMap::new)
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(InMemoryConnector::new()))
        .value()
        .clone()
}
