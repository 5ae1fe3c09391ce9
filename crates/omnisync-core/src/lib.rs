//! Omnisync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `ItemMeta`, `Snapshot`, `ChangeSet`, `SyncAction`,
//!   `ConflictRecord`, `SyncTask`, `SyncReport`
//! - **Port definitions** - Traits for adapters: `IConnector`,
//!   `ISnapshotStore`, `IConflictStore`
//! - **Configuration** - Typed settings with validation and defaults
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O. Ports define
//! trait interfaces that adapter crates implement: connectors for each
//! backend kind, and stores for persisted snapshots and conflicts.

pub mod config;
pub mod domain;
pub mod ports;
