//! # tillbox-sync: Outbound Sync for Tillbox
//!
//! Reconciles local writes with the remote backend under unreliable
//! connectivity. The local store stays authoritative; the backend is an
//! eventually-consistent mirror fed by this crate.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Architecture                                │
//! │                                                                         │
//! │  Terminal commit                                                       │
//! │       │ enqueue_sale / enqueue_inventory                               │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  SyncQueue (queue.rs)                                            │  │
//! │  │  rows in LocalStore "syncQueue", ordered by position             │  │
//! │  │  exhausted items ──► "syncDeadLetters"                           │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ process_queue()                        │
//! │         ┌─────────────────────┴─────────────────────┐                  │
//! │         ▼                                           ▼                   │
//! │  ┌────────────────┐                       ┌────────────────────────┐    │
//! │  │  SyncWorker    │                       │  RemoteBackend         │    │
//! │  │                │                       │                        │    │
//! │  │ interval timer │                       │ RestBackend: insert /  │    │
//! │  │ enqueue wake   │                       │ upsert over HTTP       │    │
//! │  │ shutdown       │                       │                        │    │
//! │  └────────────────┘                       └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Sync and backend settings
//! - [`error`] - Sync error types
//! - [`mutation`] - Wire contracts for sale, sale item and inventory writes
//! - [`queue`] - Durable queue, retries, dead letters
//! - [`remote`] - `RemoteBackend` trait and the REST implementation
//! - [`worker`] - Background drain task
//!
//! ## Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use tillbox_sync::{RestBackend, SyncQueue, SyncWorker};
//!
//! let queue = SyncQueue::new(store.clone(), config.sync.clone());
//! let backend = Arc::new(RestBackend::new(&config.backend)?);
//! let (worker, handle) = SyncWorker::new(queue.clone(), backend);
//! tokio::spawn(worker.run());
//!
//! queue.enqueue_sale(&sale)?;   // worker wakes and sends it
//! ```

pub mod config;
pub mod error;
pub mod mutation;
pub mod queue;
pub mod remote;
pub mod worker;

// Re-exports for convenience
pub use config::{BackendSettings, SyncConfig, SyncMode, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use mutation::{Mutation, MutationKind};
pub use queue::{DeadLetter, DrainReport, SyncQueue, SyncQueueItem};
pub use remote::{RemoteBackend, RestBackend};
pub use worker::{SyncWorker, SyncWorkerHandle};
