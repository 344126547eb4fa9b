//! # Divvy Client
//!
//! Offline-first sync client for Divvy group expenses. Keeps a durable
//! local copy of group aggregates synchronized with a remote tabular
//! store of variable column naming, under intermittent connectivity and
//! concurrent multi-client edits.
//!
//! ## Components
//!
//! - [`SchemaMapper`] — probes the remote store once per process to
//!   discover its actual column names
//! - [`LocalCache`] / [`DeleteQueue`] — durable local state and the
//!   offline delete queue, surviving restarts
//! - [`RemoteStore`] — schema-aware adapter over any [`TabularStore`]
//!   (in-process [`MemoryStore`], PostgREST-dialect [`RestStore`])
//! - [`SyncEngine`] — full-state push, pull-overwrite, offline deletes,
//!   queue replay with backoff on reconnect
//! - [`RealtimeListener`] — applies remote change notifications to the
//!   cache and the open view through a bounded sequential queue
//!
//! ## Wiring
//!
//! ```rust
//! use std::sync::Arc;
//! use divvy_client::{
//!     Connectivity, DeleteQueue, LocalCache, MemoryStorage, MemoryStore, NullUi,
//!     RemoteStore, SyncEngine,
//! };
//!
//! # async fn wire() {
//! let storage = Arc::new(MemoryStorage::new());
//! let remote = Arc::new(RemoteStore::new(Arc::new(MemoryStore::new())));
//! let engine = Arc::new(SyncEngine::new(
//!     Some(remote),
//!     LocalCache::new(storage.clone()),
//!     DeleteQueue::new(storage),
//!     Arc::new(Connectivity::new(true)),
//!     Arc::new(NullUi),
//! ));
//! let outcome = engine.push_all().await.unwrap();
//! # let _ = outcome;
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod ids;
pub mod realtime;
pub mod remote;
pub mod schema;
pub mod storage;
pub mod store;
pub mod sync;
pub mod ui;

// Re-export main types at crate root
pub use cache::{DeleteQueue, EntityKind, LocalCache, PendingDelete};
pub use config::{Config, ConfigError};
pub use connectivity::Connectivity;
pub use error::{Result, StoreError, SyncError};
pub use ids::{generate_user_id, new_entity_id};
pub use realtime::{RealtimeListener, ViewState};
pub use remote::RemoteStore;
pub use schema::SchemaMapper;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{ChangeEvent, ChangeKind, MemoryStore, Order, RestStore, TabularStore};
pub use sync::{Backoff, DeleteOutcome, PushOutcome, SkipReason, SyncEngine};
pub use ui::{NullUi, Severity, UiBridge};
