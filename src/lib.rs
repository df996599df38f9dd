//! A query-result and entity caching engine that sits between a data-access
//! layer and pluggable cache backends.
//!
//! # Features
//! - **Deterministic Naming**: cache keys derived from a type plus an
//!   arbitrary parameter set, independent of parameter ordering.
//! - **Single Flight**: concurrent population of the same local cache key
//!   converges on exactly one retrieval; distributed backends degrade to a
//!   stale snapshot instead of stacking redundant work.
//! - **Two Invalidation Strategies**: explicit query-key tracking with
//!   optimistic-concurrency compaction, or per-subspace revision counters
//!   embedded into query keys.
//! - **Pluggable Backends**: in-process and out-of-process providers behind
//!   one capability-based trait, with graceful degradation when a
//!   capability is missing.
//! - **Observability**: detailed metrics for lookups, population and
//!   invalidation.

// Public modules that form the API
pub mod builder;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod memory;
pub mod metrics;
pub mod params;
pub mod provider;
pub mod record;
pub mod runtime;
pub mod subspace;
pub mod tracker;

// Internal, crate-only modules
mod revision;

// Re-export the primary user-facing types for convenience
pub use builder::CoordinatorBuilder;
pub use coordinator::{AddOptions, CacheItem, Coordinator, Population};
pub use error::{BuildError, CacheError};
pub use memory::MemoryProvider;
pub use metrics::MetricsSnapshot;
pub use params::{Param, ParamValue};
pub use provider::{CacheProvider, CachedValue, Persistent, RevisionStore, StaleRead};
pub use record::{ChangeKind, InvalidationMode, QueryDependency, Record, TypePolicy};
pub use runtime::{InlineSpawner, TaskSpawner, ThreadSpawner};
pub use tracker::TrackingScope;

#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
