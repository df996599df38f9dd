//! The pluggable backend contract.
//!
//! The engine orchestrates lookup, population and invalidation against any
//! store implementing [`CacheProvider`]. The optional capabilities
//! ([`StaleRead`], [`Persistent`], [`RevisionStore`]) unlock the
//! stale-fallback population path, key tracking with named locks, and
//! revision-based invalidation respectively; a provider that lacks one
//! simply degrades the corresponding behavior.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a backend stores under a single key.
///
/// In-process backends hold the raw typed object; out-of-process backends
/// must reject `Object` and only accept the portable variants.
#[derive(Clone)]
pub enum CachedValue {
  /// The raw typed entity, shared by reference. In-process only.
  Object(Arc<dyn Any + Send + Sync>),
  /// An encoded entity payload.
  Payload(Arc<[u8]>),
  /// The ordered item-key index of a query result.
  Index(Arc<[String]>),
}

impl fmt::Debug for CachedValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CachedValue::Object(_) => f.write_str("Object(..)"),
      CachedValue::Payload(bytes) => write!(f, "Payload({} bytes)", bytes.len()),
      CachedValue::Index(keys) => write!(f, "Index({} keys)", keys.len()),
    }
  }
}

/// Core operations every backend must support.
///
/// All operations are best-effort from the engine's point of view: a `false`
/// or empty return is handled by degrading, never by failing the read path.
pub trait CacheProvider: Send + Sync + 'static {
  fn retrieve(&self, key: &str) -> Option<CachedValue>;

  /// Batched fetch. Implementations are free to return entries in any
  /// order and to omit missing keys; callers re-order and decide whether a
  /// partial result is acceptable.
  fn retrieve_many(&self, keys: &[String]) -> HashMap<String, CachedValue>;

  fn save(&self, key: &str, value: CachedValue) -> bool;

  fn save_many(&self, entries: HashMap<String, CachedValue>) -> bool;

  fn clear(&self, key: &str) -> bool;

  /// Insert-if-absent. Returns `false` when the key already exists.
  fn add_new(&self, key: &str, value: CachedValue) -> bool;

  /// Whether other processes/nodes share this backend's contents.
  fn is_distributed(&self) -> bool;

  /// Whether values cross a process boundary and must be portable.
  fn is_out_of_process(&self) -> bool;

  fn stale(&self) -> Option<&dyn StaleRead> {
    None
  }

  fn persistent(&self) -> Option<&dyn Persistent> {
    None
  }

  fn revisions(&self) -> Option<&dyn RevisionStore> {
    None
  }
}

/// Reading a previously cached value while the authoritative population path
/// is contended. Stale results may be outdated and may be partial.
pub trait StaleRead: Send + Sync {
  fn retrieve_stale(&self, key: &str) -> Option<CachedValue>;

  fn retrieve_stale_many(&self, keys: &[String]) -> HashMap<String, CachedValue>;
}

/// Durable records with atomic append, versioned conditional writes and
/// named locks. Backs query-key tracking and distributed population locks.
pub trait Persistent: Send + Sync {
  /// Atomically appends `suffix` to the record at `key`, creating it if
  /// absent.
  fn append(&self, key: &str, suffix: &str) -> bool;

  /// The record's current value together with its version.
  fn retrieve_versioned(&self, key: &str) -> Option<(String, u64)>;

  /// Conditional write: succeeds only if the stored version still equals
  /// `version`. An absent record has version 0.
  fn save_versioned(&self, key: &str, value: &str, version: u64) -> bool;

  /// Non-blocking named lock acquisition. Lock expiry on crash is the
  /// backend's responsibility (TTL or equivalent).
  fn try_acquire_lock(&self, name: &str) -> bool;

  fn release_lock(&self, name: &str);
}

/// Monotonic per-subspace revision counters.
pub trait RevisionStore: Send + Sync {
  /// Current revisions for the given subspace keys. Keys never incremented
  /// may be omitted; callers treat them as revision 0.
  fn get_revisions(&self, subspace_keys: &[String]) -> HashMap<String, u64>;

  fn increment_revision(&self, subspace_key: &str);
}
