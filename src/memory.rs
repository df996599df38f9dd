//! The built-in in-process provider.
//!
//! A sharded map guarded by `parking_lot` read-write locks, with dedicated
//! stores for tracking records, named locks and revision counters so that
//! every optional capability is available in-process.

use crate::provider::{CacheProvider, CachedValue, Persistent, RevisionStore, StaleRead};

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLock};

type Shard = CachePadded<RwLock<HashMap<String, CachedValue, ahash::RandomState>>>;

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// An in-process cache provider partitioned into independently locked
/// shards so operations on different keys rarely contend.
pub struct MemoryProvider {
  shards: Box<[Shard]>,
  hasher: ahash::RandomState,
  tracking: RwLock<HashMap<String, (String, u64), ahash::RandomState>>,
  locks: Mutex<HashSet<String>>,
  revisions: RwLock<HashMap<String, u64, ahash::RandomState>>,
}

impl fmt::Debug for MemoryProvider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryProvider")
      .field("num_shards", &self.shards.len())
      .finish_non_exhaustive()
  }
}

impl MemoryProvider {
  pub fn new() -> Self {
    Self::with_shards((num_cpus::get() * 4).max(1))
  }

  /// Creates a provider with a specific shard count, rounded up to a power
  /// of two for fast bitwise shard selection.
  pub fn with_shards(shards: usize) -> Self {
    let count = shards.max(1).next_power_of_two();
    let hasher = ahash::RandomState::new();
    let shards = (0..count)
      .map(|_| CachePadded::new(RwLock::new(HashMap::with_hasher(ahash::RandomState::new()))))
      .collect::<Vec<_>>()
      .into_boxed_slice();
    Self {
      shards,
      hasher,
      tracking: RwLock::new(HashMap::with_hasher(ahash::RandomState::new())),
      locks: Mutex::new(HashSet::new()),
      revisions: RwLock::new(HashMap::with_hasher(ahash::RandomState::new())),
    }
  }

  #[inline]
  fn shard(&self, key: &str) -> &Shard {
    let hash = hash_key(&self.hasher, key);
    let index = hash as usize & (self.shards.len() - 1);
    &self.shards[index]
  }
}

impl Default for MemoryProvider {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheProvider for MemoryProvider {
  fn retrieve(&self, key: &str) -> Option<CachedValue> {
    self.shard(key).read().get(key).cloned()
  }

  fn retrieve_many(&self, keys: &[String]) -> HashMap<String, CachedValue> {
    let mut out = HashMap::with_capacity(keys.len());
    for key in keys {
      if let Some(value) = self.shard(key).read().get(key) {
        out.insert(key.clone(), value.clone());
      }
    }
    out
  }

  fn save(&self, key: &str, value: CachedValue) -> bool {
    self.shard(key).write().insert(key.to_string(), value);
    true
  }

  fn save_many(&self, entries: HashMap<String, CachedValue>) -> bool {
    for (key, value) in entries {
      self.shard(&key).write().insert(key, value);
    }
    true
  }

  fn clear(&self, key: &str) -> bool {
    self.shard(key).write().remove(key).is_some()
  }

  fn add_new(&self, key: &str, value: CachedValue) -> bool {
    match self.shard(key).write().entry(key.to_string()) {
      Entry::Occupied(_) => false,
      Entry::Vacant(slot) => {
        slot.insert(value);
        true
      }
    }
  }

  fn is_distributed(&self) -> bool {
    false
  }

  fn is_out_of_process(&self) -> bool {
    false
  }

  fn stale(&self) -> Option<&dyn StaleRead> {
    Some(self)
  }

  fn persistent(&self) -> Option<&dyn Persistent> {
    Some(self)
  }

  fn revisions(&self) -> Option<&dyn RevisionStore> {
    Some(self)
  }
}

// In-process values have no stale/fresh distinction; the live value is the
// stale value.
impl StaleRead for MemoryProvider {
  fn retrieve_stale(&self, key: &str) -> Option<CachedValue> {
    self.retrieve(key)
  }

  fn retrieve_stale_many(&self, keys: &[String]) -> HashMap<String, CachedValue> {
    self.retrieve_many(keys)
  }
}

impl Persistent for MemoryProvider {
  fn append(&self, key: &str, suffix: &str) -> bool {
    let mut guard = self.tracking.write();
    let entry = guard.entry(key.to_string()).or_insert_with(|| (String::new(), 0));
    entry.0.push_str(suffix);
    entry.1 += 1;
    true
  }

  fn retrieve_versioned(&self, key: &str) -> Option<(String, u64)> {
    self.tracking.read().get(key).cloned()
  }

  fn save_versioned(&self, key: &str, value: &str, version: u64) -> bool {
    let mut guard = self.tracking.write();
    match guard.entry(key.to_string()) {
      Entry::Occupied(mut slot) => {
        if slot.get().1 != version {
          return false;
        }
        let stored = slot.get_mut();
        stored.0 = value.to_string();
        stored.1 += 1;
        true
      }
      Entry::Vacant(slot) => {
        if version != 0 {
          return false;
        }
        slot.insert((value.to_string(), 1));
        true
      }
    }
  }

  fn try_acquire_lock(&self, name: &str) -> bool {
    self.locks.lock().insert(name.to_string())
  }

  fn release_lock(&self, name: &str) {
    self.locks.lock().remove(name);
  }
}

impl RevisionStore for MemoryProvider {
  fn get_revisions(&self, subspace_keys: &[String]) -> HashMap<String, u64> {
    let guard = self.revisions.read();
    let mut out = HashMap::with_capacity(subspace_keys.len());
    for key in subspace_keys {
      if let Some(revision) = guard.get(key) {
        out.insert(key.clone(), *revision);
      }
    }
    out
  }

  fn increment_revision(&self, subspace_key: &str) {
    let mut guard = self.revisions.write();
    *guard.entry(subspace_key.to_string()).or_insert(0) += 1;
  }
}
