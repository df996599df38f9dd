//! The cache coordinator.
//!
//! Orchestrates lookup, population, removal and invalidation for every
//! registered record type against that type's provider. Population is
//! protected against thundering herds: local backends get a per-key mutex
//! (single flight), distributed backends with stale-read support get a
//! named lock with stale fallback, and distributed backends without stale
//! reads populate unlocked, accepting redundant work under contention.

use crate::error::CacheError;
use crate::key;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::params::Param;
use crate::provider::{CacheProvider, CachedValue, Persistent};
use crate::record::{ChangeKind, InvalidationMode, PolicyRegistry, Record, TypePolicy};
use crate::revision;
use crate::runtime::TaskSpawner;
use crate::subspace;
use crate::tracker::{self, TrackingScope};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A cached entity together with the key it is stored under.
#[derive(Clone, Debug)]
pub struct CacheItem<R> {
  pub key: String,
  pub record: Arc<R>,
}

/// The outcome of a population call.
#[derive(Debug)]
pub struct Population<R> {
  /// The query's items, freshly retrieved or served from cache.
  pub items: Vec<CacheItem<R>>,
  /// The query's item-key index, in result order.
  pub item_keys: Vec<String>,
  /// Whether the result is (now) present in the cache.
  pub cached: bool,
  /// Whether a stale snapshot was served because the population lock was
  /// contended.
  pub stale: bool,
}

/// Optional knobs for a population call.
#[derive(Clone, Debug, Default)]
pub struct AddOptions {
  pub operation: Option<String>,
  pub discriminator: Option<String>,
  pub force: bool,
}

impl AddOptions {
  pub fn operation(mut self, operation: impl Into<String>) -> Self {
    self.operation = Some(operation.into());
    self
  }

  pub fn discriminator(mut self, discriminator: impl Into<String>) -> Self {
    self.discriminator = Some(discriminator.into());
    self
  }

  /// Invoke the retrieval function even when a cached index exists.
  pub fn force(mut self) -> Self {
    self.force = true;
    self
  }
}

/// Releases a distributed population lock on every exit path.
struct NamedLockGuard<'a> {
  provider: &'a dyn Persistent,
  name: &'a str,
}

impl Drop for NamedLockGuard<'_> {
  fn drop(&mut self) {
    self.provider.release_lock(self.name);
  }
}

/// The engine's front door, built via [`CoordinatorBuilder`].
///
/// [`CoordinatorBuilder`]: crate::CoordinatorBuilder
pub struct Coordinator {
  pub(crate) providers: HashMap<String, Arc<dyn CacheProvider>>,
  pub(crate) policies: PolicyRegistry,
  pub(crate) local_locks: Mutex<HashMap<String, Arc<Mutex<()>>, ahash::RandomState>>,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
  pub(crate) metrics: Arc<Metrics>,
}

impl fmt::Debug for Coordinator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Coordinator")
      .field("providers", &self.providers.len())
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl Coordinator {
  pub fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }

  /// The cache key a query over `R` with these parameters resolves to.
  ///
  /// Under revision-based invalidation the key embeds the current revision
  /// vector of the query's subspaces, so it changes whenever one of them is
  /// bumped.
  pub fn query_key<R: Record>(
    &self,
    params: &[Param],
    operation: Option<&str>,
  ) -> Result<String, CacheError> {
    let (provider, policy) = self.resolve::<R>()?;
    Ok(self.build_query_key::<R>(provider.as_ref(), policy, params, operation, None))
  }

  /// Resolves a query cache entry to its item-key index.
  pub fn lookup_keys<R: Record>(
    &self,
    query_key: &str,
    stale: bool,
  ) -> Result<Option<Vec<String>>, CacheError> {
    let (provider, _) = self.resolve::<R>()?;
    Ok(self.read_index(provider.as_ref(), query_key, stale))
  }

  /// Batched item fetch, preserving the caller's key order.
  ///
  /// A fresh (`stale == false`) lookup is all-or-nothing: any missing or
  /// undecodable item turns the whole call into a miss. Stale lookups
  /// accept partial results.
  pub fn lookup<R>(&self, keys: &[String], stale: bool) -> Result<Option<Vec<CacheItem<R>>>, CacheError>
  where
    R: Record + DeserializeOwned,
  {
    let (provider, _) = self.resolve::<R>()?;
    let items = self.read_items::<R>(provider.as_ref(), keys, stale);
    match &items {
      Some(_) => self.metrics.hits.fetch_add(1, Ordering::Relaxed),
      None => self.metrics.misses.fetch_add(1, Ordering::Relaxed),
    };
    Ok(items)
  }

  /// Fetches or populates the result of a query.
  ///
  /// On a miss the retrieval function runs under the strongest coordination
  /// primitive the provider offers; see the module docs for the three
  /// population regimes. A save failure still returns the retrieved items
  /// with `cached == false` — cache trouble never fails the read path.
  pub fn add<R, F>(
    &self,
    params: &[Param],
    retrieve: F,
    options: AddOptions,
    scope: Option<&mut TrackingScope>,
  ) -> Result<Population<R>, CacheError>
  where
    R: Record + Serialize + DeserializeOwned,
    F: FnOnce() -> Vec<R>,
  {
    let (provider, policy) = self.resolve::<R>()?;
    let query_key = self.build_query_key::<R>(
      provider.as_ref(),
      policy,
      params,
      options.operation.as_deref(),
      options.discriminator.as_deref(),
    );

    if provider.is_distributed() {
      if let Some(persistent) = provider.persistent() {
        if provider.stale().is_some() {
          if persistent.try_acquire_lock(&query_key) {
            let _lock = NamedLockGuard {
              provider: persistent,
              name: &query_key,
            };
            return Ok(self.populate::<R, F>(
              provider, policy, &query_key, params, retrieve, options.force, scope,
            ));
          }
          // Another populator is already working; degrade to the last
          // known snapshot instead of stacking redundant retrievals.
          self.metrics.lock_contentions.fetch_add(1, Ordering::Relaxed);
          debug!("population lock for {} contended; serving stale snapshot", query_key);
          let keys = match self.read_index(provider.as_ref(), &query_key, true) {
            Some(keys) => keys,
            None => {
              return Ok(Population {
                items: Vec::new(),
                item_keys: Vec::new(),
                cached: false,
                stale: true,
              })
            }
          };
          let items = self
            .read_items::<R>(provider.as_ref(), &keys, true)
            .unwrap_or_default();
          self.metrics.stale_hits.fetch_add(1, Ordering::Relaxed);
          return Ok(Population {
            items,
            item_keys: keys,
            cached: true,
            stale: true,
          });
        }
      }
      // No stale-read capability means no usable coordination primitive;
      // populate unlocked and accept redundant work under contention.
      return Ok(self.populate::<R, F>(
        provider, policy, &query_key, params, retrieve, options.force, scope,
      ));
    }

    // Local backend: single flight through a per-key mutex. The lock map
    // only grows, bounded by the cardinality of distinct query shapes.
    let key_lock = {
      let mut locks = self.local_locks.lock();
      locks
        .entry(query_key.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
    };
    let _guard = key_lock.lock();
    Ok(self.populate::<R, F>(
      provider, policy, &query_key, params, retrieve, options.force, scope,
    ))
  }

  /// Caches a single item with insert-if-absent semantics.
  pub fn add_item<R>(&self, record: R) -> Result<bool, CacheError>
  where
    R: Record + Serialize,
  {
    let (provider, _) = self.resolve::<R>()?;
    let record = Arc::new(record);
    let item_key = key::item_key(record.as_ref());
    match encode_record(provider.as_ref(), &record) {
      Some(value) => Ok(provider.add_new(&item_key, value)),
      None => Ok(false),
    }
  }

  /// Unconditionally overwrites an item's cached value.
  pub fn modify_item<R>(&self, record: R) -> Result<bool, CacheError>
  where
    R: Record + Serialize,
  {
    let (provider, _) = self.resolve::<R>()?;
    let record = Arc::new(record);
    let item_key = key::item_key(record.as_ref());
    match encode_record(provider.as_ref(), &record) {
      Some(value) => Ok(provider.save(&item_key, value)),
      None => Ok(false),
    }
  }

  /// Clears a query entry.
  pub fn remove_query<R: Record>(&self, query_key: &str) -> Result<bool, CacheError> {
    let (provider, _) = self.resolve::<R>()?;
    Ok(provider.clear(query_key))
  }

  /// Clears an item entry and invalidates the queries its removal affects.
  pub fn remove_item<R: Record>(&self, record: &R) -> Result<bool, CacheError> {
    let (provider, policy) = self.resolve::<R>()?;
    let cleared = provider.clear(&key::item_key(record));
    let pairs = subspace::record_pairs::<R>(policy, record, ChangeKind::Delete);
    self.invalidate_pairs::<R>(provider, policy, &pairs);
    Ok(cleared)
  }

  /// Invalidates the query subspaces implied by an explicit parameter set.
  ///
  /// Wildcard parameter values expand to their generic variants, so a
  /// wildcard invalidation reaches queries pinned to any concrete value of
  /// that property.
  pub fn invalidate<R: Record>(&self, params: &[Param]) -> Result<(), CacheError> {
    let (provider, policy) = self.resolve::<R>()?;
    let pairs = subspace::query_pairs::<R>(policy, params);
    self.invalidate_pairs::<R>(provider, policy, &pairs);
    Ok(())
  }

  /// Invalidates the query subspaces a changed entity instance could have
  /// affected.
  pub fn invalidate_record<R: Record>(
    &self,
    record: &R,
    change: ChangeKind,
  ) -> Result<(), CacheError> {
    let (provider, policy) = self.resolve::<R>()?;
    let pairs = subspace::record_pairs::<R>(policy, record, change);
    self.invalidate_pairs::<R>(provider, policy, &pairs);
    Ok(())
  }

  /// Writes out every tracking registration deferred into the scope.
  pub fn flush(&self, scope: &mut TrackingScope) {
    for pending in scope.drain() {
      tracker::track_query(
        pending.provider.as_ref(),
        &self.metrics,
        &pending.query_key,
        &pending.subspace_keys,
      );
    }
  }

  // --- Internals ---

  fn resolve<R: Record>(&self) -> Result<(&Arc<dyn CacheProvider>, &TypePolicy), CacheError> {
    let policy = self
      .policies
      .get(R::TYPE_NAME)
      .ok_or(CacheError::UnknownType(R::TYPE_NAME))?;
    let provider = self
      .providers
      .get(&policy.provider)
      .ok_or_else(|| CacheError::UnknownProvider(policy.provider.clone()))?;
    Ok((provider, policy))
  }

  fn build_query_key<R: Record>(
    &self,
    provider: &dyn CacheProvider,
    policy: &TypePolicy,
    params: &[Param],
    operation: Option<&str>,
    discriminator: Option<&str>,
  ) -> String {
    let base = key::query_key(R::TYPE_NAME, params, operation, discriminator);
    if policy.invalidation == InvalidationMode::Revision {
      if let Some(store) = provider.revisions() {
        let pairs = subspace::query_pairs::<R>(policy, params);
        let variants = subspace::lookup_variants(R::TYPE_NAME, &pairs);
        if !variants.is_empty() {
          let vector = revision::current(store, &variants);
          return key::with_revisions(&base, &vector);
        }
      }
    }
    base
  }

  fn read_index(
    &self,
    provider: &dyn CacheProvider,
    query_key: &str,
    stale: bool,
  ) -> Option<Vec<String>> {
    let value = if stale {
      provider.stale()?.retrieve_stale(query_key)?
    } else {
      provider.retrieve(query_key)?
    };
    match value {
      CachedValue::Index(keys) => Some(keys.to_vec()),
      _ => None,
    }
  }

  fn read_items<R>(
    &self,
    provider: &dyn CacheProvider,
    keys: &[String],
    stale: bool,
  ) -> Option<Vec<CacheItem<R>>>
  where
    R: Record + DeserializeOwned,
  {
    if keys.is_empty() {
      return Some(Vec::new());
    }
    let fetched: HashMap<String, CachedValue> = if keys.len() == 1 {
      let key = &keys[0];
      let value = if stale {
        provider.stale().and_then(|s| s.retrieve_stale(key))
      } else {
        provider.retrieve(key)
      };
      let mut map = HashMap::with_capacity(1);
      if let Some(value) = value {
        map.insert(key.clone(), value);
      }
      map
    } else if stale {
      match provider.stale() {
        Some(s) => s.retrieve_stale_many(keys),
        None => HashMap::new(),
      }
    } else {
      provider.retrieve_many(keys)
    };

    // Multi-get backends do not guarantee response order; rebuild the
    // result in the caller's key order.
    let mut items = Vec::with_capacity(keys.len());
    for key in keys {
      if let Some(record) = fetched.get(key).and_then(|v| decode_record::<R>(v)) {
        items.push(CacheItem {
          key: key.clone(),
          record,
        });
      }
    }
    if !stale && items.len() != keys.len() {
      return None;
    }
    Some(items)
  }

  fn populate<R, F>(
    &self,
    provider: &Arc<dyn CacheProvider>,
    policy: &TypePolicy,
    query_key: &str,
    params: &[Param],
    retrieve: F,
    force: bool,
    scope: Option<&mut TrackingScope>,
  ) -> Population<R>
  where
    R: Record + Serialize + DeserializeOwned,
    F: FnOnce() -> Vec<R>,
  {
    if !force {
      if let Some(keys) = self.read_index(provider.as_ref(), query_key, false) {
        if let Some(items) = self.read_items::<R>(provider.as_ref(), &keys, false) {
          self.metrics.hits.fetch_add(1, Ordering::Relaxed);
          return Population {
            items,
            item_keys: keys,
            cached: true,
            stale: false,
          };
        }
      }
    }
    self.metrics.misses.fetch_add(1, Ordering::Relaxed);
    let records = retrieve();
    self.metrics.populations.fetch_add(1, Ordering::Relaxed);

    let mut item_keys = Vec::with_capacity(records.len());
    let mut items = Vec::with_capacity(records.len());
    let mut entries: HashMap<String, CachedValue> = HashMap::with_capacity(records.len());
    let mut encodable = true;
    for record in records {
      let record = Arc::new(record);
      let item_key = key::item_key(record.as_ref());
      if entries.contains_key(&item_key) {
        self.metrics.key_collisions.fetch_add(1, Ordering::Relaxed);
        warn!(
          "distinct {} items collided on cache key {}; last write wins",
          R::TYPE_NAME,
          item_key
        );
      }
      match encode_record(provider.as_ref(), &record) {
        Some(value) => {
          entries.insert(item_key.clone(), value);
        }
        None => encodable = false,
      }
      item_keys.push(item_key.clone());
      items.push(CacheItem {
        key: item_key,
        record,
      });
    }

    let saved = encodable && (entries.is_empty() || provider.save_many(entries));
    let mut cached = false;
    if !saved {
      warn!("saving items for {} failed; result not cached", query_key);
    } else if !provider.save(query_key, CachedValue::Index(item_keys.clone().into())) {
      // The item writes landed but the index did not; leaving the query
      // record absent keeps it from referencing keys that may yet vanish.
      warn!("saving index for {} failed; result not cached", query_key);
    } else {
      cached = true;
      self.after_population::<R>(provider, policy, query_key, params, scope);
    }

    Population {
      items,
      item_keys,
      cached,
      stale: false,
    }
  }

  /// Registers a freshly populated query for key-tracking invalidation,
  /// either into the caller's scope or as background work.
  fn after_population<R: Record>(
    &self,
    provider: &Arc<dyn CacheProvider>,
    policy: &TypePolicy,
    query_key: &str,
    params: &[Param],
    scope: Option<&mut TrackingScope>,
  ) {
    // Revision-mode queries embed their revision vector in the key; there
    // is nothing to persist after population.
    if policy.invalidation != InvalidationMode::KeyTracking || !policy.trackable {
      return;
    }
    let pairs = subspace::query_pairs::<R>(policy, params);
    let subspace_keys = subspace::lookup_variants(R::TYPE_NAME, &pairs);
    if subspace_keys.is_empty() {
      return;
    }
    if let Some(scope) = scope {
      scope.defer(provider.clone(), query_key.to_string(), subspace_keys);
      return;
    }
    let provider = provider.clone();
    let metrics = self.metrics.clone();
    let query_key = query_key.to_string();
    self.spawner.spawn(Box::new(move || {
      tracker::track_query(provider.as_ref(), &metrics, &query_key, &subspace_keys);
    }));
  }

  fn invalidate_pairs<R: Record>(
    &self,
    provider: &Arc<dyn CacheProvider>,
    policy: &TypePolicy,
    pairs: &[Param],
  ) {
    if pairs.is_empty() {
      // No subspace-level invalidation is possible; whole-type
      // invalidation is the caller's concern.
      return;
    }
    self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
    match policy.invalidation {
      InvalidationMode::Revision => {
        if let Some(store) = provider.revisions() {
          let bumped = revision::bump(store, R::TYPE_NAME, pairs);
          self.metrics.revision_bumps.fetch_add(bumped as u64, Ordering::Relaxed);
        }
      }
      InvalidationMode::KeyTracking => {
        let persistent = match provider.persistent() {
          Some(p) => p,
          None => return,
        };
        for subspace_key in subspace::invalidation_variants(R::TYPE_NAME, pairs) {
          let tracked = tracker::tracked_queries(persistent, &subspace_key);
          if tracked.is_empty() {
            continue;
          }
          for query_key in &tracked {
            provider.clear(query_key);
          }
          // Best-effort reset of the record itself; a lost race just
          // leaves keys behind for a later compaction.
          if let Some((_, version)) = persistent.retrieve_versioned(&subspace_key) {
            persistent.save_versioned(&subspace_key, "", version);
          }
        }
      }
    }
  }
}

fn encode_record<R>(provider: &dyn CacheProvider, record: &Arc<R>) -> Option<CachedValue>
where
  R: Record + Serialize,
{
  if provider.is_out_of_process() {
    match bincode::serialize(record.as_ref()) {
      Ok(bytes) => Some(CachedValue::Payload(bytes.into())),
      Err(err) => {
        warn!("failed to encode {} payload: {}", R::TYPE_NAME, err);
        None
      }
    }
  } else {
    Some(CachedValue::Object(record.clone() as Arc<dyn Any + Send + Sync>))
  }
}

fn decode_record<R>(value: &CachedValue) -> Option<Arc<R>>
where
  R: Record + DeserializeOwned,
{
  match value {
    CachedValue::Object(object) => object.clone().downcast::<R>().ok(),
    CachedValue::Payload(bytes) => bincode::deserialize::<R>(bytes).ok().map(Arc::new),
    _ => None,
  }
}
