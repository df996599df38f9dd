//! Query-key tracking.
//!
//! Under key-tracking invalidation every populated query registers its cache
//! key in a comma-delimited record at each of its lookup-rule subspace keys.
//! An invalidation later reads those records and clears the listed queries.
//! Tracking is best-effort throughout: query-result correctness never
//! depends on it, so lost appends and exhausted conditional-write retries
//! degrade silently.

use crate::metrics::Metrics;
use crate::provider::{CacheProvider, Persistent};

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, warn};

/// Fraction of duplicate entries in a tracking record that triggers
/// opportunistic compaction during a read.
const COMPACTION_DUPLICATE_RATIO: f64 = 0.3;

/// Conditional-write retries after the first attempt.
const DEFAULT_COMPACTION_RETRIES: u32 = 1;

/// An explicit batching buffer for tracking writes.
///
/// A caller that wants to batch many cache writes inside one unit of work
/// passes a scope to the population calls and flushes it once via
/// [`Coordinator::flush`](crate::Coordinator::flush). Nothing is written to
/// the backend until the flush.
#[derive(Default)]
pub struct TrackingScope {
  pending: Vec<PendingTrack>,
}

pub(crate) struct PendingTrack {
  pub(crate) provider: Arc<dyn CacheProvider>,
  pub(crate) query_key: String,
  pub(crate) subspace_keys: Vec<String>,
}

impl TrackingScope {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }

  pub(crate) fn defer(
    &mut self,
    provider: Arc<dyn CacheProvider>,
    query_key: String,
    subspace_keys: Vec<String>,
  ) {
    self.pending.push(PendingTrack {
      provider,
      query_key,
      subspace_keys,
    });
  }

  pub(crate) fn drain(&mut self) -> Vec<PendingTrack> {
    std::mem::take(&mut self.pending)
  }
}

impl std::fmt::Debug for TrackingScope {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TrackingScope")
      .field("pending", &self.pending.len())
      .finish()
  }
}

/// Appends `query_key` to the tracking record at each subspace key.
///
/// A failed append falls back to folding the key in through the
/// conditional-write path.
pub(crate) fn track_query(
  provider: &dyn CacheProvider,
  metrics: &Metrics,
  query_key: &str,
  subspace_keys: &[String],
) {
  let persistent = match provider.persistent() {
    Some(p) => p,
    None => return,
  };
  for subspace_key in subspace_keys {
    if persistent.append(subspace_key, &format!(",{}", query_key)) {
      metrics.tracking_appends.fetch_add(1, Ordering::Relaxed);
    } else {
      debug!(
        "append to {} failed; folding {} in via conditional write",
        subspace_key, query_key
      );
      compact_query_keys(
        persistent,
        subspace_key,
        DEFAULT_COMPACTION_RETRIES,
        Some(query_key),
        None,
      );
    }
  }
}

/// Removes duplicate entries from the tracking record at `subspace_key`,
/// optionally folding in `new_query_key`, and returns the deduplicated set.
///
/// When the caller already holds a value snapshot and its version, the fast
/// path performs a single conditional write at exactly that version. If
/// that write loses (or no snapshot was supplied), the slow path loops up
/// to `retries + 1` times re-reading the current value and writing back
/// conditionally on the version just read. Exhausting the retries returns
/// the last computed set without a success guarantee.
pub fn compact_query_keys(
  provider: &dyn Persistent,
  subspace_key: &str,
  retries: u32,
  new_query_key: Option<&str>,
  snapshot: Option<(&str, u64)>,
) -> BTreeSet<String> {
  if let Some((value, version)) = snapshot {
    let mut keys = parse_record(value);
    if let Some(query_key) = new_query_key {
      keys.insert(query_key.to_string());
    }
    if provider.save_versioned(subspace_key, &join_record(&keys), version) {
      return keys;
    }
    // The supplied version was stale; fall through to the read-retry loop.
  }

  let mut last = BTreeSet::new();
  for _ in 0..=retries {
    let (value, version) = provider
      .retrieve_versioned(subspace_key)
      .unwrap_or((String::new(), 0));
    let mut keys = parse_record(&value);
    if let Some(query_key) = new_query_key {
      keys.insert(query_key.to_string());
    }
    if provider.save_versioned(subspace_key, &join_record(&keys), version) {
      return keys;
    }
    last = keys;
  }
  warn!(
    "tracking compaction for {} lost {} conditional writes; returning best-effort set",
    subspace_key,
    retries + 1
  );
  last
}

/// The query keys tracked at `subspace_key`, deduplicated.
///
/// When the record's duplicate ratio exceeds the compaction threshold, a
/// compaction is attempted as a side effect, amortizing cleanup over reads.
pub fn tracked_queries(provider: &dyn Persistent, subspace_key: &str) -> Vec<String> {
  let (value, version) = match provider.retrieve_versioned(subspace_key) {
    Some(record) => record,
    None => return Vec::new(),
  };
  let entries: Vec<&str> = value.split(',').filter(|s| !s.is_empty()).collect();
  if entries.is_empty() {
    return Vec::new();
  }
  let unique: BTreeSet<&str> = entries.iter().copied().collect();
  let duplicates = entries.len() - unique.len();
  if duplicates as f64 / entries.len() as f64 > COMPACTION_DUPLICATE_RATIO {
    debug!(
      "tracking record {} holds {} duplicates out of {}; compacting",
      subspace_key,
      duplicates,
      entries.len()
    );
    compact_query_keys(
      provider,
      subspace_key,
      DEFAULT_COMPACTION_RETRIES,
      None,
      Some((&value, version)),
    );
  }
  unique.into_iter().map(str::to_string).collect()
}

fn parse_record(value: &str) -> BTreeSet<String> {
  value
    .split(',')
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

fn join_record(keys: &BTreeSet<String>) -> String {
  let mut out = String::new();
  for key in keys {
    out.push(',');
    out.push_str(key);
  }
  out
}
