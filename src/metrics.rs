use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the engine.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Lookup outcomes ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) stale_hits: CachePadded<AtomicU64>,

  // --- Population ---
  pub(crate) populations: CachePadded<AtomicU64>,
  pub(crate) lock_contentions: CachePadded<AtomicU64>,
  pub(crate) key_collisions: CachePadded<AtomicU64>,

  // --- Invalidation ---
  pub(crate) tracking_appends: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,
  pub(crate) revision_bumps: CachePadded<AtomicU64>,

  created_at: Instant,
}

// Manual implementation of Default to handle the non-default `Instant`.
impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      stale_hits: CachePadded::new(AtomicU64::new(0)),
      populations: CachePadded::new(AtomicU64::new(0)),
      lock_contentions: CachePadded::new(AtomicU64::new(0)),
      key_collisions: CachePadded::new(AtomicU64::new(0)),
      tracking_appends: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      revision_bumps: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      stale_hits: self.stale_hits.load(Ordering::Relaxed),
      populations: self.populations.load(Ordering::Relaxed),
      lock_contentions: self.lock_contentions.load(Ordering::Relaxed),
      key_collisions: self.key_collisions.load(Ordering::Relaxed),
      tracking_appends: self.tracking_appends.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      revision_bumps: self.revision_bumps.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the engine's metrics.
#[derive(Clone, Debug)]
pub struct MetricsSnapshot {
  /// The number of lookups served from cache.
  pub hits: u64,
  /// The number of lookups that found nothing usable.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// The number of lookups served with a stale snapshot under lock
  /// contention.
  pub stale_hits: u64,
  /// The number of times the retrieval function was invoked.
  pub populations: u64,
  /// The number of distributed population locks found already held.
  pub lock_contentions: u64,
  /// The number of distinct items that collided on one computed cache key.
  pub key_collisions: u64,
  /// The number of successful tracking-record appends.
  pub tracking_appends: u64,
  /// The number of invalidation requests processed.
  pub invalidations: u64,
  /// The number of subspace revision counters incremented.
  pub revision_bumps: u64,
  /// Seconds since the coordinator was built.
  pub uptime_secs: u64,
}
