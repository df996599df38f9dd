//! Revision-based invalidation.
//!
//! Each subspace carries a monotonic counter. Query keys embed the current
//! revisions of the subspaces they depend on, so incrementing a counter
//! makes every previously-issued key for that subspace unreachable. Old
//! entries are never deleted; reclaiming them is the backend's eviction
//! policy's job.

use crate::params::Param;
use crate::provider::RevisionStore;
use crate::subspace;

/// Increments the revision counter at every invalidation-rule variant of
/// the given pairs. Returns how many counters were bumped.
pub(crate) fn bump(store: &dyn RevisionStore, type_name: &str, pairs: &[Param]) -> usize {
  let variants = subspace::invalidation_variants(type_name, pairs);
  for variant in &variants {
    store.increment_revision(variant);
  }
  variants.len()
}

/// The current revision of each given subspace key, in order. Counters that
/// were never incremented read as 0.
pub(crate) fn current(store: &dyn RevisionStore, subspace_keys: &[String]) -> Vec<u64> {
  let found = store.get_revisions(subspace_keys);
  subspace_keys
    .iter()
    .map(|key| found.get(key).copied().unwrap_or(0))
    .collect()
}
