//! Deterministic cache-key computation.
//!
//! A cache key is `<TypeName>/<hash>` where the hash covers the canonical
//! text of the sorted `name=value` parameter pairs plus the optional
//! operation name and return-type discriminator. The same type, the same
//! parameter multiset and the same operation always produce the same key,
//! regardless of the order the caller supplied the parameters in.

use crate::params::{Param, ParamValue};
use crate::record::Record;

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Computes the cache key identifying a query result.
///
/// Duplicate parameter names resolve last-write-wins before sorting, so the
/// canonical text is independent of caller ordering.
pub fn query_key(
  type_name: &str,
  params: &[Param],
  operation: Option<&str>,
  discriminator: Option<&str>,
) -> String {
  let mut by_name: BTreeMap<&str, &ParamValue> = BTreeMap::new();
  for param in params {
    by_name.insert(param.name.as_str(), &param.value);
  }

  let mut text = String::new();
  for (name, value) in &by_name {
    let _ = write!(text, "{}={};", name, value);
  }
  if let Some(operation) = operation {
    let _ = write!(text, "op={};", operation);
  }
  if let Some(discriminator) = discriminator {
    let _ = write!(text, "ret={};", discriminator);
  }

  format!("{}/{:016x}", type_name, rapidhash::rapidhash(text.as_bytes()))
}

/// Computes the cache key identifying a single entity instance.
///
/// Only the primary-key property values participate, never the full
/// property set.
pub fn item_key<R: Record>(record: &R) -> String {
  query_key(R::TYPE_NAME, &record.primary_key(), None, None)
}

/// Folds a revision vector into a query key.
///
/// Under revision-based invalidation the coordinator appends the current
/// per-subspace revisions to the lookup key; a bumped revision then yields a
/// different key and the previously-cached entry silently misses.
pub fn with_revisions(key: &str, revisions: &[u64]) -> String {
  let mut out = String::with_capacity(key.len() + 2 + revisions.len() * 4);
  out.push_str(key);
  out.push_str("@r");
  for (i, revision) in revisions.iter().enumerate() {
    if i > 0 {
      out.push('.');
    }
    let _ = write!(out, "{}", revision);
  }
  out
}
