mod common;

use common::{customers_abc, tracked_coordinator, Customer};
use datamap_cache::{subspace, tracker, AddOptions, CacheProvider, Param, Population, TrackingScope};

use std::collections::BTreeSet;

#[test]
fn test_append_then_read_deduplicates() {
  let (_, provider) = tracked_coordinator();
  let persistent = provider.persistent().unwrap();
  assert!(persistent.append("Customer::s1", ",k1"));
  assert!(persistent.append("Customer::s1", ",k2"));
  assert!(persistent.append("Customer::s1", ",k1"));

  let tracked = tracker::tracked_queries(persistent, "Customer::s1");
  assert_eq!(tracked, vec!["k1".to_string(), "k2".to_string()]);
}

#[test]
fn test_duplicate_ratio_triggers_compaction_on_read() {
  let (_, provider) = tracked_coordinator();
  let persistent = provider.persistent().unwrap();
  // Two duplicates out of five entries: ratio 0.4, above the 0.3 threshold.
  assert!(persistent.append("Customer::s1", ",k1,k2,k1,k3,k1"));

  let tracked = tracker::tracked_queries(persistent, "Customer::s1");
  assert_eq!(
    tracked,
    vec!["k1".to_string(), "k2".to_string(), "k3".to_string()]
  );

  let (stored, _) = persistent.retrieve_versioned("Customer::s1").unwrap();
  assert_eq!(stored, ",k1,k2,k3", "the read should have compacted the record");
}

#[test]
fn test_low_duplicate_ratio_leaves_the_record_alone() {
  let (_, provider) = tracked_coordinator();
  let persistent = provider.persistent().unwrap();
  // One duplicate out of four entries: ratio 0.25, below the threshold.
  assert!(persistent.append("Customer::s1", ",k1,k2,k3,k1"));

  let tracked = tracker::tracked_queries(persistent, "Customer::s1");
  assert_eq!(tracked.len(), 3);

  let (stored, version) = persistent.retrieve_versioned("Customer::s1").unwrap();
  assert_eq!(stored, ",k1,k2,k3,k1");
  assert_eq!(version, 1);
}

#[test]
fn test_compaction_is_idempotent() {
  let (_, provider) = tracked_coordinator();
  let persistent = provider.persistent().unwrap();
  assert!(persistent.append("Customer::s1", ",k1,k2,k1,k3,k1"));

  let first = tracker::compact_query_keys(persistent, "Customer::s1", 1, None, None);
  let stored_after_first = persistent.retrieve_versioned("Customer::s1").unwrap().0;
  let second = tracker::compact_query_keys(persistent, "Customer::s1", 1, None, None);

  assert_eq!(first, second);
  assert_eq!(
    stored_after_first,
    persistent.retrieve_versioned("Customer::s1").unwrap().0
  );
  let expected: BTreeSet<String> = ["k1", "k2", "k3"].iter().map(|s| s.to_string()).collect();
  assert_eq!(first, expected);
}

#[test]
fn test_stale_fast_path_falls_back_to_retry_loop() {
  let (_, provider) = tracked_coordinator();
  let persistent = provider.persistent().unwrap();
  assert!(persistent.append("Customer::s1", ",k1,k2,k1"));

  // The snapshot's version 0 is stale (the append made it 1), so the fast
  // path write must lose and the retry loop must pick up the live record.
  let set = tracker::compact_query_keys(
    persistent,
    "Customer::s1",
    1,
    Some("k4"),
    Some((",k1,k2,k1", 0)),
  );
  assert!(set.contains("k4"));

  let (stored, _) = persistent.retrieve_versioned("Customer::s1").unwrap();
  assert_eq!(stored, ",k1,k2,k4");
}

#[test]
fn test_compaction_creates_a_missing_record() {
  let (_, provider) = tracked_coordinator();
  let persistent = provider.persistent().unwrap();

  let set = tracker::compact_query_keys(persistent, "Customer::fresh", 1, Some("k9"), None);
  assert_eq!(set.len(), 1);
  assert!(set.contains("k9"));

  let (stored, version) = persistent.retrieve_versioned("Customer::fresh").unwrap();
  assert_eq!(stored, ",k9");
  assert_eq!(version, 1);
}

#[test]
fn test_population_registers_under_every_lookup_variant() {
  let (coordinator, provider) = tracked_coordinator();
  let params = [Param::new("CompanyName", "Acme")];

  let population: Population<Customer> = coordinator
    .add(&params, customers_abc, AddOptions::default(), None)
    .unwrap();
  assert!(population.cached);

  let query_key = coordinator.query_key::<Customer>(&params, None).unwrap();
  let variants = subspace::lookup_variants("Customer", &params);
  let persistent = provider.persistent().unwrap();
  for variant in &variants {
    assert_eq!(
      tracker::tracked_queries(persistent, variant),
      vec![query_key.clone()]
    );
  }
}

#[test]
fn test_scope_defers_tracking_until_flush() {
  let (coordinator, provider) = tracked_coordinator();
  let params = [Param::new("CompanyName", "Acme")];
  let mut scope = TrackingScope::new();

  let population: Population<Customer> = coordinator
    .add(&params, customers_abc, AddOptions::default(), Some(&mut scope))
    .unwrap();
  assert!(population.cached);
  assert_eq!(scope.len(), 1);

  let variants = subspace::lookup_variants("Customer", &params);
  let persistent = provider.persistent().unwrap();
  assert!(tracker::tracked_queries(persistent, &variants[0]).is_empty());

  coordinator.flush(&mut scope);
  assert!(scope.is_empty());

  let query_key = coordinator.query_key::<Customer>(&params, None).unwrap();
  assert_eq!(
    tracker::tracked_queries(persistent, &variants[0]),
    vec![query_key]
  );
}
