mod common;

use common::{customers_abc, revision_coordinator, Customer};
use datamap_cache::{
  AddOptions, CacheProvider, ChangeKind, CoordinatorBuilder, InvalidationMode, MemoryProvider,
  Param, Population, TypePolicy,
};

use std::sync::Arc;

#[test]
fn test_revision_bump_orphans_the_previous_query_key() {
  let (coordinator, _provider) = revision_coordinator();
  let params = [Param::new("CompanyName", "A")];

  let population: Population<Customer> = coordinator
    .add(&params, customers_abc, AddOptions::default(), None)
    .unwrap();
  assert!(population.cached);

  let key_before = coordinator.query_key::<Customer>(&params, None).unwrap();
  assert!(coordinator
    .lookup_keys::<Customer>(&key_before, false)
    .unwrap()
    .is_some());

  // An update to a Customer with CompanyName="A" bumps the pinned and the
  // unfiltered subspace; the recomputed key no longer reaches the entry.
  coordinator
    .invalidate_record(&Customer::new(1, "A", "Aachen"), ChangeKind::Update)
    .unwrap();

  let key_after = coordinator.query_key::<Customer>(&params, None).unwrap();
  assert_ne!(key_before, key_after);
  assert!(coordinator
    .lookup_keys::<Customer>(&key_after, false)
    .unwrap()
    .is_none());

  // The orphaned entry is still reachable under the old key; reclaiming it
  // is the backend's eviction policy's job.
  assert!(coordinator
    .lookup_keys::<Customer>(&key_before, false)
    .unwrap()
    .is_some());
}

#[test]
fn test_unrelated_subspaces_stay_valid() {
  let (coordinator, _provider) = revision_coordinator();
  let params_a = [Param::new("CompanyName", "A")];
  let params_b = [Param::new("CompanyName", "B")];

  let _a: Population<Customer> = coordinator
    .add(&params_a, customers_abc, AddOptions::default(), None)
    .unwrap();
  let _b: Population<Customer> = coordinator
    .add(&params_b, customers_abc, AddOptions::default(), None)
    .unwrap();

  let key_b_before = coordinator.query_key::<Customer>(&params_b, None).unwrap();

  coordinator
    .invalidate_record(&Customer::new(1, "A", "Aachen"), ChangeKind::Update)
    .unwrap();

  let key_b_after = coordinator.query_key::<Customer>(&params_b, None).unwrap();
  assert_eq!(key_b_before, key_b_after, "B's subspaces were not bumped");
  assert!(coordinator
    .lookup_keys::<Customer>(&key_b_after, false)
    .unwrap()
    .is_some());
}

#[test]
fn test_unfiltered_query_is_invalidated_by_any_update() {
  let (coordinator, _provider) = revision_coordinator();
  let no_params: [Param; 0] = [];

  let population: Population<Customer> = coordinator
    .add(&no_params, customers_abc, AddOptions::default(), None)
    .unwrap();
  assert!(population.cached);

  let key_before = coordinator.query_key::<Customer>(&no_params, None).unwrap();

  coordinator
    .invalidate_record(&Customer::new(2, "Apex", "Austin"), ChangeKind::Update)
    .unwrap();

  let key_after = coordinator.query_key::<Customer>(&no_params, None).unwrap();
  assert_ne!(
    key_before, key_after,
    "a query with no CompanyName filter depends on the unfiltered subspace"
  );
}

#[test]
fn test_explicit_wildcard_invalidation_reaches_pinned_queries() {
  let (coordinator, _provider) = revision_coordinator();
  let params = [Param::new("CompanyName", "A")];

  let _population: Population<Customer> = coordinator
    .add(&params, customers_abc, AddOptions::default(), None)
    .unwrap();
  let key_before = coordinator.query_key::<Customer>(&params, None).unwrap();

  coordinator
    .invalidate::<Customer>(&[Param::wildcard("CompanyName")])
    .unwrap();

  let key_after = coordinator.query_key::<Customer>(&params, None).unwrap();
  assert_ne!(key_before, key_after);
}

#[test]
fn test_derived_dependencies_insert_reaches_key_pinned_queries() {
  // No declared dependencies: the subspaces span all persistent properties.
  let provider = Arc::new(MemoryProvider::with_shards(4));
  let coordinator = CoordinatorBuilder::new()
    .provider("memory", provider as Arc<dyn CacheProvider>)
    .policy::<Customer>(TypePolicy::new("memory").invalidation(InvalidationMode::Revision))
    .build()
    .unwrap();

  let id_params = [Param::new("Id", 1u32)];
  let key_before = coordinator.query_key::<Customer>(&id_params, None).unwrap();

  // Inserting Id=1 must reach queries pinned to Id through the generic
  // subspace, even though the new key itself is left wildcarded.
  coordinator
    .invalidate_record(&Customer::new(1, "Acme", "Aachen"), ChangeKind::Insert)
    .unwrap();

  let key_after = coordinator.query_key::<Customer>(&id_params, None).unwrap();
  assert_ne!(key_before, key_after);
}

#[test]
fn test_derived_dependencies_update_misses_other_key_values() {
  let provider = Arc::new(MemoryProvider::with_shards(4));
  let coordinator = CoordinatorBuilder::new()
    .provider("memory", provider as Arc<dyn CacheProvider>)
    .policy::<Customer>(TypePolicy::new("memory").invalidation(InvalidationMode::Revision))
    .build()
    .unwrap();

  let id_params = [Param::new("Id", 1u32)];
  let key_before = coordinator.query_key::<Customer>(&id_params, None).unwrap();

  coordinator
    .invalidate_record(&Customer::new(2, "Apex", "Austin"), ChangeKind::Update)
    .unwrap();

  let key_after = coordinator.query_key::<Customer>(&id_params, None).unwrap();
  assert_eq!(key_before, key_after, "an update to Id=2 cannot affect Id=1 filters");
}

#[test]
fn test_invalidation_metrics_count_bumps() {
  let (coordinator, _provider) = revision_coordinator();

  coordinator
    .invalidate_record(&Customer::new(1, "A", "Aachen"), ChangeKind::Update)
    .unwrap();

  let metrics = coordinator.metrics();
  assert_eq!(metrics.invalidations, 1);
  // One pinned subspace plus the unfiltered one.
  assert_eq!(metrics.revision_bumps, 2);
}
