#![allow(dead_code)]

use datamap_cache::{
  CacheProvider, CachedValue, Coordinator, CoordinatorBuilder, InlineSpawner, InvalidationMode,
  MemoryProvider, Param, Persistent, QueryDependency, Record, RevisionStore, StaleRead, TypePolicy,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  pub id: u32,
  pub company_name: String,
  pub city: String,
}

impl Customer {
  pub fn new(id: u32, company_name: &str, city: &str) -> Self {
    Self {
      id,
      company_name: company_name.to_string(),
      city: city.to_string(),
    }
  }
}

impl Record for Customer {
  const TYPE_NAME: &'static str = "Customer";

  fn field_names() -> &'static [&'static str] {
    &["Id", "CompanyName", "City"]
  }

  fn key_names() -> &'static [&'static str] {
    &["Id"]
  }

  fn fields(&self) -> Vec<Param> {
    vec![
      Param::new("Id", self.id),
      Param::new("CompanyName", self.company_name.as_str()),
      Param::new("City", self.city.as_str()),
    ]
  }
}

pub fn customers_abc() -> Vec<Customer> {
  vec![
    Customer::new(1, "Acme", "Aachen"),
    Customer::new(2, "Apex", "Austin"),
    Customer::new(3, "Atlas", "Ankara"),
  ]
}

/// Wraps the in-process provider to look like an out-of-process distributed
/// backend with stale reads, tracking records and revision counters.
pub struct DistributedMemoryProvider {
  inner: MemoryProvider,
  fail_saves: AtomicBool,
}

impl DistributedMemoryProvider {
  pub fn new() -> Self {
    Self {
      inner: MemoryProvider::with_shards(4),
      fail_saves: AtomicBool::new(false),
    }
  }

  pub fn fail_saves(&self, fail: bool) {
    self.fail_saves.store(fail, Ordering::SeqCst);
  }
}

impl CacheProvider for DistributedMemoryProvider {
  fn retrieve(&self, key: &str) -> Option<CachedValue> {
    self.inner.retrieve(key)
  }

  fn retrieve_many(&self, keys: &[String]) -> HashMap<String, CachedValue> {
    self.inner.retrieve_many(keys)
  }

  fn save(&self, key: &str, value: CachedValue) -> bool {
    if self.fail_saves.load(Ordering::SeqCst) {
      return false;
    }
    // An out-of-process store can only hold portable values.
    if matches!(value, CachedValue::Object(_)) {
      return false;
    }
    self.inner.save(key, value)
  }

  fn save_many(&self, entries: HashMap<String, CachedValue>) -> bool {
    if self.fail_saves.load(Ordering::SeqCst) {
      return false;
    }
    if entries
      .values()
      .any(|value| matches!(value, CachedValue::Object(_)))
    {
      return false;
    }
    self.inner.save_many(entries)
  }

  fn clear(&self, key: &str) -> bool {
    self.inner.clear(key)
  }

  fn add_new(&self, key: &str, value: CachedValue) -> bool {
    if matches!(value, CachedValue::Object(_)) {
      return false;
    }
    self.inner.add_new(key, value)
  }

  fn is_distributed(&self) -> bool {
    true
  }

  fn is_out_of_process(&self) -> bool {
    true
  }

  fn stale(&self) -> Option<&dyn StaleRead> {
    Some(self)
  }

  fn persistent(&self) -> Option<&dyn Persistent> {
    self.inner.persistent()
  }

  fn revisions(&self) -> Option<&dyn RevisionStore> {
    self.inner.revisions()
  }
}

impl StaleRead for DistributedMemoryProvider {
  fn retrieve_stale(&self, key: &str) -> Option<CachedValue> {
    self.inner.retrieve(key)
  }

  fn retrieve_stale_many(&self, keys: &[String]) -> HashMap<String, CachedValue> {
    self.inner.retrieve_many(keys)
  }
}

/// A bare provider with no optional capabilities at all.
pub struct PlainProvider {
  inner: MemoryProvider,
  distributed: bool,
}

impl PlainProvider {
  pub fn new(distributed: bool) -> Self {
    Self {
      inner: MemoryProvider::with_shards(2),
      distributed,
    }
  }
}

impl CacheProvider for PlainProvider {
  fn retrieve(&self, key: &str) -> Option<CachedValue> {
    self.inner.retrieve(key)
  }

  fn retrieve_many(&self, keys: &[String]) -> HashMap<String, CachedValue> {
    self.inner.retrieve_many(keys)
  }

  fn save(&self, key: &str, value: CachedValue) -> bool {
    self.inner.save(key, value)
  }

  fn save_many(&self, entries: HashMap<String, CachedValue>) -> bool {
    self.inner.save_many(entries)
  }

  fn clear(&self, key: &str) -> bool {
    self.inner.clear(key)
  }

  fn add_new(&self, key: &str, value: CachedValue) -> bool {
    self.inner.add_new(key, value)
  }

  fn is_distributed(&self) -> bool {
    self.distributed
  }

  fn is_out_of_process(&self) -> bool {
    false
  }
}

/// A local coordinator with key tracking on `CompanyName`.
pub fn tracked_coordinator() -> (Arc<Coordinator>, Arc<MemoryProvider>) {
  let provider = Arc::new(MemoryProvider::with_shards(4));
  let coordinator = CoordinatorBuilder::new()
    .provider("memory", provider.clone() as Arc<dyn CacheProvider>)
    .policy::<Customer>(
      TypePolicy::new("memory")
        .trackable(true)
        .dependency(QueryDependency::new("by-company", ["CompanyName"])),
    )
    .spawner(Arc::new(InlineSpawner))
    .build()
    .unwrap();
  (Arc::new(coordinator), provider)
}

/// A local coordinator with revision-based invalidation on `CompanyName`.
pub fn revision_coordinator() -> (Arc<Coordinator>, Arc<MemoryProvider>) {
  let provider = Arc::new(MemoryProvider::with_shards(4));
  let coordinator = CoordinatorBuilder::new()
    .provider("memory", provider.clone() as Arc<dyn CacheProvider>)
    .policy::<Customer>(
      TypePolicy::new("memory")
        .invalidation(InvalidationMode::Revision)
        .dependency(QueryDependency::new("by-company", ["CompanyName"])),
    )
    .spawner(Arc::new(InlineSpawner))
    .build()
    .unwrap();
  (Arc::new(coordinator), provider)
}

/// A distributed out-of-process coordinator with key tracking on
/// `CompanyName`.
pub fn distributed_coordinator() -> (Arc<Coordinator>, Arc<DistributedMemoryProvider>) {
  let provider = Arc::new(DistributedMemoryProvider::new());
  let coordinator = CoordinatorBuilder::new()
    .provider("remote", provider.clone() as Arc<dyn CacheProvider>)
    .policy::<Customer>(
      TypePolicy::new("remote")
        .trackable(true)
        .dependency(QueryDependency::new("by-company", ["CompanyName"])),
    )
    .spawner(Arc::new(InlineSpawner))
    .build()
    .unwrap();
  (Arc::new(coordinator), provider)
}
