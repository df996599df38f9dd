use crate::params::Param;

use std::collections::HashMap;
use std::collections::HashSet;

/// The narrow contract the mapping layer implements per cacheable type.
///
/// The engine never inspects entities beyond this trait: it needs a stable
/// type name, the property-name metadata, and the current property values of
/// an instance. Out-of-process storage additionally requires
/// `serde::Serialize`/`DeserializeOwned` on the implementing type.
pub trait Record: Send + Sync + 'static {
  /// Stable type identity, embedded in every cache and subspace key.
  const TYPE_NAME: &'static str;

  /// Names of all persistent scalar/list properties, in declaration order.
  fn field_names() -> &'static [&'static str];

  /// Names of the primary-key properties.
  fn key_names() -> &'static [&'static str];

  /// Current values of all persistent properties.
  fn fields(&self) -> Vec<Param>;

  /// Current values of the primary-key properties only.
  fn primary_key(&self) -> Vec<Param> {
    let keys = Self::key_names();
    self
      .fields()
      .into_iter()
      .filter(|p| keys.contains(&p.name.as_str()))
      .collect()
  }
}

/// What kind of data change is triggering an invalidation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

/// How cached query results for a type are invalidated when data changes.
///
/// The two strategies are mutually exclusive per type: key tracking persists
/// query-key lists per subspace and clears them on change; revision counting
/// embeds per-subspace counters into query keys so a bump orphans every
/// previously-issued key without touching it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationMode {
  KeyTracking,
  Revision,
}

/// A named set of property names; a change to any of them is presumed to
/// invalidate queries filtered on those properties.
#[derive(Clone, Debug)]
pub struct QueryDependency {
  pub name: String,
  pub properties: Vec<String>,
}

impl QueryDependency {
  pub fn new(
    name: impl Into<String>,
    properties: impl IntoIterator<Item = impl Into<String>>,
  ) -> Self {
    Self {
      name: name.into(),
      properties: properties.into_iter().map(Into::into).collect(),
    }
  }
}

/// Explicit per-type cache policy, supplied at startup.
///
/// Replaces attribute/reflection-driven discovery: the mapping layer builds
/// one descriptor per type and registers it with the builder.
#[derive(Clone, Debug)]
pub struct TypePolicy {
  pub(crate) provider: String,
  pub(crate) trackable: bool,
  pub(crate) invalidation: InvalidationMode,
  pub(crate) dependencies: Vec<QueryDependency>,
}

impl TypePolicy {
  /// A policy storing entries in the named provider, not trackable, with
  /// key-tracking invalidation and no declared dependencies.
  pub fn new(provider: impl Into<String>) -> Self {
    Self {
      provider: provider.into(),
      trackable: false,
      invalidation: InvalidationMode::KeyTracking,
      dependencies: Vec::new(),
    }
  }

  pub fn trackable(mut self, trackable: bool) -> Self {
    self.trackable = trackable;
    self
  }

  pub fn invalidation(mut self, mode: InvalidationMode) -> Self {
    self.invalidation = mode;
    self
  }

  pub fn dependency(mut self, dependency: QueryDependency) -> Self {
    self.dependencies.push(dependency);
    self
  }

  /// The ordered, deduplicated property list the subspace computations run
  /// over. Declared dependencies win; with none declared it falls back to
  /// all persistent properties.
  pub(crate) fn dependency_properties<R: Record>(&self) -> Vec<String> {
    if self.dependencies.is_empty() {
      return R::field_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    }
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for dependency in &self.dependencies {
      for property in &dependency.properties {
        if seen.insert(property.as_str()) {
          out.push(property.clone());
        }
      }
    }
    out
  }
}

/// Startup-time map from record type name to its policy.
#[derive(Debug, Default)]
pub(crate) struct PolicyRegistry {
  map: HashMap<&'static str, TypePolicy>,
}

impl PolicyRegistry {
  pub(crate) fn new(map: HashMap<&'static str, TypePolicy>) -> Self {
    Self { map }
  }

  pub(crate) fn get(&self, type_name: &str) -> Option<&TypePolicy> {
    self.map.get(type_name)
  }
}
