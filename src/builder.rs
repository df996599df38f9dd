use crate::coordinator::Coordinator;
use crate::error::BuildError;
use crate::metrics::Metrics;
use crate::provider::CacheProvider;
use crate::record::{InvalidationMode, PolicyRegistry, Record, TypePolicy};
use crate::runtime::{TaskSpawner, ThreadSpawner};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A builder for creating [`Coordinator`] instances.
///
/// Providers are registered under a name; type policies reference a
/// provider by that name. Validation happens at build time so a policy can
/// never outrun its provider's capabilities at runtime.
pub struct CoordinatorBuilder {
  providers: HashMap<String, Arc<dyn CacheProvider>>,
  policies: HashMap<&'static str, TypePolicy>,
  spawner: Option<Arc<dyn TaskSpawner>>,
}

impl fmt::Debug for CoordinatorBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CoordinatorBuilder")
      .field("providers", &self.providers.len())
      .field("policies", &self.policies.len())
      .field("has_spawner", &self.spawner.is_some())
      .finish()
  }
}

impl CoordinatorBuilder {
  pub fn new() -> Self {
    Self {
      providers: HashMap::new(),
      policies: HashMap::new(),
      spawner: None,
    }
  }

  /// Registers a cache provider under a name.
  pub fn provider(mut self, name: impl Into<String>, provider: Arc<dyn CacheProvider>) -> Self {
    self.providers.insert(name.into(), provider);
    self
  }

  /// Registers the cache policy for record type `R`.
  pub fn policy<R: Record>(mut self, policy: TypePolicy) -> Self {
    self.policies.insert(R::TYPE_NAME, policy);
    self
  }

  /// Sets the spawner used for background tracking writes.
  ///
  /// Defaults to [`ThreadSpawner`].
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Validates the configuration and builds the coordinator.
  pub fn build(self) -> Result<Coordinator, BuildError> {
    if self.providers.is_empty() {
      return Err(BuildError::NoProviders);
    }
    for (type_name, policy) in &self.policies {
      let provider = self
        .providers
        .get(&policy.provider)
        .ok_or_else(|| BuildError::UnknownProvider(policy.provider.clone()))?;
      match policy.invalidation {
        InvalidationMode::Revision if provider.revisions().is_none() => {
          return Err(BuildError::MissingRevisionSupport(type_name.to_string()));
        }
        InvalidationMode::KeyTracking if policy.trackable && provider.persistent().is_none() => {
          return Err(BuildError::MissingTrackingSupport(type_name.to_string()));
        }
        _ => {}
      }
    }
    Ok(Coordinator {
      providers: self.providers,
      policies: PolicyRegistry::new(self.policies),
      local_locks: Mutex::new(HashMap::default()),
      spawner: self.spawner.unwrap_or_else(|| Arc::new(ThreadSpawner)),
      metrics: Arc::new(Metrics::new()),
    })
  }
}

impl Default for CoordinatorBuilder {
  fn default() -> Self {
    Self::new()
  }
}
