use std::fmt;

/// Errors that can occur when building a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// No cache providers were registered.
  NoProviders,
  /// A type policy names a provider that was never registered.
  UnknownProvider(String),
  /// A type is configured for revision-based invalidation but its provider
  /// has no revision-counter capability.
  MissingRevisionSupport(String),
  /// A type is configured as trackable but its provider has no persistent
  /// record capability to hold tracking entries.
  MissingTrackingSupport(String),
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::NoProviders => write!(f, "at least one cache provider must be registered"),
      BuildError::UnknownProvider(name) => {
        write!(f, "type policy references unregistered provider {:?}", name)
      }
      BuildError::MissingRevisionSupport(type_name) => write!(
        f,
        "{} uses revision invalidation but its provider has no revision counters",
        type_name
      ),
      BuildError::MissingTrackingSupport(type_name) => write!(
        f,
        "{} is trackable but its provider has no persistent records",
        type_name
      ),
    }
  }
}

impl std::error::Error for BuildError {}

/// Errors surfaced by coordinator operations.
///
/// Backend failures are deliberately absent: they degrade (uncached result,
/// stale read, best-effort tracking) instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
  /// No policy was registered for the record type.
  UnknownType(&'static str),
  /// The policy's provider disappeared from the registry.
  UnknownProvider(String),
}

impl fmt::Display for CacheError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheError::UnknownType(type_name) => {
        write!(f, "no cache policy registered for {}", type_name)
      }
      CacheError::UnknownProvider(name) => write!(f, "no cache provider named {:?}", name),
    }
  }
}

impl std::error::Error for CacheError {}
