use std::fmt;

/// A single named query parameter or entity property value.
///
/// Parameters are the common currency between the mapping layer and the
/// cache: queries supply them as filters, entities supply them as property
/// values, and the key and subspace computers reduce them to deterministic
/// identities.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
  pub name: String,
  pub value: ParamValue,
}

impl Param {
  pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
    Self {
      name: name.into(),
      value: value.into(),
    }
  }

  /// A parameter with no filter supplied for its property.
  pub fn wildcard(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      value: ParamValue::Wildcard,
    }
  }
}

/// The value domain for parameters and entity properties.
///
/// `Wildcard` means "no filter supplied" and renders as `*` in the
/// canonical text fed to key hashes.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
  Str(String),
  Int(i64),
  Uint(u64),
  Bool(bool),
  Null,
  Wildcard,
}

impl ParamValue {
  #[inline]
  pub fn is_wildcard(&self) -> bool {
    matches!(self, ParamValue::Wildcard)
  }
}

// The Display output is the canonical on-the-wire text. Changing it changes
// every computed cache key, so it is part of the storage format.
impl fmt::Display for ParamValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamValue::Str(s) => f.write_str(s),
      ParamValue::Int(i) => write!(f, "{}", i),
      ParamValue::Uint(u) => write!(f, "{}", u),
      ParamValue::Bool(b) => write!(f, "{}", b),
      ParamValue::Null => f.write_str("null"),
      ParamValue::Wildcard => f.write_str("*"),
    }
  }
}

impl From<&str> for ParamValue {
  fn from(value: &str) -> Self {
    ParamValue::Str(value.to_string())
  }
}

impl From<String> for ParamValue {
  fn from(value: String) -> Self {
    ParamValue::Str(value)
  }
}

impl From<i64> for ParamValue {
  fn from(value: i64) -> Self {
    ParamValue::Int(value)
  }
}

impl From<i32> for ParamValue {
  fn from(value: i32) -> Self {
    ParamValue::Int(value as i64)
  }
}

impl From<u64> for ParamValue {
  fn from(value: u64) -> Self {
    ParamValue::Uint(value)
  }
}

impl From<u32> for ParamValue {
  fn from(value: u32) -> Self {
    ParamValue::Uint(value as u64)
  }
}

impl From<bool> for ParamValue {
  fn from(value: bool) -> Self {
    ParamValue::Bool(value)
  }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
  fn from(value: Option<T>) -> Self {
    match value {
      Some(v) => v.into(),
      None => ParamValue::Null,
    }
  }
}
