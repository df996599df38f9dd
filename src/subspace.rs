//! Subspace enumeration.
//!
//! A subspace is an equivalence class of queries sharing a filter shape:
//! which properties are pinned to a concrete value and which are wildcarded.
//! Its key is `<TypeName>::<hash>` over the ordered tuple of
//! `property=value-or-substitution` texts. Two substitution tokens exist:
//! `*` ("no filter, matches anything") and `?` ("some concrete value").
//!
//! Queries consult the lookup-rule variants of their parameter tuple; data
//! changes touch the invalidation-rule variants of the changed property
//! values. The two rule sets are built so that every query shape a mutation
//! could have affected shares at least one subspace key with that mutation.

use crate::params::{Param, ParamValue};
use crate::record::{ChangeKind, Record, TypePolicy};

#[derive(Clone, Copy)]
enum Substitution {
  /// `?`: stands in for any concrete value.
  Generic,
  /// `*`: stands in for "no filter supplied".
  Any,
}

impl Substitution {
  fn text(self) -> &'static str {
    match self {
      Substitution::Generic => "?",
      Substitution::Any => "*",
    }
  }
}

struct SubstitutionRule {
  applies: fn(&ParamValue) -> bool,
  output: Substitution,
}

fn is_concrete(value: &ParamValue) -> bool {
  !value.is_wildcard()
}

fn is_wildcard(value: &ParamValue) -> bool {
  value.is_wildcard()
}

/// Rules applied when a query registers or consults tracking entries:
/// a pinned value additionally matches under its generic `?` form.
const LOOKUP_RULES: &[SubstitutionRule] = &[SubstitutionRule {
  applies: is_concrete,
  output: Substitution::Generic,
}];

/// Rules applied when a mutation invalidates: a wildcard also reaches the
/// generic `?` subspaces (so explicit wildcard invalidation catches queries
/// pinned to any value), and a concrete value also reaches the `*`
/// subspaces (so queries that did not filter on the property are caught).
const INVALIDATION_RULES: &[SubstitutionRule] = &[
  SubstitutionRule {
    applies: is_wildcard,
    output: Substitution::Generic,
  },
  SubstitutionRule {
    applies: is_concrete,
    output: Substitution::Any,
  },
];

/// Subspace keys a query with the given pairs registers under and reads
/// revisions from. The exact variant comes first.
pub fn lookup_variants(type_name: &str, pairs: &[Param]) -> Vec<String> {
  variants(type_name, pairs, LOOKUP_RULES)
}

/// Subspace keys a mutation with the given pairs must touch. The exact
/// variant comes first.
pub fn invalidation_variants(type_name: &str, pairs: &[Param]) -> Vec<String> {
  variants(type_name, pairs, INVALIDATION_RULES)
}

fn variants(type_name: &str, pairs: &[Param], rules: &[SubstitutionRule]) -> Vec<String> {
  if pairs.is_empty() {
    // No parameters means no subspace-level invalidation is possible; the
    // caller falls back to whole-type semantics.
    return Vec::new();
  }
  expand(pairs, rules)
    .into_iter()
    .map(|tuple| subspace_key(type_name, &tuple))
    .collect()
}

/// Builds the variant tuples right-to-left: the recursion first expands the
/// tail, then branches the current position into its unmodified text plus
/// one text per applicable rule. Positions that trigger no rule never
/// multiply the set, so growth is bounded by the positions that actually
/// vary instead of 2^N over the whole tuple.
fn expand(pairs: &[Param], rules: &[SubstitutionRule]) -> Vec<Vec<String>> {
  let (head, tail) = match pairs.split_first() {
    Some(split) => split,
    None => return vec![Vec::new()],
  };
  let tails = expand(tail, rules);

  let mut heads = Vec::with_capacity(1 + rules.len());
  heads.push(format!("{}={}", head.name, head.value));
  for rule in rules {
    if (rule.applies)(&head.value) {
      heads.push(format!("{}={}", head.name, rule.output.text()));
    }
  }

  let mut out = Vec::with_capacity(heads.len() * tails.len());
  for head_text in &heads {
    for tail_tuple in &tails {
      let mut tuple = Vec::with_capacity(1 + tail_tuple.len());
      tuple.push(head_text.clone());
      tuple.extend(tail_tuple.iter().cloned());
      out.push(tuple);
    }
  }
  out
}

fn subspace_key(type_name: &str, tuple: &[String]) -> String {
  let text = tuple.join(",");
  format!("{}::{:016x}", type_name, rapidhash::rapidhash(text.as_bytes()))
}

/// The subspace pair tuple for a query: every dependency property of the
/// type in order, pinned to the query's parameter value where one was
/// supplied (last write wins) and wildcarded where not.
pub(crate) fn query_pairs<R: Record>(policy: &TypePolicy, params: &[Param]) -> Vec<Param> {
  policy
    .dependency_properties::<R>()
    .into_iter()
    .map(|property| match params.iter().rev().find(|p| p.name == property) {
      Some(param) => Param::new(property, param.value.clone()),
      None => Param::wildcard(property),
    })
    .collect()
}

/// The subspace pair tuple for an entity instance: every dependency
/// property pinned to the instance's current value.
///
/// With derived (undeclared) dependencies, an insert leaves the primary-key
/// positions wildcarded: the new key cannot have matched an existing pinned
/// filter directly, yet the wildcard still expands to the generic variants
/// that key-pinned query shapes register under. Keeping the position (rather
/// than dropping it) preserves the tuple shape both sides hash.
pub(crate) fn record_pairs<R: Record>(
  policy: &TypePolicy,
  record: &R,
  change: ChangeKind,
) -> Vec<Param> {
  let fields = record.fields();
  let wildcard_keys = policy.dependencies.is_empty() && change == ChangeKind::Insert;
  policy
    .dependency_properties::<R>()
    .into_iter()
    .map(|property| {
      if wildcard_keys && R::key_names().contains(&property.as_str()) {
        return Param::wildcard(property);
      }
      match fields.iter().rev().find(|p| p.name == property) {
        Some(field) => Param::new(property, field.value.clone()),
        None => Param::wildcard(property),
      }
    })
    .collect()
}
