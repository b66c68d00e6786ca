//! Relation label normalization.
//!
//! Extracted relation labels are free text ("born in", "co-located@X"). Edges
//! in the graph need a token that is safe to store, compare, and display, so
//! every label passes through [`normalize_relation`] before it reaches the
//! store.

use serde::{Deserialize, Serialize};

/// Relation type used when a label is absent or empty.
pub const DEFAULT_RELATION: &str = "RELATED_TO";

/// Canonicalize a free-text relation label into a `[A-Z0-9_]+` token.
///
/// Upper-cases the input, then replaces every character outside
/// `[A-Z0-9_]` with `_`. Empty input yields [`DEFAULT_RELATION`];
/// whitespace is not special and maps to underscores like any other symbol. Total and
/// deterministic: the same input always produces the same token.
///
/// ```
/// use graphloom::normalize_relation;
///
/// assert_eq!(normalize_relation("born in"), "BORN_IN");
/// assert_eq!(normalize_relation("co-located@X"), "CO_LOCATED_X");
/// assert_eq!(normalize_relation(""), "RELATED_TO");
/// ```
pub fn normalize_relation(label: &str) -> String {
    if label.is_empty() {
        return DEFAULT_RELATION.to_string();
    }
    label
        .to_uppercase()
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A normalized relation type carried on entity-to-entity edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationType(String);

impl RelationType {
    /// Normalize `label` into a relation type.
    pub fn normalize(label: &str) -> Self {
        Self(normalize_relation(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RelationType {
    fn default() -> Self {
        Self(DEFAULT_RELATION.to_string())
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
