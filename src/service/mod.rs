//! # Graph Persistence Service
//!
//! Concept and relationship CRUD, the read-only category registry, and the
//! specialized traversals. Every service borrows the [`Ontology`] handle;
//! none of them hold state of their own.
//!
//! Mutations follow one shape: validate the merged record, open one
//! `ReadWrite` transaction, write, then commit on success or roll back on
//! any error. Reads open a `ReadOnly` transaction and never validate.
//!
//! [`Ontology`]: crate::Ontology

pub mod categories;
pub mod classification;
pub mod concepts;
pub mod relationships;
pub mod traversal;

use chrono::Utc;
use serde::Deserialize;

use crate::config::{PaginationConfig, TraversalConfig};
use crate::model::{Node, PropertyMap, Value};
use crate::schema::CONCEPT;
use crate::storage::StorageBackend;
use crate::validation::{Violation, Violations};
use crate::{Error, Result};

pub use categories::CategoryService;
pub use concepts::ConceptService;
pub use relationships::{NewRelationship, RelationshipService};
pub use traversal::TraversalService;

// ============================================================================
// Query parameters
// ============================================================================

/// Filters and window for concept listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConceptQuery {
    /// Minimum `confidence_score` (inclusive).
    pub confidence_threshold: Option<f64>,
    pub quality: Option<String>,
    pub modality: Option<String>,
    /// One of the four category names.
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Filters and window for relationship listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelationshipQuery {
    #[serde(rename = "type")]
    pub rel_type: Option<String>,
    pub start_id: Option<String>,
    pub end_id: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Per-call traversal bounds; unset values take the configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TraversalBounds {
    pub max_depth: Option<usize>,
    #[serde(alias = "result_limit")]
    pub limit: Option<usize>,
}

impl TraversalBounds {
    pub fn new(max_depth: usize, limit: usize) -> Self {
        Self { max_depth: Some(max_depth), limit: Some(limit) }
    }
}

/// A resolved `(skip, limit)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub skip: usize,
    pub limit: usize,
}

impl Window {
    pub fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.skip).take(self.limit).collect()
    }
}

pub(crate) fn window(
    cfg: &PaginationConfig,
    skip: Option<usize>,
    limit: Option<usize>,
    violations: &mut Violations,
) -> Window {
    let limit = limit.unwrap_or(cfg.default_limit);
    if limit == 0 || limit > cfg.max_limit {
        violations.push(Violation::new(
            "limit",
            "range",
            format!("'limit' must be between 1 and {}, got {limit}", cfg.max_limit),
        ));
    }
    Window { skip: skip.unwrap_or(0), limit }
}

/// Resolved traversal bounds: `(max_depth, limit)`.
pub(crate) fn traversal_bounds(cfg: &TraversalConfig, bounds: TraversalBounds) -> Result<(usize, usize)> {
    let mut violations = Violations::new();
    let depth = bounds.max_depth.unwrap_or(cfg.default_depth);
    if depth == 0 || depth > cfg.max_depth {
        violations.push(Violation::new(
            "max_depth",
            "range",
            format!("'max_depth' must be between 1 and {}, got {depth}", cfg.max_depth),
        ));
    }
    let limit = bounds.limit.unwrap_or(cfg.default_limit);
    if limit == 0 || limit > cfg.max_limit {
        violations.push(Violation::new(
            "limit",
            "range",
            format!("'limit' must be between 1 and {}, got {limit}", cfg.max_limit),
        ));
    }
    violations.into_result()?;
    Ok((depth, limit))
}

// ============================================================================
// Shared helpers
// ============================================================================

pub(crate) fn now() -> Value {
    Value::DateTime(Utc::now())
}

/// A create payload with explicit nulls dropped.
pub(crate) fn without_nulls(payload: &PropertyMap) -> PropertyMap {
    payload
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Overlay a partial update: null removes, anything else replaces.
pub(crate) fn merge(stored: &PropertyMap, delta: &PropertyMap) -> PropertyMap {
    let mut merged = stored.clone();
    for (k, v) in delta {
        if v.is_null() {
            merged.remove(k);
        } else {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Delta keys in a stable order, so writes replay identically.
pub(crate) fn sorted_keys(delta: &PropertyMap) -> Vec<&String> {
    let mut keys: Vec<&String> = delta.keys().collect();
    keys.sort();
    keys
}

/// Fetch a concept node by external id.
pub(crate) async fn load_concept<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
) -> Result<Node> {
    backend
        .get_node_by_element_id(tx, id)
        .await?
        .filter(|n| n.has_label(CONCEPT))
        .ok_or_else(|| Error::NotFound(format!("Concept {id}")))
}
