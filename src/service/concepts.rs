//! Concept CRUD and filtered listing.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::identity::{self, ConceptRecord};
use crate::model::{Direction, Node, NodeId, PropertyMap, Value};
use crate::schema::kinds::{DEFAULT_STABILITY, MODALITIES, QUALITIES};
use crate::schema::{QueryStrategy, CONCEPT, INSTANCE_OF};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::validation::{EntityKind, RuleRegistry, Violation, Violations};
use crate::{Error, Ontology, Result};

use super::{load_concept, merge, now, sorted_keys, window, without_nulls, ConceptQuery};

pub struct ConceptService<'a, B: StorageBackend> {
    pub(crate) db: &'a Ontology<B>,
}

impl<'a, B: StorageBackend> ConceptService<'a, B> {
    pub(crate) fn new(db: &'a Ontology<B>) -> Self {
        Self { db }
    }

    /// Create a concept. `stability_status` defaults to `ephemeral`;
    /// `creation_timestamp` is assigned here.
    pub async fn create(&self, payload: PropertyMap) -> Result<ConceptRecord> {
        let mut record = without_nulls(&payload);
        record
            .entry("stability_status".to_string())
            .or_insert_with(|| Value::from(DEFAULT_STABILITY));
        record.insert("creation_timestamp".to_string(), now());

        let violations = self.db.rules.validate_create(EntityKind::Concept, None, &payload, &record);
        if !violations.is_empty() {
            warn!(%violations, "concept create rejected");
            return Err(Error::ValidationFailed(violations));
        }

        let backend = &self.db.backend;
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let result = insert(backend, &mut tx, record).await;
        let node = self.db.finish(tx, result, "concept.create").await?;
        Ok(identity::concept_record(&node))
    }

    pub async fn get(&self, id: &str) -> Result<ConceptRecord> {
        let backend = &self.db.backend;
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let result = load_concept(backend, &tx, id).await;
        let node = self.db.finish(tx, result, "concept.get").await?;
        Ok(identity::concept_record(&node))
    }

    /// Filtered, paginated listing ordered by `(name, store id)`.
    pub async fn list(&self, query: &ConceptQuery) -> Result<Vec<ConceptRecord>> {
        let mut violations = Violations::new();
        let window = window(&self.db.config.pagination, query.skip, query.limit, &mut violations);
        let strategies = self.strategies(query, &mut violations);
        if !violations.is_empty() {
            warn!(%violations, "concept listing rejected");
            return Err(Error::ValidationFailed(violations));
        }

        let backend = &self.db.backend;
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let result = select(backend, &tx, &strategies).await;
        let mut nodes = self.db.finish(tx, result, "concept.list").await?;

        nodes.retain(|n| matches_filters(n, query));
        nodes.sort_by(|a, b| {
            a.get_str("name").unwrap_or_default()
                .cmp(b.get_str("name").unwrap_or_default())
                .then(a.id.cmp(&b.id))
        });
        debug!(matched = nodes.len(), skip = window.skip, limit = window.limit, "concept listing");
        Ok(window.apply(nodes).iter().map(identity::concept_record).collect())
    }

    /// Validate filter values and translate category/subcategory names
    /// into query strategies.
    fn strategies(&self, query: &ConceptQuery, violations: &mut Violations) -> Vec<QueryStrategy> {
        if let Some(t) = query.confidence_threshold {
            if !(0.0..=1.0).contains(&t) {
                violations.push(Violation::new(
                    "confidence_threshold",
                    "range",
                    format!("'confidence_threshold' must be between 0 and 1, got {t}"),
                ));
            }
        }
        for (field, value, allowed) in [
            ("quality", &query.quality, QUALITIES),
            ("modality", &query.modality, MODALITIES),
        ] {
            if let Some(v) = value {
                if !allowed.contains(&v.as_str()) {
                    violations.push(Violation::new(
                        field,
                        "one_of",
                        format!("Invalid {field}: '{v}'. Must be one of {allowed:?}"),
                    ));
                }
            }
        }

        let registry = &self.db.registry;
        let mut strategies = Vec::new();
        if let Some(name) = &query.category {
            match registry.strategy_for_category(name) {
                Some(s) => {
                    debug!(category = %name, strategy = ?s, "category filter dispatch");
                    strategies.push(s);
                }
                None => violations.push(Violation::new(
                    "category",
                    "one_of",
                    format!("Unknown category '{name}'"),
                )),
            }
        }
        if let Some(name) = &query.subcategory {
            match registry.strategy_for_subcategory(name) {
                Some(s) => {
                    debug!(subcategory = %name, strategy = ?s, "subcategory filter dispatch");
                    strategies.push(s);
                }
                None => violations.push(Violation::new(
                    "subcategory",
                    "one_of",
                    format!("Unknown subcategory '{name}'"),
                )),
            }
        }
        strategies
    }

    /// Partial update: absent keys are untouched, `null` removes a field.
    /// Validated against the merged record.
    pub async fn update(&self, id: &str, delta: PropertyMap) -> Result<ConceptRecord> {
        let backend = &self.db.backend;
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let result = apply_update(backend, &self.db.rules, &mut tx, id, &delta).await;
        let node = self.db.finish(tx, result, "concept.update").await?;
        Ok(identity::concept_record(&node))
    }

    /// Delete a concept and every relationship touching it.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let backend = &self.db.backend;
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let result = remove(backend, &mut tx, id).await;
        self.db.finish(tx, result, "concept.delete").await
    }
}

// ============================================================================
// Transaction bodies
// ============================================================================

pub(crate) async fn fetch<B: StorageBackend>(backend: &B, tx: &B::Tx, id: NodeId) -> Result<Node> {
    backend
        .get_node(tx, id)
        .await?
        .ok_or_else(|| Error::StorageError(format!("Node {id} vanished inside its transaction")))
}

async fn insert<B: StorageBackend>(backend: &B, tx: &mut B::Tx, record: PropertyMap) -> Result<Node> {
    let id = backend.create_node(tx, &[CONCEPT], record).await?;
    fetch(backend, tx, id).await
}

async fn apply_update<B: StorageBackend>(
    backend: &B,
    rules: &RuleRegistry,
    tx: &mut B::Tx,
    id: &str,
    delta: &PropertyMap,
) -> Result<Node> {
    let node = load_concept(backend, tx, id).await?;
    let merged = merge(&node.properties, delta);
    rules
        .validate_update(EntityKind::Concept, None, &node.properties, delta, &merged)
        .into_result()?;

    for key in sorted_keys(delta) {
        match &delta[key] {
            Value::Null => backend.remove_node_property(tx, node.id, key).await?,
            v => backend.set_node_property(tx, node.id, key, v.clone()).await?,
        }
    }
    fetch(backend, tx, node.id).await
}

async fn remove<B: StorageBackend>(backend: &B, tx: &mut B::Tx, id: &str) -> Result<()> {
    let node = load_concept(backend, tx, id).await?;
    backend.detach_delete_node(tx, node.id).await?;
    Ok(())
}

async fn select<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    strategies: &[QueryStrategy],
) -> Result<Vec<Node>> {
    let mut candidates = backend.nodes_by_label(tx, CONCEPT).await?;
    for strategy in strategies {
        candidates = apply_strategy(backend, tx, candidates, strategy).await?;
    }
    Ok(candidates)
}

async fn apply_strategy<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    candidates: Vec<Node>,
    strategy: &QueryStrategy,
) -> Result<Vec<Node>> {
    Ok(match strategy {
        QueryStrategy::PropertyPresent { key } => candidates
            .into_iter()
            .filter(|n| n.get(key).is_some_and(|v| !v.is_null()))
            .collect(),
        QueryStrategy::PropertyEquals { key, value } => candidates
            .into_iter()
            .filter(|n| n.get_str(key) == Some(*value))
            .collect(),
        QueryStrategy::InstanceOf { targets } => {
            let mut members = HashSet::new();
            for target in targets {
                let incoming = backend
                    .get_relationships(tx, *target, Direction::Incoming, Some(INSTANCE_OF))
                    .await?;
                members.extend(incoming.into_iter().map(|r| r.src));
            }
            candidates.into_iter().filter(|n| members.contains(&n.id)).collect()
        }
    })
}

fn matches_filters(node: &Node, query: &ConceptQuery) -> bool {
    let threshold_ok = query.confidence_threshold.is_none_or(|t| {
        node.get("confidence_score").and_then(Value::as_float).is_some_and(|c| c >= t)
    });
    let quality_ok = query.quality.as_deref().is_none_or(|q| node.get_str("quality") == Some(q));
    let modality_ok = query.modality.as_deref().is_none_or(|m| node.get_str("modality") == Some(m));
    threshold_ok && quality_ok && modality_ok
}
