//! Relationship CRUD between concepts.
//!
//! Types are open: the seven semantic kinds have their own rule sets,
//! any other well-formed label is accepted and checked against the
//! generic rules only.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::identity::{self, RelationshipRecord};
use crate::model::{Direction, Node, NodeId, PropertyMap, RelId, Relationship, Value};
use crate::schema::{normalize_rel_type, CONCEPT};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::validation::{EntityKind, RuleRegistry, Violation, Violations};
use crate::{Error, Ontology, Result};

use super::{merge, now, sorted_keys, window, without_nulls, RelationshipQuery};

/// A relationship to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRelationship {
    /// Store label or lower-case kind alias (`"cause"`).
    pub rel_type: String,
    pub start_id: String,
    pub end_id: String,
    pub properties: PropertyMap,
}

impl NewRelationship {
    pub fn new(
        rel_type: impl Into<String>,
        start_id: impl Into<String>,
        end_id: impl Into<String>,
        properties: PropertyMap,
    ) -> Self {
        Self {
            rel_type: rel_type.into(),
            start_id: start_id.into(),
            end_id: end_id.into(),
            properties,
        }
    }
}

pub struct RelationshipService<'a, B: StorageBackend> {
    db: &'a Ontology<B>,
}

impl<'a, B: StorageBackend> RelationshipService<'a, B> {
    pub(crate) fn new(db: &'a Ontology<B>) -> Self {
        Self { db }
    }

    /// Create a relationship after validating it and checking that both
    /// endpoints exist. `creation_timestamp` is assigned here.
    pub async fn create(&self, new: NewRelationship) -> Result<RelationshipRecord> {
        let label = normalize_rel_type(&new.rel_type).map_err(|e| {
            Error::ValidationFailed(Violation::new("type", "rel_type", e.to_string()).into())
        })?;

        let mut record = without_nulls(&new.properties);
        record.insert("creation_timestamp".to_string(), now());
        let violations = self.db.rules.validate_create(
            EntityKind::Relationship, Some(&label), &new.properties, &record,
        );
        if !violations.is_empty() {
            warn!(rel_type = %label, %violations, "relationship create rejected");
            return Err(Error::ValidationFailed(violations));
        }

        let backend = &self.db.backend;
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let result = insert(backend, &mut tx, &label, &new.start_id, &new.end_id, record).await;
        self.db.finish(tx, result, "relationship.create").await
    }

    pub async fn get(&self, id: &str) -> Result<RelationshipRecord> {
        let backend = &self.db.backend;
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let result = load(backend, &tx, id).await;
        let (rel, start, end) = self.db.finish(tx, result, "relationship.get").await?;
        Ok(identity::relationship_record(&rel, Some(&start), Some(&end)))
    }

    /// Filter by type and/or endpoint, in creation order.
    pub async fn list(&self, query: &RelationshipQuery) -> Result<Vec<RelationshipRecord>> {
        let mut violations = Violations::new();
        let window = window(&self.db.config.pagination, query.skip, query.limit, &mut violations);
        let rel_type = match query.rel_type.as_deref().map(normalize_rel_type) {
            Some(Ok(label)) => Some(label),
            Some(Err(e)) => {
                violations.push(Violation::new("type", "rel_type", e.to_string()));
                None
            }
            None => None,
        };
        if !violations.is_empty() {
            warn!(%violations, "relationship listing rejected");
            return Err(Error::ValidationFailed(violations));
        }

        let backend = &self.db.backend;
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let result = select(backend, &tx, rel_type.as_deref(), query).await;
        let matched = self.db.finish(tx, result, "relationship.list").await?;
        debug!(matched = matched.len(), skip = window.skip, limit = window.limit, "relationship listing");
        Ok(window.apply(matched))
    }

    /// Merge `delta` into the relationship's properties and validate against
    /// its own rule set. Type and endpoints never change.
    pub async fn update(&self, id: &str, delta: PropertyMap) -> Result<RelationshipRecord> {
        let backend = &self.db.backend;
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let result = apply_update(backend, &self.db.rules, &mut tx, id, &delta).await;
        self.db.finish(tx, result, "relationship.update").await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let backend = &self.db.backend;
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let result = remove(backend, &mut tx, id).await;
        self.db.finish(tx, result, "relationship.delete").await
    }
}

// ============================================================================
// Transaction bodies
// ============================================================================

/// Endpoint lookup that names which end is missing.
async fn endpoint<B: StorageBackend>(backend: &B, tx: &B::Tx, id: &str, which: &str) -> Result<Node> {
    backend
        .get_node_by_element_id(tx, id)
        .await?
        .filter(|n| n.has_label(CONCEPT))
        .ok_or_else(|| Error::NotFound(format!("{which} concept {id}")))
}

/// A concept-to-concept relationship with both endpoints.
async fn load<B: StorageBackend>(backend: &B, tx: &B::Tx, id: &str) -> Result<(Relationship, Node, Node)> {
    let not_found = || Error::NotFound(format!("Relationship {id}"));
    let rel = backend.get_relationship_by_element_id(tx, id).await?.ok_or_else(not_found)?;
    let start = backend.get_node(tx, rel.src).await?.filter(|n| n.has_label(CONCEPT));
    let end = backend.get_node(tx, rel.dst).await?.filter(|n| n.has_label(CONCEPT));
    match (start, end) {
        (Some(start), Some(end)) => Ok((rel, start, end)),
        _ => Err(not_found()),
    }
}

async fn fetch<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: RelId,
    start: &Node,
    end: &Node,
) -> Result<RelationshipRecord> {
    let rel = backend
        .get_relationship(tx, id)
        .await?
        .ok_or_else(|| Error::StorageError(format!("Relationship {id} vanished inside its transaction")))?;
    Ok(identity::relationship_record(&rel, Some(start), Some(end)))
}

async fn insert<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    label: &str,
    start_id: &str,
    end_id: &str,
    record: PropertyMap,
) -> Result<RelationshipRecord> {
    let start = endpoint(backend, tx, start_id, "Start").await?;
    let end = endpoint(backend, tx, end_id, "End").await?;
    let id = backend.create_relationship(tx, start.id, end.id, label, record).await?;
    fetch(backend, tx, id, &start, &end).await
}

async fn apply_update<B: StorageBackend>(
    backend: &B,
    rules: &RuleRegistry,
    tx: &mut B::Tx,
    id: &str,
    delta: &PropertyMap,
) -> Result<RelationshipRecord> {
    let (rel, start, end) = load(backend, tx, id).await?;
    let merged = merge(&rel.properties, delta);
    rules
        .validate_update(EntityKind::Relationship, Some(&rel.rel_type), &rel.properties, delta, &merged)
        .into_result()?;

    for key in sorted_keys(delta) {
        match &delta[key] {
            Value::Null => backend.remove_relationship_property(tx, rel.id, key).await?,
            v => backend.set_relationship_property(tx, rel.id, key, v.clone()).await?,
        }
    }
    fetch(backend, tx, rel.id, &start, &end).await
}

async fn remove<B: StorageBackend>(backend: &B, tx: &mut B::Tx, id: &str) -> Result<()> {
    let (rel, _, _) = load(backend, tx, id).await?;
    backend.delete_relationship(tx, rel.id).await?;
    Ok(())
}

async fn concept_node_id<B: StorageBackend>(backend: &B, tx: &B::Tx, id: &str) -> Result<Option<NodeId>> {
    Ok(backend
        .get_node_by_element_id(tx, id)
        .await?
        .filter(|n| n.has_label(CONCEPT))
        .map(|n| n.id))
}

async fn select<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    rel_type: Option<&str>,
    query: &RelationshipQuery,
) -> Result<Vec<RelationshipRecord>> {
    // An endpoint filter naming no concept matches nothing.
    let start = match query.start_id.as_deref() {
        Some(id) => match concept_node_id(backend, tx, id).await? {
            Some(node) => Some(node),
            None => return Ok(Vec::new()),
        },
        None => None,
    };
    let end = match query.end_id.as_deref() {
        Some(id) => match concept_node_id(backend, tx, id).await? {
            Some(node) => Some(node),
            None => return Ok(Vec::new()),
        },
        None => None,
    };

    let candidates = match (start, end, rel_type) {
        (Some(node), _, t) => backend.get_relationships(tx, node, Direction::Outgoing, t).await?,
        (None, Some(node), t) => backend.get_relationships(tx, node, Direction::Incoming, t).await?,
        (None, None, Some(t)) => backend.relationships_by_type(tx, t).await?,
        (None, None, None) => backend.all_relationships(tx).await?,
    };

    let mut concepts: HashMap<NodeId, Option<Node>> = HashMap::new();
    let mut out = Vec::new();
    for rel in candidates {
        if start.is_some_and(|s| rel.src != s) || end.is_some_and(|e| rel.dst != e) {
            continue;
        }
        for id in [rel.src, rel.dst] {
            if !concepts.contains_key(&id) {
                let node = backend.get_node(tx, id).await?.filter(|n| n.has_label(CONCEPT));
                concepts.insert(id, node);
            }
        }
        if let (Some(Some(s)), Some(Some(e))) = (concepts.get(&rel.src), concepts.get(&rel.dst)) {
            out.push(identity::relationship_record(&rel, Some(s), Some(e)));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::props;

    async fn two_concepts(db: &Ontology<crate::MemoryBackend>) -> (String, String) {
        let a = db.concepts().create(props([("name", "Heat")])).await.unwrap();
        let b = db.concepts().create(props([("name", "Expansion")])).await.unwrap();
        (a.element_id, b.element_id)
    }

    fn base() -> PropertyMap {
        props([
            ("confidence_score", Value::from(0.95)),
            ("source_information", Value::from("physics")),
        ])
    }

    #[tokio::test]
    async fn test_create_reports_missing_endpoint() {
        let db = Ontology::open_memory().await.unwrap();
        let (a, _) = two_concepts(&db).await;
        let err = db
            .relationships()
            .create(NewRelationship::new("CAUSES", a.clone(), "4:mem:999", base()))
            .await
            .unwrap_err();
        let Error::NotFound(msg) = err else { panic!("expected NotFound") };
        assert!(msg.starts_with("End concept"));

        let err = db
            .relationships()
            .create(NewRelationship::new("CAUSES", "4:mem:999", a, base()))
            .await
            .unwrap_err();
        let Error::NotFound(msg) = err else { panic!("expected NotFound") };
        assert!(msg.starts_with("Start concept"));
    }

    #[tokio::test]
    async fn test_reserved_and_malformed_types() {
        let db = Ontology::open_memory().await.unwrap();
        let (a, b) = two_concepts(&db).await;
        for t in ["INSTANCE_OF", "has-dash", ""] {
            let err = db
                .relationships()
                .create(NewRelationship::new(t, a.clone(), b.clone(), base()))
                .await
                .unwrap_err();
            assert!(err.violations().unwrap().has("type", "rel_type"), "{t}");
        }
    }

    #[tokio::test]
    async fn test_structural_edges_are_hidden() {
        let db = Ontology::open_memory().await.unwrap();
        let (a, _) = two_concepts(&db).await;
        db.concepts().classify(&a, "Unity").await.unwrap();
        let all = db.relationships().list(&RelationshipQuery::default()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_type_and_endpoints() {
        let db = Ontology::open_memory().await.unwrap();
        let (a, b) = two_concepts(&db).await;
        let rel = db
            .relationships()
            .create(NewRelationship::new("cause", a.clone(), b.clone(), base()))
            .await
            .unwrap();
        assert_eq!(rel.rel_type, "CAUSES");

        let err = db
            .relationships()
            .update(&rel.element_id, props([("type", "CONTAINS")]))
            .await
            .unwrap_err();
        assert!(err.violations().unwrap().has("type", "read_only"));

        let updated = db
            .relationships()
            .update(&rel.element_id, props([("confidence_score", 0.5)]))
            .await
            .unwrap();
        assert_eq!(updated.rel_type, "CAUSES");
        assert_eq!((updated.start_node_id.as_str(), updated.end_node_id.as_str()), (a.as_str(), b.as_str()));
        assert_eq!(updated.property("confidence_score"), Some(&serde_json::json!(0.5)));
    }
}
