//! Attaching concepts to subcategories across both encodings.
//!
//! Quality and Modality membership is the concept's own `quality` /
//! `modality` property; Quantity and Relation membership is an
//! `INSTANCE_OF` edge to the subcategory node. These methods hide that.

use tracing::debug;

use crate::identity::{self, SubcategoryRecord};
use crate::model::{props, Direction, Node, NodeId, Value};
use crate::schema::{CategoryRegistry, Encoding, INSTANCE_OF};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::{Error, Result};

use super::concepts::ConceptService;
use super::{load_concept, now};

/// Provenance written on edges created by `classify`.
const CLASSIFICATION_SOURCE: &str = "manual classification";

impl<'a, B: StorageBackend> ConceptService<'a, B> {
    /// Subcategories the concept belongs to, in taxonomy order.
    pub async fn classification(&self, id: &str) -> Result<Vec<SubcategoryRecord>> {
        let backend = &self.db.backend;
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let result = memberships(backend, &self.db.registry, &tx, id).await;
        self.db.finish(tx, result, "concept.classification").await
    }

    /// Put the concept into `subcategory`. Idempotent.
    ///
    /// For a property-encoded category this replaces any previous value of
    /// that property.
    pub async fn classify(&self, id: &str, subcategory: &str) -> Result<Vec<SubcategoryRecord>> {
        let backend = &self.db.backend;
        let registry = &self.db.registry;
        let (category, sub) = registry
            .subcategory(subcategory)
            .ok_or_else(|| Error::NotFound(format!("Subcategory '{subcategory}'")))?;

        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let result = attach(backend, registry, &mut tx, id, category.encoding(), sub.node, sub.def.name).await;
        self.db.finish(tx, result, "concept.classify").await
    }

    /// Take the concept out of `subcategory`. Idempotent.
    pub async fn declassify(&self, id: &str, subcategory: &str) -> Result<Vec<SubcategoryRecord>> {
        let backend = &self.db.backend;
        let registry = &self.db.registry;
        let (category, sub) = registry
            .subcategory(subcategory)
            .ok_or_else(|| Error::NotFound(format!("Subcategory '{subcategory}'")))?;

        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let result = detach(backend, registry, &mut tx, id, category.encoding(), sub.node, sub.def.name).await;
        self.db.finish(tx, result, "concept.declassify").await
    }
}

async fn memberships<B: StorageBackend>(
    backend: &B,
    registry: &CategoryRegistry,
    tx: &B::Tx,
    id: &str,
) -> Result<Vec<SubcategoryRecord>> {
    let node = load_concept(backend, tx, id).await?;
    let edges = backend
        .get_relationships(tx, node.id, Direction::Outgoing, Some(INSTANCE_OF))
        .await?;

    let mut out = Vec::new();
    for category in registry.categories() {
        for sub in &category.subcategories {
            let member = match category.encoding() {
                Encoding::Property(key) => node.get_str(key) == Some(sub.def.name),
                Encoding::InstanceOf => edges.iter().any(|r| r.dst == sub.node),
            };
            if member {
                out.push(identity::subcategory_record(category, sub));
            }
        }
    }
    Ok(out)
}

async fn attach<B: StorageBackend>(
    backend: &B,
    registry: &CategoryRegistry,
    tx: &mut B::Tx,
    id: &str,
    encoding: Encoding,
    target: NodeId,
    name: &'static str,
) -> Result<Vec<SubcategoryRecord>> {
    let node: Node = load_concept(backend, tx, id).await?;
    match encoding {
        Encoding::Property(key) => {
            if node.get_str(key) != Some(name) {
                backend.set_node_property(tx, node.id, key, Value::from(name)).await?;
            }
        }
        Encoding::InstanceOf => {
            let existing = backend
                .get_relationships(tx, node.id, Direction::Outgoing, Some(INSTANCE_OF))
                .await?;
            if existing.iter().any(|r| r.dst == target) {
                debug!(concept = id, subcategory = name, "already classified");
            } else {
                let mut properties = props([
                    ("confidence_score", Value::from(1.0)),
                    ("source_information", Value::from(CLASSIFICATION_SOURCE)),
                ]);
                properties.insert("creation_timestamp".into(), now());
                backend.create_relationship(tx, node.id, target, INSTANCE_OF, properties).await?;
            }
        }
    }
    memberships(backend, registry, tx, id).await
}

async fn detach<B: StorageBackend>(
    backend: &B,
    registry: &CategoryRegistry,
    tx: &mut B::Tx,
    id: &str,
    encoding: Encoding,
    target: NodeId,
    name: &'static str,
) -> Result<Vec<SubcategoryRecord>> {
    let node = load_concept(backend, tx, id).await?;
    match encoding {
        Encoding::Property(key) => {
            if node.get_str(key) == Some(name) {
                backend.remove_node_property(tx, node.id, key).await?;
            }
        }
        Encoding::InstanceOf => {
            let edges = backend
                .get_relationships(tx, node.id, Direction::Outgoing, Some(INSTANCE_OF))
                .await?;
            for rel in edges.into_iter().filter(|r| r.dst == target) {
                backend.delete_relationship(tx, rel.id).await?;
            }
        }
    }
    memberships(backend, registry, tx, id).await
}

#[cfg(test)]
mod tests {
    use crate::model::props;
    use crate::{ConceptQuery, Ontology};

    #[tokio::test]
    async fn test_classify_both_encodings() {
        let db = Ontology::open_memory().await.unwrap();
        let concepts = db.concepts();
        let ball = concepts.create(props([("name", "Ball")])).await.unwrap();

        concepts.classify(&ball.element_id, "Substance").await.unwrap();
        concepts.classify(&ball.element_id, "Substance").await.unwrap();
        let subs = concepts.classify(&ball.element_id, "Reality").await.unwrap();
        let names: Vec<_> = subs.iter().map(|s| s.name.as_str()).collect();
        // Quality precedes Relation in taxonomy order
        assert_eq!(names, vec!["Reality", "Substance"]);

        let record = concepts.get(&ball.element_id).await.unwrap();
        assert_eq!(record.quality.as_deref(), Some("Reality"));

        let query = ConceptQuery { category: Some("Relation".into()), ..Default::default() };
        assert_eq!(concepts.list(&query).await.unwrap().len(), 1);

        let subs = concepts.declassify(&ball.element_id, "Substance").await.unwrap();
        assert_eq!(subs.len(), 1);
        let subs = concepts.declassify(&ball.element_id, "Reality").await.unwrap();
        assert!(subs.is_empty());
        assert!(concepts.list(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_subcategory() {
        let db = Ontology::open_memory().await.unwrap();
        let ball = db.concepts().create(props([("name", "Ball")])).await.unwrap();
        let err = db.concepts().classify(&ball.element_id, "Ether").await.unwrap_err();
        assert!(matches!(err, crate::Error::NotFound(_)));
    }
}
