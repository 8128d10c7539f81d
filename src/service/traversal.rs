//! Specialized read-only traversals.
//!
//! Path queries (`causal_chain`, `containment_hierarchy`, `membership`)
//! return BFS-ordered paths from the store's `expand`. Neighbor queries
//! return each reachable concept once, at the hop it was first reached,
//! ordered by `(hop, confidence desc, name, id)`. Both are bounded by
//! `max_depth` and `limit`; cycles are never followed.
//!
//! A neighbor's direction is that of the first edge on its path from the
//! start concept. Temporal walks never turn around: past the first hop an
//! `after` branch only follows outgoing `PRECEDES` and a `before` branch
//! only incoming, so every tag is implied by the edge order.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use crate::identity::{self, NeighborDirection, NeighborRecord, PathRecord};
use crate::model::{Direction, Node, Relationship, Value};
use crate::schema::{RelationKind, CONCEPT, HAS_SUBCATEGORY, INSTANCE_OF};
use crate::storage::{ExpandDepth, StorageBackend};
use crate::tx::TxMode;
use crate::{Ontology, Result};

use super::{load_concept, traversal_bounds, TraversalBounds};

/// Which edges a neighbor query follows.
#[derive(Debug, Clone, Copy)]
enum EdgeFilter {
    Only(RelationKind),
    /// Every concept-to-concept edge.
    Any,
}

impl EdgeFilter {
    fn accepts(self, rel: &Relationship) -> bool {
        match self {
            EdgeFilter::Only(kind) => rel.rel_type == kind.label(),
            EdgeFilter::Any => rel.rel_type != INSTANCE_OF && rel.rel_type != HAS_SUBCATEGORY,
        }
    }
}

pub struct TraversalService<'a, B: StorageBackend> {
    db: &'a Ontology<B>,
}

impl<'a, B: StorageBackend> TraversalService<'a, B> {
    pub(crate) fn new(db: &'a Ontology<B>) -> Self {
        Self { db }
    }

    /// Outgoing `CAUSES` chains.
    pub async fn causal_chain(&self, id: &str, bounds: TraversalBounds) -> Result<Vec<PathRecord>> {
        self.paths(id, RelationKind::Cause, bounds, "traversal.causal_chain").await
    }

    /// Outgoing `CONTAINS` chains.
    pub async fn containment_hierarchy(&self, id: &str, bounds: TraversalBounds) -> Result<Vec<PathRecord>> {
        self.paths(id, RelationKind::Containment, bounds, "traversal.containment").await
    }

    /// Outgoing `IS_PART_OF` chains.
    pub async fn membership(&self, id: &str, bounds: TraversalBounds) -> Result<Vec<PathRecord>> {
        self.paths(id, RelationKind::Membership, bounds, "traversal.membership").await
    }

    /// Concepts reached over outgoing `HAS_PROPERTY` edges.
    pub async fn properties_of(&self, id: &str, bounds: TraversalBounds) -> Result<Vec<NeighborRecord>> {
        self.neighbors(id, EdgeFilter::Only(RelationKind::Property), Direction::Outgoing, bounds, "traversal.properties")
            .await
    }

    /// Reciprocal `INTERACTS_WITH` neighbors in either direction.
    pub async fn interacting(&self, id: &str, bounds: TraversalBounds) -> Result<Vec<NeighborRecord>> {
        self.neighbors(id, EdgeFilter::Only(RelationKind::Interaction), Direction::Both, bounds, "traversal.interacting")
            .await
    }

    /// `PRECEDES` neighbors, tagged `before` or `after` the start concept.
    pub async fn temporal_neighbors(&self, id: &str, bounds: TraversalBounds) -> Result<Vec<NeighborRecord>> {
        self.neighbors(id, EdgeFilter::Only(RelationKind::Temporal), Direction::Both, bounds, "traversal.temporal")
            .await
    }

    /// `SPATIALLY_RELATES_TO` neighbors in either direction.
    pub async fn spatial_neighbors(&self, id: &str, bounds: TraversalBounds) -> Result<Vec<NeighborRecord>> {
        self.neighbors(id, EdgeFilter::Only(RelationKind::Spatial), Direction::Both, bounds, "traversal.spatial")
            .await
    }

    /// Every concept related to this one, whatever the relationship type.
    pub async fn related(&self, id: &str, bounds: TraversalBounds) -> Result<Vec<NeighborRecord>> {
        self.neighbors(id, EdgeFilter::Any, Direction::Both, bounds, "traversal.related").await
    }

    async fn paths(
        &self,
        id: &str,
        kind: RelationKind,
        bounds: TraversalBounds,
        op: &'static str,
    ) -> Result<Vec<PathRecord>> {
        let (depth, limit) = traversal_bounds(&self.db.config.traversal, bounds)?;
        let backend = &self.db.backend;
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let result = expand_paths(backend, &tx, id, kind, depth, limit).await;
        let paths = self.db.finish(tx, result, op).await?;
        debug!(op, start = id, depth, limit, found = paths.len(), "path traversal");
        Ok(paths)
    }

    async fn neighbors(
        &self,
        id: &str,
        filter: EdgeFilter,
        dir: Direction,
        bounds: TraversalBounds,
        op: &'static str,
    ) -> Result<Vec<NeighborRecord>> {
        let (depth, limit) = traversal_bounds(&self.db.config.traversal, bounds)?;
        let backend = &self.db.backend;
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let result = walk(backend, &tx, id, filter, dir, depth, limit).await;
        let found = self.db.finish(tx, result, op).await?;
        debug!(op, start = id, depth, limit, found = found.len(), "neighbor traversal");
        Ok(found)
    }
}

// ============================================================================
// Transaction bodies
// ============================================================================

async fn expand_paths<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
    kind: RelationKind,
    depth: usize,
    limit: usize,
) -> Result<Vec<PathRecord>> {
    let start = load_concept(backend, tx, id).await?;
    let paths = backend
        .expand(tx, start.id, Direction::Outgoing, &[kind.label()], ExpandDepth::Range { min: 1, max: depth }, limit)
        .await?;
    Ok(paths
        .iter()
        .filter(|p| p.nodes.iter().all(|n| n.has_label(CONCEPT)))
        .map(identity::path_record)
        .collect())
}

struct Hit {
    node: Node,
    /// The edge that reached `node`.
    rel: Relationship,
    /// Whether the first edge of the path leaves the start concept.
    outgoing: bool,
    hop: usize,
}

fn confidence(rel: &Relationship) -> f64 {
    rel.get("confidence_score").and_then(Value::as_float).unwrap_or(0.0)
}

fn hit_order(a: &Hit, b: &Hit) -> Ordering {
    a.hop
        .cmp(&b.hop)
        .then_with(|| confidence(&b.rel).partial_cmp(&confidence(&a.rel)).unwrap_or(Ordering::Equal))
        .then_with(|| a.node.get_str("name").unwrap_or_default().cmp(b.node.get_str("name").unwrap_or_default()))
        .then_with(|| a.node.id.cmp(&b.node.id))
}

/// Level-by-level BFS. Stops after the level on which `limit` is reached,
/// since later levels sort after it anyway.
async fn walk<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
    filter: EdgeFilter,
    dir: Direction,
    depth: usize,
    limit: usize,
) -> Result<Vec<NeighborRecord>> {
    let temporal = matches!(filter, EdgeFilter::Only(RelationKind::Temporal));
    let start = load_concept(backend, tx, id).await?;
    let mut visited = HashSet::from([start.id]);
    // Each frontier entry carries the direction of its path's first edge.
    let mut frontier: Vec<(Node, Option<bool>)> = vec![(start, None)];
    let mut hits: Vec<Hit> = Vec::new();

    for hop in 1..=depth {
        let mut next = Vec::new();
        for (from, first) in &frontier {
            let step = match (temporal, first) {
                (true, Some(true)) => Direction::Outgoing,
                (true, Some(false)) => Direction::Incoming,
                _ => dir,
            };
            for rel in backend.get_relationships(tx, from.id, step, None).await? {
                if !filter.accepts(&rel) {
                    continue;
                }
                let Some(other) = rel.other_node(from.id) else { continue };
                if !visited.insert(other) {
                    continue;
                }
                let Some(node) = backend.get_node(tx, other).await?.filter(|n| n.has_label(CONCEPT)) else {
                    continue;
                };
                let outgoing = first.unwrap_or(rel.src == from.id);
                next.push((node.clone(), Some(outgoing)));
                hits.push(Hit { outgoing, node, rel, hop });
            }
        }
        if hits.len() >= limit || next.is_empty() {
            break;
        }
        frontier = next;
    }

    hits.sort_by(hit_order);
    hits.truncate(limit);

    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        let (src, dst) = (backend.get_node(tx, hit.rel.src).await?, backend.get_node(tx, hit.rel.dst).await?);
        let direction = match (temporal, hit.outgoing) {
            (true, true) => NeighborDirection::After,
            (true, false) => NeighborDirection::Before,
            (false, true) => NeighborDirection::Outgoing,
            (false, false) => NeighborDirection::Incoming,
        };
        out.push(NeighborRecord {
            concept: identity::concept_record(&hit.node),
            relationship: identity::relationship_record(&hit.rel, src.as_ref(), dst.as_ref()),
            direction,
            hop: hit.hop,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::props;
    use crate::{Error, NewRelationship};

    async fn concept(db: &Ontology<crate::MemoryBackend>, name: &str) -> String {
        db.concepts().create(props([("name", name)])).await.unwrap().element_id
    }

    async fn link(db: &Ontology<crate::MemoryBackend>, t: &str, a: &str, b: &str, confidence: f64) {
        let mut p = props([("confidence_score", Value::from(confidence)), ("source_information", Value::from("t"))]);
        if t == "PRECEDES" {
            p.insert("temporal_distance".into(), Value::from(1.0));
            p.insert("temporal_unit".into(), Value::from("seconds"));
            p.insert("temporal_order".into(), Value::from(1i64));
        }
        db.relationships().create(NewRelationship::new(t, a, b, p)).await.unwrap();
    }

    #[tokio::test]
    async fn test_causal_chain_depth_and_limit() {
        let db = Ontology::open_memory().await.unwrap();
        let a = concept(&db, "A").await;
        let b = concept(&db, "B").await;
        let c = concept(&db, "C").await;
        link(&db, "CAUSES", &a, &b, 0.9).await;
        link(&db, "CAUSES", &b, &c, 0.9).await;
        link(&db, "CAUSES", &c, &a, 0.9).await;

        let t = db.traversals();
        assert_eq!(t.causal_chain(&a, TraversalBounds::new(1, 100)).await.unwrap().len(), 1);
        let all = t.causal_chain(&a, TraversalBounds::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].end().map(|n| n.name.as_str()), Some("C"));
        assert_eq!(t.causal_chain(&a, TraversalBounds::new(3, 1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_neighbor_ordering() {
        let db = Ontology::open_memory().await.unwrap();
        let hub = concept(&db, "Hub").await;
        let low = concept(&db, "Low").await;
        let high = concept(&db, "High").await;
        let far = concept(&db, "Far").await;
        link(&db, "INTERACTS_WITH", &hub, &low, 0.2).await;
        link(&db, "INTERACTS_WITH", &high, &hub, 0.8).await;
        link(&db, "INTERACTS_WITH", &low, &far, 1.0).await;

        let found = db.traversals().interacting(&hub, TraversalBounds::new(2, 10)).await.unwrap();
        let names: Vec<_> = found.iter().map(|n| (n.concept.name.as_str(), n.hop)).collect();
        assert_eq!(names, vec![("High", 1), ("Low", 1), ("Far", 2)]);
        assert_eq!(found[0].direction, NeighborDirection::Incoming);
        assert_eq!(found[1].direction, NeighborDirection::Outgoing);
    }

    #[tokio::test]
    async fn test_temporal_tags() {
        let db = Ontology::open_memory().await.unwrap();
        let dawn = concept(&db, "Dawn").await;
        let noon = concept(&db, "Noon").await;
        let dusk = concept(&db, "Dusk").await;
        link(&db, "PRECEDES", &dawn, &noon, 0.9).await;
        link(&db, "PRECEDES", &noon, &dusk, 0.9).await;

        let found = db.traversals().temporal_neighbors(&noon, TraversalBounds::new(1, 10)).await.unwrap();
        let tags: Vec<_> = found.iter().map(|n| (n.concept.name.as_str(), n.direction)).collect();
        assert_eq!(tags, vec![("Dawn", NeighborDirection::Before), ("Dusk", NeighborDirection::After)]);
    }

    #[tokio::test]
    async fn test_direction_comes_from_first_hop() {
        let db = Ontology::open_memory().await.unwrap();
        let hub = concept(&db, "Hub").await;
        let spoke = concept(&db, "Spoke").await;
        let rim = concept(&db, "Rim").await;
        link(&db, "INTERACTS_WITH", &hub, &spoke, 0.9).await;
        link(&db, "INTERACTS_WITH", &rim, &spoke, 0.9).await;

        let found = db.traversals().interacting(&hub, TraversalBounds::new(2, 10)).await.unwrap();
        let tagged: Vec<_> = found.iter().map(|n| (n.concept.name.as_str(), n.direction)).collect();
        assert_eq!(
            tagged,
            vec![("Spoke", NeighborDirection::Outgoing), ("Rim", NeighborDirection::Outgoing)]
        );
        // The reported relationship is still the edge that reached the neighbor.
        assert_eq!(found[1].relationship.start_node_id, rim);
    }

    #[tokio::test]
    async fn test_unknown_start_and_bad_bounds() {
        let db = Ontology::open_memory().await.unwrap();
        let err = db.traversals().related("4:mem:424242", TraversalBounds::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let a = concept(&db, "A").await;
        let err = db.traversals().related(&a, TraversalBounds::new(0, 10)).await.unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }
}
