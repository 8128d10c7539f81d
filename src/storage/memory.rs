//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! It uses hash maps protected by `RwLock`s and an undo log per transaction.
//!
//! ## Semantics
//!
//! - **Rollback is real**: every write made through a `ReadWrite`
//!   transaction records its inverse; `rollback_tx()` replays them newest
//!   first. `commit_tx()` just drops the log. A commit refused by a shut
//!   down store keeps the log, so the caller can still roll back.
//! - **Isolation is read-committed at best**: writes are visible to other
//!   transactions immediately. Two writers touching the same entity get
//!   last-writer-wins, and rolling one back never reverts a property the
//!   other has since overwritten.
//! - **Unique constraints are enforced** under the node map write lock, so
//!   two concurrent creators cannot both win.
//! - **Element ids** are `4:<instance>:<n>` for nodes and `5:<instance>:<n>`
//!   for relationships, mirroring Neo4j 5.x.
//! - After `shutdown()` every call fails with `StoreUnavailable`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::model::*;
use crate::tx::{Transaction, TxMode, TxId};
use crate::{Error, Result};
use super::{ConstraintType, ExpandDepth, StorageBackend};

const NODE_PREFIX: &str = "4";
const REL_PREFIX: &str = "5";

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage. Clones share one store.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

/// Adjacency list: relationship ids in creation order.
type AdjList = SmallVec<[RelId; 4]>;

struct MemoryInner {
    /// Instance tag embedded in element ids.
    instance: String,
    /// (label, property) pairs with a uniqueness constraint
    unique: RwLock<Vec<(String, String)>>,
    nodes: RwLock<HashMap<NodeId, Node>>,
    relationships: RwLock<HashMap<RelId, Relationship>>,
    /// node_id → relationship IDs touching it
    adjacency: RwLock<HashMap<NodeId, AdjList>>,
    /// label → node IDs (poor man's label index)
    label_index: RwLock<HashMap<String, Vec<NodeId>>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_instance("mem")
    }

    /// Create a backend whose element ids carry the given instance tag.
    pub fn with_instance(instance: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                instance: instance.into(),
                unique: RwLock::new(Vec::new()),
                nodes: RwLock::new(HashMap::new()),
                relationships: RwLock::new(HashMap::new()),
                adjacency: RwLock::new(HashMap::new()),
                label_index: RwLock::new(HashMap::new()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::StoreUnavailable("memory backend has been shut down".into()));
        }
        Ok(())
    }

    fn ensure_writable(&self, tx: &MemoryTx) -> Result<()> {
        self.ensure_open()?;
        if !tx.is_writable() {
            return Err(Error::TxError(format!("{} is read-only", tx.id)));
        }
        Ok(())
    }

    fn element_id(&self, prefix: &str, n: u64) -> String {
        format!("{prefix}:{}:{n}", self.instance)
    }

    /// Decode `<prefix>:<instance>:<n>`; None for foreign or malformed ids.
    fn decode(&self, prefix: &str, element_id: &str) -> Option<u64> {
        let mut parts = element_id.splitn(3, ':');
        let (p, inst, n) = (parts.next()?, parts.next()?, parts.next()?);
        if p != prefix || inst != self.instance {
            return None;
        }
        n.parse().ok()
    }

    /// Fail with `ConflictFailed` if `props` would duplicate a unique value
    /// among nodes carrying one of `labels`. `exclude` skips the node itself.
    fn check_unique(
        &self,
        nodes: &HashMap<NodeId, Node>,
        labels: &[String],
        props: &PropertyMap,
        exclude: Option<NodeId>,
    ) -> Result<()> {
        let unique = self.unique.read();
        for (label, key) in unique.iter().filter(|(l, _)| labels.contains(l)) {
            let Some(value) = props.get(key).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = nodes.values().any(|n| {
                Some(n.id) != exclude && n.has_label(label) && n.get(key) == Some(value)
            });
            if clash {
                return Err(Error::ConflictFailed(format!(
                    "{label}.{key} = {value} already exists"
                )));
            }
        }
        Ok(())
    }

    fn index_node(&self, id: NodeId, labels: &[String]) {
        {
            let mut idx = self.label_index.write();
            for label in labels {
                idx.entry(label.clone()).or_default().push(id);
            }
        }
        self.adjacency.write().entry(id).or_default();
    }

    fn insert_node(&self, node: Node) {
        self.index_node(node.id, &node.labels);
        self.nodes.write().insert(node.id, node);
    }

    fn remove_node(&self, id: NodeId) -> Option<Node> {
        let removed = self.nodes.write().remove(&id);
        self.adjacency.write().remove(&id);
        if let Some(node) = &removed {
            let mut idx = self.label_index.write();
            for label in &node.labels {
                if let Some(ids) = idx.get_mut(label) {
                    ids.retain(|nid| *nid != id);
                }
            }
        }
        removed
    }

    fn insert_rel(&self, rel: Relationship) {
        let (id, src, dst) = (rel.id, rel.src, rel.dst);
        self.relationships.write().insert(id, rel);

        // Keep adjacency sorted by id so creation order survives a rollback.
        let mut adj = self.adjacency.write();
        for endpoint in [src, dst] {
            let list = adj.entry(endpoint).or_default();
            if let Err(pos) = list.binary_search(&id) {
                list.insert(pos, id);
            }
        }
    }

    fn remove_rel(&self, id: RelId) -> Option<Relationship> {
        let removed = self.relationships.write().remove(&id);
        if let Some(rel) = &removed {
            let mut adj = self.adjacency.write();
            for endpoint in [rel.src, rel.dst] {
                if let Some(rels) = adj.get_mut(&endpoint) {
                    rels.retain(|rid| *rid != id);
                }
            }
        }
        removed
    }

    fn undo(&self, entry: Undo) {
        match entry {
            Undo::NodeCreated(id) => {
                self.remove_node(id);
            }
            Undo::NodeDeleted(node) => self.insert_node(node),
            Undo::NodeProperty { id, key, previous, written } => {
                if let Some(node) = self.nodes.write().get_mut(&id) {
                    restore_property(&mut node.properties, key, previous, written);
                }
            }
            Undo::RelCreated(id) => {
                self.remove_rel(id);
            }
            Undo::RelDeleted(rel) => self.insert_rel(rel),
            Undo::RelProperty { id, key, previous, written } => {
                if let Some(rel) = self.relationships.write().get_mut(&id) {
                    restore_property(&mut rel.properties, key, previous, written);
                }
            }
        }
    }
}

/// Put `previous` back, unless another transaction has replaced the value
/// this one wrote. Its later write stands.
fn restore_property(props: &mut PropertyMap, key: String, previous: Option<Value>, written: Option<Value>) {
    if props.get(&key) != written.as_ref() {
        return;
    }
    match previous {
        Some(v) => { props.insert(key, v); }
        None => { props.remove(&key); }
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// Inverse of one write, replayed on rollback.
#[derive(Debug)]
enum Undo {
    NodeCreated(NodeId),
    NodeDeleted(Node),
    /// `written` is what this transaction left under `key` (`None` = removed).
    NodeProperty { id: NodeId, key: String, previous: Option<Value>, written: Option<Value> },
    RelCreated(RelId),
    RelDeleted(Relationship),
    RelProperty { id: RelId, key: String, previous: Option<Value>, written: Option<Value> },
}

/// In-memory transaction carrying its undo log.
#[derive(Debug)]
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    undo: Vec<Undo>,
}

impl MemoryTx {
    /// Number of writes recorded so far.
    pub fn pending_writes(&self) -> usize {
        self.undo.len()
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn shutdown(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        tracing::info!(instance = %self.inner.instance, "memory backend shut down");
        Ok(())
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        self.inner.ensure_open()?;
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode, undo: Vec::new() })
    }

    async fn commit_tx(&self, tx: &mut MemoryTx) -> Result<()> {
        self.inner.ensure_open()?;
        tracing::trace!(tx = %tx.id, writes = tx.undo.len(), "commit");
        tx.undo.clear();
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        tracing::debug!(tx = %tx.id, writes = tx.undo.len(), "rollback");
        for entry in tx.undo.into_iter().rev() {
            self.inner.undo(entry);
        }
        Ok(())
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        self.inner.ensure_writable(tx)?;
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();

        let id = {
            let mut nodes = self.inner.nodes.write();
            self.inner.check_unique(&nodes, &labels, &props, None)?;
            let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
            nodes.insert(id, Node {
                id,
                element_id: Some(self.inner.element_id(NODE_PREFIX, id.0)),
                labels: labels.clone(),
                properties: props,
            });
            id
        };

        self.inner.index_node(id, &labels);
        tx.undo.push(Undo::NodeCreated(id));
        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        self.inner.ensure_open()?;
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    async fn get_node_by_element_id(&self, _tx: &MemoryTx, element_id: &str) -> Result<Option<Node>> {
        self.inner.ensure_open()?;
        Ok(self.inner
            .decode(NODE_PREFIX, element_id)
            .and_then(|n| self.inner.nodes.read().get(&NodeId(n)).cloned()))
    }

    async fn delete_node(&self, tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
        self.inner.ensure_writable(tx)?;
        // Check for existing relationships (Neo4j semantics: can't delete connected node)
        {
            let adj = self.inner.adjacency.read();
            if let Some(rels) = adj.get(&id) {
                if !rels.is_empty() {
                    return Err(Error::StorageError(
                        format!("Cannot delete node {id} with {} relationships. Delete relationships first.", rels.len())
                    ));
                }
            }
        }

        let removed = self.inner.remove_node(id);
        let existed = removed.is_some();
        if let Some(node) = removed {
            tx.undo.push(Undo::NodeDeleted(node));
        }
        Ok(existed)
    }

    async fn set_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        self.inner.ensure_writable(tx)?;
        let mut nodes = self.inner.nodes.write();
        let (labels, candidate) = {
            let node = nodes.get(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
            let mut candidate = PropertyMap::new();
            candidate.insert(key.to_string(), val.clone());
            (node.labels.clone(), candidate)
        };
        self.inner.check_unique(&nodes, &labels, &candidate, Some(id))?;

        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        let previous = node.properties.insert(key.to_string(), val.clone());
        tx.undo.push(Undo::NodeProperty { id, key: key.to_string(), previous, written: Some(val) });
        Ok(())
    }

    async fn remove_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
    ) -> Result<()> {
        self.inner.ensure_writable(tx)?;
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        if let Some(previous) = node.properties.remove(key) {
            tx.undo.push(Undo::NodeProperty { id, key: key.to_string(), previous: Some(previous), written: None });
        }
        Ok(())
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        self.inner.ensure_writable(tx)?;
        // Verify both nodes exist
        {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&src) {
                return Err(Error::NotFound(format!("Source node {src}")));
            }
            if !nodes.contains_key(&dst) {
                return Err(Error::NotFound(format!("Target node {dst}")));
            }
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        let rel = Relationship {
            id,
            element_id: Some(self.inner.element_id(REL_PREFIX, id.0)),
            src,
            dst,
            rel_type: rel_type.to_string(),
            properties: props,
        };

        self.inner.insert_rel(rel);
        tx.undo.push(Undo::RelCreated(id));
        Ok(id)
    }

    async fn get_relationship(&self, _tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        self.inner.ensure_open()?;
        Ok(self.inner.relationships.read().get(&id).cloned())
    }

    async fn get_relationship_by_element_id(
        &self,
        _tx: &MemoryTx,
        element_id: &str,
    ) -> Result<Option<Relationship>> {
        self.inner.ensure_open()?;
        Ok(self.inner
            .decode(REL_PREFIX, element_id)
            .and_then(|n| self.inner.relationships.read().get(&RelId(n)).cloned()))
    }

    async fn set_relationship_property(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        self.inner.ensure_writable(tx)?;
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        let previous = rel.properties.insert(key.to_string(), val.clone());
        tx.undo.push(Undo::RelProperty { id, key: key.to_string(), previous, written: Some(val) });
        Ok(())
    }

    async fn remove_relationship_property(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        key: &str,
    ) -> Result<()> {
        self.inner.ensure_writable(tx)?;
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        if let Some(previous) = rel.properties.remove(key) {
            tx.undo.push(Undo::RelProperty { id, key: key.to_string(), previous: Some(previous), written: None });
        }
        Ok(())
    }

    async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        self.inner.ensure_writable(tx)?;
        let removed = self.inner.remove_rel(id);
        let existed = removed.is_some();
        if let Some(rel) = removed {
            tx.undo.push(Undo::RelDeleted(rel));
        }
        Ok(existed)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        self.inner.ensure_open()?;
        let adj = self.inner.adjacency.read();
        let rels = self.inner.relationships.read();

        let Some(rel_ids) = adj.get(&node) else {
            return Ok(Vec::new());
        };

        Ok(rel_ids
            .iter()
            .filter_map(|rid| rels.get(rid))
            .filter(|rel| match dir {
                Direction::Outgoing => rel.src == node,
                Direction::Incoming => rel.dst == node,
                Direction::Both => true,
            })
            .filter(|rel| rel_type.map_or(true, |t| rel.rel_type == t))
            .cloned()
            .collect())
    }

    async fn expand(
        &self,
        tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
        limit: usize,
    ) -> Result<Vec<Path>> {
        let (min_depth, max_depth) = depth.bounds();

        let mut results = Vec::new();
        let start_node = self.get_node(tx, node).await?
            .ok_or_else(|| Error::NotFound(format!("Node {node}")))?;

        // BFS expansion
        let mut queue: Vec<Path> = vec![Path::single(start_node)];

        'levels: for current_depth in 0..max_depth {
            let mut next_queue = Vec::new();

            for path in &queue {
                let Some(tip) = path.end() else { continue };
                let tip_id = tip.id;
                let rels = self.get_relationships(tx, tip_id, dir, None).await?;

                for rel in rels {
                    // Type filter
                    if !rel_types.is_empty() && !rel_types.contains(&rel.rel_type.as_str()) {
                        continue;
                    }

                    let next_id = rel.other_node(tip_id).unwrap_or(rel.dst);

                    // Avoid cycles
                    if path.visits(next_id) {
                        continue;
                    }

                    if let Some(next_node) = self.get_node(tx, next_id).await? {
                        let mut new_path = path.clone();
                        new_path.append(rel, next_node);

                        if current_depth + 1 >= min_depth {
                            results.push(new_path.clone());
                            if results.len() >= limit {
                                break 'levels;
                            }
                        }
                        if current_depth + 1 < max_depth {
                            next_queue.push(new_path);
                        }
                    }
                }
            }

            queue = next_queue;
            if queue.is_empty() { break; }
        }

        Ok(results)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    async fn node_count(&self, _tx: &MemoryTx) -> Result<u64> {
        self.inner.ensure_open()?;
        Ok(self.inner.nodes.read().len() as u64)
    }

    async fn relationship_count(&self, _tx: &MemoryTx) -> Result<u64> {
        self.inner.ensure_open()?;
        Ok(self.inner.relationships.read().len() as u64)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn all_nodes(&self, _tx: &MemoryTx) -> Result<Vec<Node>> {
        self.inner.ensure_open()?;
        let mut nodes: Vec<Node> = self.inner.nodes.read().values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn all_relationships(&self, _tx: &MemoryTx) -> Result<Vec<Relationship>> {
        self.inner.ensure_open()?;
        let mut rels: Vec<Relationship> =
            self.inner.relationships.read().values().cloned().collect();
        rels.sort_by_key(|r| r.id);
        Ok(rels)
    }

    async fn nodes_by_label(&self, _tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        self.inner.ensure_open()?;
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let Some(ids) = idx.get(label) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| nodes.get(id).cloned()).collect())
    }

    async fn nodes_by_property(
        &self,
        tx: &MemoryTx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>> {
        // Brute force scan (memory backend doesn't have real property indexes)
        let nodes = self.nodes_by_label(tx, label).await?;
        Ok(nodes.into_iter().filter(|n| n.get(key) == Some(value)).collect())
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    async fn create_constraint(
        &self,
        label: &str,
        property: &str,
        constraint_type: ConstraintType,
    ) -> Result<()> {
        self.inner.ensure_open()?;
        let ConstraintType::Unique = constraint_type;

        // Lock order is nodes before constraints everywhere.
        let nodes = self.inner.nodes.read();
        let mut unique = self.inner.unique.write();
        if unique.iter().any(|(l, p)| l == label && p == property) {
            return Ok(());
        }

        // Existing data must already satisfy the constraint.
        let mut seen: Vec<&Value> = Vec::new();
        for node in nodes.values().filter(|n| n.has_label(label)) {
            if let Some(v) = node.get(property).filter(|v| !v.is_null()) {
                if seen.contains(&v) {
                    return Err(Error::ConflictFailed(format!(
                        "cannot create unique constraint on {label}.{property}: duplicate {v}"
                    )));
                }
                seen.push(v);
            }
        }

        unique.push((label.to_string(), property.to_string()));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let mut props = PropertyMap::new();
        props.insert("name".into(), Value::from("Heat"));

        let id = db.create_node(&mut tx, &["Concept"], props).await.unwrap();
        let node = db.get_node(&tx, id).await.unwrap().unwrap();

        assert_eq!(node.labels, vec!["Concept"]);
        assert_eq!(node.get("name"), Some(&Value::from("Heat")));
        assert_eq!(node.element_id.as_deref(), Some("4:mem:1"));
    }

    #[tokio::test]
    async fn test_element_id_lookup() {
        let db = MemoryBackend::with_instance("abc");
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let r = db.create_relationship(&mut tx, a, b, "CAUSES", PropertyMap::new()).await.unwrap();

        let node = db.get_node_by_element_id(&tx, "4:abc:1").await.unwrap().unwrap();
        assert_eq!(node.id, a);
        let rel = db.get_relationship_by_element_id(&tx, "5:abc:1").await.unwrap().unwrap();
        assert_eq!(rel.id, r);

        // Wrong prefix, foreign instance, garbage
        assert!(db.get_node_by_element_id(&tx, "5:abc:1").await.unwrap().is_none());
        assert!(db.get_node_by_element_id(&tx, "4:xyz:1").await.unwrap().is_none());
        assert!(db.get_node_by_element_id(&tx, "not-an-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cannot_delete_connected_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, b, "CAUSES", PropertyMap::new()).await.unwrap();

        let result = db.delete_node(&mut tx, a).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_detach_delete_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, b, "CAUSES", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, b, a, "CONTAINS", PropertyMap::new()).await.unwrap();

        assert!(db.detach_delete_node(&mut tx, a).await.unwrap());
        assert!(db.get_node(&tx, a).await.unwrap().is_none());
        assert_eq!(db.relationship_count(&tx).await.unwrap(), 0);
        assert!(db.get_relationships(&tx, b, Direction::Both, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_undoes_every_write() {
        let db = MemoryBackend::new();

        let mut setup = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let a = db.create_node(&mut setup, &["Concept"], props([("name", "A")])).await.unwrap();
        let b = db.create_node(&mut setup, &["Concept"], props([("name", "B")])).await.unwrap();
        let r = db.create_relationship(&mut setup, a, b, "CAUSES", PropertyMap::new()).await.unwrap();
        db.commit_tx(&mut setup).await.unwrap();

        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.set_node_property(&mut tx, b, "name", Value::from("B2")).await.unwrap();
        db.create_node(&mut tx, &["Concept"], props([("name", "C")])).await.unwrap();
        db.detach_delete_node(&mut tx, a).await.unwrap();
        assert_eq!(tx.pending_writes(), 4);
        db.rollback_tx(tx).await.unwrap();

        let check = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(db.node_count(&check).await.unwrap(), 2);
        assert_eq!(db.get_node(&check, b).await.unwrap().unwrap().get_str("name"), Some("B"));
        let rel = db.get_relationship(&check, r).await.unwrap().unwrap();
        assert_eq!((rel.src, rel.dst), (a, b));
        assert_eq!(db.get_relationships(&check, a, Direction::Outgoing, None).await.unwrap().len(), 1);
        assert_eq!(db.nodes_by_label(&check, "Concept").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_read_only_tx_rejects_writes() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let err = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::TxError(_)));
    }

    #[tokio::test]
    async fn test_unique_constraint() {
        let db = MemoryBackend::new();
        db.create_constraint("Category", "name", ConstraintType::Unique).await.unwrap();
        // Idempotent
        db.create_constraint("Category", "name", ConstraintType::Unique).await.unwrap();

        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.create_node(&mut tx, &["Category"], props([("name", "Quality")])).await.unwrap();
        let other = db.create_node(&mut tx, &["Category"], props([("name", "Quantity")])).await.unwrap();
        // Other labels are unconstrained
        db.create_node(&mut tx, &["Concept"], props([("name", "Quality")])).await.unwrap();

        let err = db
            .create_node(&mut tx, &["Category"], props([("name", "Quality")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConflictFailed(_)));

        let err = db
            .set_node_property(&mut tx, other, "name", Value::from("Quality"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConflictFailed(_)));
        // Re-setting its own value is fine
        db.set_node_property(&mut tx, other, "name", Value::from("Quantity")).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_makes_store_unavailable() {
        let db = MemoryBackend::new();
        db.shutdown().await.unwrap();
        let err = db.begin_tx(TxMode::ReadOnly).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rollback_keeps_later_committed_write() {
        let db = MemoryBackend::new();
        let mut setup = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let a = db.create_node(&mut setup, &["Concept"], props([("name", "A")])).await.unwrap();
        let b = db.create_node(&mut setup, &["Concept"], props([("name", "B")])).await.unwrap();
        let r = db.create_relationship(&mut setup, a, b, "CAUSES", PropertyMap::new()).await.unwrap();
        db.commit_tx(&mut setup).await.unwrap();

        let mut slow = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.set_node_property(&mut slow, a, "description", Value::from("slow")).await.unwrap();
        db.remove_node_property(&mut slow, b, "name").await.unwrap();
        db.set_relationship_property(&mut slow, r, "note", Value::from("slow")).await.unwrap();

        let mut fast = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.set_node_property(&mut fast, a, "description", Value::from("fast")).await.unwrap();
        db.set_node_property(&mut fast, b, "name", Value::from("B2")).await.unwrap();
        db.commit_tx(&mut fast).await.unwrap();

        db.rollback_tx(slow).await.unwrap();

        let check = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let a = db.get_node(&check, a).await.unwrap().unwrap();
        assert_eq!(a.get_str("description"), Some("fast"));
        let b = db.get_node(&check, b).await.unwrap().unwrap();
        assert_eq!(b.get_str("name"), Some("B2"));
        // Untouched by anyone else, so the rollback applies.
        let rel = db.get_relationship(&check, r).await.unwrap().unwrap();
        assert!(rel.get("note").is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_is_rolled_back() {
        let backend = MemoryBackend::new();
        let db = crate::Ontology::open(backend.clone(), crate::ServiceConfig::default()).await.unwrap();
        let before = backend.inner.nodes.read().len();

        let mut tx = backend.begin_tx(TxMode::ReadWrite).await.unwrap();
        backend.create_node(&mut tx, &["Concept"], props([("name", "Late")])).await.unwrap();
        db.shutdown().await.unwrap();

        let err = db.finish(tx, Ok(()), "test").await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert_eq!(backend.inner.nodes.read().len(), before);
    }

    #[tokio::test]
    async fn test_relationship_properties() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let rel_id = db.create_relationship(
            &mut tx, a, b, "PRECEDES", PropertyMap::new(),
        ).await.unwrap();

        db.set_relationship_property(&mut tx, rel_id, "temporal_order", Value::from(1i64)).await.unwrap();
        let rel = db.get_relationship(&tx, rel_id).await.unwrap().unwrap();
        assert_eq!(rel.get("temporal_order"), Some(&Value::from(1i64)));

        db.remove_relationship_property(&mut tx, rel_id, "temporal_order").await.unwrap();
        let rel = db.get_relationship(&tx, rel_id).await.unwrap().unwrap();
        assert!(rel.get("temporal_order").is_none());
    }

    #[tokio::test]
    async fn test_relationships_by_type() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let c = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();

        db.create_relationship(&mut tx, a, b, "CAUSES", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, b, c, "CONTAINS", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, c, "CAUSES", PropertyMap::new()).await.unwrap();

        assert_eq!(db.relationships_by_type(&tx, "CAUSES").await.unwrap().len(), 2);
        assert_eq!(db.relationships_by_type(&tx, "CONTAINS").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_traversal() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();
        let c = db.create_node(&mut tx, &["Concept"], PropertyMap::new()).await.unwrap();

        db.create_relationship(&mut tx, a, b, "CAUSES", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, b, c, "CAUSES", PropertyMap::new()).await.unwrap();
        // Cycle back to the start is never followed
        db.create_relationship(&mut tx, c, a, "CAUSES", PropertyMap::new()).await.unwrap();

        let paths = db.expand(
            &tx, a, Direction::Outgoing, &["CAUSES"], ExpandDepth::Range { min: 1, max: 5 }, 100,
        ).await.unwrap();

        // Should find a->b and a->b->c
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].len(), 1);
        assert_eq!(paths[1].end().map(|n| n.id), Some(c));

        let capped = db.expand(
            &tx, a, Direction::Outgoing, &["CAUSES"], ExpandDepth::Range { min: 1, max: 5 }, 1,
        ).await.unwrap();
        assert_eq!(capped.len(), 1);
    }
}
