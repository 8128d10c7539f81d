//! # Storage Backend Trait
//!
//! This is THE contract between the ontology service and the property
//! graph store. Every operation the persistence and traversal layers need
//! is defined here; nothing above this module touches store internals.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | In-memory, transactional (undo-log rollback) |

pub mod memory;

use async_trait::async_trait;
use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub use memory::MemoryBackend;

// ============================================================================
// Expand depth specification
// ============================================================================

/// Depth specification for graph expansion.
#[derive(Debug, Clone, Copy)]
pub enum ExpandDepth {
    /// Range: min..max (inclusive)
    Range { min: usize, max: usize },
}

impl ExpandDepth {
    pub fn bounds(self) -> (usize, usize) {
        match self {
            ExpandDepth::Range { min, max } => (min, max),
        }
    }
}

// ============================================================================
// Constraint types
// ============================================================================

/// Type of constraint to create on a label+property pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    /// Property value must be unique for nodes with this label.
    Unique,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The universal storage contract.
///
/// Backends report transient infrastructure faults as
/// `Error::StoreUnavailable` and uniqueness violations as
/// `Error::ConflictFailed`; the service surfaces both unchanged.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shut down the backend. Later calls fail with `StoreUnavailable`.
    async fn shutdown(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction. On failure the transaction stays open and
    /// the caller must roll it back.
    async fn commit_tx(&self, tx: &mut Self::Tx) -> Result<()>;

    /// Roll back a transaction, undoing every write made through it.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Get a node by its element identifier.
    ///
    /// Default: full scan. Backends that can decode their own element ids
    /// should override.
    async fn get_node_by_element_id(&self, tx: &Self::Tx, element_id: &str) -> Result<Option<Node>> {
        let nodes = self.all_nodes(tx).await?;
        Ok(nodes.into_iter().find(|n| n.element_id.as_deref() == Some(element_id)))
    }

    /// Delete a node. Returns true if it existed.
    /// Fails if the node still has relationships (Neo4j semantics).
    async fn delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool>;

    /// Set a property on a node (upsert).
    async fn set_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()>;

    /// Remove a property from a node.
    async fn remove_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
    ) -> Result<()>;

    /// Delete a node and all its relationships in one operation.
    /// Neo4j: `DETACH DELETE n`
    ///
    /// Default: get all relationships, delete each, then delete the node.
    async fn detach_delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool> {
        let rels = self.get_relationships(tx, id, Direction::Both, None).await?;
        for rel in &rels {
            self.delete_relationship(tx, rel.id).await?;
        }
        self.delete_node(tx, id).await
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    async fn get_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>>;

    /// Get a relationship by its element identifier. Default: full scan.
    async fn get_relationship_by_element_id(
        &self,
        tx: &Self::Tx,
        element_id: &str,
    ) -> Result<Option<Relationship>> {
        let rels = self.all_relationships(tx).await?;
        Ok(rels.into_iter().find(|r| r.element_id.as_deref() == Some(element_id)))
    }

    /// Delete a relationship. Returns true if it existed.
    async fn delete_relationship(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    /// Set a property on a relationship (upsert).
    ///
    /// Default: `Unsupported`.
    async fn set_relationship_property(
        &self,
        _tx: &mut Self::Tx,
        _id: RelId,
        _key: &str,
        _val: Value,
    ) -> Result<()> {
        Err(Error::Unsupported("relationship property set not supported".into()))
    }

    /// Remove a property from a relationship.
    ///
    /// Default: `Unsupported`.
    async fn remove_relationship_property(
        &self,
        _tx: &mut Self::Tx,
        _id: RelId,
        _key: &str,
    ) -> Result<()> {
        Err(Error::Unsupported("relationship property remove not supported".into()))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and type.
    /// Returned in relationship-creation order.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    /// Expand from a node: BFS traversal to the given depth, never revisiting
    /// a node within one path, stopping once `limit` paths are collected.
    async fn expand(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
        limit: usize,
    ) -> Result<Vec<Path>>;

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Total number of nodes.
    async fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// Total number of relationships.
    async fn relationship_count(&self, tx: &Self::Tx) -> Result<u64>;

    // ========================================================================
    // Scan
    // ========================================================================

    /// Return all nodes (no label filter).
    async fn all_nodes(&self, tx: &Self::Tx) -> Result<Vec<Node>>;

    /// Return all relationships, in creation order.
    async fn all_relationships(&self, tx: &Self::Tx) -> Result<Vec<Relationship>>;

    /// Find all nodes with a given label.
    async fn nodes_by_label(&self, tx: &Self::Tx, label: &str) -> Result<Vec<Node>>;

    /// Find nodes by label + property value.
    async fn nodes_by_property(
        &self,
        tx: &Self::Tx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>>;

    /// Find all relationships of a given type.
    ///
    /// Default: filters the full relationship scan.
    async fn relationships_by_type(
        &self,
        tx: &Self::Tx,
        rel_type: &str,
    ) -> Result<Vec<Relationship>> {
        let rels = self.all_relationships(tx).await?;
        Ok(rels.into_iter().filter(|r| r.rel_type == rel_type).collect())
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Create a schema constraint. Neo4j: `CREATE CONSTRAINT ... IF NOT EXISTS`.
    /// Creating an identical constraint twice is a no-op.
    ///
    /// Default returns "not supported".
    async fn create_constraint(
        &self,
        _label: &str,
        _property: &str,
        _constraint_type: ConstraintType,
    ) -> Result<()> {
        Err(Error::Unsupported("constraints not supported".into()))
    }
}
