//! # kantian-graph: Kantian Knowledge Graph Service
//!
//! CRUD and validation over a property graph of concepts, organized under
//! a fixed four-category, twelve-subcategory taxonomy.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the service and storage
//! 2. **Clean DTOs**: `Node`, `Relationship`, `Value` cross the storage boundary;
//!    only [`identity`] turns them into API records
//! 3. **Table-driven validation**: rules live in a registry, not in handlers
//! 4. **One dispatch for two encodings**: Quality/Modality are concept properties,
//!    Quantity/Relation are `INSTANCE_OF` edges; callers never see the difference
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kantian_graph::{Ontology, PropertyMap, Value};
//!
//! # async fn example() -> kantian_graph::Result<()> {
//! let db = Ontology::open_memory().await?;
//!
//! let mut payload = PropertyMap::new();
//! payload.insert("name".into(), Value::from("Heat"));
//! payload.insert("quality".into(), Value::from("Reality"));
//! let heat = db.concepts().create(payload).await?;
//!
//! let chains = db.traversals().causal_chain(&heat.element_id, Default::default()).await?;
//! println!("{} causal paths from {}", chains.len(), heat.name);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod tx;
pub mod schema;
pub mod validation;
pub mod identity;
pub mod config;
pub mod service;

#[cfg(feature = "http")]
pub mod http;

use std::sync::Arc;

use tracing::{debug, info, warn};

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Path, Value, PropertyMap,
    NodeId, RelId, Direction,
};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{StorageBackend, ConstraintType, ExpandDepth, MemoryBackend};

// ============================================================================
// Re-exports: Transactions
// ============================================================================

pub use tx::{Transaction, TxMode, TxId};

// ============================================================================
// Re-exports: Service surface
// ============================================================================

pub use config::ServiceConfig;
pub use identity::{
    CategoryRecord, ConceptRecord, NeighborDirection, NeighborRecord, PathRecord,
    RelationshipRecord, SubcategoryRecord,
};
pub use schema::{CategoryRegistry, RelationKind};
pub use service::{
    CategoryService, ConceptQuery, ConceptService, NewRelationship, RelationshipQuery,
    RelationshipService, TraversalBounds, TraversalService,
};
pub use validation::{EntityKind, RuleRegistry, Violation, Violations};

// ============================================================================
// Top-level Ontology handle
// ============================================================================

/// The primary entry point. An `Ontology` wraps a storage backend together
/// with the frozen category registry and the validation rules.
pub struct Ontology<B: StorageBackend> {
    pub(crate) backend: B,
    pub(crate) registry: Arc<CategoryRegistry>,
    pub(crate) rules: RuleRegistry,
    pub(crate) config: ServiceConfig,
}

impl<B: StorageBackend> Ontology<B> {
    /// Open the service over a backend: seed the taxonomy (idempotent),
    /// install constraints, freeze the category registry.
    pub async fn open(backend: B, config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let registry = service::categories::seed(&backend).await?;
        if config.unique_concept_names {
            backend.create_constraint(schema::CONCEPT, "name", ConstraintType::Unique).await?;
        }
        info!(
            categories = registry.categories().len(),
            unique_concept_names = config.unique_concept_names,
            "ontology opened"
        );
        Ok(Self {
            backend,
            registry: Arc::new(registry),
            rules: RuleRegistry::standard(),
            config,
        })
    }

    /// Replace the rule tables (e.g. to register rules for custom types).
    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = rules;
        self
    }

    pub fn concepts(&self) -> ConceptService<'_, B> {
        ConceptService::new(self)
    }

    pub fn relationships(&self) -> RelationshipService<'_, B> {
        RelationshipService::new(self)
    }

    pub fn categories(&self) -> CategoryService<'_, B> {
        CategoryService::new(self)
    }

    pub fn traversals(&self) -> TraversalService<'_, B> {
        TraversalService::new(self)
    }

    /// The frozen taxonomy.
    pub fn registry(&self) -> &Arc<CategoryRegistry> {
        &self.registry
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Shut the backend down; later calls fail with `StoreUnavailable`.
    pub async fn shutdown(&self) -> Result<()> {
        self.backend.shutdown().await
    }

    /// End a transaction: commit on `Ok`, roll back on `Err` or when the
    /// commit itself fails.
    pub(crate) async fn finish<T>(&self, mut tx: B::Tx, result: Result<T>, op: &'static str) -> Result<T> {
        let (id, writable) = (tx.id(), tx.is_writable());
        let err = match result {
            Ok(value) => match self.backend.commit_tx(&mut tx).await {
                Ok(()) => {
                    if writable {
                        info!(op, tx = %id, "committed");
                    } else {
                        debug!(op, tx = %id, "read");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(op, tx = %id, error = %err, "commit failed, rolling back");
                    err
                }
            },
            Err(err) => {
                if writable {
                    warn!(op, tx = %id, error = %err, "rolling back");
                } else {
                    debug!(op, tx = %id, error = %err, "read failed");
                }
                err
            }
        };
        if let Err(rb) = self.backend.rollback_tx(tx).await {
            warn!(op, tx = %id, error = %rb, "rollback failed");
        }
        Err(err)
    }
}

/// In-memory ontology for testing and embedding.
impl Ontology<MemoryBackend> {
    pub async fn open_memory() -> Result<Self> {
        Self::open(MemoryBackend::new(), ServiceConfig::default()).await
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(Violations),

    #[error("Conflict: {0}")]
    ConflictFailed(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::ValidationFailed(_) => 422,
            Error::ConflictFailed(_) => 409,
            Error::Unsupported(_) => 405,
            Error::StoreUnavailable(_)
            | Error::TxError(_)
            | Error::StorageError(_)
            | Error::Config(_)
            | Error::Io(_) => 500,
        }
    }

    /// Violations carried by a `ValidationFailed`.
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            Error::ValidationFailed(v) => Some(v),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
