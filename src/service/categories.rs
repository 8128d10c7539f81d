//! The fixed category registry: seeding at open, read-only lookups after.

use tracing::{debug, info};

use crate::identity::{self, CategoryRecord, SubcategoryRecord};
use crate::model::{props, Direction, Node, NodeId, PropertyMap, Value};
use crate::schema::{
    CategoryEntry, CategoryRegistry, SubcategoryEntry, CATEGORY, HAS_SUBCATEGORY, SUBCATEGORY,
    TAXONOMY,
};
use crate::storage::{ConstraintType, StorageBackend};
use crate::tx::TxMode;
use crate::{Error, Ontology, Result};

// ============================================================================
// Seeding
// ============================================================================

/// Write the taxonomy into the store if it is not there yet and return the
/// frozen registry. Running it again over the same store changes nothing.
pub async fn seed<B: StorageBackend>(backend: &B) -> Result<CategoryRegistry> {
    for label in [CATEGORY, SUBCATEGORY] {
        match backend.create_constraint(label, "name", ConstraintType::Unique).await {
            Ok(()) | Err(Error::Unsupported(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
    match seed_in(backend, &mut tx).await {
        Ok((registry, created)) => {
            if let Err(e) = backend.commit_tx(&mut tx).await {
                backend.rollback_tx(tx).await?;
                return Err(e);
            }
            if created > 0 {
                info!(created, "seeded category taxonomy");
            } else {
                debug!("category taxonomy already present");
            }
            Ok(registry)
        }
        Err(e) => {
            backend.rollback_tx(tx).await?;
            Err(e)
        }
    }
}

async fn seed_in<B: StorageBackend>(backend: &B, tx: &mut B::Tx) -> Result<(CategoryRegistry, usize)> {
    let mut created = 0;
    let mut categories = Vec::with_capacity(TAXONOMY.len());

    for def in TAXONOMY {
        let category = ensure_node(backend, tx, CATEGORY, def.name, props([
            ("name", def.name),
            ("description", def.description),
        ]), &mut created).await?;

        let mut subcategories = Vec::with_capacity(def.subcategories.len());
        for sdef in def.subcategories {
            let mut sprops = props([
                ("name", sdef.name),
                ("description", sdef.description),
                ("formal_definition", sdef.formal_definition),
            ]);
            sprops.insert("examples".into(), Value::from(sdef.examples.to_vec()));
            let sub = ensure_node(backend, tx, SUBCATEGORY, sdef.name, sprops, &mut created).await?;

            let linked = backend
                .get_relationships(tx, category.id, Direction::Outgoing, Some(HAS_SUBCATEGORY))
                .await?
                .iter()
                .any(|r| r.dst == sub.id);
            if !linked {
                backend
                    .create_relationship(tx, category.id, sub.id, HAS_SUBCATEGORY, PropertyMap::new())
                    .await?;
                created += 1;
            }

            subcategories.push(SubcategoryEntry {
                def: sdef,
                element_id: identity::node_id(&sub),
                node: sub.id,
            });
        }

        categories.push(CategoryEntry {
            def,
            element_id: identity::node_id(&category),
            node: category.id,
            subcategories,
        });
    }

    Ok((CategoryRegistry::new(categories), created))
}

/// Find the node with `label` and `name`, creating it if absent.
async fn ensure_node<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    label: &str,
    name: &'static str,
    properties: PropertyMap,
    created: &mut usize,
) -> Result<Node> {
    let existing = backend
        .nodes_by_property(tx, label, "name", &Value::from(name))
        .await?
        .into_iter()
        .min_by_key(|n| n.id);
    if let Some(node) = existing {
        return Ok(node);
    }

    let id: NodeId = backend.create_node(tx, &[label], properties).await?;
    *created += 1;
    backend
        .get_node(tx, id)
        .await?
        .ok_or_else(|| Error::StorageError(format!("{label} {name} vanished after create")))
}

// ============================================================================
// CategoryService
// ============================================================================

/// Read-only access to the taxonomy. It is fixed, so writes are refused.
pub struct CategoryService<'a, B: StorageBackend> {
    db: &'a Ontology<B>,
}

impl<'a, B: StorageBackend> CategoryService<'a, B> {
    pub(crate) fn new(db: &'a Ontology<B>) -> Self {
        Self { db }
    }

    /// All four categories with their subcategories, in stable order.
    pub fn list(&self) -> Vec<CategoryRecord> {
        self.db.registry.categories().iter().map(identity::category_record).collect()
    }

    /// Look a name up as a category, or as a subcategory resolved to the
    /// category that owns it.
    pub fn get_by_name(&self, name: &str) -> Result<CategoryRecord> {
        let category = self
            .db
            .registry
            .resolve(name)
            .ok_or_else(|| Error::NotFound(format!("Category or subcategory '{name}'")))?;
        if category.name() != name {
            debug!(name, category = category.name(), "resolved subcategory to owning category");
        }
        Ok(identity::category_record(category))
    }

    pub fn get_subcategory(&self, name: &str) -> Result<SubcategoryRecord> {
        self.db
            .registry
            .subcategory(name)
            .map(|(c, s)| identity::subcategory_record(c, s))
            .ok_or_else(|| Error::NotFound(format!("Subcategory '{name}'")))
    }

    pub fn create(&self, _payload: &PropertyMap) -> Result<CategoryRecord> {
        Err(fixed_taxonomy("create"))
    }

    pub fn update(&self, _name: &str, _delta: &PropertyMap) -> Result<CategoryRecord> {
        Err(fixed_taxonomy("update"))
    }

    pub fn delete(&self, _name: &str) -> Result<()> {
        Err(fixed_taxonomy("delete"))
    }
}

fn fixed_taxonomy(op: &str) -> Error {
    Error::Unsupported(format!("cannot {op} categories: the taxonomy is fixed"))
}
