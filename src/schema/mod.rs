//! # Schema Registry
//!
//! Everything about the ontology that is fixed at compile time: the
//! category taxonomy, how each category is encoded on concepts, the
//! relationship kinds and the enumerated value sets the validator checks.

pub mod kinds;
pub mod taxonomy;

pub use kinds::{
    normalize_rel_type, RelTypeError, RelationKind,
    CATEGORY, CONCEPT, HAS_SUBCATEGORY, INSTANCE_OF, SUBCATEGORY,
};
pub use taxonomy::{
    CategoryDef, CategoryEntry, CategoryRegistry, Encoding, QueryStrategy,
    SubcategoryDef, SubcategoryEntry, TAXONOMY,
};
