//! The fixed four-by-three category taxonomy.
//!
//! Definitions are compiled in. At startup they are seeded into the store
//! and frozen into a [`CategoryRegistry`] that also knows each entry's
//! store identity. Nothing mutates the registry afterwards.

use crate::model::NodeId;

// ============================================================================
// Static definitions
// ============================================================================

/// How membership in a category is recorded on a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// A property on the concept holds the subcategory name.
    Property(&'static str),
    /// An `INSTANCE_OF` edge from the concept to the subcategory node.
    InstanceOf,
}

#[derive(Debug)]
pub struct SubcategoryDef {
    pub name: &'static str,
    pub description: &'static str,
    pub formal_definition: &'static str,
    pub examples: &'static [&'static str],
}

#[derive(Debug)]
pub struct CategoryDef {
    pub name: &'static str,
    pub description: &'static str,
    pub encoding: Encoding,
    pub subcategories: &'static [SubcategoryDef],
}

/// Listing order: categories alphabetically, subcategories as declared.
pub static TAXONOMY: &[CategoryDef] = &[
    CategoryDef {
        name: "Modality",
        description: "Deals with the relation of concepts to the faculty of cognition",
        encoding: Encoding::Property("modality"),
        subcategories: &[
            SubcategoryDef {
                name: "Possibility/Impossibility",
                description: "Agreement or conflict with conditions of experience",
                formal_definition: "Conformity or non-conformity to the formal conditions of experience",
                examples: &["Can be", "Cannot be", "Possible"],
            },
            SubcategoryDef {
                name: "Existence/Non-existence",
                description: "Agreement or conflict with material conditions of experience",
                formal_definition: "Connection or non-connection with the material conditions of experience",
                examples: &["Is", "Is not", "Exists"],
            },
            SubcategoryDef {
                name: "Necessity/Contingency",
                description: "Agreement or determination by material conditions of experience",
                formal_definition: "Determination or non-determination by the general conditions of experience",
                examples: &["Must be", "May be", "Required"],
            },
        ],
    },
    CategoryDef {
        name: "Quality",
        description: "Deals with the content of concepts",
        encoding: Encoding::Property("quality"),
        subcategories: &[
            SubcategoryDef {
                name: "Reality",
                description: "Positive determination",
                formal_definition: "The affirmation of a quality",
                examples: &["Being", "Presence", "Affirmation"],
            },
            SubcategoryDef {
                name: "Negation",
                description: "Negative determination",
                formal_definition: "The denial of a quality",
                examples: &["Not-being", "Absence", "Denial"],
            },
            SubcategoryDef {
                name: "Limitation",
                description: "Bounded determination",
                formal_definition: "The boundary between reality and negation",
                examples: &["Boundary", "Finitude", "Restriction"],
            },
        ],
    },
    CategoryDef {
        name: "Quantity",
        description: "Deals with the extension of concepts",
        encoding: Encoding::InstanceOf,
        subcategories: &[
            SubcategoryDef {
                name: "Unity",
                description: "Concept of One",
                formal_definition: "A concept considered as including only a single instance",
                examples: &["Individual", "Unit", "Single"],
            },
            SubcategoryDef {
                name: "Plurality",
                description: "Concept of Many",
                formal_definition: "A concept considered as a collection of separate instances",
                examples: &["Many", "Collection", "Group"],
            },
            SubcategoryDef {
                name: "Totality",
                description: "Concept of All",
                formal_definition: "Unity and plurality considered together as a whole",
                examples: &["All", "Complete", "Whole"],
            },
        ],
    },
    CategoryDef {
        name: "Relation",
        description: "Deals with how concepts relate to each other",
        encoding: Encoding::InstanceOf,
        subcategories: &[
            SubcategoryDef {
                name: "Substance",
                description: "Relation of inherence and subsistence",
                formal_definition: "The relation of properties to a thing",
                examples: &["Object-property", "Subject-predicate", "Inherence"],
            },
            SubcategoryDef {
                name: "Causality",
                description: "Relation of cause and effect",
                formal_definition: "The relation of cause to effect",
                examples: &["Cause-effect", "If-then", "Production"],
            },
            SubcategoryDef {
                name: "Community",
                description: "Reciprocal relation between agent and patient",
                formal_definition: "Reciprocal causation between active and passive",
                examples: &["Interaction", "Reciprocity", "Mutual influence"],
            },
        ],
    },
];

// ============================================================================
// Frozen registry
// ============================================================================

/// A seeded subcategory: its definition plus its store identity.
#[derive(Debug, Clone)]
pub struct SubcategoryEntry {
    pub def: &'static SubcategoryDef,
    pub node: NodeId,
    pub element_id: String,
}

/// A seeded category with its subcategories in declaration order.
#[derive(Debug, Clone)]
pub struct CategoryEntry {
    pub def: &'static CategoryDef,
    pub node: NodeId,
    pub element_id: String,
    pub subcategories: Vec<SubcategoryEntry>,
}

impl CategoryEntry {
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn encoding(&self) -> Encoding {
        self.def.encoding
    }
}

/// How to select the concepts belonging to a category or subcategory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStrategy {
    /// Concept carries the property with any value.
    PropertyPresent { key: &'static str },
    /// Concept carries the property with exactly this value.
    PropertyEquals { key: &'static str, value: &'static str },
    /// Concept has an `INSTANCE_OF` edge to one of these subcategory nodes.
    InstanceOf { targets: Vec<NodeId> },
}

/// Read-only view of the seeded taxonomy, shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: Vec<CategoryEntry>,
}

impl CategoryRegistry {
    pub fn new(categories: Vec<CategoryEntry>) -> Self {
        Self { categories }
    }

    /// All categories in listing order.
    pub fn categories(&self) -> &[CategoryEntry] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&CategoryEntry> {
        self.categories.iter().find(|c| c.name() == name)
    }

    /// Find a subcategory and its owning category.
    pub fn subcategory(&self, name: &str) -> Option<(&CategoryEntry, &SubcategoryEntry)> {
        self.categories.iter().find_map(|c| {
            c.subcategories
                .iter()
                .find(|s| s.def.name == name)
                .map(|s| (c, s))
        })
    }

    /// Resolve a name to a category. A subcategory name resolves to the
    /// category that owns it.
    pub fn resolve(&self, name: &str) -> Option<&CategoryEntry> {
        self.category(name).or_else(|| self.subcategory(name).map(|(c, _)| c))
    }

    /// Dispatch for a category filter.
    pub fn strategy_for_category(&self, name: &str) -> Option<QueryStrategy> {
        let cat = self.category(name)?;
        Some(match cat.encoding() {
            Encoding::Property(key) => QueryStrategy::PropertyPresent { key },
            Encoding::InstanceOf => QueryStrategy::InstanceOf {
                targets: cat.subcategories.iter().map(|s| s.node).collect(),
            },
        })
    }

    /// Dispatch for a subcategory filter.
    pub fn strategy_for_subcategory(&self, name: &str) -> Option<QueryStrategy> {
        let (cat, sub) = self.subcategory(name)?;
        Some(match cat.encoding() {
            Encoding::Property(key) => QueryStrategy::PropertyEquals { key, value: sub.def.name },
            Encoding::InstanceOf => QueryStrategy::InstanceOf { targets: vec![sub.node] },
        })
    }
}
