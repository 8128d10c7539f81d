//! Store labels, relationship kinds and the enumerated value sets.

use thiserror::Error;

// ============================================================================
// Labels
// ============================================================================

pub const CONCEPT: &str = "Concept";
pub const CATEGORY: &str = "Category";
pub const SUBCATEGORY: &str = "Subcategory";

pub const INSTANCE_OF: &str = "INSTANCE_OF";
pub const HAS_SUBCATEGORY: &str = "HAS_SUBCATEGORY";

/// Structural edge labels callers may not create through the relationship API.
pub const RESERVED_REL_TYPES: &[&str] = &[INSTANCE_OF, HAS_SUBCATEGORY];

// ============================================================================
// Enumerated value sets
// ============================================================================

pub const QUALITIES: &[&str] = &["Reality", "Negation", "Limitation"];

pub const MODALITIES: &[&str] = &[
    "Possibility/Impossibility",
    "Existence/Non-existence",
    "Necessity/Contingency",
];

pub const STABILITY_STATUSES: &[&str] = &["ephemeral", "stable"];
pub const DEFAULT_STABILITY: &str = "ephemeral";

pub const SPATIAL_UNITS: &[&str] = &[
    "meters", "kilometers", "miles", "feet", "inches", "centimeters", "millimeters",
    "m", "km", "mi", "ft", "in", "cm", "mm",
];

pub const SPATIAL_RELATION_TYPES: &[&str] = &[
    "near", "far", "contains", "within", "overlaps", "intersects", "disjoint",
    "above", "below", "left", "right", "front", "back", "orbits",
];

// ============================================================================
// Relationship kinds
// ============================================================================

/// The fixed semantic relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Property,
    Cause,
    Containment,
    Membership,
    Interaction,
    Temporal,
    Spatial,
}

impl RelationKind {
    pub const ALL: [RelationKind; 7] = [
        RelationKind::Property,
        RelationKind::Cause,
        RelationKind::Containment,
        RelationKind::Membership,
        RelationKind::Interaction,
        RelationKind::Temporal,
        RelationKind::Spatial,
    ];

    /// Store label.
    pub fn label(self) -> &'static str {
        match self {
            RelationKind::Property => "HAS_PROPERTY",
            RelationKind::Cause => "CAUSES",
            RelationKind::Containment => "CONTAINS",
            RelationKind::Membership => "IS_PART_OF",
            RelationKind::Interaction => "INTERACTS_WITH",
            RelationKind::Temporal => "PRECEDES",
            RelationKind::Spatial => "SPATIALLY_RELATES_TO",
        }
    }

    /// Short lower-case alias accepted in place of the label.
    pub fn alias(self) -> &'static str {
        match self {
            RelationKind::Property => "property",
            RelationKind::Cause => "cause",
            RelationKind::Containment => "containment",
            RelationKind::Membership => "membership",
            RelationKind::Interaction => "interaction",
            RelationKind::Temporal => "temporal",
            RelationKind::Spatial => "spatial",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

/// Why a caller-supplied relationship type was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelTypeError {
    #[error("relationship type must not be empty")]
    Empty,
    #[error("relationship type '{0}' must start with a letter and contain only letters, digits and underscores")]
    Malformed(String),
    #[error("relationship type '{0}' is reserved for the category structure")]
    Reserved(String),
}

/// Normalize a caller-supplied relationship type to its store label.
///
/// Kind aliases (`"cause"`) map to their label (`CAUSES`). Anything else is
/// upper-cased and accepted as a custom type if it is a well-formed,
/// non-reserved label.
pub fn normalize_rel_type(raw: &str) -> Result<String, RelTypeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RelTypeError::Empty);
    }
    if let Some(kind) = RelationKind::ALL.into_iter().find(|k| k.alias() == raw) {
        return Ok(kind.label().to_string());
    }

    let label = raw.to_ascii_uppercase();
    let mut chars = label.chars();
    let well_formed = chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !well_formed {
        return Err(RelTypeError::Malformed(raw.to_string()));
    }
    if RESERVED_REL_TYPES.contains(&label.as_str()) {
        return Err(RelTypeError::Reserved(label));
    }
    Ok(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Encoding, TAXONOMY};

    fn names_for(key: &str) -> Vec<&'static str> {
        TAXONOMY
            .iter()
            .filter(|c| matches!(c.encoding, Encoding::Property(k) if k == key))
            .flat_map(|c| c.subcategories.iter().map(|s| s.name))
            .collect()
    }

    #[test]
    fn test_property_sets_match_taxonomy() {
        assert_eq!(names_for("quality"), QUALITIES);
        assert_eq!(names_for("modality"), MODALITIES);
    }

    #[test]
    fn test_normalize_known_kinds() {
        assert_eq!(normalize_rel_type("CAUSES").unwrap(), "CAUSES");
        assert_eq!(normalize_rel_type("cause").unwrap(), "CAUSES");
        assert_eq!(normalize_rel_type("spatial").unwrap(), "SPATIALLY_RELATES_TO");
        assert_eq!(RelationKind::from_label("PRECEDES"), Some(RelationKind::Temporal));
    }

    #[test]
    fn test_normalize_custom_types() {
        assert_eq!(normalize_rel_type("influences").unwrap(), "INFLUENCES");
        assert_eq!(normalize_rel_type(" derived_from_2 ").unwrap(), "DERIVED_FROM_2");
        assert_eq!(normalize_rel_type(""), Err(RelTypeError::Empty));
        assert!(matches!(normalize_rel_type("2FAST"), Err(RelTypeError::Malformed(_))));
        assert!(matches!(normalize_rel_type("has space"), Err(RelTypeError::Malformed(_))));
        assert_eq!(
            normalize_rel_type("instance_of"),
            Err(RelTypeError::Reserved("INSTANCE_OF".into()))
        );
    }
}
