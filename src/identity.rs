//! # Identity & Mapping
//!
//! The only code that turns store entities into API records. Every record
//! carries its store identity under the single field name
//! [`ID_FIELD`]; no other module builds or renames that field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Node, NodeId, Path, Relationship, Value, props_to_json};
use crate::schema::{CategoryEntry, SubcategoryEntry};

/// Canonical identifier field on every record.
pub const ID_FIELD: &str = "elementId";

/// Concept properties with a dedicated record field.
const CONCEPT_FIELDS: &[&str] = &[
    "name",
    "description",
    "confidence_score",
    "stability_status",
    "source_information",
    "creation_timestamp",
    "quality",
    "modality",
];

/// External identifier of a node.
pub fn node_id(node: &Node) -> String {
    node.element_id.clone().unwrap_or_else(|| node.id.to_string())
}

/// External identifier of a relationship.
pub fn relationship_id(rel: &Relationship) -> String {
    rel.element_id.clone().unwrap_or_else(|| rel.id.to_string())
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    #[serde(rename = "elementId")]
    pub element_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_information: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    /// Any further properties stored on the concept.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    #[serde(rename = "elementId")]
    pub element_id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub start_node_id: String,
    pub end_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_node_name: Option<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl RelationshipRecord {
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcategoryRecord {
    #[serde(rename = "elementId")]
    pub element_id: String,
    pub name: String,
    pub description: String,
    pub formal_definition: String,
    pub examples: Vec<String>,
    /// Owning category name.
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    #[serde(rename = "elementId")]
    pub element_id: String,
    pub name: String,
    pub description: String,
    pub subcategories: Vec<SubcategoryRecord>,
}

/// A traversal path: concepts in order and the edges between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub nodes: Vec<ConceptRecord>,
    pub relationships: Vec<RelationshipRecord>,
    pub length: usize,
}

impl PathRecord {
    pub fn end(&self) -> Option<&ConceptRecord> {
        self.nodes.last()
    }
}

/// How a neighbor is attached to the concept a traversal started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborDirection {
    Outgoing,
    Incoming,
    /// Neighbor precedes the start concept.
    Before,
    /// Neighbor follows the start concept.
    After,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub concept: ConceptRecord,
    /// The edge that reached `concept`.
    pub relationship: RelationshipRecord,
    /// Taken from the first edge of the path out of the start concept.
    pub direction: NeighborDirection,
    pub hop: usize,
}

// ============================================================================
// Conversions
// ============================================================================

fn text(node: &Node, key: &str) -> Option<String> {
    node.get_str(key).map(str::to_string)
}

pub fn concept_record(node: &Node) -> ConceptRecord {
    let extra = node
        .properties
        .iter()
        .filter(|(k, _)| !CONCEPT_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();

    ConceptRecord {
        element_id: node_id(node),
        name: text(node, "name").unwrap_or_default(),
        description: text(node, "description"),
        confidence_score: node.get("confidence_score").and_then(Value::as_float),
        stability_status: text(node, "stability_status"),
        source_information: text(node, "source_information"),
        creation_timestamp: node.get("creation_timestamp").and_then(Value::as_datetime),
        quality: text(node, "quality"),
        modality: text(node, "modality"),
        extra,
    }
}

/// `start`/`end` supply endpoint names when available.
pub fn relationship_record(
    rel: &Relationship,
    start: Option<&Node>,
    end: Option<&Node>,
) -> RelationshipRecord {
    let endpoint_id = |node: Option<&Node>, fallback: NodeId| {
        node.map(node_id).unwrap_or_else(|| fallback.to_string())
    };
    RelationshipRecord {
        element_id: relationship_id(rel),
        rel_type: rel.rel_type.clone(),
        start_node_id: endpoint_id(start, rel.src),
        end_node_id: endpoint_id(end, rel.dst),
        start_node_name: start.and_then(|n| text(n, "name")),
        end_node_name: end.and_then(|n| text(n, "name")),
        properties: props_to_json(&rel.properties),
    }
}

pub fn subcategory_record(category: &CategoryEntry, sub: &SubcategoryEntry) -> SubcategoryRecord {
    SubcategoryRecord {
        element_id: sub.element_id.clone(),
        name: sub.def.name.to_string(),
        description: sub.def.description.to_string(),
        formal_definition: sub.def.formal_definition.to_string(),
        examples: sub.def.examples.iter().map(|e| e.to_string()).collect(),
        category: category.name().to_string(),
    }
}

pub fn category_record(category: &CategoryEntry) -> CategoryRecord {
    CategoryRecord {
        element_id: category.element_id.clone(),
        name: category.name().to_string(),
        description: category.def.description.to_string(),
        subcategories: category
            .subcategories
            .iter()
            .map(|s| subcategory_record(category, s))
            .collect(),
    }
}

pub fn path_record(path: &Path) -> PathRecord {
    let find = |id: NodeId| path.nodes.iter().find(|n| n.id == id);
    PathRecord {
        nodes: path.nodes.iter().map(concept_record).collect(),
        relationships: path
            .relationships
            .iter()
            .map(|r| relationship_record(r, find(r.src), find(r.dst)))
            .collect(),
        length: path.len(),
    }
}
