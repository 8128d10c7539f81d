//! The rule tables, keyed on `(EntityKind, relationship type)`.

use std::collections::HashMap;

use crate::model::PropertyMap;
use crate::schema::kinds::{
    MODALITIES, QUALITIES, SPATIAL_RELATION_TYPES, SPATIAL_UNITS, STABILITY_STATUSES,
};
use crate::schema::RelationKind;
use super::rules::{Rule, RuleSet, ValueType};
use super::{EntityKind, Violations};

type Key = (EntityKind, Option<String>);

/// Rule sets by entity kind and optional relationship type.
///
/// A relationship is checked against the generic `(Relationship, None)` set
/// followed by the set registered for its own type, if any. Custom
/// relationship types therefore get exactly the generic rules.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    sets: HashMap<Key, RuleSet>,
}

impl RuleRegistry {
    /// Empty registry. Most callers want [`RuleRegistry::standard`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rules for a key. Registering for an existing key extends it.
    pub fn register(&mut self, kind: EntityKind, rel_type: Option<&str>, rules: Vec<Rule>) {
        let set = self.sets.entry((kind, rel_type.map(str::to_string))).or_default();
        for rule in rules {
            set.push(rule);
        }
    }

    /// The ontology's rule tables.
    pub fn standard() -> Self {
        use Rule::*;
        let mut reg = Self::new();

        reg.register(EntityKind::Concept, None, vec![
            ReadOnly("elementId"),
            Immutable("creation_timestamp"),
            Required("name"),
            TypeIs { field: "name", ty: ValueType::Text },
            NonEmpty("name"),
            TypeIs { field: "description", ty: ValueType::Text },
            TypeIs { field: "source_information", ty: ValueType::Text },
            TypeIs { field: "confidence_score", ty: ValueType::Number },
            Range { field: "confidence_score", min: 0.0, max: 1.0 },
            OneOf { field: "stability_status", allowed: STABILITY_STATUSES },
            OneOf { field: "quality", allowed: QUALITIES },
            OneOf { field: "modality", allowed: MODALITIES },
            Required("creation_timestamp"),
            TypeIs { field: "creation_timestamp", ty: ValueType::Timestamp },
        ]);

        reg.register(EntityKind::Relationship, None, vec![
            ReadOnly("elementId"),
            ReadOnly("type"),
            ReadOnly("start_node_id"),
            ReadOnly("end_node_id"),
            Immutable("creation_timestamp"),
            Required("confidence_score"),
            TypeIs { field: "confidence_score", ty: ValueType::Number },
            Range { field: "confidence_score", min: 0.0, max: 1.0 },
            Required("source_information"),
            TypeIs { field: "source_information", ty: ValueType::Text },
            Required("creation_timestamp"),
            TypeIs { field: "creation_timestamp", ty: ValueType::Timestamp },
        ]);

        reg.register(EntityKind::Relationship, Some(RelationKind::Temporal.label()), vec![
            Required("temporal_distance"),
            TypeIs { field: "temporal_distance", ty: ValueType::Number },
            Required("temporal_unit"),
            TypeIs { field: "temporal_unit", ty: ValueType::Text },
            Required("temporal_order"),
            TypeIs { field: "temporal_order", ty: ValueType::Integer },
        ]);

        reg.register(EntityKind::Relationship, Some(RelationKind::Spatial.label()), vec![
            Required("relation_type"),
            OneOf { field: "relation_type", allowed: SPATIAL_RELATION_TYPES },
            Required("spatial_dimension"),
            RequiredWith { field: "spatial_unit", when: "distance" },
            OneOf { field: "spatial_unit", allowed: SPATIAL_UNITS },
        ]);

        reg
    }

    /// Rule sets that apply, generic first.
    fn sets_for(&self, kind: EntityKind, rel_type: Option<&str>) -> impl Iterator<Item = &RuleSet> {
        let generic = self.sets.get(&(kind, None));
        let specific = rel_type.and_then(|t| self.sets.get(&(kind, Some(t.to_string()))));
        generic.into_iter().chain(specific)
    }

    /// Check a merged record. Returns every violation.
    pub fn validate(&self, kind: EntityKind, rel_type: Option<&str>, merged: &PropertyMap) -> Violations {
        let mut out = Violations::new();
        for set in self.sets_for(kind, rel_type) {
            out.extend(set.check(merged));
        }
        out
    }

    /// Check a create: caller payload for read-only/service-assigned keys,
    /// then the record the service is about to write.
    pub fn validate_create(
        &self,
        kind: EntityKind,
        rel_type: Option<&str>,
        payload: &PropertyMap,
        record: &PropertyMap,
    ) -> Violations {
        let mut out = Violations::new();
        for set in self.sets_for(kind, rel_type) {
            out.extend(set.check_input(payload, None));
        }
        out.extend(self.validate(kind, rel_type, record));
        out
    }

    /// Check an update: the delta against stored state, then the merged record.
    pub fn validate_update(
        &self,
        kind: EntityKind,
        rel_type: Option<&str>,
        stored: &PropertyMap,
        delta: &PropertyMap,
        merged: &PropertyMap,
    ) -> Violations {
        let mut out = Violations::new();
        for set in self.sets_for(kind, rel_type) {
            out.extend(set.check_input(delta, Some(stored)));
        }
        out.extend(self.validate(kind, rel_type, merged));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{props, Value};
    use pretty_assertions::assert_eq;

    const TS: &str = "2024-05-01T12:00:00Z";

    fn rel_base() -> PropertyMap {
        props([
            ("confidence_score", Value::from(0.9)),
            ("source_information", Value::from("test")),
            ("creation_timestamp", Value::from(TS)),
        ])
    }

    #[test]
    fn test_valid_concept() {
        let reg = RuleRegistry::standard();
        let record = props([
            ("name", Value::from("Heat")),
            ("quality", Value::from("Reality")),
            ("stability_status", Value::from("ephemeral")),
            ("creation_timestamp", Value::from(TS)),
        ]);
        assert!(reg.validate(EntityKind::Concept, None, &record).is_empty());
    }

    #[test]
    fn test_reports_all_concept_violations() {
        let reg = RuleRegistry::standard();
        let record = props([
            ("name", Value::from("  ")),
            ("quality", Value::from("Bright")),
            ("modality", Value::from("Maybe")),
            ("confidence_score", Value::from(2.0)),
            ("creation_timestamp", Value::from(TS)),
        ]);
        let violations = reg.validate(EntityKind::Concept, None, &record);
        let fields: Vec<_> = violations.iter().map(|v| (v.field.as_str(), v.rule)).collect();
        assert_eq!(fields, vec![
            ("name", "non_empty"),
            ("confidence_score", "range"),
            ("quality", "one_of"),
            ("modality", "one_of"),
        ]);
    }

    #[test]
    fn test_spatial_distance_needs_unit() {
        let reg = RuleRegistry::standard();
        let mut record = rel_base();
        record.insert("relation_type".into(), Value::from("near"));
        record.insert("spatial_dimension".into(), Value::from("2D"));
        record.insert("distance".into(), Value::from("10"));

        let violations = reg.validate(EntityKind::Relationship, Some("SPATIALLY_RELATES_TO"), &record);
        assert_eq!(violations.len(), 1);
        assert!(violations.has("spatial_unit", "required_with"));

        record.insert("spatial_unit".into(), Value::from("parsecs"));
        let violations = reg.validate(EntityKind::Relationship, Some("SPATIALLY_RELATES_TO"), &record);
        assert!(violations.has("spatial_unit", "one_of"));

        record.insert("spatial_unit".into(), Value::from("km"));
        assert!(reg.validate(EntityKind::Relationship, Some("SPATIALLY_RELATES_TO"), &record).is_empty());
    }

    #[test]
    fn test_temporal_requirements() {
        let reg = RuleRegistry::standard();
        let violations = reg.validate(EntityKind::Relationship, Some("PRECEDES"), &rel_base());
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["temporal_distance", "temporal_unit", "temporal_order"]);
    }

    #[test]
    fn test_custom_type_uses_generic_rules() {
        let reg = RuleRegistry::standard();
        assert!(reg.validate(EntityKind::Relationship, Some("INFLUENCES"), &rel_base()).is_empty());
        let violations = reg.validate(EntityKind::Relationship, Some("INFLUENCES"), &PropertyMap::new());
        assert!(violations.has("confidence_score", "required"));
        assert!(violations.has("source_information", "required"));
    }

    #[test]
    fn test_update_checks_delta_and_merged() {
        let reg = RuleRegistry::standard();
        let stored = props([
            ("name", Value::from("Heat")),
            ("creation_timestamp", Value::from(TS)),
        ]);
        let delta = props([
            ("elementId", Value::from("4:x:1")),
            ("creation_timestamp", Value::from("2030-01-01T00:00:00Z")),
        ]);
        let mut merged = stored.clone();
        merged.remove("name");

        let violations = reg.validate_update(EntityKind::Concept, None, &stored, &delta, &merged);
        assert!(violations.has("elementId", "read_only"));
        assert!(violations.has("creation_timestamp", "immutable"));
        assert!(violations.has("name", "required"));
    }

    #[test]
    fn test_registry_is_extensible() {
        let mut reg = RuleRegistry::standard();
        reg.register(EntityKind::Relationship, Some("INFLUENCES"), vec![Rule::Required("strength")]);
        let violations = reg.validate(EntityKind::Relationship, Some("INFLUENCES"), &rel_base());
        assert!(violations.has("strength", "required"));
    }
}
