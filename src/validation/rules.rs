//! Individual rules and ordered rule sets.

use crate::model::{PropertyMap, Value};
use super::{Violation, Violations};

/// Expected value type for [`Rule::TypeIs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    /// Integer or float.
    Number,
    Integer,
    /// Native timestamp or RFC 3339 string.
    Timestamp,
}

impl ValueType {
    fn accepts(self, v: &Value) -> bool {
        match self {
            ValueType::Text => v.is_string(),
            ValueType::Number => v.is_numeric(),
            ValueType::Integer => matches!(v, Value::Int(_)),
            ValueType::Timestamp => v.as_datetime().is_some(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ValueType::Text => "a string",
            ValueType::Number => "a number",
            ValueType::Integer => "an integer",
            ValueType::Timestamp => "an RFC 3339 timestamp",
        }
    }
}

/// One constraint on a record.
///
/// `ReadOnly` and `Immutable` only fire on the caller's payload or delta;
/// the others are checked against the merged record.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required(&'static str),
    /// A present string field must not be blank.
    NonEmpty(&'static str),
    OneOf { field: &'static str, allowed: &'static [&'static str] },
    /// Inclusive numeric range.
    Range { field: &'static str, min: f64, max: f64 },
    TypeIs { field: &'static str, ty: ValueType },
    /// `field` is required whenever `when` is present.
    RequiredWith { field: &'static str, when: &'static str },
    /// Callers may never supply this key.
    ReadOnly(&'static str),
    /// Assigned once by the service; a caller may not set or change it.
    Immutable(&'static str),
}

/// Present and not null.
fn present<'a>(record: &'a PropertyMap, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|v| !v.is_null())
}

impl Rule {
    pub fn field(&self) -> &'static str {
        match self {
            Rule::Required(f) | Rule::NonEmpty(f) | Rule::ReadOnly(f) | Rule::Immutable(f) => f,
            Rule::OneOf { field, .. }
            | Rule::Range { field, .. }
            | Rule::TypeIs { field, .. }
            | Rule::RequiredWith { field, .. } => field,
        }
    }

    /// Check the merged record.
    pub fn check(&self, record: &PropertyMap) -> Option<Violation> {
        match *self {
            Rule::Required(f) => present(record, f)
                .is_none()
                .then(|| Violation::new(f, "required", format!("'{f}' is required"))),
            Rule::NonEmpty(f) => present(record, f)
                .and_then(Value::as_str)
                .filter(|s| s.trim().is_empty())
                .map(|_| Violation::new(f, "non_empty", format!("'{f}' must not be empty"))),
            Rule::OneOf { field, allowed } => {
                let v = present(record, field)?;
                match v.as_str() {
                    Some(s) if allowed.contains(&s) => None,
                    _ => Some(Violation::new(
                        field,
                        "one_of",
                        format!("Invalid {field}: {v}. Must be one of {allowed:?}"),
                    )),
                }
            }
            Rule::Range { field, min, max } => {
                let x = present(record, field)?.as_float()?;
                (x < min || x > max).then(|| {
                    Violation::new(field, "range", format!("'{field}' must be between {min} and {max}, got {x}"))
                })
            }
            Rule::TypeIs { field, ty } => {
                let v = present(record, field)?;
                (!ty.accepts(v)).then(|| {
                    Violation::new(field, "type", format!("'{field}' must be {}, got {}", ty.describe(), v.type_name()))
                })
            }
            Rule::RequiredWith { field, when } => {
                (present(record, when).is_some() && present(record, field).is_none()).then(|| {
                    Violation::new(field, "required_with", format!("'{field}' is required when '{when}' is present"))
                })
            }
            Rule::ReadOnly(_) | Rule::Immutable(_) => None,
        }
    }

    /// Check a caller-supplied payload or delta against the stored record
    /// (`None` on create).
    pub fn check_input(&self, input: &PropertyMap, stored: Option<&PropertyMap>) -> Option<Violation> {
        match *self {
            Rule::ReadOnly(f) => input
                .contains_key(f)
                .then(|| Violation::new(f, "read_only", format!("'{f}' is read-only"))),
            Rule::Immutable(f) => {
                let supplied = input.get(f)?;
                let unchanged = stored.and_then(|s| s.get(f)).is_some_and(|old| same_value(old, supplied));
                (!unchanged).then(|| {
                    Violation::new(f, "immutable", format!("'{f}' is assigned by the service and cannot be changed"))
                })
            }
            _ => None,
        }
    }
}

/// Equality that treats a timestamp and its RFC 3339 rendering as the same.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_datetime(), b.as_datetime()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// An ordered list of rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn check(&self, record: &PropertyMap) -> Violations {
        self.rules.iter().filter_map(|r| r.check(record)).collect()
    }

    pub fn check_input(&self, input: &PropertyMap, stored: Option<&PropertyMap>) -> Violations {
        self.rules.iter().filter_map(|r| r.check_input(input, stored)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::props;

    #[test]
    fn test_required_treats_null_as_missing() {
        let rule = Rule::Required("name");
        assert!(rule.check(&props([("name", Value::Null)])).is_some());
        assert!(rule.check(&props([("name", "Heat")])).is_none());
    }

    #[test]
    fn test_one_of_rejects_non_strings() {
        let rule = Rule::OneOf { field: "quality", allowed: &["Reality"] };
        assert!(rule.check(&props([("quality", 3i64)])).is_some());
        assert!(rule.check(&props([("quality", "Reality")])).is_none());
        assert!(rule.check(&PropertyMap::new()).is_none());
    }

    #[test]
    fn test_range_is_inclusive() {
        let rule = Rule::Range { field: "confidence_score", min: 0.0, max: 1.0 };
        assert!(rule.check(&props([("confidence_score", 1i64)])).is_none());
        assert!(rule.check(&props([("confidence_score", 0.0)])).is_none());
        let v = rule.check(&props([("confidence_score", 1.01)])).unwrap();
        assert_eq!(v.rule, "range");
    }

    #[test]
    fn test_integer_type() {
        let rule = Rule::TypeIs { field: "temporal_order", ty: ValueType::Integer };
        assert!(rule.check(&props([("temporal_order", 2i64)])).is_none());
        assert!(rule.check(&props([("temporal_order", 2.5)])).is_some());
        assert!(rule.check(&props([("temporal_order", "2")])).is_some());
    }

    #[test]
    fn test_required_with() {
        let rule = Rule::RequiredWith { field: "spatial_unit", when: "distance" };
        assert!(rule.check(&props([("distance", "10")])).is_some());
        assert!(rule.check(&props([("distance", "10"), ("spatial_unit", "m")])).is_none());
        assert!(rule.check(&PropertyMap::new()).is_none());
    }

    #[test]
    fn test_immutable_allows_resending_same_value() {
        let rule = Rule::Immutable("creation_timestamp");
        let stored = props([("creation_timestamp", "2024-05-01T12:00:00Z")]);
        let same = props([("creation_timestamp", "2024-05-01T12:00:00+00:00")]);
        let other = props([("creation_timestamp", "2025-01-01T00:00:00Z")]);
        assert!(rule.check_input(&same, Some(&stored)).is_none());
        assert!(rule.check_input(&other, Some(&stored)).is_some());
        // On create it may not be supplied at all
        assert!(rule.check_input(&same, None).is_some());
    }
}
