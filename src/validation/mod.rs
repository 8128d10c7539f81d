//! # Validation Engine
//!
//! Table-driven checks the store cannot express natively: enum membership,
//! numeric ranges, required fields, conditional cross-field requirements.
//!
//! Rules are looked up in a [`RuleRegistry`] keyed on
//! `(EntityKind, relationship type)` and always evaluated against the
//! *merged* record (stored state overlaid with the requested change).
//! Evaluation is pure and reports every violation, never just the first.

pub mod registry;
pub mod rules;

use std::fmt;

use serde::Serialize;

pub use registry::RuleRegistry;
pub use rules::{Rule, RuleSet, ValueType};

/// Which kind of entity a rule set applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Concept,
    Relationship,
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    /// Machine-readable rule code (`required`, `one_of`, `range`, ...).
    pub rule: &'static str,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, rule: &'static str, message: impl Into<String>) -> Self {
        Self { field: field.into(), rule, message: message.into() }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The complete list of violations found for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, v: Violation) {
        self.0.push(v);
    }

    pub fn extend(&mut self, other: Violations) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    /// Whether some violation concerns `field` under rule `rule`.
    pub fn has(&self, field: &str, rule: &str) -> bool {
        self.0.iter().any(|v| v.field == field && v.rule == rule)
    }

    /// `Ok(())` when empty, otherwise `Error::ValidationFailed`.
    pub fn into_result(self) -> crate::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::ValidationFailed(self))
        }
    }
}

impl From<Violation> for Violations {
    fn from(v: Violation) -> Self {
        Self(vec![v])
    }
}

impl FromIterator<Violation> for Violations {
    fn from_iter<I: IntoIterator<Item = Violation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Violations {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 { write!(f, "; ")?; }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}
