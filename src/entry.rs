//! Interchange records for rules.
//!
//! A [`RuleEntry`] is one statement of rule text plus its metadata. Entries
//! are how a [`Modifier`](crate::Modifier) is exported and re-imported, and,
//! with the `serde` feature, the records of the JSON rule document:
//!
//! ```json
//! { "rules": [ { "expr": "if (age < 0) age <- NA", "name": "fix_age" } ] }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::{Rule, Value};

/// One rule (or macro definition) as text with optional metadata.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleEntry {
    /// Statement text, e.g. `if (x > 0) y <- 1` or `adult := age >= 18`.
    pub expr: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub name: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub label: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub description: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub created: Option<DateTime<Utc>>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub origin: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "BTreeMap::is_empty")
    )]
    pub meta: BTreeMap<String, Value>,
}

impl RuleEntry {
    /// An unnamed entry.
    #[must_use]
    pub fn new(expr: &str) -> Self {
        Self {
            expr: expr.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn named(name: &str, expr: &str) -> Self {
        Self {
            expr: expr.to_owned(),
            name: Some(name.to_owned()),
            ..Self::default()
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

impl From<&Rule> for RuleEntry {
    fn from(rule: &Rule) -> Self {
        Self {
            expr: rule.source(),
            name: Some(rule.name().to_owned()),
            label: non_empty(rule.label()),
            description: non_empty(rule.description()),
            created: Some(rule.created()),
            origin: non_empty(rule.origin()),
            meta: rule.meta().clone(),
        }
    }
}

/// The JSON rule document: `{ "rules": [ ... ] }`.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuleDocument {
    pub rules: Vec<RuleEntry>,
}
