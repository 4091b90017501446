use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use super::error::SyntaxError;
use super::expr::{write_name, CompiledExpr, Expr};
use super::value::Value;

/// One `target <- value` pair of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    target: String,
    value: Expr,
}

impl Assignment {
    #[must_use]
    pub fn new(target: &str, value: impl Into<Expr>) -> Self {
        Self {
            target: target.to_owned(),
            value: value.into(),
        }
    }

    /// Column written by this assignment.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn value(&self) -> &Expr {
        &self.value
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_name(f, &self.target)?;
        write!(f, " <- {}", self.value)
    }
}

/// A conditional assignment: when `condition` holds for a row, every
/// assignment is applied to that row, in order.
///
/// Rules are immutable once built. Create them with [`RuleBuilder`], through
/// [`ModifierBuilder::rule()`](super::ModifierBuilder::rule), or by parsing
/// rule text.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    name: String,
    label: String,
    description: String,
    created: DateTime<Utc>,
    origin: String,
    meta: BTreeMap<String, Value>,
    condition: Expr,
    assignments: Vec<Assignment>,
}

impl Rule {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Where the rule came from, e.g. the file it was read from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    /// The row condition. Unconditional rules carry the literal `TRUE`.
    #[must_use]
    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    #[must_use]
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.condition == Expr::Literal(Value::Bool(true))
    }

    /// Columns written by this rule, in assignment order (may repeat).
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|a| a.target.as_str())
    }

    /// The rule as statement text, e.g. `if (x > 0) y <- 1`.
    #[must_use]
    pub fn source(&self) -> String {
        self.to_string()
    }

    pub(crate) fn set_origin_if_empty(&mut self, origin: &str) {
        if self.origin.is_empty() {
            self.origin = origin.to_owned();
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_unconditional() {
            write!(f, "if ({}) ", self.condition)?;
        }
        match self.assignments.as_slice() {
            [single] => write!(f, "{single}"),
            many => {
                write!(f, "{{")?;
                for (i, assignment) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{assignment}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Builder for a single [`Rule`].
///
/// ```
/// use remodel::{col, RuleBuilder};
///
/// let rule = RuleBuilder::new("fix_negative")
///     .when(col("turnover").lt(0_i64))
///     .set("turnover", col("turnover") * -1_i64)
///     .label("Sign error")
///     .build()
///     .unwrap();
/// assert_eq!(rule.source(), "if (turnover < 0) turnover <- turnover * -1");
/// ```
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    label: String,
    description: String,
    created: Option<DateTime<Utc>>,
    origin: String,
    meta: BTreeMap<String, Value>,
    condition: Option<Expr>,
    assignments: Vec<Assignment>,
}

impl RuleBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            label: String::new(),
            description: String::new(),
            created: None,
            origin: String::new(),
            meta: BTreeMap::new(),
            condition: None,
            assignments: Vec::new(),
        }
    }

    /// Set the row condition. Without it the rule applies to every row.
    #[must_use]
    pub fn when(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Append an assignment `target <- value`.
    #[must_use]
    pub fn set(mut self, target: &str, value: impl Into<Expr>) -> Self {
        self.assignments.push(Assignment::new(target, value));
        self
    }

    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_owned();
        self
    }

    #[must_use]
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_owned();
        self
    }

    #[must_use]
    pub fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    #[must_use]
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_owned(), value.into());
        self
    }

    pub(crate) fn assignment(mut self, assignment: Assignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    pub(crate) fn rename(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// Returns [`SyntaxError::EmptyBody`] when no assignment was added.
    pub fn build(self) -> Result<Rule, SyntaxError> {
        if self.assignments.is_empty() {
            return Err(SyntaxError::EmptyBody);
        }
        Ok(Rule {
            name: self.name,
            label: self.label,
            description: self.description,
            created: self.created.unwrap_or_else(Utc::now),
            origin: self.origin,
            meta: self.meta,
            condition: self
                .condition
                .unwrap_or(Expr::Literal(Value::Bool(true))),
            assignments: self.assignments,
        })
    }
}

/// A rule lowered for execution: macros expanded, functions resolved.
#[derive(Debug, Clone)]
pub(crate) struct CompiledUnit {
    pub(crate) name: String,
    pub(crate) condition: CompiledExpr,
    /// Authored condition text, carried into error messages.
    pub(crate) condition_text: String,
    pub(crate) assignments: Vec<CompiledAssignment>,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledAssignment {
    pub(crate) target: String,
    pub(crate) value: CompiledExpr,
}
