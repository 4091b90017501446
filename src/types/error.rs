use std::fmt;

use thiserror::Error;

use super::DataType;

/// A construct that cannot become a rule. Recoverable: the offending rule is
/// dropped from the modifier and recorded as a [`RuleWarning`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("if/else statements are not supported; split them into two rules")]
    ElseBranch,

    #[error("nested if statements are not supported; combine the conditions with '&'")]
    NestedCondition,

    #[error("rule has no assignments")]
    EmptyBody,

    #[error("invalid rule: {0}")]
    Invalid(String),
}

/// A rule that was skipped while building a modifier, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleWarning {
    pub rule: String,
    pub reason: SyntaxError,
}

impl fmt::Display for RuleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule '{}' dropped: {}", self.rule, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("cyclic macro definition: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("duplicate macro name '{name}'")]
    Duplicate { name: String },

    #[error("macro '{name}' exceeds the expansion depth limit of {limit}")]
    DepthExceeded { name: String, limit: usize },
}

/// Fatal errors while assembling a [`Modifier`](super::Modifier).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate rule name '{name}'")]
    DuplicateRule { name: String },

    #[error(transparent)]
    Macro(#[from] MacroError),
}

/// Fatal errors while turning a modifier into an execution plan.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid assignment target '{target}' in rule '{rule}'")]
    InvalidTarget { rule: String, target: String },

    #[error("unknown function '{function}' in rule '{rule}'")]
    UnknownFunction { rule: String, function: String },

    #[error("function '{function}' in rule '{rule}' expects {expected} arguments, got {found}")]
    Arity {
        rule: String,
        function: String,
        expected: String,
        found: usize,
    },

    #[error("c(...) is only supported on the right-hand side of %in% (rule '{rule}')")]
    VectorOutsideIn { rule: String },

    #[error("macro expansion failed in rule '{rule}': {source}")]
    Macro {
        rule: String,
        #[source]
        source: MacroError,
    },
}

/// Fatal errors while applying a plan to a table. Every variant names the
/// rule, the column involved and the rule's condition.
#[derive(Debug, Error)]
pub enum ModifyError {
    #[error("rule '{rule}': column '{column}' not found in table (condition: {condition})")]
    MissingColumn {
        rule: String,
        column: String,
        condition: String,
    },

    #[error(
        "rule '{rule}': cannot assign {found} value to {expected} column '{column}' (condition: {condition})"
    )]
    TypeMismatch {
        rule: String,
        column: String,
        expected: DataType,
        found: DataType,
        condition: String,
    },

    #[error("rule '{rule}': condition on '{column}' evaluated to {found}, expected bool (condition: {condition})")]
    NonLogicalCondition {
        rule: String,
        column: String,
        found: DataType,
        condition: String,
    },

    #[error(
        "rule '{rule}': operator '{op}' is not defined for {operands} (column '{column}', condition: {condition})"
    )]
    InvalidOperands {
        rule: String,
        column: String,
        op: String,
        operands: String,
        condition: String,
    },

    #[error(
        "rule '{rule}': {function}() does not accept {found} arguments (column '{column}', condition: {condition})"
    )]
    InvalidArgument {
        rule: String,
        column: String,
        function: String,
        found: DataType,
        condition: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("column '{column}' has {found} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column name '{name}'")]
    DuplicateColumn { name: String },

    #[error("row {row}: {found} value in {expected} column")]
    TypeMismatch {
        row: usize,
        expected: DataType,
        found: DataType,
    },
}
