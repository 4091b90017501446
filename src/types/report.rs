use std::fmt;
use std::time::Duration;

use super::table::Table;

/// One changelog record: how many rows a rule touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleApplication {
    rule: String,
    rows_affected: usize,
}

impl RuleApplication {
    pub(crate) fn new(rule: impl Into<String>, rows_affected: usize) -> Self {
        Self {
            rule: rule.into(),
            rows_affected,
        }
    }

    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Rows selected by the rule's mask (including rows set to `NA` under
    /// [`NaPolicy::Na`](super::NaPolicy::Na)).
    #[must_use]
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }
}

impl fmt::Display for RuleApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} rows", self.rule, self.rows_affected)
    }
}

/// Result of [`Modifier::modify()`](super::Modifier::modify): the modified
/// table plus a per-rule changelog in execution order.
#[derive(Debug, Clone)]
#[must_use]
pub struct ModifyReport {
    table: Table,
    applied: Vec<RuleApplication>,
    sequential: bool,
    duration: Duration,
}

impl ModifyReport {
    pub(crate) fn new(
        table: Table,
        applied: Vec<RuleApplication>,
        sequential: bool,
        duration: Duration,
    ) -> Self {
        Self {
            table,
            applied,
            sequential,
            duration,
        }
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    #[must_use]
    pub fn into_parts(self) -> (Table, Vec<RuleApplication>) {
        (self.table, self.applied)
    }

    /// One record per rule, in execution (declaration) order.
    #[must_use]
    pub fn applied(&self) -> &[RuleApplication] {
        &self.applied
    }

    #[must_use]
    pub fn rows_affected(&self, rule: &str) -> Option<usize> {
        self.applied
            .iter()
            .find(|a| a.rule == rule)
            .map(RuleApplication::rows_affected)
    }

    #[must_use]
    pub fn total_rows_affected(&self) -> usize {
        self.applied.iter().map(RuleApplication::rows_affected).sum()
    }

    #[must_use]
    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    /// Wall-clock duration of the execution.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Display for ModifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.sequential {
            "sequential"
        } else {
            "independent"
        };
        let applied: Vec<String> = self.applied.iter().map(ToString::to_string).collect();
        write!(f, "mode: {mode}, applied: [{}]", applied.join(", "))?;
        write!(f, ", duration: {:?}", self.duration)?;
        Ok(())
    }
}
