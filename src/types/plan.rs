use std::fmt;

use super::error::ModifyError;
use super::options::ModifyOptions;
use super::report::ModifyReport;
use super::rule::CompiledUnit;
use super::table::Table;
use crate::analyze::Dependencies;

/// A modifier compiled for execution. Immutable and thread-safe; one plan
/// can be applied to any number of tables.
///
/// Produced by [`Modifier::compile()`](super::Modifier::compile). Rules keep
/// their declaration order.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    units: Vec<CompiledUnit>,
    deps: Vec<Dependencies>,
}

impl ExecutionPlan {
    pub(crate) fn new(units: Vec<CompiledUnit>, deps: Vec<Dependencies>) -> Self {
        Self { units, deps }
    }

    pub(crate) fn units(&self) -> &[CompiledUnit] {
        &self.units
    }

    pub(crate) fn dependencies(&self) -> &[Dependencies] {
        &self.deps
    }

    /// Apply the plan to `table`, returning the modified copy.
    ///
    /// # Errors
    ///
    /// Returns [`ModifyError`] on the first failing rule; nothing is applied.
    pub fn execute(
        &self,
        table: &Table,
        options: &ModifyOptions,
    ) -> Result<ModifyReport, ModifyError> {
        crate::execute::execute(self, table, options)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Rule names in execution order, which is always declaration order.
    #[must_use]
    pub fn execution_order(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    /// Columns read by a rule after macro expansion.
    ///
    /// Returns `None` if the rule name is not found.
    #[must_use]
    pub fn reads(&self, rule_name: &str) -> Option<Vec<&str>> {
        self.position(rule_name)
            .map(|idx| self.deps[idx].reads.iter().map(String::as_str).collect())
    }

    /// Columns written by a rule.
    #[must_use]
    pub fn writes(&self, rule_name: &str) -> Option<Vec<&str>> {
        self.position(rule_name)
            .map(|idx| self.deps[idx].writes.iter().map(String::as_str).collect())
    }

    /// Earlier rules whose writes the given rule reads, i.e. whose effects it
    /// observes in sequential mode.
    ///
    /// Returns `None` if the rule name is not found.
    #[must_use]
    pub fn dependencies_of(&self, rule_name: &str) -> Option<Vec<&str>> {
        self.position(rule_name).map(|idx| {
            self.deps[idx]
                .observes
                .iter()
                .map(|&i| self.units[i].name.as_str())
                .collect()
        })
    }

    fn position(&self, rule_name: &str) -> Option<usize> {
        self.units.iter().position(|u| u.name == rule_name)
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionPlan({} rules)", self.units.len())?;
        for (unit, deps) in self.units.iter().zip(&self.deps) {
            write!(
                f,
                "\n  {}: reads [{}] writes [{}]",
                unit.name,
                deps.reads.join(", "),
                deps.writes.join(", ")
            )?;
        }
        Ok(())
    }
}
