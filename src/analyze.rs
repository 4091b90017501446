use std::collections::HashSet;

use crate::types::{CompiledExpr, CompiledUnit};

/// Column-level data flow of one compiled rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Dependencies {
    /// Columns read by the condition, first occurrence order.
    pub(crate) condition_reads: Vec<String>,
    /// Columns read anywhere in the rule, first occurrence order.
    pub(crate) reads: Vec<String>,
    /// Target columns, first occurrence order.
    pub(crate) writes: Vec<String>,
    /// Earlier rules (by index) whose writes this rule reads.
    pub(crate) observes: Vec<usize>,
}

impl Dependencies {
    /// Every column the rule touches; all must exist before execution.
    pub(crate) fn columns(&self) -> impl Iterator<Item = &str> {
        self.reads
            .iter()
            .chain(self.writes.iter())
            .map(String::as_str)
    }
}

/// Compute read and write sets per unit and which earlier units each one
/// observes. Declaration order is kept; nothing is reordered.
pub(crate) fn analyze(units: &[CompiledUnit]) -> Vec<Dependencies> {
    let mut deps: Vec<Dependencies> = Vec::with_capacity(units.len());
    for unit in units {
        let mut condition_reads = Vec::new();
        collect_columns(&unit.condition, &mut condition_reads);

        let mut reads = condition_reads.clone();
        let mut writes = Vec::new();
        for assignment in &unit.assignments {
            collect_columns(&assignment.value, &mut reads);
            push_unique(&mut writes, &assignment.target);
        }

        let read_set: HashSet<&str> = reads.iter().map(String::as_str).collect();
        let observes = deps
            .iter()
            .enumerate()
            .filter(|(_, earlier)| earlier.writes.iter().any(|w| read_set.contains(w.as_str())))
            .map(|(idx, _)| idx)
            .collect();

        deps.push(Dependencies {
            condition_reads,
            reads,
            writes,
            observes,
        });
    }
    deps
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_owned());
    }
}

fn collect_columns(expr: &CompiledExpr, out: &mut Vec<String>) {
    match expr {
        CompiledExpr::Column(name) => push_unique(out, name),
        CompiledExpr::Literal(_) => {}
        CompiledExpr::Compare { lhs, rhs, .. } | CompiledExpr::Arith { lhs, rhs, .. } => {
            collect_columns(lhs, out);
            collect_columns(rhs, out);
        }
        CompiledExpr::And(a, b) | CompiledExpr::Or(a, b) => {
            collect_columns(a, out);
            collect_columns(b, out);
        }
        CompiledExpr::Not(inner) | CompiledExpr::Neg(inner) => collect_columns(inner, out),
        CompiledExpr::In { needle, haystack } => {
            collect_columns(needle, out);
            for item in haystack {
                collect_columns(item, out);
            }
        }
        CompiledExpr::Call { args, .. } => {
            for arg in args {
                collect_columns(arg, out);
            }
        }
    }
}
