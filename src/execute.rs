//! Applies an [`ExecutionPlan`] to a table.
//!
//! Sequential mode evaluates each rule against the working table and commits
//! its writes before the next rule runs. Independent mode evaluates every
//! rule against the input and commits all writes afterwards, in declaration
//! order.

use std::time::Instant;

use tracing::{debug, info};

use crate::analyze::Dependencies;
use crate::evaluate::{evaluate, evaluate_rows, EvalError, Rows, Vector};
use crate::types::{
    CompiledAssignment, CompiledUnit, DataType, ExecutionPlan, ModifyError, ModifyOptions,
    ModifyReport, NaPolicy, RuleApplication, Table, Value,
};

/// A row selected by a rule's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selected {
    row: usize,
    /// Missing condition under [`NaPolicy::Na`]: write `NA`.
    blank: bool,
}

/// Type-checked cells waiting to be committed to one column.
#[derive(Debug)]
struct PendingWrite {
    column: usize,
    cells: Vec<(usize, Option<Value>)>,
}

impl PendingWrite {
    fn commit(self, table: &mut Table) {
        let column = table.column_at_mut(self.column);
        for (row, value) in self.cells {
            column.set(row, value);
        }
    }
}

pub(crate) fn execute(
    plan: &ExecutionPlan,
    input: &Table,
    options: &ModifyOptions,
) -> Result<ModifyReport, ModifyError> {
    let start = Instant::now();
    for (unit, deps) in plan.units().iter().zip(plan.dependencies()) {
        check_columns(unit, deps, input)?;
    }

    let (table, applied) = if options.sequential {
        run_sequential(plan, input, options.na_condition)?
    } else {
        run_independent(plan, input, options.na_condition)?
    };

    let rows_affected: usize = applied.iter().map(RuleApplication::rows_affected).sum();
    info!(
        rules = plan.len(),
        rows = input.nrows(),
        sequential = options.sequential,
        rows_affected,
        "modify finished"
    );
    Ok(ModifyReport::new(
        table,
        applied,
        options.sequential,
        start.elapsed(),
    ))
}

fn run_sequential(
    plan: &ExecutionPlan,
    input: &Table,
    policy: NaPolicy,
) -> Result<(Table, Vec<RuleApplication>), ModifyError> {
    let mut working = input.clone();
    let mut applied = Vec::with_capacity(plan.len());

    for (unit, deps) in plan.units().iter().zip(plan.dependencies()) {
        let selected = mask(unit, deps, &working, policy)?;
        if !selected.is_empty() {
            for assignment in &unit.assignments {
                let write = pending_write(unit, assignment, &selected, &working)?;
                write.commit(&mut working);
            }
        }
        debug!(
            rule = %unit.name,
            rows_affected = selected.len(),
            observes = ?deps.observes,
            "rule applied"
        );
        applied.push(RuleApplication::new(unit.name.clone(), selected.len()));
    }
    Ok((working, applied))
}

fn run_independent(
    plan: &ExecutionPlan,
    input: &Table,
    policy: NaPolicy,
) -> Result<(Table, Vec<RuleApplication>), ModifyError> {
    let mut writes = Vec::new();
    let mut applied = Vec::with_capacity(plan.len());

    for (unit, deps) in plan.units().iter().zip(plan.dependencies()) {
        let selected = mask(unit, deps, input, policy)?;
        if !selected.is_empty() {
            for assignment in &unit.assignments {
                writes.push(pending_write(unit, assignment, &selected, input)?);
            }
        }
        debug!(rule = %unit.name, rows_affected = selected.len(), "rule applied");
        applied.push(RuleApplication::new(unit.name.clone(), selected.len()));
    }

    let mut output = input.clone();
    for write in writes {
        write.commit(&mut output);
    }
    Ok((output, applied))
}

fn check_columns(unit: &CompiledUnit, deps: &Dependencies, table: &Table) -> Result<(), ModifyError> {
    match deps.columns().find(|c| !table.contains(c)) {
        Some(column) => Err(ModifyError::MissingColumn {
            rule: unit.name.clone(),
            column: column.to_owned(),
            condition: unit.condition_text.clone(),
        }),
        None => Ok(()),
    }
}

/// Rows the rule applies to under `policy`.
fn mask(
    unit: &CompiledUnit,
    deps: &Dependencies,
    table: &Table,
    policy: NaPolicy,
) -> Result<Vec<Selected>, ModifyError> {
    // Column named in condition errors.
    let column = deps
        .condition_reads
        .first()
        .or_else(|| deps.writes.first())
        .map_or("", String::as_str);

    let condition =
        evaluate(&unit.condition, table).map_err(|e| modify_error(unit, column, e))?;

    let mut selected = Vec::new();
    for row in 0..table.nrows() {
        let action = match condition.get(row) {
            Some(Value::Bool(true)) => Some(false),
            Some(Value::Bool(false)) => None,
            None => match policy {
                NaPolicy::False => None,
                NaPolicy::True => Some(false),
                NaPolicy::Na => Some(true),
            },
            Some(other) => {
                return Err(ModifyError::NonLogicalCondition {
                    rule: unit.name.clone(),
                    column: column.to_owned(),
                    found: other.data_type(),
                    condition: unit.condition_text.clone(),
                })
            }
        };
        // `Some(blank)` selects the row.
        if let Some(blank) = action {
            selected.push(Selected { row, blank });
        }
    }
    Ok(selected)
}

/// Evaluate one assignment and type-check the selected cells against the
/// target column.
fn pending_write(
    unit: &CompiledUnit,
    assignment: &CompiledAssignment,
    selected: &[Selected],
    table: &Table,
) -> Result<PendingWrite, ModifyError> {
    let target = assignment.target.as_str();
    let Some(column_idx) = table.column_index(target) else {
        return Err(ModifyError::MissingColumn {
            rule: unit.name.clone(),
            column: target.to_owned(),
            condition: unit.condition_text.clone(),
        });
    };
    let column = table.column_at(column_idx);

    // The value is computed on the rows it is written to and nowhere else.
    let rows: Vec<usize> = selected.iter().filter(|s| !s.blank).map(|s| s.row).collect();
    let values = if rows.is_empty() {
        Vector::Scalar(None)
    } else {
        evaluate_rows(&assignment.value, table, Rows::Subset(&rows))
            .map_err(|e| modify_error(unit, target, e))?
    };

    let mut cells = Vec::with_capacity(selected.len());
    let mut position = 0;
    for s in selected {
        let value = if s.blank {
            None
        } else {
            position += 1;
            values.get(position - 1).cloned()
        };
        let value = column
            .coerce(value)
            .map_err(|found| type_mismatch(unit, target, column.dtype(), found))?;
        cells.push((s.row, value));
    }
    Ok(PendingWrite {
        column: column_idx,
        cells,
    })
}

fn type_mismatch(
    unit: &CompiledUnit,
    column: &str,
    expected: DataType,
    found: DataType,
) -> ModifyError {
    ModifyError::TypeMismatch {
        rule: unit.name.clone(),
        column: column.to_owned(),
        expected,
        found,
        condition: unit.condition_text.clone(),
    }
}

fn modify_error(unit: &CompiledUnit, column: &str, err: EvalError) -> ModifyError {
    let rule = unit.name.clone();
    let condition = unit.condition_text.clone();
    match err {
        EvalError::MissingColumn(column) => ModifyError::MissingColumn {
            rule,
            column,
            condition,
        },
        EvalError::Operands { op, lhs, rhs } => ModifyError::InvalidOperands {
            rule,
            column: column.to_owned(),
            op: op.to_owned(),
            operands: format!("{lhs} and {rhs}"),
            condition,
        },
        EvalError::Operand { op, found } => ModifyError::InvalidOperands {
            rule,
            column: column.to_owned(),
            op: op.to_owned(),
            operands: found.to_string(),
            condition,
        },
        EvalError::Argument { function, found } => ModifyError::InvalidArgument {
            rule,
            column: column.to_owned(),
            function: function.name().to_owned(),
            found,
            condition,
        },
    }
}
