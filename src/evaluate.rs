//! Column-wise expression evaluation.
//!
//! An expression is evaluated once over the whole table, producing one
//! value per row. Literal-only subtrees stay scalar and are broadcast on
//! demand.

use crate::functions::Function;
use crate::types::{ArithOp, CompareOp, CompiledExpr, DataType, Table, Value};

/// Result of evaluating an expression over a table.
#[derive(Debug, Clone)]
pub(crate) enum Vector<'t> {
    /// Same value on every row.
    Scalar(Option<Value>),
    /// A column read straight from the table.
    Borrowed(&'t [Option<Value>]),
    Owned(Vec<Option<Value>>),
}

impl<'t> Vector<'t> {
    pub(crate) fn get(&self, row: usize) -> Option<&Value> {
        match self {
            Vector::Scalar(v) => v.as_ref(),
            Vector::Borrowed(values) => values.get(row).and_then(Option::as_ref),
            Vector::Owned(values) => values.get(row).and_then(Option::as_ref),
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self, Vector::Scalar(_))
    }

    /// Materialize `rows` values, broadcasting scalars.
    #[cfg(test)]
    pub(crate) fn into_values(self, rows: usize) -> Vec<Option<Value>> {
        match self {
            Vector::Scalar(v) => vec![v; rows],
            Vector::Borrowed(values) => values.to_vec(),
            Vector::Owned(values) => values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EvalError {
    MissingColumn(String),
    /// Binary operator applied to incompatible types.
    Operands {
        op: &'static str,
        lhs: DataType,
        rhs: DataType,
    },
    /// Unary or logical operator applied to a wrong type.
    Operand { op: &'static str, found: DataType },
    Argument { function: Function, found: DataType },
}

type Cell = Result<Option<Value>, EvalError>;

/// Rows an expression is evaluated on.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Rows<'r> {
    /// Every row of the table, in order.
    All(usize),
    /// Only these rows. Position `i` of the result is row `rows[i]`.
    Subset(&'r [usize]),
}

impl Rows<'_> {
    fn len(&self) -> usize {
        match self {
            Rows::All(n) => *n,
            Rows::Subset(rows) => rows.len(),
        }
    }
}

pub(crate) fn evaluate<'t>(expr: &CompiledExpr, table: &'t Table) -> Result<Vector<'t>, EvalError> {
    evaluate_rows(expr, table, Rows::All(table.nrows()))
}

/// Evaluate `expr` on `rows` only. Cells outside `rows` are never computed,
/// so they cannot raise an error.
pub(crate) fn evaluate_rows<'t>(
    expr: &CompiledExpr,
    table: &'t Table,
    subset: Rows<'_>,
) -> Result<Vector<'t>, EvalError> {
    let evaluate = |e: &CompiledExpr| evaluate_rows(e, table, subset);
    let rows = subset.len();
    match expr {
        CompiledExpr::Column(name) => {
            let column = table
                .column(name)
                .ok_or_else(|| EvalError::MissingColumn(name.clone()))?;
            Ok(match subset {
                Rows::All(_) => Vector::Borrowed(column.values()),
                Rows::Subset(picked) => Vector::Owned(
                    picked
                        .iter()
                        .map(|&row| column.values().get(row).cloned().flatten())
                        .collect(),
                ),
            })
        }
        CompiledExpr::Literal(value) => Ok(Vector::Scalar(value.clone())),
        CompiledExpr::Compare { op, lhs, rhs } => {
            let (a, b) = (evaluate(lhs)?, evaluate(rhs)?);
            zip_with(&a, &b, rows, |x, y| compare(*op, x, y))
        }
        CompiledExpr::Arith { op, lhs, rhs } => {
            let (a, b) = (evaluate(lhs)?, evaluate(rhs)?);
            zip_with(&a, &b, rows, |x, y| arith(*op, x, y))
        }
        CompiledExpr::And(lhs, rhs) => {
            let (a, b) = (evaluate(lhs)?, evaluate(rhs)?);
            zip_with(&a, &b, rows, |x, y| {
                Ok(match (logical("&", x)?, logical("&", y)?) {
                    (Some(false), _) | (_, Some(false)) => Some(Value::Bool(false)),
                    (Some(true), Some(true)) => Some(Value::Bool(true)),
                    _ => None,
                })
            })
        }
        CompiledExpr::Or(lhs, rhs) => {
            let (a, b) = (evaluate(lhs)?, evaluate(rhs)?);
            zip_with(&a, &b, rows, |x, y| {
                Ok(match (logical("|", x)?, logical("|", y)?) {
                    (Some(true), _) | (_, Some(true)) => Some(Value::Bool(true)),
                    (Some(false), Some(false)) => Some(Value::Bool(false)),
                    _ => None,
                })
            })
        }
        CompiledExpr::Not(inner) => {
            let v = evaluate(inner)?;
            map(&v, rows, |x| Ok(logical("!", x)?.map(|b| Value::Bool(!b))))
        }
        CompiledExpr::Neg(inner) => {
            let v = evaluate(inner)?;
            map(&v, rows, |x| match x {
                None => Ok(None),
                Some(Value::Int(i)) => Ok(i.checked_neg().map(Value::Int)),
                Some(Value::Float(f)) => Ok(Some(Value::Float(-f))),
                Some(other) => Err(EvalError::Operand {
                    op: "-",
                    found: other.data_type(),
                }),
            })
        }
        CompiledExpr::In { needle, haystack } => {
            let mut args = Vec::with_capacity(haystack.len() + 1);
            args.push(evaluate(needle)?);
            for item in haystack {
                args.push(evaluate(item)?);
            }
            map_n(&args, rows, |cells| contains(cells[0], &cells[1..]))
        }
        CompiledExpr::Call { function, args } => {
            let args = args
                .iter()
                .map(evaluate)
                .collect::<Result<Vec<_>, _>>()?;
            map_n(&args, rows, |cells| {
                function
                    .apply(cells)
                    .map_err(|found| EvalError::Argument {
                        function: *function,
                        found,
                    })
            })
        }
    }
}

fn map<'t>(
    v: &Vector<'_>,
    rows: usize,
    mut f: impl FnMut(Option<&Value>) -> Cell,
) -> Result<Vector<'t>, EvalError> {
    if v.is_scalar() {
        return Ok(Vector::Scalar(f(v.get(0))?));
    }
    (0..rows)
        .map(|row| f(v.get(row)))
        .collect::<Result<Vec<_>, _>>()
        .map(Vector::Owned)
}

fn zip_with<'t>(
    a: &Vector<'_>,
    b: &Vector<'_>,
    rows: usize,
    mut f: impl FnMut(Option<&Value>, Option<&Value>) -> Cell,
) -> Result<Vector<'t>, EvalError> {
    if a.is_scalar() && b.is_scalar() {
        return Ok(Vector::Scalar(f(a.get(0), b.get(0))?));
    }
    (0..rows)
        .map(|row| f(a.get(row), b.get(row)))
        .collect::<Result<Vec<_>, _>>()
        .map(Vector::Owned)
}

fn map_n<'t>(
    args: &[Vector<'_>],
    rows: usize,
    mut f: impl FnMut(&[Option<&Value>]) -> Cell,
) -> Result<Vector<'t>, EvalError> {
    let mut cells: Vec<Option<&Value>> = Vec::with_capacity(args.len());
    if args.iter().all(Vector::is_scalar) {
        cells.extend(args.iter().map(|a| a.get(0)));
        return Ok(Vector::Scalar(f(&cells)?));
    }
    let mut out = Vec::with_capacity(rows);
    for row in 0..rows {
        cells.clear();
        cells.extend(args.iter().map(|a| a.get(row)));
        out.push(f(&cells)?);
    }
    Ok(Vector::Owned(out))
}

fn compatible(a: &Value, b: &Value) -> bool {
    let (ta, tb) = (a.data_type(), b.data_type());
    ta == tb || (ta.is_numeric() && tb.is_numeric())
}

fn compare(op: CompareOp, a: Option<&Value>, b: Option<&Value>) -> Cell {
    let (Some(a), Some(b)) = (a, b) else {
        return Ok(None);
    };
    if !compatible(a, b) {
        return Err(EvalError::Operands {
            op: compare_symbol(op),
            lhs: a.data_type(),
            rhs: b.data_type(),
        });
    }
    // NaN compares as missing.
    Ok(a.compare(op, b).map(Value::Bool))
}

fn compare_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "==",
        CompareOp::Neq => "!=",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
    }
}

fn logical(op: &'static str, v: Option<&Value>) -> Result<Option<bool>, EvalError> {
    match v {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(EvalError::Operand {
            op,
            found: other.data_type(),
        }),
    }
}

fn arith(op: ArithOp, a: Option<&Value>, b: Option<&Value>) -> Cell {
    let (Some(a), Some(b)) = (a, b) else {
        return Ok(None);
    };
    let invalid = || EvalError::Operands {
        op: op.symbol(),
        lhs: a.data_type(),
        rhs: b.data_type(),
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(int_arith(op, *x, *y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Some(Value::Float(float_arith(op, x, y)))),
            _ => Err(invalid()),
        },
    }
}

/// Integer arithmetic; overflow and integer division by zero give `NA`.
#[allow(clippy::cast_precision_loss)]
fn int_arith(op: ArithOp, x: i64, y: i64) -> Option<Value> {
    match op {
        ArithOp::Add => x.checked_add(y).map(Value::Int),
        ArithOp::Sub => x.checked_sub(y).map(Value::Int),
        ArithOp::Mul => x.checked_mul(y).map(Value::Int),
        ArithOp::Div | ArithOp::Pow => Some(Value::Float(float_arith(op, x as f64, y as f64))),
        ArithOp::Rem => {
            if y == 0 {
                return None;
            }
            let r = x.checked_rem(y).unwrap_or(0);
            Some(Value::Int(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
        }
    }
}

fn float_arith(op: ArithOp, x: f64, y: f64) -> f64 {
    match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Pow => x.powf(y),
        ArithOp::Rem => {
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
    }
}

/// `needle %in% set`: never missing. A missing needle matches a missing
/// member.
fn contains(needle: Option<&Value>, set: &[Option<&Value>]) -> Cell {
    let found = match needle {
        None => set.iter().any(Option::is_none),
        Some(n) => {
            let mut found = false;
            for item in set.iter().flatten() {
                if !compatible(n, item) {
                    return Err(EvalError::Operands {
                        op: "%in%",
                        lhs: n.data_type(),
                        rhs: item.data_type(),
                    });
                }
                found |= n.compare(CompareOp::Eq, item) == Some(true);
            }
            found
        }
    };
    Ok(Some(Value::Bool(found)))
}
