use tracing::debug;

use crate::analyze::analyze;
use crate::functions::Function;
use crate::macros::MacroSet;
use crate::types::{
    is_valid_name, CompileError, CompiledAssignment, CompiledExpr, CompiledUnit, ExecutionPlan,
    Expr, Modifier, Rule,
};

/// Lower every rule of `modifier` into an [`ExecutionPlan`], in declaration
/// order.
pub(crate) fn compile(modifier: &Modifier) -> Result<ExecutionPlan, CompileError> {
    let units = modifier
        .rules()
        .iter()
        .map(|rule| compile_rule(rule, modifier.macros()))
        .collect::<Result<Vec<_>, _>>()?;

    let deps = analyze(&units);
    debug!(rules = units.len(), "compiled execution plan");
    Ok(ExecutionPlan::new(units, deps))
}

fn compile_rule(rule: &Rule, macros: &MacroSet) -> Result<CompiledUnit, CompileError> {
    let lowering = Lowering {
        rule: rule.name(),
        macros,
    };

    let mut assignments = Vec::with_capacity(rule.assignments().len());
    for assignment in rule.assignments() {
        if !is_valid_name(assignment.target()) {
            return Err(CompileError::InvalidTarget {
                rule: rule.name().to_owned(),
                target: assignment.target().to_owned(),
            });
        }
        assignments.push(CompiledAssignment {
            target: assignment.target().to_owned(),
            value: lowering.lower(assignment.value())?,
        });
    }

    Ok(CompiledUnit {
        name: rule.name().to_owned(),
        condition: lowering.lower(rule.condition())?,
        condition_text: rule.condition().to_string(),
        assignments,
    })
}

struct Lowering<'a> {
    rule: &'a str,
    macros: &'a MacroSet,
}

impl Lowering<'_> {
    fn lower(&self, expr: &Expr) -> Result<CompiledExpr, CompileError> {
        let expanded = self
            .macros
            .expand(expr)
            .map_err(|source| CompileError::Macro {
                rule: self.rule.to_owned(),
                source,
            })?;
        self.lower_expanded(&expanded)
    }

    fn lower_expanded(&self, expr: &Expr) -> Result<CompiledExpr, CompileError> {
        let boxed = |e: &Expr| self.lower_expanded(e).map(Box::new);
        Ok(match expr {
            Expr::Column(name) => CompiledExpr::Column(name.clone()),
            Expr::Literal(value) => CompiledExpr::Literal(Some(value.clone())),
            Expr::Na => CompiledExpr::Literal(None),
            Expr::Compare { op, lhs, rhs } => CompiledExpr::Compare {
                op: *op,
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
            },
            Expr::Arith { op, lhs, rhs } => CompiledExpr::Arith {
                op: *op,
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
            },
            Expr::And(a, b) => CompiledExpr::And(boxed(a)?, boxed(b)?),
            Expr::Or(a, b) => CompiledExpr::Or(boxed(a)?, boxed(b)?),
            Expr::Not(inner) => CompiledExpr::Not(boxed(inner)?),
            Expr::Neg(inner) => CompiledExpr::Neg(boxed(inner)?),
            Expr::In { needle, set } => CompiledExpr::In {
                needle: boxed(needle)?,
                haystack: set
                    .iter()
                    .map(|item| self.lower_expanded(item))
                    .collect::<Result<_, _>>()?,
            },
            Expr::Call { function, args } => self.lower_call(function, args)?,
        })
    }

    fn lower_call(&self, name: &str, args: &[Expr]) -> Result<CompiledExpr, CompileError> {
        if name == "c" {
            return Err(CompileError::VectorOutsideIn {
                rule: self.rule.to_owned(),
            });
        }
        let function = Function::lookup(name).ok_or_else(|| CompileError::UnknownFunction {
            rule: self.rule.to_owned(),
            function: name.to_owned(),
        })?;
        if !function.accepts(args.len()) {
            return Err(CompileError::Arity {
                rule: self.rule.to_owned(),
                function: name.to_owned(),
                expected: function.arity_text(),
                found: args.len(),
            });
        }
        Ok(CompiledExpr::Call {
            function,
            args: args
                .iter()
                .map(|a| self.lower_expanded(a))
                .collect::<Result<_, _>>()?,
        })
    }
}
