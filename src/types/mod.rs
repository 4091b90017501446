mod error;
mod expr;
mod modifier;
mod options;
mod plan;
mod report;
mod rule;
mod table;
mod value;

pub use error::{
    BuildError, CompileError, MacroError, ModifyError, RuleWarning, SyntaxError, TableError,
};
pub use expr::{call, col, lit, na, ArithOp, CompareOp, Expr};
pub use modifier::{Modifier, ModifierBuilder};
pub use options::{ModifyOptions, NaPolicy, UnknownNaPolicy};
pub use plan::ExecutionPlan;
pub use report::{ModifyReport, RuleApplication};
pub use rule::{Assignment, Rule, RuleBuilder};
pub use table::{Column, Table};
pub use value::{DataType, Value};

pub(crate) use expr::{
    flatten_set, is_reserved, is_valid_name, negate, write_name, CompiledExpr,
};
pub(crate) use rule::{CompiledAssignment, CompiledUnit};
