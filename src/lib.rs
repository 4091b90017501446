//! Conditional data-modification rules applied column-wise to tables.
//!
//! Rules have the form `if (CONDITION) TARGET <- VALUE`. A [`Modifier`]
//! holds an ordered set of them, plus reusable `name := expr` macros, and
//! applies the whole set to a [`Table`] in one call. Each rule runs once over
//! whole columns, never once per row.
//!
//! ```
//! use remodel::{Column, Modifier, ModifyOptions, Table};
//!
//! let modifier = Modifier::from_dsl(
//!     "
//!     negative := turnover < 0
//!     if (negative) turnover <- -turnover
//!     if (is.na(staff)) staff <- 0L
//!     ",
//! )
//! .unwrap();
//!
//! let table = Table::new()
//!     .with_column("turnover", Column::float([120.0, -45.0]))
//!     .unwrap()
//!     .with_column("staff", Column::int([Some(3_i64), None]))
//!     .unwrap();
//!
//! let report = modifier.modify(&table, &ModifyOptions::default()).unwrap();
//! assert_eq!(report.total_rows_affected(), 2);
//! ```

mod analyze;
mod compile;
pub mod entry;
mod error;
mod evaluate;
mod execute;
mod functions;
mod macros;
pub mod parse;
#[cfg(feature = "binary-cache")]
pub mod serial;
mod types;

pub use entry::RuleEntry;
pub use error::RemodelError;
pub use functions::builtin_names;
pub use macros::{MacroSet, MAX_MACRO_DEPTH};
pub use types::{
    call, col, lit, na, ArithOp, Assignment, BuildError, Column, CompareOp, CompileError,
    DataType, ExecutionPlan, Expr, MacroError, Modifier, ModifierBuilder, ModifyError,
    ModifyOptions, ModifyReport, NaPolicy, Rule, RuleApplication, RuleBuilder, RuleWarning,
    SyntaxError, Table, TableError, UnknownNaPolicy, Value,
};

#[cfg(feature = "serde")]
pub use entry::RuleDocument;
#[cfg(feature = "binary-cache")]
pub use serial::{DeserializeError, SerializeError};
