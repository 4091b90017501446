use std::fmt;
use std::ops;
use std::str::FromStr;

use super::Value;
use crate::functions::Function;
use crate::parse::ParseError;

/// Comparison operators supported in rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Arithmetic operators supported in rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    /// `%%`, modulo with the sign of the divisor.
    Rem,
    /// `^`
    Pow,
}

impl ArithOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%%",
            ArithOp::Pow => "^",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            ArithOp::Add | ArithOp::Sub => prec::ADD,
            ArithOp::Mul | ArithOp::Div => prec::MUL,
            ArithOp::Rem => prec::SPECIAL,
            ArithOp::Pow => prec::POW,
        }
    }
}

/// User-facing expression AST over column names, literals and function calls.
/// Lowered into [`CompiledExpr`] during compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    /// The missing value `NA`.
    Na,
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    /// `needle %in% c(set...)`
    In {
        needle: Box<Expr>,
        set: Vec<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

/// Expression with function names resolved. Column references stay by name:
/// the table is not known until execution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompiledExpr {
    Column(String),
    Literal(Option<Value>),
    Compare {
        op: CompareOp,
        lhs: Box<CompiledExpr>,
        rhs: Box<CompiledExpr>,
    },
    Arith {
        op: ArithOp,
        lhs: Box<CompiledExpr>,
        rhs: Box<CompiledExpr>,
    },
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
    Not(Box<CompiledExpr>),
    Neg(Box<CompiledExpr>),
    In {
        needle: Box<CompiledExpr>,
        haystack: Vec<CompiledExpr>,
    },
    Call {
        function: Function,
        args: Vec<CompiledExpr>,
    },
}

// Binding strength, loosest first. Mirrors the grammar in `parse::grammar`.
mod prec {
    pub(super) const OR: u8 = 1;
    pub(super) const AND: u8 = 2;
    pub(super) const NOT: u8 = 3;
    pub(super) const COMPARE: u8 = 4;
    pub(super) const ADD: u8 = 5;
    pub(super) const MUL: u8 = 6;
    pub(super) const SPECIAL: u8 = 7;
    pub(super) const UNARY: u8 = 8;
    pub(super) const POW: u8 = 9;
    pub(super) const PRIMARY: u8 = 10;
}

const RESERVED: &[&str] = &[
    "if", "else", "repeat", "while", "function", "for", "in", "next", "break", "TRUE", "FALSE",
    "NULL", "Inf", "NaN", "NA", "NA_integer_", "NA_real_", "NA_character_",
];

pub(crate) fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

/// Whether `name` can be written without backticks.
pub(crate) fn is_syntactic_name(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_start = match chars.next() {
        Some('.') => !name[1..].starts_with(|c: char| c.is_ascii_digit()),
        Some(c) => c.is_ascii_alphabetic(),
        None => false,
    };
    valid_start
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
        && !is_reserved(name)
}

/// Whether `name` is usable as a column name at all (possibly backticked).
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c == '`' || c.is_control())
}

pub(crate) fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_syntactic_name(name) {
        write!(f, "{name}")
    } else {
        write!(f, "`{name}`")
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Neq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Renders rule-language source with the minimum parentheses needed to
/// re-parse into the same tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_at(f, 0)
    }
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => prec::OR,
            Expr::And(..) => prec::AND,
            Expr::Not(_) => prec::NOT,
            Expr::Compare { .. } => prec::COMPARE,
            Expr::Arith { op, .. } => op.precedence(),
            Expr::In { .. } => prec::SPECIAL,
            Expr::Neg(_) => prec::UNARY,
            Expr::Literal(Value::Int(v)) if *v < 0 => prec::UNARY,
            Expr::Literal(Value::Float(v)) if v.is_sign_negative() && !v.is_nan() => prec::UNARY,
            _ => prec::PRIMARY,
        }
    }

    fn write_at(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "(")?;
            self.write_bare(f)?;
            write!(f, ")")
        } else {
            self.write_bare(f)
        }
    }

    fn write_bare(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write_name(f, name),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Na => write!(f, "NA"),
            Expr::Or(a, b) => {
                a.write_at(f, prec::OR)?;
                write!(f, " | ")?;
                b.write_at(f, prec::AND)
            }
            Expr::And(a, b) => {
                a.write_at(f, prec::AND)?;
                write!(f, " & ")?;
                b.write_at(f, prec::NOT)
            }
            Expr::Not(inner) => {
                write!(f, "!")?;
                inner.write_at(f, prec::NOT)
            }
            Expr::Compare { op, lhs, rhs } => {
                lhs.write_at(f, prec::ADD)?;
                write!(f, " {op} ")?;
                rhs.write_at(f, prec::ADD)
            }
            Expr::Arith {
                op: ArithOp::Pow,
                lhs,
                rhs,
            } => {
                lhs.write_at(f, prec::PRIMARY)?;
                write!(f, "^")?;
                rhs.write_at(f, prec::UNARY)
            }
            Expr::Arith { op, lhs, rhs } => {
                let p = op.precedence();
                lhs.write_at(f, p)?;
                write!(f, " {op} ")?;
                rhs.write_at(f, p + 1)
            }
            Expr::Neg(inner) => {
                write!(f, "-")?;
                inner.write_at(f, prec::UNARY)
            }
            Expr::In { needle, set } => {
                needle.write_at(f, prec::SPECIAL)?;
                write!(f, " %in% ")?;
                match set.as_slice() {
                    [single] => single.write_at(f, prec::UNARY),
                    items => {
                        write!(f, "c(")?;
                        write_args(f, items)?;
                        write!(f, ")")
                    }
                }
            }
            Expr::Call { function, args } => {
                write!(f, "{function}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl Expr {
    #[must_use]
    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Eq, rhs)
    }

    #[must_use]
    pub fn neq(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Neq, rhs)
    }

    #[must_use]
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Gt, rhs)
    }

    #[must_use]
    pub fn gte(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Gte, rhs)
    }

    #[must_use]
    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Lt, rhs)
    }

    #[must_use]
    pub fn lte(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Lte, rhs)
    }

    #[must_use]
    pub fn compare(self, op: CompareOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Compare {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    #[must_use]
    pub fn arith(self, op: ArithOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Arith {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    #[must_use]
    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    /// `self %in% c(values...)`. Nested `c(...)` calls are flattened.
    #[must_use]
    pub fn is_in<T: Into<Expr>>(self, values: impl IntoIterator<Item = T>) -> Expr {
        let mut set = Vec::new();
        for value in values {
            flatten_set(value.into(), &mut set);
        }
        Expr::In {
            needle: Box::new(self),
            set,
        }
    }

    /// `is.na(self)`
    #[must_use]
    pub fn is_na(self) -> Expr {
        call("is.na", [self])
    }
}

/// Spreads `c(a, c(b, d))` into `[a, b, d]`.
pub(crate) fn flatten_set(expr: Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Call { function, args } if function == "c" => {
            for arg in args {
                flatten_set(arg, out);
            }
        }
        other => out.push(other),
    }
}

/// Unary minus; folds into numeric literals so `-5` is a single literal.
pub(crate) fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(Value::Int(v)) => match v.checked_neg() {
            Some(n) => Expr::Literal(Value::Int(n)),
            None => Expr::Neg(Box::new(Expr::Literal(Value::Int(v)))),
        },
        Expr::Literal(Value::Float(v)) => Expr::Literal(Value::Float(-v)),
        other => Expr::Neg(Box::new(other)),
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        negate(self)
    }
}

macro_rules! arith_impl {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Expr>> ops::$trait<T> for Expr {
            type Output = Expr;

            fn $method(self, rhs: T) -> Expr {
                self.arith($op, rhs)
            }
        }
    };
}

arith_impl!(Add, add, ArithOp::Add);
arith_impl!(Sub, sub, ArithOp::Sub);
arith_impl!(Mul, mul, ArithOp::Mul);
arith_impl!(Div, div, ArithOp::Div);
arith_impl!(Rem, rem, ArithOp::Rem);

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Literal(Value::Int(v))
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Literal(Value::from(v))
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Literal(Value::Float(v))
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Literal(Value::Bool(v))
    }
}

/// String literal, not a column reference. Use [`col()`] for columns.
impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::Literal(Value::from(v))
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Expr::Literal(Value::String(v))
    }
}

impl FromStr for Expr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parse::parse_expr(s)
    }
}

/// Reference a column (or a macro) by name.
#[must_use]
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_owned())
}

#[must_use]
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

#[must_use]
pub fn na() -> Expr {
    Expr::Na
}

#[must_use]
pub fn call(function: &str, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Call {
        function: function.to_owned(),
        args: args.into_iter().collect(),
    }
}
