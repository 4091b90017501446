//! Built-in functions callable from rule expressions.
//!
//! Functions are applied cell by cell over already evaluated argument
//! columns. Unless noted otherwise a missing argument yields a missing
//! result.

use std::cmp::Ordering;
use std::fmt;

use crate::types::{CompareOp, DataType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Function {
    IsNa,
    Abs,
    Round,
    Floor,
    Ceiling,
    Sqrt,
    Nchar,
    ToUpper,
    ToLower,
    TrimWs,
    IfElse,
    PMin,
    PMax,
    Paste0,
    Coalesce,
    AsNumeric,
    AsInteger,
    AsCharacter,
}

const ALL: &[Function] = &[
    Function::IsNa,
    Function::Abs,
    Function::Round,
    Function::Floor,
    Function::Ceiling,
    Function::Sqrt,
    Function::Nchar,
    Function::ToUpper,
    Function::ToLower,
    Function::TrimWs,
    Function::IfElse,
    Function::PMin,
    Function::PMax,
    Function::Paste0,
    Function::Coalesce,
    Function::AsNumeric,
    Function::AsInteger,
    Function::AsCharacter,
];

/// Names of every built-in function, for diagnostics and docs.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    ALL.iter().map(|f| f.name())
}

impl Function {
    pub(crate) fn lookup(name: &str) -> Option<Function> {
        ALL.iter().copied().find(|f| f.name() == name)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Function::IsNa => "is.na",
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceiling => "ceiling",
            Function::Sqrt => "sqrt",
            Function::Nchar => "nchar",
            Function::ToUpper => "toupper",
            Function::ToLower => "tolower",
            Function::TrimWs => "trimws",
            Function::IfElse => "ifelse",
            Function::PMin => "pmin",
            Function::PMax => "pmax",
            Function::Paste0 => "paste0",
            Function::Coalesce => "coalesce",
            Function::AsNumeric => "as.numeric",
            Function::AsInteger => "as.integer",
            Function::AsCharacter => "as.character",
        }
    }

    /// Accepted argument count: minimum and optional maximum.
    pub(crate) fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Round => (1, Some(2)),
            Function::IfElse => (3, Some(3)),
            Function::PMin | Function::PMax | Function::Paste0 | Function::Coalesce => (1, None),
            _ => (1, Some(1)),
        }
    }

    pub(crate) fn arity_text(self) -> String {
        match self.arity() {
            (min, Some(max)) if min == max => min.to_string(),
            (min, Some(max)) => format!("{min} to {max}"),
            (min, None) => format!("at least {min}"),
        }
    }

    pub(crate) fn accepts(self, count: usize) -> bool {
        let (min, max) = self.arity();
        count >= min && max.map_or(true, |max| count <= max)
    }

    /// Apply to one row. On a type error returns the offending argument type.
    pub(crate) fn apply(self, args: &[Option<&Value>]) -> Result<Option<Value>, DataType> {
        match self {
            Function::IsNa => Ok(Some(Value::Bool(args[0].is_none()))),
            Function::Abs => unary(args[0], |v| match v {
                Value::Int(i) => Ok(i.checked_abs().map(Value::Int)),
                Value::Float(f) => Ok(Some(Value::Float(f.abs()))),
                other => Err(other.data_type()),
            }),
            Function::Round => round(args[0], args.get(1).copied().flatten()),
            Function::Floor => unary(args[0], |v| match v {
                Value::Int(_) => Ok(Some(v.clone())),
                Value::Float(f) => Ok(Some(Value::Float(f.floor()))),
                other => Err(other.data_type()),
            }),
            Function::Ceiling => unary(args[0], |v| match v {
                Value::Int(_) => Ok(Some(v.clone())),
                Value::Float(f) => Ok(Some(Value::Float(f.ceil()))),
                other => Err(other.data_type()),
            }),
            Function::Sqrt => unary(args[0], |v| match v.as_f64() {
                Some(f) => Ok(Some(Value::Float(f.sqrt()))),
                None => Err(v.data_type()),
            }),
            Function::Nchar => unary(args[0], |v| {
                let count = match v {
                    Value::String(s) => s.chars().count(),
                    other => other.to_text().chars().count(),
                };
                Ok(i64::try_from(count).ok().map(Value::Int))
            }),
            Function::ToUpper => text(args[0], str::to_uppercase),
            Function::ToLower => text(args[0], str::to_lowercase),
            Function::TrimWs => text(args[0], |s| s.trim().to_owned()),
            Function::IfElse => match args[0] {
                None => Ok(None),
                Some(Value::Bool(true)) => Ok(args[1].cloned()),
                Some(Value::Bool(false)) => Ok(args[2].cloned()),
                Some(other) => Err(other.data_type()),
            },
            Function::PMin => extreme(args, Ordering::Less),
            Function::PMax => extreme(args, Ordering::Greater),
            Function::Paste0 => {
                let mut out = String::new();
                for arg in args {
                    match arg {
                        Some(v) => out.push_str(&v.to_text()),
                        None => out.push_str("NA"),
                    }
                }
                Ok(Some(Value::String(out)))
            }
            Function::Coalesce => Ok(args.iter().find_map(|a| a.cloned())),
            Function::AsNumeric => unary(args[0], |v| {
                Ok(match v {
                    Value::Int(_) | Value::Float(_) => v.as_f64().map(Value::Float),
                    Value::Bool(b) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),
                    Value::String(s) => parse_number(s).map(Value::Float),
                })
            }),
            Function::AsInteger => unary(args[0], |v| {
                Ok(match v {
                    Value::Int(_) => Some(v.clone()),
                    Value::Float(f) => truncate(*f).map(Value::Int),
                    Value::Bool(b) => Some(Value::Int(i64::from(*b))),
                    Value::String(s) => {
                        let s = s.trim();
                        s.parse::<i64>()
                            .ok()
                            .or_else(|| parse_number(s).and_then(truncate))
                            .map(Value::Int)
                    }
                })
            }),
            Function::AsCharacter => unary(args[0], |v| Ok(Some(Value::String(v.to_text())))),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn unary(
    arg: Option<&Value>,
    f: impl FnOnce(&Value) -> Result<Option<Value>, DataType>,
) -> Result<Option<Value>, DataType> {
    match arg {
        Some(v) => f(v),
        None => Ok(None),
    }
}

fn text(arg: Option<&Value>, f: impl FnOnce(&str) -> String) -> Result<Option<Value>, DataType> {
    unary(arg, |v| match v {
        Value::String(s) => Ok(Some(Value::String(f(s)))),
        other => Err(other.data_type()),
    })
}

/// `round(x, digits)`, half to even. Negative `digits` round left of the
/// decimal point and give a float.
fn round(x: Option<&Value>, digits: Option<&Value>) -> Result<Option<Value>, DataType> {
    let digits = match digits {
        None => 0,
        Some(Value::Int(d)) => *d,
        Some(Value::Float(d)) if d.fract() == 0.0 => match truncate(*d) {
            Some(d) => d,
            None => return Ok(None),
        },
        Some(other) => return Err(other.data_type()),
    };
    let Some(x) = x else {
        return Ok(None);
    };
    match x {
        Value::Int(_) if digits >= 0 => Ok(Some(x.clone())),
        Value::Int(_) | Value::Float(_) => {
            let v = x.as_f64().unwrap_or(f64::NAN);
            let exp = i32::try_from(digits.clamp(-308, 308)).unwrap_or(0);
            let scale = 10_f64.powi(exp.abs());
            let scaled = if exp >= 0 { v * scale } else { v / scale };
            if !scaled.is_finite() {
                return Ok(Some(Value::Float(v)));
            }
            let rounded = scaled.round_ties_even();
            Ok(Some(Value::Float(if exp >= 0 {
                rounded / scale
            } else {
                rounded * scale
            })))
        }
        other => Err(other.data_type()),
    }
}

/// `pmin` / `pmax`: missing if any argument is missing. Mixed int and
/// float arguments give a float.
fn extreme(args: &[Option<&Value>], want: Ordering) -> Result<Option<Value>, DataType> {
    let mut best: Option<&Value> = None;
    let mut any_float = false;
    for &arg in args {
        let Some(v) = arg else {
            return Ok(None);
        };
        any_float |= matches!(v, Value::Float(_));
        best = match best {
            None => Some(v),
            Some(current) => {
                let compatible = (current.data_type().is_numeric() && v.data_type().is_numeric())
                    || current.data_type() == v.data_type();
                if !compatible {
                    return Err(v.data_type());
                }
                let op = if want == Ordering::Less {
                    CompareOp::Lt
                } else {
                    CompareOp::Gt
                };
                match v.compare(op, current) {
                    Some(true) => Some(v),
                    Some(false) => Some(current),
                    // NaN
                    None => return Ok(Some(Value::Float(f64::NAN))),
                }
            }
        };
    }
    Ok(best.map(|v| match v {
        Value::Int(_) if any_float => Value::Float(v.as_f64().unwrap_or(f64::NAN)),
        other => other.clone(),
    }))
}

fn parse_number(s: &str) -> Option<f64> {
    match s.trim() {
        "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        t => t.parse::<f64>().ok().filter(|f| f.is_finite()),
    }
}

/// Toward zero; `None` when the result does not fit in an `i64`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncate(f: f64) -> Option<i64> {
    let t = f.trunc();
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: Function, args: &[Option<Value>]) -> Result<Option<Value>, DataType> {
        let refs: Vec<Option<&Value>> = args.iter().map(Option::as_ref).collect();
        f.apply(&refs)
    }

    fn int(v: i64) -> Option<Value> {
        Some(Value::Int(v))
    }

    fn float(v: f64) -> Option<Value> {
        Some(Value::Float(v))
    }

    fn string(v: &str) -> Option<Value> {
        Some(Value::from(v))
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Function::lookup("is.na"), Some(Function::IsNa));
        assert_eq!(Function::lookup("system"), None);
        assert_eq!(builtin_names().count(), ALL.len());
    }

    #[test]
    fn arity_rules() {
        assert!(Function::Round.accepts(1));
        assert!(Function::Round.accepts(2));
        assert!(!Function::Round.accepts(3));
        assert!(Function::Paste0.accepts(5));
        assert!(!Function::Paste0.accepts(0));
        assert_eq!(Function::IfElse.arity_text(), "3");
        assert_eq!(Function::Round.arity_text(), "1 to 2");
        assert_eq!(Function::Coalesce.arity_text(), "at least 1");
    }

    #[test]
    fn is_na_never_missing() {
        assert_eq!(call(Function::IsNa, &[None]), Ok(Some(Value::Bool(true))));
        assert_eq!(call(Function::IsNa, &[int(1)]), Ok(Some(Value::Bool(false))));
    }

    #[test]
    fn abs_overflow_is_missing() {
        assert_eq!(call(Function::Abs, &[int(-3)]), Ok(int(3)));
        assert_eq!(call(Function::Abs, &[int(i64::MIN)]), Ok(None));
        assert_eq!(call(Function::Abs, &[string("x")]), Err(DataType::String));
    }

    #[test]
    fn round_half_to_even() {
        assert_eq!(call(Function::Round, &[float(2.5)]), Ok(float(2.0)));
        assert_eq!(call(Function::Round, &[float(3.5)]), Ok(float(4.0)));
        assert_eq!(call(Function::Round, &[float(1.25), int(1)]), Ok(float(1.2)));
        assert_eq!(call(Function::Round, &[int(7)]), Ok(int(7)));
        assert_eq!(call(Function::Round, &[int(1250), int(-2)]), Ok(float(1200.0)));
    }

    #[test]
    fn string_functions() {
        assert_eq!(call(Function::ToUpper, &[string("ab")]), Ok(string("AB")));
        assert_eq!(call(Function::TrimWs, &[string("  a ")]), Ok(string("a")));
        assert_eq!(call(Function::Nchar, &[string("héllo")]), Ok(int(5)));
        assert_eq!(call(Function::ToLower, &[int(1)]), Err(DataType::Int));
    }

    #[test]
    fn ifelse_propagates_missing_test() {
        assert_eq!(
            call(Function::IfElse, &[Some(Value::Bool(true)), int(1), int(2)]),
            Ok(int(1))
        );
        assert_eq!(call(Function::IfElse, &[None, int(1), int(2)]), Ok(None));
        assert_eq!(
            call(Function::IfElse, &[int(1), int(1), int(2)]),
            Err(DataType::Int)
        );
    }

    #[test]
    fn pmin_pmax() {
        assert_eq!(call(Function::PMin, &[int(3), int(1), int(2)]), Ok(int(1)));
        assert_eq!(call(Function::PMax, &[int(3), float(4.5)]), Ok(float(4.5)));
        assert_eq!(call(Function::PMax, &[int(3), float(1.0)]), Ok(float(3.0)));
        assert_eq!(call(Function::PMin, &[int(3), None]), Ok(None));
        assert_eq!(
            call(Function::PMin, &[int(3), string("a")]),
            Err(DataType::String)
        );
    }

    #[test]
    fn paste0_and_coalesce() {
        assert_eq!(
            call(Function::Paste0, &[string("id-"), int(7), None]),
            Ok(string("id-7NA"))
        );
        assert_eq!(call(Function::Coalesce, &[None, int(2), int(3)]), Ok(int(2)));
        assert_eq!(call(Function::Coalesce, &[None, None]), Ok(None));
    }

    #[test]
    fn conversions() {
        assert_eq!(call(Function::AsNumeric, &[string(" 1.5 ")]), Ok(float(1.5)));
        assert_eq!(call(Function::AsNumeric, &[string("abc")]), Ok(None));
        assert_eq!(call(Function::AsInteger, &[float(-2.7)]), Ok(int(-2)));
        assert_eq!(call(Function::AsInteger, &[string("42")]), Ok(int(42)));
        assert_eq!(call(Function::AsInteger, &[float(f64::NAN)]), Ok(None));
        assert_eq!(
            call(Function::AsCharacter, &[Some(Value::Bool(true))]),
            Ok(string("TRUE"))
        );
    }
}
