use winnow::ascii::{digit0, digit1, till_line_ending};
use winnow::combinator::{alt, cut_err, fail, not, opt, repeat};
use winnow::error::{ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_till, take_while};

use crate::types::{flatten_set, is_reserved, negate, ArithOp, CompareOp, Expr, Value};

use super::parser::RawStatement;

// -- Whitespace & comments --------------------------------------------------

fn comment(input: &mut &str) -> ModalResult<()> {
    ('#', till_line_ending).void().parse_next(input)
}

/// Spaces, tabs and comments. Stops at a newline.
fn hs(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((take_while(1.., [' ', '\t', '\r']).void(), comment)),
    )
    .parse_next(input)?;
    Ok(())
}

fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((take_while(1.., char::is_whitespace).void(), comment)),
    )
    .parse_next(input)?;
    Ok(())
}

/// Inside brackets a newline is just whitespace; at statement level it ends
/// the value.
fn sp(input: &mut &str, nl: bool) -> ModalResult<()> {
    if nl {
        ws(input)
    } else {
        hs(input)
    }
}

fn separators(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_whitespace() || c == ';').void(),
            comment,
        )),
    )
    .parse_next(input)?;
    Ok(())
}

fn eat(input: &mut &str, token: &str) -> bool {
    match input.strip_prefix(token) {
        Some(rest) => {
            *input = rest;
            true
        }
        None => false,
    }
}

fn expected<T>(what: &'static str, input: &mut &str) -> ModalResult<T> {
    cut_err(fail)
        .context(StrContext::Expected(StrContextValue::Description(what)))
        .parse_next(input)
}

fn expect_char(input: &mut &str, c: char) -> ModalResult<()> {
    cut_err(c)
        .context(StrContext::Expected(StrContextValue::CharLiteral(c)))
        .void()
        .parse_next(input)
}

// -- Names ------------------------------------------------------------------

fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        alt((
            one_of(|c: char| c.is_ascii_alphabetic()).void(),
            ('.', not(one_of(|c: char| c.is_ascii_digit()))).void(),
        )),
        take_while(0.., |c: char| {
            c.is_ascii_alphanumeric() || c == '.' || c == '_'
        }),
    )
        .take()
        .parse_next(input)
}

fn quoted_name(input: &mut &str) -> ModalResult<String> {
    '`'.parse_next(input)?;
    let name = cut_err(take_till(1.., ['`', '\n']))
        .context(StrContext::Expected(StrContextValue::Description("name")))
        .parse_next(input)?;
    expect_char(input, '`')?;
    Ok(name.to_owned())
}

fn plain_name(input: &mut &str) -> ModalResult<String> {
    let checkpoint = input.checkpoint();
    let word = identifier(input)?;
    if is_reserved(word) {
        input.reset(&checkpoint);
        return fail.parse_next(input);
    }
    Ok(word.to_owned())
}

fn name(input: &mut &str) -> ModalResult<String> {
    alt((quoted_name, plain_name)).parse_next(input)
}

fn keyword(input: &mut &str, word: &str) -> ModalResult<()> {
    let checkpoint = input.checkpoint();
    if identifier(input)? == word {
        Ok(())
    } else {
        input.reset(&checkpoint);
        fail.parse_next(input)
    }
}

// -- Literals ---------------------------------------------------------------

fn number(input: &mut &str) -> ModalResult<Expr> {
    let text = (
        alt((
            (digit1, opt(('.', digit0))).void(),
            ('.', digit1).void(),
        )),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), cut_err(digit1))),
    )
        .take()
        .parse_next(input)?;
    // `10L` is the same integer as `10`
    let _ = opt('L').parse_next(input)?;

    if !text.contains(['.', 'e', 'E']) {
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Expr::Literal(Value::Int(v)));
        }
    }
    text.parse::<f64>()
        .map(|v| Expr::Literal(Value::Float(v)))
        .map_err(|_| ErrMode::from_input(input).cut())
}

fn string(input: &mut &str) -> ModalResult<String> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    cut_err(move |i: &mut &str| string_body(i, quote))
        .context(StrContext::Expected(StrContextValue::Description(
            "closing quote",
        )))
        .parse_next(input)
}

fn string_body(input: &mut &str, quote: char) -> ModalResult<String> {
    let mut s = String::new();
    loop {
        match any.parse_next(input)? {
            c if c == quote => return Ok(s),
            '\\' => match any.parse_next(input)? {
                'n' => s.push('\n'),
                't' => s.push('\t'),
                'r' => s.push('\r'),
                c @ ('"' | '\'' | '\\') => s.push(c),
                _ => return expected("escape sequence", input),
            },
            c => s.push(c),
        }
    }
}

// -- Expressions ------------------------------------------------------------
//
// Loosest first: `|` < `&` < `!` < comparison < `+ -` < `* /` < `%% %in%`
// < unary minus < `^`.

type Level = fn(&mut &str, bool) -> ModalResult<Expr>;

/// An operator token from `table`, surrounded by whitespace. A `None` entry
/// is a longer token that must not be read as one of this level's operators.
fn operator<T: Copy>(
    input: &mut &str,
    nl: bool,
    table: &[(&str, Option<T>)],
) -> ModalResult<Option<T>> {
    let checkpoint = input.checkpoint();
    sp(input, nl)?;
    for &(symbol, op) in table {
        if let Some(rest) = input.strip_prefix(symbol) {
            if let Some(op) = op {
                *input = rest;
                ws(input)?;
                return Ok(Some(op));
            }
            break;
        }
    }
    input.reset(&checkpoint);
    Ok(None)
}

/// The operand after an operator is mandatory.
fn operand(input: &mut &str, nl: bool, level: Level) -> ModalResult<Expr> {
    cut_err(move |i: &mut &str| level(i, nl))
        .context(StrContext::Expected(StrContextValue::Description(
            "expression",
        )))
        .parse_next(input)
}

pub(super) fn expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    or_expr(input, nl)
}

fn or_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    let mut lhs = and_expr(input, nl)?;
    while operator(input, nl, &[("||", Some(())), ("|", Some(()))])?.is_some() {
        lhs = lhs.or(operand(input, nl, and_expr)?);
    }
    Ok(lhs)
}

fn and_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    let mut lhs = not_expr(input, nl)?;
    while operator(input, nl, &[("&&", Some(())), ("&", Some(()))])?.is_some() {
        lhs = lhs.and(operand(input, nl, not_expr)?);
    }
    Ok(lhs)
}

fn not_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    if eat(input, "!") {
        ws(input)?;
        return Ok(!operand(input, nl, not_expr)?);
    }
    compare_expr(input, nl)
}

const COMPARE_OPS: &[(&str, Option<CompareOp>)] = &[
    ("==", Some(CompareOp::Eq)),
    ("!=", Some(CompareOp::Neq)),
    ("<=", Some(CompareOp::Lte)),
    (">=", Some(CompareOp::Gte)),
    ("<-", None),
    ("<", Some(CompareOp::Lt)),
    (">", Some(CompareOp::Gt)),
];

/// Comparisons do not chain: `a < b < c` is an error.
fn compare_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    let lhs = add_expr(input, nl)?;
    match operator(input, nl, COMPARE_OPS)? {
        Some(op) => Ok(lhs.compare(op, operand(input, nl, add_expr)?)),
        None => Ok(lhs),
    }
}

fn add_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    let ops = [("+", Some(ArithOp::Add)), ("-", Some(ArithOp::Sub))];
    let mut lhs = mul_expr(input, nl)?;
    while let Some(op) = operator(input, nl, &ops)? {
        lhs = lhs.arith(op, operand(input, nl, mul_expr)?);
    }
    Ok(lhs)
}

fn mul_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    let ops = [
        ("**", None),
        ("*", Some(ArithOp::Mul)),
        ("/", Some(ArithOp::Div)),
    ];
    let mut lhs = special_expr(input, nl)?;
    while let Some(op) = operator(input, nl, &ops)? {
        lhs = lhs.arith(op, operand(input, nl, special_expr)?);
    }
    Ok(lhs)
}

#[derive(Clone, Copy)]
enum Special {
    Rem,
    In,
}

fn special_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    let ops = [("%%", Some(Special::Rem)), ("%in%", Some(Special::In))];
    let mut lhs = unary_expr(input, nl)?;
    while let Some(op) = operator(input, nl, &ops)? {
        let rhs = operand(input, nl, unary_expr)?;
        lhs = match op {
            Special::Rem => lhs.arith(ArithOp::Rem, rhs),
            Special::In => {
                let mut set = Vec::new();
                flatten_set(rhs, &mut set);
                Expr::In {
                    needle: Box::new(lhs),
                    set,
                }
            }
        };
    }
    Ok(lhs)
}

/// The digits of `i64::MIN` without its sign. On their own they overflow
/// `i64` and read as a float.
const MIN_INT_DIGITS: &str = "9223372036854775808";

/// `-9223372036854775808` read as the integer `i64::MIN`, unless it is the
/// base of a power.
fn min_int(input: &mut &str) -> ModalResult<Expr> {
    (
        MIN_INT_DIGITS,
        opt('L'),
        not(one_of(|c: char| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E'))),
        not((ws, alt(("^", "**")))),
    )
        .parse_next(input)?;
    Ok(Expr::Literal(Value::Int(i64::MIN)))
}

fn unary_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    if eat(input, "-") {
        ws(input)?;
        if let Some(min) = opt(min_int).parse_next(input)? {
            return Ok(min);
        }
        return Ok(negate(operand(input, nl, unary_expr)?));
    }
    if eat(input, "+") {
        ws(input)?;
        return operand(input, nl, unary_expr);
    }
    pow_expr(input, nl)
}

/// `^` is right-associative and binds tighter than unary minus on its left,
/// looser on its right: `-2^2` is `-(2^2)` and `2^-1` is `2^(-1)`.
fn pow_expr(input: &mut &str, nl: bool) -> ModalResult<Expr> {
    let base = primary(input)?;
    if operator(input, nl, &[("^", Some(())), ("**", Some(()))])?.is_some() {
        let exponent = operand(input, nl, unary_expr)?;
        return Ok(base.arith(ArithOp::Pow, exponent));
    }
    Ok(base)
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    alt((
        parenthesized,
        number,
        string.map(|s| Expr::Literal(Value::String(s))),
        quoted_name.map(Expr::Column),
        word,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn parenthesized(input: &mut &str) -> ModalResult<Expr> {
    '('.parse_next(input)?;
    ws(input)?;
    let inner = operand(input, true, expr)?;
    ws(input)?;
    expect_char(input, ')')?;
    Ok(inner)
}

/// Constants, column references and function calls.
fn word(input: &mut &str) -> ModalResult<Expr> {
    let checkpoint = input.checkpoint();
    let name = identifier(input)?;
    match name {
        "TRUE" => return Ok(Expr::Literal(Value::Bool(true))),
        "FALSE" => return Ok(Expr::Literal(Value::Bool(false))),
        "NA" | "NA_integer_" | "NA_real_" | "NA_character_" => return Ok(Expr::Na),
        "Inf" => return Ok(Expr::Literal(Value::Float(f64::INFINITY))),
        "NaN" => return Ok(Expr::Literal(Value::Float(f64::NAN))),
        _ if is_reserved(name) => {
            input.reset(&checkpoint);
            return fail.parse_next(input);
        }
        _ => {}
    }

    let before_args = input.checkpoint();
    hs(input)?;
    if eat(input, "(") {
        let args = arguments(input)?;
        return Ok(Expr::Call {
            function: name.to_owned(),
            args,
        });
    }
    input.reset(&before_args);
    Ok(Expr::Column(name.to_owned()))
}

/// Call arguments after the opening parenthesis, through the closing one.
fn arguments(input: &mut &str) -> ModalResult<Vec<Expr>> {
    let mut args = Vec::new();
    ws(input)?;
    if eat(input, ")") {
        return Ok(args);
    }
    loop {
        args.push(operand(input, true, expr)?);
        ws(input)?;
        if eat(input, ",") {
            ws(input)?;
            continue;
        }
        expect_char(input, ')')?;
        return Ok(args);
    }
}

pub(super) fn standalone_expr(input: &mut &str) -> ModalResult<Expr> {
    ws(input)?;
    let e = operand(input, true, expr)?;
    ws(input)?;
    Ok(e)
}

// -- Statements -------------------------------------------------------------

fn statement(input: &mut &str) -> ModalResult<RawStatement> {
    alt((if_statement, block, definition))
        .context(StrContext::Expected(StrContextValue::Description(
            "statement",
        )))
        .parse_next(input)
}

fn if_statement(input: &mut &str) -> ModalResult<RawStatement> {
    keyword(input, "if")?;
    ws(input)?;
    expect_char(input, '(')?;
    ws(input)?;
    let condition = operand(input, true, expr)?;
    ws(input)?;
    expect_char(input, ')')?;
    ws(input)?;
    let then = cut_err(statement).parse_next(input)?;

    let checkpoint = input.checkpoint();
    ws(input)?;
    let has_else = opt(|i: &mut &str| keyword(i, "else"))
        .parse_next(input)?
        .is_some();
    if has_else {
        ws(input)?;
        let _ = cut_err(statement).parse_next(input)?;
    } else {
        input.reset(&checkpoint);
    }

    Ok(RawStatement::If {
        condition,
        then: Box::new(then),
        has_else,
    })
}

fn block(input: &mut &str) -> ModalResult<RawStatement> {
    '{'.parse_next(input)?;
    let mut items = Vec::new();
    loop {
        separators(input)?;
        if eat(input, "}") {
            return Ok(RawStatement::Block(items));
        }
        items.push(cut_err(statement).parse_next(input)?);
        hs(input)?;
        if !input.starts_with(['\n', ';', '}']) {
            return expected("newline, ';' or '}'", input);
        }
    }
}

/// `target <- value`, `target = value` or `name := definition`.
fn definition(input: &mut &str) -> ModalResult<RawStatement> {
    let target = name(input)?;
    hs(input)?;
    let is_macro = if eat(input, ":=") {
        true
    } else if eat(input, "<-") || (!input.starts_with("==") && eat(input, "=")) {
        false
    } else {
        return expected("'<-', '=' or ':='", input);
    };
    ws(input)?;
    let value = operand(input, false, expr)?;

    Ok(if is_macro {
        RawStatement::Macro {
            name: target,
            definition: value,
        }
    } else {
        RawStatement::Assign { target, value }
    })
}

/// Statements with the source text each was parsed from.
pub(super) fn program<'i>(input: &mut &'i str) -> ModalResult<Vec<(RawStatement, &'i str)>> {
    let mut statements = Vec::new();
    loop {
        separators(input)?;
        if input.is_empty() {
            return Ok(statements);
        }
        let (raw, source) = cut_err(statement.with_taken()).parse_next(input)?;
        statements.push((raw, source.trim_end()));
        hs(input)?;
        if !(input.is_empty() || input.starts_with(['\n', ';'])) {
            return expected("newline or ';' after statement", input);
        }
    }
}
