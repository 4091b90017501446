mod error;
mod grammar;
mod parser;

use winnow::error::ContextError;
use winnow::Parser;

use crate::types::Expr;

pub use error::ParseError;
pub use parser::{ParsedModifier, ParsedStatement, Statement};

/// Parse rule text into its statements.
///
/// Statements are separated by newlines or `;`. A statement that is
/// well-formed but cannot become a rule (an `else` branch, a nested `if`,
/// an empty body) comes back as [`Statement::Rejected`] rather than failing
/// the whole parse.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not valid syntax.
pub fn parse(input: &str) -> Result<ParsedModifier, ParseError> {
    let raw = grammar::program
        .parse(input)
        .map_err(|e| convert(input, &e))?;
    let statements = raw
        .into_iter()
        .map(|(raw, source)| ParsedStatement {
            statement: parser::classify(raw),
            source: source.to_owned(),
        })
        .collect();
    Ok(ParsedModifier { statements })
}

/// Parse text holding exactly one statement.
///
/// # Errors
///
/// Returns [`ParseError`] on invalid syntax or when the text holds zero or
/// several statements.
pub fn parse_statement(input: &str) -> Result<Statement, ParseError> {
    let mut parsed = parse(input)?;
    match parsed.statements.len() {
        1 => Ok(parsed.statements.remove(0).statement),
        0 => Err(ParseError::new("expected a statement")),
        n => Err(ParseError::new(format!(
            "expected a single statement, found {n}"
        ))),
    }
}

/// Parse a single expression.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not exactly one valid expression.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    grammar::standalone_expr
        .parse(input)
        .map_err(|e| convert(input, &e))
}

fn convert(input: &str, error: &winnow::error::ParseError<&str, ContextError>) -> ParseError {
    let offset = error.offset();
    let line = input
        .get(..offset)
        .map_or(1, |before| before.matches('\n').count() + 1);
    let detail = error.inner().to_string();
    if detail.is_empty() {
        ParseError::at(format!("line {line}: invalid syntax"), offset)
    } else {
        ParseError::at(format!("line {line}: {detail}"), offset)
    }
}
