use crate::types::{Assignment, Expr, SyntaxError};

/// One statement of rule text.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `if (condition) target <- value`, a braced block of assignments, or a
    /// bare assignment (`condition` is `None`).
    Rule {
        condition: Option<Expr>,
        assignments: Vec<Assignment>,
    },
    /// `name := definition`
    Macro { name: String, definition: Expr },
    /// Well-formed text that cannot become a rule.
    Rejected(SyntaxError),
}

/// A statement together with the text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub source: String,
}

/// The result of parsing a whole rule text, statements in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedModifier {
    pub statements: Vec<ParsedStatement>,
}

impl ParsedModifier {
    /// Statements that were rejected, with their 1-based positions.
    pub fn rejected(&self) -> impl Iterator<Item = (usize, &SyntaxError)> {
        self.statements
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match &s.statement {
                Statement::Rejected(reason) => Some((i + 1, reason)),
                _ => None,
            })
    }
}

/// Statement shape as written, before it is checked against what a rule
/// may contain.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum RawStatement {
    If {
        condition: Expr,
        then: Box<RawStatement>,
        has_else: bool,
    },
    Block(Vec<RawStatement>),
    Assign {
        target: String,
        value: Expr,
    },
    Macro {
        name: String,
        definition: Expr,
    },
}

/// Check a statement's shape against what a rule may contain.
pub(super) fn classify(raw: RawStatement) -> Statement {
    match raw {
        RawStatement::Assign { target, value } => Statement::Rule {
            condition: None,
            assignments: vec![Assignment::new(&target, value)],
        },
        RawStatement::Macro { name, definition } => Statement::Macro { name, definition },
        RawStatement::Block(items) => rule_body(None, items),
        RawStatement::If { has_else: true, .. } => Statement::Rejected(SyntaxError::ElseBranch),
        RawStatement::If {
            condition, then, ..
        } => match *then {
            RawStatement::Assign { target, value } => Statement::Rule {
                condition: Some(condition),
                assignments: vec![Assignment::new(&target, value)],
            },
            RawStatement::Block(items) => rule_body(Some(condition), items),
            RawStatement::If { .. } => Statement::Rejected(SyntaxError::NestedCondition),
            RawStatement::Macro { .. } => Statement::Rejected(misplaced_macro()),
        },
    }
}

fn rule_body(condition: Option<Expr>, items: Vec<RawStatement>) -> Statement {
    let mut assignments = Vec::new();
    if let Err(reason) = collect_assignments(items, &mut assignments) {
        return Statement::Rejected(reason);
    }
    if assignments.is_empty() {
        return Statement::Rejected(SyntaxError::EmptyBody);
    }
    Statement::Rule {
        condition,
        assignments,
    }
}

fn collect_assignments(
    items: Vec<RawStatement>,
    out: &mut Vec<Assignment>,
) -> Result<(), SyntaxError> {
    for item in items {
        match item {
            RawStatement::Assign { target, value } => out.push(Assignment::new(&target, value)),
            RawStatement::Block(inner) => collect_assignments(inner, out)?,
            RawStatement::If { .. } => return Err(SyntaxError::NestedCondition),
            RawStatement::Macro { .. } => return Err(misplaced_macro()),
        }
    }
    Ok(())
}

fn misplaced_macro() -> SyntaxError {
    SyntaxError::Invalid("macro definitions are only allowed at top level".to_owned())
}
