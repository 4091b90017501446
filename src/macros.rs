use std::collections::HashMap;
use std::fmt;

use crate::types::{flatten_set, Expr, MacroError};

/// Maximum nesting of macro references inside one expansion.
pub const MAX_MACRO_DEPTH: usize = 64;

/// Named expression fragments (`name := expr`) substituted into rules
/// before compilation.
///
/// A macro is referenced like a column: any column reference whose name is
/// a macro name is replaced by the macro's definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroSet {
    entries: Vec<(String, Expr)>,
    index: HashMap<String, usize>,
}

impl MacroSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition.
    ///
    /// # Errors
    ///
    /// Returns [`MacroError::Duplicate`] when `name` is already defined.
    pub fn define(&mut self, name: &str, definition: Expr) -> Result<(), MacroError> {
        if self.index.contains_key(name) {
            return Err(MacroError::Duplicate {
                name: name.to_owned(),
            });
        }
        self.index.insert(name.to_owned(), self.entries.len());
        self.entries.push((name.to_owned(), definition));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.index.get(name).map(|&idx| &self.entries[idx].1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.entries.iter().map(|(name, expr)| (name.as_str(), expr))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that no macro refers back to itself, directly or through others.
    ///
    /// # Errors
    ///
    /// Returns [`MacroError::Cycle`] with the offending path, first node
    /// repeated at the end (`a -> b -> a`).
    pub fn validate(&self) -> Result<(), MacroError> {
        let adj: Vec<Vec<usize>> = self
            .entries
            .iter()
            .map(|(_, definition)| {
                let mut refs = Vec::new();
                self.collect_refs(definition, &mut refs);
                refs
            })
            .collect();

        let mut state = vec![DfsState::Unvisited; self.entries.len()];
        let mut stack = Vec::new();
        for node in 0..self.entries.len() {
            if state[node] == DfsState::Unvisited {
                if let Some(cycle) = self.dfs(node, &adj, &mut state, &mut stack) {
                    return Err(MacroError::Cycle { path: cycle });
                }
            }
        }
        Ok(())
    }

    /// Replace every macro reference in `expr` with its definition,
    /// recursively.
    ///
    /// # Errors
    ///
    /// Returns [`MacroError::DepthExceeded`] when references nest deeper
    /// than [`MAX_MACRO_DEPTH`].
    pub fn expand(&self, expr: &Expr) -> Result<Expr, MacroError> {
        if self.is_empty() {
            return Ok(expr.clone());
        }
        self.expand_at(expr, 0)
    }

    fn expand_at(&self, expr: &Expr, depth: usize) -> Result<Expr, MacroError> {
        let boxed = |e: &Expr| self.expand_at(e, depth).map(Box::new);
        Ok(match expr {
            Expr::Column(name) => match self.get(name) {
                Some(definition) => {
                    if depth >= MAX_MACRO_DEPTH {
                        return Err(MacroError::DepthExceeded {
                            name: name.clone(),
                            limit: MAX_MACRO_DEPTH,
                        });
                    }
                    self.expand_at(definition, depth + 1)?
                }
                None => expr.clone(),
            },
            Expr::Literal(_) | Expr::Na => expr.clone(),
            Expr::Compare { op, lhs, rhs } => Expr::Compare {
                op: *op,
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
            },
            Expr::Arith { op, lhs, rhs } => Expr::Arith {
                op: *op,
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
            },
            Expr::And(a, b) => Expr::And(boxed(a)?, boxed(b)?),
            Expr::Or(a, b) => Expr::Or(boxed(a)?, boxed(b)?),
            Expr::Not(inner) => Expr::Not(boxed(inner)?),
            Expr::Neg(inner) => Expr::Neg(boxed(inner)?),
            Expr::In { needle, set } => {
                // A macro may stand for a whole `c(...)` set.
                let mut expanded = Vec::with_capacity(set.len());
                for item in set {
                    flatten_set(self.expand_at(item, depth)?, &mut expanded);
                }
                Expr::In {
                    needle: boxed(needle)?,
                    set: expanded,
                }
            }
            Expr::Call { function, args } => Expr::Call {
                function: function.clone(),
                args: args
                    .iter()
                    .map(|a| self.expand_at(a, depth))
                    .collect::<Result<_, _>>()?,
            },
        })
    }

    fn collect_refs(&self, expr: &Expr, out: &mut Vec<usize>) {
        match expr {
            Expr::Column(name) => {
                if let Some(&idx) = self.index.get(name) {
                    out.push(idx);
                }
            }
            Expr::Literal(_) | Expr::Na => {}
            Expr::Compare { lhs, rhs, .. } | Expr::Arith { lhs, rhs, .. } => {
                self.collect_refs(lhs, out);
                self.collect_refs(rhs, out);
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                self.collect_refs(a, out);
                self.collect_refs(b, out);
            }
            Expr::Not(inner) | Expr::Neg(inner) => self.collect_refs(inner, out),
            Expr::In { needle, set } => {
                self.collect_refs(needle, out);
                for item in set {
                    self.collect_refs(item, out);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    self.collect_refs(arg, out);
                }
            }
        }
    }

    fn dfs(
        &self,
        node: usize,
        adj: &[Vec<usize>],
        state: &mut [DfsState],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        state[node] = DfsState::InStack;
        stack.push(node);

        for &neighbor in &adj[node] {
            match state[neighbor] {
                DfsState::InStack => {
                    let pos = stack.iter().position(|&n| n == neighbor).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[pos..]
                        .iter()
                        .map(|&n| self.entries[n].0.clone())
                        .collect();
                    cycle.push(self.entries[neighbor].0.clone());
                    return Some(cycle);
                }
                DfsState::Unvisited => {
                    if let Some(cycle) = self.dfs(neighbor, adj, state, stack) {
                        return Some(cycle);
                    }
                }
                DfsState::Done => {}
            }
        }

        stack.pop();
        state[node] = DfsState::Done;
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}

impl fmt::Display for MacroSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, definition) in &self.entries {
            crate::types::write_name(f, name)?;
            writeln!(f, " := {definition}")?;
        }
        Ok(())
    }
}
