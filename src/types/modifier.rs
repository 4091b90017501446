use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use tracing::warn;

use super::error::{BuildError, CompileError, RuleWarning, SyntaxError};
use super::expr::Expr;
use super::options::ModifyOptions;
use super::plan::ExecutionPlan;
use super::report::{ModifyReport, RuleApplication};
use super::rule::{Rule, RuleBuilder};
use super::table::Table;
use crate::entry::RuleEntry;
use crate::macros::MacroSet;
use crate::parse::{self, Statement};
use crate::RemodelError;

/// An ordered set of rules and macros, applied to a table in one call.
///
/// Immutable once built and thread-safe: share it behind `Arc` to apply it
/// to different tables on different threads.
///
/// # Example
///
/// ```
/// use remodel::{Column, Modifier, ModifyOptions, Table};
///
/// let modifier = Modifier::from_dsl(
///     "if (age < 0) age <- NA\nif (income > 1e6) income <- 1e6",
/// )
/// .unwrap();
///
/// let table = Table::new()
///     .with_column("age", Column::int([34_i64, -1]))
///     .unwrap()
///     .with_column("income", Column::float([2e6, 5e4]))
///     .unwrap();
///
/// let report = modifier.modify(&table, &ModifyOptions::default()).unwrap();
/// assert_eq!(report.table().get(1, "age"), None);
/// assert_eq!(report.rows_affected("M2"), Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Modifier {
    rules: Vec<Rule>,
    macros: MacroSet,
    warnings: Vec<RuleWarning>,
}

impl PartialEq for Modifier {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules && self.macros == other.macros
    }
}

impl Modifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules (macros not included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.name() == name)
    }

    /// Append a rule after the existing ones.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DuplicateRule`] if the name is already taken.
    pub fn push(&mut self, rule: Rule) -> Result<(), BuildError> {
        if self.get(rule.name()).is_some() {
            return Err(BuildError::DuplicateRule {
                name: rule.name().to_owned(),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    #[must_use]
    pub fn macros(&self) -> &MacroSet {
        &self.macros
    }

    /// Rules dropped while this modifier was built.
    #[must_use]
    pub fn warnings(&self) -> &[RuleWarning] {
        &self.warnings
    }

    /// Expand macros, resolve functions and analyze dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] for unknown functions, bad arity, invalid
    /// targets or failed macro expansion.
    pub fn compile(&self) -> Result<ExecutionPlan, CompileError> {
        crate::compile::compile(self)
    }

    /// Compile and apply every rule to `table`. The input is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RemodelError::Compile`] or [`RemodelError::Modify`]; no
    /// partial result is produced.
    pub fn modify(
        &self,
        table: &Table,
        options: &ModifyOptions,
    ) -> Result<ModifyReport, RemodelError> {
        let plan = self.compile()?;
        Ok(plan.execute(table, options)?)
    }

    /// Like [`modify`](Self::modify), but replaces `table` on success. On
    /// error the table is unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`modify`](Self::modify).
    pub fn modify_in_place(
        &self,
        table: &mut Table,
        options: &ModifyOptions,
    ) -> Result<Vec<RuleApplication>, RemodelError> {
        let (modified, applied) = self.modify(table, options)?.into_parts();
        *table = modified;
        Ok(applied)
    }

    /// Parse rule text into a modifier. Unnamed rules are named `M<k>` by
    /// statement position.
    ///
    /// # Errors
    ///
    /// Returns [`RemodelError::Parse`] on invalid syntax and
    /// [`RemodelError::Build`] on duplicate names or cyclic macros.
    pub fn from_dsl(input: &str) -> Result<Self, RemodelError> {
        let parsed = parse::parse(input)?;
        let mut builder = ModifierBuilder::new();
        for statement in parsed.statements {
            builder = builder.push(statement.statement, RuleBuilder::new(""));
        }
        Ok(builder.build()?)
    }

    /// Read rule text from a file. Each rule's origin is set to the path.
    ///
    /// # Errors
    ///
    /// Returns [`RemodelError::Io`] if the file cannot be read, otherwise as
    /// [`from_dsl`](Self::from_dsl).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RemodelError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        let mut modifier = Self::from_dsl(&input)?;
        modifier.set_origin(&path.display().to_string());
        Ok(modifier)
    }

    /// Build a modifier from interchange records. An entry whose text does
    /// not parse is dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] on duplicate names or cyclic macros.
    pub fn from_entries(entries: impl IntoIterator<Item = RuleEntry>) -> Result<Self, BuildError> {
        entries
            .into_iter()
            .fold(ModifierBuilder::new(), ModifierBuilder::entry)
            .build()
    }

    /// Export as interchange records: macros first, as `name := expr`, then
    /// rules in order. [`from_entries`](Self::from_entries) restores an equal
    /// modifier.
    #[must_use]
    pub fn to_entries(&self) -> Vec<RuleEntry> {
        self.macros
            .iter()
            .map(|(name, definition)| {
                RuleEntry::new(&format!("{} := {definition}", Expr::Column(name.to_owned())))
            })
            .chain(self.rules.iter().map(RuleEntry::from))
            .collect()
    }

    fn set_origin(&mut self, origin: &str) {
        for rule in &mut self.rules {
            rule.set_origin_if_empty(origin);
        }
    }
}

#[cfg(feature = "serde")]
impl Modifier {
    /// Serialize as a pretty-printed JSON rule document.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let document = crate::entry::RuleDocument {
            rules: self.to_entries(),
        };
        serde_json::to_string_pretty(&document)
    }

    /// Build a modifier from a JSON rule document.
    ///
    /// # Errors
    ///
    /// Returns [`RemodelError::Json`] on malformed JSON, otherwise as
    /// [`from_entries`](Self::from_entries).
    pub fn from_json(input: &str) -> Result<Self, RemodelError> {
        let document: crate::entry::RuleDocument = serde_json::from_str(input)?;
        Ok(Self::from_entries(document.rules)?)
    }

    /// Read a JSON rule document from a file. Rules without an origin get the
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`RemodelError::Io`] if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RemodelError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        let mut modifier = Self::from_json(&input)?;
        modifier.set_origin(&path.display().to_string());
        Ok(modifier)
    }
}

#[cfg(feature = "binary-cache")]
impl Modifier {
    /// Serialize this modifier to a byte vector.
    ///
    /// The optional `source_text` is hashed (BLAKE3) and embedded in the
    /// payload so callers can tell when the cache is stale.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) if encoding fails.
    pub fn to_bytes(
        &self,
        source_text: Option<&str>,
    ) -> Result<Vec<u8>, crate::serial::SerializeError> {
        crate::serial::encode(self, source_text)
    }

    /// Deserialize a modifier previously produced by
    /// [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// format, integrity, or validation failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// Whether a cache produced by [`to_bytes`](Self::to_bytes) was written
    /// from exactly `source_text`. Use it to decide when to rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) if the
    /// bytes are not a valid cache.
    pub fn cache_matches_source(
        bytes: &[u8],
        source_text: &str,
    ) -> Result<bool, crate::serial::DeserializeError> {
        crate::serial::matches_source(bytes, source_text)
    }

    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) on
    /// encoding or I/O failure.
    pub fn to_binary_file(
        &self,
        path: impl AsRef<Path>,
        source_text: Option<&str>,
    ) -> Result<(), crate::serial::SerializeError> {
        let bytes = self.to_bytes(source_text)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// I/O, format, integrity, or validation failure.
    pub fn from_binary_file(path: impl AsRef<Path>) -> Result<Self, crate::serial::DeserializeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Modifier({} rules, {} macros)",
            self.rules.len(),
            self.macros.len()
        )
    }
}

/// One statement waiting to be built, in source order.
#[derive(Debug, Clone)]
enum Pending {
    Rule(RuleBuilder),
    Macro { name: String, definition: Expr },
    Rejected { name: String, reason: SyntaxError },
}

/// Builder for a [`Modifier`].
///
/// Rules, statements and macro definitions are kept in the order they are
/// added. Rules added without a name are named `M<k>`, `k` being their
/// 1-based position among everything added.
///
/// # Example
///
/// ```
/// use remodel::{col, ModifierBuilder};
///
/// let modifier = ModifierBuilder::new()
///     .define("negative", col("turnover").lt(0_i64))
///     .rule("flip", |r| r.when(col("negative")).set("turnover", -col("turnover")))
///     .statement("if (staff == 0) staff <- NA")
///     .build()
///     .unwrap();
///
/// assert_eq!(modifier.len(), 2);
/// assert!(modifier.get("M3").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModifierBuilder {
    pending: Vec<Pending>,
}

impl ModifierBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a rule with a closure over a [`RuleBuilder`]. An empty name
    /// asks for a generated one.
    #[must_use]
    pub fn rule(mut self, name: &str, f: impl FnOnce(RuleBuilder) -> RuleBuilder) -> Self {
        self.pending.push(Pending::Rule(f(RuleBuilder::new(name))));
        self
    }

    /// Add one statement of rule text: a rule or a macro definition. Text
    /// that does not parse is dropped with a warning at build time.
    #[must_use]
    pub fn statement(self, source: &str) -> Self {
        self.parsed(source, RuleBuilder::new(""))
    }

    /// Add an interchange record, keeping its metadata.
    #[must_use]
    pub fn entry(self, entry: RuleEntry) -> Self {
        let mut base = RuleBuilder::new(entry.name.as_deref().unwrap_or_default())
            .label(entry.label.as_deref().unwrap_or_default())
            .description(entry.description.as_deref().unwrap_or_default())
            .origin(entry.origin.as_deref().unwrap_or_default());
        if let Some(created) = entry.created {
            base = base.created(created);
        }
        for (key, value) in entry.meta {
            base = base.meta(&key, value);
        }
        self.parsed(&entry.expr, base)
    }

    /// Define a macro, `name := definition`.
    #[must_use]
    pub fn define(mut self, name: &str, definition: Expr) -> Self {
        self.pending.push(Pending::Macro {
            name: name.to_owned(),
            definition,
        });
        self
    }

    fn parsed(self, source: &str, base: RuleBuilder) -> Self {
        match parse::parse_statement(source) {
            Ok(statement) => self.push(statement, base),
            Err(e) => {
                let name = base.name().to_owned();
                self.push(
                    Statement::Rejected(SyntaxError::Invalid(e.to_string())),
                    RuleBuilder::new(&name),
                )
            }
        }
    }

    fn push(mut self, statement: Statement, base: RuleBuilder) -> Self {
        let pending = match statement {
            Statement::Rule {
                condition,
                assignments,
            } => {
                let mut builder = base;
                if let Some(condition) = condition {
                    builder = builder.when(condition);
                }
                Pending::Rule(assignments.into_iter().fold(builder, RuleBuilder::assignment))
            }
            Statement::Macro { name, definition } => Pending::Macro { name, definition },
            Statement::Rejected(reason) => Pending::Rejected {
                name: base.name().to_owned(),
                reason,
            },
        };
        self.pending.push(pending);
        self
    }

    /// Assemble the modifier.
    ///
    /// Rules that cannot be built (no assignments, unsupported syntax) are
    /// dropped and recorded in [`Modifier::warnings()`].
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DuplicateRule`] if two rules share an explicit
    /// name, and [`BuildError::Macro`] for duplicate or cyclic macros.
    pub fn build(self) -> Result<Modifier, BuildError> {
        let mut taken = HashSet::new();
        for pending in &self.pending {
            if let Pending::Rule(builder) = pending {
                let name = builder.name();
                if !name.is_empty() && !taken.insert(name.to_owned()) {
                    return Err(BuildError::DuplicateRule {
                        name: name.to_owned(),
                    });
                }
            }
        }

        let mut modifier = Modifier::new();
        for (i, pending) in self.pending.into_iter().enumerate() {
            let position = i + 1;
            match pending {
                Pending::Rule(builder) => {
                    let explicit = !builder.name().is_empty();
                    let name = if explicit {
                        builder.name().to_owned()
                    } else {
                        generated_name(position, &taken)
                    };
                    match builder.rename(name.clone()).build() {
                        Ok(rule) => {
                            taken.insert(name);
                            modifier.rules.push(rule);
                        }
                        Err(reason) => modifier.drop_rule(name, reason),
                    }
                }
                Pending::Macro { name, definition } => {
                    modifier.macros.define(&name, definition)?;
                }
                Pending::Rejected { name, reason } => {
                    let name = if name.is_empty() {
                        format!("M{position}")
                    } else {
                        name
                    };
                    modifier.drop_rule(name, reason);
                }
            }
        }

        modifier.macros.validate()?;
        Ok(modifier)
    }
}

impl Modifier {
    fn drop_rule(&mut self, rule: String, reason: SyntaxError) {
        warn!(rule = %rule, reason = %reason, "rule dropped");
        self.warnings.push(RuleWarning { rule, reason });
    }
}

/// `M<k>`, or the next free `M<j>` above it.
fn generated_name(position: usize, taken: &HashSet<String>) -> String {
    (position..)
        .map(|j| format!("M{j}"))
        .find(|name| !taken.contains(name))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MacroError, Value};
    use crate::{col, lit, Column, NaPolicy};

    fn table() -> Table {
        Table::new()
            .with_column("x", Column::int([1_i64, -2, 3]))
            .unwrap()
    }

    #[test]
    fn unnamed_rules_get_positional_names() {
        let modifier = Modifier::from_dsl("a <- 1\nadult := x > 0\nif (x < 0) b <- 2").unwrap();
        let names: Vec<_> = modifier.iter().map(Rule::name).collect();
        assert_eq!(names, ["M1", "M3"]);
    }

    #[test]
    fn generated_name_skips_explicit_names() {
        let modifier = ModifierBuilder::new()
            .rule("M2", |r| r.set("a", 1_i64))
            .rule("", |r| r.set("b", 1_i64))
            .rule("", |r| r.set("c", 1_i64))
            .build()
            .unwrap();
        let names: Vec<_> = modifier.iter().map(Rule::name).collect();
        assert_eq!(names, ["M2", "M3", "M4"]);
    }

    #[test]
    fn duplicate_rule_names_fail() {
        let result = ModifierBuilder::new()
            .rule("r", |r| r.set("a", 1_i64))
            .rule("r", |r| r.set("b", 1_i64))
            .build();
        assert!(matches!(result, Err(BuildError::DuplicateRule { name }) if name == "r"));
    }

    #[test]
    fn rejected_statements_become_warnings() {
        let modifier =
            Modifier::from_dsl("a <- 1\nif (x > 0) b <- 1 else b <- 2\nif (x > 1) {}").unwrap();
        assert_eq!(modifier.len(), 1);
        assert_eq!(
            modifier.warnings(),
            [
                RuleWarning {
                    rule: "M2".into(),
                    reason: SyntaxError::ElseBranch
                },
                RuleWarning {
                    rule: "M3".into(),
                    reason: SyntaxError::EmptyBody
                },
            ]
        );
    }

    #[test]
    fn invalid_statement_text_is_recoverable() {
        let modifier = ModifierBuilder::new()
            .statement("x <- (1 +")
            .statement("y <- 1")
            .build()
            .unwrap();
        assert_eq!(modifier.len(), 1);
        assert_eq!(modifier.rules()[0].name(), "M2");
        assert!(matches!(modifier.warnings()[0].reason, SyntaxError::Invalid(_)));
    }

    #[test]
    fn cyclic_macros_fail() {
        let result = Modifier::from_dsl("a := b + 1\nb := a\nx <- a");
        assert!(matches!(
            result,
            Err(RemodelError::Build(BuildError::Macro(MacroError::Cycle { .. })))
        ));
    }

    #[test]
    fn duplicate_macros_fail() {
        let result = ModifierBuilder::new()
            .define("m", lit(1_i64))
            .define("m", lit(2_i64))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::Macro(MacroError::Duplicate { .. }))
        ));
    }

    #[test]
    fn push_rejects_duplicates() {
        let mut modifier = Modifier::new();
        let rule = RuleBuilder::new("r").set("x", 0_i64).build().unwrap();
        modifier.push(rule.clone()).unwrap();
        assert!(modifier.push(rule).is_err());
        assert_eq!(modifier.position("r"), Some(0));
    }

    #[test]
    fn entries_round_trip() {
        let modifier = ModifierBuilder::new()
            .define("neg", col("x").lt(0_i64))
            .rule("flip", |r| {
                r.when(col("neg"))
                    .set("x", -col("x"))
                    .label("flip sign")
                    .meta("owner", "ops")
            })
            .statement("y <- x %in% c(1, 2)")
            .build()
            .unwrap();

        let entries = modifier.to_entries();
        assert_eq!(entries[0].expr, "neg := x < 0");
        assert_eq!(entries.len(), 3);

        let restored = Modifier::from_entries(entries).unwrap();
        assert_eq!(restored, modifier);
        assert_eq!(
            restored.get("flip").unwrap().meta().get("owner"),
            Some(&Value::String("ops".into()))
        );
    }

    #[test]
    fn entry_keeps_metadata() {
        let mut entry = RuleEntry::named("r", "if (x > 0) x <- 0");
        entry.description = Some("zero positives".into());
        let modifier = Modifier::from_entries([entry]).unwrap();
        let rule = modifier.get("r").unwrap();
        assert_eq!(rule.description(), "zero positives");
        assert_eq!(rule.source(), "if (x > 0) x <- 0");
    }

    #[test]
    fn modify_in_place_replaces_table_on_success() {
        let modifier = Modifier::from_dsl("if (x < 0) x <- 0").unwrap();
        let mut t = table();
        let applied = modifier
            .modify_in_place(&mut t, &ModifyOptions::default())
            .unwrap();
        assert_eq!(applied[0].rows_affected(), 1);
        assert_eq!(t.get(1, "x"), Some(&Value::Int(0)));
    }

    #[test]
    fn modify_in_place_keeps_table_on_error() {
        let modifier = Modifier::from_dsl("x <- 0\nmissing <- 1").unwrap();
        let mut t = table();
        let result = modifier.modify_in_place(&mut t, &ModifyOptions::default());
        assert!(matches!(result, Err(RemodelError::Modify(_))));
        assert_eq!(t, table());
    }

    #[test]
    fn modify_reports_compile_errors() {
        let modifier = Modifier::from_dsl("x <- nosuch(x)").unwrap();
        let result = modifier.modify(&table(), &ModifyOptions::default());
        assert!(matches!(result, Err(RemodelError::Compile(_))));
    }

    #[test]
    fn na_policy_threads_through() {
        let modifier = Modifier::from_dsl("if (x > NA) x <- 9").unwrap();
        let options = ModifyOptions::default().with_na_condition(NaPolicy::Na);
        let report = modifier.modify(&table(), &options).unwrap();
        assert_eq!(report.table().column("x").unwrap().na_count(), 3);
    }

    #[test]
    fn display_counts() {
        let modifier = Modifier::from_dsl("m := 1\nx <- m").unwrap();
        assert_eq!(modifier.to_string(), "Modifier(1 rules, 1 macros)");
    }

    #[test]
    fn from_file_sets_origin() {
        let path = std::env::temp_dir().join(format!("remodel-origin-{}.txt", std::process::id()));
        std::fs::write(&path, "x <- 1\n").unwrap();
        let modifier = Modifier::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(modifier.rules()[0].origin(), path.display().to_string());
    }
}
