use remodel::parse::{parse, parse_statement, Statement};
use remodel::{
    col, Column, Modifier, ModifierBuilder, ModifyOptions, RemodelError, SyntaxError, Table,
    Value,
};

fn survey() -> Table {
    Table::new()
        .with_column("age", Column::int([Some(34_i64), Some(-2), None, Some(140)]))
        .unwrap()
        .with_column("income", Column::float([Some(2500.0), Some(0.0), Some(-10.0), None]))
        .unwrap()
        .with_column("region", Column::string(["north", "south", " east ", "north"]))
        .unwrap()
}

#[test]
fn dsl_parse_and_modify() {
    let dsl = r#"
# Clean up obviously wrong ages
if (age < 0 | age > 120) age <- NA

# Negative income is a sign error
if (income < 0) income <- abs(income)

region <- trimws(region)
"#;

    let modifier = Modifier::from_dsl(dsl).unwrap();
    assert_eq!(modifier.len(), 3);
    assert!(modifier.warnings().is_empty());

    let report = modifier.modify(&survey(), &ModifyOptions::default()).unwrap();
    let table = report.table();

    assert_eq!(table.get(0, "age"), Some(&Value::Int(34)));
    assert_eq!(table.get(1, "age"), None);
    assert_eq!(table.get(2, "age"), None);
    assert_eq!(table.get(3, "age"), None);
    assert_eq!(table.get(2, "income"), Some(&Value::Float(10.0)));
    assert_eq!(table.get(2, "region"), Some(&Value::String("east".into())));

    // Unnamed rules are numbered by their position in the text.
    assert_eq!(report.rows_affected("M1"), Some(2));
    assert_eq!(report.rows_affected("M2"), Some(1));
    assert_eq!(report.rows_affected("M3"), Some(4));
}

#[test]
fn dsl_macros_expand_into_rules() {
    let dsl = r"
adult := age >= 18
high_income := income > 1000
if (adult & high_income) region <- 'prime'
if (!adult) income <- 0
";
    let modifier = Modifier::from_dsl(dsl).unwrap();
    assert_eq!(modifier.macros().len(), 2);
    assert_eq!(modifier.len(), 2);
    // Macro statements take positions too.
    assert!(modifier.get("M3").is_some());
    assert!(modifier.get("M4").is_some());

    let report = modifier.modify(&survey(), &ModifyOptions::default()).unwrap();
    let table = report.table();
    assert_eq!(table.get(0, "region"), Some(&Value::String("prime".into())));
    assert_eq!(table.get(1, "income"), Some(&Value::Float(0.0)));
    // NA age: the macro is NA, the row is left alone.
    assert_eq!(table.get(2, "income"), Some(&Value::Float(-10.0)));
}

#[test]
fn dsl_blocks_and_semicolons() {
    let dsl = "if (age > 120) { age <- 120L; income <- NA }; region <- toupper(region)";
    let modifier = Modifier::from_dsl(dsl).unwrap();
    assert_eq!(modifier.len(), 2);
    assert_eq!(modifier.rules()[0].assignments().len(), 2);

    let report = modifier.modify(&survey(), &ModifyOptions::default()).unwrap();
    assert_eq!(report.table().get(3, "age"), Some(&Value::Int(120)));
    assert_eq!(report.table().get(3, "income"), None);
    assert_eq!(
        report.table().get(0, "region"),
        Some(&Value::String("NORTH".into()))
    );
}

#[test]
fn dsl_else_branch_dropped_with_warning() {
    let dsl = "
if (age < 0) age <- 0L else age <- age
if (income < 0) income <- 0
";
    let modifier = Modifier::from_dsl(dsl).unwrap();
    assert_eq!(modifier.len(), 1);
    assert_eq!(modifier.rules()[0].name(), "M2");

    let warnings = modifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].rule, "M1");
    assert_eq!(warnings[0].reason, SyntaxError::ElseBranch);
}

#[test]
fn dsl_nested_if_and_empty_body_dropped() {
    let dsl = "
if (age > 0) { if (income > 0) income <- 1 }
if (age > 0) {}
age <- 1L
";
    let modifier = Modifier::from_dsl(dsl).unwrap();
    assert_eq!(modifier.len(), 1);
    let reasons: Vec<_> = modifier.warnings().iter().map(|w| w.reason.clone()).collect();
    assert_eq!(
        reasons,
        vec![SyntaxError::NestedCondition, SyntaxError::EmptyBody]
    );
}

#[test]
fn dsl_backticked_names() {
    let table = Table::new()
        .with_column("gross income", Column::float([-1.0, 3.0]))
        .unwrap();
    let modifier = Modifier::from_dsl("if (`gross income` < 0) `gross income` <- 0").unwrap();
    let report = modifier.modify(&table, &ModifyOptions::default()).unwrap();
    assert_eq!(report.table().get(0, "gross income"), Some(&Value::Float(0.0)));
    assert_eq!(
        modifier.rules()[0].source(),
        "if (`gross income` < 0) `gross income` <- 0"
    );
}

#[test]
fn dsl_in_operator() {
    let modifier =
        Modifier::from_dsl(r#"if (region %in% c("north", "south")) income <- income * 2"#).unwrap();
    let report = modifier.modify(&survey(), &ModifyOptions::default()).unwrap();
    assert_eq!(report.table().get(0, "income"), Some(&Value::Float(5000.0)));
    assert_eq!(report.table().get(2, "income"), Some(&Value::Float(-10.0)));
    assert_eq!(report.rows_affected("M1"), Some(3));
}

#[test]
fn dsl_syntax_error_is_fatal() {
    let err = Modifier::from_dsl("if (age < ) age <- 1").unwrap_err();
    assert!(matches!(err, RemodelError::Parse(_)));

    let err = Modifier::from_dsl("if (age < 0) age <- 1\nif age > 3 age <- 2").unwrap_err();
    assert!(err.to_string().contains("line 2"), "{err}");
}

#[test]
fn dsl_equivalent_to_builder() {
    let from_text = Modifier::from_dsl("if (age < 0) age <- NA").unwrap();
    let from_builder = ModifierBuilder::new()
        .rule("", |r| r.when(col("age").lt(0_i64)).set("age", remodel::na()))
        .build()
        .unwrap();
    assert_eq!(
        from_text.rules()[0].source(),
        from_builder.rules()[0].source()
    );
    assert_eq!(from_builder.rules()[0].name(), "M1");
}

#[test]
fn dsl_rule_source_round_trips() {
    let dsl = "if (age >= 18 & !(income > 1e+05 | is.na(income))) { income <- round(income / 12, 2); age <- -age }";
    let modifier = Modifier::from_dsl(dsl).unwrap();
    let rendered = modifier.rules()[0].source();
    let again = Modifier::from_dsl(&rendered).unwrap();
    assert_eq!(again.rules()[0].condition(), modifier.rules()[0].condition());
    assert_eq!(
        again.rules()[0].assignments(),
        modifier.rules()[0].assignments()
    );
}

#[test]
fn extreme_literals_survive_entries() {
    let modifier = ModifierBuilder::new()
        .rule("floor", |r| r.set("n", i64::MIN))
        .rule("ceiling", |r| r.when(col("n").lt(i64::MAX)).set("n", i64::MAX))
        .rule("undefined", |r| r.set("x", f64::NAN))
        .build()
        .unwrap();
    assert_eq!(
        modifier.rules()[0].source(),
        "n <- -9223372036854775808"
    );
    let restored = Modifier::from_entries(modifier.to_entries()).unwrap();
    assert_eq!(restored, modifier);

    let table = Table::new()
        .with_column("n", Column::int([0_i64]))
        .unwrap()
        .with_column("x", Column::float([1.0]))
        .unwrap();
    let report = restored
        .modify(&table, &ModifyOptions::default().with_sequential(false))
        .unwrap();
    assert_eq!(report.table().get(0, "n"), Some(&Value::Int(i64::MAX)));
    assert_eq!(report.table().get(0, "x"), Some(&Value::Float(f64::NAN)));
}

#[test]
fn parse_reports_statement_sources() {
    let parsed = parse("a <- 1\n  if (b) c <- 2  \nd := a + 1").unwrap();
    let sources: Vec<&str> = parsed
        .statements
        .iter()
        .map(|s| s.source.as_str())
        .collect();
    assert_eq!(sources, vec!["a <- 1", "if (b) c <- 2", "d := a + 1"]);
    assert!(matches!(
        parsed.statements[2].statement,
        Statement::Macro { .. }
    ));
}

#[test]
fn parse_statement_rejects_else() {
    let statement = parse_statement("if (x) y <- 1 else y <- 2").unwrap();
    assert!(matches!(
        statement,
        Statement::Rejected(SyntaxError::ElseBranch)
    ));
}

#[test]
fn dsl_from_file_sets_origin() {
    let path = std::env::temp_dir().join(format!("remodel-dsl-{}.R", std::process::id()));
    std::fs::write(&path, "if (age < 0) age <- NA\n").unwrap();

    let modifier = Modifier::from_file(&path).unwrap();
    assert_eq!(modifier.rules()[0].origin(), path.display().to_string());

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn dsl_from_missing_file_is_io_error() {
    let err = Modifier::from_file("/nonexistent/remodel/rules.R").unwrap_err();
    assert!(matches!(err, RemodelError::Io(_)));
}
