use remodel::{
    col, lit, BuildError, Column, CompileError, MacroError, Modifier, ModifierBuilder,
    ModifyError, ModifyOptions, NaPolicy, RemodelError, Table, Value, MAX_MACRO_DEPTH,
};

fn one_column(name: &str, column: Column) -> Table {
    Table::new().with_column(name, column).unwrap()
}

fn run(dsl: &str, table: &Table) -> Table {
    Modifier::from_dsl(dsl)
        .unwrap()
        .modify(table, &ModifyOptions::default())
        .unwrap()
        .into_table()
}

// ---------------------------------------------------------------------------
// Degenerate inputs
// ---------------------------------------------------------------------------

#[test]
fn empty_modifier_returns_input() {
    let modifier = Modifier::from_dsl("# nothing here\n\n").unwrap();
    assert!(modifier.is_empty());
    let table = one_column("x", Column::int([1_i64, 2]));
    let report = modifier.modify(&table, &ModifyOptions::default()).unwrap();
    assert_eq!(report.table(), &table);
    assert_eq!(report.total_rows_affected(), 0);
}

#[test]
fn zero_row_table() {
    let table = one_column("x", Column::int(Vec::<i64>::new()));
    let report = Modifier::from_dsl("if (x > 0) x <- 0L")
        .unwrap()
        .modify(&table, &ModifyOptions::default())
        .unwrap();
    assert_eq!(report.table().nrows(), 0);
    assert_eq!(report.rows_affected("M1"), Some(0));
}

#[test]
fn row_count_never_changes() {
    let table = one_column("x", Column::int([Some(1_i64), None, Some(3)]));
    let out = run("x <- NA\nif (is.na(x)) x <- 7L", &table);
    assert_eq!(out.nrows(), 3);
    assert_eq!(out.column("x").unwrap().na_count(), 0);
}

#[test]
fn deep_rule_chain() {
    // Each rule increments x; sequential mode threads the value through.
    let mut builder = ModifierBuilder::new();
    for i in 0..100 {
        builder = builder.rule(&format!("r{i}"), |r| {
            r.when(col("x").gte(0_i64)).set("x", col("x") + 1_i64)
        });
    }
    let modifier = builder.build().unwrap();
    let table = one_column("x", Column::int([0_i64, -1]));

    let sequential = modifier.modify(&table, &ModifyOptions::default()).unwrap();
    assert_eq!(sequential.table().get(0, "x"), Some(&Value::Int(100)));
    assert_eq!(sequential.table().get(1, "x"), Some(&Value::Int(-1)));

    let independent = modifier.modify(&table, &ModifyOptions::independent()).unwrap();
    assert_eq!(independent.table().get(0, "x"), Some(&Value::Int(1)));
}

// ---------------------------------------------------------------------------
// Arithmetic and logic
// ---------------------------------------------------------------------------

#[test]
fn integer_overflow_becomes_na() {
    let table = one_column("x", Column::int([i64::MAX, 1]));
    let out = run("x <- x + 1L", &table);
    assert_eq!(out.get(0, "x"), None);
    assert_eq!(out.get(1, "x"), Some(&Value::Int(2)));
}

#[test]
fn integer_modulo_by_zero_is_na() {
    let table = one_column("x", Column::int([7_i64, 8]));
    let out = run("x <- x %% 0L", &table);
    assert_eq!(out.get(0, "x"), None);
}

#[test]
fn division_always_yields_float() {
    let table = Table::new()
        .with_column("x", Column::int([7_i64]))
        .unwrap()
        .with_column("y", Column::float([0.0]))
        .unwrap();
    let out = run("y <- x / 2L", &table);
    assert_eq!(out.get(0, "y"), Some(&Value::Float(3.5)));

    let err = Modifier::from_dsl("x <- x / 2L")
        .unwrap()
        .modify(&table, &ModifyOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RemodelError::Modify(ModifyError::TypeMismatch { .. })
    ));
}

#[test]
fn int_widens_into_float_column() {
    let table = one_column("y", Column::float([Some(1.5), None]));
    let out = run("y <- 2L", &table);
    assert_eq!(out.get(0, "y"), Some(&Value::Float(2.0)));
    assert_eq!(out.get(1, "y"), Some(&Value::Float(2.0)));
}

#[test]
fn kleene_logic_in_conditions() {
    let table = Table::new()
        .with_column("a", Column::bool([Some(true), None, None, Some(false)]))
        .unwrap()
        .with_column("hit", Column::string(["", "", "", ""]))
        .unwrap();
    // NA | TRUE is TRUE; NA & FALSE is FALSE, so !(...) is TRUE.
    let out = run(
        "if (a | TRUE) hit <- paste0(hit, 'or')\nif (!(a & FALSE)) hit <- paste0(hit, '+and')",
        &table,
    );
    assert_eq!(out.get(1, "hit"), Some(&Value::String("or+and".into())));
    assert_eq!(out.get(3, "hit"), Some(&Value::String("or+and".into())));
}

#[test]
fn na_in_condition_column_never_modified() {
    let table = Table::new()
        .with_column("age", Column::int([Some(10_i64), None]))
        .unwrap()
        .with_column("status", Column::string(["ok", "ok"]))
        .unwrap();
    for options in [ModifyOptions::default(), ModifyOptions::independent()] {
        let report = Modifier::from_dsl("if (age < 18) status <- 'minor'")
            .unwrap()
            .modify(&table, &options)
            .unwrap();
        assert_eq!(
            report.table().get(1, "status"),
            Some(&Value::String("ok".into()))
        );
        assert_eq!(
            report.table().get(0, "status"),
            Some(&Value::String("minor".into()))
        );
    }
}

#[test]
fn in_with_na_member() {
    let table = one_column("s", Column::string_opt([Some("a"), None, Some("z")]));
    let out = run("if (s %in% c('a', NA)) s <- 'member'", &table);
    assert_eq!(out.get(0, "s"), Some(&Value::String("member".into())));
    assert_eq!(out.get(1, "s"), Some(&Value::String("member".into())));
    assert_eq!(out.get(2, "s"), Some(&Value::String("z".into())));
}

#[test]
fn builtin_functions_end_to_end() {
    let table = Table::new()
        .with_column("x", Column::float([Some(-2.456), None]))
        .unwrap()
        .with_column("s", Column::string_opt([Some("  Mixed "), None]))
        .unwrap()
        .with_column("n", Column::int([0_i64, 0]))
        .unwrap()
        .with_column("t", Column::string(["", ""]))
        .unwrap();
    let out = run(
        "
        x <- round(abs(coalesce(x, 9)), 1)
        n <- nchar(trimws(s))
        t <- ifelse(is.na(s), 'missing', tolower(trimws(s)))
        ",
        &table,
    );
    assert_eq!(out.get(0, "x"), Some(&Value::Float(2.5)));
    assert_eq!(out.get(1, "x"), Some(&Value::Float(9.0)));
    assert_eq!(out.get(0, "n"), Some(&Value::Int(5)));
    assert_eq!(out.get(1, "n"), None);
    assert_eq!(out.get(0, "t"), Some(&Value::String("mixed".into())));
    assert_eq!(out.get(1, "t"), Some(&Value::String("missing".into())));
}

// ---------------------------------------------------------------------------
// Execution errors
// ---------------------------------------------------------------------------

#[test]
fn non_logical_condition() {
    let table = one_column("x", Column::int([1_i64]));
    let err = Modifier::from_dsl("if (x + 1) x <- 0L")
        .unwrap()
        .modify(&table, &ModifyOptions::default())
        .unwrap_err();
    let RemodelError::Modify(ModifyError::NonLogicalCondition { rule, column, .. }) = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(rule, "M1");
    assert_eq!(column, "x");
}

#[test]
fn invalid_operands_name_the_rule() {
    let table = one_column("s", Column::string(["a"]));
    let err = Modifier::from_dsl("if (s > 0) s <- 'b'")
        .unwrap()
        .modify(&table, &ModifyOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RemodelError::Modify(ModifyError::InvalidOperands { .. })
    ));
    assert!(err.to_string().contains("rule 'M1'"), "{err}");
    assert!(err.to_string().contains("s > 0"), "{err}");
}

#[test]
fn unselected_rows_never_evaluate_the_value() {
    let table = one_column("a", Column::int([1_i64, 2]));
    let modifier = Modifier::from_dsl("if (a == 1) a <- ifelse(a == 1, 5L, 'x') * 2L").unwrap();
    for options in [ModifyOptions::default(), ModifyOptions::independent()] {
        let report = modifier.modify(&table, &options).unwrap();
        assert_eq!(report.table().get(0, "a"), Some(&Value::Int(10)));
        assert_eq!(report.table().get(1, "a"), Some(&Value::Int(2)));
    }

    // The same value fails once the bad row is selected.
    let err = Modifier::from_dsl("a <- ifelse(a == 1, 5L, 'x') * 2L")
        .unwrap()
        .modify(&table, &ModifyOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RemodelError::Modify(ModifyError::InvalidOperands { .. })
    ));
}

#[test]
fn blanked_rows_never_evaluate_the_value() {
    let table = Table::new()
        .with_column("a", Column::int([Some(1_i64), None]))
        .unwrap()
        .with_column("s", Column::string(["3", "x"]))
        .unwrap();
    let options = ModifyOptions::default().with_na_condition(NaPolicy::Na);
    let report = Modifier::from_dsl("if (a > 0) a <- ifelse(s == '3', 3L, s) + 1L")
        .unwrap()
        .modify(&table, &options)
        .unwrap();
    assert_eq!(report.table().get(0, "a"), Some(&Value::Int(4)));
    assert_eq!(report.table().get(1, "a"), None);
}

// ---------------------------------------------------------------------------
// Construction and compilation errors
// ---------------------------------------------------------------------------

#[test]
fn duplicate_rule_name() {
    let result = ModifierBuilder::new()
        .rule("a", |r| r.set("x", 1_i64))
        .rule("a", |r| r.set("x", 2_i64))
        .build();
    assert!(matches!(result, Err(BuildError::DuplicateRule { name }) if name == "a"));
}

#[test]
fn generated_name_skips_taken_names() {
    let modifier = ModifierBuilder::new()
        .rule("M2", |r| r.set("x", 1_i64))
        .rule("", |r| r.set("x", 2_i64))
        .build()
        .unwrap();
    let names: Vec<&str> = modifier.iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["M2", "M3"]);
}

#[test]
fn macro_cycle_is_fatal() {
    let err = Modifier::from_dsl("a := b + 1\nb := a\nx <- a").unwrap_err();
    match err {
        RemodelError::Build(BuildError::Macro(MacroError::Cycle { path })) => {
            assert_eq!(path, vec!["a", "b", "a"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn macro_depth_limit() {
    let mut builder = ModifierBuilder::new().define("m0", col("x"));
    for i in 1..=MAX_MACRO_DEPTH {
        builder = builder.define(&format!("m{i}"), col(&format!("m{}", i - 1)) + 1_i64);
    }
    let too_deep = builder
        .rule("deep", |r| r.set("x", col(&format!("m{MAX_MACRO_DEPTH}"))))
        .build()
        .unwrap();
    assert!(matches!(
        too_deep.compile(),
        Err(CompileError::Macro {
            source: MacroError::DepthExceeded { .. },
            ..
        })
    ));

    let mut builder = ModifierBuilder::new().define("m0", col("x"));
    for i in 1..MAX_MACRO_DEPTH {
        builder = builder.define(&format!("m{i}"), col(&format!("m{}", i - 1)) + 1_i64);
    }
    let deepest = builder
        .rule("ok", |r| r.set("x", col(&format!("m{}", MAX_MACRO_DEPTH - 1))))
        .build()
        .unwrap();
    let table = one_column("x", Column::int([0_i64]));
    let report = deepest.modify(&table, &ModifyOptions::default()).unwrap();
    assert_eq!(
        report.table().get(0, "x"),
        Some(&Value::Int(i64::try_from(MAX_MACRO_DEPTH).unwrap() - 1))
    );
}

#[test]
fn unknown_function_is_compile_error() {
    let err = Modifier::from_dsl("x <- system('rm')")
        .unwrap()
        .modify(&one_column("x", Column::int([1_i64])), &ModifyOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RemodelError::Compile(CompileError::UnknownFunction { .. })
    ));
}

#[test]
fn macro_target_is_not_substituted() {
    let modifier = ModifierBuilder::new()
        .define("x", lit(5_i64))
        .rule("r", |r| r.set("x", col("x") + 1_i64))
        .build()
        .unwrap();
    let table = one_column("x", Column::int([0_i64]));
    let report = modifier.modify(&table, &ModifyOptions::default()).unwrap();
    // The value expands the macro; the target stays the column.
    assert_eq!(report.table().get(0, "x"), Some(&Value::Int(6)));
}
