use remodel::{Column, Modifier, ModifyOptions, NaPolicy, Table};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remodel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let modifier = Modifier::from_dsl(
        "
        if (a == 1 & b == 3) a <- 10L
        if (a == 10) b <- 0L
        ",
    )
    .expect("failed to build modifier");

    let plan = modifier.compile().expect("failed to compile");
    println!("{plan}");

    let table = Table::new()
        .with_column("a", Column::int([Some(1_i64), None, Some(2)]))
        .expect("a column")
        .with_column("b", Column::int([3_i64, 3, 3]))
        .expect("b column");

    let options = [
        ("sequential", ModifyOptions::default()),
        ("independent", ModifyOptions::independent()),
        (
            "sequential, NA condition applies",
            ModifyOptions::default().with_na_condition(NaPolicy::True),
        ),
        (
            "independent, NA condition blanks",
            ModifyOptions::independent().with_na_condition(NaPolicy::Na),
        ),
    ];

    for (title, options) in options {
        let report = plan.execute(&table, &options).expect("modify failed");
        println!("== {title}: {report}");
        print!("{}", report.table());
    }
}
