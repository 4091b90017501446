use remodel::{col, lit, na, Column, ModifierBuilder, ModifyOptions, Table};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remodel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Define rules
    let modifier = ModifierBuilder::new()
        .rule("impossible_age", |r| {
            r.when(col("age").lt(0_i64).or(col("age").gt(120_i64)))
                .set("age", na())
                .label("Ages outside 0..=120 are recording errors")
        })
        .rule("income_sign", |r| {
            r.when(col("income").lt(0_i64))
                .set("income", -col("income"))
        })
        .rule("unknown_region", |r| {
            r.when(col("region").is_na())
                .set("region", lit("unknown"))
        })
        .build()
        .expect("failed to build modifier");

    println!("{modifier}");

    let table = Table::new()
        .with_column("age", Column::int([Some(34_i64), Some(-1), Some(150), None]))
        .expect("age column")
        .with_column("income", Column::float([2500.0, -300.0, 0.0, 1200.0]))
        .expect("income column")
        .with_column(
            "region",
            Column::string_opt([Some("north"), None, Some("south"), None]),
        )
        .expect("region column");

    let report = modifier
        .modify(&table, &ModifyOptions::default())
        .expect("modify failed");

    println!("{report}");
    print!("{}", report.table());
}
