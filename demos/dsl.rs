use remodel::{Column, Modifier, ModifyOptions, Table};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remodel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let modifier = Modifier::from_file("demos/rules.R").expect("failed to load rules");

    println!("{modifier}");
    for rule in modifier.iter() {
        println!("  {}: {}", rule.name(), rule.source());
    }
    for warning in modifier.warnings() {
        println!("  skipped {warning}");
    }

    let table = Table::new()
        .with_column("turnover", Column::float([Some(1200.0), Some(-80.0), None, Some(4e7)]))
        .expect("turnover column")
        .with_column("staff", Column::int([Some(12_i64), None, Some(3), Some(0)]))
        .expect("staff column")
        .with_column("sector", Column::string([" retail", "Retail", "manufacturing ", "energy"]))
        .expect("sector column");

    let report = modifier
        .modify(&table, &ModifyOptions::default())
        .expect("modify failed");

    for applied in report.applied() {
        println!("{applied}");
    }
    print!("{}", report.table());
}
