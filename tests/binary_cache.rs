#![cfg(feature = "binary-cache")]

use remodel::{col, Column, DeserializeError, Modifier, ModifierBuilder, ModifyOptions, Table};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SOURCE: &str = "
negative := turnover < 0
if (negative) turnover <- -turnover
if (is.na(staff) | staff < 0) staff <- 0L
if (region %in% c('N', 'north')) region <- 'North'
";

fn simple_modifier() -> Modifier {
    Modifier::from_dsl(SOURCE).unwrap()
}

fn annotated_modifier() -> Modifier {
    ModifierBuilder::new()
        .rule("cap", |r| {
            r.when(col("turnover").gt(1e6))
                .set("turnover", 1e6)
                .label("Cap outliers")
                .description("Turnover above one million is a unit error")
                .origin("audit-2024.R")
                .meta("severity", 2_i64)
                .meta("reviewed", true)
        })
        .rule("", |r| r.set("staff", col("staff") * 1_i64))
        .build()
        .unwrap()
}

fn table() -> Table {
    Table::new()
        .with_column("turnover", Column::float([Some(-10.0), Some(2e6), None]))
        .unwrap()
        .with_column("staff", Column::int([Some(3_i64), None, Some(-1)]))
        .unwrap()
        .with_column("region", Column::string(["N", "south", "north"]))
        .unwrap()
}

fn same_output(a: &Modifier, b: &Modifier) {
    for options in [ModifyOptions::default(), ModifyOptions::independent()] {
        let left = a.modify(&table(), &options).unwrap();
        let right = b.modify(&table(), &options).unwrap();
        assert_eq!(left.table(), right.table());
        assert_eq!(left.applied(), right.applied());
    }
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn round_trip_simple() {
    let original = simple_modifier();
    let bytes = original.to_bytes(None).unwrap();
    let restored = Modifier::from_bytes(&bytes).unwrap();

    assert_eq!(restored, original);
    assert_eq!(restored.macros().len(), 1);
    same_output(&original, &restored);
}

#[test]
fn round_trip_keeps_metadata() {
    let original = annotated_modifier();
    let restored = Modifier::from_bytes(&original.to_bytes(None).unwrap()).unwrap();

    let rule = restored.get("cap").unwrap();
    assert_eq!(rule.label(), "Cap outliers");
    assert_eq!(rule.origin(), "audit-2024.R");
    assert_eq!(rule.created(), original.get("cap").unwrap().created());
    assert_eq!(rule.meta().len(), 2);
    assert_eq!(restored, original);
    same_output(&original, &restored);
}

#[test]
fn round_trip_with_source_digest() {
    let original = simple_modifier();
    let bytes = original.to_bytes(Some(SOURCE)).unwrap();

    assert!(Modifier::cache_matches_source(&bytes, SOURCE).unwrap());
    assert!(!Modifier::cache_matches_source(&bytes, "x <- 1").unwrap());

    let without = original.to_bytes(None).unwrap();
    assert!(!Modifier::cache_matches_source(&without, SOURCE).unwrap());
}

#[test]
fn large_modifier_round_trip() {
    let mut builder = ModifierBuilder::new();
    for i in 0..200 {
        builder = builder.rule(&format!("r{i}"), move |r| {
            r.when(col("staff").eq(i64::from(i)))
                .set("staff", col("staff") + 1_i64)
        });
    }
    let original = builder.build().unwrap();
    let restored = Modifier::from_bytes(&original.to_bytes(None).unwrap()).unwrap();
    assert_eq!(restored.len(), 200);
    assert_eq!(restored, original);
    same_output(&original, &restored);
}

#[test]
fn file_round_trip() {
    let dir = std::env::temp_dir().join(format!("remodel_binary_cache_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("rules.rmod");

    let original = simple_modifier();
    original.to_binary_file(&path, Some(SOURCE)).unwrap();
    let restored = Modifier::from_binary_file(&path).unwrap();
    assert_eq!(restored, original);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_file_is_io_error() {
    let err = Modifier::from_binary_file("/nonexistent/remodel/rules.rmod").unwrap_err();
    assert!(matches!(err, DeserializeError::Io(_)), "got: {err}");
}

// ---------------------------------------------------------------------------
// Corruption
// ---------------------------------------------------------------------------

#[test]
fn corruption_byte_flip() {
    let mut corrupted = simple_modifier().to_bytes(None).unwrap();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;

    let err = Modifier::from_bytes(&corrupted).unwrap_err();
    assert!(
        matches!(err, DeserializeError::ChecksumMismatch),
        "expected ChecksumMismatch, got: {err}"
    );
}

#[test]
fn corruption_truncation() {
    let bytes = simple_modifier().to_bytes(None).unwrap();
    let err = Modifier::from_bytes(&bytes[..33]).unwrap_err();
    assert!(
        matches!(err, DeserializeError::LengthMismatch { .. }),
        "expected LengthMismatch, got: {err}"
    );
}

#[test]
fn trailing_bytes_rejected() {
    let mut bytes = simple_modifier().to_bytes(None).unwrap();
    bytes.push(0);
    let err = Modifier::from_bytes(&bytes).unwrap_err();
    assert!(
        matches!(err, DeserializeError::LengthMismatch { .. }),
        "expected LengthMismatch, got: {err}"
    );
}

#[test]
fn bad_magic() {
    let mut bad = simple_modifier().to_bytes(None).unwrap();
    bad[0..4].copy_from_slice(b"BAAD");

    let err = Modifier::from_bytes(&bad).unwrap_err();
    assert!(
        matches!(err, DeserializeError::BadMagic),
        "expected BadMagic, got: {err}"
    );
}

#[test]
fn version_mismatch() {
    let mut bad = simple_modifier().to_bytes(None).unwrap();
    bad[4] = 99;
    bad[5] = 0;

    let err = Modifier::from_bytes(&bad).unwrap_err();
    assert!(
        matches!(
            err,
            DeserializeError::IncompatibleVersion {
                blob: 99,
                supported: 1
            }
        ),
        "expected IncompatibleVersion, got: {err}"
    );
}
