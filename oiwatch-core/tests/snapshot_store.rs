//! Integration tests for the CSV baseline store.

use chrono::NaiveDate;
use oiwatch_core::domain::{OiRecord, OptionType, Snapshot, MAX_OPEN_INTEREST};
use oiwatch_core::store::{CsvSnapshotStore, SnapshotStore};
use proptest::prelude::*;

fn sample() -> Snapshot {
    Snapshot::from_records(vec![
        OiRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 2),
            ticker: "AAPL".into(),
            expiration: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            strike: 150.0,
            option_type: OptionType::Call,
            open_interest: 1000,
        },
        OiRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 2),
            ticker: "AAPL".into(),
            expiration: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            strike: 152.5,
            option_type: OptionType::Put,
            open_interest: 0,
        },
        OiRecord {
            date: None,
            ticker: "SPY".into(),
            expiration: NaiveDate::from_ymd_opt(2025, 3, 21).unwrap(),
            strike: 0.5,
            option_type: OptionType::Put,
            open_interest: 123_456,
        },
    ])
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvSnapshotStore::new(dir.path().join("oi_baseline.csv"));

    let snap = sample();
    store.save(&snap).unwrap();
    assert_eq!(store.load(), snap);
}

#[test]
fn empty_snapshot_round_trips_with_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oi_baseline.csv");
    let store = CsvSnapshotStore::new(&path);

    store.save(&Snapshot::empty()).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.trim_end(), "date,ticker,expiration,strike,type,openInterest");
    assert!(store.load().is_empty());
}

#[test]
fn missing_file_is_empty_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvSnapshotStore::new(dir.path().join("nope.csv"));
    assert!(store.load().is_empty());
}

#[test]
fn save_overwrites_and_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oi_baseline.csv");
    let store = CsvSnapshotStore::new(&path);

    store.save(&sample()).unwrap();
    let smaller = Snapshot::from_records(sample().into_records().into_iter().take(1).collect());
    store.save(&smaller).unwrap();

    assert_eq!(store.load(), smaller);
    assert!(!dir.path().join("oi_baseline.csv.tmp").exists());
}

#[test]
fn save_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvSnapshotStore::new(dir.path().join("state/nested/oi_baseline.csv"));
    store.save(&sample()).unwrap();
    assert_eq!(store.load().len(), 3);
}

#[test]
fn legacy_baseline_without_date_and_lower_case_types_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oi_baseline.csv");
    std::fs::write(
        &path,
        "ticker,expiration,strike,type,openInterest\n\
         AAPL,2025-01-17,150.0,call,1000.0\n\
         AAPL,2025-01-17,150.0,put,\n",
    )
    .unwrap();

    let snap = CsvSnapshotStore::new(&path).load();
    assert_eq!(snap.len(), 2);
    let call = &snap.records()[0];
    assert_eq!(call.date, None);
    assert_eq!(call.option_type, OptionType::Call);
    assert_eq!(call.open_interest, 1000);
    assert_eq!(snap.records()[1].open_interest, 0);
    // joins against a freshly fetched upper-case row
    assert_eq!(call.key(), sample().records()[0].key());
}

#[test]
fn malformed_baseline_is_quarantined_and_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oi_baseline.csv");
    std::fs::write(
        &path,
        "date,ticker,expiration,strike,type,openInterest\n\
         2025-01-02,AAPL,2025-01-17,150,CALL,lots\n",
    )
    .unwrap();

    let store = CsvSnapshotStore::new(&path);
    assert!(store.load().is_empty());
    assert!(!path.exists());
    assert!(dir.path().join("oi_baseline.csv.quarantined").exists());

    // the next save still produces a clean baseline
    store.save(&sample()).unwrap();
    assert_eq!(store.load(), sample());
}

#[test]
fn save_into_unwritable_location_fails() {
    let dir = tempfile::tempdir().unwrap();
    // a regular file where a directory is needed
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();
    let store = CsvSnapshotStore::new(blocker.join("oi_baseline.csv"));
    assert!(store.save(&sample()).is_err());
}

#[test]
fn inspect_reports_without_quarantining() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oi_baseline.csv");
    let store = CsvSnapshotStore::new(&path);
    assert!(store.inspect().unwrap().is_none());

    std::fs::write(&path, "date,ticker,expiration,strike,type,openInterest\nnot,a,row\n").unwrap();
    assert!(store.inspect().is_err());
    assert!(path.exists());

    store.save(&sample()).unwrap();
    assert_eq!(store.inspect().unwrap(), Some(sample()));
}

#[test]
fn surrounding_whitespace_in_fields_survives_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvSnapshotStore::new(dir.path().join("oi_baseline.csv"));
    let mut records = sample().into_records();
    records[0].ticker = " SPY ".into();
    let snap = Snapshot::from_records(records);

    store.save(&snap).unwrap();
    assert_eq!(store.load(), snap);
}

#[test]
fn out_of_range_open_interest_makes_the_baseline_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oi_baseline.csv");
    for cell in ["1e20", "18446744073709551615"] {
        std::fs::write(
            &path,
            format!(
                "date,ticker,expiration,strike,type,openInterest\n\
                 2025-01-02,AAPL,2025-01-17,150,CALL,{cell}\n"
            ),
        )
        .unwrap();

        let store = CsvSnapshotStore::new(&path);
        assert!(store.load().is_empty());
        assert!(dir.path().join("oi_baseline.csv.quarantined").exists());
    }
}

#[test]
fn io_failure_on_load_leaves_the_baseline_in_place() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where the file should be: opening succeeds, reading fails
    let path = dir.path().join("oi_baseline.csv");
    std::fs::create_dir(&path).unwrap();

    let store = CsvSnapshotStore::new(&path);
    assert!(store.load().is_empty());
    assert!(path.is_dir());
    assert!(!dir.path().join("oi_baseline.csv.quarantined").exists());
    assert!(store.inspect().is_err());
}

// ── Round-trip over arbitrary snapshots (proptest) ───────────────────

fn arb_record() -> impl Strategy<Value = OiRecord> {
    (
        prop::option::of(0i64..20_000),
        "[ A-Za-z0-9.,\"'-]{0,8}",
        0i64..20_000,
        0.0..1.0e6_f64,
        prop_oneof![Just(OptionType::Call), Just(OptionType::Put)],
        0u64..=MAX_OPEN_INTEREST,
    )
        .prop_map(|(date, ticker, expiration, strike, option_type, open_interest)| {
            let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
            OiRecord {
                date: date.map(|d| epoch + chrono::Duration::days(d)),
                ticker,
                expiration: epoch + chrono::Duration::days(expiration),
                strike,
                option_type,
                open_interest,
            }
        })
}

proptest! {
    #[test]
    fn load_after_save_returns_the_same_snapshot(
        records in prop::collection::vec(arb_record(), 0..30),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvSnapshotStore::new(dir.path().join("oi_baseline.csv"));
        let snap = Snapshot::from_records(records);

        store.save(&snap).unwrap();
        prop_assert_eq!(store.load(), snap);
    }
}
