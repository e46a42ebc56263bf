//! Query pipeline tests
//!
//! Covers time-window selection and every reduction of a single-series
//! query, using a mock clock so windows are deterministic.

use chrono::Utc;
use event_metrics::{
    Aggregation, DEFAULT_PERCENTILES, Error, LabelSet, MetricsDatabase, MockClock, Query,
    TimeAnchor,
};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const SECOND: i64 = 1_000_000;

fn db_at(now_us: u64) -> MetricsDatabase {
    MetricsDatabase::builder()
        .in_memory()
        .clock(Arc::new(MockClock::with_micros(now_us)))
        .open()
        .unwrap()
}

fn single<'db>(db: &'db MetricsDatabase, name: &str) -> Query<'db> {
    db.query(name).unwrap().single().unwrap()
}

fn observe_all(db: &MetricsDatabase, name: &str, values: &[f64]) {
    db.batched(|db| {
        for (i, value) in values.iter().enumerate() {
            db.observe_at(name, *value, LabelSet::null(), (i as i64 + 1) * SECOND)?;
        }
        Ok(())
    })
    .unwrap();
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "expected {expected:?}, got {actual:?}");
    }
}

// ============================================================================
// Time windows
// ============================================================================

fn window_db() -> MetricsDatabase {
    let db = db_at(4 * SECOND as u64);
    for t in 1..=3 {
        db.observe_at("lat", t as f64, LabelSet::null(), t * SECOND)
            .unwrap();
    }
    db
}

#[test]
fn test_from_timedelta_is_strict() {
    let db = window_db();
    let mut query = single(&db, "lat");

    let cases = [
        (Duration::from_millis(1500), 1),
        (Duration::from_millis(2500), 2),
        (Duration::from_millis(3500), 3),
        (Duration::ZERO, 0),
        (Duration::from_millis(200), 0),
    ];
    for (delta, expected) in cases {
        let values = query.from_timedelta(delta).to_array().unwrap();
        assert_eq!(values.len(), expected, "delta {delta:?}");
    }
}

#[test]
fn test_exactly_one_span_excludes_boundary_point() {
    let db = window_db();
    let values = single(&db, "lat")
        .from_timedelta(Duration::from_secs(1))
        .to_array()
        .unwrap();
    assert!(values.is_empty());
}

#[test]
fn test_from_timestamp() {
    let db = window_db();
    let mut query = single(&db, "lat");

    assert_eq!(query.from_timestamp(1.0).unwrap().to_array().unwrap().len(), 2);
    assert_eq!(query.from_timestamp(0.5).unwrap().to_array().unwrap().len(), 3);

    let two_seconds = chrono::DateTime::from_timestamp(2, 0).unwrap();
    assert_eq!(
        query.from_timestamp(two_seconds).unwrap().to_array().unwrap(),
        vec![Some(3.0)]
    );

    assert!(query.from_timestamp(Utc::now()).unwrap().to_array().unwrap().is_empty());
    assert!(
        query
            .from_timestamp(SystemTime::now())
            .unwrap()
            .to_array()
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_from_timestamp_rejects_non_finite() {
    let db = window_db();
    let mut query = single(&db, "lat");
    let cutoff = query.from_timestamp(1.0).unwrap().cutoff_micros();

    let result = query.from_timestamp(TimeAnchor::EpochSeconds(f64::NAN));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(query.cutoff_micros(), cutoff);
}

#[test]
fn test_from_beginning_resets_window() {
    let db = window_db();
    let mut query = single(&db, "lat");

    query.from_timedelta(Duration::from_millis(1500));
    assert_eq!(query.to_array().unwrap().len(), 1);
    assert_eq!(query.from_beginning().to_array().unwrap().len(), 3);
}

#[test]
fn test_query_reads_at_reduction_time() {
    let db = window_db();
    let mut query = single(&db, "lat");
    query.from_beginning();
    assert_eq!(query.to_array().unwrap().len(), 3);

    db.observe_at("lat", 3.5, LabelSet::null(), 3_500_000)
        .unwrap();
    assert_eq!(
        query.to_array().unwrap(),
        vec![Some(1.0), Some(2.0), Some(3.0), Some(3.5)]
    );
}

#[test]
fn test_construction_time_is_frozen() {
    let clock = Arc::new(MockClock::with_micros(4 * SECOND as u64));
    let db = MetricsDatabase::builder()
        .in_memory()
        .clock(clock.clone())
        .open()
        .unwrap();
    for t in 1..=3 {
        db.observe_at("lat", t as f64, LabelSet::null(), t * SECOND)
            .unwrap();
    }

    let mut query = single(&db, "lat");
    clock.advance(Duration::from_secs(10));
    assert_eq!(query.constructed_at_micros(), 4 * SECOND);
    assert_eq!(
        query
            .from_timedelta(Duration::from_millis(2500))
            .to_array()
            .unwrap()
            .len(),
        2
    );
}

// ============================================================================
// Windows
// ============================================================================

#[test]
fn test_to_windows() {
    let db = window_db();
    let windows = single(&db, "lat")
        .to_windows(&[
            Duration::from_millis(1500),
            Duration::from_millis(3500),
            Duration::ZERO,
        ])
        .unwrap();

    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0].span, Duration::from_millis(1500));
    assert_eq!(windows[0].values, vec![Some(3.0)]);
    assert_eq!(windows[1].values, vec![Some(1.0), Some(2.0), Some(3.0)]);
    assert!(windows[2].values.is_empty());
}

#[test]
fn test_to_windows_respects_selection() {
    let db = window_db();
    let windows = single(&db, "lat")
        .from_timestamp(1.5)
        .unwrap()
        .to_windows(&[Duration::from_secs(10)])
        .unwrap();
    assert_eq!(windows[0].values, vec![Some(2.0), Some(3.0)]);

    assert!(single(&db, "lat").to_windows(&[]).unwrap().is_empty());
}

// ============================================================================
// Reductions
// ============================================================================

#[test]
fn test_to_scalar() {
    let db = db_at(100 * SECOND as u64);
    observe_all(&db, "lat", &[4.0, 1.0, 3.0, 2.0]);
    let query = single(&db, "lat");

    assert_eq!(query.to_scalar(Aggregation::Last).unwrap(), Some(2.0));
    assert_eq!(query.to_scalar(Aggregation::Min).unwrap(), Some(1.0));
    assert_eq!(query.to_scalar(Aggregation::Max).unwrap(), Some(4.0));
    assert_eq!(query.to_scalar(Aggregation::Mean).unwrap(), Some(2.5));
    assert_eq!(query.to_scalar(Aggregation::Count).unwrap(), Some(4.0));
    assert_eq!(query.to_scalar(Aggregation::Sum).unwrap(), Some(10.0));
}

#[test]
fn test_to_scalar_over_empty_window() {
    let db = db_at(100 * SECOND as u64);
    observe_all(&db, "lat", &[4.0, 1.0]);
    let mut query = single(&db, "lat");
    query.from_timedelta(Duration::from_secs(1));

    assert_eq!(query.to_scalar(Aggregation::Sum).unwrap(), None);
    assert_eq!(query.to_scalar(Aggregation::Count).unwrap(), None);
    assert_eq!(query.to_scalar(Aggregation::Mean).unwrap(), None);
    // The cached last value ignores the window.
    assert_eq!(query.to_scalar(Aggregation::Last).unwrap(), Some(1.0));
}

#[test]
fn test_aggregation_names() {
    let db = db_at(100 * SECOND as u64);
    observe_all(&db, "lat", &[1.0, 5.0]);
    let query = single(&db, "lat");

    let max: Aggregation = "MAX".parse().unwrap();
    assert_eq!(query.to_scalar(max).unwrap(), Some(5.0));
    assert!(matches!(
        "median".parse::<Aggregation>(),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_to_buckets() {
    let db = db_at(100 * SECOND as u64);
    observe_all(&db, "lat", &[1.0, 2.0, 3.0, 4.0]);
    let query = single(&db, "lat");

    assert_eq!(query.to_buckets(&[0.0, 2.5, 4.5], false).unwrap(), vec![2, 2]);
    assert_eq!(query.to_buckets(&[0.0, 2.5, 4.5], true).unwrap(), vec![2, 4]);
    // Last bin is closed on the right.
    assert_eq!(query.to_buckets(&[1.0, 2.0, 4.0], false).unwrap(), vec![1, 3]);
    assert!(matches!(
        query.to_buckets(&[3.0, 1.0], false),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_to_percentiles() {
    let db = db_at(1000 * SECOND as u64);
    let values: Vec<f64> = (0..=100).map(f64::from).collect();
    observe_all(&db, "lat", &values);
    let query = single(&db, "lat");

    assert_close(
        &query.to_percentiles(&[50.0, 90.0, 99.0]).unwrap(),
        &[50.0, 90.0, 99.0],
    );
    assert_close(
        &query.to_percentiles(&DEFAULT_PERCENTILES).unwrap(),
        &[50.0, 90.0, 95.0, 99.0],
    );
    assert!(query.to_percentiles(&[101.0]).is_err());
}

#[test]
fn test_to_percentiles_interpolates() {
    let db = db_at(100 * SECOND as u64);
    observe_all(&db, "lat", &[10.0, 20.0]);
    let query = single(&db, "lat");
    assert_close(&query.to_percentiles(&[0.0, 25.0, 100.0]).unwrap(), &[10.0, 12.5, 20.0]);
}

#[test]
fn test_to_array_preserves_order() {
    let db = db_at(10_000 * SECOND as u64);
    let mut rng = rand::rng();
    let values: Vec<f64> = (0..500).map(|_| rng.random_range(0.0..1000.0)).collect();
    observe_all(&db, "lat", &values);

    let stored = single(&db, "lat").to_array().unwrap();
    let expected: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    assert_eq!(stored, expected);
}

#[test]
fn test_to_timestamps_array() {
    let db = window_db();
    let (timestamps, values) = single(&db, "lat")
        .from_timestamp(1.0)
        .unwrap()
        .to_timestamps_array()
        .unwrap();

    let seconds: Vec<i64> = timestamps.iter().map(|t| t.timestamp()).collect();
    assert_eq!(seconds, vec![2, 3]);
    assert_eq!(values, vec![Some(2.0), Some(3.0)]);
    assert_eq!(
        single(&db, "lat").to_timestamps().unwrap(),
        single(&db, "lat").to_timestamps_array().unwrap().0
    );
}

#[test]
fn test_same_timestamp_points_are_kept() {
    let db = db_at(100 * SECOND as u64);
    db.observe_at("lat", 1.0, LabelSet::null(), SECOND).unwrap();
    db.observe_at("lat", 2.0, LabelSet::null(), SECOND).unwrap();

    assert_eq!(
        single(&db, "lat").to_array().unwrap(),
        vec![Some(1.0), Some(2.0)]
    );
}
