//! Point log and last-value cache on top of redb.
//!
//! Three tables live in one redb database:
//!
//! - `metrics`: the append-only point log keyed by
//!   `(name, labels, timestamp_us, sequence)`. The sequence number breaks
//!   timestamp ties in insertion order.
//! - `cache`: the last value of every series keyed by `(name, labels)`. This
//!   table doubles as the label-set index of a metric.
//! - `sequence`: the next sequence number.
//!
//! Writes are staged in a [`WriteBatch`] and applied by [`PointStore::commit`]
//! in a single write transaction, so readers observe a batch all at once.

use std::fmt;

use redb::{Database, Durability, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::labels::LabelSet;

const METRICS: TableDefinition<(&str, &str, i64, u64), Option<f64>> =
    TableDefinition::new("metrics");
const CACHE: TableDefinition<(&str, &str), Option<f64>> = TableDefinition::new("cache");
const SEQUENCE: TableDefinition<&str, u64> = TableDefinition::new("sequence");

const SEQUENCE_KEY: &str = "metrics";

/// A single recorded observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Metric name.
    pub name: String,
    /// Observed value; `None` records an event without a value.
    pub value: Option<f64>,
    /// Ingest time in microseconds since the Unix epoch.
    pub timestamp_us: i64,
    /// Series labels.
    pub labels: LabelSet,
}

#[derive(Debug)]
enum StagedWrite {
    /// Append a point and overwrite the cache row with its value.
    Observe {
        name: String,
        labels: String,
        timestamp_us: i64,
        value: Option<f64>,
    },
    /// Add `delta` to the cache row (seeded with 0) and append the result.
    Increment {
        name: String,
        labels: String,
        timestamp_us: i64,
        delta: f64,
    },
}

/// Writes staged for one atomic commit, applied in staging order.
///
/// Increments are staged as deltas and resolved against the cache inside
/// the commit transaction, so concurrent committers never lose an update.
#[derive(Debug, Default)]
pub(crate) struct WriteBatch {
    writes: Vec<StagedWrite>,
}

impl WriteBatch {
    pub(crate) fn len(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Stages a point that also becomes the series' last value.
    pub(crate) fn observe(&mut self, name: &str, labels: &str, timestamp_us: i64, value: Option<f64>) {
        self.writes.push(StagedWrite::Observe {
            name: name.to_string(),
            labels: labels.to_string(),
            timestamp_us,
            value,
        });
    }

    /// Stages an increment of the series' last value.
    pub(crate) fn increment(&mut self, name: &str, labels: &str, timestamp_us: i64, delta: f64) {
        self.writes.push(StagedWrite::Increment {
            name: name.to_string(),
            labels: labels.to_string(),
            timestamp_us,
            delta,
        });
    }
}

/// Durable point log with a per-series last-value cache.
pub struct PointStore {
    db: Database,
    durability: Durability,
}

impl fmt::Debug for PointStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointStore").finish_non_exhaustive()
    }
}

impl PointStore {
    /// Wraps an opened redb database, creating the tables when missing.
    pub(crate) fn new(db: Database, durable_writes: bool) -> Result<Self> {
        let durability = if durable_writes {
            Durability::Immediate
        } else {
            Durability::None
        };

        let txn = db.begin_write()?;
        {
            txn.open_table(METRICS)?;
            txn.open_table(CACHE)?;
            txn.open_table(SEQUENCE)?;
        }
        txn.commit()?;

        Ok(Self { db, durability })
    }

    /// Applies every staged write in one transaction.
    ///
    /// redb serializes write transactions, so the cache read behind each
    /// increment and the write that follows it are atomic.
    pub(crate) fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut txn = self.db.begin_write()?;
        txn.set_durability(self.durability);
        {
            let mut sequence = txn.open_table(SEQUENCE)?;
            let mut next = sequence.get(SEQUENCE_KEY)?.map_or(0, |guard| guard.value());

            let mut metrics = txn.open_table(METRICS)?;
            let mut cache = txn.open_table(CACHE)?;
            for write in &batch.writes {
                let (name, labels, timestamp_us, value) = match write {
                    StagedWrite::Observe {
                        name,
                        labels,
                        timestamp_us,
                        value,
                    } => (name, labels, *timestamp_us, *value),
                    StagedWrite::Increment {
                        name,
                        labels,
                        timestamp_us,
                        delta,
                    } => {
                        let current = cache
                            .get((name.as_str(), labels.as_str()))?
                            .map_or(Some(0.0), |guard| guard.value());
                        (name, labels, *timestamp_us, current.map(|v| v + delta))
                    }
                };
                metrics.insert((name.as_str(), labels.as_str(), timestamp_us, next), value)?;
                cache.insert((name.as_str(), labels.as_str()), value)?;
                next += 1;
            }
            sequence.insert(SEQUENCE_KEY, next)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Returns every label-set recorded under `name`, in canonical order.
    pub fn label_sets(&self, name: &str) -> Result<Vec<LabelSet>> {
        let txn = self.db.begin_read()?;
        let cache = txn.open_table(CACHE)?;

        let mut label_sets = Vec::new();
        for entry in cache.range((name, "")..)? {
            let (key, _) = entry?;
            let (series_name, labels) = key.value();
            if series_name != name {
                break;
            }
            label_sets.push(LabelSet::from_canonical(labels)?);
        }
        Ok(label_sets)
    }

    /// Returns every distinct metric name, sorted.
    pub fn metric_names(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let cache = txn.open_table(CACHE)?;

        let mut names: Vec<String> = Vec::new();
        for entry in cache.iter()? {
            let (key, _) = entry?;
            let (name, _) = key.value();
            if names.last().is_none_or(|last| last != name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Returns `(timestamp_us, value)` for every point of the series with a
    /// timestamp strictly greater than `after_us`, in timestamp order.
    pub fn scan(
        &self,
        name: &str,
        labels: &LabelSet,
        after_us: i64,
    ) -> Result<Vec<(i64, Option<f64>)>> {
        self.scan_raw(name, &labels.canonical(), after_us)
    }

    pub(crate) fn scan_raw(
        &self,
        name: &str,
        labels: &str,
        after_us: i64,
    ) -> Result<Vec<(i64, Option<f64>)>> {
        let Some(start_us) = after_us.checked_add(1) else {
            return Ok(Vec::new());
        };

        let txn = self.db.begin_read()?;
        let metrics = txn.open_table(METRICS)?;

        let mut points = Vec::new();
        let range = (name, labels, start_us, 0u64)..=(name, labels, i64::MAX, u64::MAX);
        for entry in metrics.range(range)? {
            let (key, value) = entry?;
            let (_, _, timestamp_us, _) = key.value();
            points.push((timestamp_us, value.value()));
        }
        Ok(points)
    }

    /// Returns the cached last value of the series.
    ///
    /// The outer `Option` is `None` when the series does not exist; the inner
    /// one is `None` when its last value was recorded without a value.
    pub fn read_last(&self, name: &str, labels: &LabelSet) -> Result<Option<Option<f64>>> {
        self.read_last_raw(name, &labels.canonical())
    }

    pub(crate) fn read_last_raw(&self, name: &str, labels: &str) -> Result<Option<Option<f64>>> {
        let txn = self.db.begin_read()?;
        let cache = txn.open_table(CACHE)?;
        Ok(cache.get((name, labels))?.map(|guard| guard.value()))
    }
}
