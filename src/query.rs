//! Single-series queries.
//!
//! A [`Query`] selects the points of one series newer than its cutoff and
//! reduces them. Selection (`from_*`) only moves the cutoff; every reduction
//! (`to_*`) reads the store again, so one query can be reduced several times
//! and always reflects what has been committed at call time.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{self, Aggregate, Aggregation};
use crate::clock::{duration_to_micros, system_time_to_micros};
use crate::error::{Error, Result};
use crate::labels::LabelSet;
use crate::store::PointStore;

/// Absolute start of a time window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeAnchor {
    /// A calendar timestamp.
    Calendar(DateTime<Utc>),
    /// Seconds since the Unix epoch.
    EpochSeconds(f64),
}

impl TimeAnchor {
    /// Converts to microseconds since the epoch.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn to_micros(self) -> Result<i64> {
        match self {
            TimeAnchor::Calendar(time) => Ok(time.timestamp_micros()),
            TimeAnchor::EpochSeconds(seconds) => {
                let micros = seconds * 1e6;
                if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
                    return Err(Error::invalid(format!(
                        "timestamp must be a finite number of epoch seconds, got {seconds}"
                    )));
                }
                Ok(micros as i64)
            }
        }
    }
}

impl From<DateTime<Utc>> for TimeAnchor {
    fn from(time: DateTime<Utc>) -> Self {
        TimeAnchor::Calendar(time)
    }
}

impl From<SystemTime> for TimeAnchor {
    fn from(time: SystemTime) -> Self {
        match DateTime::from_timestamp_micros(system_time_to_micros(time)) {
            Some(calendar) => TimeAnchor::Calendar(calendar),
            None => TimeAnchor::EpochSeconds(f64::NAN),
        }
    }
}

impl From<f64> for TimeAnchor {
    fn from(seconds: f64) -> Self {
        TimeAnchor::EpochSeconds(seconds)
    }
}

/// Values observed within one trailing window, see [`Query::to_windows`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    /// Window length, measured back from the query's construction time.
    pub span: Duration,
    /// Values in timestamp order.
    pub values: Vec<Option<f64>>,
}

/// Query over one resolved series.
#[derive(Debug, Clone)]
pub struct Query<'db> {
    store: &'db PointStore,
    name: String,
    labels: LabelSet,
    series_key: String,
    constructed_at_us: i64,
    cutoff_us: i64,
}

impl<'db> Query<'db> {
    pub(crate) fn new(
        store: &'db PointStore,
        name: &str,
        labels: LabelSet,
        constructed_at_us: i64,
    ) -> Self {
        let series_key = labels.canonical();
        Self {
            store,
            name: name.to_string(),
            labels,
            series_key,
            constructed_at_us,
            cutoff_us: 0,
        }
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels of the series this query reads.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// The "now" relative windows are measured from, frozen at creation.
    pub fn constructed_at_micros(&self) -> i64 {
        self.constructed_at_us
    }

    /// Exclusive lower bound on point timestamps.
    pub fn cutoff_micros(&self) -> i64 {
        self.cutoff_us
    }

    /// Selects every point.
    pub fn from_beginning(&mut self) -> &mut Self {
        self.cutoff_us = 0;
        self
    }

    /// Selects points strictly after `timestamp`.
    pub fn from_timestamp(&mut self, timestamp: impl Into<TimeAnchor>) -> Result<&mut Self> {
        self.cutoff_us = timestamp.into().to_micros()?;
        Ok(self)
    }

    /// Selects points strictly newer than `delta` before construction time.
    pub fn from_timedelta(&mut self, delta: Duration) -> &mut Self {
        self.cutoff_us = self
            .constructed_at_us
            .saturating_sub(duration_to_micros(delta));
        self
    }

    fn fetch(&self) -> Result<Vec<(i64, Option<f64>)>> {
        self.store
            .scan_raw(&self.name, &self.series_key, self.cutoff_us)
    }

    fn fetch_values(&self) -> Result<Vec<Option<f64>>> {
        Ok(self.fetch()?.into_iter().map(|(_, value)| value).collect())
    }

    /// Reduces the selection to one number.
    ///
    /// [`Aggregation::Last`] reads the series' cached value and ignores the
    /// selection. The other reductions skip null values and return `None`
    /// when no point is selected.
    pub fn to_scalar(&self, aggregation: Aggregation) -> Result<Option<f64>> {
        if aggregation == Aggregation::Last {
            return Ok(self
                .store
                .read_last_raw(&self.name, &self.series_key)?
                .flatten());
        }

        let values = self.fetch_values()?;
        if values.is_empty() {
            return Ok(None);
        }
        let summary: Aggregate = values.into_iter().flatten().collect();
        Ok(summary.reduce(aggregation))
    }

    /// Histogram of the selected values over `edges`.
    ///
    /// See [`aggregate::histogram`] for bin boundaries. Returns an empty
    /// vector when nothing is selected.
    pub fn to_buckets(&self, edges: &[f64], cumulative: bool) -> Result<Vec<u64>> {
        let values = self.fetch_values()?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let counts = aggregate::histogram(&present, edges, cumulative)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }
        Ok(counts)
    }

    /// Linear-interpolated percentiles of the selected values.
    pub fn to_percentiles(&self, percentiles: &[f64]) -> Result<Vec<f64>> {
        let present: Vec<f64> = self.fetch_values()?.into_iter().flatten().collect();
        aggregate::percentiles(&present, percentiles)
    }

    /// Selected values in timestamp order.
    pub fn to_array(&self) -> Result<Vec<Option<f64>>> {
        self.fetch_values()
    }

    /// Selected timestamps in order.
    pub fn to_timestamps(&self) -> Result<Vec<DateTime<Utc>>> {
        self.fetch()?
            .into_iter()
            .map(|(timestamp_us, _)| to_calendar(timestamp_us))
            .collect()
    }

    /// Selected timestamps and values, index-aligned.
    pub fn to_timestamps_array(&self) -> Result<(Vec<DateTime<Utc>>, Vec<Option<f64>>)> {
        let points = self.fetch()?;
        let mut timestamps = Vec::with_capacity(points.len());
        let mut values = Vec::with_capacity(points.len());
        for (timestamp_us, value) in points {
            timestamps.push(to_calendar(timestamp_us)?);
            values.push(value);
        }
        Ok((timestamps, values))
    }

    /// Splits the selection into trailing windows of the given spans.
    ///
    /// Each window holds the values newer than `span` before construction
    /// time that are also inside the current selection. The store is read
    /// once, for the widest window.
    pub fn to_windows(&self, spans: &[Duration]) -> Result<Vec<Window>> {
        let Some(widest) = spans.iter().max() else {
            return Ok(Vec::new());
        };

        let window_cutoff = |span: &Duration| {
            self.constructed_at_us
                .saturating_sub(duration_to_micros(*span))
                .max(self.cutoff_us)
        };
        let points = self
            .store
            .scan_raw(&self.name, &self.series_key, window_cutoff(widest))?;

        Ok(spans
            .iter()
            .map(|span| {
                let cutoff = window_cutoff(span);
                Window {
                    span: *span,
                    values: points
                        .iter()
                        .filter(|(timestamp_us, _)| *timestamp_us > cutoff)
                        .map(|(_, value)| *value)
                        .collect(),
                }
            })
            .collect())
    }
}

fn to_calendar(timestamp_us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(timestamp_us)
        .ok_or_else(|| Error::invalid(format!("timestamp {timestamp_us}us is out of range")))
}
