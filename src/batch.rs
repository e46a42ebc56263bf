//! Fan-out over several series of one metric.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::Aggregation;
use crate::error::Result;
use crate::labels::LabelSet;
use crate::query::{Query, TimeAnchor, Window};

/// Result of one series within a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesResult<T> {
    /// Labels of the series.
    pub labels: LabelSet,
    /// Reduction computed for the series.
    pub result: T,
}

/// Ordered collection of queries sharing a metric name and filter.
///
/// Every operation is applied to each query in turn; no reduction crosses
/// series boundaries.
#[derive(Debug, Clone)]
pub struct QueryBatch<'db> {
    queries: Vec<Query<'db>>,
}

impl<'db> QueryBatch<'db> {
    pub(crate) fn new(queries: Vec<Query<'db>>) -> Self {
        Self { queries }
    }

    /// Number of series in the batch.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns `true` if the batch holds no series.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Iterates over the contained queries.
    pub fn iter(&self) -> std::slice::Iter<'_, Query<'db>> {
        self.queries.iter()
    }

    /// Labels of every series, in batch order.
    pub fn labels(&self) -> Vec<&LabelSet> {
        self.queries.iter().map(Query::labels).collect()
    }

    /// Unwraps the contained queries.
    pub fn into_queries(self) -> Vec<Query<'db>> {
        self.queries
    }

    /// See [`Query::from_beginning`].
    pub fn from_beginning(&mut self) -> &mut Self {
        for query in &mut self.queries {
            query.from_beginning();
        }
        self
    }

    /// See [`Query::from_timestamp`].
    pub fn from_timestamp(&mut self, timestamp: impl Into<TimeAnchor>) -> Result<&mut Self> {
        let anchor = timestamp.into();
        for query in &mut self.queries {
            query.from_timestamp(anchor)?;
        }
        Ok(self)
    }

    /// See [`Query::from_timedelta`].
    pub fn from_timedelta(&mut self, delta: Duration) -> &mut Self {
        for query in &mut self.queries {
            query.from_timedelta(delta);
        }
        self
    }

    fn map<T, F>(&self, reduce: F) -> Result<Vec<SeriesResult<T>>>
    where
        F: Fn(&Query<'db>) -> Result<T>,
    {
        self.queries
            .iter()
            .map(|query| {
                Ok(SeriesResult {
                    labels: query.labels().clone(),
                    result: reduce(query)?,
                })
            })
            .collect()
    }

    /// See [`Query::to_scalar`].
    pub fn to_scalar(&self, aggregation: Aggregation) -> Result<Vec<SeriesResult<Option<f64>>>> {
        self.map(|query| query.to_scalar(aggregation))
    }

    /// See [`Query::to_buckets`].
    pub fn to_buckets(&self, edges: &[f64], cumulative: bool) -> Result<Vec<SeriesResult<Vec<u64>>>> {
        self.map(|query| query.to_buckets(edges, cumulative))
    }

    /// See [`Query::to_percentiles`].
    pub fn to_percentiles(&self, percentiles: &[f64]) -> Result<Vec<SeriesResult<Vec<f64>>>> {
        self.map(|query| query.to_percentiles(percentiles))
    }

    /// See [`Query::to_array`].
    pub fn to_array(&self) -> Result<Vec<SeriesResult<Vec<Option<f64>>>>> {
        self.map(Query::to_array)
    }

    /// See [`Query::to_timestamps`].
    pub fn to_timestamps(&self) -> Result<Vec<SeriesResult<Vec<DateTime<Utc>>>>> {
        self.map(Query::to_timestamps)
    }

    /// See [`Query::to_timestamps_array`].
    #[allow(clippy::type_complexity)]
    pub fn to_timestamps_array(
        &self,
    ) -> Result<Vec<SeriesResult<(Vec<DateTime<Utc>>, Vec<Option<f64>>)>>> {
        self.map(Query::to_timestamps_array)
    }

    /// See [`Query::to_windows`].
    pub fn to_windows(&self, spans: &[Duration]) -> Result<Vec<SeriesResult<Vec<Window>>>> {
        self.map(|query| query.to_windows(spans))
    }
}

impl<'a, 'db> IntoIterator for &'a QueryBatch<'db> {
    type Item = &'a Query<'db>;
    type IntoIter = std::slice::Iter<'a, Query<'db>>;

    fn into_iter(self) -> Self::IntoIter {
        self.queries.iter()
    }
}

/// Output of a [`MetricQuery`] reduction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryOutput<T> {
    /// The filter resolved to one series.
    Single(T),
    /// The filter resolved to several series.
    Batch(Vec<SeriesResult<T>>),
}

impl<T> QueryOutput<T> {
    /// Returns the result of a single-series query.
    pub fn single(self) -> Option<T> {
        match self {
            QueryOutput::Single(result) => Some(result),
            QueryOutput::Batch(_) => None,
        }
    }

    /// Returns the per-series results of a multi-series query.
    pub fn batch(self) -> Option<Vec<SeriesResult<T>>> {
        match self {
            QueryOutput::Single(_) => None,
            QueryOutput::Batch(results) => Some(results),
        }
    }

    /// Returns `true` for a single-series result.
    pub fn is_single(&self) -> bool {
        matches!(self, QueryOutput::Single(_))
    }

    /// Number of series covered.
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Single(_) => 1,
            QueryOutput::Batch(results) => results.len(),
        }
    }

    /// Returns `true` if no series is covered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A resolved query: one series, or a batch when the filter matched several.
#[derive(Debug, Clone)]
pub enum MetricQuery<'db> {
    /// Exactly one series matched.
    Single(Query<'db>),
    /// Several series matched.
    Batch(QueryBatch<'db>),
}

impl<'db> MetricQuery<'db> {
    /// Number of matched series.
    pub fn len(&self) -> usize {
        match self {
            MetricQuery::Single(_) => 1,
            MetricQuery::Batch(batch) => batch.len(),
        }
    }

    /// Returns `true` if no series matched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when the filter resolved to one series.
    pub fn is_single(&self) -> bool {
        matches!(self, MetricQuery::Single(_))
    }

    /// Returns the query of a single-series resolution.
    pub fn single(self) -> Option<Query<'db>> {
        match self {
            MetricQuery::Single(query) => Some(query),
            MetricQuery::Batch(_) => None,
        }
    }

    /// Converts into a batch, wrapping a single query in a batch of one.
    pub fn into_batch(self) -> QueryBatch<'db> {
        match self {
            MetricQuery::Single(query) => QueryBatch::new(vec![query]),
            MetricQuery::Batch(batch) => batch,
        }
    }

    /// Labels of every matched series.
    pub fn labels(&self) -> Vec<&LabelSet> {
        match self {
            MetricQuery::Single(query) => vec![query.labels()],
            MetricQuery::Batch(batch) => batch.labels(),
        }
    }

    /// See [`Query::from_beginning`].
    pub fn from_beginning(&mut self) -> &mut Self {
        match self {
            MetricQuery::Single(query) => {
                query.from_beginning();
            }
            MetricQuery::Batch(batch) => {
                batch.from_beginning();
            }
        }
        self
    }

    /// See [`Query::from_timestamp`].
    pub fn from_timestamp(&mut self, timestamp: impl Into<TimeAnchor>) -> Result<&mut Self> {
        match self {
            MetricQuery::Single(query) => {
                query.from_timestamp(timestamp)?;
            }
            MetricQuery::Batch(batch) => {
                batch.from_timestamp(timestamp)?;
            }
        }
        Ok(self)
    }

    /// See [`Query::from_timedelta`].
    pub fn from_timedelta(&mut self, delta: Duration) -> &mut Self {
        match self {
            MetricQuery::Single(query) => {
                query.from_timedelta(delta);
            }
            MetricQuery::Batch(batch) => {
                batch.from_timedelta(delta);
            }
        }
        self
    }

    fn dispatch<T, F>(&self, reduce: F) -> Result<QueryOutput<T>>
    where
        F: Fn(&Query<'db>) -> Result<T>,
    {
        match self {
            MetricQuery::Single(query) => reduce(query).map(QueryOutput::Single),
            MetricQuery::Batch(batch) => batch.map(reduce).map(QueryOutput::Batch),
        }
    }

    /// See [`Query::to_scalar`].
    pub fn to_scalar(&self, aggregation: Aggregation) -> Result<QueryOutput<Option<f64>>> {
        self.dispatch(|query| query.to_scalar(aggregation))
    }

    /// See [`Query::to_buckets`].
    pub fn to_buckets(&self, edges: &[f64], cumulative: bool) -> Result<QueryOutput<Vec<u64>>> {
        self.dispatch(|query| query.to_buckets(edges, cumulative))
    }

    /// See [`Query::to_percentiles`].
    pub fn to_percentiles(&self, percentiles: &[f64]) -> Result<QueryOutput<Vec<f64>>> {
        self.dispatch(|query| query.to_percentiles(percentiles))
    }

    /// See [`Query::to_array`].
    pub fn to_array(&self) -> Result<QueryOutput<Vec<Option<f64>>>> {
        self.dispatch(Query::to_array)
    }

    /// See [`Query::to_timestamps`].
    pub fn to_timestamps(&self) -> Result<QueryOutput<Vec<DateTime<Utc>>>> {
        self.dispatch(Query::to_timestamps)
    }

    /// See [`Query::to_timestamps_array`].
    #[allow(clippy::type_complexity)]
    pub fn to_timestamps_array(
        &self,
    ) -> Result<QueryOutput<(Vec<DateTime<Utc>>, Vec<Option<f64>>)>> {
        self.dispatch(Query::to_timestamps_array)
    }

    /// See [`Query::to_windows`].
    pub fn to_windows(&self, spans: &[Duration]) -> Result<QueryOutput<Vec<Window>>> {
        self.dispatch(|query| query.to_windows(spans))
    }
}
