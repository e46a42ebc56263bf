//! Reductions applied to the values of one series.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default histogram edges for [`crate::Query::to_buckets`].
pub const DEFAULT_BUCKETS: [f64; 7] = [0.0, 0.5, 1.0, 5.0, 10.0, 100.0, f64::INFINITY];

/// Default percentiles for [`crate::Query::to_percentiles`].
pub const DEFAULT_PERCENTILES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];

/// Scalar reduction selected by [`crate::Query::to_scalar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    /// Current value from the last-value cache. Ignores the time window.
    Last,
    /// Smallest value in the window.
    Min,
    /// Largest value in the window.
    Max,
    /// Arithmetic mean of the window.
    Mean,
    /// Number of non-null values in the window.
    Count,
    /// Sum of the window.
    Sum,
}

impl Aggregation {
    /// Lower-case name accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
            Self::Count => "count",
            Self::Sum => "sum",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Aggregation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "last" => Ok(Self::Last),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "mean" => Ok(Self::Mean),
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            _ => Err(Error::invalid(format!(
                "aggregation must be one of last, min, max, mean, count, sum; got '{s}'"
            ))),
        }
    }
}

/// Running summary of a window of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Minimum value seen.
    pub min: f64,
    /// Maximum value seen.
    pub max: f64,
    /// Sum of all values.
    pub sum: f64,
    /// Number of values accumulated.
    pub count: u64,
    /// Most recently accumulated value.
    pub last: f64,
}

impl Aggregate {
    /// Creates an aggregate from a single value.
    pub fn from_value(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
            count: 1,
            last: value,
        }
    }

    /// Creates an empty aggregate (used as a starting point for accumulation).
    pub fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
            last: 0.0,
        }
    }

    /// Accumulates a value into this aggregate.
    pub fn accumulate(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self::from_value(value);
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
            self.sum += value;
            self.count += 1;
            self.last = value;
        }
    }

    /// Computes the mean, or `None` when empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / (self.count as f64))
        }
    }

    /// Returns true if this aggregate contains no values.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Reads the requested windowed reduction out of the summary.
    ///
    /// `Last` reports the last accumulated value; queries answer `Last` from
    /// the cache instead. `Count` is always defined; every other reduction is
    /// `None` when empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn reduce(&self, aggregation: Aggregation) -> Option<f64> {
        if self.count == 0 {
            return match aggregation {
                Aggregation::Count => Some(0.0),
                _ => None,
            };
        }
        match aggregation {
            Aggregation::Last => Some(self.last),
            Aggregation::Min => Some(self.min),
            Aggregation::Max => Some(self.max),
            Aggregation::Mean => self.mean(),
            Aggregation::Count => Some(self.count as f64),
            Aggregation::Sum => Some(self.sum),
        }
    }
}

impl Default for Aggregate {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<f64> for Aggregate {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut agg = Self::empty();
        for value in iter {
            agg.accumulate(value);
        }
        agg
    }
}

/// Counts `values` into the bins delimited by `edges`.
///
/// Bins are half-open `[e[i], e[i+1])` except the last, which also includes
/// its right edge. Values outside the edges are dropped.
pub fn histogram(values: &[f64], edges: &[f64], cumulative: bool) -> Result<Vec<u64>> {
    if edges.len() < 2 {
        return Err(Error::invalid("bucket edges need at least two values"));
    }
    if edges.iter().any(|e| e.is_nan()) || edges.windows(2).any(|w| w[0] > w[1]) {
        return Err(Error::invalid("bucket edges must increase monotonically"));
    }

    let last_edge = edges[edges.len() - 1];
    let mut counts = vec![0u64; edges.len() - 1];
    for &value in values {
        if value.is_nan() || value < edges[0] || value > last_edge {
            continue;
        }
        let bin = if value == last_edge {
            counts.len() - 1
        } else {
            // First edge strictly greater than the value closes its bin.
            edges.partition_point(|&e| e <= value) - 1
        };
        counts[bin] += 1;
    }

    if cumulative {
        let mut running = 0;
        for count in &mut counts {
            running += *count;
            *count = running;
        }
    }
    Ok(counts)
}

/// Linear-interpolated percentiles of `values`, each in `[0, 100]`.
///
/// The rank of percentile `p` over `n` sorted values is `p / 100 * (n - 1)`;
/// fractional ranks interpolate between neighbours. Returns an empty vector
/// when `values` is empty.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentiles(values: &[f64], percentiles: &[f64]) -> Result<Vec<f64>> {
    if let Some(bad) = percentiles
        .iter()
        .find(|p| p.is_nan() || **p < 0.0 || **p > 100.0)
    {
        return Err(Error::invalid(format!(
            "percentiles must be within [0, 100], got {bad}"
        )));
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let max_rank = (sorted.len() - 1) as f64;
    Ok(percentiles
        .iter()
        .map(|p| {
            let rank = p * max_rank / 100.0;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let fraction = rank - rank.floor();
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        })
        .collect())
}
