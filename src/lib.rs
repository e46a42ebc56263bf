//! # event-metrics
//!
//! An embedded store for labeled metric observations with composable
//! time-window queries.
//!
//! Every observation is a point `(name, value, timestamp, labels)`. The
//! distinct label-sets recorded under a name are that metric's *series*. A
//! query names a metric and a [`LabelFilter`]; the filter is resolved against
//! the recorded series and yields either a single [`Query`] or a
//! [`QueryBatch`] with one query per matching series. Queries are narrowed
//! with the `from_*` methods and reduced with the `to_*` methods.
//!
//! ## Features
//!
//! - **Gauges and counters**: `observe` overwrites a series' last value,
//!   `increment` adds to it; the log always stores absolute values
//! - **Label matching**: wildcard, label-less, or partial key/value filters
//! - **Reductions**: last/min/max/mean/count/sum, histograms, percentiles,
//!   raw values and timestamps, trailing windows
//! - **Atomic batches**: nested batch scopes commit once at the outermost level
//! - **Storage**: redb database file, temporary file, or memory
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use event_metrics::{Aggregation, LabelFilter, MetricsDatabase, QueryOutput};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = MetricsDatabase::open("metrics.redb")?;
//!
//! db.observe("latency", 0.12, [("route", "/index"), ("code", "200")])?;
//! db.observe("latency", 0.48, [("route", "/login"), ("code", "200")])?;
//!
//! // Both series match, so the result is a batch labeled per series.
//! let p90 = db
//!     .query_with("latency", LabelFilter::exact([("code", "200")]))?
//!     .from_timedelta(Duration::from_secs(60))
//!     .to_percentiles(&[90.0])?;
//! if let QueryOutput::Batch(series) = p90 {
//!     for entry in series {
//!         println!("{}: {:?}", entry.labels, entry.result);
//!     }
//! }
//!
//! // A filter matching one series squeezes to a single result.
//! let mean = db
//!     .query_with("latency", LabelFilter::exact([("route", "/index")]))?
//!     .to_scalar(Aggregation::Mean)?
//!     .single();
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::wrong_self_convention
)]

pub mod aggregate;
mod batch;
mod builder;
pub mod clock;
mod database;
mod error;
pub mod labels;
mod query;
pub mod resolver;
pub mod store;

pub use aggregate::{Aggregate, Aggregation, DEFAULT_BUCKETS, DEFAULT_PERCENTILES};
pub use batch::{MetricQuery, QueryBatch, QueryOutput, SeriesResult};
pub use builder::{MetricsDatabaseBuilder, StorageConfig};
pub use clock::{Clock, MockClock, SystemClock};
pub use database::{BatchGuard, MetricsDatabase};
pub use error::{Error, Result};
pub use labels::{LabelFilter, LabelSet};
pub use query::{Query, TimeAnchor, Window};
pub use resolver::Resolution;
pub use store::{Point, PointStore};
