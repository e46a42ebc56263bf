use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tempfile::TempPath;

use crate::batch::{MetricQuery, QueryBatch};
use crate::builder::MetricsDatabaseBuilder;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::labels::{LabelFilter, LabelSet};
use crate::query::Query;
use crate::resolver::{self, Resolution};
use crate::store::{Point, PointStore, WriteBatch};

/// Open batch scope of one thread.
#[derive(Default)]
struct Scope {
    depth: usize,
    pending: WriteBatch,
}

/// An embedded metrics database.
///
/// Outside a batch each ingest call (`observe*`, `increment*`) commits on its
/// own before returning. Batch scopes (see [`MetricsDatabase::batch`]) belong
/// to the thread that opened them: that thread's calls are staged and
/// committed together when its outermost scope ends, while other threads keep
/// committing independently. Queries borrow the database and read committed
/// data only.
///
/// # Example
///
/// ```rust,no_run
/// use event_metrics::{Aggregation, LabelSet, MetricsDatabase};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let db = MetricsDatabase::open("metrics.redb")?;
///
/// db.observe("latency", 0.25, [("route", "/index")])?;
/// db.increment("requests", 1.0, LabelSet::null())?;
///
/// let p99 = db
///     .query("latency")?
///     .from_timedelta(Duration::from_secs(30))
///     .to_percentiles(&[99.0])?;
/// let total = db.query("requests")?.to_scalar(Aggregation::Last)?;
/// # Ok(())
/// # }
/// ```
pub struct MetricsDatabase {
    store: PointStore,
    clock: Arc<dyn Clock>,
    scopes: Mutex<HashMap<ThreadId, Scope>>,
    // Removes the backing file of a temporary database on drop. Declared
    // after `store` so the database closes first.
    _temp_path: Option<TempPath>,
}

impl MetricsDatabase {
    /// Returns a builder for configuring and opening a database.
    pub fn builder() -> MetricsDatabaseBuilder {
        MetricsDatabaseBuilder::new()
    }

    /// Opens or creates a database file at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).open()
    }

    /// Creates a database in a fresh temporary file, removed on drop.
    pub fn open_temporary() -> Result<Self> {
        Self::builder().temporary().open()
    }

    pub(crate) fn from_parts(
        store: PointStore,
        clock: Arc<dyn Clock>,
        temp_path: Option<TempPath>,
    ) -> Self {
        Self {
            store,
            clock,
            scopes: Mutex::new(HashMap::new()),
            _temp_path: temp_path,
        }
    }

    /// The underlying point store.
    pub fn store(&self) -> &PointStore {
        &self.store
    }

    fn lock_scopes(&self) -> MutexGuard<'_, HashMap<ThreadId, Scope>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stages `write` in the calling thread's open scope, or commits it right
    /// away when the thread has none.
    fn stage(&self, write: impl FnOnce(&mut WriteBatch)) -> Result<()> {
        {
            let mut scopes = self.lock_scopes();
            if let Some(scope) = scopes.get_mut(&thread::current().id()) {
                write(&mut scope.pending);
                return Ok(());
            }
        }
        let mut batch = WriteBatch::default();
        write(&mut batch);
        self.store.commit(batch)
    }

    /// Records `value` for the series `(name, labels)` at the current time.
    ///
    /// The series' last value is overwritten with `value`.
    pub fn observe(
        &self,
        name: &str,
        value: impl Into<Option<f64>>,
        labels: impl Into<LabelSet>,
    ) -> Result<()> {
        self.observe_at(name, value, labels, self.clock.now_micros())
    }

    /// Records `value` with an explicit timestamp in microseconds.
    pub fn observe_at(
        &self,
        name: &str,
        value: impl Into<Option<f64>>,
        labels: impl Into<LabelSet>,
        timestamp_us: i64,
    ) -> Result<()> {
        self.record(Point {
            name: name.to_string(),
            value: value.into(),
            timestamp_us,
            labels: labels.into(),
        })
    }

    /// Records a fully specified point.
    pub fn record(&self, point: Point) -> Result<()> {
        let labels = point.labels.canonical();
        self.stage(|batch| batch.observe(&point.name, &labels, point.timestamp_us, point.value))
    }

    /// Adds `delta` to the series' last value at the current time.
    ///
    /// A series without a value starts from 0. The log records the value
    /// after the increment, so counters read like any other series. The
    /// addition happens inside the commit transaction, so concurrent
    /// increments never lose an update.
    pub fn increment(&self, name: &str, delta: f64, labels: impl Into<LabelSet>) -> Result<()> {
        self.increment_at(name, delta, labels, self.clock.now_micros())
    }

    /// Adds `delta` with an explicit timestamp in microseconds.
    pub fn increment_at(
        &self,
        name: &str,
        delta: f64,
        labels: impl Into<LabelSet>,
        timestamp_us: i64,
    ) -> Result<()> {
        let labels = labels.into().canonical();
        self.stage(|batch| batch.increment(name, &labels, timestamp_us, delta))
    }

    /// Opens a batch scope on the calling thread. Scopes nest; the thread's
    /// writes commit when its outermost scope is closed with
    /// [`MetricsDatabase::commit`].
    pub fn begin_transaction(&self) {
        self.open_scope(thread::current().id());
    }

    /// Closes the calling thread's innermost batch scope, committing if it
    /// was the outermost.
    pub fn commit(&self) -> Result<()> {
        self.close_scope(thread::current().id())
    }

    fn open_scope(&self, owner: ThreadId) {
        let mut scopes = self.lock_scopes();
        let scope = scopes.entry(owner).or_default();
        scope.depth += 1;
        #[cfg(feature = "logging")]
        log::trace!("batch scope opened at depth {}", scope.depth);
    }

    fn close_scope(&self, owner: ThreadId) -> Result<()> {
        let pending = {
            let mut scopes = self.lock_scopes();
            let Some(scope) = scopes.get_mut(&owner) else {
                return Err(Error::invalid("commit called without an open batch scope"));
            };
            scope.depth -= 1;
            #[cfg(feature = "logging")]
            log::trace!("batch scope closed at depth {}", scope.depth);
            if scope.depth > 0 {
                return Ok(());
            }
            match scopes.remove(&owner) {
                Some(scope) => scope.pending,
                None => return Ok(()),
            }
        };

        #[cfg(feature = "logging")]
        log::debug!("committing batch of {} writes", pending.len());
        self.store.commit(pending)
    }

    /// Opens a batch scope closed when the returned guard drops.
    ///
    /// ```rust,no_run
    /// # use event_metrics::{LabelSet, MetricsDatabase};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let db = MetricsDatabase::open_temporary()?;
    /// let batch = db.batch();
    /// for value in [1.0, 2.0, 3.0] {
    ///     db.observe("lat", value, LabelSet::null())?;
    /// }
    /// batch.commit()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn batch(&self) -> BatchGuard<'_> {
        let owner = thread::current().id();
        self.open_scope(owner);
        BatchGuard {
            db: self,
            owner,
            closed: false,
        }
    }

    /// Runs `f` inside a batch scope and commits afterwards, whether or not
    /// `f` succeeded. An error from `f` takes precedence over a commit error.
    pub fn batched<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let guard = self.batch();
        let result = f(self);
        let committed = guard.commit();
        let value = result?;
        committed?;
        Ok(value)
    }

    /// Starts a query over every series of `name`.
    pub fn query(&self, name: &str) -> Result<MetricQuery<'_>> {
        self.query_with(name, LabelFilter::All)
    }

    /// Starts a query over the series of `name` selected by `filter`.
    ///
    /// Resolves to [`MetricQuery::Single`] when one series matches and to
    /// [`MetricQuery::Batch`] otherwise.
    pub fn query_with(
        &self,
        name: &str,
        filter: impl Into<LabelFilter>,
    ) -> Result<MetricQuery<'_>> {
        let filter = filter.into();
        let available = self.store.label_sets(name)?;
        let constructed_at_us = self.clock.now_micros();

        Ok(match resolver::resolve(name, available, &filter)? {
            Resolution::Single(labels) => {
                MetricQuery::Single(Query::new(&self.store, name, labels, constructed_at_us))
            }
            Resolution::Many(all) => MetricQuery::Batch(QueryBatch::new(
                all.into_iter()
                    .map(|labels| Query::new(&self.store, name, labels, constructed_at_us))
                    .collect(),
            )),
        })
    }

    /// Label-sets recorded under `name`.
    pub fn series(&self, name: &str) -> Result<Vec<LabelSet>> {
        self.store.label_sets(name)
    }

    /// Names of every recorded metric, sorted.
    pub fn metric_names(&self) -> Result<Vec<String>> {
        self.store.metric_names()
    }
}

/// Batch scope guard returned by [`MetricsDatabase::batch`].
///
/// Dropping the guard closes the scope it opened and commits at the
/// outermost level, on every exit path including unwinding. Commit errors at
/// drop time can only be logged, so prefer [`BatchGuard::commit`].
#[must_use = "the batch commits when this guard is dropped"]
pub struct BatchGuard<'db> {
    db: &'db MetricsDatabase,
    owner: ThreadId,
    closed: bool,
}

impl BatchGuard<'_> {
    /// Closes the scope, returning any commit error.
    pub fn commit(mut self) -> Result<()> {
        self.closed = true;
        self.db.close_scope(self.owner)
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.db.close_scope(self.owner) {
            #[cfg(feature = "logging")]
            log::error!("batch commit failed on drop: {e}");
            #[cfg(not(feature = "logging"))]
            drop(e);
        }
    }
}
