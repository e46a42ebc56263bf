use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::backends::InMemoryBackend;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::database::MetricsDatabase;
use crate::error::Result;
use crate::store::PointStore;

/// Suffix of files created for temporary databases.
const TEMPORARY_SUFFIX: &str = ".event_metrics.redb";

/// Where a database keeps its data.
///
/// Defaults to a temporary file removed when the database is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// A database file, created if missing.
    File {
        /// Path of the database file.
        path: PathBuf,
    },
    /// A fresh temporary file.
    #[default]
    Temporary,
    /// Process memory only; nothing survives the database handle.
    InMemory,
}

/// Builder for configuring and opening a [`MetricsDatabase`].
///
/// # Example
///
/// ```rust,no_run
/// use event_metrics::MetricsDatabase;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let db = MetricsDatabase::builder()
///     .path("metrics.redb")
///     .cache_size(64 * 1024 * 1024)
///     .durable_writes(false)
///     .open()?;
/// # Ok(())
/// # }
/// ```
pub struct MetricsDatabaseBuilder {
    storage: StorageConfig,
    cache_size: Option<usize>,
    durable_writes: bool,
    clock: Arc<dyn Clock>,
}

impl MetricsDatabaseBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            storage: StorageConfig::default(),
            cache_size: None,
            durable_writes: true,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the storage location.
    #[must_use]
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Stores data in the file at `path`.
    #[must_use]
    pub fn path(self, path: impl AsRef<Path>) -> Self {
        self.storage(StorageConfig::File {
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Stores data in a fresh temporary file.
    #[must_use]
    pub fn temporary(self) -> Self {
        self.storage(StorageConfig::Temporary)
    }

    /// Keeps data in memory only.
    #[must_use]
    pub fn in_memory(self) -> Self {
        self.storage(StorageConfig::InMemory)
    }

    /// Sets the size of the storage engine's page cache in bytes.
    ///
    /// Default: the engine default.
    #[must_use]
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = Some(bytes);
        self
    }

    /// Whether each commit is flushed to disk before returning.
    ///
    /// Without durable writes a commit is visible to readers immediately but
    /// may be lost on power failure until a later durable commit.
    ///
    /// Default: `true`
    #[must_use]
    pub fn durable_writes(mut self, durable: bool) -> Self {
        self.durable_writes = durable;
        self
    }

    /// Sets the clock that stamps ingest times and query anchors.
    ///
    /// Default: [`SystemClock`]
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Opens the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or is not a valid
    /// database.
    pub fn open(self) -> Result<MetricsDatabase> {
        let mut engine = redb::Builder::new();
        if let Some(bytes) = self.cache_size {
            engine.set_cache_size(bytes);
        }

        let (db, temp_path) = match &self.storage {
            StorageConfig::File { path } => (engine.create(path)?, None),
            StorageConfig::Temporary => {
                let temp_path = tempfile::Builder::new()
                    .suffix(TEMPORARY_SUFFIX)
                    .tempfile()?
                    .into_temp_path();
                (engine.create(&temp_path)?, Some(temp_path))
            }
            StorageConfig::InMemory => {
                (engine.create_with_backend(InMemoryBackend::new())?, None)
            }
        };

        #[cfg(feature = "logging")]
        log::info!("opened metrics database ({:?})", self.storage);

        let store = PointStore::new(db, self.durable_writes)?;
        Ok(MetricsDatabase::from_parts(store, self.clock, temp_path))
    }
}

impl Default for MetricsDatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builder_default() {
        let builder = MetricsDatabaseBuilder::new();
        assert_eq!(builder.storage, StorageConfig::Temporary);
        assert!(builder.durable_writes);
        assert!(builder.cache_size.is_none());
    }

    #[test]
    fn test_builder_settings() {
        let builder = MetricsDatabaseBuilder::new()
            .in_memory()
            .cache_size(1024 * 1024)
            .durable_writes(false);
        assert_eq!(builder.storage, StorageConfig::InMemory);
        assert_eq!(builder.cache_size, Some(1024 * 1024));
        assert!(!builder.durable_writes);
    }

    #[test]
    fn test_storage_config_serde() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"type":"File","path":"/var/lib/metrics.redb"}"#).unwrap();
        assert_eq!(
            config,
            StorageConfig::File {
                path: PathBuf::from("/var/lib/metrics.redb")
            }
        );
        assert_eq!(
            serde_json::to_string(&StorageConfig::InMemory).unwrap(),
            r#"{"type":"InMemory"}"#
        );
    }

    #[test]
    fn test_builder_open_file() {
        let tmpfile = NamedTempFile::new().unwrap();
        let db = MetricsDatabaseBuilder::new()
            .path(tmpfile.path())
            .open()
            .unwrap();
        assert!(db.metric_names().unwrap().is_empty());
    }

    #[test]
    fn test_temporary_database() {
        let db = MetricsDatabaseBuilder::new().temporary().open().unwrap();
        db.observe("lat", 1.0, crate::LabelSet::null()).unwrap();
        assert_eq!(db.metric_names().unwrap(), vec!["lat"]);
    }
}
