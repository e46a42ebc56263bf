use std::fmt;
use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by ingest and query operations.
#[derive(Debug)]
pub enum Error {
    /// No series matched the requested metric name and label filter.
    MetricNotFound {
        /// Requested metric name.
        name: String,
        /// Display form of the label filter that failed to match.
        filter: String,
        /// Canonical label-sets recorded under `name`, if any.
        available: Vec<String>,
    },
    /// An argument was outside the accepted domain.
    InvalidArgument(String),
    /// The storage engine reported a failure.
    Storage(redb::Error),
    /// An I/O error occurred.
    Io(io::Error),
}

impl Error {
    pub(crate) fn not_found(
        name: impl Into<String>,
        filter: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Error::MetricNotFound {
            name: name.into(),
            filter: filter.into(),
            available,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MetricNotFound {
                name,
                filter,
                available,
            } => {
                if available.is_empty() {
                    write!(f, "metric '{name}' is not recorded in the database")
                } else {
                    write!(
                        f,
                        "metric '{name}' with labels {filter} cannot be found; recorded label-sets: [{}]",
                        available.join(", ")
                    )
                }
            }
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::Storage(e) => write!(f, "storage error: {e}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<redb::Error> for Error {
    fn from(err: redb::Error) -> Self {
        Error::Storage(err)
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
