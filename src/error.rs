use thiserror::Error;

/// Result type used throughout the library.
pub type GeoCoverResult<T> = Result<T, GeoCoverError>;

/// Everything that can go wrong while building or persisting clusters.
#[derive(Debug, Error)]
pub enum GeoCoverError {
    /// The store failed to read or write.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The coverage radius must be a finite, non-negative number of kilometers.
    #[error("invalid coverage radius: {0} km")]
    InvalidRadius(f64),

    /// Two input points carried the same id, so coverage signatures would be ambiguous.
    #[error("duplicate point id: {0}")]
    DuplicatePoint(i64),

    /// A row in the store could not be interpreted.
    #[error("corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },

    /// No cluster with this id exists in the store.
    #[error("unknown cluster: {0}")]
    UnknownCluster(u32),

    /// A staleness window so long the cutoff falls outside the representable dates.
    #[error("stale window out of range: {0}")]
    InvalidStaleWindow(chrono::Duration),

    /// A scrape status string that isn't one of the known values.
    #[error("invalid scrape status: {0}")]
    InvalidStatus(String),
}
