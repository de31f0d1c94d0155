use thiserror::Error;

/// Failure kinds for the persistence layer.
///
/// Read paths on `CategoryStore` convert these to default-safe values (empty
/// sequence, `false`) at the operation boundary; mutating paths and the
/// coordinator return them so callers and tests can inspect the kind.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stored JSON was malformed. Treated as empty data by read paths.
    #[error("stored value under '{key}' is not valid JSON: {source}")]
    ParseFailure {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backing store rejected a write because space is exhausted.
    /// Triggers cleanup-and-warn in the coordinator's flush path.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// An import payload had neither the partitioned nor the legacy shape.
    #[error("unrecognized import format")]
    ImportFormatInvalid,

    /// Legacy-blob migration failed. Logged at startup, never blocks load.
    #[error("legacy data migration failed: {0}")]
    MigrationFailure(String),

    /// No backup slot exists. User-visible info, not an error.
    #[error("no backup found")]
    BackupNotFound,

    /// Any other failure from the backing store.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl StoreError {
    /// Maps SQLite full-disk/full-database result codes to `QuotaExceeded`
    /// so the flush path can react to them specifically.
    pub(crate) fn from_sqlite(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            if matches!(e.code, rusqlite::ErrorCode::DiskFull) {
                return StoreError::QuotaExceeded;
            }
        }
        StoreError::Storage(err)
    }

    pub(crate) fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded)
    }
}
