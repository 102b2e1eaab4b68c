use thiserror::Error;

/// Failure of the durable storage backend itself.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The browser-equivalent quota failure: the backend refused the write.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal failure of a single legacy-migration call. The caller gets a
/// distinguishable error instead of silently partially-migrated data.
#[derive(Debug, Error)]
#[error("data migration failed: {message}")]
pub struct MigrationError {
    pub message: String,
}

impl MigrationError {
    pub fn new(message: impl Into<String>) -> MigrationError {
        MigrationError {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the class store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid class name: {reason}")]
    InvalidClassName { reason: String },

    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// The serialized document exceeds the storage ceiling or the backend
    /// reported a quota failure. State is not rolled back; the user should
    /// export and prune before retrying.
    #[error("storage full: export your data and delete old classes, then retry")]
    StorageFull,

    #[error("unrecognized data format")]
    InvalidFormat,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}
