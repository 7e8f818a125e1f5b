use std::fmt;

// === StorageError ===

/// Errors from the key/value persistence layer.
#[derive(Debug)]
pub enum StorageError {
    /// Underlying SQLite operation failed.
    DatabaseError(String),
    /// Stored value could not be encoded or decoded.
    SerializationError(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

// === MigrationError ===

/// Errors raised while upgrading a loaded store to the current schema.
#[derive(Debug)]
pub enum MigrationError {
    /// The stored database version is older than current but no migration
    /// path is known for it. Never coerced silently.
    UnsupportedVersion(u32),
    /// The loaded blob does not have a recognizable store shape.
    InvalidStore(String),
    /// Persistence failed mid-migration.
    Storage(String),
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::UnsupportedVersion(v) => {
                write!(f, "Unsupported database version: {}", v)
            }
            MigrationError::InvalidStore(msg) => write!(f, "Invalid store data: {}", msg),
            MigrationError::Storage(msg) => write!(f, "Storage error during migration: {}", msg),
        }
    }
}

impl std::error::Error for MigrationError {}

// === StoreError ===

/// Errors from bookmark store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Persistence layer failed.
    Storage(String),
    /// Store blob could not be encoded or decoded.
    Serialization(String),
    /// The persisted store was written by a newer build. The host should
    /// restart so the newer code can own the data; merging backward is
    /// never attempted.
    NewerSchema(u32),
    /// Migration to the current schema failed.
    Migration(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            StoreError::NewerSchema(v) => write!(
                f,
                "Database version {} is newer than this build supports; reload required",
                v
            ),
            StoreError::Migration(msg) => write!(f, "Migration failed: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DatabaseError(msg) => StoreError::Storage(msg),
            StorageError::SerializationError(msg) => StoreError::Serialization(msg),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<MigrationError> for StoreError {
    fn from(err: MigrationError) -> Self {
        StoreError::Migration(err.to_string())
    }
}

// === SyncError ===

/// Errors surfaced in sync bridge responses.
#[derive(Debug)]
pub enum SyncError {
    /// Optimistic-concurrency check failed; no write occurred.
    Conflict(String),
    /// The userscript host did not answer the availability probe.
    HostUnavailable,
    /// The request payload is missing or malformed.
    InvalidPayload(String),
    /// The underlying store operation failed.
    Store(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Conflict(msg) => write!(f, "Sync conflict: {}", msg),
            SyncError::HostUnavailable => write!(f, "userscript not available"),
            SyncError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            SyncError::Store(msg) => write!(f, "Store error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err.to_string())
    }
}
