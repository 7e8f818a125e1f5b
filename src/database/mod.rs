//! utags-store persistence layer.
//!
//! Provides SQLite-backed key/value storage and SQL schema migrations.
//!
//! # Usage
//!
//! ```no_run
//! use utags_store::database::Storage;
//!
//! // Open persistent storage
//! let storage = Storage::open("utags.db").expect("failed to open storage");
//!
//! // Or use an in-memory database for testing
//! let storage = Storage::open_in_memory().expect("failed to open in-memory storage");
//!
//! let _ = storage.set("extension.utags.urlmap", "{}");
//! ```

pub mod connection;
pub mod migrations;

pub use connection::Storage;
