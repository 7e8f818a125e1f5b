//! utags-store — persistent tag store with schema migration, usage
//! ranking, and a message-passing sync bridge for a companion web app.
//!
//! This library crate exposes all modules for use by host applications and
//! integration tests.

pub mod app;
pub mod database;
pub mod managers;
pub mod services;
pub mod types;
