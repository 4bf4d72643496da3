//! Real-time Bitcoin network feed ingestion
//!
//! Subscribes to a push feed of unconfirmed transactions and blocks, keeps a
//! bounded SQLite history and publishes running network statistics.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod sqlite_pragma;
pub mod streamer_core;
