//! Fernline core: local DuckDB store access and the plugin-table
//! migration engine.
//!
//! The store lives under the fernline data directory and may be at-rest
//! encrypted, in which case the key is derived from the user password
//! with Argon2id and handed to DuckDB as a hex `ENCRYPTION_KEY` at
//! attach time.

pub mod encryption;
pub mod error;
pub mod migrate;
pub mod paths;
pub mod store;

pub use error::StoreError;
