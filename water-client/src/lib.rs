//! Data-access client for the water-treatment reading store.
//!
//! `domain` holds the per-day records exactly as the data-entry path stores
//! them; `db` holds the SQL used to read them back. Nothing here derives
//! business metrics.

pub mod db;
pub mod domain;
pub mod error;

pub use error::ClientError;
