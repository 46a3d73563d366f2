//! Shared foundation for the peerctl service
//!
//! Holds the pieces the service crate and its tests both need: the common
//! error type, configuration loading, the composite reference-id value type
//! and database initialization.

pub mod config;
pub mod db;
pub mod error;
pub mod ref_id;

pub use error::{Error, Result};
pub use ref_id::{RefId, RefSource};
