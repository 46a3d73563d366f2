//! peerctl - BGP peering management service
//!
//! Tracks networks, policies, ports and peer sessions, and drives the
//! peering workflows (email and autopeer) over reference data read from
//! the sibling pdbctl/ixctl/devicectl services.

pub mod api;
pub mod autopeer;
pub mod bridge;
pub mod email;
pub mod error;
pub mod models;
pub mod refs;
pub mod tasks;
pub mod workflow;

pub use error::{Error, Result};
