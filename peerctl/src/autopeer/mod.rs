//! Autopeer remote API
//!
//! Some networks expose a machine-peering endpoint instead of a NOC
//! mailbox. The client here talks to that endpoint; every outbound
//! payload is validated against the published schema before it leaves
//! the process.

pub mod client;
pub mod schema;

pub use client::AutopeerClient;
pub use schema::{SessionProposal, SessionStatusReport};
