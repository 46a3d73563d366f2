//! Peering workflows
//!
//! The session state machine lives in `session`; the email and autopeer
//! drivers layer notification/remote-API behavior on top of the same
//! forward-only transitions.

pub mod autopeer;
pub mod email;
pub mod session;

pub use autopeer::AutopeerWorkflow;
pub use email::EmailWorkflow;
pub use session::{SessionWorkflow, WorkflowOutcome, WorkflowStep};
