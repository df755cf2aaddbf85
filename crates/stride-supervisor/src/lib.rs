//! Stride Supervisor
//!
//! Runs one step in an isolated OS process. The supervisor owns an explicit
//! message channel to the child (tagged JSON frames over the child's
//! stdio), forwards the child's lifecycle events upward, and enforces an
//! adaptive liveness deadline: progress signals from the child push the
//! deadline out, silence past the deadline kills the process.

mod child;
mod error;
mod protocol;
mod supervisor;

pub use child::run_step_host;
pub use error::SupervisorError;
pub use protocol::{Message, StartPayload};
pub use supervisor::{supervise, Supervised, SupervisorConfig};
