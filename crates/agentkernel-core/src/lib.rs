//! agentkernel-core — shared types, error taxonomy, wire protocol, and the
//! narrow collaborator traits other crates depend on.

pub mod error;
pub mod event_log;
pub mod handle;
pub mod protocol;
pub mod types;

pub use error::{Error, Result};
pub use event_log::EventLog;
pub use handle::{KernelHandle, SpawnError};
pub use protocol::*;
pub use types::*;
