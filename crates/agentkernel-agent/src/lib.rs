//! agentkernel-agent — Session/SessionStore, the ActivationLoop, the
//! Scheduler (the kernel proper), and ReplayController.

pub mod activation_loop;
pub mod replay;
pub mod scheduler;
pub mod session;

pub use activation_loop::drive;
pub use replay::{replay_from, restore_from, ReplayOutcome};
pub use scheduler::Scheduler;
pub use session::{Session, SessionChange, SessionStore};
