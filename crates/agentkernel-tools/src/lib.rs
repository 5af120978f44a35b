//! agentkernel-tools — the closed built-in tool set plus declarative
//! custom-tool execution. Everything here is pure dispatch: gating decisions
//! (PolicyGate) are made upstream by the ActivationLoop before a call ever
//! reaches `ToolDispatcher::dispatch`.

pub mod custom_tool;
pub mod dispatcher;
pub mod web;

pub use dispatcher::{ToolDispatcher, ToolOutcome};
pub use web::{ReqwestWebAccess, WebAccess};
