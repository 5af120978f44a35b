//! Provider adapters with streaming support — the ProviderAdapter collaborator.

pub mod adapter;
pub mod anthropic;
pub mod mock;
pub mod provider;
pub mod types;

pub use adapter::{ProviderAdapter, StreamChunk};
pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use provider::{LlmError, LlmProvider, LlmResult, LlmStream};
pub use types::*;
