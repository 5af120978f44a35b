//! ProviderAdapter — coalesces a provider's `StreamDelta` wire format into
//! the kernel-facing `StreamChunk` contract.

use crate::provider::{LlmError, LlmProvider, LlmResult};
use crate::types::{AccumulatedToolCall, LlmRequest, StreamDelta, Usage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A coalesced unit handed to the ActivationLoop. Thinking deltas are folded
/// into `Text` — the kernel's data model has no separate "thinking" channel.
#[derive(Clone, Debug)]
pub enum StreamChunk {
    Text(String),
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    Done {
        stop_reason: Option<String>,
        output_tokens: u32,
        model_side_state: Option<serde_json::Value>,
    },
    Error(String),
}

/// Stateless wrapper around a concrete `LlmProvider`. Per-session state
/// (message history, `modelSideState`) lives in `SessionStore`; the adapter
/// only owns HTTP client configuration, shared via `Arc` across every
/// ActivationLoop in the kernel.
pub struct ProviderAdapter {
    provider: Arc<dyn LlmProvider>,
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.provider.supports_model(model)
    }

    /// Runs one turn to completion, coalescing the delta stream into
    /// `StreamChunk`s and invoking `on_chunk` for each. Returns the final
    /// output token count reported by the provider's `Done` delta (output
    /// tokens are the only figure the kernel tracks against `tokenBudget`,
    /// input tokens are the provider's concern, not the output-token budget's).
    pub async fn complete(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
        mut on_chunk: impl FnMut(StreamChunk),
    ) -> LlmResult<u32> {
        use futures::StreamExt;

        let mut stream = self.provider.complete_stream(request, cancel).await?;
        let mut tool_calls: HashMap<String, AccumulatedToolCall> = HashMap::new();
        let mut tool_order: Vec<String> = Vec::new();
        let mut output_tokens = 0u32;
        let mut model_side_state: Option<serde_json::Value> = None;

        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::Text(text) | StreamDelta::Thinking(text) => {
                    on_chunk(StreamChunk::Text(text));
                }
                StreamDelta::ModelSideState(state) => {
                    model_side_state = Some(state);
                }
                StreamDelta::ToolCallStart { id, name } => {
                    tool_order.push(id.clone());
                    tool_calls.insert(
                        id.clone(),
                        AccumulatedToolCall {
                            id,
                            name,
                            arguments: String::new(),
                        },
                    );
                }
                StreamDelta::ToolCallDelta { id, arguments } => {
                    if let Some(call) = tool_calls.get_mut(&id) {
                        call.arguments.push_str(&arguments);
                    }
                }
                StreamDelta::ToolCallEnd { id } => {
                    if let Some(call) = tool_calls.remove(&id) {
                        let input = call.parse_arguments().unwrap_or_else(|e| {
                            serde_json::json!({ "_parse_error": e.to_string() })
                        });
                        on_chunk(StreamChunk::ToolCall {
                            id: call.id,
                            name: call.name,
                            input,
                        });
                    }
                }
                StreamDelta::Done { stop_reason, usage } => {
                    output_tokens = usage.as_ref().map(|u: &Usage| u.output_tokens).unwrap_or(0);
                    on_chunk(StreamChunk::Done {
                        stop_reason,
                        output_tokens,
                        model_side_state: model_side_state.take(),
                    });
                }
                StreamDelta::Error(message) => {
                    on_chunk(StreamChunk::Error(message.clone()));
                    return Err(LlmError::StreamError(message));
                }
            }
        }

        // Any tool call whose `content_block_stop` never arrived (stream cut
        // mid-call) is flushed so the caller still sees a ToolCall chunk —
        // validate_and_heal_messages will attach a synthetic result on the
        // next turn if the caller never resolves it.
        for id in tool_order {
            if let Some(call) = tool_calls.remove(&id) {
                let input = call
                    .parse_arguments()
                    .unwrap_or_else(|e| serde_json::json!({ "_parse_error": e.to_string() }));
                on_chunk(StreamChunk::ToolCall {
                    id: call.id,
                    name: call.name,
                    input,
                });
            }
        }

        Ok(output_tokens)
    }
}
