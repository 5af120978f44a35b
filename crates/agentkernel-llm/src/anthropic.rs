//! Anthropic Claude API provider with SSE streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta, Usage};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str { "anthropic" }

    fn models(&self) -> &[&str] {
        &[
            "claude-opus-4-1-20250805",
            "claude-opus-4-1",
            "claude-3-5-haiku-20241022",
        ]
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        // Heal any orphaned tool_use blocks before sending
        let healed_messages = crate::types::validate_and_heal_messages(&request.messages);

        let mut messages: Vec<AnthropicMessage> = healed_messages.iter().map(|m| AnthropicMessage {
            role: m.role.clone(),
            content: match &m.content {
                crate::types::LlmContent::Text(s) => serde_json::json!(s),
                crate::types::LlmContent::Blocks(blocks) => serde_json::to_value(blocks).unwrap_or_default(),
            },
            model_side_state: None,
        }).collect();
        // The opaque continuation blob (e.g. a thought signature) belongs
        // with the assistant turn it was produced for — attach it to the
        // most recent assistant message so it rides back out verbatim.
        if let Some(state) = &request.model_side_state {
            if let Some(last_assistant) = messages.iter_mut().rev().find(|m| m.role == "assistant") {
                last_assistant.model_side_state = Some(state.clone());
            }
        }

        let body = AnthropicRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(8192),
            stream: true,
            system: request.system.clone(),
            tools: request.tools.as_ref().map(|tools| {
                tools.iter().map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                }).collect()
            }),
        };

        debug!("Anthropic request: model={}", body.model);

        if let Some(token) = &cancel {
            if token.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
        }

        let request_fut = self.client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let response = match &cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(LlmError::Cancelled),
                result = request_fut => result?,
            },
            None => request_fut.await?,
        };

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);

            if status.as_u16() == 401 {
                return Err(LlmError::AuthFailed(error_text));
            } else if status.as_u16() == 429 {
                return Err(LlmError::RateLimited { retry_after_ms: 60000 });
            } else {
                return Err(LlmError::RequestFailed(format!("{}: {}", status, error_text)));
            }
        }

        let stream = parse_sse_stream(response.bytes_stream(), cancel);
        Ok(Box::pin(stream))
    }
}

fn parse_sse_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    cancel: Option<CancellationToken>,
) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        let mut buffer = String::new();
        let mut current_tool_id: Option<String> = None;
        let mut latest_usage: Option<Usage> = None;

        tokio::pin!(bytes_stream);

        loop {
            let chunk_result = match &cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        yield Err(LlmError::Cancelled);
                        return;
                    }
                    next = bytes_stream.next() => next,
                },
                None => bytes_stream.next().await,
            };
            let Some(chunk_result) = chunk_result else { break };

            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    continue;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(event_end) = buffer.find("\n\n") {
                let event_str = buffer[..event_end].to_string();
                buffer = buffer[event_end + 2..].to_string();

                let mut event_type = String::new();
                let mut event_data = String::new();

                for line in event_str.lines() {
                    if let Some(rest) = line.strip_prefix("event: ") {
                        event_type = rest.to_string();
                    } else if let Some(rest) = line.strip_prefix("data: ") {
                        event_data = rest.to_string();
                    }
                }

                if event_data.is_empty() { continue; }

                match event_type.as_str() {
                    "content_block_start" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockStart>(&event_data) {
                            match data.content_block {
                                ContentBlockType::ToolUse { id, name } => {
                                    current_tool_id = Some(id.clone());
                                                    yield Ok(StreamDelta::ToolCallStart { id, name });
                                }
                                ContentBlockType::Text { .. } => {}
                            }
                        }
                    }
                    "content_block_delta" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockDelta>(&event_data) {
                            match data.delta {
                                DeltaType::TextDelta { text } => {
                                    yield Ok(StreamDelta::Text(text));
                                }
                                DeltaType::ThinkingDelta { thinking } => {
                                    yield Ok(StreamDelta::Thinking(thinking));
                                }
                                DeltaType::InputJsonDelta { partial_json } => {
                                    if let Some(id) = &current_tool_id {
                                        yield Ok(StreamDelta::ToolCallDelta {
                                            id: id.clone(),
                                            arguments: partial_json,
                                        });
                                    }
                                }
                                DeltaType::SignatureDelta { signature } => {
                                    yield Ok(StreamDelta::ModelSideState(serde_json::json!({
                                        "signature": signature,
                                    })));
                                }
                            }
                        }
                    }
                    "content_block_stop" => {
                        if let Some(id) = current_tool_id.take() {
                            yield Ok(StreamDelta::ToolCallEnd { id });

                        }
                    }
                    "message_delta" => {
                        if let Ok(data) = serde_json::from_str::<MessageDelta>(&event_data) {
                            if let Some(stop_reason) = &data.delta.stop_reason {
                                debug!("Message complete: stop_reason={}", stop_reason);
                            }
                            if data.usage.is_some() {
                                latest_usage = data.usage;
                            }
                        }
                    }
                    "message_stop" => {
                        yield Ok(StreamDelta::Done {
                            stop_reason: Some("end_turn".to_string()),
                            usage: latest_usage.take(),
                        });
                    }
                    "error" => {
                        if let Ok(data) = serde_json::from_str::<ErrorEvent>(&event_data) {
                            yield Err(LlmError::StreamError(data.error.message));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
    /// Opaque provider continuation state carried on an assistant turn.
    /// Never read by the kernel — round-tripped verbatim from a prior
    /// `StreamDelta::ModelSideState`.
    #[serde(skip_serializing_if = "Option::is_none")]
    model_side_state: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct ContentBlockStart {
    #[allow(dead_code)]
    index: u32,
    content_block: ContentBlockType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlockType {
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(rename = "text")]
    #[allow(dead_code)]
    Text { text: String },
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    #[allow(dead_code)]
    index: u32,
    delta: DeltaType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeltaType {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(rename = "signature_delta")]
    SignatureDelta { signature: String },
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[allow(dead_code)]
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn sse_stream(frames: Vec<&str>) -> impl futures::Stream<Item = Result<Bytes, reqwest::Error>> {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = frames
            .into_iter()
            .map(|f| Ok(Bytes::from(f.to_string())))
            .collect();
        futures::stream::iter(chunks)
    }

    async fn collect_deltas(frames: Vec<&str>) -> Vec<StreamDelta> {
        let stream = parse_sse_stream(sse_stream(frames), None);
        tokio::pin!(stream);
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.expect("no stream errors in this fixture"));
        }
        out
    }

    #[tokio::test]
    async fn message_delta_usage_survives_to_done() {
        let deltas = collect_deltas(vec![
            "event: message_delta\ndata: {\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":42}}\n\n",
            "event: message_stop\ndata: {}\n\n",
        ])
        .await;

        assert_eq!(deltas.len(), 1);
        match &deltas[0] {
            StreamDelta::Done { stop_reason, usage } => {
                assert_eq!(stop_reason.as_deref(), Some("end_turn"));
                let usage = usage.as_ref().expect("usage from message_delta should propagate");
                assert_eq!(usage.output_tokens, 42);
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn text_and_tool_call_deltas_decode_in_order() {
        let deltas = collect_deltas(vec![
            "event: content_block_start\ndata: {\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"tu_1\",\"name\":\"vfs_read\"}}\n\n",
            "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{}\"}}\n\n",
            "event: content_block_stop\ndata: {\"index\":0}\n\n",
            "event: content_block_delta\ndata: {\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n",
        ])
        .await;

        assert!(matches!(deltas[0], StreamDelta::ToolCallStart { ref id, ref name } if id == "tu_1" && name == "vfs_read"));
        assert!(matches!(deltas[1], StreamDelta::ToolCallDelta { ref id, ref arguments } if id == "tu_1" && arguments == "{}"));
        assert!(matches!(deltas[2], StreamDelta::ToolCallEnd { ref id } if id == "tu_1"));
        assert!(matches!(deltas[3], StreamDelta::Text(ref t) if t == "hi"));
    }

    #[tokio::test]
    async fn signature_delta_yields_model_side_state() {
        let deltas = collect_deltas(vec![
            "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"signature_delta\",\"signature\":\"abc123\"}}\n\n",
        ])
        .await;

        assert_eq!(deltas.len(), 1);
        match &deltas[0] {
            StreamDelta::ModelSideState(value) => {
                assert_eq!(value["signature"], "abc123");
            }
            other => panic!("expected ModelSideState, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_event_yields_stream_error() {
        let stream = parse_sse_stream(
            sse_stream(vec![
                "event: error\ndata: {\"error\":{\"type\":\"overloaded_error\",\"message\":\"overloaded\"}}\n\n",
            ]),
            None,
        );
        tokio::pin!(stream);
        let first = stream.next().await.expect("one event");
        match first {
            Err(LlmError::StreamError(msg)) => assert_eq!(msg, "overloaded"),
            other => panic!("expected StreamError, got {:?}", other),
        }
    }
}
