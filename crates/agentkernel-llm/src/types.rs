//! LLM types for requests and streaming responses

use serde::{Deserialize, Serialize};

/// LLM request
#[derive(Clone, Debug, Serialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<LlmTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// The session's carried-forward `model_side_state`, handed to the
    /// provider so it can attach it to the outgoing request verbatim.
    /// `None` means no prior state has been recorded for this session yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_side_state: Option<serde_json::Value>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            model: "claude-opus-4-1-20250805".to_string(),
            messages: Vec::new(),
            tools: None,
            max_tokens: Some(8192),
            temperature: None,
            system: None,
            model_side_state: None,
        }
    }
}

/// Message in LLM conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: LlmContent,
}

/// Message content - can be string or array of blocks
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LlmContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for LlmContent {
    fn from(s: String) -> Self { LlmContent::Text(s) }
}

impl From<&str> for LlmContent {
    fn from(s: &str) -> Self { LlmContent::Text(s.to_string()) }
}

/// Content block types
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Tool definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Streaming delta from LLM
#[derive(Clone, Debug)]
pub enum StreamDelta {
    Text(String),
    Thinking(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, arguments: String },
    ToolCallEnd { id: String },
    /// An opaque provider continuation blob (e.g. a thought-signature) that
    /// must be preserved verbatim and replayed on the next turn. Never
    /// interpreted by the kernel — folded straight into `Session.model_side_state`.
    ModelSideState(serde_json::Value),
    Done { stop_reason: Option<String>, usage: Option<Usage> },
    Error(String),
}

/// Token usage
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Accumulated tool call from streaming
#[derive(Clone, Debug, Default)]
pub struct AccumulatedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl AccumulatedToolCall {
    pub fn parse_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// Repairs a message history so every `tool_use` block emitted by an
/// assistant turn has a matching `tool_result` in the following user turn.
///
/// A turn can be interrupted (cancellation, crash recovery) after the model
/// requested a tool call but before the result was recorded. The Anthropic
/// API rejects such a history outright, so any orphaned `tool_use` id is
/// healed here with a synthetic error result before the request is sent.
pub fn validate_and_heal_messages(messages: &[LlmMessage]) -> Vec<LlmMessage> {
    let mut healed = messages.to_vec();
    let mut i = 0;
    while i < healed.len() {
        let pending_ids: Vec<String> = if healed[i].role == "assistant" {
            match &healed[i].content {
                LlmContent::Blocks(blocks) => blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, .. } => Some(id.clone()),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            }
        } else {
            Vec::new()
        };

        if !pending_ids.is_empty() {
            let answered: std::collections::HashSet<String> = healed
                .get(i + 1)
                .filter(|m| m.role == "user")
                .map(|m| match &m.content {
                    LlmContent::Blocks(blocks) => blocks
                        .iter()
                        .filter_map(|b| match b {
                            ContentBlock::ToolResult { tool_use_id, .. } => {
                                Some(tool_use_id.clone())
                            }
                            _ => None,
                        })
                        .collect(),
                    _ => Default::default(),
                })
                .unwrap_or_default();

            let missing: Vec<ContentBlock> = pending_ids
                .into_iter()
                .filter(|id| !answered.contains(id))
                .map(|id| ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: "Tool call was interrupted before completion.".to_string(),
                    is_error: Some(true),
                })
                .collect();

            if !missing.is_empty() {
                let has_user_next = healed.get(i + 1).map(|m| m.role == "user").unwrap_or(false);
                if has_user_next {
                    match &mut healed[i + 1].content {
                        LlmContent::Blocks(blocks) => blocks.extend(missing),
                        other @ LlmContent::Text(_) => {
                            let text = match other {
                                LlmContent::Text(s) => s.clone(),
                                _ => unreachable!(),
                            };
                            let mut blocks = missing;
                            if !text.is_empty() {
                                blocks.insert(0, ContentBlock::Text { text });
                            }
                            *other = LlmContent::Blocks(blocks);
                        }
                    }
                } else {
                    healed.insert(
                        i + 1,
                        LlmMessage {
                            role: "user".to_string(),
                            content: LlmContent::Blocks(missing),
                        },
                    );
                }
            }
        }
        i += 1;
    }
    healed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heals_orphaned_tool_use_with_no_following_message() {
        let messages = vec![LlmMessage {
            role: "assistant".to_string(),
            content: LlmContent::Blocks(vec![ContentBlock::ToolUse {
                id: "tu_1".to_string(),
                name: "vfs_read".to_string(),
                input: serde_json::json!({}),
            }]),
        }];
        let healed = validate_and_heal_messages(&messages);
        assert_eq!(healed.len(), 2);
        assert_eq!(healed[1].role, "user");
        match &healed[1].content {
            LlmContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                matches!(blocks[0], ContentBlock::ToolResult { .. });
            }
            _ => panic!("expected blocks"),
        }
    }

    #[test]
    fn leaves_fully_answered_tool_use_untouched() {
        let messages = vec![
            LlmMessage {
                role: "assistant".to_string(),
                content: LlmContent::Blocks(vec![ContentBlock::ToolUse {
                    id: "tu_1".to_string(),
                    name: "vfs_read".to_string(),
                    input: serde_json::json!({}),
                }]),
            },
            LlmMessage {
                role: "user".to_string(),
                content: LlmContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: "tu_1".to_string(),
                    content: "ok".to_string(),
                    is_error: None,
                }]),
            },
        ];
        let healed = validate_and_heal_messages(&messages);
        assert_eq!(healed.len(), 2);
        match &healed[1].content {
            LlmContent::Blocks(blocks) => assert_eq!(blocks.len(), 1),
            _ => panic!("expected blocks"),
        }
    }
}
