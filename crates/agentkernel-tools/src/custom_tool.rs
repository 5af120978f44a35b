//! Declarative custom tools: "result of an LLM sub-call using the
//! template." An agent's front-matter declares `{name, description,
//! parameters, prompt_template, model?}`; invoking it fills the template
//! from the call's validated args and issues one recursive provider call —
//! no tool list of its own, no further nesting.

use agentkernel_core::types::CustomToolDefinition;
use agentkernel_llm::{LlmContent, LlmMessage, LlmRequest, ProviderAdapter, StreamChunk};
use std::sync::Arc;

/// Substitutes `{{param}}` placeholders in `template` with the
/// corresponding entry from `args` (stringified: strings inline verbatim,
/// everything else via `serde_json::Value`'s `Display`-like rendering).
fn fill_template(template: &str, args: &serde_json::Value) -> String {
    let mut out = template.to_string();
    if let Some(map) = args.as_object() {
        for (key, value) in map {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&format!("{{{{{key}}}}}"), &rendered);
        }
    }
    out
}

/// Runs one custom-tool invocation to completion and returns `(text,
/// output_tokens)`. `output_tokens` is folded into the caller's session
/// token count — a custom tool call is "counted against budget" like any other tool call.
pub async fn run_custom_tool(
    definition: &CustomToolDefinition,
    args: &serde_json::Value,
    provider: &Arc<ProviderAdapter>,
    fallback_model: &str,
) -> Result<(String, u32), String> {
    let prompt = fill_template(&definition.prompt_template, args);
    let model = definition
        .model
        .clone()
        .unwrap_or_else(|| fallback_model.to_string());

    let request = LlmRequest {
        model,
        messages: vec![LlmMessage {
            role: "user".to_string(),
            content: LlmContent::Text(prompt),
        }],
        tools: None,
        max_tokens: Some(4096),
        system: Some(format!(
            "You are the custom tool '{}': {}",
            definition.name, definition.description
        )),
        ..Default::default()
    };

    let mut text = String::new();
    let mut output_tokens = 0u32;
    let result = provider
        .complete(request, None, |chunk| match chunk {
            StreamChunk::Text(delta) => text.push_str(&delta),
            StreamChunk::Done { output_tokens: n, .. } => output_tokens = n,
            _ => {}
        })
        .await;

    match result {
        Ok(n) => Ok((text, if output_tokens > 0 { output_tokens } else { n })),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_string_and_scalar_placeholders() {
        let filled = fill_template(
            "Find: {{query}}, limit {{n}}",
            &serde_json::json!({"query": "rust crates", "n": 5}),
        );
        assert_eq!(filled, "Find: rust crates, limit 5");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let filled = fill_template("Hello {{name}}", &serde_json::json!({}));
        assert_eq!(filled, "Hello {{name}}");
    }
}
