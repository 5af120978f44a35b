//! MockProvider — deterministic `LlmProvider` for tests. Scripts a fixed
//! sequence of `StreamDelta`s per call, round-robin across calls so a test
//! can drive multiple turns without network access.

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct MockProvider {
    scripts: Mutex<Vec<Vec<StreamDelta>>>,
    call_count: AtomicUsize,
    models: Vec<&'static str>,
}

impl MockProvider {
    /// A provider that always runs the same script, regardless of call count.
    pub fn repeating(script: Vec<StreamDelta>) -> Self {
        Self {
            scripts: Mutex::new(vec![script]),
            call_count: AtomicUsize::new(0),
            models: vec!["mock-model"],
        }
    }

    /// A provider that runs a distinct script per call, in order. The last
    /// script repeats once the list is exhausted.
    pub fn scripted(scripts: Vec<Vec<StreamDelta>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            call_count: AtomicUsize::new(0),
            models: vec!["mock-model"],
        }
    }

    pub fn calls_made(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn models(&self) -> &[&str] {
        &self.models
    }

    fn supports_model(&self, _model: &str) -> bool {
        true
    }

    async fn complete_stream(
        &self,
        _request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        if let Some(token) = &cancel {
            if token.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
        }

        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        let scripts = self.scripts.lock().expect("mock provider lock poisoned");
        let script = scripts
            .get(idx)
            .or_else(|| scripts.last())
            .cloned()
            .unwrap_or_default();

        let stream = async_stream::stream! {
            for delta in script {
                if let Some(token) = &cancel {
                    if token.is_cancelled() {
                        yield Err(LlmError::Cancelled);
                        return;
                    }
                }
                yield Ok(delta);
            }
        };

        Ok(Box::pin(stream))
    }
}
