//! Scripted completion doubles for tests and offline demos.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use carepod_core::completion::{CompletionRequest, CompletionResponse, CompletionService};
use carepod_core::error::CompletionError;

/// Returns a fixed sequence of responses, one per call; repeats the last
/// response once the script runs out.
pub struct ScriptedCompletion {
    script: Vec<String>,
    cursor: Mutex<usize>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<String>) -> Self {
        Self {
            script,
            cursor: Mutex::new(0),
        }
    }

    /// A single response repeated forever.
    pub fn single(text: impl Into<String>) -> Self {
        Self::new(vec![text.into()])
    }

    /// How many calls have been made.
    pub fn calls(&self) -> usize {
        *self.cursor.lock().unwrap()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let mut cursor = self.cursor.lock().unwrap();
        let index = (*cursor).min(self.script.len().saturating_sub(1));
        *cursor += 1;
        let text = self
            .script
            .get(index)
            .cloned()
            .ok_or_else(|| CompletionError::InvalidResponse("empty script".into()))?;
        Ok(CompletionResponse {
            text,
            model: "scripted".into(),
        })
    }
}

/// Always fails with the given error.
pub struct FailingCompletion {
    error: CompletionError,
}

impl FailingCompletion {
    pub fn new(error: CompletionError) -> Self {
        Self { error }
    }

    pub fn timeout() -> Self {
        Self::new(CompletionError::Timeout { budget_ms: 2000 })
    }
}

#[async_trait]
impl CompletionService for FailingCompletion {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        Err(self.error.clone())
    }
}

/// Sleeps far past any reasonable budget; used to exercise the
/// orchestrator's timeout path.
pub struct HangingCompletion;

#[async_trait]
impl CompletionService for HangingCompletion {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepod_core::completion::TurnIntent;

    fn request() -> CompletionRequest {
        CompletionRequest::new(TurnIntent::IntakeReply, "hello")
    }

    #[tokio::test]
    async fn scripted_walks_then_repeats() {
        let service = ScriptedCompletion::new(vec!["first".into(), "second".into()]);
        assert_eq!(service.complete(request()).await.unwrap().text, "first");
        assert_eq!(service.complete(request()).await.unwrap().text, "second");
        assert_eq!(service.complete(request()).await.unwrap().text, "second");
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test]
    async fn failing_returns_configured_error() {
        let service = FailingCompletion::timeout();
        let err = service.complete(request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Timeout { .. }));
    }
}
