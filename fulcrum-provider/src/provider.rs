//! Object-safe, streaming LLM provider port.
//!
//! Unlike the non-object-safe RPITIT provider trait some sibling crates in
//! this workspace's lineage use, the engine needs to inject a provider
//! behind a trait object (the coordinator wires one per session, possibly
//! swapped between runs) and needs incremental output for `node-output-
//! delta` events — so this trait is `#[async_trait]` and returns a boxed
//! stream rather than a single future.

use async_trait::async_trait;
use futures_util::StreamExt;
use thiserror::Error;

use fulcrum_proto::CancellationToken;

use crate::stream::{ProviderStream, StreamEvent};
use crate::types::{ProviderRequest, ProviderResponse};

/// Errors from LLM providers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP or network request failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Provider rate-limited the request.
    #[error("rate limited")]
    RateLimited,

    /// Authentication/authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// Could not parse the provider's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request was cancelled before the provider responded.
    #[error("cancelled")]
    Cancelled,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether retrying this request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::RequestFailed(_)
        )
    }
}

/// LLM provider interface.
///
/// Each backing provider (Anthropic-, OpenAI-, Ollama-shaped, or a test
/// double) implements this trait. Provider-native features (truncation,
/// prompt caching, thinking blocks) are handled by the implementation
/// using [`ProviderRequest::extra`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send a completion request and stream back incremental events,
    /// terminated by exactly one [`StreamEvent::MessageComplete`] or
    /// [`StreamEvent::Error`].
    async fn complete_stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError>;

    /// Convenience wrapper that drains [`complete_stream`](Self::complete_stream)
    /// and returns the assembled response. Callers that don't need
    /// incremental deltas (tests, single-shot tools) can use this instead
    /// of consuming the stream themselves.
    async fn complete(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut stream = self.complete_stream(request, cancel).await?;
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::MessageComplete(response) => return Ok(response),
                StreamEvent::Error(err) => {
                    return Err(ProviderError::RequestFailed(err.message));
                }
                _ => continue,
            }
        }
        Err(ProviderError::InvalidResponse(
            "stream ended without a MessageComplete event".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProviderStopReason, TokenUsage};
    use futures_util::stream;
    use std::sync::Arc;

    struct ScriptedProvider {
        events: Vec<StreamEvent>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn complete_stream(
            &self,
            _request: ProviderRequest,
            _cancel: CancellationToken,
        ) -> Result<ProviderStream, ProviderError> {
            Ok(Box::pin(stream::iter(self.events.clone())))
        }
    }

    impl Clone for StreamEvent {
        fn clone(&self) -> Self {
            match self {
                StreamEvent::TextDelta(s) => StreamEvent::TextDelta(s.clone()),
                StreamEvent::ThinkingDelta(s) => StreamEvent::ThinkingDelta(s.clone()),
                StreamEvent::ToolUseStart { id, name } => StreamEvent::ToolUseStart {
                    id: id.clone(),
                    name: name.clone(),
                },
                StreamEvent::ToolUseInputDelta { id, delta } => StreamEvent::ToolUseInputDelta {
                    id: id.clone(),
                    delta: delta.clone(),
                },
                StreamEvent::ToolUseEnd { id } => StreamEvent::ToolUseEnd { id: id.clone() },
                StreamEvent::Usage(u) => StreamEvent::Usage(*u),
                StreamEvent::MessageComplete(r) => StreamEvent::MessageComplete(r.clone()),
                StreamEvent::Error(e) => StreamEvent::Error(e.clone()),
            }
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: None,
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            system: None,
            request_id: "req-1".into(),
            extra: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn complete_drains_stream_to_final_response() {
        let response = ProviderResponse {
            content: vec![],
            stop_reason: ProviderStopReason::EndTurn,
            usage: TokenUsage::default(),
            model: "test-model".into(),
            cost: None,
            truncated: None,
        };
        let provider = ScriptedProvider {
            events: vec![
                StreamEvent::TextDelta("hello".into()),
                StreamEvent::MessageComplete(response.clone()),
            ],
        };

        let out = provider
            .complete(request(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.model, "test-model");
    }

    #[tokio::test]
    async fn complete_surfaces_stream_error() {
        let provider = ScriptedProvider {
            events: vec![StreamEvent::Error(crate::stream::StreamError::non_retryable(
                "boom",
            ))],
        };

        let err = provider
            .complete(request(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RequestFailed(_)));
    }

    #[test]
    fn provider_is_object_safe() {
        fn _assert<T: ?Sized>() {}
        _assert::<dyn Provider>();
        fn _assert_arc(_: Arc<dyn Provider>) {}
    }
}
