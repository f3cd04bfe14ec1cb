//! Streaming event types for incremental provider responses.
//!
//! The ReAct runtime's `think` phase consumes a [`ProviderStream`] and
//! turns each [`StreamEvent`] into a `node-output-delta` event (§4.5).

use std::fmt;
use std::pin::Pin;

use futures_util::Stream;

use crate::types::{ProviderResponse, TokenUsage};

/// Error information carried by a [`StreamEvent::Error`].
#[derive(Debug, Clone)]
pub struct StreamError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the error is retryable (e.g. rate limit, transient network).
    pub is_retryable: bool,
}

impl StreamError {
    /// Build a non-retryable stream error.
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: false,
        }
    }

    /// Build a retryable stream error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: true,
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// An event emitted during a streaming completion.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content.
    TextDelta(String),
    /// Incremental thinking/reasoning content.
    ThinkingDelta(String),
    /// A tool use block has started.
    ToolUseStart {
        /// Tool call identifier.
        id: String,
        /// Tool name.
        name: String,
    },
    /// Incremental tool input JSON.
    ToolUseInputDelta {
        /// Tool call identifier (matches `ToolUseStart.id`).
        id: String,
        /// JSON fragment.
        delta: String,
    },
    /// A tool use block has ended.
    ToolUseEnd {
        /// Tool call identifier.
        id: String,
    },
    /// Token usage statistics, emitted once the provider reports them.
    Usage(TokenUsage),
    /// The fully assembled response, sent once at the end of the stream.
    MessageComplete(ProviderResponse),
    /// An error occurred during streaming. Terminates the stream.
    Error(StreamError),
}

/// A boxed stream of provider events, as returned by
/// [`Provider::complete_stream`](crate::Provider::complete_stream).
pub type ProviderStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;
