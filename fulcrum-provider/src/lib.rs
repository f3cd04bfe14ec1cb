#![deny(missing_docs)]
//! Streaming LLM provider port and wire types.
//!
//! This crate defines the seam between the ReAct runtime and whatever
//! actually talks to a model. Concrete providers (Anthropic, OpenAI,
//! Ollama, a test double) live outside this workspace and implement
//! [`Provider`] against the wire types in [`types`].

mod provider;
mod stream;
mod types;

pub use provider::{Provider, ProviderError};
pub use stream::{ProviderStream, StreamError, StreamEvent};
pub use types::{
    ContentPart, ImageSource, ProviderMessage, ProviderRequest, ProviderResponse,
    ProviderStopReason, Role, TokenUsage, ToolSchema,
};
