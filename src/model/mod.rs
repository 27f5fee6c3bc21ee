//! Model layer: the chat-inference seam, the OpenAI-compatible client,
//! and the role-resolving gateway used by every agent node.

mod client;
mod gateway;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use client::{MessageBuilder, ModelClient, ModelConfig};
pub use gateway::{with_fallback, GatewayError, InferenceGateway, RoleBinding};

/// Model layer errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Max retries exceeded after {0} attempts: {1}")]
    MaxRetriesExceeded(u32, String),
}

/// A tool definition handed to providers that support native tool-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool's parameters.
    pub parameters: Value,
}

/// A tool invocation requested by the model, either natively or through the
/// manual JSON protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Per-call options for a chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Ask the provider for a JSON-object response.
    pub json_object: bool,
    /// Tool definitions for native tool-calling providers.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn json() -> Self {
        Self {
            json_object: true,
            ..Self::default()
        }
    }

    pub fn with_tools(tools: Vec<ToolDefinition>) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }
}

/// Response from a chat call.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Text content of the assistant message (may be empty on pure tool calls).
    pub content: String,
    /// Native tool calls, when the provider emitted them.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatResponse {
    /// Whether the response carries neither text nor tool calls.
    /// An empty response from a primary model is treated as a failure by the
    /// fallback discipline.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// The chat-inference seam. Implemented by [`ModelClient`] for real providers
/// and by scripted doubles in tests.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Send a conversation and get a response.
    ///
    /// `messages` are OpenAI-format message objects (see [`MessageBuilder`]).
    async fn chat(&self, messages: &[Value], options: &ChatOptions)
        -> Result<ChatResponse, ModelError>;

    /// Human-readable identifier for logs.
    fn describe(&self) -> String {
        "inference".to_string()
    }
}

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Decode a schema-constrained model response into a typed value.
///
/// Models wrap JSON in prose or code fences often enough that a bare
/// `from_str` is not good enough; try the raw text first, then a fenced
/// block, then the outermost brace span. Anything else is a decode error —
/// never a guess.
pub fn decode_structured<T: DeserializeOwned>(raw: &str) -> Result<T, ModelError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }

    if let Some(caps) = FENCED_JSON.captures(trimmed) {
        if let Ok(value) = serde_json::from_str::<T>(&caps[1]) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<T>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(ModelError::ParseError(format!(
        "response is not valid JSON for the expected schema: {}",
        truncate_for_log(trimmed, 200)
    )))
}

fn truncate_for_log(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
