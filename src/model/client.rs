//! OpenAI-compatible chat client used for every provider the gateway knows.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

use super::{ChatOptions, ChatResponse, Inference, ModelError, ToolCallRequest};

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Configuration for one provider/model pair.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Maximum number of retry attempts for failed requests.
    pub max_retries: u32,
    /// Delay between retry attempts in seconds.
    pub retry_delay_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model_name: "gpt-4.1".to_string(),
            max_tokens: 4096,
            temperature: 1.0,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl ModelConfig {
    /// Create a new ModelConfig with custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a new ModelConfig with custom API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Create a new ModelConfig with custom model name.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum number of retry attempts for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between retry attempts in seconds.
    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }
}

/// OpenAI API response structures.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    arguments: String,
}

/// Client for one OpenAI-compatible chat-completions endpoint.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    /// Create a new ModelClient with the given configuration.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Send a chat request with retry on transient failures.
    async fn request(
        &self,
        messages: &[Value],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ModelError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut body = json!({
            "messages": messages,
            "model": self.config.model_name,
            "max_tokens": self.config.max_tokens,
            "temperature": options.temperature.unwrap_or(self.config.temperature),
        });

        if let Value::Object(ref mut map) = body {
            if options.json_object {
                map.insert("response_format".to_string(), json!({"type": "json_object"}));
            }
            if !options.tools.is_empty() {
                let tools: Vec<Value> = options
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect();
                map.insert("tools".to_string(), Value::Array(tools));
            }
        }

        let mut last_error: Option<ModelError> = None;
        let max_attempts = self.config.max_retries + 1;

        for attempt in 1..=max_attempts {
            match self.send_request(&url, &body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let is_retryable = Self::is_retryable_error(&e);

                    if attempt < max_attempts && is_retryable {
                        tracing::warn!(
                            "model request failed (attempt {}/{}): {}, retrying in {}s",
                            attempt,
                            max_attempts,
                            e,
                            self.config.retry_delay_secs
                        );
                        sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                        last_error = Some(e);
                    } else if !is_retryable {
                        return Err(e);
                    } else {
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(ModelError::MaxRetriesExceeded(
            self.config.max_retries,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }

    /// Check if an error is retryable (network errors, timeouts, etc.)
    fn is_retryable_error(error: &ModelError) -> bool {
        match error {
            ModelError::RequestFailed(_) => true,
            ModelError::ApiError(msg) => {
                msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("timeout")
                    || msg.to_lowercase().contains("rate limit")
            }
            ModelError::ParseError(_) => false,
            ModelError::MaxRetriesExceeded(_, _) => false,
        }
    }

    /// Send a single request to the API.
    async fn send_request(&self, url: &str, body: &Value) -> Result<ChatResponse, ModelError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError(format!("{status}: {error_text}")));
        }

        let completion: ChatCompletionResponse = response.json().await?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(ModelError::ParseError("No choices in response".to_string()));
        };

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| {
                let parameters = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::Object(Default::default()));
                ToolCallRequest {
                    name: tc.function.name,
                    parameters,
                }
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

#[async_trait::async_trait]
impl Inference for ModelClient {
    async fn chat(
        &self,
        messages: &[Value],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ModelError> {
        self.request(messages, options).await
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.config.model_name, self.config.base_url)
    }
}

/// Helper for building conversation messages in OpenAI wire format.
pub struct MessageBuilder;

impl MessageBuilder {
    /// Create a system message.
    pub fn system(content: &str) -> Value {
        json!({
            "role": "system",
            "content": content
        })
    }

    /// Create a user message with optional base64 PNG image.
    pub fn user(text: &str, image_base64: Option<&str>) -> Value {
        let mut content = Vec::new();

        if let Some(img_data) = image_base64 {
            content.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/png;base64,{}", img_data)
                }
            }));
        }

        content.push(json!({
            "type": "text",
            "text": text
        }));

        json!({
            "role": "user",
            "content": content
        })
    }

    /// Create an assistant message.
    pub fn assistant(content: &str) -> Value {
        json!({
            "role": "assistant",
            "content": content
        })
    }

    /// Create a tool-result message.
    pub fn tool(name: &str, content: &str) -> Value {
        json!({
            "role": "tool",
            "name": name,
            "content": content
        })
    }

    /// Remove image content from a message to save context space.
    pub fn remove_images(message: &mut Value) {
        if let Some(Value::Array(arr)) = message.get_mut("content") {
            arr.retain(|item| {
                item.get("type")
                    .and_then(|t| t.as_str())
                    .map(|t| t == "text")
                    .unwrap_or(false)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_builder() {
        let config = ModelConfig::default()
            .with_base_url("http://localhost:8000/v1")
            .with_model_name("local-model")
            .with_temperature(0.0)
            .with_max_retries(5);

        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.model_name, "local-model");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ModelClient::is_retryable_error(&ModelError::ApiError(
            "503 Service Unavailable".into()
        )));
        assert!(ModelClient::is_retryable_error(&ModelError::ApiError(
            "rate limit hit".into()
        )));
        assert!(!ModelClient::is_retryable_error(&ModelError::ParseError(
            "bad json".into()
        )));
    }

    #[test]
    fn test_message_builder() {
        let system_msg = MessageBuilder::system("You are an assistant");
        assert_eq!(system_msg["role"], "system");

        let user_msg = MessageBuilder::user("Hello", None);
        assert_eq!(user_msg["role"], "user");

        let mut with_image = MessageBuilder::user("Look at this", Some("base64data"));
        assert_eq!(with_image["content"][0]["type"], "image_url");

        MessageBuilder::remove_images(&mut with_image);
        assert_eq!(with_image["content"].as_array().unwrap().len(), 1);
        assert_eq!(with_image["content"][0]["type"], "text");
    }

    #[test]
    fn test_tool_message_shape() {
        let msg = MessageBuilder::tool("tap", "Tapped on element");
        assert_eq!(msg["role"], "tool");
        assert_eq!(msg["name"], "tap");
    }
}
