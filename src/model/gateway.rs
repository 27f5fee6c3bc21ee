//! Inference gateway: resolves agent roles to configured model clients and
//! enforces the one-shot primary→fallback call discipline.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::{AgentRole, ConfigError, LlmConfig, RoleModel, Settings, ToolCalling};

use super::{decode_structured, ChatOptions, ChatResponse, Inference, ModelClient, ModelConfig,
    ModelError, ToolDefinition};

/// Gateway errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no model binding for role {0}")]
    UnknownRole(AgentRole),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// The resolved binding for one agent role.
#[derive(Clone)]
pub struct RoleBinding {
    pub primary: Arc<dyn Inference>,
    pub fallback: Option<Arc<dyn Inference>>,
    pub tool_calling: ToolCalling,
    pub temperature: f32,
}

/// Resolves a logical agent role to a provider/model pair and exposes
/// freeform, schema-constrained, and fallback-wrapped calls.
///
/// Construction resolves every binding (and rejects missing credentials)
/// once; per-call code never inspects provider capabilities again.
pub struct InferenceGateway {
    roles: HashMap<AgentRole, RoleBinding>,
}

impl InferenceGateway {
    /// Build the gateway from configuration. Fails fast on a missing
    /// credential for any configured provider, fallbacks included.
    pub fn from_config(llm: &LlmConfig, settings: &Settings) -> Result<Self, ConfigError> {
        let mut roles = HashMap::new();
        for (role, (primary, fallback)) in llm.bindings() {
            let binding = RoleBinding {
                primary: Arc::new(build_client(primary, settings, role.as_str())?)
                    as Arc<dyn Inference>,
                fallback: match fallback {
                    Some(fb) => Some(Arc::new(build_client(fb, settings, role.as_str())?)
                        as Arc<dyn Inference>),
                    None => None,
                },
                tool_calling: primary.tool_calling,
                temperature: primary.temperature,
            };
            roles.insert(role, binding);
        }
        Ok(Self { roles })
    }

    /// Build a gateway from explicit bindings. Used by tests and embedders
    /// that bring their own [`Inference`] implementations.
    pub fn with_bindings(bindings: impl IntoIterator<Item = (AgentRole, RoleBinding)>) -> Self {
        Self {
            roles: bindings.into_iter().collect(),
        }
    }

    pub fn binding(&self, role: AgentRole) -> Result<&RoleBinding, GatewayError> {
        self.roles.get(&role).ok_or(GatewayError::UnknownRole(role))
    }

    /// Freeform text generation against the role's primary model.
    pub async fn generate(
        &self,
        role: AgentRole,
        messages: &[Value],
    ) -> Result<String, GatewayError> {
        let binding = self.binding(role)?;
        let options = ChatOptions {
            temperature: Some(binding.temperature),
            ..ChatOptions::default()
        };
        let response = binding.primary.chat(messages, &options).await?;
        Ok(response.content)
    }

    /// Schema-constrained invocation against the role's primary model.
    /// A malformed response surfaces as a parse error; it is never retried
    /// here.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        role: AgentRole,
        messages: &[Value],
    ) -> Result<T, GatewayError> {
        let binding = self.binding(role)?;
        Ok(invoke_structured(binding.primary.as_ref(), messages, binding.temperature).await?)
    }

    /// Schema-constrained invocation with the one-shot fallback discipline:
    /// the fallback model is tried exactly once when the primary call fails
    /// or returns an empty result. Roles without a configured fallback
    /// behave like [`invoke`].
    pub async fn invoke_with_fallback<T: DeserializeOwned>(
        &self,
        role: AgentRole,
        messages: &[Value],
    ) -> Result<T, GatewayError> {
        let binding = self.binding(role)?;
        let Some(fallback) = &binding.fallback else {
            return self.invoke(role, messages).await;
        };
        let temperature = binding.temperature;
        let result = with_fallback(
            || invoke_structured::<T>(binding.primary.as_ref(), messages, temperature),
            || invoke_structured::<T>(fallback.as_ref(), messages, temperature),
        )
        .await?;
        Ok(result)
    }

    /// Freeform generation with the one-shot fallback discipline; an empty
    /// primary result counts as a failure.
    pub async fn generate_with_fallback(
        &self,
        role: AgentRole,
        messages: &[Value],
    ) -> Result<String, GatewayError> {
        let binding = self.binding(role)?;
        let Some(fallback) = &binding.fallback else {
            return self.generate(role, messages).await;
        };
        let temperature = binding.temperature;
        let result = with_fallback(
            || generate_non_empty(binding.primary.as_ref(), messages, temperature),
            || generate_non_empty(fallback.as_ref(), messages, temperature),
        )
        .await?;
        Ok(result)
    }

    /// Chat with tool definitions bound, honoring the role's tool-calling
    /// capability tag. Native roles get the definitions on the wire; JSON
    /// protocol roles get a JSON-object response the caller must decode.
    pub async fn chat_with_tools(
        &self,
        role: AgentRole,
        messages: &[Value],
        tools: Vec<ToolDefinition>,
    ) -> Result<ChatResponse, GatewayError> {
        let binding = self.binding(role)?;
        let options = match binding.tool_calling {
            ToolCalling::Native => ChatOptions {
                tools,
                temperature: Some(binding.temperature),
                ..ChatOptions::default()
            },
            ToolCalling::JsonProtocol => ChatOptions {
                json_object: true,
                temperature: Some(binding.temperature),
                ..ChatOptions::default()
            },
        };
        Ok(binding.primary.chat(messages, &options).await?)
    }
}

fn build_client(
    role_model: &RoleModel,
    settings: &Settings,
    role: &str,
) -> Result<ModelClient, ConfigError> {
    let config = ModelConfig::default()
        .with_base_url(settings.base_url(role_model.provider))
        .with_api_key(settings.api_key(role_model.provider, role)?)
        .with_model_name(role_model.model.clone())
        .with_temperature(role_model.temperature);
    Ok(ModelClient::new(config))
}

async fn generate_non_empty(
    client: &dyn Inference,
    messages: &[Value],
    temperature: f32,
) -> Result<String, ModelError> {
    let options = ChatOptions {
        temperature: Some(temperature),
        ..ChatOptions::default()
    };
    let response = client.chat(messages, &options).await?;
    if response.content.trim().is_empty() {
        return Err(ModelError::ParseError("empty model response".to_string()));
    }
    Ok(response.content)
}

async fn invoke_structured<T: DeserializeOwned>(
    client: &dyn Inference,
    messages: &[Value],
    temperature: f32,
) -> Result<T, ModelError> {
    let options = ChatOptions {
        json_object: true,
        temperature: Some(temperature),
        ..ChatOptions::default()
    };
    let response = client.chat(messages, &options).await?;
    if response.is_empty() {
        return Err(ModelError::ParseError("empty model response".to_string()));
    }
    decode_structured(&response.content)
}

/// Try the main call; on any error, run the fallback call exactly once and
/// return its result. No retry chains beyond primary→fallback.
pub async fn with_fallback<T, E, M, F, MFut, FFut>(main_call: M, fallback_call: F) -> Result<T, E>
where
    E: std::fmt::Display,
    M: FnOnce() -> MFut,
    F: FnOnce() -> FFut,
    MFut: Future<Output = Result<T, E>>,
    FFut: Future<Output = Result<T, E>>,
{
    match main_call().await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!("primary inference failed: {}, falling back", e);
            fallback_call().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedInference;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Verdict {
        answer: String,
    }

    fn binding(
        primary: ScriptedInference,
        fallback: Option<ScriptedInference>,
        tool_calling: ToolCalling,
    ) -> RoleBinding {
        RoleBinding {
            primary: Arc::new(primary),
            fallback: fallback.map(|f| Arc::new(f) as Arc<dyn Inference>),
            tool_calling,
            temperature: 1.0,
        }
    }

    #[tokio::test]
    async fn test_fallback_called_exactly_once_when_primary_raises() {
        let primary = ScriptedInference::always_failing();
        let fallback = ScriptedInference::with_replies(vec![r#"{"answer": "from fallback"}"#]);
        let primary_calls = primary.call_count();
        let fallback_calls = fallback.call_count();

        let gateway = InferenceGateway::with_bindings([(
            AgentRole::Cortex,
            binding(primary, Some(fallback), ToolCalling::Native),
        )]);

        let messages = vec![json!({"role": "user", "content": "decide"})];
        let verdict: Verdict = gateway
            .invoke_with_fallback(AgentRole::Cortex, &messages)
            .await
            .unwrap();

        assert_eq!(verdict.answer, "from fallback");
        assert_eq!(primary_calls.get(), 1);
        assert_eq!(fallback_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_fallback_skipped_when_primary_succeeds() {
        let primary = ScriptedInference::with_replies(vec![r#"{"answer": "primary"}"#]);
        let fallback = ScriptedInference::with_replies(vec![r#"{"answer": "nope"}"#]);
        let fallback_calls = fallback.call_count();

        let gateway = InferenceGateway::with_bindings([(
            AgentRole::Cortex,
            binding(primary, Some(fallback), ToolCalling::Native),
        )]);

        let messages = vec![json!({"role": "user", "content": "decide"})];
        let verdict: Verdict = gateway
            .invoke_with_fallback(AgentRole::Cortex, &messages)
            .await
            .unwrap();

        assert_eq!(verdict.answer, "primary");
        assert_eq!(fallback_calls.get(), 0);
    }

    #[tokio::test]
    async fn test_empty_primary_response_triggers_fallback() {
        let primary = ScriptedInference::with_replies(vec![""]);
        let fallback = ScriptedInference::with_replies(vec![r#"{"answer": "rescued"}"#]);

        let gateway = InferenceGateway::with_bindings([(
            AgentRole::Cortex,
            binding(primary, Some(fallback), ToolCalling::Native),
        )]);

        let messages = vec![json!({"role": "user", "content": "decide"})];
        let verdict: Verdict = gateway
            .invoke_with_fallback(AgentRole::Cortex, &messages)
            .await
            .unwrap();

        assert_eq!(verdict.answer, "rescued");
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_error() {
        let gateway = InferenceGateway::with_bindings([(
            AgentRole::Cortex,
            binding(
                ScriptedInference::always_failing(),
                Some(ScriptedInference::always_failing()),
                ToolCalling::Native,
            ),
        )]);

        let messages = vec![json!({"role": "user", "content": "decide"})];
        let result: Result<Verdict, _> =
            gateway.invoke_with_fallback(AgentRole::Cortex, &messages).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invoke_surfaces_parse_failure() {
        let gateway = InferenceGateway::with_bindings([(
            AgentRole::Planner,
            binding(
                ScriptedInference::with_replies(vec!["this is not json"]),
                None,
                ToolCalling::Native,
            ),
        )]);

        let messages = vec![json!({"role": "user", "content": "plan"})];
        let result: Result<Verdict, _> = gateway.invoke(AgentRole::Planner, &messages).await;
        assert!(matches!(
            result,
            Err(GatewayError::Model(ModelError::ParseError(_)))
        ));
    }

    #[tokio::test]
    async fn test_unknown_role_is_an_error() {
        let gateway = InferenceGateway::with_bindings(Vec::new());
        let result = gateway.generate(AgentRole::Planner, &[]).await;
        assert!(matches!(result, Err(GatewayError::UnknownRole(_))));
    }
}
