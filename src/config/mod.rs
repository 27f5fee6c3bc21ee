//! Configuration: environment settings, per-role model bindings, and the
//! startup validation that fails fast on missing credentials.

mod apps;
mod knowledge;
mod prompts;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use apps::{format_app_packages, APP_PACKAGES};
pub use knowledge::KnowledgeBase;
pub use prompts::{
    render_cortex_prompt, render_executor_prompt, render_planner_prompt, render_planner_request,
    SCREEN_ANALYSIS_PROMPT,
};

/// Configuration errors. All of these are fatal and raised before the first
/// node runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{role} requires {var} to be set in the environment")]
    MissingCredential { role: String, var: String },
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Logical agent roles resolved by the inference gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Planner,
    Contextor,
    Cortex,
    Executor,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Planner,
        AgentRole::Contextor,
        AgentRole::Cortex,
        AgentRole::Executor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Contextor => "contextor",
            AgentRole::Cortex => "cortex",
            AgentRole::Executor => "executor",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a provider/model pair supports native tool-calling, or needs the
/// manual JSON protocol. Decided once at configuration time, never probed
/// per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCalling {
    #[default]
    Native,
    JsonProtocol,
}

/// Supported inference providers. All speak the OpenAI-compatible chat
/// surface; they differ in base URL and credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    OpenRouter,
    Xai,
    /// A self-hosted OpenAI-compatible endpoint (vLLM, Ollama, ...).
    Local,
}

impl Provider {
    fn credential_var(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Xai => Some("XAI_API_KEY"),
            Provider::Local => None,
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Xai => "https://api.x.ai/v1",
            Provider::Local => "http://localhost:8000/v1",
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "openrouter" => Ok(Provider::OpenRouter),
            "xai" => Ok(Provider::Xai),
            "local" => Ok(Provider::Local),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Process-level settings loaded from the environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub xai_api_key: Option<String>,
    /// Base URL of the device automation server.
    pub device_base_url: Option<String>,
    /// Override base URL for the local provider.
    pub local_base_url: Option<String>,
    /// Path to the optional knowledge base file.
    pub knowledge_base_path: Option<String>,
}

impl Settings {
    /// Read settings from the environment. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            xai_api_key: std::env::var("XAI_API_KEY").ok(),
            device_base_url: std::env::var("DEVICE_BASE_URL").ok(),
            local_base_url: std::env::var("LOCAL_BASE_URL").ok(),
            knowledge_base_path: std::env::var("KNOWLEDGE_BASE_PATH").ok(),
        }
    }

    fn credential_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::OpenRouter => self.openrouter_api_key.as_deref(),
            Provider::Xai => self.xai_api_key.as_deref(),
            Provider::Local => None,
        }
    }

    /// Resolve the API key for a provider, or fail if its credential is
    /// required and absent.
    pub fn api_key(&self, provider: Provider, role: &str) -> Result<String, ConfigError> {
        match provider.credential_var() {
            None => Ok("EMPTY".to_string()),
            Some(var) => self
                .credential_for(provider)
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingCredential {
                    role: role.to_string(),
                    var: var.to_string(),
                }),
        }
    }

    /// Resolve the base URL for a provider.
    pub fn base_url(&self, provider: Provider) -> String {
        if provider == Provider::Local {
            if let Some(url) = &self.local_base_url {
                return url.clone();
            }
        }
        provider.default_base_url().to_string()
    }
}

/// One role's model binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleModel {
    pub provider: Provider,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub tool_calling: ToolCalling,
}

fn default_temperature() -> f32 {
    1.0
}

impl RoleModel {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: default_temperature(),
            tool_calling: ToolCalling::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tool_calling(mut self, tool_calling: ToolCalling) -> Self {
        self.tool_calling = tool_calling;
        self
    }
}

impl fmt::Display for RoleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.provider, self.model)
    }
}

/// A role binding with a secondary model tried once after a primary failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleModelWithFallback {
    #[serde(flatten)]
    pub primary: RoleModel,
    pub fallback: RoleModel,
}

/// Per-role model configuration. Cortex and Contextor are fallback-capable;
/// the others are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub planner: RoleModel,
    pub contextor: RoleModelWithFallback,
    pub cortex: RoleModelWithFallback,
    pub executor: RoleModel,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            planner: RoleModel::new(Provider::OpenAi, "gpt-4.1"),
            contextor: RoleModelWithFallback {
                primary: RoleModel::new(Provider::OpenAi, "gpt-4o-mini").with_temperature(0.0),
                fallback: RoleModel::new(Provider::OpenAi, "gpt-4.1").with_temperature(0.0),
            },
            cortex: RoleModelWithFallback {
                primary: RoleModel::new(Provider::OpenAi, "o3"),
                fallback: RoleModel::new(Provider::OpenAi, "gpt-4.1"),
            },
            executor: RoleModel::new(Provider::OpenAi, "gpt-4.1"),
        }
    }
}

impl LlmConfig {
    /// Load role configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `PLANNER_PROVIDER` / `PLANNER_MODEL` style environment
    /// overrides. For fallback-capable roles the override applies to both
    /// the primary and the fallback binding.
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        let overrides = [
            ("PLANNER", AgentRole::Planner),
            ("CONTEXTOR", AgentRole::Contextor),
            ("CORTEX", AgentRole::Cortex),
            ("EXECUTOR", AgentRole::Executor),
        ];

        for (prefix, role) in overrides {
            let provider = std::env::var(format!("{prefix}_PROVIDER")).ok();
            let model = std::env::var(format!("{prefix}_MODEL")).ok();
            if provider.is_none() && model.is_none() {
                continue;
            }

            let provider = provider.map(|p| Provider::from_str(&p)).transpose()?;

            let mut apply = |target: &mut RoleModel| {
                if let Some(p) = provider {
                    target.provider = p;
                }
                if let Some(m) = &model {
                    target.model = m.clone();
                }
            };

            match role {
                AgentRole::Planner => apply(&mut self.planner),
                AgentRole::Executor => apply(&mut self.executor),
                AgentRole::Contextor => {
                    apply(&mut self.contextor.primary);
                    apply(&mut self.contextor.fallback);
                }
                AgentRole::Cortex => {
                    apply(&mut self.cortex.primary);
                    apply(&mut self.cortex.fallback);
                }
            }

            tracing::info!("{} binding overridden from environment", role);
        }

        Ok(self)
    }

    /// Every (role, model) pair in this config, fallbacks included.
    /// Used for credential validation and gateway construction.
    pub fn bindings(&self) -> HashMap<AgentRole, (&RoleModel, Option<&RoleModel>)> {
        HashMap::from([
            (AgentRole::Planner, (&self.planner, None)),
            (
                AgentRole::Contextor,
                (&self.contextor.primary, Some(&self.contextor.fallback)),
            ),
            (
                AgentRole::Cortex,
                (&self.cortex.primary, Some(&self.cortex.fallback)),
            ),
            (AgentRole::Executor, (&self.executor, None)),
        ])
    }

    /// Fail fast when any configured provider is missing its credential.
    pub fn validate(&self, settings: &Settings) -> Result<(), ConfigError> {
        for (role, (primary, fallback)) in self.bindings() {
            settings.api_key(primary.provider, role.as_str())?;
            if let Some(fb) = fallback {
                settings.api_key(fb.provider, &format!("{role} fallback"))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!(Provider::from_str("openai").unwrap(), Provider::OpenAi);
        assert_eq!(Provider::from_str("XAI").unwrap(), Provider::Xai);
        assert!(matches!(
            Provider::from_str("gemini"),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_validation_fails_fast_on_missing_credential() {
        let config = LlmConfig::default();
        let settings = Settings::default();

        let err = config.validate(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn test_validation_passes_with_credentials() {
        let config = LlmConfig::default();
        let settings = Settings {
            openai_api_key: Some("sk-test".to_string()),
            ..Settings::default()
        };

        config.validate(&settings).unwrap();
    }

    #[test]
    fn test_local_provider_needs_no_credential() {
        let mut config = LlmConfig::default();
        config.planner = RoleModel::new(Provider::Local, "qwen-7b");
        config.executor = RoleModel::new(Provider::Local, "qwen-7b");
        config.cortex.primary = RoleModel::new(Provider::Local, "qwen-7b");
        config.cortex.fallback = RoleModel::new(Provider::Local, "qwen-7b");
        config.contextor.primary = RoleModel::new(Provider::Local, "qwen-7b");
        config.contextor.fallback = RoleModel::new(Provider::Local, "qwen-7b");

        config.validate(&Settings::default()).unwrap();

        let settings = Settings::default();
        assert_eq!(settings.api_key(Provider::Local, "planner").unwrap(), "EMPTY");
        assert_eq!(settings.base_url(Provider::Local), "http://localhost:8000/v1");
    }

    #[test]
    fn test_role_config_from_json() {
        let json = r#"{
            "planner": {"provider": "openai", "model": "gpt-4.1"},
            "contextor": {
                "provider": "openai", "model": "gpt-4o-mini",
                "fallback": {"provider": "openai", "model": "gpt-4.1"}
            },
            "cortex": {
                "provider": "openai", "model": "o3",
                "fallback": {"provider": "xai", "model": "grok-4"}
            },
            "executor": {"provider": "local", "model": "qwen-7b", "tool_calling": "json_protocol"}
        }"#;

        let config: LlmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cortex.fallback.provider, Provider::Xai);
        assert_eq!(config.executor.tool_calling, ToolCalling::JsonProtocol);
        assert_eq!(config.planner.tool_calling, ToolCalling::Native);
    }
}
