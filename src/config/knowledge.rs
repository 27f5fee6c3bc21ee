//! Optional knowledge base injected into node system prompts.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Knowledge base content loaded from `knowledgebase.json`. Absence is a
/// no-op; a malformed file is logged and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KnowledgeBase {
    pub system_context: Option<String>,
    pub user_context: Vec<String>,
    pub capabilities: Vec<String>,
    pub best_practices: Vec<String>,
    /// Extra context keyed by agent name, e.g. `"cortex_context"`.
    #[serde(flatten)]
    pub agent_context: HashMap<String, serde_json::Value>,
}

impl KnowledgeBase {
    /// Load from a JSON file. Never fails: a missing or malformed file
    /// yields an empty knowledge base.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let Ok(text) = std::fs::read_to_string(path) else {
            tracing::debug!("no knowledge base at {}", path.display());
            return Self::default();
        };
        match serde_json::from_str(&text) {
            Ok(kb) => kb,
            Err(e) => {
                tracing::warn!("ignoring malformed knowledge base {}: {e}", path.display());
                Self::default()
            }
        }
    }

    fn general_context(&self) -> String {
        let mut parts = Vec::new();
        if let Some(system) = &self.system_context {
            parts.push(format!("System: {system}"));
        }
        if !self.user_context.is_empty() {
            parts.push(format!("User context: {}", self.user_context.join(" | ")));
        }
        if !self.capabilities.is_empty() {
            parts.push(format!("Capabilities: {}", self.capabilities.join(" | ")));
        }
        if !self.best_practices.is_empty() {
            parts.push(format!(
                "Best practices: {}",
                self.best_practices.join(" | ")
            ));
        }
        parts.join(" || ")
    }

    /// Append knowledge context to an agent's system prompt. An empty
    /// knowledge base returns the prompt unchanged.
    pub fn enhance(&self, agent_name: &str, prompt: &str) -> String {
        let mut enhanced = prompt.to_string();

        if let Some(agent) = self
            .agent_context
            .get(&format!("{agent_name}_context"))
            .and_then(|v| v.as_str())
        {
            enhanced.push_str(&format!("\n\n## {agent_name} context\n{agent}"));
        }

        let general = self.general_context();
        if !general.is_empty() {
            enhanced.push_str(&format!("\n\n## Operator context\n{general}"));
        }

        enhanced
    }
}
