// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Mobile Pilot
//!
//! An AI-powered agent loop that drives a mobile device through
//! natural-language goals. Five cooperating nodes — Planner, Contextor,
//! Cortex, Executor, Summarizer — iterate over a shared state until every
//! subgoal of the plan succeeded.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mobile_pilot::{
//!     AgentContext, AgentRunner, HttpDeviceBackend, InferenceGateway,
//!     LlmConfig, RunnerConfig, Settings,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env();
//!     let llm_config = LlmConfig::default().apply_env_overrides()?;
//!     llm_config.validate(&settings)?;
//!
//!     let gateway = InferenceGateway::from_config(&llm_config, &settings)?;
//!     let device = Arc::new(HttpDeviceBackend::new("http://localhost:9998"));
//!
//!     let runner = AgentRunner::new(
//!         AgentContext::new(gateway, device),
//!         RunnerConfig::default(),
//!     );
//!     let report = runner.run("open settings and enable dark mode").await?;
//!
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod device;
pub mod model;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{
    AgentContext, AgentError, AgentRunner, ContextorNode, CortexNode, CortexOutput, ExecutorNode,
    Field, LoopPhase, Message, PlannerNode, PlannerOutput, RunReport, RunnerConfig, State,
    StatePatch, Subgoal, SubgoalStatus, SummarizerNode,
};
pub use config::{
    AgentRole, ConfigError, KnowledgeBase, LlmConfig, Provider, RoleModel, Settings, ToolCalling,
};
pub use device::{
    DeviceBackend, DeviceError, HttpDeviceBackend, Key, ScreenData, SelectorRequest, SwipeRequest,
};
pub use model::{
    ChatOptions, ChatResponse, GatewayError, Inference, InferenceGateway, MessageBuilder,
    ModelClient, ModelConfig, ModelError, ToolCallRequest, ToolDefinition,
};
