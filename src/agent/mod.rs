//! The agent orchestration loop: shared state, the five nodes, and the
//! runner that sequences them.

mod contextor;
mod cortex;
mod executor;
mod planner;
mod runner;
mod state;
mod summarizer;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, KnowledgeBase};
use crate::device::{DeviceBackend, DeviceError};
use crate::model::{GatewayError, InferenceGateway};

pub use contextor::ContextorNode;
pub use cortex::{CortexNode, CortexOutput};
pub use executor::{ExecutorNode, ToolCallEnvelope};
pub use planner::{PlannerNode, PlannerOutput, RawSubgoal};
pub use runner::{AgentRunner, LoopPhase, RunReport, RunnerConfig};
pub use state::{Field, Message, State, StatePatch, Subgoal, SubgoalStatus};
pub use summarizer::{SummarizerNode, DEFAULT_MAX_MESSAGES_IN_HISTORY};

/// Agent loop errors. Everything surfacing here is unrecoverable for the
/// current run; recoverable conditions (tool failures, vision failures) are
/// folded into state as feedback instead.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("max cycles reached after {0} cycles")]
    MaxCyclesReached(u32),
}

/// Everything the nodes share: the resolved gateway, the device session, and
/// the optional knowledge base. One instance per run; the device session is
/// exclusively owned.
pub struct AgentContext {
    pub gateway: InferenceGateway,
    pub device: Arc<dyn DeviceBackend>,
    pub knowledge: KnowledgeBase,
    /// Device platform name rendered into prompts ("android", "ios").
    pub platform: String,
}

impl AgentContext {
    pub fn new(gateway: InferenceGateway, device: Arc<dyn DeviceBackend>) -> Self {
        Self {
            gateway,
            device,
            knowledge: KnowledgeBase::default(),
            platform: "android".to_string(),
        }
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }
}
