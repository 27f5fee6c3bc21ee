//! Shared run state threaded through every node, and the patch type nodes
//! return instead of mutating state themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Conversation message variants. Every constructor assigns a fresh
/// identifier; only identified messages are eligible for pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        id: Option<String>,
        content: String,
    },
    Human {
        id: Option<String>,
        content: String,
    },
    Ai {
        id: Option<String>,
        content: String,
    },
    Tool {
        id: Option<String>,
        name: String,
        content: String,
        is_error: bool,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            id: Some(Uuid::new_v4().to_string()),
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            id: Some(Uuid::new_v4().to_string()),
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Message::Ai {
            id: Some(Uuid::new_v4().to_string()),
            content: content.into(),
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Message::Tool {
            id: Some(Uuid::new_v4().to_string()),
            name: name.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Message::System { id, .. }
            | Message::Human { id, .. }
            | Message::Ai { id, .. }
            | Message::Tool { id, .. } => id.as_deref(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content, .. }
            | Message::Human { content, .. }
            | Message::Ai { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Tool or Human messages bound a prunable span: removal may only start
    /// at one of these so a dangling AI/tool-call pair is never split.
    pub fn is_prune_boundary(&self) -> bool {
        matches!(self, Message::Tool { .. } | Message::Human { .. })
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Message::Tool { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Convert to the OpenAI wire format for a model call.
    pub fn to_wire(&self) -> Value {
        use crate::model::MessageBuilder;
        match self {
            Message::System { content, .. } => MessageBuilder::system(content),
            Message::Human { content, .. } => MessageBuilder::user(content, None),
            Message::Ai { content, .. } => MessageBuilder::assistant(content),
            Message::Tool { name, content, .. } => MessageBuilder::tool(name, content),
        }
    }
}

/// Subgoal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubgoalStatus {
    #[default]
    NotStarted,
    InProgress,
    Success,
    Failure,
}

impl SubgoalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubgoalStatus::Success | SubgoalStatus::Failure)
    }
}

/// One step of the decomposed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgoal {
    pub id: String,
    pub description: String,
    pub status: SubgoalStatus,
    pub completion_reason: Option<String>,
}

impl Subgoal {
    /// Create a fresh subgoal. Ids are minted here only for entries the
    /// planner output did not carry one for.
    pub fn new(id: Option<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            description: description.into(),
            status: SubgoalStatus::NotStarted,
            completion_reason: None,
        }
    }
}

impl std::fmt::Display for Subgoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {} ({})", self.status, self.description, self.id)
    }
}

/// The single mutable record threaded through every node. One instance per
/// run, owned by the loop driver; nodes only ever see `&State` and answer
/// with a [`StatePatch`].
#[derive(Debug, Clone, Default)]
pub struct State {
    pub initial_goal: String,
    pub subgoal_plan: Vec<Subgoal>,
    pub conversation: Vec<Message>,
    pub agents_thoughts: Vec<String>,
    /// Serialized instruction payload set by Cortex, consumed by Executor.
    pub structured_decisions: Option<String>,
    /// Subgoal ids believed finished or due for re-examination.
    pub complete_subgoals_by_ids: Vec<String>,
    // Per-cycle perception context, single-use.
    pub latest_screenshot: Option<String>,
    pub latest_ui_hierarchy: Option<Value>,
    pub focused_app_info: Option<String>,
    pub device_date: Option<String>,
    pub screen_size: Option<(u32, u32)>,
    /// First-cycle vision scene description; persists until overwritten.
    pub screen_analysis: Option<String>,
    /// Monotonic count of node invocations, for budgeting and diagnostics.
    pub execution_depth: u64,
    pub cortex_last_thought: Option<String>,
    /// Executor-scoped scratch channel, reset by Cortex each cycle.
    pub executor_messages: Vec<Message>,
}

impl State {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            initial_goal: goal.into(),
            ..Self::default()
        }
    }

    /// The current subgoal: first entry in plan order whose status is not
    /// terminal. `None` on an empty or fully terminal plan.
    pub fn current_subgoal(&self) -> Option<&Subgoal> {
        self.subgoal_plan.iter().find(|s| !s.status.is_terminal())
    }

    /// Whether every subgoal reached Success. False on an empty plan.
    pub fn plan_complete(&self) -> bool {
        !self.subgoal_plan.is_empty()
            && self
                .subgoal_plan
                .iter()
                .all(|s| s.status == SubgoalStatus::Success)
    }

    pub fn has_failed_subgoal(&self) -> bool {
        self.subgoal_plan
            .iter()
            .any(|s| s.status == SubgoalStatus::Failure)
    }

    /// Apply a node's patch. Depth increases by exactly 1 per application,
    /// whatever branch the node took.
    pub fn apply(&mut self, patch: StatePatch) {
        if let Field::Set(plan) = patch.subgoal_plan {
            self.subgoal_plan = plan;
        }

        if let Some((ids, reason)) = patch.mark_success {
            for subgoal in &mut self.subgoal_plan {
                if ids.contains(&subgoal.id) && !subgoal.status.is_terminal() {
                    subgoal.status = SubgoalStatus::Success;
                    subgoal.completion_reason = Some(reason.clone());
                }
            }
        }

        if patch.mark_current_in_progress {
            if let Some(subgoal) = self
                .subgoal_plan
                .iter_mut()
                .find(|s| !s.status.is_terminal())
            {
                subgoal.status = SubgoalStatus::InProgress;
            }
        }

        self.conversation.extend(patch.append_conversation);
        if !patch.prune_message_ids.is_empty() {
            self.conversation.retain(|m| {
                m.id()
                    .map(|id| !patch.prune_message_ids.iter().any(|p| p == id))
                    .unwrap_or(true)
            });
        }

        self.agents_thoughts.extend(patch.append_thoughts);

        if patch.clear_executor_messages {
            self.executor_messages.clear();
        }
        self.executor_messages.extend(patch.append_executor_messages);

        if let Field::Set(v) = patch.structured_decisions {
            self.structured_decisions = v;
        }
        if let Field::Set(v) = patch.complete_subgoals_by_ids {
            self.complete_subgoals_by_ids = v;
        }
        if let Field::Set(v) = patch.latest_screenshot {
            self.latest_screenshot = v;
        }
        if let Field::Set(v) = patch.latest_ui_hierarchy {
            self.latest_ui_hierarchy = v;
        }
        if let Field::Set(v) = patch.focused_app_info {
            self.focused_app_info = v;
        }
        if let Field::Set(v) = patch.device_date {
            self.device_date = v;
        }
        if let Field::Set(v) = patch.screen_size {
            self.screen_size = v;
        }
        if let Field::Set(v) = patch.screen_analysis {
            self.screen_analysis = v;
        }
        if let Field::Set(v) = patch.cortex_last_thought {
            self.cortex_last_thought = v;
        }

        self.execution_depth += 1;
    }
}

/// A patchable field: either left untouched or set to a new value.
#[derive(Debug, Clone, Default)]
pub enum Field<T> {
    #[default]
    Keep,
    Set(T),
}

/// The delta a node hands back to the loop driver. Everything defaults to
/// "no change"; applying any patch bumps the execution depth.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub subgoal_plan: Field<Vec<Subgoal>>,
    /// Mark these subgoal ids Success, recording the given reason.
    pub mark_success: Option<(Vec<String>, String)>,
    /// Mark the current subgoal as actively being worked on.
    pub mark_current_in_progress: bool,
    pub append_conversation: Vec<Message>,
    /// Structural removal of identified conversation messages.
    pub prune_message_ids: Vec<String>,
    pub append_thoughts: Vec<String>,
    pub clear_executor_messages: bool,
    pub append_executor_messages: Vec<Message>,
    pub structured_decisions: Field<Option<String>>,
    pub complete_subgoals_by_ids: Field<Vec<String>>,
    pub latest_screenshot: Field<Option<String>>,
    pub latest_ui_hierarchy: Field<Option<Value>>,
    pub focused_app_info: Field<Option<String>>,
    pub device_date: Field<Option<String>>,
    pub screen_size: Field<Option<(u32, u32)>>,
    pub screen_analysis: Field<Option<String>>,
    pub cortex_last_thought: Field<Option<String>>,
}

impl StatePatch {
    /// A patch that changes nothing except the execution depth.
    pub fn depth_only() -> Self {
        Self::default()
    }
}
