//! Cortex node: the per-cycle decision state machine. Emits either subgoal
//! completions or a structured instruction for the executor, never both.

use serde::Deserialize;

use crate::config::{render_cortex_prompt, AgentRole};
use crate::model::MessageBuilder;

use super::state::{Field, Message, State, StatePatch};
use super::{AgentContext, AgentError};

/// Strings treated as an empty instruction. The comparison is literal — a
/// model emitting the text "null" counts as empty, nothing else does.
const EMPTY_DECISION_MARKERS: [&str; 4] = ["{}", "[]", "null", ""];

/// Structured cortex output.
#[derive(Debug, Clone, Deserialize)]
pub struct CortexOutput {
    /// The next instruction as a stringified JSON object; "{}" when
    /// completing subgoals.
    #[serde(default = "default_decisions")]
    pub decisions: String,
    pub agent_thought: String,
    #[serde(default)]
    pub complete_subgoals_by_ids: Option<Vec<String>>,
}

fn default_decisions() -> String {
    "{}".to_string()
}

impl CortexOutput {
    /// Completion is recognized only when ids were claimed AND the decisions
    /// payload is empty. A stray completion claim next to a real instruction
    /// must not skip execution.
    pub fn is_completion_cycle(&self) -> bool {
        let has_ids = self
            .complete_subgoals_by_ids
            .as_ref()
            .map(|ids| !ids.is_empty())
            .unwrap_or(false);
        has_ids && EMPTY_DECISION_MARKERS.contains(&self.decisions.as_str())
    }
}

/// Builds the decision prompt from the full state, invokes the
/// fallback-capable cortex role, and applies the completion-recognition
/// invariant.
pub struct CortexNode<'a> {
    ctx: &'a AgentContext,
}

impl<'a> CortexNode<'a> {
    pub fn new(ctx: &'a AgentContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, state: &State) -> Result<StatePatch, AgentError> {
        let plan = state
            .subgoal_plan
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        let system = self.ctx.knowledge.enhance(
            "cortex",
            &render_cortex_prompt(
                &state.initial_goal,
                &plan,
                state.current_subgoal().map(|s| s.description.as_str()),
                &executor_feedback(state),
            ),
        );

        let mut messages = vec![
            MessageBuilder::system(&system),
            MessageBuilder::user(&device_info(self.ctx, state), None),
        ];
        for thought in &state.agents_thoughts {
            messages.push(MessageBuilder::assistant(thought));
        }
        if let Some(screenshot) = &state.latest_screenshot {
            messages.push(MessageBuilder::user(
                "Here is the current screenshot:",
                Some(screenshot),
            ));
            tracing::debug!("added screenshot to cortex context");
        }
        if let Some(hierarchy) = &state.latest_ui_hierarchy {
            let rendered = serde_json::to_string_pretty(hierarchy)
                .unwrap_or_else(|_| hierarchy.to_string());
            messages.push(MessageBuilder::user(
                &format!("Here is the UI hierarchy:\n{rendered}"),
                None,
            ));
        }

        let output: CortexOutput = self
            .ctx
            .gateway
            .invoke_with_fallback(AgentRole::Cortex, &messages)
            .await?;

        let completion = output.is_completion_cycle();
        let completed_ids = if completion {
            output.complete_subgoals_by_ids.clone().unwrap_or_default()
        } else {
            Vec::new()
        };

        tracing::info!(
            completion,
            "cortex decision: {}",
            output.agent_thought
        );

        let mut patch = StatePatch {
            append_thoughts: vec![output.agent_thought.clone()],
            append_conversation: vec![Message::ai(output.agent_thought.clone())],
            structured_decisions: Field::Set(if completion {
                None
            } else {
                Some(output.decisions.clone())
            }),
            complete_subgoals_by_ids: Field::Set(completed_ids.clone()),
            // Perception context is visible to exactly one decision.
            latest_screenshot: Field::Set(None),
            latest_ui_hierarchy: Field::Set(None),
            focused_app_info: Field::Set(None),
            device_date: Field::Set(None),
            // Any prior instruction run is resolved now.
            clear_executor_messages: true,
            cortex_last_thought: Field::Set(Some(output.agent_thought.clone())),
            ..StatePatch::default()
        };

        if completion {
            patch.mark_success = Some((completed_ids, output.agent_thought));
        } else {
            patch.mark_current_in_progress = true;
        }

        Ok(patch)
    }
}

/// Feedback from the previous instruction: the instruction itself plus the
/// tool results the executor collected for it.
fn executor_feedback(state: &State) -> String {
    let Some(decisions) = &state.structured_decisions else {
        return "None.".to_string();
    };
    let tool_results = state
        .executor_messages
        .iter()
        .filter_map(|m| m.tool_name().map(|name| format!("[{name}] {}", m.content())))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Latest UI decisions:\n{decisions}\n\nExecutor feedback:\n{tool_results}")
}

fn device_info(ctx: &AgentContext, state: &State) -> String {
    let mut info = format!("Here is my device info:\nPlatform: {}\n", ctx.platform);
    if let Some((width, height)) = state.screen_size {
        info.push_str(&format!("Screen size: {width}x{height}\n"));
    }
    if let Some(date) = &state.device_date {
        info.push_str(&format!("Device date: {date}\n"));
    }
    if let Some(app) = &state.focused_app_info {
        info.push_str(&format!("Focused app info: {app}\n"));
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{Subgoal, SubgoalStatus};
    use crate::config::ToolCalling;
    use crate::testing::{scripted_context, ScriptedInference};
    use serde_json::json;

    fn state_with_plan() -> State {
        let mut state = State::new("open settings");
        state.subgoal_plan = vec![Subgoal::new(Some("sg-1".into()), "Open the Settings app")];
        state.latest_screenshot = Some("c2NyZWVu".into());
        state.latest_ui_hierarchy = Some(json!([{"text": "Settings"}]));
        state.focused_app_info = Some("launcher".into());
        state.device_date = Some("2025-06-01".into());
        state.executor_messages = vec![Message::tool("tap", "stale", false)];
        state
    }

    #[tokio::test]
    async fn test_completion_cycle_clears_decisions_and_keeps_ids() {
        let ctx = scripted_context(
            AgentRole::Cortex,
            ScriptedInference::with_replies(vec![
                r#"{"decisions": "{}", "agent_thought": "settings is open", "complete_subgoals_by_ids": ["sg-1"]}"#,
            ]),
            ToolCalling::Native,
        );
        let mut state = state_with_plan();
        state.structured_decisions = Some("old instruction".into());

        let patch = CortexNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        assert_eq!(state.structured_decisions, None);
        assert_eq!(state.complete_subgoals_by_ids, vec!["sg-1".to_string()]);
        assert_eq!(state.subgoal_plan[0].status, SubgoalStatus::Success);
        assert_eq!(
            state.subgoal_plan[0].completion_reason.as_deref(),
            Some("settings is open")
        );
    }

    #[tokio::test]
    async fn test_instruction_cycle_forces_completion_ids_empty() {
        let ctx = scripted_context(
            AgentRole::Cortex,
            ScriptedInference::with_replies(vec![
                r#"{"decisions": "{\"tap\": {\"text\": \"Settings\"}}", "agent_thought": "tap settings", "complete_subgoals_by_ids": ["sg-1"]}"#,
            ]),
            ToolCalling::Native,
        );
        let mut state = state_with_plan();

        let patch = CortexNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        // The stray completion claim never skips execution of the
        // instruction.
        assert!(state.complete_subgoals_by_ids.is_empty());
        assert_eq!(
            state.structured_decisions.as_deref(),
            Some(r#"{"tap": {"text": "Settings"}}"#)
        );
        assert_eq!(state.subgoal_plan[0].status, SubgoalStatus::InProgress);
    }

    #[tokio::test]
    async fn test_perception_fields_are_single_use() {
        let ctx = scripted_context(
            AgentRole::Cortex,
            ScriptedInference::with_replies(vec![
                r#"{"decisions": "{\"noop\": true}", "agent_thought": "thinking"}"#,
            ]),
            ToolCalling::Native,
        );
        let mut state = state_with_plan();

        let patch = CortexNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        assert!(state.latest_screenshot.is_none());
        assert!(state.latest_ui_hierarchy.is_none());
        assert!(state.focused_app_info.is_none());
        assert!(state.device_date.is_none());
        // The executor scratch channel was reset for the new instruction.
        assert!(state.executor_messages.is_empty());
        // The thought was recorded everywhere it is read later.
        assert_eq!(state.agents_thoughts, vec!["thinking".to_string()]);
        assert_eq!(state.cortex_last_thought.as_deref(), Some("thinking"));
        assert_eq!(state.conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_once() {
        let primary = ScriptedInference::always_failing();
        let fallback = ScriptedInference::with_replies(vec![
            r#"{"decisions": "{}", "agent_thought": "rescued", "complete_subgoals_by_ids": ["sg-1"]}"#,
        ]);
        let fallback_calls = fallback.call_count();

        let gateway = crate::model::InferenceGateway::with_bindings([(
            AgentRole::Cortex,
            crate::testing::scripted_binding(primary, Some(fallback), ToolCalling::Native),
        )]);
        let ctx = AgentContext::new(
            gateway,
            std::sync::Arc::new(crate::testing::RecordingBackend::new()),
        );

        let mut state = state_with_plan();
        let patch = CortexNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        assert_eq!(fallback_calls.get(), 1);
        assert_eq!(state.subgoal_plan[0].status, SubgoalStatus::Success);
    }

    #[test]
    fn test_completion_recognition_markers_are_literal() {
        let with = |decisions: &str, ids: Option<Vec<&str>>| CortexOutput {
            decisions: decisions.to_string(),
            agent_thought: "t".to_string(),
            complete_subgoals_by_ids: ids
                .map(|v| v.into_iter().map(String::from).collect()),
        };

        for marker in ["{}", "[]", "null", ""] {
            assert!(with(marker, Some(vec!["sg-1"])).is_completion_cycle());
        }
        // Whitespace variants are NOT canonical-empty.
        assert!(!with(" {} ", Some(vec!["sg-1"])).is_completion_cycle());
        assert!(!with(r#"{"tap": 1}"#, Some(vec!["sg-1"])).is_completion_cycle());
        assert!(!with("{}", Some(vec![])).is_completion_cycle());
        assert!(!with("{}", None).is_completion_cycle());
    }

    #[test]
    fn test_executor_feedback_rendering() {
        let mut state = state_with_plan();
        state.structured_decisions = None;
        assert_eq!(executor_feedback(&state), "None.");

        state.structured_decisions = Some(r#"{"tap": {}}"#.into());
        state.executor_messages = vec![
            Message::ai("reasoning"),
            Message::tool("tap", "Tapped element", false),
        ];
        let feedback = executor_feedback(&state);
        assert!(feedback.contains(r#"{"tap": {}}"#));
        assert!(feedback.contains("[tap] Tapped element"));
    }
}
