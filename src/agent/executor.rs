//! Executor node: translates the cortex instruction into device tool calls
//! and collects their outcomes as feedback.

use serde::Deserialize;

use crate::config::{render_executor_prompt, AgentRole, ToolCalling};
use crate::device::{dispatch_tool_call, DEVICE_TOOLS};
use crate::model::{decode_structured, MessageBuilder, ToolCallRequest};

use super::state::{Field, Message, State, StatePatch};
use super::{AgentContext, AgentError};

/// The manual tool-call envelope used by providers without native
/// tool-calling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallEnvelope {
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub reasoning: String,
}

/// Dispatches the pending instruction. Tool calls execute strictly in
/// sequence since later calls may depend on device state changed by earlier
/// ones. Never mutates the subgoal plan.
pub struct ExecutorNode<'a> {
    ctx: &'a AgentContext,
}

impl<'a> ExecutorNode<'a> {
    pub fn new(ctx: &'a AgentContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, state: &State) -> Result<StatePatch, AgentError> {
        let Some(decisions) = &state.structured_decisions else {
            // Expected on completion cycles.
            tracing::debug!("no structured decisions to execute");
            return Ok(StatePatch {
                append_thoughts: vec![
                    "No structured decisions found, nothing to execute.".to_string(),
                ],
                ..StatePatch::default()
            });
        };

        let cortex_last_thought = state
            .cortex_last_thought
            .clone()
            .or_else(|| state.agents_thoughts.last().cloned())
            .unwrap_or_default();

        let tool_calling = self.ctx.gateway.binding(AgentRole::Executor)?.tool_calling;
        let json_protocol = tool_calling == ToolCalling::JsonProtocol;

        let system = self
            .ctx
            .knowledge
            .enhance("executor", &render_executor_prompt(json_protocol));
        let mut messages = vec![
            MessageBuilder::system(&system),
            MessageBuilder::user(&cortex_last_thought, None),
            MessageBuilder::user(decisions, None),
        ];
        for message in &state.executor_messages {
            messages.push(message.to_wire());
        }

        let response = self
            .ctx
            .gateway
            .chat_with_tools(AgentRole::Executor, &messages, DEVICE_TOOLS.clone())
            .await?;

        // One code path per capability class, resolved at gateway
        // construction.
        let (tool_calls, reasoning) = match tool_calling {
            ToolCalling::Native => {
                let reasoning = (!response.content.trim().is_empty())
                    .then(|| response.content.clone());
                (response.tool_calls, reasoning)
            }
            ToolCalling::JsonProtocol => {
                match decode_structured::<ToolCallEnvelope>(&response.content) {
                    Ok(envelope) => {
                        let reasoning =
                            (!envelope.reasoning.is_empty()).then(|| envelope.reasoning);
                        (envelope.tool_calls, reasoning)
                    }
                    Err(e) => {
                        // Malformed envelope degrades to feedback; the next
                        // cortex cycle re-decides.
                        tracing::warn!("failed to parse tool response: {e}");
                        let note = format!("Failed to parse tool response: {e}");
                        return Ok(StatePatch {
                            cortex_last_thought: Field::Set(Some(cortex_last_thought)),
                            append_executor_messages: vec![Message::ai(note.clone())],
                            append_conversation: vec![Message::ai(note)],
                            ..StatePatch::default()
                        });
                    }
                }
            }
        };

        let mut new_messages = Vec::new();
        if let Some(reasoning) = reasoning {
            new_messages.push(Message::ai(reasoning));
        }

        for call in &tool_calls {
            let outcome = dispatch_tool_call(self.ctx.device.as_ref(), call).await;
            new_messages.push(Message::tool(
                outcome.tool_name,
                outcome.content,
                outcome.is_error,
            ));
        }

        Ok(StatePatch {
            cortex_last_thought: Field::Set(Some(cortex_last_thought)),
            append_executor_messages: new_messages.clone(),
            append_conversation: new_messages,
            ..StatePatch::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatResponse;
    use crate::testing::{context_with, scripted_binding, RecordingBackend, ScriptedInference};
    use serde_json::json;
    use std::sync::Arc;

    fn state_with_instruction() -> State {
        let mut state = State::new("open settings");
        state.structured_decisions =
            Some(r#"{"launch_app": {"package_name": "com.android.settings"}}"#.into());
        state.cortex_last_thought = Some("launch the settings app".into());
        state
    }

    #[tokio::test]
    async fn test_no_instruction_is_a_thought_only_no_op() {
        let inference = ScriptedInference::with_replies(vec![]);
        let calls = inference.call_count();
        let backend = Arc::new(RecordingBackend::new());
        let ctx = context_with(
            vec![(
                AgentRole::Executor,
                scripted_binding(inference, None, ToolCalling::Native),
            )],
            backend.clone(),
        );

        let mut state = State::new("goal");
        let patch = ExecutorNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        assert_eq!(calls.get(), 0);
        assert!(backend.calls().is_empty());
        assert_eq!(
            state.agents_thoughts,
            vec!["No structured decisions found, nothing to execute.".to_string()]
        );
        assert_eq!(state.execution_depth, 1);
    }

    #[tokio::test]
    async fn test_json_protocol_dispatch() {
        let backend = Arc::new(RecordingBackend::new());
        let ctx = context_with(
            vec![(
                AgentRole::Executor,
                scripted_binding(
                    ScriptedInference::with_replies(vec![
                        r#"{"tool_calls": [{"name": "launch_app", "parameters": {"package_name": "com.android.settings"}}], "reasoning": "Opening settings"}"#,
                    ]),
                    None,
                    ToolCalling::JsonProtocol,
                ),
            )],
            backend.clone(),
        );

        let mut state = state_with_instruction();
        let patch = ExecutorNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        assert_eq!(backend.calls(), vec!["launch_app(com.android.settings)"]);
        // AI reasoning plus one tool result in the executor channel.
        assert_eq!(state.executor_messages.len(), 2);
        assert_eq!(state.executor_messages[0].content(), "Opening settings");
        assert_eq!(state.executor_messages[1].tool_name(), Some("launch_app"));
        // Also appended to the main history.
        assert_eq!(state.conversation.len(), 2);
        // The plan is never touched by the executor.
        assert!(state.subgoal_plan.is_empty());
    }

    #[tokio::test]
    async fn test_native_dispatch() {
        let backend = Arc::new(RecordingBackend::new());
        let ctx = context_with(
            vec![(
                AgentRole::Executor,
                scripted_binding(
                    ScriptedInference::with_responses(vec![ChatResponse {
                        content: String::new(),
                        tool_calls: vec![ToolCallRequest {
                            name: "tap".into(),
                            parameters: json!({"selector_request": {"text": "Settings"}}),
                        }],
                    }]),
                    None,
                    ToolCalling::Native,
                ),
            )],
            backend.clone(),
        );

        let mut state = state_with_instruction();
        let patch = ExecutorNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        assert_eq!(backend.calls(), vec!["tap(text=\"Settings\")"]);
        assert_eq!(state.executor_messages.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_tool_result_is_feedback_not_fatal() {
        let backend = Arc::new(RecordingBackend::new().failing_on("tap"));
        let ctx = context_with(
            vec![(
                AgentRole::Executor,
                scripted_binding(
                    ScriptedInference::with_replies(vec![
                        r#"{"tool_calls": [{"name": "tap", "parameters": {"selector_request": {"text": "Ghost"}}}], "reasoning": "tapping"}"#,
                    ]),
                    None,
                    ToolCalling::JsonProtocol,
                ),
            )],
            backend,
        );

        let mut state = state_with_instruction();
        let patch = ExecutorNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        let tool_msg = &state.executor_messages[1];
        assert!(matches!(tool_msg, Message::Tool { is_error: true, .. }));
        assert!(tool_msg.content().contains("Failed to tap"));
    }

    #[tokio::test]
    async fn test_multiple_calls_dispatch_in_order() {
        let backend = Arc::new(RecordingBackend::new());
        let ctx = context_with(
            vec![(
                AgentRole::Executor,
                scripted_binding(
                    ScriptedInference::with_replies(vec![
                        r#"{"tool_calls": [
                            {"name": "tap", "parameters": {"selector_request": {"text": "Search"}}},
                            {"name": "input_text", "parameters": {"text": "dark mode"}}
                        ], "reasoning": "search for the setting"}"#,
                    ]),
                    None,
                    ToolCalling::JsonProtocol,
                ),
            )],
            backend.clone(),
        );

        let mut state = state_with_instruction();
        let patch = ExecutorNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        assert_eq!(
            backend.calls(),
            vec!["tap(text=\"Search\")", "input_text(\"dark mode\")"]
        );
    }

    #[tokio::test]
    async fn test_malformed_envelope_degrades_to_feedback() {
        let backend = Arc::new(RecordingBackend::new());
        let ctx = context_with(
            vec![(
                AgentRole::Executor,
                scripted_binding(
                    ScriptedInference::with_replies(vec!["certainly! here is what I will do"]),
                    None,
                    ToolCalling::JsonProtocol,
                ),
            )],
            backend.clone(),
        );

        let mut state = state_with_instruction();
        let patch = ExecutorNode::new(&ctx).run(&state).await.unwrap();
        state.apply(patch);

        assert!(backend.calls().is_empty());
        assert_eq!(state.executor_messages.len(), 1);
        assert!(state.executor_messages[0]
            .content()
            .contains("Failed to parse tool response"));
    }
}
