//! System prompts for the agent nodes.

use crate::device::format_tools_list;

use super::apps::format_app_packages;

/// Planner system prompt: decompose a goal into ordered subgoals.
const PLANNER_SYSTEM: &str = r#"You are the planning module of a mobile automation agent. Break the user's goal into a short, ordered list of concrete subgoals that can each be completed with on-screen actions.

Rules:
- Each subgoal is one observable milestone (an app opened, a field filled, a message sent).
- Prefer few, meaningful subgoals over many tiny ones.
- When replanning after a failure, keep subgoals that already succeeded and rework only the failed part.

Respond with a JSON object of this exact shape:
{
  "subgoals": [
    {"id": null, "description": "First step"},
    {"id": null, "description": "Second step"}
  ]
}
Leave "id" null for new subgoals; reuse the previous id only when keeping a subgoal unchanged."#;

/// Cortex system prompt: decide the next instruction or declare completion.
const CORTEX_SYSTEM: &str = r#"You are the decision module of a mobile automation agent. Each cycle you see the goal, the subgoal plan, your earlier thoughts, and the latest screen context. Decide ONE of:

1. The current subgoal is complete: list its id in "complete_subgoals_by_ids" and set "decisions" to "{}".
2. More work is needed: describe the next device action as a JSON instruction in "decisions" and leave "complete_subgoals_by_ids" empty.

Never do both. Completion is only recognized when "decisions" is empty.

Respond with a JSON object:
{
  "decisions": "<stringified JSON instruction, or \"{}\" when completing>",
  "agent_thought": "<one short sentence of reasoning>",
  "complete_subgoals_by_ids": []
}"#;

/// Executor system prompt: translate an instruction into tool calls.
const EXECUTOR_SYSTEM: &str = r#"You are the execution module of a mobile automation agent. You receive the decision module's reasoning and a structured instruction. Carry it out by calling the device tools, usually one call per turn. Select UI elements by their visible text when possible."#;

/// Prompt for the first-cycle vision pass over the screen.
pub const SCREEN_ANALYSIS_PROMPT: &str = "You are a screen analyzer for mobile automation. Describe briefly: 1) which app or screen is visible, 2) the key UI elements present, 3) the current state (locked, home screen, inside an app). Keep it concise and useful for planning automation steps.";

/// Render the planner system prompt.
pub fn render_planner_prompt() -> String {
    format!(
        "{PLANNER_SYSTEM}\n\nThe executor can use these device tools:\n{}",
        format_tools_list()
    )
}

/// Render the planner's per-request message.
pub fn render_planner_request(
    replan: bool,
    goal: &str,
    previous_plan: &str,
    thoughts: &str,
    screen_analysis: Option<&str>,
) -> String {
    let action = if replan {
        "A subgoal has failed; revise the plan."
    } else {
        "Create the initial plan."
    };
    let mut request = format!("{action}\n\nGoal: {goal}\n");
    if !previous_plan.is_empty() {
        request.push_str(&format!("\nPrevious plan:\n{previous_plan}\n"));
    }
    if !thoughts.is_empty() {
        request.push_str(&format!("\nAgent thoughts so far:\n{thoughts}\n"));
    }
    if let Some(analysis) = screen_analysis {
        request.push_str(&format!("\nCurrent screen:\n{analysis}\n"));
    }
    request
}

/// Render the cortex system prompt for one decision cycle.
pub fn render_cortex_prompt(
    goal: &str,
    plan: &str,
    current_subgoal: Option<&str>,
    executor_feedback: &str,
) -> String {
    format!(
        "{CORTEX_SYSTEM}\n\nGoal: {goal}\n\nSubgoal plan:\n{plan}\n\nCurrent subgoal: {}\n\nExecutor feedback:\n{executor_feedback}\n\nAvailable device tools:\n{}",
        current_subgoal.unwrap_or("none"),
        format_tools_list()
    )
}

/// Render the executor system prompt. With `json_protocol` the model gets
/// the manual tool-call envelope instructions instead of native tools.
pub fn render_executor_prompt(json_protocol: bool) -> String {
    let mut prompt = format!(
        "{EXECUTOR_SYSTEM}\n\nKnown app packages:\n{}",
        format_app_packages()
    );
    if json_protocol {
        prompt.push_str(&format!(
            r#"

Available tools:
{}

Respond ONLY with a JSON object of this shape:
{{
  "tool_calls": [
    {{"name": "tool_name", "parameters": {{}}}}
  ],
  "reasoning": "Brief explanation of why you are calling these tools"
}}

For selectors use {{"selector_request": {{"text": "element text"}}}} unless you have a better key."#,
            format_tools_list()
        ));
    }
    prompt
}
