//! Planner node: produces or revises the ordered subgoal plan.

use serde::Deserialize;

use crate::config::{render_planner_prompt, render_planner_request, AgentRole};
use crate::model::MessageBuilder;

use super::state::{Field, State, StatePatch, Subgoal};
use super::{AgentContext, AgentError};

/// Raw planner model output before materialization.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerOutput {
    pub subgoals: Vec<RawSubgoal>,
}

/// One raw subgoal entry. Any status the model hallucinates is discarded
/// along with unknown fields; only the id and description survive.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSubgoal {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
}

/// Produces an initial plan from the goal, or replans after a subgoal
/// failure. An existing plan without failures is never discarded.
pub struct PlannerNode<'a> {
    ctx: &'a AgentContext,
}

impl<'a> PlannerNode<'a> {
    pub fn new(ctx: &'a AgentContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, state: &State) -> Result<StatePatch, AgentError> {
        let needs_replan = state.has_failed_subgoal();

        if !state.subgoal_plan.is_empty() && !needs_replan {
            tracing::debug!("existing plan is still valid, planner is a no-op");
            return Ok(StatePatch::depth_only());
        }

        let system = self
            .ctx
            .knowledge
            .enhance("planner", &render_planner_prompt());
        let previous_plan = state
            .subgoal_plan
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        let request = render_planner_request(
            needs_replan,
            &state.initial_goal,
            &previous_plan,
            &state.agents_thoughts.join("\n"),
            state.screen_analysis.as_deref(),
        );

        let messages = vec![
            MessageBuilder::system(&system),
            MessageBuilder::user(&request, None),
        ];

        // A planning failure propagates: without a plan the loop cannot
        // proceed.
        let output: PlannerOutput = self
            .ctx
            .gateway
            .invoke(AgentRole::Planner, &messages)
            .await?;

        let plan: Vec<Subgoal> = output
            .subgoals
            .into_iter()
            .map(|raw| Subgoal::new(raw.id.filter(|id| !id.is_empty()), raw.description))
            .collect();

        tracing::info!(
            subgoals = plan.len(),
            replan = needs_replan,
            "generated plan:\n{}",
            plan.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        );

        Ok(StatePatch {
            subgoal_plan: Field::Set(plan),
            ..StatePatch::default()
        })
    }
}
