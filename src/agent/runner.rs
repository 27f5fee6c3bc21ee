//! The orchestration loop: fixed node order, completion detection, and the
//! cycle budget.

use chrono::{DateTime, Utc};

use super::contextor::ContextorNode;
use super::cortex::CortexNode;
use super::executor::ExecutorNode;
use super::planner::PlannerNode;
use super::state::State;
use super::summarizer::{SummarizerNode, DEFAULT_MAX_MESSAGES_IN_HISTORY};
use super::{AgentContext, AgentError};

/// Loop phases. The order is fixed; only the Deciding phase branches,
/// skipping Executing on completion cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Planning,
    ContextGathering,
    Deciding,
    Executing,
    Summarizing,
    Done,
    Failed,
}

/// Loop driver configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum full cycles before the run is aborted.
    pub max_cycles: u32,
    /// Conversation length cap enforced by the summarizer.
    pub max_history: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_cycles: 25,
            max_history: DEFAULT_MAX_MESSAGES_IN_HISTORY,
        }
    }
}

impl RunnerConfig {
    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }
}

/// What a finished run hands back to the caller: the final state plus the
/// trail needed for observability.
#[derive(Debug)]
pub struct RunReport {
    pub goal: String,
    pub cycles: u32,
    pub state: State,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Human-readable summary of the plan and thought trail.
    pub fn summary(&self) -> String {
        let plan = self
            .state
            .subgoal_plan
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Goal: {}\nCycles: {}\n\nPlan:\n{}\n\nThoughts:\n{}",
            self.goal,
            self.cycles,
            plan,
            self.state.agents_thoughts.join("\n")
        )
    }
}

/// Drives the node sequence over an exclusively-owned [`State`] until every
/// subgoal succeeded or the run fails. Nodes execute strictly sequentially;
/// the state is handed to exactly one node at a time.
pub struct AgentRunner {
    ctx: AgentContext,
    config: RunnerConfig,
}

impl AgentRunner {
    pub fn new(ctx: AgentContext, config: RunnerConfig) -> Self {
        Self { ctx, config }
    }

    /// Run the loop for one goal. Unrecoverable node errors surface as
    /// [`AgentError`]; recoverable conditions were already folded into state
    /// by the nodes themselves.
    pub async fn run(&self, goal: &str) -> Result<RunReport, AgentError> {
        let started_at = Utc::now();
        let mut state = State::new(goal);
        let mut cycles: u32 = 0;
        let mut phase = LoopPhase::Planning;

        let planner = PlannerNode::new(&self.ctx);
        let contextor = ContextorNode::new(&self.ctx);
        let cortex = CortexNode::new(&self.ctx);
        let executor = ExecutorNode::new(&self.ctx);
        let summarizer = SummarizerNode::new(self.config.max_history);

        tracing::info!(goal, "starting agent run");

        loop {
            match phase {
                LoopPhase::Planning => {
                    if state.plan_complete() {
                        phase = LoopPhase::Done;
                        continue;
                    }
                    match planner.run(&state).await {
                        Ok(patch) => state.apply(patch),
                        Err(e) => return self.fail(e),
                    }
                    phase = LoopPhase::ContextGathering;
                }
                LoopPhase::ContextGathering => {
                    match contextor.run(&state).await {
                        Ok(patch) => state.apply(patch),
                        Err(e) => return self.fail(e),
                    }
                    phase = LoopPhase::Deciding;
                }
                LoopPhase::Deciding => {
                    match cortex.run(&state).await {
                        Ok(patch) => state.apply(patch),
                        Err(e) => return self.fail(e),
                    }
                    // Instruction cycles execute; completion cycles go
                    // straight to the summarizer.
                    phase = if state.structured_decisions.is_some() {
                        LoopPhase::Executing
                    } else {
                        LoopPhase::Summarizing
                    };
                }
                LoopPhase::Executing => {
                    match executor.run(&state).await {
                        Ok(patch) => state.apply(patch),
                        Err(e) => return self.fail(e),
                    }
                    phase = LoopPhase::Summarizing;
                }
                LoopPhase::Summarizing => {
                    state.apply(summarizer.run(&state));
                    cycles += 1;
                    if cycles >= self.config.max_cycles && !state.plan_complete() {
                        tracing::error!(cycles, "cycle budget exhausted");
                        return Err(AgentError::MaxCyclesReached(cycles));
                    }
                    phase = LoopPhase::Planning;
                }
                LoopPhase::Done => break,
                LoopPhase::Failed => unreachable!("failed runs return early"),
            }
        }

        let report = RunReport {
            goal: goal.to_string(),
            cycles,
            state,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(cycles = report.cycles, "agent run complete");
        Ok(report)
    }

    fn fail(&self, error: AgentError) -> Result<RunReport, AgentError> {
        tracing::error!("agent run failed: {error}");
        Err(error)
    }
}
