//! Contextor node: captures the per-cycle device snapshot and, on the first
//! cycle, a vision-based scene description.

use crate::config::{AgentRole, SCREEN_ANALYSIS_PROMPT};
use crate::device::{SCREENSHOT_TOOL, UI_MUTATING_TOOLS};
use crate::model::MessageBuilder;

use super::state::{Field, Message, State, StatePatch};
use super::{AgentContext, AgentError};

/// Whether the screenshot should stay in this cycle's prompt: yes when the
/// most recent executed tool mutated the UI or explicitly asked for one.
fn should_keep_screenshot(executor_messages: &[Message]) -> bool {
    for message in executor_messages.iter().rev() {
        if let Some(name) = message.tool_name() {
            return name == SCREENSHOT_TOOL || UI_MUTATING_TOOLS.contains(name);
        }
    }
    false
}

/// Gathers perception context from the device backend every cycle. The UI
/// hierarchy is always retained; the screenshot only when it is worth its
/// prompt size.
pub struct ContextorNode<'a> {
    ctx: &'a AgentContext,
}

impl<'a> ContextorNode<'a> {
    pub fn new(ctx: &'a AgentContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, state: &State) -> Result<StatePatch, AgentError> {
        let screen = self.ctx.device.get_screen_data().await?;
        let focused_app = self.ctx.device.get_focused_app().await?;
        let device_date = self.ctx.device.get_device_date().await?;

        let first_cycle = state.subgoal_plan.is_empty();
        let keep_screenshot = first_cycle || should_keep_screenshot(&state.executor_messages);

        let mut patch = StatePatch {
            latest_screenshot: Field::Set(keep_screenshot.then(|| screen.base64.clone())),
            latest_ui_hierarchy: Field::Set(Some(screen.elements.clone())),
            focused_app_info: Field::Set(focused_app),
            device_date: Field::Set(Some(device_date)),
            screen_size: Field::Set(Some((screen.width, screen.height))),
            ..StatePatch::default()
        };

        if first_cycle {
            // A vision failure degrades to planning without a scene
            // description instead of aborting the run.
            match self.analyze_screen(&screen.base64).await {
                Ok(analysis) => {
                    tracing::info!("screen analysis: {analysis}");
                    patch.screen_analysis = Field::Set(Some(analysis));
                }
                Err(e) => {
                    tracing::warn!("vision analysis failed: {e}");
                }
            }
        }

        Ok(patch)
    }

    async fn analyze_screen(&self, screenshot_base64: &str) -> Result<String, AgentError> {
        let system = self
            .ctx
            .knowledge
            .enhance("contextor", SCREEN_ANALYSIS_PROMPT);
        let messages = vec![
            MessageBuilder::system(&system),
            MessageBuilder::user(
                &format!("Analyze this {} screen:", self.ctx.platform),
                Some(screenshot_base64),
            ),
        ];
        Ok(self
            .ctx
            .gateway
            .generate_with_fallback(AgentRole::Contextor, &messages)
            .await?)
    }
}
