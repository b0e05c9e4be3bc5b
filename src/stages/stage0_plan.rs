use tracing::{info, warn};

use crate::error::PipelineError;
use crate::llm::{build_plan_prompt, TextBackend, PLANNER_SYSTEM_PROMPT};

use super::{call_backend, StageConfig, StageName};

/// Result of the planning stage
///
/// Planning never fails a request: when the backend cannot help, the
/// orchestrator falls back to the user's own words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Structured drawing instructions
    Instructions(String),
    /// The backend failed or answered with nothing
    NoInstructions(PipelineError),
}

impl PlanOutcome {
    /// The text the generator should work from
    pub fn into_instructions(self, user_prompt: &str) -> String {
        match self {
            PlanOutcome::Instructions(text) => text,
            PlanOutcome::NoInstructions(_) => user_prompt.to_string(),
        }
    }
}

/// Execute Stage 0: restate the description as structured instructions
pub async fn plan<B: TextBackend + ?Sized>(
    backend: &B,
    user_prompt: &str,
    config: &StageConfig,
) -> PlanOutcome {
    info!("Stage 0: Planning diagram ({} chars of input)", user_prompt.len());

    let prompt = build_plan_prompt(user_prompt);
    match call_backend(backend, StageName::Plan, PLANNER_SYSTEM_PROMPT, &prompt, config).await {
        Ok(instructions) => {
            info!("Stage 0: {} lines of instructions", instructions.lines().count());
            PlanOutcome::Instructions(instructions)
        }
        Err(e) => {
            warn!("Stage 0: no instructions ({}), using the raw prompt", e);
            PlanOutcome::NoInstructions(e)
        }
    }
}
