use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::TextBackend;
use crate::schema::{validate_and_repair, Repaired};
use crate::stages::{fix, generate, plan, StageConfig};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How many generator attempts before giving up
    pub max_attempts: u32,
    /// Run the backend fixer before the deterministic validator
    pub use_fixer: bool,
    /// Per-call backend settings
    pub stage: StageConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            use_fixer: true,
            stage: StageConfig::default(),
        }
    }
}

/// Data carried between stages for one request
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    /// The user's description, never modified
    pub user_prompt: String,
    /// Planner output, or the user prompt when planning produced nothing
    pub instructions: Option<String>,
    /// Latest generator or fixer output
    pub candidate: Option<String>,
}

impl WorkflowState {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            ..Default::default()
        }
    }
}

/// Orchestrator state; `attempt` counts generator runs starting at 1
#[derive(Debug)]
enum PipelineState {
    Plan,
    Generate { attempt: u32, feedback: Option<String> },
    Fix { attempt: u32 },
    Validate { attempt: u32 },
    Done { repaired: Repaired, attempts: u32 },
    Failed(PipelineError),
}

/// A validated document and how many generator runs it took
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub repaired: Repaired,
    pub attempts: u32,
}

/// Plan -> generate -> fix -> validate, looping back to generate on rejection
pub struct Pipeline<'a, B: TextBackend + ?Sized> {
    backend: &'a B,
    config: &'a PipelineConfig,
}

impl<'a, B: TextBackend + ?Sized> Pipeline<'a, B> {
    pub fn new(backend: &'a B, config: &'a PipelineConfig) -> Self {
        Self { backend, config }
    }

    /// Run one request to completion
    pub async fn run(&self, user_prompt: &str) -> Result<PipelineOutput, PipelineError> {
        let mut workflow = WorkflowState::new(user_prompt);
        let mut state = PipelineState::Plan;

        loop {
            state = match state {
                PipelineState::Done { repaired, attempts } => {
                    return Ok(PipelineOutput { repaired, attempts });
                }
                PipelineState::Failed(e) => {
                    warn!("Pipeline failed: {}", e);
                    return Err(e);
                }
                other => self.step(other, &mut workflow).await,
            };
        }
    }

    async fn step(&self, state: PipelineState, workflow: &mut WorkflowState) -> PipelineState {
        let stage = &self.config.stage;

        match state {
            PipelineState::Plan => {
                let outcome = plan(self.backend, &workflow.user_prompt, stage).await;
                workflow.instructions = Some(outcome.into_instructions(&workflow.user_prompt));
                PipelineState::Generate {
                    attempt: 1,
                    feedback: None,
                }
            }

            PipelineState::Generate { attempt, feedback } => {
                let instructions = workflow
                    .instructions
                    .as_deref()
                    .unwrap_or(&workflow.user_prompt);
                match generate(self.backend, instructions, feedback.as_deref(), stage).await {
                    Ok(candidate) => {
                        workflow.candidate = Some(candidate);
                        if self.config.use_fixer {
                            PipelineState::Fix { attempt }
                        } else {
                            PipelineState::Validate { attempt }
                        }
                    }
                    Err(e) => PipelineState::Failed(e),
                }
            }

            PipelineState::Fix { attempt } => {
                let candidate = workflow.candidate.as_deref().unwrap_or_default();
                match fix(self.backend, candidate, stage).await {
                    Ok(fixed) => {
                        workflow.candidate = Some(fixed);
                        PipelineState::Validate { attempt }
                    }
                    Err(e) => PipelineState::Failed(e),
                }
            }

            PipelineState::Validate { attempt } => {
                let candidate = workflow.candidate.as_deref().unwrap_or_default();
                let rejection = match validate_and_repair(candidate) {
                    Ok(repaired) if repaired.has_content() => {
                        if !repaired.issues.is_empty() {
                            warn!("Validator repaired {} issue(s)", repaired.issues.len());
                        }
                        info!(
                            "Validated document: {} vertices, {} edges (attempt {})",
                            repaired.document.vertex_count(),
                            repaired.document.edge_count(),
                            attempt
                        );
                        return PipelineState::Done {
                            repaired,
                            attempts: attempt,
                        };
                    }
                    Ok(_) => PipelineError::SchemaInvalid("no vertices survived repair".to_string()),
                    Err(e) => e,
                };

                if attempt < self.config.max_attempts {
                    info!(
                        "Attempt {}/{} rejected ({}), generating again",
                        attempt, self.config.max_attempts, rejection
                    );
                    PipelineState::Generate {
                        attempt: attempt + 1,
                        feedback: Some(rejection.to_string()),
                    }
                } else {
                    debug!("Retry ceiling of {} reached", self.config.max_attempts);
                    PipelineState::Failed(rejection)
                }
            }

            done @ (PipelineState::Done { .. } | PipelineState::Failed(_)) => done,
        }
    }
}
