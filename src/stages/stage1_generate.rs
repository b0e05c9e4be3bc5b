use tracing::info;

use crate::error::PipelineError;
use crate::llm::{build_generate_prompt, build_generator_system_prompt, TextBackend};

use super::{call_backend, StageConfig, StageName};

/// Execute Stage 1: draw the diagram
///
/// The backend's text is returned as-is (apart from surrounding whitespace);
/// fences and stray prose are left for the fixer and the validator.
/// `feedback` explains why the previous attempt was rejected.
pub async fn generate<B: TextBackend + ?Sized>(
    backend: &B,
    instructions: &str,
    feedback: Option<&str>,
    config: &StageConfig,
) -> Result<String, PipelineError> {
    info!("Stage 1: Generating document");

    let system = build_generator_system_prompt();
    let prompt = build_generate_prompt(instructions, feedback);
    let candidate = call_backend(backend, StageName::Generate, &system, &prompt, config).await?;

    info!("Stage 1: candidate of {} chars", candidate.len());
    Ok(candidate)
}
