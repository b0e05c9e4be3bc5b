use tracing::info;

use crate::error::PipelineError;
use crate::llm::{build_fix_prompt, build_fixer_system_prompt, TextBackend};

use super::{call_backend, StageConfig, StageName};

/// Execute Stage 2: ask the backend to correct the candidate
///
/// Best effort only. The result still goes through the deterministic
/// validator.
pub async fn fix<B: TextBackend + ?Sized>(
    backend: &B,
    candidate: &str,
    config: &StageConfig,
) -> Result<String, PipelineError> {
    info!("Stage 2: Fixing candidate ({} chars)", candidate.len());

    let system = build_fixer_system_prompt();
    let prompt = build_fix_prompt(candidate);
    let fixed = call_backend(backend, StageName::Fix, &system, &prompt, config).await?;

    info!("Stage 2: fixed candidate of {} chars", fixed.len());
    Ok(fixed)
}
