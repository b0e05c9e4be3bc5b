pub mod stage0_plan;
pub mod stage1_generate;
pub mod stage2_fix;
pub mod stage3_export;

pub use stage0_plan::*;
pub use stage1_generate::*;
pub use stage2_fix::*;
pub use stage3_export::*;

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::PipelineError;
use crate::llm::TextBackend;

/// Pipeline stage identifiers, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    Plan,
    Generate,
    Fix,
    Validate,
    Export,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageName::Plan => "plan",
            StageName::Generate => "generate",
            StageName::Fix => "fix",
            StageName::Validate => "validate",
            StageName::Export => "export",
        };
        f.write_str(name)
    }
}

/// Settings shared by the backend-calling stages
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Deadline for a single backend round trip
    pub timeout: Duration,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

/// Make one backend call under the stage deadline
///
/// Returns the trimmed response text. A timeout becomes
/// `BackendUnavailable`; blank output becomes `EmptyOutput`.
pub(crate) async fn call_backend<B: TextBackend + ?Sized>(
    backend: &B,
    stage: StageName,
    system: &str,
    user: &str,
    config: &StageConfig,
) -> Result<String, PipelineError> {
    let start = Instant::now();
    let response = tokio::time::timeout(config.timeout, backend.complete(system, user))
        .await
        .map_err(|_| {
            PipelineError::BackendUnavailable(format!(
                "{} stage timed out after {}s",
                stage,
                config.timeout.as_secs_f64()
            ))
        })??;

    debug!(
        "{} stage: backend answered in {} ms ({} chars)",
        stage,
        start.elapsed().as_millis(),
        response.len()
    );

    let text = response.trim();
    if text.is_empty() {
        return Err(PipelineError::EmptyOutput { stage });
    }
    Ok(text.to_string())
}
