use crate::stages::StageName;

/// Failure kinds surfaced by the generation pipeline
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// The text-generation service failed, timed out, or returned an error status
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A stage produced no usable text
    #[error("{stage} stage produced no usable output")]
    EmptyOutput { stage: StageName },

    /// The candidate document could not be read as a diagram, or nothing survived repair
    #[error("invalid diagram document: {0}")]
    SchemaInvalid(String),

    /// The external renderer failed or left no output file
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// A required credential or endpoint is absent
    #[error("missing configuration: {0}")]
    ConfigMissing(String),
}
