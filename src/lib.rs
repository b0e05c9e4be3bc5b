pub mod error;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod service;
pub mod stages;

pub use error::PipelineError;
pub use io::{read_prompt, read_request, read_text, write_response, write_text_file, ValidationReport};
pub use llm::{AnthropicClient, AnthropicConfig, TextBackend};
pub use models::{Document, RenderFormat, Request, Response};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput};
pub use schema::{validate_and_repair, Issue, Repaired};
pub use service::DiagramService;
pub use stages::{ExportConfig, StageConfig};
