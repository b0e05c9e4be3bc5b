use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::llm::TextBackend;
use crate::models::{Request, Response};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::stages::{export, ExportConfig};

/// Turns diagram requests into responses
///
/// Holds only immutable configuration, so one service can serve any number
/// of concurrent requests.
pub struct DiagramService {
    backend: Arc<dyn TextBackend>,
    pipeline: PipelineConfig,
    export: ExportConfig,
}

impl DiagramService {
    pub fn new(backend: Arc<dyn TextBackend>, pipeline: PipelineConfig, export: ExportConfig) -> Self {
        Self {
            backend,
            pipeline,
            export,
        }
    }

    /// Handle one request end to end
    ///
    /// Never fails: every error becomes a [`Response::Failure`].
    pub async fn handle(&self, request: Request) -> Response {
        let span = info_span!("request", id = %Uuid::new_v4());
        self.handle_inner(request).instrument(span).await
    }

    async fn handle_inner(&self, request: Request) -> Response {
        if request.input.trim().is_empty() {
            warn!("Rejected request with empty input");
            return Response::failure("request input is empty");
        }
        info!("Handling request ({} chars, format {})", request.input.len(), request.format);

        let pipeline = Pipeline::new(self.backend.as_ref(), &self.pipeline);
        let output = match pipeline.run(&request.input).await {
            Ok(output) => output,
            Err(e) => return Response::failure(e),
        };

        match export(
            &output.repaired.xml,
            request.filename.as_deref(),
            request.format,
            request.render,
            &self.export,
        )
        .await
        {
            Ok(result) => {
                info!("Request complete after {} attempt(s)", output.attempts);
                Response::Success {
                    document_path: result.document_path,
                    rendered_path: result.rendered_path,
                    render_error: result.render_error,
                }
            }
            Err(e) => {
                warn!("Export failed: {}", e);
                Response::failure(e)
            }
        }
    }
}
