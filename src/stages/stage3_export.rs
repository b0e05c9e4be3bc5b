use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::{RenderFormat, DEFAULT_FILENAME};

const DOCUMENT_EXTENSION: &str = "drawio";

#[cfg(target_os = "macos")]
const DEFAULT_RENDERER: &str = "/Applications/draw.io.app/Contents/MacOS/draw.io";
#[cfg(target_os = "windows")]
const DEFAULT_RENDERER: &str = r"C:\Program Files\draw.io\draw.io.exe";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_RENDERER: &str = "drawio";

/// Configuration for Stage 3 export
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory the document (and image) are written to
    pub out_dir: PathBuf,
    /// External draw.io program
    pub renderer: PathBuf,
    /// Render scale factor
    pub scale: f64,
    /// Deadline for one renderer run
    pub render_timeout: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            renderer: std::env::var_os("DRAWIO_BIN")
                .filter(|bin| !bin.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDERER)),
            scale: 2.5,
            render_timeout: Duration::from_secs(60),
        }
    }
}

/// Result of Stage 3 export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// Where the document was written
    pub document_path: PathBuf,
    /// Where the rendered image was written, if rendering succeeded
    pub rendered_path: Option<PathBuf>,
    /// Why rendering failed, if it was attempted and did not succeed
    pub render_error: Option<String>,
}

/// Turn a requested name into a safe document file name
///
/// Only the final path component is kept and `.drawio` is appended when
/// the name lacks it.
pub fn document_file_name(requested: Option<&str>) -> String {
    let name = requested
        .and_then(|r| Path::new(r.trim()).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or(DEFAULT_FILENAME);

    let has_extension = Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION));
    if has_extension {
        name.to_string()
    } else {
        format!("{}.{}", name, DOCUMENT_EXTENSION)
    }
}

/// Image path for a document: same stem, format extension
pub fn rendered_path_for(document_path: &Path, format: RenderFormat) -> PathBuf {
    document_path.with_extension(format.extension())
}

/// Execute Stage 3: persist the document and optionally render it
///
/// Failing to write the document is an error. A render failure is not:
/// the document stays on disk and the failure is reported in the result.
pub async fn export(
    xml: &str,
    filename: Option<&str>,
    format: RenderFormat,
    render: bool,
    config: &ExportConfig,
) -> Result<ExportResult, PipelineError> {
    let document_path = config.out_dir.join(document_file_name(filename));
    info!("Stage 3: Writing document to {:?}", document_path);

    tokio::fs::create_dir_all(&config.out_dir)
        .await
        .map_err(|e| {
            PipelineError::ExportFailed(format!("cannot create {:?}: {}", config.out_dir, e))
        })?;
    tokio::fs::write(&document_path, xml).await.map_err(|e| {
        PipelineError::ExportFailed(format!("cannot write {:?}: {}", document_path, e))
    })?;

    let mut result = ExportResult {
        document_path,
        rendered_path: None,
        render_error: None,
    };
    if !render {
        return Ok(result);
    }

    match render_document(&result.document_path, format, config).await {
        Ok(path) => {
            info!("Stage 3: Rendered {} to {:?}", format, path);
            result.rendered_path = Some(path);
        }
        Err(e) => {
            warn!("Stage 3: {}", e);
            result.render_error = Some(e.to_string());
        }
    }
    Ok(result)
}

/// Run the external renderer on a written document
pub async fn render_document(
    document_path: &Path,
    format: RenderFormat,
    config: &ExportConfig,
) -> Result<PathBuf, PipelineError> {
    let output_path = rendered_path_for(document_path, format);
    let renderer = config.renderer.display().to_string();

    let mut child = Command::new(&config.renderer)
        .arg("-x")
        .arg("-f")
        .arg(format.extension())
        .arg("--scale")
        .arg(config.scale.to_string())
        .arg("-o")
        .arg(&output_path)
        .arg(document_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::ExportFailed(format!("failed to start {}: {}", renderer, e)))?;

    let mut stderr_pipe = child.stderr.take();
    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stderr_pipe {
            pipe.read_to_end(&mut buf).await.ok();
        }
        String::from_utf8_lossy(&buf).into_owned()
    };

    let status = match tokio::time::timeout(config.render_timeout, async {
        tokio::join!(child.wait(), read_stderr)
    })
    .await
    {
        Ok((Ok(status), stderr)) => {
            if !status.success() {
                let detail = stderr.trim();
                return Err(PipelineError::ExportFailed(if detail.is_empty() {
                    format!("{} exited with {}", renderer, status)
                } else {
                    format!("{} exited with {}: {}", renderer, status, detail)
                }));
            }
            status
        }
        Ok((Err(e), _)) => {
            return Err(PipelineError::ExportFailed(format!(
                "failed to wait on {}: {}",
                renderer, e
            )));
        }
        Err(_) => {
            let _ = child.kill().await;
            return Err(PipelineError::ExportFailed(format!(
                "{} timed out after {}s",
                renderer,
                config.render_timeout.as_secs_f64()
            )));
        }
    };

    if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
        return Err(PipelineError::ExportFailed(format!(
            "{} exited with {} but wrote no {:?}",
            renderer, status, output_path
        )));
    }
    Ok(output_path)
}
