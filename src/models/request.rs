use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Document file name used when a request does not name one
pub const DEFAULT_FILENAME: &str = "diagram.drawio";

/// Image formats the external renderer can produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    #[default]
    Png,
    Pdf,
    Svg,
    Jpg,
}

impl RenderFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RenderFormat::Png => "png",
            RenderFormat::Pdf => "pdf",
            RenderFormat::Svg => "svg",
            RenderFormat::Jpg => "jpg",
        }
    }
}

impl fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for RenderFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(RenderFormat::Png),
            "pdf" => Ok(RenderFormat::Pdf),
            "svg" => Ok(RenderFormat::Svg),
            "jpg" | "jpeg" => Ok(RenderFormat::Jpg),
            other => Err(format!("unsupported render format: {other}")),
        }
    }
}

fn default_render() -> bool {
    true
}

/// A diagram request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Natural-language architecture description
    pub input: String,
    /// Document file name
    #[serde(default)]
    pub filename: Option<String>,
    /// Rendered image format
    #[serde(default, alias = "fmt")]
    pub format: RenderFormat,
    /// Whether to invoke the external renderer at all
    #[serde(default = "default_render")]
    pub render: bool,
}

impl Request {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            filename: None,
            format: RenderFormat::default(),
            render: true,
        }
    }
}

/// Outcome of a request: the document path (plus the image path when
/// rendering succeeded), or a single error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success {
        document_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rendered_path: Option<PathBuf>,
        /// Why rendering failed, when it was requested and did not succeed
        #[serde(default, skip_serializing_if = "Option::is_none")]
        render_error: Option<String>,
    },
    Failure {
        error: String,
    },
}

impl Response {
    pub fn failure(error: impl ToString) -> Self {
        Response::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}
