use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::Response;
use crate::schema::{Issue, Repaired};

/// Summary of a standalone validation run
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub vertices: usize,
    pub edges: usize,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn from_repaired(repaired: &Repaired) -> Self {
        Self {
            vertices: repaired.document.vertex_count(),
            edges: repaired.document.edge_count(),
            issues: repaired.issues.clone(),
        }
    }

    /// Human-readable report
    pub fn format(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{} vertices, {} edges, {} issue(s)\n",
            self.vertices,
            self.edges,
            self.issues.len()
        ));
        for issue in &self.issues {
            output.push_str(&format!("  - {}\n", issue));
        }
        output
    }
}

/// Write text to a file, creating parent directories
pub fn write_text_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write file: {:?}", path))
}

/// Print a response as JSON
pub fn write_response<W: Write>(response: &Response, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, response).context("Failed to write JSON")?;
    writeln!(writer).context("Failed to write JSON")?;
    Ok(())
}
