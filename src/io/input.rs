use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::models::Request;

/// Read text from a file, or from stdin when no path is given
pub fn read_text(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {:?}", path)),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Read an architecture description
pub fn read_prompt(path: Option<&Path>) -> Result<String> {
    let prompt = read_text(path)?;
    if prompt.trim().is_empty() {
        bail!("Architecture description is empty");
    }
    Ok(prompt)
}

/// Read a JSON request from a file or stdin
pub fn read_request(path: Option<&Path>) -> Result<Request> {
    parse_request_json(&read_text(path)?)
}

/// Parse a JSON request
pub fn parse_request_json(json: &str) -> Result<Request> {
    serde_json::from_str(json).context("Failed to parse request JSON")
}
