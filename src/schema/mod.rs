//! Deterministic validation and repair of candidate diagram documents.
//!
//! Whatever text the backend produced, [`validate_and_repair`] either rejects
//! it as unreadable or returns a document that satisfies every structural
//! invariant: unique dense ids, resolved references, catalog styles, padded
//! group geometry and non-overlapping siblings. Repair is a fixpoint: feeding
//! the output back in yields the same document.

pub mod layout;
pub mod parse;
pub mod repair;
pub mod sanitize;

use std::fmt;

use serde::Serialize;

pub use repair::validate_and_repair;

use crate::models::Document;

/// Margin between a group's border and the bounding box of its children
pub const GROUP_PADDING: i64 = 20;
/// Horizontal gap left when a sibling is moved out of an overlap
pub const SIBLING_SPACING: i64 = 50;
/// Width given to vertices with a missing or non-positive width
pub const DEFAULT_WIDTH: i64 = 120;
/// Height given to vertices with a missing or non-positive height
pub const DEFAULT_HEIGHT: i64 = 60;
/// Largest x or y accepted from a candidate; larger values are clamped
pub const MAX_COORDINATE: i64 = 1_000_000_000;
/// Largest width or height accepted from a candidate; larger values are clamped
pub const MAX_EXTENT: i64 = 1_000_000;

/// Category of a problem found (and fixed) during repair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Text around or inside the markup had to be cleaned before parsing
    Sanitized,
    /// A required attribute was absent and defaulted
    MissingAttribute,
    /// An id was reused by more than one cell
    DuplicateId,
    /// A style was rewritten to its catalog entry
    StyleCoerced,
    /// A cell could not be repaired and was removed
    CellDropped,
    /// A vertex label was empty
    EmptyLabel,
    /// An edge carried a label
    EdgeLabelStripped,
    /// Geometry values were missing, fractional or out of range
    GeometryFixed,
    /// A parent reference pointed at something that is not a container
    ParentReassigned,
    /// A vertex drawn inside a group was moved into it
    GroupAdopted,
    /// An edge endpoint did not resolve
    DanglingEdge,
    /// A group's geometry was recomputed from its children
    GroupResized,
    /// A vertex was moved off an overlapping sibling
    OverlapResolved,
    /// Ids were re-issued
    IdsRenumbered,
}

/// A single finding, kept for observability only
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Original id of the affected cell, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            cell: None,
            message: message.into(),
        }
    }

    pub fn for_cell(kind: IssueKind, cell: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            cell: Some(cell.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cell {
            Some(cell) => write!(f, "cell {}: {}", cell, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Output of a successful repair
#[derive(Debug, Clone)]
pub struct Repaired {
    /// The validated document model
    pub document: Document,
    /// Canonical serialized form of `document`
    pub xml: String,
    /// Everything that was changed on the way
    pub issues: Vec<Issue>,
}

impl Repaired {
    /// A document with no vertices is valid but useless
    pub fn has_content(&self) -> bool {
        self.document.vertex_count() > 0
    }
}
