use std::fmt::Write as _;

use serde::Serialize;

use super::style::{Role, EDGE_STYLE};

/// XML declaration every document starts with
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Fixed graph model header (canvas, background and grid settings)
pub const GRAPH_MODEL_OPEN: &str = r##"<mxGraphModel dx="1434" dy="784" grid="1" gridSize="10" guides="1" tooltips="1" connect="1" arrows="1" fold="1" page="1" pageScale="1" pageWidth="850" pageHeight="1100" background="#000000">"##;

/// Id of the invisible root cell
pub const ROOT_ID: u32 = 0;
/// Id of the default layer every document carries
pub const DEFAULT_LAYER_ID: u32 = 1;
/// First id available to generated cells
pub const FIRST_CELL_ID: u32 = 2;

/// Axis-aligned rectangle in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Geometry {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    /// Interiors intersect (shared edges do not count)
    pub fn overlaps(&self, other: &Geometry) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn contains(&self, other: &Geometry) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Grow by `margin` on every side
    pub fn inflate(&self, margin: i64) -> Geometry {
        Geometry {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + 2 * margin,
            height: self.height + 2 * margin,
        }
    }

    pub fn union(&self, other: &Geometry) -> Geometry {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Geometry {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    pub fn translate(&mut self, dx: i64, dy: i64) {
        self.x += dx;
        self.y += dy;
    }

    pub fn area(&self) -> i64 {
        self.width * self.height
    }
}

/// What a cell is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellKind {
    /// Non-visual organisational container parented to the root
    Layer,
    /// Visible node; `Role::Group` makes it a container
    Vertex { role: Role, geometry: Geometry },
    /// Connection between two vertices
    Edge { source: u32, target: u32 },
}

/// A validated cell (base cells 0 and 1 are implicit)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub id: u32,
    pub parent: u32,
    /// Unescaped label text; always empty for edges
    pub label: String,
    pub kind: CellKind,
}

impl Cell {
    pub fn is_edge(&self) -> bool {
        matches!(self.kind, CellKind::Edge { .. })
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.kind,
            CellKind::Layer
                | CellKind::Vertex {
                    role: Role::Group,
                    ..
                }
        )
    }

    pub fn role(&self) -> Option<Role> {
        match self.kind {
            CellKind::Vertex { role, .. } => Some(role),
            _ => None,
        }
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match &self.kind {
            CellKind::Vertex { geometry, .. } => Some(geometry),
            _ => None,
        }
    }

    /// The style attribute written for this cell (layers carry none)
    pub fn style(&self) -> Option<&'static str> {
        match self.kind {
            CellKind::Layer => None,
            CellKind::Vertex { role, .. } => Some(role.style()),
            CellKind::Edge { .. } => Some(EDGE_STYLE),
        }
    }
}

/// A structurally valid diagram: cells ordered as they are serialized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    pub cells: Vec<Cell>,
}

impl Document {
    pub fn get(&self, id: u32) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }

    /// Cells drawn as nodes (groups included, layers excluded)
    pub fn vertices(&self) -> impl Iterator<Item = &Cell> {
        self.cells
            .iter()
            .filter(|c| matches!(c.kind, CellKind::Vertex { .. }))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.is_edge())
    }

    pub fn children(&self, parent: u32) -> impl Iterator<Item = &Cell> {
        self.cells
            .iter()
            .filter(move |c| c.parent == parent && !c.is_edge())
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices().count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    /// Canonical XML form of the document
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(XML_DECLARATION);
        out.push('\n');
        out.push_str(GRAPH_MODEL_OPEN);
        out.push_str("\n  <root>\n");
        let _ = writeln!(out, "    <mxCell id=\"{ROOT_ID}\"/>");
        let _ = writeln!(out, "    <mxCell id=\"{DEFAULT_LAYER_ID}\" parent=\"{ROOT_ID}\"/>");

        for cell in &self.cells {
            write_cell(&mut out, cell);
        }

        out.push_str("  </root>\n</mxGraphModel>\n");
        out
    }
}

fn write_cell(out: &mut String, cell: &Cell) {
    match &cell.kind {
        CellKind::Layer => {
            let _ = writeln!(
                out,
                "    <mxCell id=\"{}\" value=\"{}\" parent=\"{}\">",
                cell.id,
                escape_attr(&cell.label),
                cell.parent
            );
            out.push_str(
                "      <mxGeometry x=\"0\" y=\"0\" width=\"0\" height=\"0\" as=\"geometry\"/>\n",
            );
        }
        CellKind::Vertex { role, geometry } => {
            let _ = writeln!(
                out,
                "    <mxCell id=\"{}\" value=\"{}\" style=\"{}\" vertex=\"1\" parent=\"{}\">",
                cell.id,
                escape_attr(&cell.label),
                role.style(),
                cell.parent
            );
            let _ = writeln!(
                out,
                "      <mxGeometry x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" as=\"geometry\"/>",
                geometry.x, geometry.y, geometry.width, geometry.height
            );
        }
        CellKind::Edge { source, target } => {
            let _ = writeln!(
                out,
                "    <mxCell id=\"{}\" style=\"{}\" edge=\"1\" parent=\"{}\" source=\"{}\" target=\"{}\">",
                cell.id, EDGE_STYLE, cell.parent, source, target
            );
            out.push_str("      <mxGeometry relative=\"1\" as=\"geometry\"/>\n");
        }
    }
    out.push_str("    </mxCell>\n");
}

/// Escape text for a double-quoted XML attribute
///
/// Line breaks and tabs become character references so a parser's
/// attribute-value normalization cannot turn them into spaces.
pub fn escape_attr(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr(r#"A & B <"x">"#), "A &amp; B &lt;&quot;x&quot;&gt;");
        assert_eq!(escape_attr("line\nbreak"), "line&#10;break");
        assert_eq!(escape_attr("plain"), "plain");
    }

    #[test]
    fn test_geometry_overlap_and_containment() {
        let a = Geometry::new(0, 0, 100, 50);
        let b = Geometry::new(100, 0, 100, 50);
        let c = Geometry::new(50, 25, 100, 50);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(a.union(&b).contains(&c));
        assert_eq!(a.inflate(20), Geometry::new(-20, -20, 140, 90));
    }

    #[test]
    fn test_to_xml_layout() {
        let doc = Document {
            cells: vec![
                Cell {
                    id: 2,
                    parent: DEFAULT_LAYER_ID,
                    label: "Web & App".to_string(),
                    kind: CellKind::Vertex {
                        role: Role::User,
                        geometry: Geometry::new(40, 40, 120, 60),
                    },
                },
                Cell {
                    id: 3,
                    parent: DEFAULT_LAYER_ID,
                    label: "API".to_string(),
                    kind: CellKind::Vertex {
                        role: Role::Logic,
                        geometry: Geometry::new(240, 40, 120, 60),
                    },
                },
                Cell {
                    id: 4,
                    parent: DEFAULT_LAYER_ID,
                    label: String::new(),
                    kind: CellKind::Edge { source: 2, target: 3 },
                },
            ],
        };

        let xml = doc.to_xml();
        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains(GRAPH_MODEL_OPEN));
        assert!(xml.contains("<mxCell id=\"0\"/>"));
        assert!(xml.contains("<mxCell id=\"1\" parent=\"0\"/>"));
        assert!(xml.contains("value=\"Web &amp; App\""));
        assert!(xml.contains("source=\"2\" target=\"3\""));
        assert!(xml.trim_end().ends_with("</root>\n</mxGraphModel>"));
        assert_eq!(doc.vertex_count(), 2);
        assert_eq!(doc.edge_count(), 1);
    }
}
