use roxmltree::Node;

use crate::error::PipelineError;

/// Geometry exactly as written, before any repair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGeometry {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Edge-style geometry (`relative="1"`)
    pub relative: bool,
}

/// A cell exactly as written, before any repair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCell {
    pub id: Option<String>,
    pub value: Option<String>,
    pub style: Option<String>,
    pub parent: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub vertex: bool,
    pub edge: bool,
    pub geometry: Option<RawGeometry>,
}

impl RawCell {
    pub fn has_endpoints(&self) -> bool {
        self.source.is_some() || self.target.is_some()
    }

    pub fn has_shape_geometry(&self) -> bool {
        self.geometry.as_ref().is_some_and(|g| !g.relative)
    }
}

/// Read the cells of the first `mxGraphModel` element in `text`
///
/// Element names are matched by local name, so namespace declarations are
/// ignored. `<object>`/`<UserObject>` wrappers supply the id and label of the
/// cell they enclose.
pub fn parse_cells(text: &str) -> Result<Vec<RawCell>, PipelineError> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| PipelineError::SchemaInvalid(format!("not well-formed XML: {}", e)))?;

    let model = doc
        .descendants()
        .find(|n| n.has_tag_name("mxGraphModel"))
        .ok_or_else(|| PipelineError::SchemaInvalid("no <mxGraphModel> element found".to_string()))?;

    let Some(root) = model.children().find(|n| n.has_tag_name("root")) else {
        return Ok(vec![]);
    };

    let mut cells = Vec::new();
    for node in root.children().filter(Node::is_element) {
        match node.tag_name().name() {
            "mxCell" => cells.push(read_cell(node, None)),
            "object" | "UserObject" => {
                if let Some(inner) = node.children().find(|n| n.has_tag_name("mxCell")) {
                    cells.push(read_cell(inner, Some(node)));
                }
            }
            _ => {}
        }
    }

    Ok(cells)
}

fn read_cell(cell: Node<'_, '_>, wrapper: Option<Node<'_, '_>>) -> RawCell {
    let attr = |name: &str| cell.attribute(name).map(str::to_string);

    let (id, value) = match wrapper {
        Some(w) => (
            w.attribute("id").map(str::to_string),
            w.attribute("label")
                .or_else(|| w.attribute("value"))
                .map(str::to_string),
        ),
        None => (attr("id"), attr("value")),
    };

    RawCell {
        id,
        value,
        style: attr("style"),
        parent: attr("parent"),
        source: attr("source"),
        target: attr("target"),
        vertex: cell.attribute("vertex") == Some("1"),
        edge: cell.attribute("edge") == Some("1"),
        geometry: cell
            .children()
            .find(|n| n.has_tag_name("mxGeometry"))
            .map(read_geometry),
    }
}

fn read_geometry(node: Node<'_, '_>) -> RawGeometry {
    let number = |name: &str| {
        node.attribute(name)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    };
    RawGeometry {
        x: number("x"),
        y: number("y"),
        width: number("width"),
        height: number("height"),
        relative: node.attribute("relative") == Some("1"),
    }
}
