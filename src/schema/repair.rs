use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::PipelineError;
use crate::models::{
    infer_role, Cell, CellKind, Document, Geometry, Role, DEFAULT_LAYER_ID, EDGE_STYLE,
    FIRST_CELL_ID, ROOT_ID,
};

use super::parse::{parse_cells, RawCell, RawGeometry};
use super::sanitize::sanitize;
use super::{
    Issue, IssueKind, Repaired, DEFAULT_HEIGHT, DEFAULT_WIDTH, MAX_COORDINATE, MAX_EXTENT,
};

/// Check a candidate document against the diagram grammar and repair it
///
/// Only unreadable input is an error. Every other problem is fixed (or the
/// offending cell dropped) and reported as an [`Issue`]; the returned
/// document always satisfies the structural invariants.
pub fn validate_and_repair(candidate: &str) -> Result<Repaired, PipelineError> {
    let mut issues = Vec::new();
    let markup = sanitize(candidate, &mut issues)?;
    let raw = parse_cells(&markup)?;

    let mut repairer = Repairer::new(issues);
    repairer.load(raw);
    repairer.resolve_parents();
    repairer.break_parent_cycles();
    repairer.adopt_into_groups();
    repairer.layout();
    repairer.drop_dangling_edges();
    let (document, issues) = repairer.finish();

    for issue in &issues {
        debug!("repair: {}", issue);
    }

    let xml = document.to_xml();
    Ok(Repaired {
        document,
        xml,
        issues,
    })
}

/// Synthetic key for a cell whose id is missing or already taken
fn fresh_key(pos: usize, taken: &HashSet<String>) -> String {
    let mut key = format!("#{}", pos);
    while taken.contains(&key) {
        key.push('\'');
    }
    key
}

/// Where a cell hangs in the container tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Slot {
    Root,
    DefaultLayer,
    Node(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum NodeKind {
    Layer,
    Vertex(Role),
    Edge,
}

/// Working copy of a cell while the document is being repaired
#[derive(Debug, Clone)]
pub(super) struct Node {
    /// Original id, or a synthetic key when the original was missing or taken
    pub key: String,
    pub kind: NodeKind,
    pub label: String,
    pub raw_parent: Option<String>,
    pub parent: Slot,
    pub geometry: Geometry,
    /// Whether the input carried a usable geometry
    pub had_geometry: bool,
    pub source: Option<String>,
    pub target: Option<String>,
    pub removed: bool,
}

impl Node {
    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::Vertex(Role::Group)
    }

    pub fn is_vertex(&self) -> bool {
        matches!(self.kind, NodeKind::Vertex(_))
    }

    pub fn is_container(&self) -> bool {
        self.kind == NodeKind::Layer || self.is_group()
    }
}

pub(super) struct Repairer {
    pub nodes: Vec<Node>,
    pub issues: Vec<Issue>,
    /// Surviving cells by key
    index: HashMap<String, usize>,
    /// Parent attribute of every input cell, dropped ones included
    raw_parents: HashMap<String, Option<String>>,
    root_key: String,
    default_layer_key: Option<String>,
}

impl Repairer {
    fn new(issues: Vec<Issue>) -> Self {
        Self {
            nodes: Vec::new(),
            issues,
            index: HashMap::new(),
            raw_parents: HashMap::new(),
            root_key: ROOT_ID.to_string(),
            default_layer_key: None,
        }
    }

    pub(super) fn issue(&mut self, kind: IssueKind, cell: &str, message: impl Into<String>) {
        self.issues.push(Issue::for_cell(kind, cell, message));
    }

    /// Identify the base cells and turn every other cell into a [`Node`]
    fn load(&mut self, raw: Vec<RawCell>) {
        let root_pos = raw
            .iter()
            .position(|c| c.parent.is_none() && !c.vertex && !c.edge && !c.has_endpoints());
        if let Some(id) = root_pos.and_then(|p| raw[p].id.as_deref()) {
            self.root_key = id.trim().to_string();
        }

        let layer_pos = raw.iter().enumerate().position(|(i, c)| {
            Some(i) != root_pos
                && c.parent.as_deref().map(str::trim) == Some(self.root_key.as_str())
                && !c.vertex
                && !c.edge
                && !c.has_endpoints()
        });
        self.default_layer_key = layer_pos.and_then(|p| raw[p].id.as_deref().map(|s| s.trim().to_string()));

        let mut taken: HashSet<String> = HashSet::new();
        taken.insert(self.root_key.clone());
        if let Some(key) = &self.default_layer_key {
            taken.insert(key.clone());
        }

        for (pos, cell) in raw.into_iter().enumerate() {
            if Some(pos) == root_pos || Some(pos) == layer_pos {
                continue;
            }

            let key = match cell.id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() && !taken.contains(id) => id.to_string(),
                Some(id) if !id.is_empty() => {
                    let key = fresh_key(pos, &taken);
                    self.issue(IssueKind::DuplicateId, id, "id already used by another cell");
                    key
                }
                _ => {
                    let key = fresh_key(pos, &taken);
                    self.issue(IssueKind::MissingAttribute, &key, "cell has no id");
                    key
                }
            };
            taken.insert(key.clone());
            let raw_parent = cell.parent.as_deref().map(|p| p.trim().to_string());
            self.raw_parents.insert(key.clone(), raw_parent.clone());

            if let Some(node) = self.build_node(key.clone(), raw_parent, cell) {
                self.index.insert(key, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    fn build_node(&mut self, key: String, raw_parent: Option<String>, cell: RawCell) -> Option<Node> {
        let under_root = raw_parent.as_deref() == Some(self.root_key.as_str());

        let kind = if cell.edge {
            NodeKind::Edge
        } else if cell.vertex {
            self.vertex_kind(&key, &cell)?
        } else if under_root {
            NodeKind::Layer
        } else if cell.has_endpoints() {
            self.issue(IssueKind::MissingAttribute, &key, "missing edge=\"1\"");
            NodeKind::Edge
        } else if cell.has_shape_geometry() {
            self.issue(IssueKind::MissingAttribute, &key, "missing vertex=\"1\"");
            self.vertex_kind(&key, &cell)?
        } else {
            self.issue(IssueKind::CellDropped, &key, "cell is neither vertex, edge nor layer");
            return None;
        };

        let mut node = Node {
            key,
            kind,
            label: cell.value.as_deref().map(str::trim).unwrap_or_default().to_string(),
            raw_parent,
            parent: Slot::DefaultLayer,
            geometry: Geometry::new(0, 0, 0, 0),
            had_geometry: false,
            source: None,
            target: None,
            removed: false,
        };

        match kind {
            NodeKind::Layer => {
                node.parent = Slot::Root;
                if node.label.is_empty() {
                    node.label = "Layer".to_string();
                }
            }
            NodeKind::Edge => {
                if cell.style.as_deref() != Some(EDGE_STYLE) {
                    self.issue(IssueKind::StyleCoerced, &node.key, "edge style replaced");
                }
                if !node.label.is_empty() {
                    self.issue(IssueKind::EdgeLabelStripped, &node.key, "edge label removed");
                    node.label.clear();
                }
                node.source = cell.source.map(|s| s.trim().to_string());
                node.target = cell.target.map(|t| t.trim().to_string());
            }
            NodeKind::Vertex(role) => {
                if node.label.is_empty() {
                    self.issue(IssueKind::EmptyLabel, &node.key, "empty label replaced with role name");
                    node.label = role.display_name().to_string();
                }
                match cell.geometry.as_ref().filter(|g| !g.relative) {
                    Some(raw) => {
                        node.geometry = self.fix_geometry(&node.key, raw);
                        node.had_geometry = true;
                    }
                    // Group geometry is always recomputed from its children
                    None if role == Role::Group => {}
                    None => {
                        self.issue(IssueKind::CellDropped, &node.key, "vertex has no geometry");
                        return None;
                    }
                }
            }
        }

        Some(node)
    }

    fn vertex_kind(&mut self, key: &str, cell: &RawCell) -> Option<NodeKind> {
        let style = cell.style.as_deref().unwrap_or_default();
        match infer_role(style) {
            Some(role) if role.style() == style => Some(NodeKind::Vertex(role)),
            Some(role) => {
                let message = if style.is_empty() {
                    format!("missing style, using {}", role.description())
                } else {
                    format!("style coerced to {}", role.description())
                };
                self.issue(IssueKind::StyleCoerced, key, message);
                Some(NodeKind::Vertex(role))
            }
            None => {
                self.issue(
                    IssueKind::CellDropped,
                    key,
                    format!("no catalog role matches style {:?}", style),
                );
                None
            }
        }
    }

    fn fix_geometry(&mut self, key: &str, raw: &RawGeometry) -> Geometry {
        let mut fixes = Vec::new();

        let mut coordinate = |name: &str, value: Option<f64>| -> i64 {
            match value {
                None => {
                    fixes.push(format!("{} missing", name));
                    0
                }
                Some(v) if v > MAX_COORDINATE as f64 => {
                    fixes.push(format!("{} out of range", name));
                    MAX_COORDINATE
                }
                Some(v) => {
                    let rounded = v.round() as i64;
                    if rounded < 0 {
                        fixes.push(format!("{} negative", name));
                        0
                    } else {
                        if v.fract() != 0.0 {
                            fixes.push(format!("{} rounded", name));
                        }
                        rounded
                    }
                }
            }
        };
        let x = coordinate("x", raw.x);
        let y = coordinate("y", raw.y);

        let mut extent = |name: &str, value: Option<f64>, default: i64| -> i64 {
            match value.map(|v| (v, v.round() as i64)) {
                Some((v, _)) if v > MAX_EXTENT as f64 => {
                    fixes.push(format!("{} out of range", name));
                    MAX_EXTENT
                }
                Some((v, rounded)) if rounded > 0 => {
                    if v.fract() != 0.0 {
                        fixes.push(format!("{} rounded", name));
                    }
                    rounded
                }
                _ => {
                    fixes.push(format!("{} missing or not positive", name));
                    default
                }
            }
        };
        let width = extent("width", raw.width, DEFAULT_WIDTH);
        let height = extent("height", raw.height, DEFAULT_HEIGHT);

        if !fixes.is_empty() {
            self.issue(IssueKind::GeometryFixed, key, fixes.join(", "));
        }
        Geometry::new(x, y, width, height)
    }

    /// Point every layer, group and vertex at its nearest surviving container
    fn resolve_parents(&mut self) {
        for i in 0..self.nodes.len() {
            if !matches!(self.nodes[i].kind, NodeKind::Vertex(_)) {
                continue;
            }
            let raw_parent = self.nodes[i].raw_parent.clone();
            let slot = self.nearest_container(raw_parent.as_deref());

            let stated = raw_parent.as_deref();
            let unchanged = match slot {
                Slot::DefaultLayer => stated.is_some() && stated == self.default_layer_key.as_deref(),
                Slot::Node(j) => stated == Some(self.nodes[j].key.as_str()),
                Slot::Root => false,
            };
            if !unchanged {
                let key = self.nodes[i].key.clone();
                let target = self.slot_name(slot);
                self.issue(
                    IssueKind::ParentReassigned,
                    &key,
                    format!("parent {:?} is not a container, moved to {}", stated.unwrap_or(""), target),
                );
            }
            self.nodes[i].parent = slot;
        }
    }

    fn nearest_container(&self, start: Option<&str>) -> Slot {
        let mut visited = HashSet::new();
        let mut current = start.map(str::to_string);

        while let Some(key) = current {
            if Some(key.as_str()) == self.default_layer_key.as_deref() || key == self.root_key {
                return Slot::DefaultLayer;
            }
            if let Some(&j) = self.index.get(&key) {
                if self.nodes[j].is_container() {
                    return Slot::Node(j);
                }
            }
            if !visited.insert(key.clone()) {
                break;
            }
            current = self.raw_parents.get(&key).cloned().flatten();
        }

        Slot::DefaultLayer
    }

    fn slot_name(&self, slot: Slot) -> String {
        match slot {
            Slot::Root => "the root".to_string(),
            Slot::DefaultLayer => "the default layer".to_string(),
            Slot::Node(j) => format!("cell {}", self.nodes[j].key),
        }
    }

    /// Groups nested in each other (or in themselves) are re-homed on the default layer
    fn break_parent_cycles(&mut self) {
        for start in 0..self.nodes.len() {
            if !self.nodes[start].is_group() {
                continue;
            }
            let mut seen = HashSet::new();
            let mut current = Slot::Node(start);
            while let Slot::Node(j) = current {
                if !seen.insert(j) {
                    self.nodes[j].parent = Slot::DefaultLayer;
                    let key = self.nodes[j].key.clone();
                    self.issue(IssueKind::ParentReassigned, &key, "group nesting cycle broken");
                    break;
                }
                current = self.nodes[j].parent;
            }
        }
    }

    /// Vertices drawn inside a sibling group's box become its children
    fn adopt_into_groups(&mut self) {
        let groups: Vec<usize> = (0..self.nodes.len())
            .filter(|&g| self.nodes[g].is_group() && self.nodes[g].had_geometry)
            .collect();

        for v in 0..self.nodes.len() {
            let node = &self.nodes[v];
            if !node.is_vertex() || !node.had_geometry {
                continue;
            }
            let chosen = groups
                .iter()
                .copied()
                .filter(|&g| g != v)
                .filter(|&g| self.nodes[g].parent == node.parent)
                .filter(|&g| {
                    let outer = &self.nodes[g].geometry;
                    outer.contains(&node.geometry) && outer.area() > node.geometry.area()
                })
                .min_by_key(|&g| (self.nodes[g].geometry.area(), g));

            if let Some(g) = chosen {
                self.nodes[v].parent = Slot::Node(g);
                let key = self.nodes[v].key.clone();
                let group_key = self.nodes[g].key.clone();
                self.issue(
                    IssueKind::GroupAdopted,
                    &key,
                    format!("drawn inside group {}, re-parented", group_key),
                );
            }
        }
    }

    /// Surviving layers, groups and vertices directly under `slot`, in document order
    pub(super) fn children_of(&self, slot: Slot) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| {
                let n = &self.nodes[i];
                !n.removed && n.kind != NodeKind::Edge && n.parent == slot
            })
            .collect()
    }

    /// Edges whose endpoints are not surviving vertices are dropped
    fn drop_dangling_edges(&mut self) {
        for e in 0..self.nodes.len() {
            if self.nodes[e].kind != NodeKind::Edge || self.nodes[e].removed {
                continue;
            }
            let source = self.resolve_vertex(self.nodes[e].source.as_deref());
            let target = self.resolve_vertex(self.nodes[e].target.as_deref());
            if source.is_none() || target.is_none() {
                self.nodes[e].removed = true;
                let key = self.nodes[e].key.clone();
                let missing = if source.is_none() { "source" } else { "target" };
                self.issue(
                    IssueKind::DanglingEdge,
                    &key,
                    format!("{} does not resolve to a vertex, edge removed", missing),
                );
            }
        }
    }

    fn resolve_vertex(&self, key: Option<&str>) -> Option<usize> {
        let &i = self.index.get(key?)?;
        let node = &self.nodes[i];
        (node.is_vertex() && !node.removed).then_some(i)
    }

    /// Containers enclosing node `i`, innermost first
    fn container_chain(&self, i: usize) -> Vec<Slot> {
        let mut chain = Vec::new();
        let mut current = self.nodes[i].parent;
        loop {
            chain.push(current);
            match current {
                Slot::Node(j) if self.nodes[j].is_group() => current = self.nodes[j].parent,
                _ => break,
            }
        }
        chain
    }

    fn visit(&self, slot: Slot, order: &mut Vec<usize>) {
        for child in self.children_of(slot) {
            order.push(child);
            if self.nodes[child].is_group() {
                self.visit(Slot::Node(child), order);
            }
        }
    }

    /// Issue dense ids and build the validated document
    fn finish(mut self) -> (Document, Vec<Issue>) {
        let mut order = Vec::new();
        self.visit(Slot::DefaultLayer, &mut order);
        for layer in self.children_of(Slot::Root) {
            order.push(layer);
            self.visit(Slot::Node(layer), &mut order);
        }
        order.extend(
            (0..self.nodes.len())
                .filter(|&i| self.nodes[i].kind == NodeKind::Edge && !self.nodes[i].removed),
        );

        let ids: HashMap<usize, u32> = order
            .iter()
            .enumerate()
            .map(|(pos, &i)| (i, FIRST_CELL_ID + pos as u32))
            .collect();

        let slot_id = |slot: Slot| match slot {
            Slot::Root => ROOT_ID,
            Slot::DefaultLayer => DEFAULT_LAYER_ID,
            Slot::Node(j) => ids[&j],
        };

        let mut cells = Vec::with_capacity(order.len());
        for &i in &order {
            let node = &self.nodes[i];
            let cell = match node.kind {
                NodeKind::Layer => Cell {
                    id: ids[&i],
                    parent: ROOT_ID,
                    label: node.label.clone(),
                    kind: CellKind::Layer,
                },
                NodeKind::Vertex(role) => Cell {
                    id: ids[&i],
                    parent: slot_id(node.parent),
                    label: node.label.clone(),
                    kind: CellKind::Vertex {
                        role,
                        geometry: node.geometry,
                    },
                },
                NodeKind::Edge => {
                    // Endpoints were resolved by drop_dangling_edges
                    let (Some(s), Some(t)) = (
                        self.resolve_vertex(node.source.as_deref()),
                        self.resolve_vertex(node.target.as_deref()),
                    ) else {
                        continue;
                    };
                    let source_chain = self.container_chain(s);
                    let target_chain = self.container_chain(t);
                    let parent = source_chain
                        .iter()
                        .find(|slot| target_chain.contains(slot))
                        .copied()
                        .unwrap_or(Slot::DefaultLayer);
                    Cell {
                        id: ids[&i],
                        parent: slot_id(parent),
                        label: String::new(),
                        kind: CellKind::Edge {
                            source: ids[&s],
                            target: ids[&t],
                        },
                    }
                }
            };
            cells.push(cell);
        }

        let renumbered = order
            .iter()
            .any(|&i| self.nodes[i].key != ids[&i].to_string());
        if renumbered {
            self.issues.push(Issue::new(
                IssueKind::IdsRenumbered,
                "ids re-issued sequentially from 2",
            ));
        }

        (Document { cells }, self.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Geometry, XML_DECLARATION};
    use crate::schema::{GROUP_PADDING, MAX_COORDINATE, MAX_EXTENT};

    fn wrap(cells: &str) -> String {
        format!(
            "<mxGraphModel><root><mxCell id=\"0\"/><mxCell id=\"1\" parent=\"0\"/>{}</root></mxGraphModel>",
            cells
        )
    }

    fn vertex(id: &str, label: &str, role: Role, parent: &str, g: (i64, i64, i64, i64)) -> String {
        format!(
            "<mxCell id=\"{}\" value=\"{}\" style=\"{}\" vertex=\"1\" parent=\"{}\"><mxGeometry x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" as=\"geometry\"/></mxCell>",
            id, label, role.style(), parent, g.0, g.1, g.2, g.3
        )
    }

    fn edge(id: &str, source: &str, target: &str) -> String {
        format!(
            "<mxCell id=\"{}\" style=\"{}\" edge=\"1\" parent=\"1\" source=\"{}\" target=\"{}\"><mxGeometry relative=\"1\" as=\"geometry\"/></mxCell>",
            id, EDGE_STYLE, source, target
        )
    }

    fn has(issues: &[Issue], kind: IssueKind) -> bool {
        issues.iter().any(|i| i.kind == kind)
    }

    /// Inputs exercising most repair paths, used by the property tests
    fn corpus() -> Vec<String> {
        vec![
            wrap(&[
                vertex("2", "Web App", Role::User, "1", (40, 40, 120, 60)),
                vertex("3", "API", Role::Logic, "1", (240, 40, 120, 60)),
                edge("4", "2", "3"),
            ]
            .concat()),
            wrap(&[
                vertex("10", "Core", Role::Group, "1", (0, 0, 10, 10)),
                vertex("11", "Queue", Role::Queue, "10", (40, 40, 80, 80)),
                vertex("12", "Worker", Role::Logic, "10", (60, 60, 120, 60)),
                vertex("13", "Store", Role::DatabaseFilled, "1", (100, 100, 80, 80)),
                edge("20", "11", "12"),
                edge("21", "12", "13"),
                edge("22", "12", "99"),
            ]
            .concat()),
            format!(
                "Sure! Here it is:\n```xml\n{}\n```",
                wrap(concat!(
                    r#"<mxCell id="a" value="R&D <lab>" style="shape=rectangl;fillColor=blue" vertex="1" parent="0"><mxGeometry x="-5" y="10.4" width="0" as="geometry"/></mxCell>"#,
                    r#"<mxCell id="b" value="" style="ellipse;" vertex="1" parent="1"><mxGeometry x="300" y="10" width="50" height="50" as="geometry"/></mxCell>"#,
                    r#"<mxCell id="c" value="  Tracking  " style="shape=hexagon" vertex="1" parent="b"><mxGeometry x="300" y="200" width="90" height="60" as="geometry"/></mxCell>"#,
                    r#"<mxCell id="d" value="calls" style="endArrow=none" edge="1" parent="1" source="a" target="c"><mxGeometry relative="1" as="geometry"/></mxCell>"#,
                    r#"<mxCell id="e" edge="1" parent="1" source="a" target="b"><mxGeometry relative="1" as="geometry"/></mxCell>"#,
                ))
            ),
            wrap(concat!(
                r#"<mxCell id="L" value="Data" parent="0"/>"#,
                r#"<mxCell id="g1" value="Outer" style="shape=rectangle;dashed=1;fillColor=none" vertex="1" parent="L"><mxGeometry x="0" y="0" width="600" height="400" as="geometry"/></mxCell>"#,
                r#"<mxCell id="g2" value="Inner" style="swimlane" vertex="1" parent="g1"/>"#,
                r#"<mxCell id="v1" value="Cache" style="shape=cylinder;fillColor=none" vertex="1" parent="g2"><mxGeometry x="10" y="10" width="80" height="80" as="geometry"/></mxCell>"#,
                r#"<mxCell id="v2" value="LLM" style="shape=rectangle;dashed=1;fillColor=#D966FF" vertex="1" parent="L"><mxGeometry x="200" y="200" width="120" height="60" as="geometry"/></mxCell>"#,
                r#"<mxCell id="v3" value="Empty box" style="container=1" vertex="1" parent="L"><mxGeometry x="900" y="0" width="100" height="100" as="geometry"/></mxCell>"#,
                r#"<mxCell id="v2" value="Dup" style="shape=cloud" vertex="1" parent="1"><mxGeometry x="20" y="20" width="120" height="60" as="geometry"/></mxCell>"#,
                r#"<mxCell id="x1" edge="1" parent="L" source="v1" target="v2"><mxGeometry relative="1" as="geometry"/></mxCell>"#,
            )),
        ]
    }

    #[test]
    fn test_clean_document_is_unchanged() {
        let input = corpus().remove(0);
        let repaired = validate_and_repair(&input).unwrap();
        assert!(repaired.issues.is_empty(), "{:?}", repaired.issues);
        assert_eq!(repaired.document.vertex_count(), 2);
        assert_eq!(repaired.document.edge_count(), 1);
        assert!(repaired.xml.starts_with(XML_DECLARATION));
    }

    #[test]
    fn test_repair_is_idempotent() {
        for input in corpus() {
            let once = validate_and_repair(&input).unwrap();
            let twice = validate_and_repair(&once.xml).unwrap();
            assert_eq!(once.xml, twice.xml);
            assert!(twice.issues.is_empty(), "{:?}", twice.issues);
        }
    }

    #[test]
    fn test_ids_are_dense() {
        for input in corpus() {
            let doc = validate_and_repair(&input).unwrap().document;
            let ids: Vec<u32> = doc.cells.iter().map(|c| c.id).collect();
            let expected: Vec<u32> = (FIRST_CELL_ID..FIRST_CELL_ID + ids.len() as u32).collect();
            assert_eq!(ids, expected);

            let first_edge = doc.cells.iter().position(Cell::is_edge).unwrap_or(doc.cells.len());
            assert!(doc.cells[first_edge..].iter().all(Cell::is_edge));
        }
    }

    #[test]
    fn test_references_resolve() {
        for input in corpus() {
            let doc = validate_and_repair(&input).unwrap().document;
            for cell in &doc.cells {
                match &cell.kind {
                    CellKind::Layer => assert_eq!(cell.parent, ROOT_ID),
                    _ => {
                        let parent_ok = cell.parent == DEFAULT_LAYER_ID
                            || doc.get(cell.parent).is_some_and(Cell::is_container);
                        assert!(parent_ok, "cell {} has parent {}", cell.id, cell.parent);
                    }
                }
                if let CellKind::Edge { source, target } = cell.kind {
                    assert!(doc.get(source).is_some_and(|c| c.geometry().is_some()));
                    assert!(doc.get(target).is_some_and(|c| c.geometry().is_some()));
                    assert!(cell.label.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_styles_come_from_catalog() {
        for input in corpus() {
            let repaired = validate_and_repair(&input).unwrap();
            let xml = roxmltree::Document::parse(&repaired.xml).unwrap();
            for cell in xml.descendants().filter(|n| n.has_tag_name("mxCell")) {
                if let Some(style) = cell.attribute("style") {
                    assert!(
                        style == EDGE_STYLE || Role::from_catalog(style).is_some(),
                        "unexpected style {style}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_groups_contain_padded_children() {
        for input in corpus() {
            let doc = validate_and_repair(&input).unwrap().document;
            for group in doc.vertices().filter(|c| c.is_container()) {
                let outer = group.geometry().unwrap();
                let children: Vec<&Cell> = doc.children(group.id).collect();
                assert!(!children.is_empty());
                for child in children {
                    let inner = child.geometry().unwrap().inflate(GROUP_PADDING);
                    assert!(outer.contains(&inner), "{:?} !⊇ {:?}", outer, inner);
                }
            }
        }
    }

    #[test]
    fn test_siblings_do_not_overlap() {
        for input in corpus() {
            let doc = validate_and_repair(&input).unwrap().document;
            let containers: Vec<u32> = std::iter::once(DEFAULT_LAYER_ID)
                .chain(doc.cells.iter().filter(|c| c.is_container()).map(|c| c.id))
                .collect();
            for container in containers {
                let geometries: Vec<&Geometry> =
                    doc.children(container).filter_map(Cell::geometry).collect();
                for (i, a) in geometries.iter().enumerate() {
                    for b in &geometries[i + 1..] {
                        assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
                    }
                }
            }
        }
    }

    #[test]
    fn test_invalid_style_and_dangling_edge() {
        let input = wrap(concat!(
            r#"<mxCell id="2" value="Client" style="shape=cloud;whiteSpace=wrap;html=1;fillColor=#CCCCCC;strokeColor=#666666;fontColor=#000000;" vertex="1" parent="1"><mxGeometry x="0" y="0" width="120" height="60" as="geometry"/></mxCell>"#,
            r#"<mxCell id="5" value="Service" style="shape=rectangl;fillColor=blue" vertex="1" parent="1"><mxGeometry x="200" y="0" width="120" height="60" as="geometry"/></mxCell>"#,
            r#"<mxCell id="6" edge="1" parent="1" source="2" target="5"><mxGeometry relative="1" as="geometry"/></mxCell>"#,
            r#"<mxCell id="7" edge="1" parent="1" source="5" target="99"><mxGeometry relative="1" as="geometry"/></mxCell>"#,
        ));

        let repaired = validate_and_repair(&input).unwrap();
        let doc = &repaired.document;

        let service = doc.get(3).unwrap();
        assert_eq!(service.label, "Service");
        assert_eq!(service.role(), Some(Role::User));
        assert_eq!(doc.edge_count(), 1);
        assert_eq!(
            doc.get(4).unwrap().kind,
            CellKind::Edge { source: 2, target: 3 }
        );
        assert!(doc.get(5).is_none());
        assert!(has(&repaired.issues, IssueKind::StyleCoerced));
        assert!(has(&repaired.issues, IssueKind::DanglingEdge));
        assert!(has(&repaired.issues, IssueKind::IdsRenumbered));
    }

    #[test]
    fn test_unrecoverable_vertex_is_dropped_with_its_edges() {
        let input = wrap(&[
            vertex("2", "Keep", Role::Logic, "1", (0, 0, 120, 60)),
            r#"<mxCell id="3" value="Oval" style="ellipse;" vertex="1" parent="1"><mxGeometry x="200" y="0" width="60" height="60" as="geometry"/></mxCell>"#.to_string(),
            edge("4", "2", "3"),
        ]
        .concat());

        let repaired = validate_and_repair(&input).unwrap();
        assert_eq!(repaired.document.vertex_count(), 1);
        assert_eq!(repaired.document.edge_count(), 0);
        assert!(has(&repaired.issues, IssueKind::CellDropped));
    }

    #[test]
    fn test_fenced_output_is_accepted() {
        let input = format!("```xml\n{}\n```", corpus().remove(0));
        let repaired = validate_and_repair(&input).unwrap();
        assert_eq!(repaired.document.vertex_count(), 2);
        assert!(has(&repaired.issues, IssueKind::Sanitized));
    }

    #[test]
    fn test_fenced_garbage_is_rejected() {
        let err = validate_and_repair("```xml\n<mxGraphModel><root><mxCell id=\"2\">\n```").unwrap_err();
        assert!(matches!(err, PipelineError::SchemaInvalid(_)));
    }

    #[test]
    fn test_group_geometry_is_padded_bounding_box() {
        let input = wrap(&[
            vertex("2", "Core", Role::Group, "1", (0, 0, 500, 500)),
            vertex("3", "A", Role::Logic, "2", (40, 40, 40, 50)),
            vertex("4", "B", Role::Logic, "2", (100, 40, 40, 30)),
        ]
        .concat());

        let doc = validate_and_repair(&input).unwrap().document;
        let group = doc.get(2).unwrap();
        assert_eq!(group.geometry(), Some(&Geometry::new(20, 20, 140, 90)));
    }

    #[test]
    fn test_group_is_shifted_to_stay_on_canvas() {
        let input = wrap(&[
            vertex("2", "Core", Role::Group, "1", (0, 0, 10, 10)),
            vertex("3", "A", Role::Logic, "2", (5, 0, 100, 50)),
        ]
        .concat());

        let doc = validate_and_repair(&input).unwrap().document;
        assert_eq!(doc.get(2).unwrap().geometry(), Some(&Geometry::new(0, 0, 140, 90)));
        assert_eq!(doc.get(3).unwrap().geometry(), Some(&Geometry::new(20, 20, 100, 50)));
    }

    #[test]
    fn test_empty_group_is_dropped() {
        let input = wrap(&[
            vertex("2", "Nothing inside", Role::Group, "1", (0, 0, 100, 100)),
            vertex("3", "Outside", Role::Logic, "1", (300, 0, 100, 60)),
        ]
        .concat());

        let doc = validate_and_repair(&input).unwrap().document;
        assert_eq!(doc.vertex_count(), 1);
        assert_eq!(doc.get(2).unwrap().label, "Outside");
    }

    #[test]
    fn test_vertex_drawn_inside_group_is_adopted() {
        let input = wrap(&[
            vertex("2", "Core", Role::Group, "1", (0, 0, 400, 300)),
            vertex("3", "Inside", Role::Logic, "1", (50, 50, 100, 60)),
        ]
        .concat());

        let repaired = validate_and_repair(&input).unwrap();
        let inside = repaired.document.get(3).unwrap();
        assert_eq!(inside.parent, 2);
        assert!(has(&repaired.issues, IssueKind::GroupAdopted));
    }

    #[test]
    fn test_overlapping_siblings_are_separated() {
        let input = wrap(&[
            vertex("2", "A", Role::Logic, "1", (0, 0, 100, 60)),
            vertex("3", "B", Role::Logic, "1", (50, 20, 100, 60)),
        ]
        .concat());

        let repaired = validate_and_repair(&input).unwrap();
        assert_eq!(
            repaired.document.get(3).unwrap().geometry(),
            Some(&Geometry::new(150, 20, 100, 60))
        );
        assert!(has(&repaired.issues, IssueKind::OverlapResolved));
    }

    #[test]
    fn test_root_level_vertex_and_missing_parent_move_to_default_layer() {
        let input = wrap(concat!(
            r#"<mxCell id="2" value="Rooted" style="shape=cloud" vertex="1" parent="0"><mxGeometry x="0" y="0" width="120" height="60" as="geometry"/></mxCell>"#,
            r#"<mxCell id="3" value="Orphan" style="shape=cloud" vertex="1"><mxGeometry x="300" y="0" width="120" height="60" as="geometry"/></mxCell>"#,
        ));

        let repaired = validate_and_repair(&input).unwrap();
        assert!(repaired.document.vertices().all(|c| c.parent == DEFAULT_LAYER_ID));
        let reassigned = repaired
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::ParentReassigned)
            .count();
        assert_eq!(reassigned, 2);
    }

    #[test]
    fn test_parent_chain_through_dropped_cell() {
        let input = wrap(&[
            vertex("2", "Group", Role::Group, "1", (0, 0, 10, 10)),
            r#"<mxCell id="3" value="Oval" style="ellipse;" vertex="1" parent="2"><mxGeometry x="20" y="20" width="60" height="60" as="geometry"/></mxCell>"#.to_string(),
            vertex("4", "Child of oval", Role::Logic, "3", (40, 40, 100, 60)),
        ]
        .concat());

        let doc = validate_and_repair(&input).unwrap().document;
        let child = doc.vertices().find(|c| c.label == "Child of oval").unwrap();
        assert_eq!(doc.get(child.parent).unwrap().label, "Group");
    }

    #[test]
    fn test_group_cycle_is_broken() {
        let input = wrap(&[
            vertex("2", "G1", Role::Group, "3", (0, 0, 10, 10)),
            vertex("3", "G2", Role::Group, "2", (0, 0, 10, 10)),
            vertex("4", "Leaf", Role::Logic, "3", (40, 40, 100, 60)),
        ]
        .concat());

        let doc = validate_and_repair(&input).unwrap().document;
        assert_eq!(doc.vertex_count(), 3);
        assert!(doc.vertices().any(|c| c.parent == DEFAULT_LAYER_ID));
    }

    #[test]
    fn test_labels_are_escaped_and_preserved() {
        let input = wrap(concat!(
            r#"<mxCell id="2" value="A & B <v2> &quot;beta&quot;" style="shape=cloud" vertex="1" parent="1"><mxGeometry x="0" y="0" width="120" height="60" as="geometry"/></mxCell>"#
        ));

        let repaired = validate_and_repair(&input).unwrap();
        assert_eq!(repaired.document.get(2).unwrap().label, "A & B <v2> \"beta\"");
        assert!(repaired.xml.contains("value=\"A &amp; B &lt;v2&gt; &quot;beta&quot;\""));
    }

    #[test]
    fn test_edges_between_group_members_are_parented_to_the_group() {
        let input = wrap(&[
            vertex("2", "Core", Role::Group, "1", (0, 0, 10, 10)),
            vertex("3", "A", Role::Logic, "2", (40, 40, 100, 60)),
            vertex("4", "B", Role::Logic, "2", (240, 40, 100, 60)),
            vertex("5", "C", Role::Logic, "1", (600, 40, 100, 60)),
            edge("6", "3", "4"),
            edge("7", "4", "5"),
        ]
        .concat());

        let doc = validate_and_repair(&input).unwrap().document;
        assert_eq!(doc.get(6).unwrap().parent, 2);
        assert_eq!(doc.get(7).unwrap().parent, DEFAULT_LAYER_ID);
    }

    #[test]
    fn test_layers_keep_their_children() {
        let input = corpus().remove(3);
        let doc = validate_and_repair(&input).unwrap().document;
        let layer = doc.cells.iter().find(|c| c.kind == CellKind::Layer).unwrap();
        assert_eq!(layer.label, "Data");
        let outer: Vec<&Cell> = doc.children(layer.id).collect();
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].label, "Outer");
        // "LLM" was drawn inside "Outer" and adopted next to the nested group
        assert_eq!(doc.children(outer[0].id).count(), 2);
        // the dangling "Empty box" container is gone
        assert!(doc.vertices().all(|c| c.label != "Empty box"));
    }
    #[test]
    fn test_huge_geometry_is_clamped() {
        let input = wrap(concat!(
            r#"<mxCell id="2" value="A" style="shape=cloud" vertex="1" parent="1"><mxGeometry x="0" y="0" width="1e19" height="60" as="geometry"/></mxCell>"#,
            r#"<mxCell id="3" value="B" style="shape=cloud" vertex="1" parent="1"><mxGeometry x="10" y="0" width="120" height="60" as="geometry"/></mxCell>"#,
            r#"<mxCell id="4" value="C" style="shape=cloud" vertex="1" parent="1"><mxGeometry x="1e19" y="500" width="120" height="60" as="geometry"/></mxCell>"#,
        ));

        let repaired = validate_and_repair(&input).unwrap();
        let doc = &repaired.document;
        assert_eq!(doc.get(2).unwrap().geometry().unwrap().width, MAX_EXTENT);
        assert_eq!(doc.get(3).unwrap().geometry().unwrap().x, MAX_EXTENT + 50);
        assert_eq!(doc.get(4).unwrap().geometry().unwrap().x, MAX_COORDINATE);
        assert!(has(&repaired.issues, IssueKind::GeometryFixed));

        let again = validate_and_repair(&repaired.xml).unwrap();
        assert_eq!(again.xml, repaired.xml);
    }

    #[test]
    fn test_catalog_group_style_is_kept() {
        let group_style = "shape=rectangle;whiteSpace=wrap;html=1;dashed=1;fillColor=none;strokeColor=#FFFFFF;fontColor=#000000;noLabel=0;opacity=100;";
        let input = wrap(&format!(
            r#"<mxCell id="2" value="Core" style="{}" vertex="1" parent="1"><mxGeometry x="20" y="20" width="140" height="100" as="geometry"/></mxCell>{}"#,
            group_style,
            vertex("3", "Api", Role::Logic, "2", (40, 40, 100, 60)),
        ));

        let repaired = validate_and_repair(&input).unwrap();
        assert!(!has(&repaired.issues, IssueKind::StyleCoerced));
        assert_eq!(repaired.document.get(2).unwrap().role(), Some(Role::Group));
        assert!(repaired.xml.contains(group_style));
    }

    #[test]
    fn test_html_entities_in_labels() {
        let input = wrap(concat!(
            r#"<mxCell id="2" value="Web&nbsp;App" style="shape=cloud" vertex="1" parent="1"><mxGeometry x="0" y="0" width="120" height="60" as="geometry"/></mxCell>"#
        ));

        let repaired = validate_and_repair(&input).unwrap();
        assert_eq!(repaired.document.get(2).unwrap().label, "Web&nbsp;App");
    }

    #[test]
    fn test_namespaced_model_is_repaired() {
        let input = r#"<mxGraphModel xmlns="http://www.w3.org/1999/xhtml"><root><mxCell id="0"/><mxCell id="1" parent="0"/><mxCell id="2" value="A" style="shape=cloud" vertex="1" parent="1"><mxGeometry x="0" y="0" width="120" height="60" as="geometry"/></mxCell></root></mxGraphModel>"#;

        let repaired = validate_and_repair(input).unwrap();
        assert_eq!(repaired.document.vertex_count(), 1);
        assert!(!repaired.xml.contains("xmlns"));
    }
}
