use crate::models::Geometry;

use super::repair::{NodeKind, Repairer, Slot};
use super::{IssueKind, GROUP_PADDING, SIBLING_SPACING};

impl Repairer {
    /// Enforce the placement rules bottom-up
    ///
    /// Groups are handled deepest first so that a parent group sees the final
    /// box of every nested one: empty groups are dropped, overlapping children
    /// are pushed apart, and the group is resized to the padded bounding box of
    /// its children. Siblings directly under each layer are separated last.
    pub(super) fn layout(&mut self) {
        let mut groups: Vec<(usize, usize)> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_group())
            .map(|i| (self.depth(i), i))
            .collect();
        groups.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, group) in groups {
            let children = self.children_of(Slot::Node(group));
            if children.is_empty() {
                self.nodes[group].removed = true;
                let key = self.nodes[group].key.clone();
                self.issue(IssueKind::CellDropped, &key, "group has no children");
                continue;
            }

            self.separate(&children);
            let bounds = children
                .iter()
                .map(|&c| self.nodes[c].geometry)
                .reduce(|acc, g| acc.union(&g))
                .unwrap_or(Geometry::new(0, 0, 0, 0));
            let mut geometry = bounds.inflate(GROUP_PADDING);

            let dx = (-geometry.x).max(0);
            let dy = (-geometry.y).max(0);
            if dx > 0 || dy > 0 {
                for &c in &children {
                    self.translate_subtree(c, dx, dy);
                }
                geometry.translate(dx, dy);
            }

            let node = &mut self.nodes[group];
            let changed = node.had_geometry && node.geometry != geometry;
            node.geometry = geometry;
            node.had_geometry = true;
            if changed {
                let key = node.key.clone();
                self.issue(IssueKind::GroupResized, &key, "geometry recomputed from children");
            }
        }

        let layers: Vec<Slot> = std::iter::once(Slot::DefaultLayer)
            .chain(
                (0..self.nodes.len())
                    .filter(|&i| self.nodes[i].kind == NodeKind::Layer)
                    .map(Slot::Node),
            )
            .collect();
        for layer in layers {
            let children = self.children_of(layer);
            self.separate(&children);
        }
    }

    /// Number of enclosing groups
    fn depth(&self, i: usize) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[i].parent;
        while let Slot::Node(j) = current {
            if !self.nodes[j].is_group() {
                break;
            }
            depth += 1;
            current = self.nodes[j].parent;
        }
        depth
    }

    /// Move later siblings right until no two of them overlap
    fn separate(&mut self, siblings: &[usize]) {
        let mut placed: Vec<usize> = Vec::with_capacity(siblings.len());

        for &cell in siblings {
            let mut moved = false;
            loop {
                let current = self.nodes[cell].geometry;
                let blocker = placed
                    .iter()
                    .map(|&p| self.nodes[p].geometry)
                    .find(|g| g.overlaps(&current));
                let Some(blocker) = blocker else {
                    break;
                };
                let dx = blocker.right() + SIBLING_SPACING - current.x;
                self.translate_subtree(cell, dx, 0);
                moved = true;
            }

            if moved {
                let key = self.nodes[cell].key.clone();
                self.issue(IssueKind::OverlapResolved, &key, "moved clear of an overlapping sibling");
            }
            placed.push(cell);
        }
    }

    /// Shift a cell together with everything nested inside it
    fn translate_subtree(&mut self, i: usize, dx: i64, dy: i64) {
        self.nodes[i].geometry.translate(dx, dy);
        if self.nodes[i].is_group() {
            for child in self.children_of(Slot::Node(i)) {
                self.translate_subtree(child, dx, dy);
            }
        }
    }
}
