//! Hierarchical view over forward items
//!
//! The layer hierarchy is recovered from dotted module paths: the parent of
//! an item is the first later item (forward items are recorded when a layer
//! returns, so a parent always follows its children) whose path encloses
//! the item's path. An empty path encloses everything.

use std::fmt::Write;

use crate::trace::ReportItem;

/// Forward items arranged as a layer tree
#[derive(Debug)]
pub struct TreeView<'a> {
    items: Vec<&'a ReportItem>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

fn encloses(parent: &str, child: &str) -> bool {
    if parent.is_empty() {
        return !child.is_empty();
    }
    child.len() > parent.len() && child.starts_with(parent) && child.as_bytes()[parent.len()] == b'.'
}

impl<'a> TreeView<'a> {
    /// Build the tree over `items` (any order; sorted by step here)
    pub fn new(mut items: Vec<&'a ReportItem>) -> Self {
        items.sort_by_key(|i| i.step());

        let mut children = vec![Vec::new(); items.len()];
        let mut roots = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            let path = &item.layer().path;
            let parent = items[idx + 1..]
                .iter()
                .position(|p| encloses(&p.layer().path, path))
                .map(|offset| idx + 1 + offset);
            match parent {
                Some(p) => children[p].push(idx),
                None => roots.push(idx),
            }
        }

        Self {
            items,
            children,
            roots,
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in execution order: children before their parent, siblings by
    /// step
    pub fn traversal_forward(&self) -> Vec<&'a ReportItem> {
        let mut out = Vec::with_capacity(self.items.len());
        for &root in &self.roots {
            self.post_order(root, &mut out);
        }
        out
    }

    fn post_order(&self, idx: usize, out: &mut Vec<&'a ReportItem>) {
        for &child in &self.children[idx] {
            self.post_order(child, out);
        }
        out.push(self.items[idx]);
    }

    /// Items in backward order
    ///
    /// The hierarchy is treated as a chain: items come in reverse step
    /// order, so an enclosing layer is visited before the layers inside it
    /// and the first reported mismatch is not always the innermost one.
    pub fn traversal_backward(&self) -> Vec<&'a ReportItem> {
        self.items.iter().rev().copied().collect()
    }

    /// Indented listing of the layer tree
    pub fn render(&self) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.render_node(root, 0, &mut out);
        }
        out
    }

    fn render_node(&self, idx: usize, depth: usize, out: &mut String) {
        let item = self.items[idx];
        let _ = writeln!(
            out,
            "{}{} ({}) id={} step={}",
            "  ".repeat(depth),
            item.layer().type_name,
            item.layer().path,
            item.structural_id(),
            item.step()
        );
        for &child in &self.children[idx] {
            self.render_node(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorTree;
    use crate::trace::{reset_steps, Frame, ItemKind, LayerRef, Report};

    fn report(layers: &[(&str, &str)]) -> Report {
        reset_steps();
        let mut report = Report::new("run");
        for (id, (ty, path)) in layers.iter().enumerate() {
            report
                .put_item(
                    ItemKind::Forward,
                    &TensorTree::None,
                    &TensorTree::None,
                    LayerRef::new(*ty, *path),
                    id,
                    Frame::caller("forward"),
                    vec![],
                )
                .unwrap();
        }
        report
    }

    fn ids(items: &[&ReportItem]) -> Vec<usize> {
        items.iter().map(|i| i.structural_id()).collect()
    }

    #[test]
    fn test_encloses() {
        assert!(encloses("", "fc"));
        assert!(encloses("block", "block.fc"));
        assert!(!encloses("block", "blocks.fc"));
        assert!(!encloses("block", "block"));
        assert!(!encloses("", ""));
    }

    #[test]
    fn test_forward_is_post_order() {
        // recorded at layer exit: leaves first, the model last
        let report = report(&[
            ("Linear", "block.fc1"),
            ("Linear", "block.fc2"),
            ("Block", "block"),
            ("Linear", "head"),
            ("Model", ""),
        ]);
        let view = TreeView::new(report.get_fwd_items());
        assert_eq!(ids(&view.traversal_forward()), vec![0, 1, 2, 3, 4]);
        assert_eq!(ids(&view.traversal_backward()), vec![4, 3, 2, 1, 0]);
        assert_eq!(view.roots, vec![4]);
        assert_eq!(view.children[4], vec![2, 3]);
    }

    #[test]
    fn test_render() {
        let report = report(&[("Linear", "block.fc"), ("Block", "block")]);
        let view = TreeView::new(report.get_fwd_items());
        assert_eq!(
            view.render(),
            "Block (block) id=1 step=1\n  Linear (block.fc) id=0 step=0\n"
        );
    }

    #[test]
    fn test_flat_siblings() {
        let report = report(&[("Linear", "fc1"), ("ReLU", "act"), ("Linear", "fc2")]);
        let view = TreeView::new(report.get_fwd_items());
        assert_eq!(view.roots.len(), 3);
        assert_eq!(ids(&view.traversal_forward()), vec![0, 1, 2]);
        assert_eq!(view.len(), 3);
    }
}
