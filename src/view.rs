//! Read-path reconstruction of a stored profile.
//!
//! Nodes are placed on a square-ish grid in storage order; argument edges
//! are rebuilt from each node's positioned argument list.

use serde::{Deserialize, Serialize};

use crate::storage::StoredNode;

/// Display size of every node.
pub const NODE_SIZE: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewNode {
    pub id: String,
    pub label: String,
    pub x: usize,
    pub y: usize,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// A profile laid out for visualization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileView {
    pub nodes: Vec<ViewNode>,
    pub edges: Vec<ViewEdge>,
}

impl ProfileView {
    pub fn node(&self, id: &str) -> Option<&ViewNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Grid width for `n` nodes: `max(1, floor(sqrt(n)))`.
pub fn row_width(n: usize) -> usize {
    n.isqrt().max(1)
}

pub fn layout(stored: &[StoredNode]) -> ProfileView {
    let row = row_width(stored.len());
    let nodes = stored
        .iter()
        .enumerate()
        .map(|(i, node)| ViewNode {
            id: node.id.clone(),
            label: node.label.clone(),
            x: i % row,
            y: i / row,
            size: NODE_SIZE,
        })
        .collect();
    let edges = stored
        .iter()
        .flat_map(|node| {
            node.args.iter().map(move |(position, arg)| ViewEdge {
                id: format!("{}->{}#{}", node.id, arg, position),
                source: node.id.clone(),
                target: arg.clone(),
            })
        })
        .collect();
    ProfileView { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stored(id: &str, args: &[(usize, &str)]) -> StoredNode {
        StoredNode {
            id: id.into(),
            label: "op".into(),
            args: args.iter().map(|(p, a)| (*p, a.to_string())).collect(),
        }
    }

    #[test]
    fn test_row_width() {
        assert_eq!(row_width(0), 1);
        assert_eq!(row_width(1), 1);
        assert_eq!(row_width(3), 1);
        assert_eq!(row_width(4), 2);
        assert_eq!(row_width(10), 3);
    }

    #[test]
    fn test_grid_positions() {
        let nodes: Vec<StoredNode> = ["a", "b", "c", "d", "e"].iter().map(|id| stored(id, &[])).collect();
        let view = layout(&nodes);
        let positions: Vec<(usize, usize)> = view.nodes.iter().map(|n| (n.x, n.y)).collect();
        assert_eq!(positions, vec![(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);
        assert!(view.nodes.iter().all(|n| n.size == NODE_SIZE));
    }

    #[test]
    fn test_edges_carry_position() {
        let view = layout(&[stored("y", &[(0, "x"), (1, "x")]), stored("x", &[])]);
        let ids: Vec<&str> = view.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["y->x#0", "y->x#1"]);
        assert_eq!(view.edges[0].source, "y");
        assert_eq!(view.edges[0].target, "x");
    }

    #[test]
    fn test_edge_ids_use_stored_positions() {
        let view = layout(&[stored("clip", &[(0, "x"), (2, "hi")])]);
        let ids: Vec<&str> = view.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["clip->x#0", "clip->hi#2"]);
    }

    #[test]
    fn test_empty_profile() {
        assert_eq!(layout(&[]), ProfileView::default());
    }
}
