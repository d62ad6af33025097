use std::fmt::{Display, Formatter};

use crate::{Aabb, BvhParams, Transform};

/// Index of a node inside a [`BvhTree`].
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Inner { children: Vec<NodeId> },
    /// Primitives `lo..hi` of the primitive arrays.
    Leaf { lo: i32, hi: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BvhNode {
    /// Bounds of the node, expressed in `aligned_space` when it has one.
    pub bounds: Aabb,
    pub visibility: u32,
    /// Orientation of an unaligned node.
    pub aligned_space: Option<Transform>,
    pub time_from: f32,
    pub time_to: f32,
    pub kind: NodeKind,
}

impl Display for BvhNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NodeKind::Inner { children } => write!(f, "inner {} {:?}", self.bounds, children),
            NodeKind::Leaf { lo, hi } => write!(f, "leaf {} [{}, {})", self.bounds, lo, hi),
        }
    }
}

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        match self.kind {
            NodeKind::Leaf { .. } => true,
            NodeKind::Inner { .. } => false,
        }
    }

    pub fn is_unaligned(&self) -> bool {
        self.aligned_space.is_some()
    }

    pub fn aligned_space(&self) -> Transform {
        self.aligned_space.unwrap_or_else(Transform::identity)
    }

    /// Bounds in world space, unaligned nodes store theirs in their own
    /// space.
    pub fn world_bounds(&self) -> Aabb {
        match self.aligned_space {
            Some(space) => self.bounds.transformed(&space.inverse()),
            None => self.bounds,
        }
    }

    pub fn num_children(&self) -> usize {
        match &self.kind {
            NodeKind::Inner { children } => children.len(),
            NodeKind::Leaf { .. } => 0,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Inner { children } => children.as_slice(),
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub fn child(&self, i: usize) -> NodeId {
        match &self.kind {
            NodeKind::Inner { children } => children[i],
            NodeKind::Leaf { .. } => panic!("leaf nodes have no children"),
        }
    }

    pub fn num_primitives(&self) -> usize {
        match self.kind {
            NodeKind::Leaf { lo, hi } => (hi - lo) as usize,
            NodeKind::Inner { .. } => 0,
        }
    }
}

/// Statistics gathered by [`BvhTree::subtree_size`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BvhStat {
    NodeCount,
    InnerCount,
    LeafCount,
    PrimitiveCount,
    ChildNodeCount,
    AlignedCount,
    UnalignedCount,
    AlignedInnerCount,
    UnalignedInnerCount,
    Depth,
}

/// Binary tree as produced by a builder, stored in an arena.
///
/// Nodes only reference nodes added before them, so the tree is acyclic by
/// construction and is freed by dropping the arena.
#[derive(Debug, Clone, Default)]
pub struct BvhTree {
    pub nodes: Vec<BvhNode>,
    pub root: NodeId,
}

impl BvhTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> &BvhNode {
        &self.nodes[self.root]
    }

    pub fn node(&self, id: NodeId) -> &BvhNode {
        &self.nodes[id]
    }

    pub fn add_leaf(&mut self, bounds: Aabb, visibility: u32, lo: i32, hi: i32) -> NodeId {
        debug_assert!(lo <= hi);
        self.push(BvhNode {
            bounds,
            visibility,
            aligned_space: None,
            time_from: 0.0,
            time_to: 1.0,
            kind: NodeKind::Leaf { lo, hi },
        })
    }

    /// Adds an inner node, its visibility is the union of its children's.
    pub fn add_inner(&mut self, bounds: Aabb, children: Vec<NodeId>) -> NodeId {
        let visibility = children
            .iter()
            .fold(0, |acc, &c| acc | self.nodes[c].visibility);
        self.push(BvhNode {
            bounds,
            visibility,
            aligned_space: None,
            time_from: 0.0,
            time_to: 1.0,
            kind: NodeKind::Inner { children },
        })
    }

    /// Adds a binary inner node bounding both children.
    pub fn add_pair(&mut self, left: NodeId, right: NodeId) -> NodeId {
        let bounds = self.nodes[left].bounds.union_of(&self.nodes[right].bounds);
        self.add_inner(bounds, vec![left, right])
    }

    pub(crate) fn push(&mut self, node: BvhNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.root = id;
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    /// Marks a node as unaligned; `bounds` are its bounds inside `space`.
    pub fn set_aligned_space(&mut self, id: NodeId, space: Transform, bounds: Aabb) {
        let node = &mut self.nodes[id];
        node.aligned_space = Some(space);
        node.bounds = bounds;
    }

    pub fn set_time(&mut self, id: NodeId, time_from: f32, time_to: f32) {
        let node = &mut self.nodes[id];
        node.time_from = time_from;
        node.time_to = time_to;
    }

    pub fn subtree_size(&self, id: NodeId, stat: BvhStat) -> usize {
        let node = &self.nodes[id];
        let cnt = match stat {
            BvhStat::NodeCount => 1,
            BvhStat::InnerCount => !node.is_leaf() as usize,
            BvhStat::LeafCount => node.is_leaf() as usize,
            BvhStat::PrimitiveCount => node.num_primitives(),
            BvhStat::ChildNodeCount => node.num_children(),
            BvhStat::AlignedCount => !node.is_unaligned() as usize,
            BvhStat::UnalignedCount => node.is_unaligned() as usize,
            BvhStat::AlignedInnerCount | BvhStat::UnalignedInnerCount => {
                let wanted = stat == BvhStat::UnalignedInnerCount;
                let has_unaligned = node
                    .children()
                    .iter()
                    .any(|&c| self.nodes[c].is_unaligned());
                (!node.is_leaf() && has_unaligned == wanted) as usize
            }
            BvhStat::Depth => {
                return 1 + node
                    .children()
                    .iter()
                    .map(|&c| self.subtree_size(c, stat))
                    .max()
                    .unwrap_or(0);
            }
        };

        cnt + node
            .children()
            .iter()
            .map(|&c| self.subtree_size(c, stat))
            .sum::<usize>()
    }

    /// Surface area heuristic cost of the subtree below `id`.
    pub fn subtree_sah_cost(&self, params: &BvhParams, id: NodeId, probability: f32) -> f32 {
        let node = &self.nodes[id];
        let mut sah = probability * params.cost(node.num_children(), node.num_primitives());

        let area = node.bounds.safe_area();
        for &c in node.children() {
            let child = &self.nodes[c];
            let p = if area > 0.0 {
                probability * child.bounds.safe_area() / area
            } else {
                0.0
            };
            sah += self.subtree_sah_cost(params, c, p);
        }

        sah
    }

    /// Recomputes inner node visibility as the union of their children.
    pub fn update_visibility(&mut self, id: NodeId) -> u32 {
        let children = self.nodes[id].children().to_vec();
        if !children.is_empty() {
            let mut visibility = 0;
            for c in children {
                visibility |= self.update_visibility(c);
            }
            self.nodes[id].visibility = visibility;
        }

        self.nodes[id].visibility
    }

    /// Recomputes inner node time ranges as the hull of their children.
    pub fn update_time(&mut self, id: NodeId) -> (f32, f32) {
        let children = self.nodes[id].children().to_vec();
        if !children.is_empty() {
            let mut time_from = 1.0_f32;
            let mut time_to = 0.0_f32;
            for c in children {
                let (from, to) = self.update_time(c);
                time_from = time_from.min(from);
                time_to = time_to.max(to);
            }
            self.set_time(id, time_from, time_to);
        }

        let node = &self.nodes[id];
        (node.time_from, node.time_to)
    }
}
