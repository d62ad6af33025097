//! Flattening of a binary [`BvhTree`] into wide packed nodes.
//!
//! A wide node takes the children of a binary inner node and pulls each of
//! them up [`BvhLayout::extra_levels`] further levels, stopping at leaves.
//! Width 4 therefore collects 2 to 4 children and width 8 collects 2 to 8.

use std::time::Instant;

use crate::{
    Aabb, BvhLayout, BvhNode, BvhParams, BvhTree, NodeId, NodeKind, PackedBvh, PrimitiveArrays,
    Transform, MAX_DEPTH, MAX_WIDTH,
};

/// Children of one wide node and the encoding it will be stored with.
#[derive(Debug, Copy, Clone)]
pub(crate) struct ChildGroup {
    nodes: [NodeId; MAX_WIDTH],
    len: usize,
    unaligned: bool,
}

impl ChildGroup {
    pub(crate) fn gather(tree: &BvhTree, id: NodeId, params: &BvhParams) -> Self {
        let mut group = Self {
            nodes: [0; MAX_WIDTH],
            len: 0,
            unaligned: false,
        };

        let node = tree.node(id);
        assert_eq!(node.num_children(), 2, "packer expects binary inner nodes");
        for &c in node.children() {
            group.collect(tree, c, params.layout.extra_levels());
        }

        group.unaligned = params.use_unaligned_nodes
            && group.as_slice().iter().any(|&c| tree.node(c).is_unaligned());
        group
    }

    fn collect(&mut self, tree: &BvhTree, id: NodeId, depth: usize) {
        let node = tree.node(id);
        if node.is_leaf() || depth == 0 {
            self.nodes[self.len] = id;
            self.len += 1;
            return;
        }

        assert_eq!(node.num_children(), 2, "packer expects binary inner nodes");
        for &c in node.children() {
            self.collect(tree, c, depth - 1);
        }
    }

    pub(crate) fn as_slice(&self) -> &[NodeId] {
        &self.nodes[..self.len]
    }

    pub(crate) fn is_unaligned(&self) -> bool {
        self.unaligned
    }
}

/// Sizes of the packed arrays, computed before anything is written.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LayoutStats {
    pub inner_nodes: usize,
    pub unaligned_nodes: usize,
    pub leaf_nodes: usize,
    /// Length of the node array in float4s.
    pub node_size: usize,
    /// Length of the leaf array in float4s.
    pub leaf_size: usize,
}

impl LayoutStats {
    pub fn compute(tree: &BvhTree, params: &BvhParams) -> Self {
        let layout = params.layout;
        let mut stats = LayoutStats::default();

        let mut stack = Vec::with_capacity(MAX_DEPTH * 2);
        stack.push(tree.root);
        while let Some(id) = stack.pop() {
            if tree.node(id).is_leaf() {
                stats.leaf_nodes += 1;
                continue;
            }

            let group = ChildGroup::gather(tree, id, params);
            stats.inner_nodes += 1;
            stats.unaligned_nodes += group.is_unaligned() as usize;
            stats.node_size += layout.node_size(group.is_unaligned());
            stack.extend_from_slice(group.as_slice());
        }

        stats.leaf_size = stats.leaf_nodes * layout.leaf_size();
        stats
    }
}

/// Fills the node and leaf arrays of a top level BVH with the BVHs of the
/// instanced objects.
pub trait PackInstances {
    /// Must leave `pack.nodes` and `pack.leaf_nodes` with at least
    /// `node_size` and `leaf_size` entries. The ranges `0..node_size` and
    /// `0..leaf_size` are overwritten with the top level nodes afterwards.
    fn pack_instances(&mut self, pack: &mut PackedBvh, node_size: usize, leaf_size: usize);
}

/// Allocates exactly what the tree needs.
struct NoInstances;

impl PackInstances for NoInstances {
    fn pack_instances(&mut self, pack: &mut PackedBvh, node_size: usize, leaf_size: usize) {
        pack.nodes = vec![[0.0; 4]; node_size];
        pack.leaf_nodes = vec![[0.0; 4]; leaf_size];
    }
}

#[derive(Debug, Copy, Clone)]
enum StackEntry {
    Leaf {
        node: NodeId,
        idx: usize,
    },
    Inner {
        node: NodeId,
        idx: usize,
        group: ChildGroup,
    },
}

struct PackingState {
    next_node_idx: usize,
    next_leaf_idx: usize,
    stack: Vec<StackEntry>,
}

impl PackingState {
    fn new() -> Self {
        Self {
            next_node_idx: 0,
            next_leaf_idx: 0,
            stack: Vec::with_capacity(MAX_DEPTH * 2),
        }
    }

    fn reserve_leaf(&mut self) -> usize {
        let idx = self.next_leaf_idx;
        self.next_leaf_idx += 1;
        idx
    }

    fn reserve_node(&mut self, layout: BvhLayout, unaligned: bool) -> usize {
        let idx = self.next_node_idx;
        self.next_node_idx += layout.node_size(unaligned);
        idx
    }
}

/// Packs a binary tree, see [`pack_nodes_with_instances`].
pub fn pack_nodes(tree: &BvhTree, prims: PrimitiveArrays, params: &BvhParams) -> PackedBvh {
    pack_nodes_with_instances(tree, prims, params, &mut NoInstances)
}

/// Flattens `tree` into wide nodes of `params.layout`.
///
/// The tree is only read. Child slots are reserved before the children are
/// written, so every parent can serialize its child pointers immediately.
pub fn pack_nodes_with_instances<I: PackInstances>(
    tree: &BvhTree,
    prims: PrimitiveArrays,
    params: &BvhParams,
    instances: &mut I,
) -> PackedBvh {
    let instant = Instant::now();
    let layout = params.layout;
    let stats = LayoutStats::compute(tree, params);

    let mut pack = PackedBvh::new(layout, prims);
    pack.top_level = params.top_level;
    instances.pack_instances(&mut pack, stats.node_size, stats.leaf_size);
    debug_assert!(pack.nodes.len() >= stats.node_size);
    debug_assert!(pack.leaf_nodes.len() >= stats.leaf_size);

    let mut state = PackingState::new();
    let root = tree.root;
    if tree.node(root).is_leaf() {
        let idx = state.reserve_leaf();
        state.stack.push(StackEntry::Leaf { node: root, idx });
        pack.root_index = -1;
    } else {
        let group = ChildGroup::gather(tree, root, params);
        let idx = state.reserve_node(layout, group.is_unaligned());
        state.stack.push(StackEntry::Inner {
            node: root,
            idx,
            group,
        });
        pack.root_index = 0;
    }

    while let Some(entry) = state.stack.pop() {
        match entry {
            StackEntry::Leaf { node, idx } => pack_leaf(&mut pack, tree.node(node), idx),
            StackEntry::Inner { node, idx, group } => {
                let mut child = [0i32; MAX_WIDTH];
                for (lane, &c) in group.as_slice().iter().enumerate() {
                    if tree.node(c).is_leaf() {
                        let leaf_idx = state.reserve_leaf();
                        state.stack.push(StackEntry::Leaf {
                            node: c,
                            idx: leaf_idx,
                        });
                        child[lane] = !(leaf_idx as i32);
                    } else {
                        let child_group = ChildGroup::gather(tree, c, params);
                        let node_idx = state.reserve_node(layout, child_group.is_unaligned());
                        state.stack.push(StackEntry::Inner {
                            node: c,
                            idx: node_idx,
                            group: child_group,
                        });
                        child[lane] = node_idx as i32;
                    }
                }

                pack_inner(&mut pack, tree, tree.node(node), idx, &group, &child[..group.len]);
            }
        }
    }

    debug_assert_eq!(state.next_node_idx, stats.node_size);
    debug_assert_eq!(state.next_leaf_idx, stats.leaf_size);

    log::debug!(
        "packed {:?}: {} inner nodes ({} unaligned), {} leaves, {} node float4s in {} ms",
        layout,
        stats.inner_nodes,
        stats.unaligned_nodes,
        stats.leaf_nodes,
        stats.node_size,
        instant.elapsed().as_millis()
    );

    pack
}

fn pack_leaf(pack: &mut PackedBvh, node: &BvhNode, idx: usize) {
    match node.kind {
        NodeKind::Leaf { lo, hi } => pack.pack_leaf(idx, lo, hi, node.visibility),
        NodeKind::Inner { .. } => unreachable!("inner node queued as leaf"),
    }
}

fn pack_inner(
    pack: &mut PackedBvh,
    tree: &BvhTree,
    node: &BvhNode,
    idx: usize,
    group: &ChildGroup,
    child: &[i32],
) {
    let children: Vec<&BvhNode> = group.as_slice().iter().map(|&c| tree.node(c)).collect();

    if group.is_unaligned() {
        let spaces: Vec<Transform> = children.iter().map(|c| c.aligned_space()).collect();
        let bounds: Vec<Aabb> = children.iter().map(|c| c.bounds).collect();
        pack.pack_unaligned_node(
            idx,
            &spaces,
            &bounds,
            child,
            node.visibility,
            node.time_from,
            node.time_to,
        );
    } else {
        let bounds: Vec<Aabb> = children.iter().map(|c| c.world_bounds()).collect();
        pack.pack_aligned_node(
            idx,
            &bounds,
            child,
            node.visibility,
            node.time_from,
            node.time_to,
        );
    }
}

impl BvhTree {
    /// Builds a new tree whose inner nodes directly hold the wide child
    /// groups the packer would form for `layout`.
    ///
    /// Leaves are copied, the original tree is left untouched.
    pub fn widen_children_nodes(&self, layout: BvhLayout) -> BvhTree {
        let params = BvhParams::new(layout);
        let mut wide = BvhTree::with_capacity(self.len());
        if !self.is_empty() {
            let root = self.widen_node(self.root, &params, &mut wide);
            wide.set_root(root);
        }
        wide
    }

    fn widen_node(&self, id: NodeId, params: &BvhParams, wide: &mut BvhTree) -> NodeId {
        let node = self.node(id);
        if node.is_leaf() {
            return wide.push(node.clone());
        }

        let group = ChildGroup::gather(self, id, params);
        let children = group
            .as_slice()
            .iter()
            .map(|&c| self.widen_node(c, params, wide))
            .collect();

        wide.push(BvhNode {
            bounds: node.bounds,
            visibility: node.visibility,
            aligned_space: node.aligned_space,
            time_from: node.time_from,
            time_to: node.time_to,
            kind: NodeKind::Inner { children },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ChildRef, BVH_ONODE_SIZE, BVH_QNODE_SIZE, BVH_UNALIGNED_QNODE_SIZE, PRIMITIVE_TRIANGLE,
    };
    use glam::Vec3;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn unit_box(x: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    fn triangles(n: usize) -> PrimitiveArrays {
        let mut prims = PrimitiveArrays::new();
        for i in 0..n {
            prims.push(i as i32, 0, PRIMITIVE_TRIANGLE);
        }
        prims
    }

    /// A:[0,1), B:[1,3), C:[3,4) as ((A, B), C).
    fn three_leaves() -> BvhTree {
        let mut tree = BvhTree::new();
        let a = tree.add_leaf(unit_box(0.0), 1, 0, 1);
        let b = tree.add_leaf(unit_box(1.0), 2, 1, 3);
        let c = tree.add_leaf(unit_box(2.0), 4, 3, 4);
        let ab = tree.add_pair(a, b);
        tree.add_pair(ab, c);
        tree
    }

    fn balanced(tree: &mut BvhTree, lo: i32, hi: i32) -> NodeId {
        if hi - lo == 1 {
            return tree.add_leaf(unit_box(lo as f32), 1, lo, hi);
        }
        let mid = (lo + hi) / 2;
        let left = balanced(tree, lo, mid);
        let right = balanced(tree, mid, hi);
        tree.add_pair(left, right)
    }

    fn random_subtree(tree: &mut BvhTree, rng: &mut SmallRng, lo: i32, hi: i32) -> NodeId {
        if hi - lo <= rng.gen_range(1, 4) {
            let bounds = Aabb::new(Vec3::splat(lo as f32), Vec3::splat(hi as f32));
            return tree.add_leaf(bounds, 1 << (lo % 10), lo, hi);
        }

        let mid = rng.gen_range(lo + 1, hi);
        let left = random_subtree(tree, rng, lo, mid);
        let right = random_subtree(tree, rng, mid, hi);
        let id = tree.add_pair(left, right);
        if rng.gen_range(0, 4) == 0 {
            let space = Transform::frame(Vec3::new(0.0, 1.0, 1.0).normalize());
            let bounds = tree.node(id).bounds.transformed(&space);
            tree.set_aligned_space(id, space, bounds);
        }
        id
    }

    fn random_tree(seed: u64, num_prims: i32) -> BvhTree {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut tree = BvhTree::new();
        let root = random_subtree(&mut tree, &mut rng, 0, num_prims);
        tree.set_root(root);
        tree
    }

    /// Every inner node reachable from the root as `(offset, size)`.
    fn packed_inner_nodes(pack: &PackedBvh) -> Vec<(usize, usize)> {
        let mut found = Vec::new();
        if pack.root_index < 0 {
            return found;
        }

        let mut stack = vec![0];
        while let Some(idx) = stack.pop() {
            found.push((idx, pack.node_size(idx)));
            for c in pack.node_children(idx) {
                if let ChildRef::Inner(offset) = c {
                    stack.push(offset);
                }
            }
        }
        found.sort();
        found
    }

    fn tree_shape(tree: &BvhTree, id: NodeId) -> String {
        match &tree.node(id).kind {
            NodeKind::Leaf { lo, hi } => format!("{}..{}", lo, hi),
            NodeKind::Inner { children } => {
                let inner: Vec<String> = children.iter().map(|&c| tree_shape(tree, c)).collect();
                format!("({})", inner.join(" "))
            }
        }
    }

    fn packed_shape(pack: &PackedBvh, child: ChildRef) -> String {
        match child {
            ChildRef::Leaf(idx) => {
                let range = pack.leaf(idx).prim_range();
                format!("{}..{}", range.start, range.end)
            }
            ChildRef::Inner(idx) => {
                let inner: Vec<String> = pack
                    .node_children(idx)
                    .into_iter()
                    .filter(|&c| c != ChildRef::Absent)
                    .map(|c| packed_shape(pack, c))
                    .collect();
                format!("({})", inner.join(" "))
            }
            ChildRef::Absent => String::new(),
        }
    }

    #[test]
    fn three_leaves_make_one_wide_node() {
        let tree = three_leaves();
        let pack = pack_nodes(&tree, triangles(4), &BvhParams::default());

        assert_eq!(pack.root_index, 0);
        assert_eq!(pack.nodes.len(), BVH_QNODE_SIZE);
        assert_eq!(pack.leaf_nodes.len(), 3);

        let children = pack.node_children(0);
        assert_eq!(
            children,
            vec![
                ChildRef::Leaf(0),
                ChildRef::Leaf(1),
                ChildRef::Leaf(2),
                ChildRef::Absent
            ]
        );
        assert_eq!(pack.child_bounds(0, 0), unit_box(0.0));
        assert_eq!(pack.child_bounds(0, 1), unit_box(1.0));
        assert_eq!(pack.child_bounds(0, 2), unit_box(2.0));
        assert_eq!(pack.node_visibility(0), 7);
        assert_eq!(pack.leaf(1).prim_range(), 1..3);
        assert_eq!(pack.leaf(2).visibility, 4);
    }

    #[test]
    fn single_leaf_root() {
        let mut tree = BvhTree::new();
        tree.add_leaf(unit_box(0.0), 1, 0, 1);

        for &layout in &[BvhLayout::Bvh4, BvhLayout::Bvh8] {
            let pack = pack_nodes(&tree, triangles(1), &BvhParams::new(layout));
            assert_eq!(pack.root_index, -1);
            assert!(pack.nodes.is_empty());
            assert_eq!(pack.leaf_nodes.len(), 1);
            assert_eq!(pack.leaf(0).prim_range(), 0..1);
        }
    }

    #[test]
    fn balanced_tree_grouping() {
        let mut tree = BvhTree::new();
        let root = balanced(&mut tree, 0, 16);
        tree.set_root(root);

        let pack4 = pack_nodes(&tree, triangles(16), &BvhParams::new(BvhLayout::Bvh4));
        assert_eq!(pack4.nodes.len(), 5 * BVH_QNODE_SIZE);
        assert_eq!(pack4.leaf_nodes.len(), 16);
        assert!(pack4
            .node_children(0)
            .iter()
            .all(|c| matches!(c, ChildRef::Inner(_))));

        let pack8 = pack_nodes(&tree, triangles(16), &BvhParams::new(BvhLayout::Bvh8));
        assert_eq!(pack8.nodes.len(), 9 * BVH_ONODE_SIZE);
        let root_children = pack8.node_children(0);
        assert_eq!(root_children.len(), 8);
        for c in root_children {
            match c {
                ChildRef::Inner(idx) => {
                    let leaves = pack8.node_children(idx);
                    assert!(leaves[..2].iter().all(|c| matches!(c, ChildRef::Leaf(_))));
                    assert!(leaves[2..].iter().all(|c| *c == ChildRef::Absent));
                }
                other => panic!("expected inner child, got {:?}", other),
            }
        }
    }

    #[test]
    fn unaligned_child_switches_encoding() {
        let mut tree = three_leaves();
        let space = Transform::frame(Vec3::Y);
        let c = 2;
        let bounds = tree.node(c).bounds.transformed(&space);
        tree.set_aligned_space(c, space, bounds);

        let params = BvhParams::default().with_unaligned_nodes(true);
        let pack = pack_nodes(&tree, triangles(4), &params);
        assert!(pack.is_unaligned_node(0));
        assert_eq!(pack.nodes.len(), BVH_UNALIGNED_QNODE_SIZE);
        assert_eq!(pack.node_visibility(0), 7);

        let center = pack.child_transform(0, 2).transform_point(unit_box(2.0).center());
        assert!((center - Vec3::splat(0.5)).length() < 1e-5);
        let center = pack.child_transform(0, 0).transform_point(unit_box(0.0).center());
        assert!((center - Vec3::splat(0.5)).length() < 1e-5);

        // Without unaligned nodes the child is stored by its world bounds.
        let pack = pack_nodes(&tree, triangles(4), &BvhParams::default());
        assert!(!pack.is_unaligned_node(0));
        let stored = pack.child_bounds(0, 2);
        assert!((stored.min - unit_box(2.0).min).length() < 1e-5);
        assert!((stored.max - unit_box(2.0).max).length() < 1e-5);
    }

    #[test]
    fn time_range_comes_from_packed_node() {
        let mut tree = three_leaves();
        let root = tree.root;
        tree.set_time(root, 0.25, 0.5);
        let pack = pack_nodes(&tree, triangles(4), &BvhParams::default());
        assert_eq!(pack.node_time(0), (0.25, 0.5));
    }

    #[test]
    fn size_invariant_on_random_trees() {
        for seed in 0..24 {
            let tree = random_tree(seed, 60);
            for &layout in &[BvhLayout::Bvh4, BvhLayout::Bvh8] {
                for &unaligned in &[false, true] {
                    let params = BvhParams::new(layout).with_unaligned_nodes(unaligned);
                    let stats = LayoutStats::compute(&tree, &params);
                    let pack = pack_nodes(&tree, triangles(60), &params);

                    assert_eq!(pack.nodes.len(), stats.node_size);
                    assert_eq!(pack.leaf_nodes.len(), stats.leaf_size);
                    if !unaligned {
                        assert_eq!(stats.unaligned_nodes, 0);
                    }

                    // Decoded offsets tile the node array exactly.
                    let nodes = packed_inner_nodes(&pack);
                    assert_eq!(nodes.len(), stats.inner_nodes);
                    let mut expected_offset = 0;
                    for (offset, size) in nodes {
                        assert_eq!(offset, expected_offset);
                        expected_offset += size;
                    }
                    assert_eq!(expected_offset, stats.node_size);
                }
            }
        }
    }

    #[test]
    fn child_counts_stay_within_width() {
        for seed in 0..8 {
            let tree = random_tree(seed, 50);
            for &layout in &[BvhLayout::Bvh4, BvhLayout::Bvh8] {
                let pack = pack_nodes(&tree, triangles(50), &BvhParams::new(layout));
                for (idx, _) in packed_inner_nodes(&pack) {
                    let children = pack.node_children(idx);
                    let used = children.iter().filter(|c| **c != ChildRef::Absent).count();
                    assert!(used >= 2 && used <= layout.width());
                    // Real children come first, padding after.
                    assert!(children[used..].iter().all(|c| *c == ChildRef::Absent));
                }
            }
        }
    }

    #[test]
    fn widened_tree_matches_packed_groups() {
        for seed in 0..8 {
            let tree = random_tree(seed, 40);
            for &layout in &[BvhLayout::Bvh4, BvhLayout::Bvh8] {
                let wide = tree.widen_children_nodes(layout);
                let pack = pack_nodes(&tree, triangles(40), &BvhParams::new(layout));
                assert_eq!(
                    tree_shape(&wide, wide.root),
                    packed_shape(&pack, ChildRef::Inner(0))
                );
                assert!(wide
                    .nodes
                    .iter()
                    .all(|n| n.num_children() <= layout.width()));
            }
        }
    }

    /// Slab test as run by the traversal kernel: near and far planes are
    /// picked by the sign of the inverse direction and NaNs poison the result.
    fn slab_hit(lo: Vec3, hi: Vec3, org: Vec3, idir: Vec3, t_max: f32) -> bool {
        fn nan_max(a: f32, b: f32) -> f32 {
            if a.is_nan() || b.is_nan() {
                f32::NAN
            } else {
                a.max(b)
            }
        }
        fn nan_min(a: f32, b: f32) -> f32 {
            if a.is_nan() || b.is_nan() {
                f32::NAN
            } else {
                a.min(b)
            }
        }

        let mut near = 0.0;
        let mut far = t_max;
        for axis in 0..3 {
            let (n, f) = if idir[axis] >= 0.0 {
                (lo[axis], hi[axis])
            } else {
                (hi[axis], lo[axis])
            };
            near = nan_max(near, (n - org[axis]) * idir[axis]);
            far = nan_min(far, (f - org[axis]) * idir[axis]);
        }
        near <= far
    }

    fn aligned_lane_hit(pack: &PackedBvh, idx: usize, lane: usize, org: Vec3, dir: Vec3) -> bool {
        let b = pack.child_bounds(idx, lane);
        slab_hit(b.min, b.max, org, dir.recip(), f32::MAX)
    }

    fn unaligned_lane_hit(pack: &PackedBvh, idx: usize, lane: usize, org: Vec3, dir: Vec3) -> bool {
        let space = pack.child_transform(idx, lane);
        let org = space.transform_point(org);
        let dir = space.transform_direction(dir);
        slab_hit(Vec3::ZERO, Vec3::ONE, org, dir.recip(), f32::MAX)
    }

    fn random_rays(rng: &mut SmallRng) -> Vec<(Vec3, Vec3)> {
        let mut rays = Vec::new();
        for _ in 0..500 {
            let org = Vec3::new(
                rng.gen_range(-100.0, 100.0),
                rng.gen_range(-100.0, 100.0),
                rng.gen_range(-100.0, 100.0),
            );
            let dir = Vec3::new(
                rng.gen_range(-1.0, 1.0),
                rng.gen_range(-1.0, 1.0),
                rng.gen_range(-1.0, 1.0),
            );
            rays.push((org, dir));
        }
        for &dir in &[Vec3::X, -Vec3::Y, Vec3::Z, Vec3::new(0.0, 1.0, -1.0)] {
            rays.push((Vec3::ZERO, dir));
            rays.push((Vec3::splat(-3.0), dir));
        }
        // No motion along x, which the 4-wide unaligned padding collapses onto.
        rays.push((Vec3::new(-53.7, -18.8, -54.3), Vec3::new(0.0, -0.031, -0.564)));
        rays.push((Vec3::new(12.0, 40.0, -7.0), Vec3::new(0.0, 1.0, 1.0)));
        rays
    }

    #[test]
    fn padding_lanes_are_never_hit() {
        let mut rng = SmallRng::seed_from_u64(7);
        let rays = random_rays(&mut rng);

        let mut tree = three_leaves();
        let space = Transform::frame(Vec3::Y);
        let bounds = tree.node(2).bounds.transformed(&space);
        tree.set_aligned_space(2, space, bounds);

        for &layout in &[BvhLayout::Bvh4, BvhLayout::Bvh8] {
            for &unaligned in &[false, true] {
                let params = BvhParams::new(layout).with_unaligned_nodes(unaligned);
                let pack = pack_nodes(&tree, triangles(4), &params);

                for lane in 0..3 {
                    let center = unit_box(lane as f32).center();
                    let hit = if unaligned {
                        unaligned_lane_hit(&pack, 0, lane, center, Vec3::X)
                    } else {
                        aligned_lane_hit(&pack, 0, lane, center, Vec3::X)
                    };
                    assert!(hit, "ray from inside child {} must hit it", lane);
                }

                for lane in 3..layout.width() {
                    for &(org, dir) in &rays {
                        let hit = if unaligned {
                            unaligned_lane_hit(&pack, 0, lane, org, dir)
                        } else {
                            aligned_lane_hit(&pack, 0, lane, org, dir)
                        };
                        assert!(!hit, "padding lane {} hit by {:?} {:?}", lane, org, dir);
                    }
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn non_binary_input_is_rejected() {
        let mut tree = BvhTree::new();
        let a = tree.add_leaf(unit_box(0.0), 1, 0, 1);
        let b = tree.add_leaf(unit_box(1.0), 1, 1, 2);
        let c = tree.add_leaf(unit_box(2.0), 1, 2, 3);
        let bounds = unit_box(0.0).union_of(&unit_box(2.0));
        tree.add_inner(bounds, vec![a, b, c]);
        pack_nodes(&tree, triangles(3), &BvhParams::default());
    }
}
