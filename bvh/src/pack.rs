//! Packed node buffers read by the traversal kernel.
//!
//! Inner nodes are sequences of rows, a row holds one lane per child and
//! spans `width / 4` float4s. Integers are stored bit cast into float lanes.
//!
//! Aligned node rows: header, `min.x`, `max.x`, `min.y`, `max.y`, `min.z`,
//! `max.z`, child pointers.
//!
//! Unaligned node rows: header, the 3x3 part of the world to `[0, 1]^3`
//! transform of each child in row order, its translation column, child
//! pointers.
//!
//! The header row stores the visibility bits in lane 0 (with
//! [`PATH_RAY_NODE_UNALIGNED`] telling the two kinds apart) and the motion
//! time range in lanes 1 and 2.
//!
//! Child pointers are `!index` for leaves, the node offset for inner nodes
//! and `0` for unused slots. The root always lives at offset 0 so no child
//! points there.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::Range;
use std::path::Path;

use crate::{
    compute_node_transform, Aabb, BvhLayout, PrimitiveArrays, Result, Transform,
    PATH_RAY_NODE_UNALIGNED, PRIMITIVE_NONE,
};

pub type Float4 = [f32; 4];

pub const BVH_QNODE_SIZE: usize = 8;
pub const BVH_UNALIGNED_QNODE_SIZE: usize = 14;
pub const BVH_ONODE_SIZE: usize = 16;
pub const BVH_UNALIGNED_ONODE_SIZE: usize = 28;
pub const BVH_NODE_LEAF_SIZE: usize = 1;

pub const MAX_WIDTH: usize = 8;

const ROW_HEADER: usize = 0;
const ROW_ALIGNED_CHILD: usize = 7;
const ROW_UNALIGNED_TRANSLATION: usize = 10;
const ROW_UNALIGNED_CHILD: usize = 13;

#[inline]
pub fn int_as_float(i: i32) -> f32 {
    f32::from_bits(i as u32)
}

#[inline]
pub fn float_as_int(f: f32) -> i32 {
    f.to_bits() as i32
}

#[inline]
pub fn uint_as_float(u: u32) -> f32 {
    f32::from_bits(u)
}

#[inline]
pub fn float_as_uint(f: f32) -> u32 {
    f.to_bits()
}

/// Decoded child pointer lane.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChildRef {
    Absent,
    Leaf(usize),
    Inner(usize),
}

impl ChildRef {
    pub fn decode(c: i32) -> Self {
        if c == 0 {
            ChildRef::Absent
        } else if c < 0 {
            ChildRef::Leaf(!c as usize)
        } else {
            ChildRef::Inner(c as usize)
        }
    }

    pub fn encode(self) -> i32 {
        match self {
            ChildRef::Absent => 0,
            ChildRef::Leaf(idx) => !(idx as i32),
            ChildRef::Inner(offset) => {
                debug_assert!(offset > 0, "the root cannot be referenced as a child");
                offset as i32
            }
        }
    }
}

/// One leaf record: `(lo, hi, visibility, prim_type)`, or `(!lo, 0, ..)` for
/// a leaf holding a single object instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LeafRecord {
    pub x: i32,
    pub y: i32,
    pub visibility: u32,
    pub prim_type: u32,
}

impl LeafRecord {
    pub fn is_instance(&self) -> bool {
        self.x < 0
    }

    pub fn prim_range(&self) -> Range<usize> {
        if self.is_instance() {
            let lo = !self.x as usize;
            lo..lo + 1
        } else {
            self.x as usize..self.y as usize
        }
    }

    fn to_float4(&self) -> Float4 {
        [
            int_as_float(self.x),
            int_as_float(self.y),
            uint_as_float(self.visibility),
            uint_as_float(self.prim_type),
        ]
    }

    fn from_float4(data: &Float4) -> Self {
        Self {
            x: float_as_int(data[0]),
            y: float_as_int(data[1]),
            visibility: float_as_uint(data[2]),
            prim_type: float_as_uint(data[3]),
        }
    }
}

/// Mutable view of one node record.
struct NodeRows<'a> {
    data: &'a mut [Float4],
    row_stride: usize,
}

impl<'a> NodeRows<'a> {
    fn set(&mut self, row: usize, lane: usize, value: f32) {
        self.data[row * self.row_stride + lane / 4][lane % 4] = value;
    }

    fn set_header(&mut self, visibility: u32, time_from: f32, time_to: f32) {
        self.set(ROW_HEADER, 0, uint_as_float(visibility));
        self.set(ROW_HEADER, 1, time_from);
        self.set(ROW_HEADER, 2, time_to);
    }

    fn set_transform(&mut self, lane: usize, space: &Transform) {
        let rows = [space.x, space.y, space.z];
        for (r, row) in rows.iter().enumerate() {
            self.set(1 + r * 3, lane, row.x);
            self.set(2 + r * 3, lane, row.y);
            self.set(3 + r * 3, lane, row.z);
            self.set(ROW_UNALIGNED_TRANSLATION + r, lane, row.w);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackedBvh {
    pub layout: BvhLayout,
    pub top_level: bool,
    pub nodes: Vec<Float4>,
    pub leaf_nodes: Vec<Float4>,
    pub prims: PrimitiveArrays,
    /// `-1` when the tree is a single leaf, `0` otherwise.
    pub root_index: i32,
}

impl PackedBvh {
    pub fn new(layout: BvhLayout, prims: PrimitiveArrays) -> Self {
        Self {
            layout,
            top_level: false,
            nodes: Vec::new(),
            leaf_nodes: Vec::new(),
            prims,
            root_index: -1,
        }
    }

    fn rows_mut(&mut self, idx: usize, size: usize) -> NodeRows<'_> {
        let row_stride = self.layout.row_stride();
        let data = &mut self.nodes[idx..idx + size];
        for f in data.iter_mut() {
            *f = [0.0; 4];
        }
        NodeRows { data, row_stride }
    }

    fn lane(&self, idx: usize, row: usize, lane: usize) -> f32 {
        self.nodes[idx + row * self.layout.row_stride() + lane / 4][lane % 4]
    }

    pub fn write_leaf(&mut self, idx: usize, leaf: &LeafRecord) {
        self.leaf_nodes[idx] = leaf.to_float4();
    }

    pub fn leaf(&self, idx: usize) -> LeafRecord {
        LeafRecord::from_float4(&self.leaf_nodes[idx])
    }

    /// Serializes a leaf over primitives `lo..hi`.
    pub fn pack_leaf(&mut self, idx: usize, lo: i32, hi: i32, visibility: u32) {
        let num = hi - lo;
        let (x, y) = if num == 1 && self.prims.is_instance(lo as usize) {
            (!lo, 0)
        } else {
            (lo, hi)
        };
        let prim_type = if num != 0 {
            self.prims.prim_type[lo as usize]
        } else {
            PRIMITIVE_NONE
        };

        self.write_leaf(
            idx,
            &LeafRecord {
                x,
                y,
                visibility,
                prim_type,
            },
        );
    }

    /// Serializes an aligned inner node, slots past `bounds.len()` get boxes
    /// no ray can hit.
    pub fn pack_aligned_node(
        &mut self,
        idx: usize,
        bounds: &[Aabb],
        child: &[i32],
        visibility: u32,
        time_from: f32,
        time_to: f32,
    ) {
        let width = self.layout.width();
        debug_assert!(bounds.len() == child.len() && bounds.len() <= width);

        let size = self.layout.aligned_node_size();
        let mut rows = self.rows_mut(idx, size);
        rows.set_header(visibility & !PATH_RAY_NODE_UNALIGNED, time_from, time_to);

        for lane in 0..width {
            let (min, max, c) = match bounds.get(lane) {
                Some(b) => (b.min, b.max, child[lane]),
                None => (Vec3::splat(f32::MAX), Vec3::splat(-f32::MAX), 0),
            };

            rows.set(1, lane, min.x);
            rows.set(2, lane, max.x);
            rows.set(3, lane, min.y);
            rows.set(4, lane, max.y);
            rows.set(5, lane, min.z);
            rows.set(6, lane, max.z);
            rows.set(ROW_ALIGNED_CHILD, lane, int_as_float(c));
        }
    }

    /// Serializes an unaligned inner node. Each child stores the transform
    /// taking world space into its box, see
    /// [`compute_node_transform`].
    #[allow(clippy::too_many_arguments)]
    pub fn pack_unaligned_node(
        &mut self,
        idx: usize,
        aligned_space: &[Transform],
        bounds: &[Aabb],
        child: &[i32],
        visibility: u32,
        time_from: f32,
        time_to: f32,
    ) {
        let layout = self.layout;
        let width = layout.width();
        debug_assert!(bounds.len() == child.len() && bounds.len() == aligned_space.len());
        debug_assert!(bounds.len() <= width);

        let mut rows = self.rows_mut(idx, layout.unaligned_node_size());
        rows.set_header(visibility | PATH_RAY_NODE_UNALIGNED, time_from, time_to);

        for lane in 0..width {
            if lane < bounds.len() {
                let space = compute_node_transform(&bounds[lane], &aligned_space[lane]);
                rows.set_transform(lane, &space);
                rows.set(ROW_UNALIGNED_CHILD, lane, int_as_float(child[lane]));
                continue;
            }

            match layout {
                BvhLayout::Bvh4 => {
                    // Unit scale on x, collapsed y and z, pushed to -inf.
                    let space = Transform::from_rows(
                        Vec4::new(1.0, 0.0, 0.0, -f32::MAX),
                        Vec4::new(0.0, 0.0, 0.0, -f32::MAX),
                        Vec4::new(0.0, 0.0, 0.0, -f32::MAX),
                    );
                    rows.set_transform(lane, &space);
                }
                BvhLayout::Bvh8 => {
                    for row in 1..ROW_UNALIGNED_CHILD {
                        rows.set(row, lane, f32::NAN);
                    }
                }
            }
            rows.set(ROW_UNALIGNED_CHILD, lane, int_as_float(0));
        }
    }

    pub fn is_unaligned_node(&self, idx: usize) -> bool {
        float_as_uint(self.lane(idx, ROW_HEADER, 0)) & PATH_RAY_NODE_UNALIGNED != 0
    }

    /// Visibility of an inner node without the unaligned flag.
    pub fn node_visibility(&self, idx: usize) -> u32 {
        float_as_uint(self.lane(idx, ROW_HEADER, 0)) & !PATH_RAY_NODE_UNALIGNED
    }

    pub fn node_time(&self, idx: usize) -> (f32, f32) {
        (self.lane(idx, ROW_HEADER, 1), self.lane(idx, ROW_HEADER, 2))
    }

    /// Size in float4s of the inner node at `idx`.
    pub fn node_size(&self, idx: usize) -> usize {
        self.layout.node_size(self.is_unaligned_node(idx))
    }

    /// Raw child pointer lanes, only the first `width` entries are used.
    pub fn child_lanes(&self, idx: usize) -> [i32; MAX_WIDTH] {
        let row = if self.is_unaligned_node(idx) {
            ROW_UNALIGNED_CHILD
        } else {
            ROW_ALIGNED_CHILD
        };

        let mut lanes = [0; MAX_WIDTH];
        for (lane, c) in lanes.iter_mut().enumerate().take(self.layout.width()) {
            *c = float_as_int(self.lane(idx, row, lane));
        }
        lanes
    }

    pub fn node_children(&self, idx: usize) -> Vec<ChildRef> {
        self.child_lanes(idx)[..self.layout.width()]
            .iter()
            .map(|&c| ChildRef::decode(c))
            .collect()
    }

    /// Box of one child lane of an aligned node.
    pub fn child_bounds(&self, idx: usize, lane: usize) -> Aabb {
        debug_assert!(!self.is_unaligned_node(idx));
        Aabb::new(
            Vec3::new(
                self.lane(idx, 1, lane),
                self.lane(idx, 3, lane),
                self.lane(idx, 5, lane),
            ),
            Vec3::new(
                self.lane(idx, 2, lane),
                self.lane(idx, 4, lane),
                self.lane(idx, 6, lane),
            ),
        )
    }

    /// World to unit box transform of one child lane of an unaligned node.
    pub fn child_transform(&self, idx: usize, lane: usize) -> Transform {
        debug_assert!(self.is_unaligned_node(idx));
        let row = |r: usize| {
            Vec4::new(
                self.lane(idx, 1 + r * 3, lane),
                self.lane(idx, 2 + r * 3, lane),
                self.lane(idx, 3 + r * 3, lane),
                self.lane(idx, ROW_UNALIGNED_TRANSLATION + r, lane),
            )
        };
        Transform::from_rows(row(0), row(1), row(2))
    }

    fn set_child_lane(&mut self, idx: usize, lane: usize, c: i32) {
        let row = if self.is_unaligned_node(idx) {
            ROW_UNALIGNED_CHILD
        } else {
            ROW_ALIGNED_CHILD
        };
        self.nodes[idx + row * self.layout.row_stride() + lane / 4][lane % 4] = int_as_float(c);
    }

    /// Appends the nodes, leaves and primitives of `other`, rebasing its child
    /// pointers and leaf ranges. Returns the offsets of its root node and of
    /// its first leaf.
    pub fn append(&mut self, other: &PackedBvh) -> (usize, usize) {
        assert_eq!(self.layout, other.layout, "cannot mix node widths");
        let node_offset = self.nodes.len();
        let leaf_offset = self.leaf_nodes.len();
        let prim_offset = self.prims.len() as i32;

        self.nodes.extend_from_slice(&other.nodes);
        for idx in 0..other.leaf_nodes.len() {
            let mut leaf = other.leaf(idx);
            if leaf.is_instance() {
                leaf.x = !(!leaf.x + prim_offset);
            } else {
                leaf.x += prim_offset;
                leaf.y += prim_offset;
            }
            self.leaf_nodes.push(leaf.to_float4());
        }
        self.prims.extend(&other.prims);

        if other.root_index == 0 && !other.nodes.is_empty() {
            let mut stack = vec![0];
            while let Some(idx) = stack.pop() {
                let lanes = other.child_lanes(idx);
                for (lane, &c) in lanes[..self.layout.width()].iter().enumerate() {
                    let rebased = match ChildRef::decode(c) {
                        ChildRef::Absent => continue,
                        ChildRef::Leaf(leaf) => ChildRef::Leaf(leaf + leaf_offset),
                        ChildRef::Inner(offset) => {
                            stack.push(offset);
                            ChildRef::Inner(offset + node_offset)
                        }
                    };
                    self.set_child_lane(idx + node_offset, lane, rebased.encode());
                }
            }
        }

        (node_offset, leaf_offset)
    }

    /// Bounds of everything below the root node, `None` when the root is a
    /// leaf since leaf records hold no box.
    pub fn root_bounds(&self) -> Option<Aabb> {
        if self.root_index < 0 || self.nodes.is_empty() {
            return None;
        }

        let unaligned = self.is_unaligned_node(0);
        let mut bounds = Aabb::empty();
        for (lane, c) in self.node_children(0).into_iter().enumerate() {
            if c == ChildRef::Absent {
                continue;
            }

            let child = if unaligned {
                let unit = Aabb::new(Vec3::ZERO, Vec3::ONE);
                unit.transformed(&self.child_transform(0, lane).inverse())
            } else {
                self.child_bounds(0, lane)
            };
            bounds.grow_bb(&child);
        }
        Some(bounds)
    }

    pub fn node_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    pub fn leaf_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.leaf_nodes)
    }

    pub fn serialize<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn deserialize<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let pack = bincode::deserialize_from(BufReader::new(file))?;
        Ok(pack)
    }
}
