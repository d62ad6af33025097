use serde::{Deserialize, Serialize};

use crate::pack::*;

/// Maximum depth of a binary tree handed to the packer.
pub const MAX_DEPTH: usize = 64;

/// Width of the packed nodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BvhLayout {
    Bvh4,
    Bvh8,
}

impl Default for BvhLayout {
    fn default() -> Self {
        BvhLayout::Bvh4
    }
}

impl BvhLayout {
    pub const fn width(self) -> usize {
        match self {
            BvhLayout::Bvh4 => 4,
            BvhLayout::Bvh8 => 8,
        }
    }

    /// Number of float4s holding one row of `width` lanes.
    pub const fn row_stride(self) -> usize {
        self.width() / 4
    }

    /// Binary levels pulled up below each direct child of an inner node.
    pub const fn extra_levels(self) -> usize {
        match self {
            BvhLayout::Bvh4 => 1,
            BvhLayout::Bvh8 => 2,
        }
    }

    pub const fn aligned_node_size(self) -> usize {
        match self {
            BvhLayout::Bvh4 => BVH_QNODE_SIZE,
            BvhLayout::Bvh8 => BVH_ONODE_SIZE,
        }
    }

    pub const fn unaligned_node_size(self) -> usize {
        match self {
            BvhLayout::Bvh4 => BVH_UNALIGNED_QNODE_SIZE,
            BvhLayout::Bvh8 => BVH_UNALIGNED_ONODE_SIZE,
        }
    }

    pub const fn node_size(self, unaligned: bool) -> usize {
        if unaligned {
            self.unaligned_node_size()
        } else {
            self.aligned_node_size()
        }
    }

    pub const fn leaf_size(self) -> usize {
        BVH_NODE_LEAF_SIZE
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BvhParams {
    pub layout: BvhLayout,
    /// Allow oriented child boxes for nodes over curves.
    pub use_unaligned_nodes: bool,
    /// The BVH holds object instances that carry their own BVHs.
    pub top_level: bool,
    pub sah_node_cost: f32,
    pub sah_primitive_cost: f32,
}

impl Default for BvhParams {
    fn default() -> Self {
        Self {
            layout: BvhLayout::Bvh4,
            use_unaligned_nodes: false,
            top_level: false,
            sah_node_cost: 1.0,
            sah_primitive_cost: 1.0,
        }
    }
}

impl BvhParams {
    pub fn new(layout: BvhLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn with_unaligned_nodes(mut self, use_unaligned_nodes: bool) -> Self {
        self.use_unaligned_nodes = use_unaligned_nodes;
        self
    }

    pub fn with_top_level(mut self, top_level: bool) -> Self {
        self.top_level = top_level;
        self
    }

    pub fn node_cost(&self, num_nodes: usize) -> f32 {
        num_nodes as f32 * self.sah_node_cost
    }

    pub fn primitive_cost(&self, num_prims: usize) -> f32 {
        num_prims as f32 * self.sah_primitive_cost
    }

    pub fn cost(&self, num_nodes: usize, num_prims: usize) -> f32 {
        self.node_cost(num_nodes) + self.primitive_cost(num_prims)
    }
}
