use serde::{Deserialize, Serialize};

use crate::{Aabb, CurveSegment};

// Ray visibility bits, shared with the traversal kernel.
pub const PATH_RAY_CAMERA: u32 = 1 << 0;
pub const PATH_RAY_REFLECT: u32 = 1 << 1;
pub const PATH_RAY_TRANSMIT: u32 = 1 << 2;
pub const PATH_RAY_DIFFUSE: u32 = 1 << 3;
pub const PATH_RAY_GLOSSY: u32 = 1 << 4;
pub const PATH_RAY_SINGULAR: u32 = 1 << 5;
pub const PATH_RAY_TRANSPARENT: u32 = 1 << 6;
pub const PATH_RAY_SHADOW_OPAQUE: u32 = 1 << 7;
pub const PATH_RAY_SHADOW_TRANSPARENT: u32 = 1 << 8;
pub const PATH_RAY_VOLUME_SCATTER: u32 = 1 << 9;
pub const PATH_RAY_ALL_VISIBILITY: u32 = (1 << 10) - 1;

/// Set on nodes containing curve segments.
pub const PATH_RAY_CURVE: u32 = 1 << 10;
/// Set in the header of inner nodes stored with oriented child boxes.
pub const PATH_RAY_NODE_UNALIGNED: u32 = 1 << 11;

pub const PRIMITIVE_NONE: u32 = 0;
pub const PRIMITIVE_TRIANGLE: u32 = 1 << 0;
pub const PRIMITIVE_MOTION_TRIANGLE: u32 = 1 << 1;
pub const PRIMITIVE_CURVE: u32 = 1 << 2;
pub const PRIMITIVE_MOTION_CURVE: u32 = 1 << 3;

pub const PRIMITIVE_ALL_TRIANGLE: u32 = PRIMITIVE_TRIANGLE | PRIMITIVE_MOTION_TRIANGLE;
pub const PRIMITIVE_ALL_CURVE: u32 = PRIMITIVE_CURVE | PRIMITIVE_MOTION_CURVE;
pub const PRIMITIVE_ALL: u32 = PRIMITIVE_ALL_TRIANGLE | PRIMITIVE_ALL_CURVE;
pub const PRIMITIVE_NUM_TOTAL: u32 = 4;

/// Packs a curve segment index into the high bits of a primitive type.
pub const fn pack_segment(prim_type: u32, segment: u32) -> u32 {
    (segment << PRIMITIVE_NUM_TOTAL) | prim_type
}

pub const fn unpack_segment(prim_type: u32) -> u32 {
    prim_type >> PRIMITIVE_NUM_TOTAL
}

/// Per primitive arrays indexed by the `[lo, hi)` ranges of leaves.
///
/// A `prim_index` of `-1` marks an object instance rather than a primitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveArrays {
    pub prim_index: Vec<i32>,
    pub prim_object: Vec<i32>,
    pub prim_type: Vec<u32>,
}

impl PrimitiveArrays {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, prim_index: i32, prim_object: i32, prim_type: u32) {
        self.prim_index.push(prim_index);
        self.prim_object.push(prim_object);
        self.prim_type.push(prim_type);
    }

    pub fn extend(&mut self, other: &PrimitiveArrays) {
        self.prim_index.extend_from_slice(&other.prim_index);
        self.prim_object.extend_from_slice(&other.prim_object);
        self.prim_type.extend_from_slice(&other.prim_type);
    }

    /// Copies the primitives in `order`.
    pub fn reordered(&self, order: &[usize]) -> PrimitiveArrays {
        let mut prims = PrimitiveArrays::new();
        for &i in order {
            prims.push(self.prim_index[i], self.prim_object[i], self.prim_type[i]);
        }
        prims
    }

    pub fn len(&self) -> usize {
        self.prim_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prim_index.is_empty()
    }

    pub fn is_instance(&self, prim: usize) -> bool {
        self.prim_index[prim] == -1
    }
}

/// A primitive as seen by the builder: its bounds plus where it lives.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PrimitiveRef {
    pub bounds: Aabb,
    pub prim_index: i32,
    pub prim_object: i32,
    pub prim_type: u32,
}

impl PrimitiveRef {
    pub fn is_curve(&self) -> bool {
        self.prim_type & PRIMITIVE_ALL_CURVE != 0
    }
}

/// Access to the geometry a BVH was built over.
///
/// Object and primitive indices are the values stored in `prim_object` and
/// `prim_index`.
pub trait PrimitiveSource {
    /// Current world space bounds of an object.
    fn object_bounds(&self, object: usize) -> Aabb;

    fn object_visibility(&self, object: usize) -> u32;

    /// Grows `bounds` by the current vertex positions of a triangle, including
    /// every motion step when the geometry has motion blur.
    fn grow_triangle(&self, object: usize, triangle: usize, bounds: &mut Aabb);

    /// Grows `bounds` by a curve segment, including every motion step.
    fn grow_curve_segment(&self, object: usize, curve: usize, segment: usize, bounds: &mut Aabb);

    /// The segment at the center motion step.
    fn curve_segment(&self, object: usize, curve: usize, segment: usize) -> CurveSegment;
}
