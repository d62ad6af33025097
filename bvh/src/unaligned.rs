use glam::*;

use crate::{unpack_segment, Aabb, PrimitiveRef, PrimitiveSource, Transform};

/// Finds orientations for nodes over curves and bounds primitives inside
/// them.
pub struct UnalignedSpace<'a, S: PrimitiveSource> {
    source: &'a S,
}

impl<'a, S: PrimitiveSource> UnalignedSpace<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Orientation from the first reference that defines a direction, the
    /// identity when none does.
    pub fn compute_aligned_space(&self, refs: &[PrimitiveRef]) -> Transform {
        refs.iter()
            .find_map(|r| self.compute_aligned_space_for(r))
            .unwrap_or_else(Transform::identity)
    }

    /// Frame along a curve segment, `None` for other primitives and for
    /// segments too short to have a direction.
    pub fn compute_aligned_space_for(&self, prim: &PrimitiveRef) -> Option<Transform> {
        if !prim.is_curve() {
            return None;
        }

        let segment = self.source.curve_segment(
            prim.prim_object as usize,
            prim.prim_index as usize,
            unpack_segment(prim.prim_type) as usize,
        );
        let (axis, length) = segment.direction();
        if length > 1e-6 {
            Some(Transform::frame(axis))
        } else {
            None
        }
    }

    pub fn compute_aligned_prim_boundbox(&self, prim: &PrimitiveRef, space: &Transform) -> Aabb {
        if prim.is_curve() {
            let segment = self.source.curve_segment(
                prim.prim_object as usize,
                prim.prim_index as usize,
                unpack_segment(prim.prim_type) as usize,
            );
            let mut bounds = Aabb::empty();
            segment.bounds_grow_aligned(space, &mut bounds);
            bounds
        } else {
            prim.bounds.transformed(space)
        }
    }

    /// Bounds of all references inside `space`. `cent_bounds`, when given,
    /// receives the bounds of their doubled centers.
    pub fn compute_aligned_boundbox(
        &self,
        refs: &[PrimitiveRef],
        space: &Transform,
        mut cent_bounds: Option<&mut Aabb>,
    ) -> Aabb {
        let mut bounds = Aabb::empty();
        if let Some(cent) = cent_bounds.as_mut() {
            **cent = Aabb::empty();
        }

        for prim in refs {
            let prim_bounds = self.compute_aligned_prim_boundbox(prim, space);
            bounds.grow_bb(&prim_bounds);
            if let Some(cent) = cent_bounds.as_mut() {
                cent.grow(prim_bounds.center2());
            }
        }

        bounds
    }
}

/// Transform taking world space into the unit cube spanned by `bounds`,
/// where `bounds` are expressed in `space`.
pub fn compute_node_transform(bounds: &Aabb, space: &Transform) -> Transform {
    let mut local = *space;
    local.x.w -= bounds.min.x;
    local.y.w -= bounds.min.y;
    local.z.w -= bounds.min.z;

    let dim = bounds.size().max(Vec3::splat(1e-18));
    Transform::scale(dim.recip()) * local
}
