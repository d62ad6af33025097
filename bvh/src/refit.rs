use crate::{
    unpack_segment, Aabb, ChildRef, LeafRecord, PackedBvh, PrimitiveSource, Transform,
    MAX_WIDTH, PATH_RAY_CURVE, PRIMITIVE_ALL_CURVE,
};

/// Recomputes bounds and visibility of a packed BVH from the current
/// geometry, keeping its topology. Returns the bounds of the whole tree.
///
/// Panics on top level BVHs, those are refit through their instances.
pub fn refit_nodes<S: PrimitiveSource>(pack: &mut PackedBvh, source: &S) -> Aabb {
    assert!(!pack.top_level, "refit is only supported on object BVHs");

    let mut bounds = Aabb::empty();
    let mut visibility = 0;
    if pack.root_index == -1 {
        if !pack.leaf_nodes.is_empty() {
            refit_node(pack, source, 0, true, &mut bounds, &mut visibility);
        }
    } else if !pack.nodes.is_empty() {
        refit_node(pack, source, 0, false, &mut bounds, &mut visibility);
    }

    log::trace!(
        "refit {:?} bvh with {} root: {}",
        pack.layout,
        if pack.root_index == -1 { "leaf" } else { "inner" },
        bounds
    );
    bounds
}

fn refit_node<S: PrimitiveSource>(
    pack: &mut PackedBvh,
    source: &S,
    idx: usize,
    leaf: bool,
    bbox: &mut Aabb,
    visibility: &mut u32,
) {
    if leaf {
        let record = pack.leaf(idx);
        let mut leaf_bbox = Aabb::empty();
        let mut leaf_visibility = 0;

        for prim in record.prim_range() {
            let object = pack.prims.prim_object[prim] as usize;
            let prim_index = pack.prims.prim_index[prim];
            let prim_type = pack.prims.prim_type[prim];

            if prim_index == -1 {
                leaf_bbox.grow_bb(&source.object_bounds(object));
            } else if prim_type & PRIMITIVE_ALL_CURVE != 0 {
                let segment = unpack_segment(prim_type) as usize;
                source.grow_curve_segment(object, prim_index as usize, segment, &mut leaf_bbox);
                leaf_visibility |= PATH_RAY_CURVE;
            } else {
                source.grow_triangle(object, prim_index as usize, &mut leaf_bbox);
            }

            leaf_visibility |= source.object_visibility(object);
        }

        pack.write_leaf(
            idx,
            &LeafRecord {
                visibility: leaf_visibility,
                ..record
            },
        );

        bbox.grow_bb(&leaf_bbox);
        *visibility |= leaf_visibility;
        return;
    }

    let unaligned = pack.is_unaligned_node(idx);
    let (time_from, time_to) = pack.node_time(idx);
    let lanes = pack.child_lanes(idx);

    let mut child_bounds = [Aabb::empty(); MAX_WIDTH];
    let mut child = [0i32; MAX_WIDTH];
    let mut num_children = 0;
    let mut node_visibility = 0;

    for &c in &lanes[..pack.layout.width()] {
        let mut cbbox = Aabb::empty();
        match ChildRef::decode(c) {
            ChildRef::Absent => continue,
            ChildRef::Leaf(leaf_idx) => {
                refit_node(pack, source, leaf_idx, true, &mut cbbox, &mut node_visibility)
            }
            ChildRef::Inner(offset) => {
                refit_node(pack, source, offset, false, &mut cbbox, &mut node_visibility)
            }
        }

        child_bounds[num_children] = cbbox;
        child[num_children] = c;
        num_children += 1;
    }

    let child_bounds = &child_bounds[..num_children];
    let child = &child[..num_children];
    if unaligned {
        let spaces = [Transform::identity(); MAX_WIDTH];
        pack.pack_unaligned_node(
            idx,
            &spaces[..num_children],
            child_bounds,
            child,
            node_visibility,
            time_from,
            time_to,
        );
    } else {
        pack.pack_aligned_node(idx, child_bounds, child, node_visibility, time_from, time_to);
    }

    for b in child_bounds {
        bbox.grow_bb(b);
    }
    *visibility |= node_visibility;
}
