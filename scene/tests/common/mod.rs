#![allow(dead_code)]

use glam::Vec3;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rfw_bvh::{
    Aabb, ChildRef, BvhTree, NodeId, PackedBvh, PrimitiveArrays, PrimitiveRef, PrimitiveSource,
    Transform, UnalignedSpace, PATH_RAY_CURVE,
};
use rfw_scene::{Mesh, Object, Scene};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Median split over reference centroids, enough to give the packer real
/// trees to work on.
pub struct MedianSplit<'a, S: PrimitiveSource> {
    source: &'a S,
    refs: &'a [PrimitiveRef],
    max_leaf_size: usize,
    unaligned: bool,
    tree: BvhTree,
}

impl<'a, S: PrimitiveSource> MedianSplit<'a, S> {
    pub fn new(source: &'a S, refs: &'a [PrimitiveRef], max_leaf_size: usize) -> Self {
        Self {
            source,
            refs,
            max_leaf_size: max_leaf_size.max(1),
            unaligned: false,
            tree: BvhTree::new(),
        }
    }

    /// Orients nodes over curves only along their first segment.
    pub fn with_unaligned_nodes(mut self) -> Self {
        self.unaligned = true;
        self
    }

    /// The tree plus the primitive arrays reordered to match its leaves.
    pub fn build(mut self, prims: &PrimitiveArrays) -> (BvhTree, PrimitiveArrays) {
        assert_eq!(prims.len(), self.refs.len());
        let mut order: Vec<usize> = (0..self.refs.len()).collect();
        let root = self.split(&mut order, 0);
        self.tree.set_root(root);
        (self.tree, prims.reordered(&order))
    }

    fn split(&mut self, order: &mut [usize], offset: usize) -> NodeId {
        let mut bounds = Aabb::empty();
        let mut centroids = Aabb::empty();
        for &i in order.iter() {
            bounds.grow_bb(&self.refs[i].bounds);
            centroids.grow(self.refs[i].bounds.center());
        }

        let id = if order.len() <= self.max_leaf_size {
            let mut visibility = 0;
            for &i in order.iter() {
                let r = &self.refs[i];
                visibility |= self.source.object_visibility(r.prim_object as usize);
                if r.is_curve() {
                    visibility |= PATH_RAY_CURVE;
                }
            }
            let lo = offset as i32;
            self.tree
                .add_leaf(bounds, visibility, lo, lo + order.len() as i32)
        } else {
            let axis = centroids.longest_axis();
            let refs = self.refs;
            order.sort_by(|&a, &b| {
                let ca = refs[a].bounds.center()[axis];
                let cb = refs[b].bounds.center()[axis];
                ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
            });

            let mid = order.len() / 2;
            let (left, right) = order.split_at_mut(mid);
            let l = self.split(left, offset);
            let r = self.split(right, offset + mid);
            self.tree.add_inner(bounds, vec![l, r])
        };

        if self.unaligned && order.iter().all(|&i| self.refs[i].is_curve()) {
            let selected: Vec<PrimitiveRef> = order.iter().map(|&i| self.refs[i]).collect();
            let space = UnalignedSpace::new(self.source);
            let aligned = space.compute_aligned_space(&selected);
            let aligned_bounds = space.compute_aligned_boundbox(&selected, &aligned, None);
            self.tree.set_aligned_space(id, aligned, aligned_bounds);
        }

        id
    }
}

/// Builds the tree and prims of one object of `scene`.
pub fn object_tree(
    scene: &Scene,
    object: usize,
    max_leaf_size: usize,
    unaligned: bool,
) -> (BvhTree, PrimitiveArrays) {
    let (refs, prims) = scene.primitive_refs(object);
    let builder = MedianSplit::new(scene, &refs, max_leaf_size);
    let builder = if unaligned {
        builder.with_unaligned_nodes()
    } else {
        builder
    };
    builder.build(&prims)
}

/// A grid of `n * n` quads in the xy plane, slightly jittered in z.
pub fn grid_mesh(n: usize, seed: u64) -> Mesh {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut verts = Vec::with_capacity((n + 1) * (n + 1));
    for y in 0..=n {
        for x in 0..=n {
            verts.push(Vec3::new(x as f32, y as f32, rng.gen_range(-0.25, 0.25)));
        }
    }

    let row = (n + 1) as u32;
    let mut triangles = Vec::with_capacity(n * n * 2);
    for y in 0..n as u32 {
        for x in 0..n as u32 {
            let v = y * row + x;
            triangles.push([v, v + 1, v + row]);
            triangles.push([v + 1, v + row + 1, v + row]);
        }
    }

    Mesh::new(verts, triangles)
}

/// Straight strands growing along `dir` from a row of roots.
pub fn hair_mesh(strands: usize, keys: usize, dir: Vec3) -> Mesh {
    let mut mesh = Mesh::empty();
    for s in 0..strands {
        let root = Vec3::new(s as f32 * 0.5, 0.0, 0.0);
        let strand: Vec<Vec3> = (0..keys).map(|k| root + dir * k as f32).collect();
        let radius = vec![0.05; keys];
        mesh.add_curve(&strand, &radius);
    }
    mesh
}

pub fn single_object_scene(mesh: Mesh) -> Scene {
    let mut scene = Scene::new();
    let mesh = scene.add_mesh(mesh);
    scene.add_object(Object::new(mesh, Transform::identity()));
    scene
}

pub fn bits(data: &[[f32; 4]]) -> Vec<[u32; 4]> {
    data.iter()
        .map(|f| [f[0].to_bits(), f[1].to_bits(), f[2].to_bits(), f[3].to_bits()])
        .collect()
}

/// World box of one child lane, unaligned lanes are decoded conservatively.
pub fn lane_box(pack: &PackedBvh, idx: usize, lane: usize) -> Aabb {
    if pack.is_unaligned_node(idx) {
        let unit = Aabb::new(Vec3::ZERO, Vec3::ONE);
        unit.transformed(&pack.child_transform(idx, lane).inverse())
    } else {
        pack.child_bounds(idx, lane)
    }
}

fn contains(outer: &Aabb, inner: &Aabb, eps: f32) -> bool {
    (0..3).all(|d| outer.min[d] - eps <= inner.min[d] && inner.max[d] <= outer.max[d] + eps)
}

/// Asserts that every primitive lies inside the lane boxes of all nodes
/// above it. Returns the number of primitives visited.
pub fn assert_contained<S: PrimitiveSource>(pack: &PackedBvh, source: &S, eps: f32) -> usize {
    let mut visited = 0;
    let mut boxes = Vec::new();
    if pack.root_index == -1 {
        visit(pack, source, ChildRef::Leaf(0), &mut boxes, eps, &mut visited);
    } else {
        visit(pack, source, ChildRef::Inner(0), &mut boxes, eps, &mut visited);
    }
    visited
}

fn visit<S: PrimitiveSource>(
    pack: &PackedBvh,
    source: &S,
    child: ChildRef,
    boxes: &mut Vec<Aabb>,
    eps: f32,
    visited: &mut usize,
) {
    match child {
        ChildRef::Absent => {}
        ChildRef::Leaf(idx) => {
            for prim in pack.leaf(idx).prim_range() {
                let bounds = prim_bounds(pack, source, prim);
                for b in boxes.iter() {
                    assert!(contains(b, &bounds, eps), "{} escapes {}", bounds, b);
                }
                *visited += 1;
            }
        }
        ChildRef::Inner(idx) => {
            for (lane, c) in pack.node_children(idx).into_iter().enumerate() {
                if c == ChildRef::Absent {
                    continue;
                }
                boxes.push(lane_box(pack, idx, lane));
                visit(pack, source, c, boxes, eps, visited);
                boxes.pop();
            }
        }
    }
}

fn prim_bounds<S: PrimitiveSource>(pack: &PackedBvh, source: &S, prim: usize) -> Aabb {
    let object = pack.prims.prim_object[prim] as usize;
    let index = pack.prims.prim_index[prim];
    let prim_type = pack.prims.prim_type[prim];

    let mut bounds = Aabb::empty();
    if index == -1 {
        bounds = source.object_bounds(object);
    } else if prim_type & rfw_bvh::PRIMITIVE_ALL_CURVE != 0 {
        let segment = rfw_bvh::unpack_segment(prim_type) as usize;
        source.grow_curve_segment(object, index as usize, segment, &mut bounds);
    } else {
        source.grow_triangle(object, index as usize, &mut bounds);
    }
    bounds
}
