use rayon::prelude::*;
use rfw_bvh::{
    pack_segment, Aabb, Bvh, CurveSegment, PackInstances, PackedBvh, PrimitiveArrays,
    PrimitiveRef, PrimitiveSource, PRIMITIVE_CURVE, PRIMITIVE_MOTION_CURVE,
    PRIMITIVE_MOTION_TRIANGLE, PRIMITIVE_TRIANGLE,
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use crate::objects::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub objects: Vec<Object>,
    pub motion_blur: bool,
}

impl Scene {
    const FF_EXTENSION: &'static str = ".scenev1";

    pub fn new() -> Scene {
        Scene::default()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_object(&mut self, mut object: Object) -> usize {
        assert!(object.mesh < self.meshes.len(), "object references unknown mesh");
        object.compute_bounds(&self.meshes[object.mesh], self.motion_blur);
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn mesh_of(&self, object: usize) -> &Mesh {
        &self.meshes[self.objects[object].mesh]
    }

    /// Recomputes mesh and object bounds after geometry or transforms changed.
    pub fn update_bounds(&mut self) {
        self.meshes.par_iter_mut().for_each(|m| m.compute_bounds());

        let meshes = &self.meshes;
        let motion_blur = self.motion_blur;
        self.objects
            .par_iter_mut()
            .for_each(|o| o.compute_bounds(&meshes[o.mesh], motion_blur));
    }

    /// References to every primitive of an object's mesh, bounded in mesh
    /// space, with the matching primitive arrays.
    pub fn primitive_refs(&self, object: usize) -> (Vec<PrimitiveRef>, PrimitiveArrays) {
        let mesh = self.mesh_of(object);
        let motion = mesh.use_motion_blur && mesh.motion_steps > 1;
        let mut refs = Vec::with_capacity(mesh.primitive_count());
        let mut prims = PrimitiveArrays::new();

        let triangle_type = if motion {
            PRIMITIVE_MOTION_TRIANGLE
        } else {
            PRIMITIVE_TRIANGLE
        };
        for i in 0..mesh.triangles.len() {
            let mut bounds = Aabb::empty();
            mesh.triangle_bounds_grow(i, &mut bounds);
            refs.push(PrimitiveRef {
                bounds,
                prim_index: i as i32,
                prim_object: object as i32,
                prim_type: triangle_type,
            });
            prims.push(i as i32, object as i32, triangle_type);
        }

        let curve_type = if motion {
            PRIMITIVE_MOTION_CURVE
        } else {
            PRIMITIVE_CURVE
        };
        for (c, curve) in mesh.curves.iter().enumerate() {
            for s in 0..curve.num_segments() {
                let mut bounds = Aabb::empty();
                mesh.curve_segment_bounds_grow(c, s, &mut bounds);
                let prim_type = pack_segment(curve_type, s as u32);
                refs.push(PrimitiveRef {
                    bounds,
                    prim_index: c as i32,
                    prim_object: object as i32,
                    prim_type,
                });
                prims.push(c as i32, object as i32, prim_type);
            }
        }

        (refs, prims)
    }

    /// One instance reference per object for a top level BVH.
    pub fn instance_refs(&self) -> (Vec<PrimitiveRef>, PrimitiveArrays) {
        let mut refs = Vec::with_capacity(self.objects.len());
        let mut prims = PrimitiveArrays::new();
        for (i, object) in self.objects.iter().enumerate() {
            refs.push(PrimitiveRef {
                bounds: object.bounds,
                prim_index: -1,
                prim_object: i as i32,
                prim_type: PRIMITIVE_TRIANGLE,
            });
            prims.push(-1, i as i32, PRIMITIVE_TRIANGLE);
        }
        (refs, prims)
    }

    /// Refits independent object BVHs in parallel.
    pub fn refit_all(&self, bvhs: &mut [Bvh]) {
        let instant = std::time::Instant::now();
        bvhs.par_iter_mut().for_each(|bvh| bvh.refit(self));
        log::debug!(
            "refit {} bvhs in {} ms",
            bvhs.len(),
            instant.elapsed().as_millis()
        );
    }

    pub fn serialize<S: AsRef<Path>>(&self, path: S) -> Result<(), Box<dyn Error>> {
        let encoded: Vec<u8> = bincode::serialize(self)?;

        let mut output = OsString::from(path.as_ref().as_os_str());
        output.push(Self::FF_EXTENSION);

        let mut file = File::create(output)?;
        file.write_all(encoded.as_ref())?;
        Ok(())
    }

    pub fn deserialize<S: AsRef<Path>>(path: S) -> Result<Self, Box<dyn Error>> {
        let mut input = OsString::from(path.as_ref().as_os_str());
        input.push(Self::FF_EXTENSION);
        let file = File::open(input)?;
        let reader = BufReader::new(file);
        let object: Self = bincode::deserialize_from(reader)?;
        Ok(object)
    }
}

impl PrimitiveSource for Scene {
    fn object_bounds(&self, object: usize) -> Aabb {
        self.objects[object].bounds
    }

    fn object_visibility(&self, object: usize) -> u32 {
        self.objects[object].visibility_for_tracing()
    }

    fn grow_triangle(&self, object: usize, triangle: usize, bounds: &mut Aabb) {
        self.mesh_of(object).triangle_bounds_grow(triangle, bounds);
    }

    fn grow_curve_segment(&self, object: usize, curve: usize, segment: usize, bounds: &mut Aabb) {
        self.mesh_of(object)
            .curve_segment_bounds_grow(curve, segment, bounds);
    }

    fn curve_segment(&self, object: usize, curve: usize, segment: usize) -> CurveSegment {
        let mesh = self.mesh_of(object);
        mesh.curve_segment(curve, segment, &mesh.curve_keys)
    }
}

/// Places the packed object BVHs behind the nodes of a top level BVH.
pub struct ObjectInstances<'a> {
    bvhs: &'a [Bvh],
    /// Root node and first leaf of every object BVH inside the top level
    /// arrays.
    pub offsets: Vec<(usize, usize)>,
}

impl<'a> ObjectInstances<'a> {
    pub fn new(bvhs: &'a [Bvh]) -> Self {
        Self {
            bvhs,
            offsets: Vec::with_capacity(bvhs.len()),
        }
    }
}

impl<'a> PackInstances for ObjectInstances<'a> {
    fn pack_instances(&mut self, pack: &mut PackedBvh, node_size: usize, leaf_size: usize) {
        let total_nodes: usize = self.bvhs.iter().map(|b| b.pack.nodes.len()).sum();
        let total_leaves: usize = self.bvhs.iter().map(|b| b.pack.leaf_nodes.len()).sum();

        pack.nodes = Vec::with_capacity(node_size + total_nodes);
        pack.nodes.resize(node_size, [0.0; 4]);
        pack.leaf_nodes = Vec::with_capacity(leaf_size + total_leaves);
        pack.leaf_nodes.resize(leaf_size, [0.0; 4]);

        self.offsets.clear();
        for bvh in self.bvhs {
            self.offsets.push(pack.append(&bvh.pack));
        }
    }
}
