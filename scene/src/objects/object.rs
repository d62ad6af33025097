use rfw_bvh::{
    motion_interpolate, Aabb, Bounds, DecomposedTransform, Transform, PATH_RAY_ALL_VISIBILITY,
};
use serde::{Deserialize, Serialize};

use crate::objects::Mesh;

/// Number of intervals sampled when bounding an object moving over the
/// shutter.
pub const MOTION_BOUNDS_SAMPLES: usize = 128;

/// A placement of a mesh in the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub mesh: usize,
    pub tfm: Transform,
    /// Transforms of the motion steps, spread evenly over the shutter.
    pub motion: Vec<Transform>,
    pub use_motion: bool,
    pub visibility: u32,
    pub bounds: Aabb,
}

impl Object {
    pub fn new(mesh: usize, tfm: Transform) -> Object {
        Object {
            mesh,
            tfm,
            motion: Vec::new(),
            use_motion: false,
            visibility: PATH_RAY_ALL_VISIBILITY,
            bounds: Aabb::empty(),
        }
    }

    pub fn with_visibility(mut self, visibility: u32) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_motion(mut self, motion: Vec<Transform>) -> Self {
        self.use_motion = motion.len() > 1;
        self.motion = motion;
        self
    }

    /// World space bounds of `mesh` under this object, sampled along the
    /// motion path when `motion_blur` is on.
    pub fn compute_bounds(&mut self, mesh: &Mesh, motion_blur: bool) {
        let mesh_bounds = mesh.bounds;

        if motion_blur && self.use_motion {
            let steps: Vec<DecomposedTransform> =
                self.motion.iter().map(|t| t.decompose()).collect();

            let mut bounds = Aabb::empty();
            for i in 0..=MOTION_BOUNDS_SAMPLES {
                let t = i as f32 / MOTION_BOUNDS_SAMPLES as f32;
                let tfm = motion_interpolate(&steps, t);
                bounds.grow_bb(&mesh_bounds.transformed(&tfm));
            }
            self.bounds = bounds;
        } else {
            self.bounds = mesh_bounds.transformed(&self.tfm);
        }
    }

    /// Visibility bits the traversal kernel tests against.
    pub fn visibility_for_tracing(&self) -> u32 {
        self.visibility & PATH_RAY_ALL_VISIBILITY
    }
}

impl Bounds for Object {
    fn bounds(&self) -> Aabb {
        self.bounds
    }
}
