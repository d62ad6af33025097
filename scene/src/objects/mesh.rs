use glam::*;
use rfw_bvh::{Aabb, Bounds, CurveSegment};
use serde::{Deserialize, Serialize};

/// A curve made of `num_keys` keys starting at `first_key`, it has
/// `num_keys - 1` segments.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub first_key: u32,
    pub num_keys: u32,
}

impl Curve {
    pub fn num_segments(&self) -> usize {
        self.num_keys.saturating_sub(1) as usize
    }
}

/// Triangles and curves sharing one object space.
///
/// With motion blur the positions of the center step live in `verts` and
/// `curve_keys`, the `motion_steps - 1` other steps follow each other in
/// `vert_steps` and `key_steps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    pub verts: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub curve_keys: Vec<Vec3>,
    pub curve_radius: Vec<f32>,
    pub curves: Vec<Curve>,
    pub motion_steps: usize,
    pub use_motion_blur: bool,
    pub vert_steps: Vec<Vec3>,
    pub key_steps: Vec<Vec3>,
    pub bounds: Aabb,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::empty()
    }
}

impl Mesh {
    pub fn empty() -> Mesh {
        Mesh {
            verts: Vec::new(),
            triangles: Vec::new(),
            curve_keys: Vec::new(),
            curve_radius: Vec::new(),
            curves: Vec::new(),
            motion_steps: 1,
            use_motion_blur: false,
            vert_steps: Vec::new(),
            key_steps: Vec::new(),
            bounds: Aabb::empty(),
        }
    }

    pub fn new(verts: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Mesh {
        let num_verts = verts.len() as u32;
        assert!(triangles.iter().flatten().all(|&v| v < num_verts));

        let mut mesh = Mesh {
            verts,
            triangles,
            ..Mesh::empty()
        };
        mesh.compute_bounds();
        mesh
    }

    /// Appends a curve through `keys`, one radius per key.
    pub fn add_curve(&mut self, keys: &[Vec3], radius: &[f32]) -> usize {
        assert_eq!(keys.len(), radius.len());
        assert!(keys.len() >= 2, "a curve needs at least one segment");

        self.curves.push(Curve {
            first_key: self.curve_keys.len() as u32,
            num_keys: keys.len() as u32,
        });
        self.curve_keys.extend_from_slice(keys);
        self.curve_radius.extend_from_slice(radius);
        self.compute_bounds();
        self.curves.len() - 1
    }

    /// Enables motion blur with the positions of the non center steps.
    pub fn set_motion(&mut self, motion_steps: usize, vert_steps: Vec<Vec3>, key_steps: Vec<Vec3>) {
        assert!(motion_steps > 1);
        assert_eq!(vert_steps.len(), self.verts.len() * (motion_steps - 1));
        assert_eq!(key_steps.len(), self.curve_keys.len() * (motion_steps - 1));

        self.motion_steps = motion_steps;
        self.use_motion_blur = true;
        self.vert_steps = vert_steps;
        self.key_steps = key_steps;
        self.compute_bounds();
    }

    /// Number of motion steps stored, 1 without motion blur.
    pub fn num_steps(&self) -> usize {
        if self.use_motion_blur {
            self.motion_steps
        } else {
            1
        }
    }

    fn step_verts(&self, step: usize) -> &[Vec3] {
        if step == 0 {
            &self.verts
        } else {
            let n = self.verts.len();
            &self.vert_steps[(step - 1) * n..step * n]
        }
    }

    fn step_keys(&self, step: usize) -> &[Vec3] {
        if step == 0 {
            &self.curve_keys
        } else {
            let n = self.curve_keys.len();
            &self.key_steps[(step - 1) * n..step * n]
        }
    }

    pub fn compute_bounds(&mut self) {
        let mut bounds = Aabb::empty();
        for step in 0..self.num_steps() {
            for v in self.step_verts(step) {
                bounds.grow(*v);
            }
            for (k, r) in self.step_keys(step).iter().zip(self.curve_radius.iter()) {
                bounds.grow_radius(*k, *r);
            }
        }

        self.bounds = bounds;
    }

    /// Grows `bounds` by a triangle at every motion step.
    pub fn triangle_bounds_grow(&self, triangle: usize, bounds: &mut Aabb) {
        let [v0, v1, v2] = self.triangles[triangle];
        for step in 0..self.num_steps() {
            let verts = self.step_verts(step);
            bounds.grow(verts[v0 as usize]);
            bounds.grow(verts[v1 as usize]);
            bounds.grow(verts[v2 as usize]);
        }
    }

    /// Segment `segment` of `curve` with its control points taken from `keys`.
    pub fn curve_segment(&self, curve: usize, segment: usize, keys: &[Vec3]) -> CurveSegment {
        let c = self.curves[curve];
        CurveSegment::from_keys(
            keys,
            &self.curve_radius,
            c.first_key as usize,
            c.num_keys as usize,
            segment,
        )
    }

    /// Grows `bounds` by a curve segment at every motion step.
    pub fn curve_segment_bounds_grow(&self, curve: usize, segment: usize, bounds: &mut Aabb) {
        for step in 0..self.num_steps() {
            self.curve_segment(curve, segment, self.step_keys(step))
                .bounds_grow(bounds);
        }
    }

    pub fn num_curve_segments(&self) -> usize {
        self.curves.iter().map(|c| c.num_segments()).sum()
    }

    pub fn primitive_count(&self) -> usize {
        self.triangles.len() + self.num_curve_segments()
    }
}

impl Bounds for Mesh {
    fn bounds(&self) -> Aabb {
        self.bounds
    }
}
