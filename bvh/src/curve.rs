use glam::*;

use crate::{Aabb, Transform};

/// One Catmull-Rom segment of a hair curve, between `keys[1]` and `keys[2]`.
///
/// `keys[0]` and `keys[3]` are the neighbouring keys clamped to the curve,
/// `radius` is the larger of the two end radii.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CurveSegment {
    pub keys: [Vec3; 4],
    pub radius: f32,
}

impl CurveSegment {
    /// Builds the segment `segment` of a curve whose keys are
    /// `keys[first_key..first_key + num_keys]`.
    pub fn from_keys(
        keys: &[Vec3],
        radius: &[f32],
        first_key: usize,
        num_keys: usize,
        segment: usize,
    ) -> Self {
        debug_assert!(segment + 1 < num_keys);
        let k0 = first_key + segment.saturating_sub(1);
        let k1 = first_key + segment;
        let k2 = k1 + 1;
        let k3 = (k1 + 2).min(first_key + num_keys - 1);

        Self {
            keys: [keys[k0], keys[k1], keys[k2], keys[k3]],
            radius: radius[k1].max(radius[k2]),
        }
    }

    /// Normalized direction from the first to the second end key and the
    /// distance between them.
    pub fn direction(&self) -> (Vec3, f32) {
        let d = self.keys[2] - self.keys[1];
        let length = d.length();
        if length > 0.0 {
            (d / length, length)
        } else {
            (Vec3::ZERO, 0.0)
        }
    }

    pub fn bounds_grow(&self, bounds: &mut Aabb) {
        Self::grow_keys(&self.keys, self.radius, bounds);
    }

    /// Same as [`CurveSegment::bounds_grow`] with the keys moved into `space`
    /// first.
    pub fn bounds_grow_aligned(&self, space: &Transform, bounds: &mut Aabb) {
        let mut keys = self.keys;
        for k in keys.iter_mut() {
            *k = space.transform_point(*k);
        }
        Self::grow_keys(&keys, self.radius, bounds);
    }

    fn grow_keys(keys: &[Vec3; 4], radius: f32, bounds: &mut Aabb) {
        let mut lower = Vec3::ZERO;
        let mut upper = Vec3::ZERO;
        for dim in 0..3 {
            let (lo, hi) = curve_extrema(
                [keys[0][dim], keys[1][dim], keys[2][dim], keys[3][dim]],
            );
            lower[dim] = lo;
            upper[dim] = hi;
        }

        bounds.grow_radius(lower, radius);
        bounds.grow_radius(upper, radius);
    }
}

/// Range of a 1D Catmull-Rom segment over `t` in `[0, 1]`.
fn curve_extrema(p: [f32; 4]) -> (f32, f32) {
    let c0 = p[1];
    let c1 = 0.5 * (-p[0] + p[2]);
    let c2 = 0.5 * (2.0 * p[0] - 5.0 * p[1] + 4.0 * p[2] - p[3]);
    let c3 = 0.5 * (-p[0] + 3.0 * p[1] - 3.0 * p[2] + p[3]);
    let eval = |t: f32| ((c3 * t + c2) * t + c1) * t + c0;

    let mut lower = p[1].min(p[2]);
    let mut upper = p[1].max(p[2]);

    // Roots of the derivative 3*c3*t^2 + 2*c2*t + c1.
    let mut roots = [None, None];
    if c3 != 0.0 {
        let disc = c2 * c2 - 3.0 * c3 * c1;
        if disc >= 0.0 {
            let disc = disc.sqrt();
            roots[0] = Some((-c2 - disc) / (3.0 * c3));
            roots[1] = Some((-c2 + disc) / (3.0 * c3));
        }
    } else if c2 != 0.0 {
        roots[0] = Some(-c1 / (2.0 * c2));
    }

    for t in roots.iter().flatten() {
        if *t >= 0.0 && *t <= 1.0 {
            let v = eval(*t);
            lower = lower.min(v);
            upper = upper.max(v);
        }
    }

    (lower, upper)
}
