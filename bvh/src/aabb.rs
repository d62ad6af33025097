use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::Transform;

/// Axis aligned bounding box.
///
/// The empty box has `min = +inf` and `max = -inf` so that growing it by
/// anything yields exactly the other operand.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

pub trait Bounds {
    fn bounds(&self) -> Aabb;
}

impl Display for Aabb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(min: ({}, {}, {}),  max: ({}, {}, {}))",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        )
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Aabb {
        Aabb { min, max }
    }

    pub fn empty() -> Aabb {
        Aabb {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Aabb {
        let mut aabb = Aabb::empty();
        for p in points {
            aabb.grow(p);
        }
        aabb
    }

    pub fn grow(&mut self, pos: Vec3) {
        self.min = self.min.min(pos);
        self.max = self.max.max(pos);
    }

    /// Grows by a sphere of radius `radius` around `pos`.
    pub fn grow_radius(&mut self, pos: Vec3, radius: f32) {
        let r = Vec3::splat(radius);
        self.min = self.min.min(pos - r);
        self.max = self.max.max(pos + r);
    }

    pub fn grow_bb(&mut self, aabb: &Aabb) {
        self.min = self.min.min(aabb.min);
        self.max = self.max.max(aabb.max);
    }

    pub fn union_of(&self, bb: &Self) -> Self {
        Self {
            min: self.min.min(bb.min),
            max: self.max.max(bb.max),
        }
    }

    pub fn intersection(&self, bb: &Self) -> Self {
        Self {
            min: self.min.max(bb.min),
            max: self.max.min(bb.max),
        }
    }

    pub fn valid(&self) -> bool {
        self.min.cmple(self.max).all() && self.min.is_finite() && self.max.is_finite()
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Twice the center, cheaper and enough for centroid binning.
    pub fn center2(&self) -> Vec3 {
        self.min + self.max
    }

    pub fn area(&self) -> f32 {
        let e = self.size();
        let value: f32 = e.x * e.y + e.x * e.z + e.y * e.z;

        0.0_f32.max(value)
    }

    pub fn safe_area(&self) -> f32 {
        if self.valid() {
            self.area()
        } else {
            0.0
        }
    }

    pub fn longest_axis(&self) -> usize {
        let e = self.size();
        let mut a: usize = 0;
        if e.y > e.x {
            a = 1;
        }
        if e.z > e[a] {
            a = 2
        }
        a
    }

    pub fn all_corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Bounds of this box after moving its corners through `transform`.
    pub fn transformed(&self, transform: &Transform) -> Aabb {
        let mut transformed = Aabb::empty();
        for corner in self.all_corners().iter() {
            transformed.grow(transform.transform_point(*corner));
        }

        transformed
    }

    pub fn points(&self) -> (Vec3, Vec3) {
        (self.min, self.max)
    }
}

impl From<(Vec3, Vec3)> for Aabb {
    fn from(v: (Vec3, Vec3)) -> Self {
        Aabb { min: v.0, max: v.1 }
    }
}

impl From<Aabb> for (Vec3, Vec3) {
    fn from(aabb: Aabb) -> Self {
        aabb.points()
    }
}
