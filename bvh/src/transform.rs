use glam::*;
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Affine transform stored as three rows, the last row is implicitly
/// `[0, 0, 0, 1]`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: Vec4,
    pub y: Vec4,
    pub z: Vec4,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            x: Vec4::X,
            y: Vec4::Y,
            z: Vec4::Z,
        }
    }

    pub fn from_rows(x: Vec4, y: Vec4, z: Vec4) -> Self {
        Self { x, y, z }
    }

    pub fn translate(t: Vec3) -> Self {
        Self {
            x: Vec4::new(1.0, 0.0, 0.0, t.x),
            y: Vec4::new(0.0, 1.0, 0.0, t.y),
            z: Vec4::new(0.0, 0.0, 1.0, t.z),
        }
    }

    pub fn scale(s: Vec3) -> Self {
        Self {
            x: Vec4::new(s.x, 0.0, 0.0, 0.0),
            y: Vec4::new(0.0, s.y, 0.0, 0.0),
            z: Vec4::new(0.0, 0.0, s.z, 0.0),
        }
    }

    /// Orthonormal frame whose third row is `axis`.
    pub fn frame(axis: Vec3) -> Self {
        let dx0 = Vec3::X.cross(axis);
        let dx1 = Vec3::Y.cross(axis);
        let dx = if dx0.dot(dx0) > dx1.dot(dx1) { dx0 } else { dx1 }.normalize();
        let dy = axis.cross(dx).normalize();

        Self {
            x: dx.extend(0.0),
            y: dy.extend(0.0),
            z: axis.extend(0.0),
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(self.x, self.y, self.z, Vec4::W).transpose()
    }

    pub fn from_mat4(m: Mat4) -> Self {
        let rows = m.transpose();
        Self {
            x: rows.x_axis,
            y: rows.y_axis,
            z: rows.z_axis,
        }
    }

    /// Upper 3x3 part.
    pub fn linear(&self) -> Mat3 {
        Mat3::from_cols(self.x.truncate(), self.y.truncate(), self.z.truncate()).transpose()
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.x.w, self.y.w, self.z.w)
    }

    pub fn from_linear(linear: Mat3, translation: Vec3) -> Self {
        let rows = linear.transpose();
        Self {
            x: rows.x_axis.extend(translation.x),
            y: rows.y_axis.extend(translation.y),
            z: rows.z_axis.extend(translation.z),
        }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let p = p.extend(1.0);
        Vec3::new(self.x.dot(p), self.y.dot(p), self.z.dot(p))
    }

    pub fn transform_direction(&self, d: Vec3) -> Vec3 {
        Vec3::new(
            self.x.truncate().dot(d),
            self.y.truncate().dot(d),
            self.z.truncate().dot(d),
        )
    }

    fn rows4(&self) -> [[f32; 4]; 4] {
        [
            self.x.to_array(),
            self.y.to_array(),
            self.z.to_array(),
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Inverse of the transform.
    ///
    /// Singular matrices get `1e-8` added to their diagonal and are retried,
    /// if that still fails the identity is returned.
    pub fn inverse(&self) -> Self {
        let mut m = self.rows4();
        if let Some(r) = gauss_jordan_inverse(m) {
            return Self::from_rows4(&r);
        }

        m[0][0] += 1e-8;
        m[1][1] += 1e-8;
        m[2][2] += 1e-8;
        match gauss_jordan_inverse(m) {
            Some(r) => {
                log::warn!("inverting degenerate transform, result was nudged");
                Self::from_rows4(&r)
            }
            None => {
                log::warn!("transform is singular, using identity as its inverse");
                Self::identity()
            }
        }
    }

    fn from_rows4(r: &[[f32; 4]; 4]) -> Self {
        Self {
            x: Vec4::from(r[0]),
            y: Vec4::from(r[1]),
            z: Vec4::from(r[2]),
        }
    }

    pub fn is_negative_scale(&self) -> bool {
        self.linear().determinant() < 0.0
    }

    /// Splits into translation, rotation and a remaining scale/shear matrix
    /// using iterative polar decomposition.
    pub fn decompose(&self) -> DecomposedTransform {
        let translation = self.translation();
        let m = self.linear();

        let mut r = m;
        let mut iteration = 0;
        loop {
            let rit = r.inverse().transpose();
            let next = (r + rit) * 0.5;

            let mut norm = 0.0_f32;
            for i in 0..3 {
                let row_delta = (r.row(i) - next.row(i)).abs();
                norm = norm.max(row_delta.x + row_delta.y + row_delta.z);
            }

            r = next;
            iteration += 1;
            if iteration >= 100 || norm <= 1e-6 {
                break;
            }
        }

        if self.is_negative_scale() {
            r = r * -1.0;
        }

        let rotation = Quat::from_mat3(&r).normalize();
        let scale = Mat3::from_quat(rotation).transpose() * m;

        DecomposedTransform {
            translation,
            rotation,
            scale,
        }
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform::from_mat4(self.to_mat4() * rhs.to_mat4())
    }
}

fn gauss_jordan_inverse(mut m: [[f32; 4]; 4]) -> Option<[[f32; 4]; 4]> {
    let mut r = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    // Forward elimination with partial pivoting.
    for i in 0..4 {
        let mut pivot = i;
        let mut pivot_size = m[i][i].abs();
        for j in (i + 1)..4 {
            let size = m[j][i].abs();
            if size > pivot_size {
                pivot = j;
                pivot_size = size;
            }
        }

        if pivot_size == 0.0 {
            return None;
        }

        if pivot != i {
            m.swap(i, pivot);
            r.swap(i, pivot);
        }

        for j in (i + 1)..4 {
            let f = m[j][i] / m[i][i];
            for k in 0..4 {
                m[j][k] -= f * m[i][k];
                r[j][k] -= f * r[i][k];
            }
        }
    }

    // Backward substitution.
    for i in (0..4).rev() {
        let f = m[i][i];
        if f == 0.0 {
            return None;
        }

        for j in 0..4 {
            m[i][j] /= f;
            r[i][j] /= f;
        }

        for j in 0..i {
            let f = m[j][i];
            for k in 0..4 {
                m[j][k] -= f * m[i][k];
                r[j][k] -= f * r[i][k];
            }
        }
    }

    Some(r)
}

/// Transform split into parts that interpolate well over time.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposedTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Mat3,
}

impl DecomposedTransform {
    pub fn compose(&self) -> Transform {
        Transform::from_linear(Mat3::from_quat(self.rotation) * self.scale, self.translation)
    }

    pub fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            translation: a.translation.lerp(b.translation, t),
            rotation: a.rotation.slerp(b.rotation, t),
            scale: a.scale * (1.0 - t) + b.scale * t,
        }
    }
}

/// Transform at `time` in `[0, 1]` for motion steps spread evenly over that
/// interval.
pub fn motion_interpolate(steps: &[DecomposedTransform], time: f32) -> Transform {
    match steps.len() {
        0 => Transform::identity(),
        1 => steps[0].compose(),
        n => {
            let max_step = (n - 1) as f32;
            let t = time.max(0.0).min(1.0) * max_step;
            let step = (t as usize).min(n - 2);
            let frac = t - step as f32;

            DecomposedTransform::lerp(&steps[step], &steps[step + 1], frac).compose()
        }
    }
}
