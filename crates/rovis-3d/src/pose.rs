use serde::{Deserialize, Serialize};

/// Errors raised when building rigid transforms.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PoseError {
    /// The rotation axis has no direction.
    #[error("Cannot compute a rotation matrix from a zero vector")]
    ZeroAxis,
}

/// A rigid 3D transform `p' = R p + t`.
///
/// Used both as a sensor offset on a vehicle and as the pose hypothesis of
/// a point cloud registration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose3d {
    /// Row-major rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Default for Pose3d {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose3d {
    /// Create a transform from a rotation matrix and a translation.
    pub fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The transform that leaves every point unchanged.
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// Create a transform from a rotation around `axis` and a translation.
    ///
    /// The axis does not need to be normalized.
    pub fn from_axis_angle(
        axis: &[f64; 3],
        angle: f64,
        translation: [f64; 3],
    ) -> Result<Self, PoseError> {
        Ok(Self {
            rotation: axis_angle_to_rotation_matrix(axis, angle)?,
            translation,
        })
    }

    /// Create a transform from a position and the yaw, pitch and roll angles.
    ///
    /// The rotation is `Rz(yaw) * Ry(pitch) * Rx(roll)`.
    pub fn from_ypr(x: f64, y: f64, z: f64, yaw: f64, pitch: f64, roll: f64) -> Self {
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        let (sr, cr) = roll.sin_cos();

        let rotation = [
            [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
            [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
            [-sp, cp * sr, cp * cr],
        ];

        Self {
            rotation,
            translation: [x, y, z],
        }
    }

    /// Apply the transform to a point.
    #[inline]
    pub fn transform_point(&self, p: &[f64; 3]) -> [f64; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0],
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1],
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2],
        ]
    }

    /// Rotate a vector without translating it.
    #[inline]
    pub fn rotate_vector(&self, v: &[f64; 3]) -> [f64; 3] {
        let r = &self.rotation;
        [
            r[0][0] * v[0] + r[0][1] * v[1] + r[0][2] * v[2],
            r[1][0] * v[0] + r[1][1] * v[1] + r[1][2] * v[2],
            r[2][0] * v[0] + r[2][1] * v[1] + r[2][2] * v[2],
        ]
    }

    /// Compose two transforms, applying `other` first and then `self`.
    pub fn compose(&self, other: &Pose3d) -> Pose3d {
        let mut rotation = [[0.0; 3]; 3];
        for (i, row) in rotation.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val = (0..3)
                    .map(|k| self.rotation[i][k] * other.rotation[k][j])
                    .sum();
            }
        }
        Pose3d {
            rotation,
            translation: self.transform_point(&other.translation),
        }
    }

    /// The inverse transform `R^T (p - t)`.
    pub fn inverse(&self) -> Pose3d {
        let r = &self.rotation;
        let rotation = [
            [r[0][0], r[1][0], r[2][0]],
            [r[0][1], r[1][1], r[2][1]],
            [r[0][2], r[1][2], r[2][2]],
        ];
        let t = &self.translation;
        let translation = [
            -(rotation[0][0] * t[0] + rotation[0][1] * t[1] + rotation[0][2] * t[2]),
            -(rotation[1][0] * t[0] + rotation[1][1] * t[1] + rotation[1][2] * t[2]),
            -(rotation[2][0] * t[0] + rotation[2][1] * t[1] + rotation[2][2] * t[2]),
        ];
        Pose3d {
            rotation,
            translation,
        }
    }
}

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation, normalized internally.
/// * `angle` - The angle of rotation in radians.
///
/// Example:
///
/// ```
/// use rovis_3d::pose::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], PoseError> {
    let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
    if magnitude < 1e-10 {
        return Err(PoseError::ZeroAxis);
    }
    let (x, y, z) = (axis[0] / magnitude, axis[1] / magnitude, axis[2] / magnitude);

    let (s, c) = angle.sin_cos();
    let t = 1.0 - c;

    let (xy, xz, yz) = (x * y * t, x * z * t, y * z * t);
    let (xs, ys, zs) = (x * s, y * s, z * s);

    Ok([
        [c + x * x * t, xy - zs, xz + ys],
        [xy + zs, c + y * y * t, yz - xs],
        [xz - ys, yz + xs, c + z * z * t],
    ])
}
