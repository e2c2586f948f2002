use serde::{Deserialize, Serialize};

/// Errors raised by the camera model.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CameraError {
    /// A camera parameter is outside of its valid range.
    #[error("Invalid camera parameter {name}: {value}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// There is no default profile for the camera index.
    #[error("Unknown camera profile {0}, expected an index below {1}")]
    UnknownProfile(usize, usize),
}

/// Default resolution `(width, height)` of the camera profiles.
pub const DEFAULT_RESOLUTION: (u32, u32) = (320, 240);

/// Calibration of the known cameras, as ratios of the image resolution.
struct CameraProfile {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
}

const CAMERA_PROFILES: [CameraProfile; 2] = [
    // Point Grey Research Bumblebee
    CameraProfile {
        fx: 0.79345,
        fy: 1.05793,
        cx: 0.55662,
        cy: 0.52692,
    },
    // Sony
    CameraProfile {
        fx: 0.95666094,
        fy: 1.3983423,
        cx: 0.54626328,
        cy: 0.4939191,
    },
];

/// Intrinsic parameters of a pinhole camera.
///
/// Represents the matrix
///
/// ```text
/// | fx  0 cx |
/// |  0 fy cy |
/// |  0  0  1 |
/// ```
///
/// with `fx, fy > 0`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IntrinsicsParams", into = "IntrinsicsParams")]
pub struct CameraIntrinsics {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct IntrinsicsParams {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
}

impl TryFrom<IntrinsicsParams> for CameraIntrinsics {
    type Error = CameraError;

    fn try_from(p: IntrinsicsParams) -> Result<Self, Self::Error> {
        build_intrinsics(p.fx, p.fy, p.cx, p.cy)
    }
}

impl From<CameraIntrinsics> for IntrinsicsParams {
    fn from(k: CameraIntrinsics) -> Self {
        Self {
            fx: k.fx,
            fy: k.fy,
            cx: k.cx,
            cy: k.cy,
        }
    }
}

impl Default for CameraIntrinsics {
    /// The Bumblebee profile at [`DEFAULT_RESOLUTION`].
    fn default() -> Self {
        let p = &CAMERA_PROFILES[0];
        let (w, h) = (DEFAULT_RESOLUTION.0 as f64, DEFAULT_RESOLUTION.1 as f64);
        Self {
            fx: p.fx * w,
            fy: p.fy * h,
            cx: p.cx * w,
            cy: p.cy * h,
        }
    }
}

impl CameraIntrinsics {
    /// Focal length along x in pixels.
    #[inline]
    pub fn fx(&self) -> f64 {
        self.fx
    }

    /// Focal length along y in pixels.
    #[inline]
    pub fn fy(&self) -> f64 {
        self.fy
    }

    /// Column of the principal point in pixels.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.cx
    }

    /// Row of the principal point in pixels.
    #[inline]
    pub fn cy(&self) -> f64 {
        self.cy
    }

    /// Returns the camera matrix as a row-major 3x3 array.
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Unit vector pointing from the optical center towards the pixel `(x, y)`.
    ///
    /// The ray is expressed in the camera frame: x right, y down, z forward.
    pub fn pixel_to_ray(&self, x: f64, y: f64) -> [f64; 3] {
        let v = [(x - self.cx) / self.fx, (y - self.cy) / self.fy, 1.0];
        let norm = (v[0] * v[0] + v[1] * v[1] + 1.0).sqrt();
        [v[0] / norm, v[1] / norm, v[2] / norm]
    }

    /// Project a point in the camera frame to pixel coordinates.
    ///
    /// Returns `None` for points on or behind the camera plane.
    pub fn project(&self, point: &[f64; 3]) -> Option<[f64; 2]> {
        if point[2] <= 0.0 {
            return None;
        }
        Some([
            self.fx * point[0] / point[2] + self.cx,
            self.fy * point[1] / point[2] + self.cy,
        ])
    }
}

/// Build the intrinsic parameters from the focal lengths and the principal point.
///
/// # Arguments
///
/// * `fx` - The focal length, in horizontal pixels.
/// * `fy` - The focal length, in vertical pixels.
/// * `cx` - The column of the principal point.
/// * `cy` - The row of the principal point.
///
/// # Errors
///
/// Returns [`CameraError::InvalidParameter`] if a focal length is not strictly
/// positive, or if any parameter is not finite.
///
/// # Example
///
/// ```
/// use rovis_3d::camera::build_intrinsics;
///
/// let k = build_intrinsics(500.0, 500.0, 320.0, 240.0).unwrap();
/// assert_eq!(k.matrix(), [[500.0, 0.0, 320.0], [0.0, 500.0, 240.0], [0.0, 0.0, 1.0]]);
///
/// assert!(build_intrinsics(0.0, 500.0, 320.0, 240.0).is_err());
/// ```
pub fn build_intrinsics(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<CameraIntrinsics, CameraError> {
    for (name, value) in [("fx", fx), ("fy", fy)] {
        if !(value > 0.0 && value.is_finite()) {
            return Err(CameraError::InvalidParameter { name, value });
        }
    }
    for (name, value) in [("cx", cx), ("cy", cy)] {
        if !value.is_finite() {
            return Err(CameraError::InvalidParameter { name, value });
        }
    }

    Ok(CameraIntrinsics { fx, fy, cx, cy })
}

/// Intrinsic parameters of a known camera at the given resolution.
///
/// The profiles are stored as ratios of the resolution:
///
/// | index | camera               | fx         | fy        | cx         | cy        |
/// |-------|----------------------|------------|-----------|------------|-----------|
/// | 0     | Point Grey Bumblebee | 0.79345    | 1.05793   | 0.55662    | 0.52692   |
/// | 1     | Sony                 | 0.95666094 | 1.3983423 | 0.54626328 | 0.4939191 |
///
/// The profiles were calibrated at [`DEFAULT_RESOLUTION`].
///
/// # Errors
///
/// * [`CameraError::UnknownProfile`] if the index is not in the table.
/// * [`CameraError::InvalidParameter`] if the width or height is zero.
pub fn default_intrinsics(
    camera_index: usize,
    width: u32,
    height: u32,
) -> Result<CameraIntrinsics, CameraError> {
    let profile = CAMERA_PROFILES
        .get(camera_index)
        .ok_or(CameraError::UnknownProfile(camera_index, CAMERA_PROFILES.len()))?;

    let (w, h) = (width as f64, height as f64);
    build_intrinsics(profile.fx * w, profile.fy * h, profile.cx * w, profile.cy * h)
}
