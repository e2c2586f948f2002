use rovis_imgproc::features::{Feature, FeatureList, MatchedPair, MatchedPairList};
use serde::{Deserialize, Serialize};

use crate::{
    camera::CameraIntrinsics,
    landmark::{Landmark, LandmarkMap},
    linalg::{diag33, mat33_mul, propagate_covariance},
    pose::Pose3d,
};

/// Errors raised by the stereo triangulation.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StereoError {
    /// A stereo parameter is outside of its valid range.
    #[error("Invalid stereo parameter {name}: {value}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The correspondence-ordered lists have different lengths.
    #[error("Feature lists have different lengths ({0} != {1})")]
    LengthMismatch(usize, usize),

    /// The disparity of a correspondence is not positive.
    #[error("Degenerate stereo geometry, disparity {0} is not positive")]
    DegenerateGeometry(f64),

    /// A matched pair references a feature outside of its list.
    #[error("Matched pair ({left}, {right}) out of bounds for lists of {left_len} and {right_len} features")]
    IndexOutOfBounds {
        /// Index into the left list.
        left: usize,
        /// Index into the right list.
        right: usize,
        /// Length of the left list.
        left_len: usize,
        /// Length of the right list.
        right_len: usize,
    },
}

/// How the uncertainty of the image measurements reaches the landmarks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UncertaintyPropagation {
    /// Landmarks carry no covariance.
    None,
    /// First order propagation through the triangulation jacobian.
    #[default]
    Linear,
}

/// Parameters of a rectified stereo rig.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoParams {
    /// Intrinsics of the left (reference) camera.
    pub intrinsics: CameraIntrinsics,
    /// Distance between the optical centers, in meters.
    pub baseline: f64,
    /// Pose of the left camera in the reference frame.
    pub sensor_pose: Pose3d,
    /// Standard deviation of the pixel coordinates.
    pub std_pixel: f64,
    /// Standard deviation of the disparity.
    pub std_disparity: f64,
    /// Closest accepted depth, in meters.
    pub min_depth: f64,
    /// Farthest accepted depth, in meters.
    pub max_depth: f64,
    /// Largest accepted height `|Y|` in the camera frame, in meters.
    pub max_height: f64,
    /// Covariance propagation mode.
    pub uncertainty: UncertaintyPropagation,
}

impl Default for StereoParams {
    fn default() -> Self {
        Self {
            intrinsics: CameraIntrinsics::default(),
            baseline: 0.119,
            sensor_pose: Pose3d::identity(),
            std_pixel: 1.0,
            std_disparity: 1.0,
            min_depth: 0.3,
            max_depth: 20.0,
            max_height: 3.0,
            uncertainty: UncertaintyPropagation::Linear,
        }
    }
}

impl StereoParams {
    /// Parameters for the given rig with the default noise and range limits.
    pub fn new(intrinsics: CameraIntrinsics, baseline: f64) -> Self {
        Self {
            intrinsics,
            baseline,
            ..Default::default()
        }
    }

    /// Check that the parameters describe a valid rig.
    pub fn validate(&self) -> Result<(), StereoError> {
        validate_baseline(self.baseline)?;
        for (name, value) in [
            ("std_pixel", self.std_pixel),
            ("std_disparity", self.std_disparity),
            ("min_depth", self.min_depth),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(StereoError::InvalidParameter { name, value });
            }
        }
        if !(self.max_depth > self.min_depth) {
            return Err(StereoError::InvalidParameter {
                name: "max_depth",
                value: self.max_depth,
            });
        }
        if !(self.max_height > 0.0) {
            return Err(StereoError::InvalidParameter {
                name: "max_height",
                value: self.max_height,
            });
        }
        Ok(())
    }
}

/// Result of triangulating a set of correspondences.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Triangulation {
    /// One landmark per accepted correspondence, in input order.
    pub landmarks: LandmarkMap,
    /// Correspondences dropped because of a non positive disparity.
    pub skipped_degenerate: usize,
    /// Correspondences dropped by the depth or height limits.
    pub skipped_out_of_range: usize,
}

pub(crate) fn validate_baseline(baseline: f64) -> Result<(), StereoError> {
    if baseline > 0.0 && baseline.is_finite() {
        Ok(())
    } else {
        Err(StereoError::InvalidParameter {
            name: "baseline",
            value: baseline,
        })
    }
}

/// A correspondence with a strictly positive disparity.
pub(crate) struct RectifiedPair<'a> {
    pub feature: &'a Feature,
    pub u: f64,
    pub v: f64,
    pub disparity: f64,
}

/// Look up the features of a correspondence and compute its disparity.
///
/// Returns `None`, after a warning, for a non positive disparity.
pub(crate) fn rectified_pair<'a>(
    left: &'a FeatureList,
    right: &'a FeatureList,
    pair: &MatchedPair,
) -> Result<Option<RectifiedPair<'a>>, StereoError> {
    let (fl, fr) = match (left.get(pair.left), right.get(pair.right)) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(StereoError::IndexOutOfBounds {
                left: pair.left,
                right: pair.right,
                left_len: left.len(),
                right_len: right.len(),
            })
        }
    };

    let (u, v) = (fl.x as f64, fl.y as f64);
    let disparity = u - fr.x as f64;
    if !(disparity > 0.0) {
        log::warn!(
            "skipping pair ({}, {}) with disparity {}",
            pair.left,
            pair.right,
            disparity
        );
        return Ok(None);
    }

    Ok(Some(RectifiedPair {
        feature: fl,
        u,
        v,
        disparity,
    }))
}

/// Camera frame point of the pixel `(u, v)` with a strictly positive disparity.
pub(crate) fn stereo_point(
    u: f64,
    v: f64,
    disparity: f64,
    intrinsics: &CameraIntrinsics,
    baseline: f64,
) -> [f64; 3] {
    let depth = intrinsics.fx() * baseline / disparity;
    [
        (u - intrinsics.cx()) * depth / intrinsics.fx(),
        (v - intrinsics.cy()) * depth / intrinsics.fy(),
        depth,
    ]
}

/// Jacobian of [`stereo_point`] with respect to `(u, v, disparity)`.
pub(crate) fn stereo_jacobian(
    u: f64,
    v: f64,
    disparity: f64,
    intrinsics: &CameraIntrinsics,
    baseline: f64,
) -> [[f64; 3]; 3] {
    let (fx, fy) = (intrinsics.fx(), intrinsics.fy());
    let b_d = baseline / disparity;
    let b_d2 = b_d / disparity;
    let ratio = fx / fy;
    [
        [b_d, 0.0, -(u - intrinsics.cx()) * b_d2],
        [0.0, ratio * b_d, -(v - intrinsics.cy()) * ratio * b_d2],
        [0.0, 0.0, -fx * b_d2],
    ]
}

/// Triangulate a single rectified correspondence.
///
/// # Arguments
///
/// * `xl` - Column of the point in the left image.
/// * `yl` - Row of the point in the left image.
/// * `xr` - Column of the point in the right image.
/// * `intrinsics` - Intrinsics of the left camera.
/// * `baseline` - Distance between the optical centers.
///
/// # Returns
///
/// The point in the left camera frame: x right, y down, z forward.
///
/// # Errors
///
/// * [`StereoError::InvalidParameter`] if the baseline is not positive.
/// * [`StereoError::DegenerateGeometry`] if `xl - xr <= 0`.
pub fn triangulate_point(
    xl: f64,
    yl: f64,
    xr: f64,
    intrinsics: &CameraIntrinsics,
    baseline: f64,
) -> Result<[f64; 3], StereoError> {
    validate_baseline(baseline)?;
    let disparity = xl - xr;
    if !(disparity > 0.0) {
        return Err(StereoError::DegenerateGeometry(disparity));
    }
    Ok(stereo_point(xl, yl, disparity, intrinsics, baseline))
}

/// Triangulate the matched features of a rectified stereo pair.
///
/// Each pair is triangulated in the left camera frame, filtered by the depth
/// and height limits of `params`, then moved into the reference frame with
/// the sensor pose. Pairs with a non positive disparity are skipped.
///
/// # Arguments
///
/// * `left` - Features of the left image.
/// * `right` - Features of the right image.
/// * `pairs` - Correspondences indexing into `left` and `right`.
/// * `params` - The stereo rig.
///
/// # Errors
///
/// * [`StereoError::InvalidParameter`] if the parameters are invalid.
/// * [`StereoError::IndexOutOfBounds`] if a pair references a missing feature.
pub fn project_matched_features(
    left: &FeatureList,
    right: &FeatureList,
    pairs: &MatchedPairList,
    params: &StereoParams,
) -> Result<Triangulation, StereoError> {
    params.validate()?;

    let noise = diag33([
        params.std_pixel.powi(2),
        params.std_pixel.powi(2),
        params.std_disparity.powi(2),
    ]);

    let mut triangulation = Triangulation::default();
    for pair in pairs {
        let Some(RectifiedPair {
            feature: fl,
            u,
            v,
            disparity,
        }) = rectified_pair(left, right, pair)?
        else {
            triangulation.skipped_degenerate += 1;
            continue;
        };

        let p = stereo_point(u, v, disparity, &params.intrinsics, params.baseline);
        if p[2] < params.min_depth || p[2] > params.max_depth || p[1].abs() > params.max_height {
            triangulation.skipped_out_of_range += 1;
            continue;
        }

        let covariance = match params.uncertainty {
            UncertaintyPropagation::None => None,
            UncertaintyPropagation::Linear => {
                let jacobian =
                    stereo_jacobian(u, v, disparity, &params.intrinsics, params.baseline);
                let jacobian = mat33_mul(&params.sensor_pose.rotation, &jacobian);
                Some(propagate_covariance(&jacobian, &noise))
            }
        };

        triangulation.landmarks.insert(Landmark {
            position: params.sensor_pose.transform_point(&p),
            covariance,
            feature_id: fl.id,
            source: *pair,
        });
    }

    log::debug!(
        "triangulated {} landmarks from {} pairs ({} degenerate, {} out of range)",
        triangulation.landmarks.len(),
        pairs.len(),
        triangulation.skipped_degenerate,
        triangulation.skipped_out_of_range
    );

    Ok(triangulation)
}

/// Triangulate two lists whose features correspond index by index.
///
/// # Errors
///
/// Returns [`StereoError::LengthMismatch`] if the lists have different lengths,
/// plus the errors of [`project_matched_features`].
pub fn project_ordered_features(
    left: &FeatureList,
    right: &FeatureList,
    params: &StereoParams,
) -> Result<Triangulation, StereoError> {
    if left.len() != right.len() {
        return Err(StereoError::LengthMismatch(left.len(), right.len()));
    }
    let pairs = (0..left.len())
        .map(|i| MatchedPair {
            left: i,
            right: i,
            distance: 0.0,
        })
        .collect::<MatchedPairList>();
    project_matched_features(left, right, &pairs, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::build_intrinsics;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rovis_imgproc::features::FeatureId;

    /// Project a camera frame point into a rectified pair: `(xl, yl, xr)`.
    fn project_stereo(p: &[f64; 3], k: &CameraIntrinsics, baseline: f64) -> (f64, f64, f64) {
        let xl = k.fx() * p[0] / p[2] + k.cx();
        let yl = k.fy() * p[1] / p[2] + k.cy();
        let xr = k.fx() * (p[0] - baseline) / p[2] + k.cx();
        (xl, yl, xr)
    }

    fn stereo_lists(
        points: &[[f64; 3]],
        k: &CameraIntrinsics,
        baseline: f64,
    ) -> (FeatureList, FeatureList) {
        let (left, right): (Vec<_>, Vec<_>) = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (xl, yl, xr) = project_stereo(p, k, baseline);
                (
                    Feature::new(i as u64, xl as f32, yl as f32),
                    Feature::new(100 + i as u64, xr as f32, yl as f32),
                )
            })
            .unzip();
        (left.into(), right.into())
    }

    #[test]
    fn test_triangulate_point_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = StdRng::seed_from_u64(42);
        let k = build_intrinsics(500.0, 480.0, 320.0, 240.0)?;
        let baseline = 0.12;

        for _ in 0..50 {
            let p = [
                rng.random_range(-2.0..2.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(1.0..15.0),
            ];
            let (xl, yl, xr) = project_stereo(&p, &k, baseline);
            let q = triangulate_point(xl, yl, xr, &k, baseline)?;
            for i in 0..3 {
                assert_relative_eq!(q[i], p[i], epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_triangulate_point_degenerate() -> Result<(), Box<dyn std::error::Error>> {
        let k = build_intrinsics(500.0, 500.0, 320.0, 240.0)?;
        assert_eq!(
            triangulate_point(100.0, 50.0, 100.0, &k, 0.1),
            Err(StereoError::DegenerateGeometry(0.0))
        );
        assert_eq!(
            triangulate_point(100.0, 50.0, 102.0, &k, 0.1),
            Err(StereoError::DegenerateGeometry(-2.0))
        );
        assert!(matches!(
            triangulate_point(100.0, 50.0, 90.0, &k, 0.0),
            Err(StereoError::InvalidParameter {
                name: "baseline",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_project_matched_features() -> Result<(), Box<dyn std::error::Error>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let k = build_intrinsics(500.0, 500.0, 320.0, 240.0)?;
        let baseline = 0.2;
        let points = [[0.5, 0.2, 4.0], [-1.0, -0.3, 8.0], [0.0, 0.0, 50.0]];
        let (mut left, right) = stereo_lists(&points, &k, baseline);
        // a degenerate correspondence with the right feature on the left side
        left.push(Feature::new(3, 10.0, 10.0));

        let pairs = MatchedPairList::from(vec![
            MatchedPair {
                left: 3,
                right: 0,
                distance: 0.0,
            },
            MatchedPair {
                left: 1,
                right: 1,
                distance: 0.0,
            },
            MatchedPair {
                left: 2,
                right: 2,
                distance: 0.0,
            },
            MatchedPair {
                left: 0,
                right: 0,
                distance: 0.0,
            },
        ]);

        let sensor_pose = Pose3d::from_ypr(1.0, 0.0, 0.5, 0.0, 0.0, 0.0);
        let params = StereoParams {
            sensor_pose,
            uncertainty: UncertaintyPropagation::None,
            ..StereoParams::new(k, baseline)
        };
        let result = project_matched_features(&left, &right, &pairs, &params)?;

        assert_eq!(result.skipped_degenerate, 1);
        // the point at 50 m is beyond max_depth
        assert_eq!(result.skipped_out_of_range, 1);
        assert_eq!(result.landmarks.len(), 2);

        let landmarks = result.landmarks.iter().collect::<Vec<_>>();
        assert!(landmarks[0].0 < landmarks[1].0);
        assert_eq!(landmarks[0].1.feature_id, FeatureId(1));
        assert_eq!(landmarks[1].1.feature_id, FeatureId(0));
        assert_eq!(landmarks[1].1.source.left, 0);
        assert_eq!(landmarks[0].1.covariance, None);

        // f32 pixel coordinates limit the precision
        let expected = sensor_pose.transform_point(&points[1]);
        for i in 0..3 {
            assert_relative_eq!(landmarks[0].1.position[i], expected[i], epsilon = 1e-3);
        }
        Ok(())
    }

    #[test]
    fn test_linear_covariance() -> Result<(), Box<dyn std::error::Error>> {
        let k = build_intrinsics(500.0, 500.0, 320.0, 240.0)?;
        let baseline = 0.1;
        let left = FeatureList::from(vec![Feature::new(0, 345.0, 240.0)]);
        let right = FeatureList::from(vec![Feature::new(1, 320.0, 240.0)]);

        let params = StereoParams {
            std_pixel: 0.5,
            std_disparity: 2.0,
            ..StereoParams::new(k, baseline)
        };
        let result = project_ordered_features(&left, &right, &params)?;
        let (_, landmark) = result
            .landmarks
            .iter()
            .next()
            .ok_or("missing landmark")?;
        let cov = landmark.covariance.ok_or("missing covariance")?;

        // d = 25 px: z = 2 m, dz/dd = -fx b / d^2
        assert_relative_eq!(landmark.position[2], 2.0, epsilon = 1e-12);
        let dz_dd = 500.0 * 0.1 / (25.0 * 25.0);
        assert_relative_eq!(cov[2][2], dz_dd * dz_dd * 4.0, epsilon = 1e-12);
        for i in 0..3 {
            assert!(cov[i][i] >= 0.0);
            for j in 0..3 {
                assert_relative_eq!(cov[i][j], cov[j][i], epsilon = 1e-12);
            }
        }

        // rotating the sensor rotates the covariance
        let rotated = StereoParams {
            sensor_pose: Pose3d::from_ypr(0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2, 0.0, 0.0),
            ..params
        };
        let result = project_ordered_features(&left, &right, &rotated)?;
        let cov_rotated = result
            .landmarks
            .iter()
            .next()
            .and_then(|(_, lm)| lm.covariance)
            .ok_or("missing covariance")?;
        assert_relative_eq!(cov_rotated[1][1], cov[0][0], epsilon = 1e-12);
        assert_relative_eq!(cov_rotated[2][2], cov[2][2], epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_rectified_pair() -> Result<(), StereoError> {
        let left = FeatureList::from(vec![Feature::new(0, 10.0, 12.0), Feature::new(1, 5.0, 5.0)]);
        let right = FeatureList::from(vec![Feature::new(2, 8.0, 12.0), Feature::new(3, 5.0, 5.0)]);
        let pair = |l, r| MatchedPair {
            left: l,
            right: r,
            distance: 0.0,
        };

        let rectified = rectified_pair(&left, &right, &pair(0, 0))?;
        let rectified = rectified.map(|p| (p.feature.id, p.u, p.v, p.disparity));
        assert_eq!(rectified, Some((FeatureId(0), 10.0, 12.0, 2.0)));

        // zero and negative disparities
        assert!(rectified_pair(&left, &right, &pair(1, 1))?.is_none());
        assert!(rectified_pair(&left, &right, &pair(1, 0))?.is_none());

        assert_eq!(
            rectified_pair(&left, &right, &pair(2, 0)).err(),
            Some(StereoError::IndexOutOfBounds {
                left: 2,
                right: 0,
                left_len: 2,
                right_len: 2
            })
        );
        Ok(())
    }

    #[test]
    fn test_project_features_errors() -> Result<(), Box<dyn std::error::Error>> {
        let k = build_intrinsics(500.0, 500.0, 320.0, 240.0)?;
        let left = FeatureList::from(vec![Feature::new(0, 10.0, 10.0), Feature::new(1, 5.0, 5.0)]);
        let right = FeatureList::from(vec![Feature::new(2, 8.0, 10.0)]);

        assert_eq!(
            project_ordered_features(&left, &right, &StereoParams::new(k, 0.1)),
            Err(StereoError::LengthMismatch(2, 1))
        );

        let pairs = MatchedPairList::from(vec![MatchedPair {
            left: 0,
            right: 4,
            distance: 0.0,
        }]);
        assert_eq!(
            project_matched_features(&left, &right, &pairs, &StereoParams::new(k, 0.1)),
            Err(StereoError::IndexOutOfBounds {
                left: 0,
                right: 4,
                left_len: 2,
                right_len: 1
            })
        );

        assert!(matches!(
            project_matched_features(&left, &right, &pairs, &StereoParams::new(k, -0.1)),
            Err(StereoError::InvalidParameter {
                name: "baseline",
                ..
            })
        ));
        let params = StereoParams {
            std_disparity: f64::NAN,
            ..StereoParams::new(k, 0.1)
        };
        assert!(params.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_stereo_params_serde() -> Result<(), Box<dyn std::error::Error>> {
        let params: StereoParams = serde_json::from_str(r#"{"baseline": 0.3}"#)?;
        assert_eq!(params.baseline, 0.3);
        assert_eq!(params.uncertainty, UncertaintyPropagation::Linear);
        assert_eq!(params.intrinsics, CameraIntrinsics::default());
        params.validate()?;
        Ok(())
    }
}
