//! Range and bearing observations of stereo landmarks.
//!
//! A measurement describes a point `p = (x, y, z)` of the sensor frame by
//!
//! ```text
//! range = |p|
//! yaw   = atan2(y, x)
//! pitch = atan2(-z, sqrt(x² + y²))
//! ```
//!
//! Points come from stereo correspondences, which are triangulated in the
//! left camera frame and moved into the sensor frame with the sensor pose,
//! or from a landmark cloud already expressed in the sensor frame.

use rovis_imgproc::features::{FeatureId, FeatureList, MatchedPairList};
use serde::{Deserialize, Serialize};

use crate::{
    camera::CameraIntrinsics,
    landmark::LandmarkMap,
    linalg::{diag33, mat33_mul, propagate_covariance},
    pose::Pose3d,
    stereo::{
        rectified_pair, stereo_jacobian, stereo_point, validate_baseline, RectifiedPair,
        StereoError,
    },
};

/// A single range and bearing measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BearingRangeMeasurement {
    /// Distance to the point.
    pub range: f64,
    /// Azimuth in radians.
    pub yaw: f64,
    /// Elevation in radians, positive below the xy plane.
    pub pitch: f64,
    /// Id of the feature or landmark the measurement refers to.
    pub feature_id: Option<FeatureId>,
    /// Covariance of `(range, yaw, pitch)`.
    pub covariance: Option<[[f64; 3]; 3]>,
}

/// A set of range and bearing measurements taken from one sensor pose.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BearingRangeObservation {
    /// Pose of the sensor used to build the measurements.
    pub sensor_pose: Pose3d,
    /// The largest range among the measurements, 0 when empty.
    pub max_sensor_distance: f64,
    /// The measurements, in input order.
    pub measurements: Vec<BearingRangeMeasurement>,
    /// Correspondences dropped because of a non positive disparity.
    pub skipped_degenerate: usize,
}

/// Matched features of a rectified stereo pair with its calibration.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoObservation {
    /// Features of the left image.
    pub left_features: FeatureList,
    /// Features of the right image.
    pub right_features: FeatureList,
    /// Correspondences between the two lists.
    pub matches: MatchedPairList,
    /// Intrinsics of the left camera.
    pub intrinsics: CameraIntrinsics,
    /// Distance between the optical centers.
    pub baseline: f64,
    /// Pose of the left camera in the sensor frame.
    pub sensor_pose: Pose3d,
}

/// Landmarks expressed in the sensor frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkCloud {
    /// The landmarks.
    pub landmarks: LandmarkMap,
    /// Pose of the camera the landmarks were triangulated with.
    pub sensor_pose: Pose3d,
}

/// The inputs a [`BearingRangeObservation`] can be built from.
///
/// `sigmas` holds the standard deviations of the row, the column and the
/// disparity, in pixels.
#[derive(Clone, Copy, Debug)]
pub enum BearingRangeSource<'a> {
    /// A stereo observation.
    StereoImagePair {
        /// The observation.
        observation: &'a StereoObservation,
        /// Pixel noise `(row, column, disparity)`.
        sigmas: [f64; 3],
    },
    /// Matched features with an explicit calibration.
    MatchedPairs {
        /// Features of the left image.
        left: &'a FeatureList,
        /// Features of the right image.
        right: &'a FeatureList,
        /// Correspondences between the two lists.
        matches: &'a MatchedPairList,
        /// Intrinsics of the left camera.
        intrinsics: &'a CameraIntrinsics,
        /// Distance between the optical centers.
        baseline: f64,
        /// Pose of the left camera in the sensor frame.
        sensor_pose: &'a Pose3d,
        /// Pixel noise `(row, column, disparity)`.
        sigmas: [f64; 3],
    },
    /// Already triangulated landmarks.
    LandmarkCloud(&'a LandmarkCloud),
}

/// Range, yaw and pitch of a point.
pub fn bearing_range(p: &[f64; 3]) -> [f64; 3] {
    let rho = p[0].hypot(p[1]);
    let range = (rho * rho + p[2] * p[2]).sqrt();
    [range, p[1].atan2(p[0]), (-p[2]).atan2(rho)]
}

/// Jacobian of [`bearing_range`] with respect to the point.
///
/// The angle rows are zero on the z axis, where the azimuth is undefined.
fn bearing_range_jacobian(p: &[f64; 3]) -> [[f64; 3]; 3] {
    let (x, y, z) = (p[0], p[1], p[2]);
    let rho2 = x * x + y * y;
    let rho = rho2.sqrt();
    let r2 = rho2 + z * z;
    let r = r2.sqrt();

    let (yaw, pitch) = if rho > 0.0 {
        (
            [-y / rho2, x / rho2, 0.0],
            [z * x / (rho * r2), z * y / (rho * r2), -rho / r2],
        )
    } else {
        ([0.0; 3], [0.0; 3])
    };

    [[x / r, y / r, z / r], yaw, pitch]
}

fn validate_sigmas(sigmas: &[f64; 3]) -> Result<(), StereoError> {
    for (name, value) in ["sigma_row", "sigma_column", "sigma_disparity"]
        .into_iter()
        .zip(sigmas.iter().copied())
    {
        if !(value >= 0.0 && value.is_finite()) {
            return Err(StereoError::InvalidParameter { name, value });
        }
    }
    Ok(())
}

/// Pixel noise in `(column, row, disparity)` order from `(row, column, disparity)` sigmas.
fn noise_matrix(sigmas: &[f64; 3]) -> [[f64; 3]; 3] {
    let [sigma_row, sigma_col, sigma_disp] = *sigmas;
    diag33([sigma_col.powi(2), sigma_row.powi(2), sigma_disp.powi(2)])
}

fn measurement_covariance(
    u: f64,
    v: f64,
    disparity: f64,
    intrinsics: &CameraIntrinsics,
    baseline: f64,
    sensor_pose: &Pose3d,
    noise: &[[f64; 3]; 3],
) -> [[f64; 3]; 3] {
    let p = sensor_pose.transform_point(&stereo_point(u, v, disparity, intrinsics, baseline));
    let jacobian = mat33_mul(
        &bearing_range_jacobian(&p),
        &mat33_mul(
            &sensor_pose.rotation,
            &stereo_jacobian(u, v, disparity, intrinsics, baseline),
        ),
    );
    propagate_covariance(&jacobian, noise)
}

/// Covariance of the `(range, yaw, pitch)` measurement of a single correspondence.
///
/// Only the jacobians at the correspondence are evaluated, no observation is built.
///
/// # Arguments
///
/// * `xl` - Column of the point in the left image.
/// * `yl` - Row of the point in the left image.
/// * `xr` - Column of the point in the right image.
/// * `intrinsics` - Intrinsics of the left camera.
/// * `baseline` - Distance between the optical centers.
/// * `sensor_pose` - Pose of the left camera in the sensor frame.
/// * `sigmas` - Standard deviations of the row, the column and the disparity.
///
/// # Errors
///
/// * [`StereoError::InvalidParameter`] for a non positive baseline or an invalid sigma.
/// * [`StereoError::DegenerateGeometry`] if `xl - xr <= 0`.
pub fn bearing_range_covariance(
    xl: f64,
    yl: f64,
    xr: f64,
    intrinsics: &CameraIntrinsics,
    baseline: f64,
    sensor_pose: &Pose3d,
    sigmas: [f64; 3],
) -> Result<[[f64; 3]; 3], StereoError> {
    validate_baseline(baseline)?;
    validate_sigmas(&sigmas)?;
    let disparity = xl - xr;
    if !(disparity > 0.0) {
        return Err(StereoError::DegenerateGeometry(disparity));
    }
    Ok(measurement_covariance(
        xl,
        yl,
        disparity,
        intrinsics,
        baseline,
        sensor_pose,
        &noise_matrix(&sigmas),
    ))
}

/// Build a bearing-range observation from the matches of a stereo observation.
///
/// # Arguments
///
/// * `observation` - The matched stereo pair.
/// * `sigmas` - Standard deviations of the row, the column and the disparity.
pub fn stereo_obs_to_bearing_range(
    observation: &StereoObservation,
    sigmas: [f64; 3],
) -> Result<BearingRangeObservation, StereoError> {
    matches_to_bearing_range(
        &observation.left_features,
        &observation.right_features,
        &observation.matches,
        &observation.intrinsics,
        observation.baseline,
        &observation.sensor_pose,
        sigmas,
    )
}

/// Build a bearing-range observation from matched features.
///
/// Each correspondence is triangulated, moved into the sensor frame and
/// converted to range, yaw and pitch. The covariance of each measurement is
/// the first order propagation of `diag(σ_col², σ_row², σ_disp²)` through the
/// triangulation, the sensor rotation and the bearing-range conversion.
///
/// Correspondences with a non positive disparity are skipped and counted.
///
/// # Errors
///
/// * [`StereoError::InvalidParameter`] for a non positive baseline or a
///   negative or non finite sigma.
/// * [`StereoError::IndexOutOfBounds`] if a pair references a missing feature.
pub fn matches_to_bearing_range(
    left: &FeatureList,
    right: &FeatureList,
    matches: &MatchedPairList,
    intrinsics: &CameraIntrinsics,
    baseline: f64,
    sensor_pose: &Pose3d,
    sigmas: [f64; 3],
) -> Result<BearingRangeObservation, StereoError> {
    validate_baseline(baseline)?;
    validate_sigmas(&sigmas)?;

    let noise = noise_matrix(&sigmas);

    let mut observation = BearingRangeObservation {
        sensor_pose: *sensor_pose,
        ..Default::default()
    };

    for pair in matches {
        let Some(RectifiedPair {
            feature: fl,
            u,
            v,
            disparity,
        }) = rectified_pair(left, right, pair)?
        else {
            observation.skipped_degenerate += 1;
            continue;
        };

        let p = sensor_pose.transform_point(&stereo_point(u, v, disparity, intrinsics, baseline));
        let [range, yaw, pitch] = bearing_range(&p);
        let covariance =
            measurement_covariance(u, v, disparity, intrinsics, baseline, sensor_pose, &noise);

        observation.max_sensor_distance = observation.max_sensor_distance.max(range);
        observation.measurements.push(BearingRangeMeasurement {
            range,
            yaw,
            pitch,
            feature_id: Some(fl.id),
            covariance: Some(covariance),
        });
    }

    log::debug!(
        "built {} bearing-range measurements from {} pairs",
        observation.measurements.len(),
        matches.len()
    );

    Ok(observation)
}

/// Build a bearing-range observation from landmarks in the sensor frame.
///
/// The measurements carry no covariance.
pub fn landmarks_to_bearing_range(cloud: &LandmarkCloud) -> BearingRangeObservation {
    let mut observation = BearingRangeObservation {
        sensor_pose: cloud.sensor_pose,
        ..Default::default()
    };

    for (_, landmark) in cloud.landmarks.iter() {
        let [range, yaw, pitch] = bearing_range(&landmark.position);
        observation.max_sensor_distance = observation.max_sensor_distance.max(range);
        observation.measurements.push(BearingRangeMeasurement {
            range,
            yaw,
            pitch,
            feature_id: Some(landmark.feature_id),
            covariance: None,
        });
    }

    observation
}

/// Build a bearing-range observation from any of its sources.
pub fn to_bearing_range(
    source: BearingRangeSource<'_>,
) -> Result<BearingRangeObservation, StereoError> {
    match source {
        BearingRangeSource::StereoImagePair {
            observation,
            sigmas,
        } => stereo_obs_to_bearing_range(observation, sigmas),
        BearingRangeSource::MatchedPairs {
            left,
            right,
            matches,
            intrinsics,
            baseline,
            sensor_pose,
            sigmas,
        } => matches_to_bearing_range(
            left,
            right,
            matches,
            intrinsics,
            baseline,
            sensor_pose,
            sigmas,
        ),
        BearingRangeSource::LandmarkCloud(cloud) => Ok(landmarks_to_bearing_range(cloud)),
    }
}
