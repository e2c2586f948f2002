use std::collections::HashMap;

use rovis_imgproc::features::FeatureId;

use crate::{
    landmark::{LandmarkId, LandmarkMap},
    pose::Pose3d,
};

/// Errors raised by the correspondence metrics.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MetricsError {
    /// The metric is undefined without correspondences.
    #[error("Cannot compute a metric over an empty set of correspondences")]
    EmptyInput,
}

/// A correspondence between a point of two clouds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointPair3d {
    /// Id of the landmark in the `this` cloud.
    pub this_id: LandmarkId,
    /// Id of the landmark in the `other` cloud.
    pub other_id: LandmarkId,
    /// Position in the `this` cloud.
    pub this: [f64; 3],
    /// Position in the `other` cloud.
    pub other: [f64; 3],
}

/// Mean squared distance between corresponding points under a pose hypothesis.
///
/// Each `other` point is transformed with `pose` and compared with its `this`
/// point.
///
/// # Arguments
///
/// * `pairs` - The correspondences.
/// * `pose` - The transform from the `other` frame to the `this` frame.
///
/// # Errors
///
/// Returns [`MetricsError::EmptyInput`] if there are no correspondences.
pub fn mean_squared_distance(pairs: &[PointPair3d], pose: &Pose3d) -> Result<f64, MetricsError> {
    if pairs.is_empty() {
        return Err(MetricsError::EmptyInput);
    }

    let sum = pairs
        .iter()
        .map(|pair| {
            let p = pose.transform_point(&pair.other);
            (p[0] - pair.this[0]).powi(2)
                + (p[1] - pair.this[1]).powi(2)
                + (p[2] - pair.this[2]).powi(2)
        })
        .sum::<f64>();

    Ok(sum / pairs.len() as f64)
}

/// Pair the landmarks of two maps that were built from the same feature.
///
/// The pairs follow the iteration order of `this`. When several landmarks of
/// `other` share a feature id, the first one is used.
pub fn clouds_to_matched_list(this: &LandmarkMap, other: &LandmarkMap) -> Vec<PointPair3d> {
    let mut by_feature: HashMap<FeatureId, (LandmarkId, [f64; 3])> =
        HashMap::with_capacity(other.len());
    for (id, landmark) in other.iter() {
        by_feature
            .entry(landmark.feature_id)
            .or_insert((id, landmark.position));
    }

    this.iter()
        .filter_map(|(this_id, landmark)| {
            by_feature
                .get(&landmark.feature_id)
                .map(|&(other_id, other)| PointPair3d {
                    this_id,
                    other_id,
                    this: landmark.position,
                    other,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Landmark;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rovis_imgproc::features::MatchedPair;

    fn landmark(position: [f64; 3], feature: u64) -> Landmark {
        Landmark {
            position,
            covariance: None,
            feature_id: FeatureId(feature),
            source: MatchedPair {
                left: 0,
                right: 0,
                distance: 0.0,
            },
        }
    }

    #[test]
    fn test_mean_squared_distance() -> Result<(), MetricsError> {
        let pairs = [
            PointPair3d {
                this_id: LandmarkId(0),
                other_id: LandmarkId(0),
                this: [1.0, 0.0, 0.0],
                other: [0.0, 0.0, 0.0],
            },
            PointPair3d {
                this_id: LandmarkId(1),
                other_id: LandmarkId(1),
                this: [0.0, 3.0, 0.0],
                other: [0.0, 0.0, 0.0],
            },
        ];
        assert_eq!(mean_squared_distance(&pairs, &Pose3d::identity())?, 5.0);

        let shifted = Pose3d::new(Pose3d::identity().rotation, [1.0, 0.0, 0.0]);
        assert_eq!(mean_squared_distance(&pairs, &shifted)?, 4.5);

        assert_eq!(
            mean_squared_distance(&[], &Pose3d::identity()),
            Err(MetricsError::EmptyInput)
        );
        Ok(())
    }

    #[test]
    fn test_mean_squared_distance_true_pose() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(7);
        let pose = Pose3d::from_ypr(0.5, -0.2, 1.0, 0.3, 0.1, -0.2);
        let inverse = pose.inverse();

        let mut this = LandmarkMap::new();
        let mut other = LandmarkMap::new();
        for i in 0..10 {
            let p = [
                rng.random_range(-5.0..5.0),
                rng.random_range(-5.0..5.0),
                rng.random_range(0.0..10.0),
            ];
            this.insert(landmark(p, i));
            other.insert(landmark(inverse.transform_point(&p), i));
        }

        let pairs = clouds_to_matched_list(&this, &other);
        assert_eq!(pairs.len(), 10);

        let msd_true = mean_squared_distance(&pairs, &pose)?;
        let msd_identity = mean_squared_distance(&pairs, &Pose3d::identity())?;
        assert_relative_eq!(msd_true, 0.0, epsilon = 1e-12);
        assert!(msd_identity > msd_true);
        Ok(())
    }

    #[test]
    fn test_clouds_to_matched_list() {
        let mut this = LandmarkMap::new();
        this.insert(landmark([1.0, 0.0, 0.0], 5));
        this.insert(landmark([2.0, 0.0, 0.0], 6));
        this.insert(landmark([3.0, 0.0, 0.0], 7));

        let mut other = LandmarkMap::with_first_id(10);
        other.insert(landmark([0.0, 7.0, 0.0], 7));
        other.insert(landmark([0.0, 5.0, 0.0], 5));
        other.insert(landmark([0.0, 5.5, 0.0], 5));

        let pairs = clouds_to_matched_list(&this, &other);
        assert_eq!(
            pairs,
            vec![
                PointPair3d {
                    this_id: LandmarkId(0),
                    other_id: LandmarkId(11),
                    this: [1.0, 0.0, 0.0],
                    other: [0.0, 5.0, 0.0],
                },
                PointPair3d {
                    this_id: LandmarkId(2),
                    other_id: LandmarkId(10),
                    this: [3.0, 0.0, 0.0],
                    other: [0.0, 7.0, 0.0],
                },
            ]
        );
    }
}
