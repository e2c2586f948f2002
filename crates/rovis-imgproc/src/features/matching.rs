use serde::{Deserialize, Serialize};

use super::{Descriptor, Feature, FeatureError, FeatureList, MatchedPair, MatchedPairList};
use crate::correlation::{correlate, SearchWindow};

/// Distance used to compare two descriptors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptorMetric {
    /// Euclidean distance between [`Descriptor::Real`] descriptors.
    #[default]
    Euclidean,
    /// Hamming distance between [`Descriptor::Binary`] descriptors.
    Hamming,
    /// `1 - ncc` between [`Descriptor::Patch`] descriptors, in [0, 2].
    ///
    /// The left patch is searched inside the right patch, so the right patch may be larger.
    Correlation,
    /// Mean absolute difference between equally sized [`Descriptor::Patch`] descriptors, in [0, 1].
    Sad,
}

/// Geometric constraint applied to each candidate pair before comparing descriptors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum EpipolarFilter {
    /// No geometric constraint.
    #[default]
    None,
    /// Rectified stereo: the rows of the two features differ by at most `threshold` pixels.
    Rows {
        /// Maximum row difference in pixels.
        threshold: f32,
    },
    /// General two-view geometry: the right feature lies at most `threshold` pixels
    /// from the epipolar line `F * [x_left, y_left, 1]`.
    Fundamental {
        /// Fundamental matrix mapping left points to right epipolar lines, row-major.
        matrix: [[f64; 3]; 3],
        /// Maximum point to line distance in pixels.
        threshold: f64,
    },
}

impl EpipolarFilter {
    fn admits(&self, left: &Feature, right: &Feature) -> bool {
        match *self {
            EpipolarFilter::None => true,
            EpipolarFilter::Rows { threshold } => (left.y - right.y).abs() <= threshold,
            EpipolarFilter::Fundamental { matrix, threshold } => {
                let p = [left.x as f64, left.y as f64, 1.0];
                let line = [
                    matrix[0][0] * p[0] + matrix[0][1] * p[1] + matrix[0][2],
                    matrix[1][0] * p[0] + matrix[1][1] * p[1] + matrix[1][2],
                    matrix[2][0] * p[0] + matrix[2][1] * p[1] + matrix[2][2],
                ];
                let norm = (line[0] * line[0] + line[1] * line[1]).sqrt();
                if norm < f64::EPSILON {
                    return false;
                }
                let d = line[0] * right.x as f64 + line[1] * right.y as f64 + line[2];
                d.abs() / norm <= threshold
            }
        }
    }
}

/// Options of the correspondence matcher.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingOptions {
    /// Descriptor distance.
    pub metric: DescriptorMetric,
    /// A pair is accepted only if its distance is at most this value.
    pub max_distance: f64,
    /// Ratio between the best and second best distance used by [`match_features`].
    pub ratio: f64,
    /// Geometric pre-filter of the candidate pairs.
    pub epipolar: EpipolarFilter,
    /// Reject candidates with a negative disparity, i.e. `x_right > x_left`.
    pub x_restriction: bool,
    /// Each right feature is used by at most one pair.
    pub one_to_one: bool,
}

impl Default for MatchingOptions {
    fn default() -> Self {
        Self {
            metric: DescriptorMetric::Euclidean,
            max_distance: f64::INFINITY,
            ratio: 0.8,
            epipolar: EpipolarFilter::None,
            x_restriction: false,
            one_to_one: true,
        }
    }
}

impl MatchingOptions {
    fn validate(&self) -> Result<(), FeatureError> {
        if self.max_distance.is_nan() || self.max_distance < 0.0 {
            return Err(FeatureError::InvalidOption("max_distance must be >= 0"));
        }
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(FeatureError::InvalidOption("ratio must be in (0, 1]"));
        }
        Ok(())
    }

    fn admits(&self, left: &Feature, right: &Feature) -> bool {
        if self.x_restriction && right.x > left.x {
            return false;
        }
        self.epipolar.admits(left, right)
    }
}

/// Compute the distance between the descriptors of two features.
///
/// # Errors
///
/// Returns [`FeatureError::DescriptorMismatch`] if the descriptors are of a kind the
/// metric cannot compare, or have different lengths.
pub fn descriptor_distance(
    left: &Feature,
    right: &Feature,
    metric: DescriptorMetric,
) -> Result<f64, FeatureError> {
    let mismatch = || FeatureError::DescriptorMismatch(left.id, right.id, metric);

    match (metric, &left.descriptor, &right.descriptor) {
        (DescriptorMetric::Euclidean, Descriptor::Real(a), Descriptor::Real(b)) => {
            if a.len() != b.len() {
                return Err(mismatch());
            }
            Ok(a.iter()
                .zip(b.iter())
                .map(|(&x, &y)| (x as f64 - y as f64).powi(2))
                .sum::<f64>()
                .sqrt())
        }
        (DescriptorMetric::Hamming, Descriptor::Binary(a), Descriptor::Binary(b)) => {
            if a.len() != b.len() {
                return Err(mismatch());
            }
            Ok(a.iter()
                .zip(b.iter())
                .map(|(&x, &y)| (x ^ y).count_ones())
                .sum::<u32>() as f64)
        }
        (DescriptorMetric::Correlation, Descriptor::Patch(a), Descriptor::Patch(b)) => {
            let best = correlate(b, a, SearchWindow::full())?;
            Ok(1.0 - best.score)
        }
        (DescriptorMetric::Sad, Descriptor::Patch(a), Descriptor::Patch(b)) => {
            if a.size() != b.size() || a.numel() == 0 {
                return Err(mismatch());
            }
            let sad = a
                .as_slice()
                .iter()
                .zip(b.as_slice().iter())
                .map(|(&x, &y)| x.abs_diff(y) as f64)
                .sum::<f64>();
            Ok(sad / (a.numel() as f64 * 255.0))
        }
        _ => Err(mismatch()),
    }
}

/// Match two feature lists with a nearest neighbour ratio test.
///
/// For every left feature, the right features admitted by the geometric filters
/// are compared and only the nearest one is a candidate. It is accepted when its
/// distance is at most `max_distance` and strictly smaller than `ratio` times the
/// second best distance. A single admitted right feature always passes the ratio test.
///
/// With `one_to_one`, candidates are assigned greedily by ascending distance (ties
/// resolved by lower left index, then lower right index) and a right feature
/// claimed by a pair leaves the candidacy. The returned list is in assignment
/// order. Otherwise pairs are returned in left list order.
///
/// Left features without an accepted candidate do not appear in the output.
///
/// # Example
///
/// ```
/// use rovis_imgproc::features::{match_features, Descriptor, Feature, FeatureList, MatchingOptions};
///
/// let left: FeatureList = vec![
///     Feature::new(0, 10.0, 5.0).with_descriptor(Descriptor::Real(vec![0.0, 1.0])),
///     Feature::new(1, 20.0, 5.0).with_descriptor(Descriptor::Real(vec![5.0, 5.0])),
/// ]
/// .into();
/// let right: FeatureList = vec![
///     Feature::new(2, 16.0, 5.0).with_descriptor(Descriptor::Real(vec![5.0, 4.9])),
///     Feature::new(3, 7.0, 5.0).with_descriptor(Descriptor::Real(vec![0.1, 1.0])),
/// ]
/// .into();
///
/// let matches = match_features(&left, &right, &MatchingOptions::default()).unwrap();
/// assert_eq!(matches.len(), 2);
/// ```
pub fn match_features(
    left: &FeatureList,
    right: &FeatureList,
    options: &MatchingOptions,
) -> Result<MatchedPairList, FeatureError> {
    options.validate()?;

    let mut candidates = Vec::with_capacity(left.len());
    for (i, l) in left.iter().enumerate() {
        let mut best: Option<MatchedPair> = None;
        let mut second = f64::INFINITY;

        for (j, r) in right.iter().enumerate() {
            if !options.admits(l, r) {
                continue;
            }
            let distance = descriptor_distance(l, r, options.metric)?;
            match best {
                Some(b) if distance >= b.distance => {
                    if distance < second {
                        second = distance;
                    }
                }
                _ => {
                    if let Some(b) = best {
                        second = b.distance;
                    }
                    best = Some(MatchedPair {
                        left: i,
                        right: j,
                        distance,
                    });
                }
            }
        }

        if let Some(b) = best {
            let distinctive = second.is_infinite() || b.distance < options.ratio * second;
            if b.distance <= options.max_distance && distinctive {
                candidates.push(b);
            }
        }
    }

    let matches = finalize(candidates, options.one_to_one);
    log::debug!(
        "matched {} of {} left features (ratio test)",
        matches.len(),
        left.len()
    );
    Ok(matches)
}

/// Match two feature lists keeping every admissible nearest neighbour.
///
/// This policy is looser than [`match_features`]: there is no ratio test, every
/// right feature admitted by the geometric filters and within `max_distance` is a
/// candidate of the left feature.
///
/// Without `one_to_one` the nearest candidate of every left feature is returned in
/// left list order. With `one_to_one` all candidates go through the greedy
/// assignment of [`match_features`], so a left feature whose nearest neighbour
/// was claimed by a better pair falls back to its next free candidate.
pub fn match_features_alternate(
    left: &FeatureList,
    right: &FeatureList,
    options: &MatchingOptions,
) -> Result<MatchedPairList, FeatureError> {
    options.validate()?;

    let mut candidates = Vec::new();
    for (i, l) in left.iter().enumerate() {
        let mut nearest: Option<MatchedPair> = None;

        for (j, r) in right.iter().enumerate() {
            if !options.admits(l, r) {
                continue;
            }
            let distance = descriptor_distance(l, r, options.metric)?;
            if distance > options.max_distance {
                continue;
            }
            let pair = MatchedPair {
                left: i,
                right: j,
                distance,
            };
            if options.one_to_one {
                candidates.push(pair);
            } else if nearest.map_or(true, |n| distance < n.distance) {
                nearest = Some(pair);
            }
        }

        candidates.extend(nearest);
    }

    let matches = finalize(candidates, options.one_to_one);
    log::debug!(
        "matched {} of {} left features (nearest neighbour)",
        matches.len(),
        left.len()
    );
    Ok(matches)
}

fn finalize(candidates: Vec<MatchedPair>, one_to_one: bool) -> MatchedPairList {
    if one_to_one {
        greedy_assignment(candidates)
    } else {
        candidates.into()
    }
}

/// Assign candidates by ascending distance, each left and right index used at most once.
fn greedy_assignment(mut candidates: Vec<MatchedPair>) -> MatchedPairList {
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.left.cmp(&b.left))
            .then(a.right.cmp(&b.right))
    });

    let num_left = candidates.iter().map(|c| c.left + 1).max().unwrap_or(0);
    let num_right = candidates.iter().map(|c| c.right + 1).max().unwrap_or(0);
    let mut left_used = vec![false; num_left];
    let mut right_used = vec![false; num_right];

    candidates
        .into_iter()
        .filter(|c| {
            if left_used[c.left] || right_used[c.right] {
                return false;
            }
            left_used[c.left] = true;
            right_used[c.right] = true;
            true
        })
        .collect()
}
