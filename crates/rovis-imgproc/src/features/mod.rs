//! Feature lists and correspondence matching.
//!
//! This module works on features that were already detected by an external
//! detector. It provides:
//!
//! - the [`Feature`], [`FeatureList`] and [`MatchedPair`] types
//! - list level operations: de-duplication, dispersion, row checking and drawing
//! - descriptor based correspondence matching between two lists
//! - the dominant gradient orientation around a pixel

use rovis_image::Image;
use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationError;

mod list;
pub use list::*;

mod matching;
pub use matching::*;

mod orientation;
pub use orientation::*;

/// Errors raised by the feature operations.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FeatureError {
    /// Statistics were requested over an empty list.
    #[error("The feature list is empty")]
    EmptyInput,

    /// Two correspondence-ordered lists have different lengths.
    #[error("Feature lists must have the same length, got {0} and {1}")]
    LengthMismatch(usize, usize),

    /// The descriptors cannot be compared with the requested metric.
    #[error("Descriptors of features {0:?} and {1:?} cannot be compared with {2:?}")]
    DescriptorMismatch(FeatureId, FeatureId, DescriptorMetric),

    /// A matching option is outside of its valid range.
    #[error("Invalid matching option: {0}")]
    InvalidOption(&'static str),

    /// The pixel is too close to the image border.
    #[error("Pixel ({0}, {1}) is too close to the image border")]
    OutOfBounds(usize, usize),

    /// Error raised while correlating patch descriptors.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

/// Opaque identifier of a feature, assigned by the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(pub u64);

/// Descriptor attached to a feature.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Descriptor {
    /// The feature carries no descriptor.
    #[default]
    None,
    /// Packed binary descriptor, compared with the Hamming distance.
    Binary(Vec<u8>),
    /// Real valued descriptor, compared with the Euclidean distance.
    Real(Vec<f32>),
    /// Intensity patch centered on the feature.
    Patch(Image<u8, 1>),
}

/// A detected 2D image feature.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    /// Identifier of the feature.
    pub id: FeatureId,
    /// Column of the feature in pixels.
    pub x: f32,
    /// Row of the feature in pixels.
    pub y: f32,
    /// Detector response, if available.
    pub response: Option<f32>,
    /// Orientation in radians, if available.
    pub orientation: Option<f32>,
    /// The feature descriptor.
    pub descriptor: Descriptor,
}

impl Feature {
    /// Create a feature at the given pixel coordinates without a descriptor.
    pub fn new(id: u64, x: f32, y: f32) -> Self {
        Self {
            id: FeatureId(id),
            x,
            y,
            response: None,
            orientation: None,
            descriptor: Descriptor::None,
        }
    }

    /// Attach a descriptor to the feature.
    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Attach a detector response to the feature.
    pub fn with_response(mut self, response: f32) -> Self {
        self.response = Some(response);
        self
    }
}

/// An ordered list of features.
///
/// The order is significant: two lists may be correspondence-ordered, meaning
/// that the feature at index `i` of one list matches the feature at index `i` of
/// the other.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureList(Vec<Feature>);

impl FeatureList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a feature at the end of the list.
    pub fn push(&mut self, feature: Feature) {
        self.0.push(feature);
    }

    /// Number of features in the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the feature at the given index.
    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.0.get(index)
    }

    /// Iterate over the features in list order.
    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.0.iter()
    }

    /// Get the features as a slice.
    pub fn as_slice(&self) -> &[Feature] {
        &self.0
    }

    /// Keep only the features whose index satisfies the predicate.
    pub(crate) fn retain_indices(&mut self, mut keep: impl FnMut(usize) -> bool) {
        let mut index = 0;
        self.0.retain(|_| {
            let kept = keep(index);
            index += 1;
            kept
        });
    }
}

impl From<Vec<Feature>> for FeatureList {
    fn from(features: Vec<Feature>) -> Self {
        Self(features)
    }
}

impl FromIterator<Feature> for FeatureList {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FeatureList {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FeatureList {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for FeatureList {
    type Output = Feature;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// A correspondence between a feature of a left list and a feature of a right list.
///
/// The pair stores indices into the two lists, so it is only meaningful together
/// with the lists it was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    /// Index of the feature in the left list.
    pub left: usize,
    /// Index of the feature in the right list.
    pub right: usize,
    /// Descriptor distance between the two features, lower is more similar.
    pub distance: f64,
}

/// An ordered list of matched pairs, in discovery order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchedPairList(Vec<MatchedPair>);

impl MatchedPairList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a pair at the end of the list.
    pub fn push(&mut self, pair: MatchedPair) {
        self.0.push(pair);
    }

    /// Number of matched pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the pairs in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, MatchedPair> {
        self.0.iter()
    }

    /// Get the pairs as a slice.
    pub fn as_slice(&self) -> &[MatchedPair] {
        &self.0
    }
}

impl From<Vec<MatchedPair>> for MatchedPairList {
    fn from(pairs: Vec<MatchedPair>) -> Self {
        Self(pairs)
    }
}

impl FromIterator<MatchedPair> for MatchedPairList {
    fn from_iter<I: IntoIterator<Item = MatchedPair>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a MatchedPairList {
    type Item = &'a MatchedPair;
    type IntoIter = std::slice::Iter<'a, MatchedPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
