use std::collections::BTreeMap;

use rovis_imgproc::features::{FeatureId, MatchedPair};
use serde::{Deserialize, Serialize};

/// Identifier of a landmark inside a [`LandmarkMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LandmarkId(pub u64);

/// A triangulated 3D point.
#[derive(Clone, Debug, PartialEq)]
pub struct Landmark {
    /// Position in the reference frame.
    pub position: [f64; 3],
    /// Covariance of the position, when it was propagated.
    pub covariance: Option<[[f64; 3]; 3]>,
    /// Id of the left image feature the landmark was built from.
    pub feature_id: FeatureId,
    /// The stereo correspondence the landmark was built from.
    pub source: MatchedPair,
}

/// A collection of landmarks indexed by [`LandmarkId`].
///
/// Ids are assigned from a monotonic counter, so iteration follows insertion
/// order and removed or skipped ids are never reused.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkMap {
    landmarks: BTreeMap<LandmarkId, Landmark>,
    next_id: u64,
}

impl LandmarkMap {
    /// Create an empty map that assigns ids from zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map that assigns ids from `first_id`.
    ///
    /// Maps filled in parallel can use disjoint id ranges and be merged
    /// afterwards without renumbering.
    pub fn with_first_id(first_id: u64) -> Self {
        Self {
            landmarks: BTreeMap::new(),
            next_id: first_id,
        }
    }

    /// Insert a landmark and return its new id.
    pub fn insert(&mut self, landmark: Landmark) -> LandmarkId {
        let id = LandmarkId(self.next_id);
        self.next_id += 1;
        self.landmarks.insert(id, landmark);
        id
    }

    /// Get the landmark with the given id.
    pub fn get(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    /// Remove the landmark with the given id.
    pub fn remove(&mut self, id: LandmarkId) -> Option<Landmark> {
        self.landmarks.remove(&id)
    }

    /// Number of landmarks.
    #[inline]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    /// Check if the map is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Iterate over the landmarks in id order.
    pub fn iter(&self) -> impl Iterator<Item = (LandmarkId, &Landmark)> {
        self.landmarks.iter().map(|(id, lm)| (*id, lm))
    }

    /// Ids of the landmarks in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = LandmarkId> + '_ {
        self.landmarks.keys().copied()
    }

    /// Positions of the landmarks in id order.
    pub fn positions(&self) -> Vec<[f64; 3]> {
        self.landmarks.values().map(|lm| lm.position).collect()
    }

    /// Move the landmarks of `other` into this map.
    ///
    /// Ids at or above the counter of this map are kept, lower ones are
    /// reassigned from the counter so the moved landmarks always iterate after
    /// the existing ones. Returns the ids of the moved landmarks in the order
    /// of `other`.
    pub fn extend_from(&mut self, other: LandmarkMap) -> Vec<LandmarkId> {
        let mut ids = Vec::with_capacity(other.len());
        for (id, landmark) in other.landmarks {
            let id = if id.0 < self.next_id {
                LandmarkId(self.next_id)
            } else {
                id
            };
            self.next_id = id.0 + 1;
            self.landmarks.insert(id, landmark);
            ids.push(id);
        }
        ids
    }
}
