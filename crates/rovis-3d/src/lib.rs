#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pinhole camera intrinsics and default camera profiles.
pub mod camera;

/// Landmarks and landmark maps.
pub mod landmark;

/// Linear algebra utilities.
pub mod linalg;

/// Mean squared distance between 3D correspondences.
pub mod metrics;

/// Conversion of stereo correspondences into bearing-range observations.
pub mod observation;

/// Rigid 3D transforms.
pub mod pose;

/// Stereo triangulation of matched features.
pub mod stereo;

mod utils;
