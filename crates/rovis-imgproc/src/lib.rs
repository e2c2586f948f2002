#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// normalized cross-correlation patch search.
pub mod correlation;

/// utilities to draw on images.
pub mod draw;

/// feature lists, filtering and correspondence matching.
pub mod features;

/// image flipping module.
pub mod flip;
