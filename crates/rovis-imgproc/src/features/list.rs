use std::collections::HashSet;

use rovis_image::Image;

use super::{FeatureError, FeatureList};
use crate::draw::draw_rect;

/// Mean and standard deviation of the feature coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dispersion {
    /// Mean of the (x, y) coordinates.
    pub mean: [f32; 2],
    /// Population standard deviation of the (x, y) coordinates.
    pub std: [f32; 2],
}

/// Remove the features that lie on the same coordinates as an earlier feature.
///
/// The first occurrence is kept and the relative order of the remaining features
/// is preserved, so applying the function twice gives the same result as once.
///
/// # Example
///
/// ```
/// use rovis_imgproc::features::{delete_repeated, Feature, FeatureList};
///
/// let list: FeatureList = vec![
///     Feature::new(0, 1.0, 2.0),
///     Feature::new(1, 3.0, 4.0),
///     Feature::new(2, 1.0, 2.0),
/// ]
/// .into();
///
/// let filtered = delete_repeated(&list);
/// assert_eq!(filtered.len(), 2);
/// assert_eq!(filtered[1].id.0, 1);
/// ```
pub fn delete_repeated(list: &FeatureList) -> FeatureList {
    // -0.0 and 0.0 share a coordinate, so compare on the normalized bit pattern
    let key = |v: f32| if v == 0.0 { 0u32 } else { v.to_bits() };

    let mut seen = HashSet::with_capacity(list.len());
    list.iter()
        .filter(|f| seen.insert((key(f.x), key(f.y))))
        .cloned()
        .collect()
}

/// Compute the dispersion of the feature coordinates.
///
/// The standard deviation is the population one, i.e. the squared deviations
/// are divided by the number of features.
///
/// # Errors
///
/// Returns [`FeatureError::EmptyInput`] if the list is empty.
pub fn dispersion(list: &FeatureList) -> Result<Dispersion, FeatureError> {
    if list.is_empty() {
        return Err(FeatureError::EmptyInput);
    }

    let n = list.len() as f64;
    let (sum_x, sum_y) = list
        .iter()
        .fold((0.0f64, 0.0f64), |(sx, sy), f| (sx + f.x as f64, sy + f.y as f64));
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);

    let (var_x, var_y) = list.iter().fold((0.0f64, 0.0f64), |(vx, vy), f| {
        (
            vx + (f.x as f64 - mean_x).powi(2),
            vy + (f.y as f64 - mean_y).powi(2),
        )
    });

    Ok(Dispersion {
        mean: [mean_x as f32, mean_y as f32],
        std: [(var_x / n).sqrt() as f32, (var_y / n).sqrt() as f32],
    })
}

/// Remove the correspondences whose rows differ by more than `threshold`.
///
/// Both lists must be correspondence-ordered. The entry `i` is removed from both
/// lists when `|left[i].y - right[i].y| > threshold`, which enforces the row
/// constraint of a rectified stereo pair.
///
/// # Errors
///
/// Returns [`FeatureError::LengthMismatch`] if the lists have different lengths.
/// The lists are left untouched in that case.
pub fn row_checking(
    left: &mut FeatureList,
    right: &mut FeatureList,
    threshold: f32,
) -> Result<(), FeatureError> {
    if left.len() != right.len() {
        return Err(FeatureError::LengthMismatch(left.len(), right.len()));
    }

    let keep = left
        .iter()
        .zip(right.iter())
        .map(|(l, r)| (l.y - r.y).abs() <= threshold)
        .collect::<Vec<_>>();

    let removed = keep.iter().filter(|k| !**k).count();
    if removed > 0 {
        log::debug!("row checking removed {} of {} pairs", removed, keep.len());
    }

    left.retain_indices(|i| keep[i]);
    right.retain_indices(|i| keep[i]);

    Ok(())
}

/// Draw a square marker around every feature of the list.
///
/// # Arguments
///
/// * `image` - The image to annotate. It is not modified.
/// * `list` - The features to draw.
/// * `color` - The marker color.
/// * `half_size` - Half of the marker side in pixels.
///
/// # Returns
///
/// A copy of the image with the markers drawn on it. Features whose marker
/// does not reach the image, or with non finite coordinates, are skipped.
pub fn draw_features<const C: usize>(
    image: &Image<u8, C>,
    list: &FeatureList,
    color: [u8; C],
    half_size: usize,
) -> Image<u8, C> {
    let mut out = image.clone();
    let half = i64::try_from(half_size).unwrap_or(i64::MAX);
    let (cols, rows) = (image.cols() as i64, image.rows() as i64);
    for feature in list {
        if !(feature.x.is_finite() && feature.y.is_finite()) {
            continue;
        }
        let (x, y) = (feature.x.round() as i64, feature.y.round() as i64);
        let (x0, x1) = (x.saturating_sub(half), x.saturating_add(half));
        let (y0, y1) = (y.saturating_sub(half), y.saturating_add(half));
        if x1 < 0 || y1 < 0 || x0 >= cols || y0 >= rows {
            continue;
        }
        draw_rect(&mut out, (x0, y0), (x1, y1), color, 1);
    }
    out
}
