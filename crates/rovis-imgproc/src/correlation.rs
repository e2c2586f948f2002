use rayon::prelude::*;
use rovis_image::{Image, ImageError, ImageSize};
use serde::{Deserialize, Serialize};

/// Errors raised by the patch correlator.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CorrelationError {
    /// The patch does not fit inside the image or the search window.
    #[error("Patch of {patch} does not fit in a search area of {area}")]
    SizeMismatch {
        /// Size of the area the patch is searched in.
        area: ImageSize,
        /// Size of the patch.
        patch: ImageSize,
    },

    /// Correlation is only defined for single channel intensity images.
    #[error("Expected a single channel image, got {0} channels")]
    UnsupportedFormat(usize),

    /// Error raised by the underlying image.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Region of the image where the patch is searched.
///
/// The patch must lie entirely inside the window. Any negative field means the
/// window is unset and the whole image is searched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    /// Column of the top-left corner of the window.
    pub x: i32,
    /// Row of the top-left corner of the window.
    pub y: i32,
    /// Width of the window in pixels.
    pub width: i32,
    /// Height of the window in pixels.
    pub height: i32,
}

impl SearchWindow {
    /// A window covering the whole image.
    pub fn full() -> Self {
        Self {
            x: -1,
            y: -1,
            width: -1,
            height: -1,
        }
    }

    /// Create a window from its top-left corner and size.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn is_unset(&self) -> bool {
        self.x < 0 || self.y < 0 || self.width < 0 || self.height < 0
    }

    /// Resolve the window against the image bounds as `(x, y, width, height)`.
    fn clamp_to(&self, size: ImageSize) -> (usize, usize, usize, usize) {
        if self.is_unset() {
            return (0, 0, size.width, size.height);
        }
        let x = (self.x as usize).min(size.width);
        let y = (self.y as usize).min(size.height);
        let width = (self.width as usize).min(size.width - x);
        let height = (self.height as usize).min(size.height - y);
        (x, y, width, height)
    }
}

impl Default for SearchWindow {
    fn default() -> Self {
        Self::full()
    }
}

/// Best placement of a patch found by [`correlate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrelationMatch {
    /// Column of the top-left corner of the best placement.
    pub x: usize,
    /// Row of the top-left corner of the best placement.
    pub y: usize,
    /// Zero-mean normalized cross-correlation score in [-1, 1].
    pub score: f64,
}

/// Find the placement of `patch` inside `image` with maximal normalized cross-correlation.
///
/// The score is the zero-mean normalized cross-correlation, bounded in [-1, 1].
/// A placement whose pixels are constant scores 0, except when the patch is
/// constant as well, in which case it scores 1. Ties are resolved in favour of the
/// first placement in row-major order.
///
/// # Arguments
///
/// * `image` - The single channel image to search in.
/// * `patch` - The single channel patch to look for.
/// * `window` - The region of the image to search. Use [`SearchWindow::full`] for the whole image.
///
/// # Errors
///
/// * [`CorrelationError::UnsupportedFormat`] if the images are not single channel.
/// * [`CorrelationError::SizeMismatch`] if the patch is larger than the image or the window.
///
/// # Example
///
/// ```
/// use rovis_image::{Image, ImageSize};
/// use rovis_imgproc::correlation::{correlate, SearchWindow};
///
/// let image = Image::<u8, 1>::new(
///     ImageSize { width: 4, height: 3 },
///     vec![0, 0, 0, 0, 0, 9, 1, 0, 0, 2, 7, 0],
/// ).unwrap();
/// let patch = image.region(1, 1, ImageSize { width: 2, height: 2 }).unwrap();
///
/// let best = correlate(&image, &patch, SearchWindow::full()).unwrap();
/// assert_eq!((best.x, best.y), (1, 1));
/// ```
pub fn correlate<T, const C: usize>(
    image: &Image<T, C>,
    patch: &Image<T, C>,
    window: SearchWindow,
) -> Result<CorrelationMatch, CorrelationError>
where
    T: Copy + Into<f64> + Send + Sync,
{
    if C != 1 {
        return Err(CorrelationError::UnsupportedFormat(C));
    }

    if patch.width() > image.width() || patch.height() > image.height() {
        return Err(CorrelationError::SizeMismatch {
            area: image.size(),
            patch: patch.size(),
        });
    }

    let (wx, wy, ww, wh) = window.clamp_to(image.size());
    if patch.width() > ww || patch.height() > wh || patch.width() == 0 || patch.height() == 0 {
        return Err(CorrelationError::SizeMismatch {
            area: ImageSize {
                width: ww,
                height: wh,
            },
            patch: patch.size(),
        });
    }

    let patch_data = patch.as_slice();
    let n = patch_data.len() as f64;
    let patch_mean = patch_data.iter().map(|&v| v.into()).sum::<f64>() / n;
    let patch_var = patch_data
        .iter()
        .map(|&v| (v.into() - patch_mean).powi(2))
        .sum::<f64>();

    let last_x = wx + ww - patch.width();
    let last_y = wy + wh - patch.height();

    // best placement of every candidate row, reduced below in row-major order
    let row_best = (wy..=last_y)
        .into_par_iter()
        .map(|y| {
            let mut best: Option<CorrelationMatch> = None;
            for x in wx..=last_x {
                let score = ncc_at(image, patch_data, patch.size(), patch_mean, patch_var, x, y);
                if best.map_or(true, |b| score > b.score) {
                    best = Some(CorrelationMatch { x, y, score });
                }
            }
            best
        })
        .collect::<Vec<_>>();

    let mut best = CorrelationMatch {
        x: wx,
        y: wy,
        score: f64::NEG_INFINITY,
    };
    for candidate in row_best.into_iter().flatten() {
        if candidate.score > best.score {
            best = candidate;
        }
    }

    Ok(best)
}

fn ncc_at<T, const C: usize>(
    image: &Image<T, C>,
    patch: &[T],
    patch_size: ImageSize,
    patch_mean: f64,
    patch_var: f64,
    x: usize,
    y: usize,
) -> f64
where
    T: Copy + Into<f64>,
{
    let data = image.as_slice();
    let cols = image.cols();
    let n = (patch_size.width * patch_size.height) as f64;

    let mut sum = 0.0;
    for row in 0..patch_size.height {
        let offset = (y + row) * cols + x;
        sum += data[offset..offset + patch_size.width]
            .iter()
            .map(|&v| v.into())
            .sum::<f64>();
    }
    let mean = sum / n;

    let mut cross = 0.0;
    let mut var = 0.0;
    for row in 0..patch_size.height {
        let offset = (y + row) * cols + x;
        let image_row = &data[offset..offset + patch_size.width];
        let patch_row = &patch[row * patch_size.width..(row + 1) * patch_size.width];
        for (&a, &b) in image_row.iter().zip(patch_row.iter()) {
            let da = a.into() - mean;
            cross += da * (b.into() - patch_mean);
            var += da * da;
        }
    }

    match (var > f64::EPSILON, patch_var > f64::EPSILON) {
        (true, true) => (cross / (var * patch_var).sqrt()).clamp(-1.0, 1.0),
        (false, false) => 1.0,
        _ => 0.0,
    }
}
