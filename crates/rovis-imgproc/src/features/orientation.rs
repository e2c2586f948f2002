use std::f64::consts::PI;

use rovis_image::Image;

use super::FeatureError;

const WINDOW_RADIUS: i64 = 3;
const NUM_BINS: usize = 36;
const SIGMA: f64 = 1.5;

/// Compute the dominant gradient orientation around a pixel.
///
/// The central-difference gradients of the 7x7 window centered on `(x, y)` are
/// accumulated into a 36 bin histogram, weighted by their magnitude and a
/// gaussian of the distance to the center. The center of the peak bin is
/// returned, in radians in `[0, 2π)`.
///
/// # Errors
///
/// Returns [`FeatureError::OutOfBounds`] if the pixel is closer than 4 pixels to
/// the image border.
pub fn main_orientation<T>(image: &Image<T, 1>, x: usize, y: usize) -> Result<f32, FeatureError>
where
    T: Copy + Into<f64>,
{
    let margin = WINDOW_RADIUS as usize + 1;
    if x < margin || y < margin || x + margin >= image.width() || y + margin >= image.height() {
        return Err(FeatureError::OutOfBounds(x, y));
    }

    let data = image.as_slice();
    let cols = image.cols() as i64;
    let at = |px: i64, py: i64| -> f64 { data[(py * cols + px) as usize].into() };

    let mut histogram = [0.0f64; NUM_BINS];
    for dy in -WINDOW_RADIUS..=WINDOW_RADIUS {
        for dx in -WINDOW_RADIUS..=WINDOW_RADIUS {
            let (px, py) = (x as i64 + dx, y as i64 + dy);
            let gx = at(px + 1, py) - at(px - 1, py);
            let gy = at(px, py + 1) - at(px, py - 1);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }

            let angle = gy.atan2(gx).rem_euclid(2.0 * PI);
            let bin = ((angle / (2.0 * PI) * NUM_BINS as f64) as usize).min(NUM_BINS - 1);
            let weight = (-((dx * dx + dy * dy) as f64) / (2.0 * SIGMA * SIGMA)).exp();
            histogram[bin] += weight * magnitude;
        }
    }

    let mut peak = 0;
    for (i, &v) in histogram.iter().enumerate() {
        if v > histogram[peak] {
            peak = i;
        }
    }

    Ok(((peak as f64 + 0.5) * 2.0 * PI / NUM_BINS as f64) as f32)
}
