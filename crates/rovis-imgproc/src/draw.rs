use rovis_image::Image;
use std::cmp::{max, min};

/// Set a pixel's color, ignoring coordinates outside of the image.
#[inline]
fn set_pixel<const C: usize>(img: &mut Image<u8, C>, x: i64, y: i64, color: [u8; C]) {
    if x >= 0 && x < img.cols() as i64 && y >= 0 && y < img.rows() as i64 {
        let start = (y as usize * img.cols() + x as usize) * C;
        img.as_slice_mut()[start..start + C].copy_from_slice(&color);
    }
}

/// Draws a line on an image inplace using Bresenham's line algorithm.
///
/// # Arguments
///
/// * `img` - The image to draw on.
/// * `p0` - The start point of the line as a tuple of (x, y).
/// * `p1` - The end point of the line as a tuple of (x, y).
/// * `color` - The color of the line as an array of `C` elements.
/// * `thickness` - The thickness of the line. Thickness above 1 is approximated with a square brush.
pub fn draw_line<const C: usize>(
    img: &mut Image<u8, C>,
    p0: (i64, i64),
    p1: (i64, i64),
    color: [u8; C],
    thickness: usize,
) {
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };

    let mut err = dx - dy;
    let half = if thickness > 1 {
        thickness as i64 / 2
    } else {
        0
    };

    loop {
        for i in -half..=half {
            for j in -half..=half {
                set_pixel(img, x0 + i, y0 + j, color);
            }
        }

        if x0 == x1 && y0 == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x0 += sx;
        }
        if e2 < dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draws a rectangle outline on an image inplace.
///
/// # Arguments
///
/// * `img` - The image to draw on.
/// * `top_left` - The top-left corner coordinates (x, y).
/// * `bottom_right` - The bottom-right corner coordinates (x, y), inclusive.
/// * `color` - The color of the rectangle outline.
/// * `thickness` - The thickness of the lines.
pub fn draw_rect<const C: usize>(
    img: &mut Image<u8, C>,
    top_left: (i64, i64),
    bottom_right: (i64, i64),
    color: [u8; C],
    thickness: usize,
) {
    let (x0, y0) = top_left;
    let (x1, y1) = bottom_right;

    let (lx0, lx1) = (min(x0, x1), max(x0, x1));
    let (ly0, ly1) = (min(y0, y1), max(y0, y1));

    draw_line(img, (lx0, ly0), (lx1, ly0), color, thickness);
    draw_line(img, (lx0, ly1), (lx1, ly1), color, thickness);
    draw_line(img, (lx0, ly0), (lx0, ly1), color, thickness);
    draw_line(img, (lx1, ly0), (lx1, ly1), color, thickness);
}
