use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};
use rovis_image::Image;

/// Flip the input image vertically, swapping the rows top to bottom.
///
/// This is the flip applied to images delivered bottom-up by some camera drivers.
///
/// # Arguments
///
/// * `src` - The input image with shape (H, W, C).
pub fn vertical_flip<T, const C: usize>(src: &Image<T, C>) -> Image<T, C>
where
    T: Copy + Send + Sync,
{
    let mut dst = src.clone();
    let row_len = src.cols() * C;
    if row_len == 0 {
        return dst;
    }

    let src_data = src.as_slice();
    let rows = src.rows();
    dst.as_slice_mut()
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(i, row)| {
            let offset = (rows - 1 - i) * row_len;
            row.copy_from_slice(&src_data[offset..offset + row_len]);
        });

    dst
}
