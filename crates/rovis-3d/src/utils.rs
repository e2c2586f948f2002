/// View a row-major 3x3 array as a faer matrix.
pub fn array33_to_faer_mat33(array: &[[f64; 3]; 3]) -> faer::MatRef<'_, f64> {
    // SAFETY: the rows of a [[f64; 3]; 3] are contiguous, 9 values in row-major order
    let array_slice =
        unsafe { std::slice::from_raw_parts(array.as_ptr() as *const f64, array.len() * 3) };
    faer::mat::from_row_major_slice(array_slice, 3, 3)
}

/// Copy a 3x3 faer matrix into a row-major array.
pub fn faer_mat33_to_array33(mat: faer::MatRef<'_, f64>) -> [[f64; 3]; 3] {
    let mut array = [[0.0; 3]; 3];
    for (i, row) in array.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = mat.read(i, j);
        }
    }
    array
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array33_roundtrip() {
        let array = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let mat = array33_to_faer_mat33(&array);
        assert_eq!(mat.read(0, 1), 2.0);
        assert_eq!(mat.read(1, 0), 4.0);
        assert_eq!(mat.read(2, 2), 9.0);
        assert_eq!(faer_mat33_to_array33(mat), array);
        assert_eq!(faer_mat33_to_array33(mat.transpose())[0], [1.0, 4.0, 7.0]);
    }
}
