use crate::utils;

/// Multiply two 3x3 matrices.
pub fn mat33_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let product = utils::array33_to_faer_mat33(a) * utils::array33_to_faer_mat33(b);
    utils::faer_mat33_to_array33(product.as_ref())
}

/// A 3x3 diagonal matrix.
pub fn diag33(diagonal: [f64; 3]) -> [[f64; 3]; 3] {
    [
        [diagonal[0], 0.0, 0.0],
        [0.0, diagonal[1], 0.0],
        [0.0, 0.0, diagonal[2]],
    ]
}

/// First order propagation of a covariance through a linear map, `J C J^T`.
///
/// # Arguments
///
/// * `jacobian` - The jacobian `J` of the map at the linearization point.
/// * `covariance` - The covariance `C` of the input.
pub fn propagate_covariance(
    jacobian: &[[f64; 3]; 3],
    covariance: &[[f64; 3]; 3],
) -> [[f64; 3]; 3] {
    let j = utils::array33_to_faer_mat33(jacobian);
    let c = utils::array33_to_faer_mat33(covariance);
    let jc = j * c;
    let jcjt = jc.as_ref() * j.transpose();
    utils::faer_mat33_to_array33(jcjt.as_ref())
}
