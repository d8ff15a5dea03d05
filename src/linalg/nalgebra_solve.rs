use super::sparse_matrix::CscMatrix;
use nalgebra::DMatrix;
use num_complex::Complex64;
use std::cmp::Ordering;
use std::fmt;

// TODO: assemble the sub-matrix with nalgebra-sparse instead of densifying it
const MAX_DENSE_SIZE: usize = 1000;

/// Dominant (largest modulus) eigenvalue of the principal sub-matrix of `matrix` with the `ignore` rows and columns removed
///
/// This casts the sparse matrix as a dense matrix and computes its full (complex) spectrum via a Schur decomposition.
/// It is only recommended for small problems, chiefly to cross-check the Power Method.
pub fn nalgebra_dominant_eigenvalue(
    matrix: &CscMatrix,
    ignore: &[usize],
) -> Result<Complex64, NalgebraEigenError> {
    if matrix.rows != matrix.cols {
        return Err(NalgebraEigenError::NotSquare);
    }

    // position of each kept row/column in the dense sub-matrix
    let mut position = vec![None; matrix.rows];
    let mut num_kept = 0;
    for (idx, pos) in position.iter_mut().enumerate() {
        if !ignore.contains(&idx) {
            *pos = Some(num_kept);
            num_kept += 1;
        }
    }

    if num_kept == 0 {
        return Err(NalgebraEigenError::EmptyProblem);
    }
    if num_kept > MAX_DENSE_SIZE {
        return Err(NalgebraEigenError::ProblemTooLarge);
    }

    let mut dense = DMatrix::<f64>::zeros(num_kept, num_kept);
    for (r, c, v) in matrix.iter() {
        if let (Some(pr), Some(pc)) = (position[r], position[c]) {
            dense[(pr, pc)] += v;
        }
    }

    dense
        .complex_eigenvalues()
        .iter()
        .copied()
        .max_by(|a, b| a.norm().partial_cmp(&b.norm()).unwrap_or(Ordering::Equal))
        .ok_or(NalgebraEigenError::EmptyProblem)
}

#[derive(Debug, Clone, PartialEq)]
/// Error type for the dense Nalgebra eigenvalue solver
pub enum NalgebraEigenError {
    NotSquare,
    EmptyProblem,
    ProblemTooLarge,
}

impl std::fmt::Display for NalgebraEigenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotSquare => write!(f, "Matrix is not square; Cannot Solve!"),
            Self::EmptyProblem => write!(f, "Every row and column was ignored; Cannot Solve!"),
            Self::ProblemTooLarge => write!(
                f,
                "Matrices Exceeded Maximum Size ({}x{}); Cannot Solve!",
                MAX_DENSE_SIZE, MAX_DENSE_SIZE
            ),
        }
    }
}

impl std::error::Error for NalgebraEigenError {}
