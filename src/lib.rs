//! Dominant eigenvalue and eigenvector of a square sparse matrix via the Power Method.
//!
//! Selected rows/columns can be ignored (held at zero), which removes those degrees of freedom from the problem without resizing the matrix.
//!
//! ```rust
//! use power_method::{Config, PowerMethod, Triplet};
//!
//! let mut t = Triplet::new(2, 2);
//! t.insert([0, 0], 13.0);
//! t.insert([0, 1], 5.0);
//! t.insert([1, 0], 2.0);
//! t.insert([1, 1], 4.0);
//! let a = t.compress();
//!
//! let mut pm = PowerMethod::factorize(Some(&a), Some(Config::new(1000, 1e-8)), &[]).unwrap();
//! pm.eigen().unwrap();
//!
//! assert!((pm.eigenvalue().unwrap() - 14.0).abs() < 1e-6);
//! ```

/// Sparse storage, the Power Method, and a dense reference solver
pub mod linalg;

pub use linalg::power_method::{Config, ConfigError, PowerMethod, PowerMethodError};
pub use linalg::sparse_matrix::{CscMatrix, SparseMatrixError, SparseOperator, Triplet};
pub use linalg::validation::{ValidationError, ValidationErrors};
pub use linalg::EigenPair;
