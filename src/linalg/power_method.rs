/// Power Method settings and their JSON loader
pub mod config;
/// Vector Normalization and small vector kernels used by the iteration
pub mod normalize;

pub use config::{Config, ConfigError};

use super::sparse_matrix::{SparseMatrixError, SparseOperator};
use super::validation::{ValidationError, ValidationErrors};
use super::EigenPair;
use normalize::{dot, first_norm_delta, one_max, zero_ignored, zeroize};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, trace};

/// The expected number of ignored degrees of freedom. This determines the stack allocation size of the ignore list.
pub const EXPECTED_NUM_IGNORED: usize = 8;

#[derive(Debug, Error)]
/// Error type for the Power Method
pub enum PowerMethodError {
    /// One or more malformed inputs were passed to [PowerMethod::factorize]
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
    /// No convergence within `iteration_max` iterations
    #[error("power method did not converge; iteration: {iteration}, max iteration: {iteration_max}, delta: {delta:e}, tolerance: {tolerance:e}")]
    IterationLimit {
        iteration: u64,
        iteration_max: u64,
        /// Change in the first-norm delta at the last iteration
        delta: f64,
        tolerance: f64,
    },
    /// The iterate vanished or became non-finite; the (ignore-reduced) problem has no usable dominant mode
    #[error("numerical breakdown: {detail}")]
    NumericalBreakdown { detail: String },
    /// A panic was caught during setup or iteration
    #[error("internal fault: {0}")]
    InternalFault(String),
    #[error(transparent)]
    Sparse(#[from] SparseMatrixError),
}

/// Power Method for approximating the dominant eigenvalue of a sparse matrix `A`
///
/// Rows and columns listed in the ignore set are removed from the problem by forcing their entries to zero around every product.
/// This is equivalent to solving on the principal sub-matrix with those rows and columns deleted; `A` is never modified or resized.
///
/// ```text
/// x(0) : random initial vector
/// k = 1
/// until |δ(k-1) - δ(k)| < ɛ:
///     x(k) = A · x(k-1)
///     δ(k) = || x(k) - x(k-1) ||1
///     k = k + 1
/// λ = (Ax · x) / (x · x)
/// ```
///
/// See: Sepandar D. Kamvar, Taher H. Haveliwala, Christopher D. Manning, Gene H. Golub,
/// "Extrapolation Methods for Accelerating PageRank Computations"
#[derive(Debug)]
pub struct PowerMethod<'a, M: SparseOperator + ?Sized> {
    a: &'a M,
    ignore: SmallVec<[usize; EXPECTED_NUM_IGNORED]>,
    config: Config,
    solution: Option<EigenPair>,
    iterations: Option<u64>,
}

impl<'a, M: SparseOperator + ?Sized> PowerMethod<'a, M> {
    /// Validate the inputs and set up the solver
    ///
    /// Every malformed input is reported together in a single [PowerMethodError::Validation].
    /// The ignore list may be given in any order and may contain duplicates. `None` for the config uses [Config::default].
    pub fn factorize(
        a: Option<&'a M>,
        config: Option<Config>,
        ignore: &[isize],
    ) -> Result<Self, PowerMethodError> {
        catch_fault(|| Self::factorize_inner(a, config, ignore))
    }

    fn factorize_inner(
        a: Option<&'a M>,
        config: Option<Config>,
        ignore: &[isize],
    ) -> Result<Self, PowerMethodError> {
        let config = config.unwrap_or_default();

        let mut sorted_ignore = ignore.to_vec();
        sorted_ignore.sort_unstable();

        check_inputs(a, &config, &sorted_ignore).into_result()?;
        let a = a.ok_or_else(|| ValidationErrors::from(ValidationError::MissingMatrix))?;

        sorted_ignore.dedup();
        let ignore: SmallVec<[usize; EXPECTED_NUM_IGNORED]> =
            sorted_ignore.into_iter().map(|i| i as usize).collect();

        let (rows, cols) = a.dims();
        debug!(
            rows,
            cols,
            ignored = ignore.len(),
            iteration_max = config.iteration_max,
            tolerance = config.tolerance,
            "power method factorized"
        );

        Ok(Self {
            a,
            ignore,
            config,
            solution: None,
            iterations: None,
        })
    }

    /// Run the Power Method, storing the eigenvalue and eigenvector on success
    ///
    /// Any previous solution is discarded first, so nothing is readable after a failure.
    pub fn eigen(&mut self) -> Result<(), PowerMethodError> {
        self.solution = None;
        self.iterations = None;

        let (a, ignore, config) = (self.a, &self.ignore[..], &self.config);
        let (solution, iterations) = catch_fault(|| power_iterate(a, ignore, config))?;

        self.solution = Some(solution);
        self.iterations = Some(iterations);
        Ok(())
    }

    /// Dominant eigenvalue (after a successful [PowerMethod::eigen])
    pub fn eigenvalue(&self) -> Option<f64> {
        self.solution.as_ref().map(|s| s.value)
    }

    /// Eigenvector of the dominant eigenvalue, scaled such that its largest entry is `1.0` (after a successful [PowerMethod::eigen])
    pub fn eigenvector(&self) -> Option<&[f64]> {
        self.solution.as_ref().map(|s| s.vector.as_slice())
    }

    /// Eigenvalue and eigenvector together (after a successful [PowerMethod::eigen])
    pub fn eigen_pair(&self) -> Option<&EigenPair> {
        self.solution.as_ref()
    }

    /// Consume the solver, keeping only its solution
    pub fn into_eigen_pair(self) -> Option<EigenPair> {
        self.solution
    }

    /// Number of iterations the last successful solve needed to converge
    pub fn iterations(&self) -> Option<u64> {
        self.iterations
    }

    /// Sorted, de-duplicated ignore list
    pub fn ignored(&self) -> &[usize] {
        &self.ignore
    }

    /// Settings in effect (the defaults if none were given to [PowerMethod::factorize])
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The borrowed matrix `A`
    pub fn matrix(&self) -> &'a M {
        self.a
    }
}

fn check_inputs<M: SparseOperator + ?Sized>(
    a: Option<&M>,
    config: &Config,
    sorted_ignore: &[isize],
) -> ValidationErrors {
    let mut errs = ValidationErrors::new();

    if let Some(&first) = sorted_ignore.first() {
        if first < 0 {
            errs.push(ValidationError::NegativeIgnoreIndex(first));
        }
    }

    match a {
        None => errs.push(ValidationError::MissingMatrix),
        Some(a) => {
            let (rows, cols) = a.dims();
            if rows == 0 {
                errs.push(ValidationError::NoRows(rows));
            }
            if cols == 0 {
                errs.push(ValidationError::NoColumns(cols));
            }
            if rows != cols {
                errs.push(ValidationError::NotSquare { rows, cols });
            }
            if a.is_uncompressed() {
                errs.push(ValidationError::Uncompressed);
            }
            if let Some(&last) = sorted_ignore.last() {
                if last >= 0 && ((last as usize) >= rows || (last as usize) >= cols) {
                    errs.push(ValidationError::IgnoreIndexOutOfRange {
                        index: last,
                        rows,
                        cols,
                    });
                }
            }
        }
    }

    if !(config.tolerance > 0.0 && config.tolerance.is_finite()) {
        errs.push(ValidationError::InvalidTolerance(config.tolerance));
    }

    errs
}

fn power_iterate<M: SparseOperator + ?Sized>(
    a: &M,
    ignore: &[usize],
    config: &Config,
) -> Result<(EigenPair, u64), PowerMethodError> {
    let (rows, _) = a.dims();

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut x: Vec<f64> = (0..rows).map(|_| rng.gen::<f64>() - 0.5).collect();
    let mut x_next = vec![0.0; rows];
    one_max(&mut x);

    let mut delta_last = 1.0;
    let mut iteration: u64 = 0;

    loop {
        step(a, ignore, &mut x, &mut x_next)?;
        let delta = normalized_delta(&mut x, &mut x_next, iteration)?;
        trace!(iteration, delta, "power method iteration");

        if (delta_last - delta).abs() < config.tolerance {
            break;
        }
        if iteration >= config.iteration_max {
            return Err(PowerMethodError::IterationLimit {
                iteration,
                iteration_max: config.iteration_max,
                delta: (delta_last - delta).abs(),
                tolerance: config.tolerance,
            });
        }

        delta_last = delta;
        iteration += 1;
    }

    // Rayleigh quotient: λ = (Ax · x) / (x · x)
    // x_next holds the converged x; x holds A·x
    step(a, ignore, &mut x, &mut x_next)?;
    let up = dot(&x, &x_next);

    one_max(&mut x);
    let down = dot(&x, &x);

    if down == 0.0 || up.is_nan() {
        return Err(PowerMethodError::NumericalBreakdown {
            detail: format!("Rayleigh quotient is not acceptable: {up:e} / {down:e}"),
        });
    }

    let value = up / down;
    one_max(&mut x);

    debug!(iterations = iteration, eigenvalue = value, "power method converged");

    Ok((EigenPair { value, vector: x }, iteration))
}

/// Normalize `x` and mask the ignored entries, then `x_next = A · x` (masked as well) and swap.
///
/// Afterwards `x` holds the new iterate and `x_next` the one it was computed from.
fn step<M: SparseOperator + ?Sized>(
    a: &M,
    ignore: &[usize],
    x: &mut Vec<f64>,
    x_next: &mut Vec<f64>,
) -> Result<(), SparseMatrixError> {
    one_max(x);
    zero_ignored(x, ignore);

    zeroize(x_next);
    a.multiply_accumulate(x, x_next, false)?;
    zero_ignored(x_next, ignore);

    std::mem::swap(x, x_next);
    Ok(())
}

fn normalized_delta(
    x: &mut [f64],
    x_next: &mut [f64],
    iteration: u64,
) -> Result<f64, PowerMethodError> {
    for scale in [one_max(x), one_max(x_next)] {
        if scale == 0.0 || !scale.is_finite() {
            return Err(PowerMethodError::NumericalBreakdown {
                detail: format!("iterate vanished at iteration {iteration} (scale: {scale:e})"),
            });
        }
    }

    let delta = first_norm_delta(x, x_next);
    if delta.is_finite() {
        Ok(delta)
    } else {
        Err(PowerMethodError::NumericalBreakdown {
            detail: format!("non-finite delta at iteration {iteration}"),
        })
    }
}

fn catch_fault<T>(
    f: impl FnOnce() -> Result<T, PowerMethodError>,
) -> Result<T, PowerMethodError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PowerMethodError::InternalFault(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic")
    }
}
