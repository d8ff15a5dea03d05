use std::fmt;
use thiserror::Error;

/// A single malformed-input condition found while setting up a solver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("matrix is missing")]
    MissingMatrix,
    #[error("matrix must have at least one row (found {0})")]
    NoRows(usize),
    #[error("matrix must have at least one column (found {0})")]
    NoColumns(usize),
    #[error("matrix must be square (found {rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },
    #[error("matrix is not in Compressed Sparse Column form")]
    Uncompressed,
    #[error("ignore list has an index less than zero: {0}")]
    NegativeIgnoreIndex(isize),
    #[error("ignore list has index {index} outside of the {rows}x{cols} matrix")]
    IgnoreIndexOutOfRange {
        index: isize,
        rows: usize,
        cols: usize,
    },
    #[error("tolerance must be a positive finite number (found {0:e})")]
    InvalidTolerance(f64),
}

/// Every [ValidationError] found during a single check, in the order they were discovered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: ValidationError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn contains(&self, err: &ValidationError) -> bool {
        self.errors.contains(err)
    }

    /// Recorded errors, in the order they were found
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(err: ValidationError) -> Self {
        Self { errors: vec![err] }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "check input data:")?;
        for err in self.errors.iter() {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation() {
        let mut errs = ValidationErrors::new();
        assert!(errs.clone().into_result().is_ok());

        errs.push(ValidationError::NoRows(0));
        errs.push(ValidationError::Uncompressed);

        assert_eq!(errs.len(), 2);
        assert!(errs.contains(&ValidationError::Uncompressed));
        assert_eq!(
            errs.iter().cloned().collect::<Vec<_>>(),
            vec![ValidationError::NoRows(0), ValidationError::Uncompressed]
        );

        let message = errs.to_string();
        assert!(message.contains("at least one row"));
        assert!(message.contains("Compressed Sparse Column"));
        assert!(errs.into_result().is_err());
    }
}
