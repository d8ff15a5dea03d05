use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::sync::mpsc::channel;

use bytes::{BufMut, BytesMut};
use rayon::prelude::*;
use thiserror::Error;

/// PETSc class id for a binary AIJ matrix file
pub const PETSC_MAT_CLASS_ID: u32 = 1211216;

/// The interface the eigensolvers use to interact with a sparse matrix
///
/// Implementors are never mutated by a solve; they are only multiplied against.
pub trait SparseOperator {
    /// Number of rows and columns
    fn dims(&self) -> (usize, usize);

    /// True when the matrix is still in its assembly (triplet) representation
    fn is_uncompressed(&self) -> bool;

    /// For each stored entry `(i, j, value)`: `into[i] += value * x[j]`
    ///
    /// `into` is zeroed beforehand when `clear_first` is set.
    fn multiply_accumulate(
        &self,
        x: &[f64],
        into: &mut [f64],
        clear_first: bool,
    ) -> Result<(), SparseMatrixError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
/// Error type for sparse matrix construction and products
pub enum SparseMatrixError {
    #[error("dimension mismatch: matrix is {rows}x{cols}, x has length {x_len}, output has length {into_len}")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        x_len: usize,
        into_len: usize,
    },
    #[error("unable to parse triplet on line {line}: {detail}")]
    Parse { line: usize, detail: String },
    #[error("io error while reading triplets: {0}")]
    Io(String),
}

/// Coordinate-form sparse matrix used during assembly
///
/// Entries at the same coordinates are summed. A `Triplet` must be [compressed](Triplet::compress) before it can be handed to a solver.
#[derive(Clone, Debug)]
pub struct Triplet {
    rows: usize,
    cols: usize,
    entries: BTreeMap<[usize; 2], f64>,
}

impl Triplet {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            entries: BTreeMap::new(),
        }
    }

    /// Number of distinct coordinates that have been assigned a value
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Insert a value into the matrix. Values inserted at the same coordinates are summed.
    pub fn insert(&mut self, [row_idx, col_idx]: [usize; 2], value: f64) {
        assert!(
            row_idx < self.rows,
            "row_idx exceeded matrix dimension; cannot insert value!"
        );
        assert!(
            col_idx < self.cols,
            "col_idx exceeded matrix dimension; cannot insert value!"
        );

        *self.entries.entry([row_idx, col_idx]).or_insert(0.0) += value;
    }

    /// Insert a group of entries
    pub fn insert_group(&mut self, entry_group: Vec<([usize; 2], f64)>) {
        for (coordinates, value) in entry_group {
            self.insert(coordinates, value);
        }
    }

    // Remove the entries from the matrix, replacing them with an empty BTreeMap.
    fn take_entries(&mut self) -> BTreeMap<[usize; 2], f64> {
        std::mem::take(&mut self.entries)
    }

    /// Consume the entries from another triplet leaving it empty.
    pub fn consume_matrix(&mut self, other: &mut Self) {
        assert!(
            self.rows == other.rows && self.cols == other.cols,
            "Triplets have different dimensions; cannot consume matrix!"
        );

        for (coordinates, value) in other.take_entries() {
            *self.entries.entry(coordinates).or_insert(0.0) += value;
        }
    }

    /// Parse a whitespace separated list of `row col value` lines
    ///
    /// The dimensions are inferred from the largest row and column indices. Blank lines are skipped.
    ///
    /// ```text
    /// 0 0 1
    /// 0 1 2
    /// 1 0 3
    /// 1 1 4
    /// ```
    pub fn load(reader: impl BufRead) -> Result<Self, SparseMatrixError> {
        let mut parsed = Vec::new();
        let [mut rows, mut cols] = [0, 0];

        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| SparseMatrixError::Io(e.to_string()))?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens.len() != 3 {
                return Err(SparseMatrixError::Parse {
                    line: line_idx + 1,
                    detail: format!("expected 3 values, found {}", tokens.len()),
                });
            }

            let parse_err = |detail: String| SparseMatrixError::Parse {
                line: line_idx + 1,
                detail,
            };
            let r: usize = tokens[0].parse().map_err(|e| parse_err(format!("row: {e}")))?;
            let c: usize = tokens[1].parse().map_err(|e| parse_err(format!("col: {e}")))?;
            let v: f64 = tokens[2].parse().map_err(|e| parse_err(format!("value: {e}")))?;

            let (r_end, c_end) = r
                .checked_add(1)
                .zip(c.checked_add(1))
                .ok_or_else(|| parse_err(format!("index ({r}, {c}) overflows the matrix size")))?;
            rows = rows.max(r_end);
            cols = cols.max(c_end);
            parsed.push(([r, c], v));
        }

        let mut triplet = Self::new(rows, cols);
        triplet.insert_group(parsed);
        Ok(triplet)
    }

    /// Convert into Compressed Sparse Column form. Explicit zeros are dropped.
    pub fn compress(&self) -> CscMatrix {
        let mut col_counts = vec![0; self.cols];
        for ([_, c], _) in self.entries.iter().filter(|(_, v)| **v != 0.0) {
            col_counts[*c] += 1;
        }

        let mut col_ptrs = Vec::with_capacity(self.cols + 1);
        col_ptrs.push(0);
        for count in col_counts.iter() {
            col_ptrs.push(col_ptrs.last().copied().unwrap_or(0) + count);
        }

        let nnz = col_ptrs[self.cols];
        let mut row_indices = vec![0; nnz];
        let mut values = vec![0.0; nnz];
        let mut next_slot = col_ptrs.clone();

        // BTreeMap iteration is row-major, so rows land sorted within each column
        for ([r, c], v) in self.entries.iter().filter(|(_, v)| **v != 0.0) {
            let slot = next_slot[*c];
            row_indices[slot] = *r;
            values[slot] = *v;
            next_slot[*c] += 1;
        }

        CscMatrix {
            rows: self.rows,
            cols: self.cols,
            col_ptrs,
            row_indices,
            values,
        }
    }
}

impl SparseOperator for Triplet {
    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn is_uncompressed(&self) -> bool {
        true
    }

    fn multiply_accumulate(
        &self,
        x: &[f64],
        into: &mut [f64],
        clear_first: bool,
    ) -> Result<(), SparseMatrixError> {
        check_product_dims(self.rows, self.cols, x, into)?;
        if clear_first {
            into.iter_mut().for_each(|v| *v = 0.0);
        }
        for ([r, c], v) in self.entries.iter() {
            into[*r] += v * x[*c];
        }
        Ok(())
    }
}

impl ParallelExtend<Triplet> for Triplet {
    fn par_extend<I>(&mut self, contributions: I)
    where
        I: IntoParallelIterator<Item = Triplet>,
    {
        let (sender, receiver) = channel();

        contributions
            .into_par_iter()
            .for_each_with(sender, |s, contribution| {
                s.send(contribution).expect(
                    "Failed to send sub-matrices over MSPC channel; cannot construct Matrix!",
                )
            });

        receiver
            .iter()
            .for_each(|mut contribution| self.consume_matrix(&mut contribution));
    }
}

/// Compressed Sparse Column matrix
///
/// Column `j` spans `col_ptrs[j]..col_ptrs[j + 1]` in `row_indices` and `values`. Row indices are sorted within each column.
#[derive(Clone, Debug, PartialEq)]
pub struct CscMatrix {
    pub rows: usize,
    pub cols: usize,
    pub col_ptrs: Vec<usize>,
    pub row_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl CscMatrix {
    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over `(row, col, value)` in column-major order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.cols).flat_map(move |c| {
            (self.col_ptrs[c]..self.col_ptrs[c + 1])
                .map(move |idx| (self.row_indices[idx], c, self.values[idx]))
        })
    }

    /// Write the matrix to a PETSc binary file
    pub fn print_to_petsc_binary_file(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        AIJMatrixBinary::from(self).print_to_petsc_binary_file(path)
    }
}

impl SparseOperator for CscMatrix {
    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn is_uncompressed(&self) -> bool {
        false
    }

    fn multiply_accumulate(
        &self,
        x: &[f64],
        into: &mut [f64],
        clear_first: bool,
    ) -> Result<(), SparseMatrixError> {
        check_product_dims(self.rows, self.cols, x, into)?;
        if clear_first {
            into.iter_mut().for_each(|v| *v = 0.0);
        }
        for (c, &x_c) in x.iter().enumerate() {
            if x_c == 0.0 {
                continue;
            }
            for idx in self.col_ptrs[c]..self.col_ptrs[c + 1] {
                into[self.row_indices[idx]] += self.values[idx] * x_c;
            }
        }
        Ok(())
    }
}

fn check_product_dims(
    rows: usize,
    cols: usize,
    x: &[f64],
    into: &[f64],
) -> Result<(), SparseMatrixError> {
    if x.len() != cols || into.len() != rows {
        Err(SparseMatrixError::DimensionMismatch {
            rows,
            cols,
            x_len: x.len(),
            into_len: into.len(),
        })
    } else {
        Ok(())
    }
}

/// Petsc/Slepc Sparse Matrix Format
pub struct AIJMatrixBinary {
    pub a: Vec<f64>,
    pub i: Vec<u32>, // Number of entries on each row (compute a prefix sum to get canonical form)
    pub j: Vec<u32>,
    pub rows: usize,
    pub cols: usize,
}

impl From<&CscMatrix> for AIJMatrixBinary {
    fn from(csc: &CscMatrix) -> Self {
        // PETSc expects row-major order; sort by row then column
        let row_major: BTreeMap<[usize; 2], f64> =
            csc.iter().map(|(r, c, v)| ([r, c], v)).collect();

        let mut row_counts = vec![0; csc.rows];
        for [r, _] in row_major.keys() {
            row_counts[*r] += 1;
        }

        let (j, a) = row_major.iter().map(|([_, c], v)| (*c as u32, *v)).unzip();

        Self {
            a,
            i: row_counts,
            j,
            rows: csc.rows,
            cols: csc.cols,
        }
    }
}

impl AIJMatrixBinary {
    pub fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        // header
        let mut header_buf = BytesMut::with_capacity(16);
        header_buf.put_u32(PETSC_MAT_CLASS_ID);
        header_buf.put_u32(self.rows as u32);
        header_buf.put_u32(self.cols as u32);
        header_buf.put_u32(self.a.len() as u32);
        writer.write_all(header_buf.as_ref())?;

        // num-non-zero entries on each row
        let mut rnnz_buf = BytesMut::with_capacity(self.i.len() * 4);
        for &rnz in self.i.iter() {
            rnnz_buf.put_u32(rnz);
        }
        writer.write_all(rnnz_buf.as_ref())?;

        // column indices of non-zero entries
        let mut j_buf = BytesMut::with_capacity(self.j.len() * 4);
        for &j in self.j.iter() {
            j_buf.put_u32(j);
        }
        writer.write_all(j_buf.as_ref())?;

        // non-zero entries
        let mut a_buf = BytesMut::with_capacity(self.a.len() * 8);
        for &a in self.a.iter() {
            a_buf.put_f64(a);
        }
        writer.write_all(a_buf.as_ref())?;

        Ok(())
    }

    pub fn print_to_petsc_binary_file(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    fn small_triplet() -> Triplet {
        let mut t = Triplet::new(3, 3);
        t.insert([0, 0], 2.0);
        t.insert([0, 1], 3.0);
        t.insert([1, 0], 3.0);
        t.insert([1, 2], 5.0);
        t.insert([2, 1], 5.0);
        t.insert([2, 2], 2.0);
        t
    }

    #[test]
    fn value_insertion() {
        let mut t = Triplet::new(10, 10);

        t.insert([0, 0], 1.0);
        t.insert([0, 0], 1.0);
        t.insert([9, 9], 10.0);
        t.insert([4, 3], 0.25);
        t.insert([0, 8], 0.125);
        t.insert([8, 0], 0.125);

        let raw_entries = t.take_entries();

        assert!((raw_entries.get(&[0, 0]).unwrap() - 2.0).abs() < 1e-15);
        assert!((raw_entries.get(&[9, 9]).unwrap() - 10.0).abs() < 1e-15);
        assert!((raw_entries.get(&[4, 3]).unwrap() - 0.25).abs() < 1e-15);
        assert!((raw_entries.get(&[0, 8]).unwrap() - 0.125).abs() < 1e-15);
        assert!((raw_entries.get(&[8, 0]).unwrap() - 0.125).abs() < 1e-15);
        assert!(raw_entries.get(&[3, 4]).is_none());
    }

    #[test]
    fn consume_another_matrix() {
        let mut t_a = Triplet::new(5, 5);
        let mut t_b = Triplet::new(5, 5);

        for i in 0..5 {
            t_a.insert([i, i], (i + 1) as f64);
            t_b.insert([i, i], (5 - i) as f64);
        }
        t_a.insert([0, 4], 0.5);
        t_b.insert([0, 4], -0.5);
        t_b.insert([2, 3], -0.5);

        t_a.consume_matrix(&mut t_b);

        assert_eq!(t_b.num_entries(), 0);

        let entries = t_a.take_entries();
        for i in 0..5 {
            assert!((entries.get(&[i, i]).unwrap() - 6.0).abs() < 1e-15);
        }
        assert!(entries.get(&[0, 4]).unwrap().abs() < 1e-15);
        assert!((entries.get(&[2, 3]).unwrap() + 0.5).abs() < 1e-15);
    }

    #[test]
    #[should_panic]
    fn consume_matrix_of_different_dim() {
        let mut t_a = Triplet::new(5, 5);
        let mut t_b = Triplet::new(6, 6);

        t_a.consume_matrix(&mut t_b);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_insertion() {
        let mut t = Triplet::new(10, 10);
        t.insert([10, 2], 1.0);
    }

    #[test]
    fn compression_layout() {
        let mut t = small_triplet();
        t.insert([1, 1], 0.0);
        let csc = t.compress();

        assert_eq!(csc.col_ptrs, vec![0, 2, 4, 6]);
        assert_eq!(csc.row_indices, vec![0, 1, 0, 2, 1, 2]);
        assert_eq!(csc.values, vec![2.0, 3.0, 3.0, 5.0, 5.0, 2.0]);
        assert_eq!(csc.nnz(), 6);
        assert!(!csc.is_uncompressed());
        assert!(t.is_uncompressed());
    }

    #[test]
    fn products_agree() {
        let t = small_triplet();
        let csc = t.compress();
        let x = [1.0, -2.0, 0.5];

        let mut from_triplet = vec![0.0; 3];
        let mut from_csc = vec![100.0; 3];
        t.multiply_accumulate(&x, &mut from_triplet, false).unwrap();
        csc.multiply_accumulate(&x, &mut from_csc, true).unwrap();

        assert_eq!(from_triplet, vec![-4.0, 5.5, -9.0]);
        assert_eq!(from_csc, from_triplet);
    }

    #[test]
    fn product_accumulates_without_clearing() {
        let csc = small_triplet().compress();
        let mut y = vec![1.0, 1.0, 1.0];
        csc.multiply_accumulate(&[1.0, 0.0, 0.0], &mut y, false)
            .unwrap();
        assert_eq!(y, vec![3.0, 4.0, 1.0]);
    }

    #[test]
    fn product_dimension_mismatch() {
        let csc = small_triplet().compress();
        let mut y = vec![0.0; 2];
        let err = csc
            .multiply_accumulate(&[1.0, 1.0, 1.0], &mut y, true)
            .unwrap_err();
        assert!(matches!(
            err,
            SparseMatrixError::DimensionMismatch { into_len: 2, .. }
        ));
    }

    #[test]
    fn load_triplets() {
        let input = "0 0 1\n 0 1 2\n\n 1 0 3\n 1 1 4";
        let t = Triplet::load(input.as_bytes()).unwrap();
        assert_eq!(t.dims(), (2, 2));
        assert_eq!(t.num_entries(), 4);

        let empty = Triplet::load("".as_bytes()).unwrap();
        assert_eq!(empty.dims(), (0, 0));

        let err = Triplet::load("0 0\n".as_bytes()).unwrap_err();
        assert!(matches!(err, SparseMatrixError::Parse { line: 1, .. }));
        let err = Triplet::load("0 0 1\n0 x 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, SparseMatrixError::Parse { line: 2, .. }));

        let err = Triplet::load("0 0 1\n18446744073709551615 0 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, SparseMatrixError::Parse { line: 2, .. }));
        let err = Triplet::load("0 18446744073709551615 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, SparseMatrixError::Parse { line: 1, .. }));
    }

    #[test]
    fn parallel_assembly() {
        let mut global = Triplet::new(4, 4);
        global.par_extend((0..4).into_par_iter().map(|i| {
            let mut local = Triplet::new(4, 4);
            local.insert([i, i], 1.0);
            local.insert([0, 0], 1.0);
            local
        }));

        let entries = global.take_entries();
        assert!((entries.get(&[0, 0]).unwrap() - 5.0).abs() < 1e-15);
        for i in 1..4 {
            assert!((entries.get(&[i, i]).unwrap() - 1.0).abs() < 1e-15);
        }
    }

    #[test]
    fn petsc_binary_format() {
        let csc = small_triplet().compress();
        let aij = AIJMatrixBinary::from(&csc);
        assert_eq!(aij.i, vec![2, 2, 2]);
        assert_eq!(aij.j, vec![0, 1, 0, 2, 1, 2]);

        let mut buf = Vec::new();
        aij.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 16 + 3 * 4 + 6 * 4 + 6 * 8);

        let mut bytes = &buf[..];
        assert_eq!(bytes.get_u32(), PETSC_MAT_CLASS_ID);
        assert_eq!(bytes.get_u32(), 3);
        assert_eq!(bytes.get_u32(), 3);
        assert_eq!(bytes.get_u32(), 6);
    }
}
