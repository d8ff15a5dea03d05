/// Use Nalgebra's dense Schur decomposition as a reference solver (small problems only)
pub mod nalgebra_solve;
/// Power Method for the dominant eigenpair of a sparse matrix
pub mod power_method;
/// Sparse matrix assembly and Compressed Sparse Column storage
pub mod sparse_matrix;
/// Aggregated input validation
pub mod validation;

use bytes::{Buf, BufMut, BytesMut};
#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use sparse_matrix::{SparseMatrixError, SparseOperator};
use std::fs::File;
use std::io::{BufWriter, Read, Write};

/// PETSc class id for a binary vector file
pub const PETSC_VEC_CLASS_ID: i32 = 1211214;

/// Solution to an Eigenvalue Problem
#[derive(Clone, Debug, PartialEq)]
pub struct EigenPair {
    /// Eigenvalue
    pub value: f64,
    /// Eigenvector
    pub vector: Vec<f64>,
}

impl EigenPair {
    /// L2 normalized vector
    pub fn normalized_eigenvector(&self) -> Vec<f64> {
        let norm = self.vector.iter().map(|x| x.powi(2)).sum::<f64>().sqrt();
        self.vector.iter().map(|x| x / norm).collect()
    }

    /// `||A·v - λ·v||inf / ||v||inf`, skipping the `ignore`d rows
    pub fn residual_norm<M: SparseOperator + ?Sized>(
        &self,
        a: &M,
        ignore: &[usize],
    ) -> Result<f64, SparseMatrixError> {
        let mut av = vec![0.0; self.vector.len()];
        a.multiply_accumulate(&self.vector, &mut av, true)?;

        let max_residual = av
            .iter()
            .zip(self.vector.iter())
            .enumerate()
            .filter(|(i, _)| !ignore.contains(i))
            .map(|(_, (av_i, v_i))| (av_i - self.value * v_i).abs())
            .fold(0.0, f64::max);
        let max_v = self.vector.iter().fold(0.0, |m: f64, v| m.max(v.abs()));

        Ok(max_residual / max_v)
    }

    /// Produce a Json Object that describes this EigenPair
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "value": self.value,
            "vector": self.vector.clone(),
        }
    }

    /// Print the EigenPair to a JSON file specified by path.
    #[cfg(feature = "json_export")]
    pub fn export_to_json(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        self.to_json().write_pretty(&mut w, 4)?;
        w.flush()
    }

    /// Write the eigenvector in the PETSc binary vector format
    pub fn write_petsc_vector(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let mut buf = BytesMut::with_capacity(8 + self.vector.len() * 8);
        buf.put_i32(PETSC_VEC_CLASS_ID);
        buf.put_i32(self.vector.len() as i32);
        for &v in self.vector.iter() {
            buf.put_f64(v);
        }
        writer.write_all(buf.as_ref())
    }

    /// Print the eigenvector to a PETSc binary vector file specified by path
    pub fn print_to_petsc_binary_file(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_petsc_vector(&mut writer)?;
        writer.flush()
    }
}

/// Read a vector written in the PETSc binary vector format
pub fn read_petsc_vector(reader: &mut impl Read) -> std::io::Result<Vec<f64>> {
    let mut header_bytes = BytesMut::new();
    header_bytes.resize(8, 0);
    reader.read_exact(&mut header_bytes)?;

    if header_bytes.get_i32() != PETSC_VEC_CLASS_ID {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "not a PETSc vector file",
        ));
    }
    let m = header_bytes.get_i32().max(0) as usize;

    // only as many bytes as the reader actually holds are buffered
    let mut value_bytes = Vec::new();
    reader.take(m as u64 * 8).read_to_end(&mut value_bytes)?;
    if value_bytes.len() != m * 8 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("PETSc vector header claims {m} values; found {} bytes", value_bytes.len()),
        ));
    }

    let mut values = &value_bytes[..];
    Ok((0..m).map(|_| values.get_f64()).collect())
}

#[cfg(test)]
mod tests {
    use super::sparse_matrix::Triplet;
    use super::*;

    fn pair() -> EigenPair {
        EigenPair {
            value: 14.0,
            vector: vec![1.0, 0.2],
        }
    }

    #[test]
    fn normalization() {
        let v = pair().normalized_eigenvector();
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-14);
        assert!((v[0] / v[1] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn exact_residual() {
        let mut t = Triplet::new(2, 2);
        t.insert([0, 0], 13.0);
        t.insert([0, 1], 5.0);
        t.insert([1, 0], 2.0);
        t.insert([1, 1], 4.0);
        let a = t.compress();

        assert!(pair().residual_norm(&a, &[]).unwrap() < 1e-12);
        let wrong = EigenPair {
            value: 3.0,
            ..pair()
        };
        assert!(wrong.residual_norm(&a, &[]).unwrap() > 1.0);
    }

    #[test]
    fn petsc_vector() {
        let mut buf = Vec::new();
        pair().write_petsc_vector(&mut buf).unwrap();
        assert_eq!(buf.len(), 8 + 2 * 8);
        assert_eq!(read_petsc_vector(&mut &buf[..]).unwrap(), vec![1.0, 0.2]);

        buf[3] = 0;
        assert!(read_petsc_vector(&mut &buf[..]).is_err());
    }

    #[test]
    fn truncated_petsc_vector() {
        let mut buf = Vec::new();
        buf.put_i32(PETSC_VEC_CLASS_ID);
        buf.put_i32(i32::MAX);
        buf.put_f64(1.0);

        let err = read_petsc_vector(&mut &buf[..]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn petsc_vector_file() {
        let path = std::env::temp_dir().join(format!("power_method_vec_{}.bin", std::process::id()));
        let path = path.to_str().unwrap();
        pair().print_to_petsc_binary_file(path).unwrap();

        let mut file = File::open(path).unwrap();
        assert_eq!(read_petsc_vector(&mut file).unwrap(), vec![1.0, 0.2]);
        std::fs::remove_file(path).unwrap();
    }

    #[cfg(feature = "json_export")]
    #[test]
    fn json_object() {
        let j = pair().to_json();
        assert_eq!(j["value"].as_f64(), Some(14.0));
        assert_eq!(j["vector"].len(), 2);
        assert!((j["vector"][1].as_f64().unwrap() - 0.2).abs() < 1e-15);
    }
}
