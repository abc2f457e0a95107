//! IDX (MNIST-format) datasets read from disk.
//!
//! Expects `<data_dir>/<name>/` to contain the four standard files:
//! `train-images-idx3-ubyte`, `train-labels-idx1-ubyte`, `t10k-images-idx3-ubyte`,
//! `t10k-labels-idx1-ubyte`.

use crate::data::{DatasetProvider, DatasetSplits};
use crate::error::{AutodaError, Result};
use crate::tensor::{Split, Tensor, one_hot};
use std::path::{Path, PathBuf};
use tracing::debug;

const UNSIGNED_BYTE: u8 = 0x08;
const NUM_CLASSES: usize = 10;

/// A decoded IDX file: dimensions plus raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct IdxArray {
    pub dims: Vec<usize>,
    pub data: Vec<u8>,
}

/// Decode an unsigned-byte IDX buffer.
pub fn parse_idx(bytes: &[u8]) -> Result<IdxArray> {
    if bytes.len() < 4 || bytes[0] != 0 || bytes[1] != 0 {
        return Err(AutodaError::dataset("not an IDX file (bad magic number)"));
    }
    if bytes[2] != UNSIGNED_BYTE {
        return Err(AutodaError::dataset(format!(
            "unsupported IDX element type 0x{:02x}",
            bytes[2]
        )));
    }
    let ndims = bytes[3] as usize;
    let header = 4 + 4 * ndims;
    if bytes.len() < header {
        return Err(AutodaError::dataset("truncated IDX header"));
    }
    let dims: Vec<usize> = bytes[4..header]
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]) as usize)
        .collect();
    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| AutodaError::dataset(format!("IDX dims {dims:?} overflow the addressable size")))?;
    let data = &bytes[header..];
    if data.len() != expected {
        return Err(AutodaError::dataset(format!(
            "IDX dims {dims:?} need {expected} bytes, found {}",
            data.len()
        )));
    }
    Ok(IdxArray {
        dims,
        data: data.to_vec(),
    })
}

/// IDX-backed dataset provider (MNIST, Fashion-MNIST).
pub struct IdxDataset {
    data_dir: PathBuf,
    validation_fraction: f64,
}

impl IdxDataset {
    pub fn new(data_dir: &Path, validation_fraction: f64) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            validation_fraction,
        }
    }

    fn read(&self, dir: &Path, file: &str) -> Result<IdxArray> {
        let path = dir.join(file);
        if !path.exists() {
            return Err(AutodaError::not_found(format!("dataset file {}", path.display())));
        }
        debug!(path = %path.display(), "Reading IDX file");
        parse_idx(&std::fs::read(&path)?)
    }

    fn read_split(&self, dir: &Path, images: &str, labels: &str) -> Result<Split> {
        let images = self.read(dir, images)?;
        let labels = self.read(dir, labels)?;
        if images.dims.len() != 3 || labels.dims.len() != 1 {
            return Err(AutodaError::dataset(format!(
                "expected 3-d images and 1-d labels, got {:?} and {:?}",
                images.dims, labels.dims
            )));
        }
        let (n, rows, cols) = (images.dims[0], images.dims[1], images.dims[2]);
        let features = Tensor::new(
            vec![n, rows, cols, 1],
            images.data.iter().map(|&b| f32::from(b) / 255.0).collect(),
        )?;
        let classes: Vec<usize> = labels.data.iter().map(|&b| b as usize).collect();
        Split::new(features, one_hot(&classes, NUM_CLASSES)?)
    }
}

impl DatasetProvider for IdxDataset {
    fn load(&self, name: &str, augment: bool) -> Result<DatasetSplits> {
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(AutodaError::precondition(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        let dir = self.data_dir.join(name);
        let full_train = self.read_split(&dir, "train-images-idx3-ubyte", "train-labels-idx1-ubyte")?;
        let test = self.read_split(&dir, "t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte")?;

        let n = full_train.len();
        let held_out = (n as f64 * self.validation_fraction).round() as usize;
        let cut = n - held_out.min(n);
        let train = full_train.slice(0..cut);
        let validation = full_train.slice(cut..n);
        DatasetSplits::from_raw(train, validation, test, augment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(dims: &[u32], data: &[u8]) -> Vec<u8> {
        let mut out = vec![0, 0, UNSIGNED_BYTE, dims.len() as u8];
        for d in dims {
            out.extend_from_slice(&d.to_be_bytes());
        }
        out.extend_from_slice(data);
        out
    }

    fn write_dataset(dir: &Path, train: usize, test: usize) {
        std::fs::create_dir_all(dir).unwrap();
        let images = |n: usize| encode(&[n as u32, 2, 2], &(0..n * 4).map(|i| (i % 256) as u8).collect::<Vec<_>>());
        let labels = |n: usize| encode(&[n as u32], &(0..n).map(|i| (i % 10) as u8).collect::<Vec<_>>());
        std::fs::write(dir.join("train-images-idx3-ubyte"), images(train)).unwrap();
        std::fs::write(dir.join("train-labels-idx1-ubyte"), labels(train)).unwrap();
        std::fs::write(dir.join("t10k-images-idx3-ubyte"), images(test)).unwrap();
        std::fs::write(dir.join("t10k-labels-idx1-ubyte"), labels(test)).unwrap();
    }

    #[test]
    fn test_parse_idx() {
        let arr = parse_idx(&encode(&[2, 3], &[1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(arr.dims, vec![2, 3]);
        assert_eq!(arr.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_parse_idx_rejects_bad_input() {
        assert!(parse_idx(&[1, 0, 8, 1]).is_err());
        assert!(parse_idx(&[0, 0, 0x0d, 1, 0, 0, 0, 1, 0]).is_err());
        assert!(parse_idx(&encode(&[4], &[1, 2])).is_err());
    }

    #[test]
    fn test_parse_idx_rejects_overflowing_dims() {
        let err = parse_idx(&encode(&[u32::MAX, u32::MAX, u32::MAX], &[])).unwrap_err();
        assert!(matches!(err, AutodaError::Dataset(_)), "{err}");
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn test_load_splits_validation_from_train() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(&dir.path().join("mnist"), 20, 5);

        let splits = IdxDataset::new(dir.path(), 0.25).load("mnist", false).unwrap();
        assert_eq!(splits.train.len(), 15);
        assert_eq!(splits.validation.len(), 5);
        assert_eq!(splits.test.len(), 5);
        assert_eq!(splits.train.features.shape(), &[15, 2, 2, 1]);
        assert_eq!(splits.num_classes(), 10);
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = IdxDataset::new(dir.path(), 0.1).load("mnist", false).unwrap_err();
        assert!(matches!(err, AutodaError::NotFound(_)));
    }
}
