//! Dense row-major tensors and the (features, labels) pairs built on them.
//!
//! Image tensors use NHWC layout: `[samples, height, width, channels]`.
//! Label tensors are one-hot: `[samples, classes]`.

use crate::error::{AutodaError, Result};
use std::ops::Range;

/// A dense `f32` tensor with a leading sample dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Build a tensor, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        if shape.is_empty() {
            return Err(AutodaError::precondition("tensor shape must have at least one dimension"));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(AutodaError::precondition(format!(
                "tensor shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Number of samples (size of the leading dimension).
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Number of values in one sample.
    pub fn row_len(&self) -> usize {
        self.shape[1..].iter().product()
    }

    /// Shape of a single sample, i.e. everything after the leading dimension.
    pub fn sample_shape(&self) -> &[usize] {
        &self.shape[1..]
    }

    /// Size of the trailing dimension (channels for images, classes for labels).
    pub fn channels(&self) -> usize {
        if self.shape.len() < 2 {
            1
        } else {
            self.shape[self.shape.len() - 1]
        }
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let len = self.row_len();
        &self.data[index * len..(index + 1) * len]
    }

    pub fn row_mut(&mut self, index: usize) -> &mut [f32] {
        let len = self.row_len();
        &mut self.data[index * len..(index + 1) * len]
    }

    /// Copy the given rows, in order, into a new tensor.
    pub fn gather(&self, indices: &[usize]) -> Tensor {
        let len = self.row_len();
        let mut data = Vec::with_capacity(indices.len() * len);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        let mut shape = self.shape.clone();
        shape[0] = indices.len();
        Tensor { shape, data }
    }

    /// Copy a contiguous range of rows into a new tensor.
    pub fn slice_rows(&self, range: Range<usize>) -> Tensor {
        let len = self.row_len();
        let mut shape = self.shape.clone();
        shape[0] = range.len();
        Tensor {
            shape,
            data: self.data[range.start * len..range.end * len].to_vec(),
        }
    }

    /// Index of the largest value in each row.
    pub fn argmax_rows(&self) -> Vec<usize> {
        (0..self.rows())
            .map(|i| {
                self.row(i)
                    .iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (j, &v)| {
                        if v > best.1 { (j, v) } else { best }
                    })
                    .0
            })
            .collect()
    }
}

/// Encode class indices as one-hot rows.
pub fn one_hot(classes: &[usize], num_classes: usize) -> Result<Tensor> {
    let mut data = vec![0.0; classes.len() * num_classes];
    for (i, &class) in classes.iter().enumerate() {
        if class >= num_classes {
            return Err(AutodaError::dataset(format!(
                "label {class} out of range for {num_classes} classes"
            )));
        }
        data[i * num_classes + class] = 1.0;
    }
    Tensor::new(vec![classes.len(), num_classes], data)
}

/// One data split: features with matching one-hot labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub features: Tensor,
    pub labels: Tensor,
}

impl Split {
    pub fn new(features: Tensor, labels: Tensor) -> Result<Self> {
        if features.rows() != labels.rows() {
            return Err(AutodaError::precondition(format!(
                "features have {} samples but labels have {}",
                features.rows(),
                labels.rows()
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.features.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_classes(&self) -> usize {
        self.labels.channels()
    }

    pub fn input_shape(&self) -> &[usize] {
        self.features.sample_shape()
    }

    pub fn gather(&self, indices: &[usize]) -> Batch {
        Batch {
            features: self.features.gather(indices),
            labels: self.labels.gather(indices),
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Split {
        Split {
            features: self.features.slice_rows(range.clone()),
            labels: self.labels.slice_rows(range),
        }
    }
}

/// A mini-batch pulled from a split or an augmented stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub features: Tensor,
    pub labels: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.features.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_mismatched_data() {
        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, AutodaError::Precondition(_)));
    }

    #[test]
    fn test_gather_preserves_order() {
        let t = Tensor::new(vec![3, 2], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let g = t.gather(&[2, 0]);
        assert_eq!(g.shape(), &[2, 2]);
        assert_eq!(g.data(), &[4.0, 5.0, 0.0, 1.0]);
    }

    #[test]
    fn test_one_hot() {
        let t = one_hot(&[1, 0, 2], 3).unwrap();
        assert_eq!(t.row(0), &[0.0, 1.0, 0.0]);
        assert_eq!(t.row(2), &[0.0, 0.0, 1.0]);
        assert_eq!(t.argmax_rows(), vec![1, 0, 2]);
        assert!(one_hot(&[3], 3).is_err());
    }

    #[test]
    fn test_split_requires_matching_rows() {
        let x = Tensor::zeros(vec![4, 2, 2, 1]);
        let y = Tensor::zeros(vec![3, 10]);
        assert!(Split::new(x, y).is_err());
    }

    #[test]
    fn test_split_shapes() {
        let split = Split::new(Tensor::zeros(vec![4, 2, 2, 3]), Tensor::zeros(vec![4, 10])).unwrap();
        assert_eq!(split.len(), 4);
        assert_eq!(split.num_classes(), 10);
        assert_eq!(split.input_shape(), &[2, 2, 3]);
        assert_eq!(split.slice(1..3).len(), 2);
    }
}
