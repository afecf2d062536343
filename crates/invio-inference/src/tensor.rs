//! Tensor types exchanged with the invoice models.
//!
//! The detector, recognizer and scorer all speak f32 (image tensors,
//! probability maps, embeddings); i64 covers class-index outputs. Nothing in
//! the pipeline needs other dtypes, so the enums stay closed over these two.

use ndarray::{ArrayD, IxDyn};

/// Input tensor for inference.
#[derive(Debug, Clone)]
pub enum InputTensor {
    Float32(ArrayD<f32>),
    Int64(ArrayD<i64>),
}

impl InputTensor {
    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::Float32(arr) => arr.shape(),
            InputTensor::Int64(arr) => arr.shape(),
        }
    }

    /// Create a Float32 tensor from raw data and shape.
    ///
    /// Returns `None` when the data length does not match the shape.
    pub fn from_f32(data: Vec<f32>, shape: &[usize]) -> Option<Self> {
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .ok()
            .map(InputTensor::Float32)
    }
}

/// Output tensor from inference.
#[derive(Debug, Clone)]
pub enum OutputTensor {
    Float32(ArrayD<f32>),
    Int64(ArrayD<i64>),
}

impl OutputTensor {
    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            OutputTensor::Float32(arr) => arr.shape(),
            OutputTensor::Int64(arr) => arr.shape(),
        }
    }

    /// Try to get the inner Float32 array.
    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            OutputTensor::Float32(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to get the inner Int64 array.
    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            OutputTensor::Int64(arr) => Some(arr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_f32_shape() {
        let tensor = InputTensor::from_f32(vec![0.0; 12], &[1, 3, 2, 2]).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
    }

    #[test]
    fn test_from_f32_shape_mismatch() {
        assert!(InputTensor::from_f32(vec![0.0; 5], &[1, 3]).is_none());
    }

    #[test]
    fn test_output_as_f32() {
        let arr = ArrayD::from_shape_vec(IxDyn(&[2]), vec![0.25f32, 0.75]).unwrap();
        let out = OutputTensor::Float32(arr);
        assert!(out.as_f32().is_some());
        assert!(out.as_i64().is_none());
    }
}
