use ndarray::ArrayD;

/// Model input tensor, float or quantized, batch size 1.
#[derive(Debug, Clone)]
pub enum InputTensor {
    Float(ArrayD<f32>),
    Quantized(ArrayD<u8>),
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::Float(arr) => arr.shape(),
            InputTensor::Quantized(arr) => arr.shape(),
        }
    }

    pub fn as_float(&self) -> Option<&ArrayD<f32>> {
        match self {
            InputTensor::Float(arr) => Some(arr),
            InputTensor::Quantized(_) => None,
        }
    }

    pub fn as_quantized(&self) -> Option<&ArrayD<u8>> {
        match self {
            InputTensor::Quantized(arr) => Some(arr),
            InputTensor::Float(_) => None,
        }
    }
}
