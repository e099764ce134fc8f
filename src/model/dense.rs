//! Fully connected layer used by the network head.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::math::{relu, relu_prime};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `output x input`.
    pub weights: DMatrix<f64>,
    pub bias: DVector<f64>,
    /// ReLU after the affine map; the final output layer stays linear.
    pub relu: bool,
}

/// Forward-pass values cached for backprop.
#[derive(Debug, Clone)]
pub struct DenseCache {
    pub x: DVector<f64>,
    /// Pre-activation `Wx + b`.
    pub z: DVector<f64>,
    pub a: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct DenseGrads {
    pub weights: DMatrix<f64>,
    pub bias: DVector<f64>,
}

impl DenseLayer {
    /// Uniform init in `±sqrt(1 / input_size)`, zero bias.
    pub fn new(input_size: usize, output_size: usize, relu: bool, rng: &mut StdRng) -> Self {
        let bound = (1.0 / input_size as f64).sqrt();
        Self {
            weights: DMatrix::from_fn(output_size, input_size, |_, _| {
                rng.gen_range(-bound..bound)
            }),
            bias: DVector::zeros(output_size),
            relu,
        }
    }

    pub fn forward(&self, x: &DVector<f64>) -> DenseCache {
        let z = &self.weights * x + &self.bias;
        let a = if self.relu { z.map(relu) } else { z.clone() };
        DenseCache { x: x.clone(), z, a }
    }

    /// Returns parameter gradients and the gradient w.r.t. the layer input.
    pub fn backward(&self, cache: &DenseCache, d_out: &DVector<f64>) -> (DenseGrads, DVector<f64>) {
        let d_z = if self.relu {
            d_out.zip_map(&cache.z, |d, z| d * relu_prime(z))
        } else {
            d_out.clone()
        };
        let grads = DenseGrads {
            weights: &d_z * cache.x.transpose(),
            bias: d_z.clone(),
        };
        let d_x = self.weights.tr_mul(&d_z);
        (grads, d_x)
    }

    pub fn param_slices_mut(&mut self) -> Vec<&mut [f64]> {
        vec![self.weights.as_mut_slice(), self.bias.as_mut_slice()]
    }
}

impl DenseGrads {
    pub fn zeros(input_size: usize, output_size: usize) -> Self {
        Self {
            weights: DMatrix::zeros(output_size, input_size),
            bias: DVector::zeros(output_size),
        }
    }

    pub fn add_assign(&mut self, other: &DenseGrads) {
        self.weights += &other.weights;
        self.bias += &other.bias;
    }

    pub fn scale(&mut self, factor: f64) {
        self.weights *= factor;
        self.bias *= factor;
    }

    pub fn slices(&self) -> Vec<&[f64]> {
        vec![self.weights.as_slice(), self.bias.as_slice()]
    }

    pub fn slices_mut(&mut self) -> Vec<&mut [f64]> {
        vec![self.weights.as_mut_slice(), self.bias.as_mut_slice()]
    }
}
