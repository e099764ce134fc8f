//! The stacked sequence model: two recurrent layers of decreasing width
//! feeding a small dense head with a single linear output.
//!
//! The struct is fully serializable, so a fitted model round-trips through
//! the JSON artifact without any side state.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::domain::TrainConfig;
use crate::error::{AppError, ErrorKind};
use crate::model::dense::{DenseCache, DenseGrads, DenseLayer};
use crate::model::lstm::{LstmGrads, LstmLayer, LstmStep};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceModel {
    pub window_size: usize,
    pub feature_count: usize,
    /// Stacked recurrent layers, input side first.
    pub lstm: Vec<LstmLayer>,
    /// Dense head; the last layer is linear with a single output.
    pub dense: Vec<DenseLayer>,
    /// Dropout probability the model was trained with.
    pub dropout: f64,
}

/// Gradients (or optimizer moment buffers) shaped like the full parameter
/// set of a [`SequenceModel`].
#[derive(Debug, Clone)]
pub struct NetworkGrads {
    pub lstm: Vec<LstmGrads>,
    pub dense: Vec<DenseGrads>,
}

/// Inverted-dropout masks for one training example. Entries are either zero
/// or `1 / keep_probability`, so inference needs no rescaling.
#[derive(Debug, Clone)]
pub struct DropoutMasks {
    /// One mask per timestep for each gap between recurrent layers.
    pub between: Vec<Vec<DVector<f64>>>,
    /// Mask on the final hidden vector ahead of the dense head.
    pub head: DVector<f64>,
}

/// Forward-pass caches needed by [`SequenceModel::backward`].
#[derive(Debug, Clone)]
pub struct ForwardCache {
    pub lstm_steps: Vec<Vec<LstmStep>>,
    pub dense: Vec<DenseCache>,
}

impl SequenceModel {
    /// Build a fresh model: `lstm_units[0] -> lstm_units[1]` recurrent stack,
    /// then `dense_units` with ReLU, then one linear output.
    pub fn new(window_size: usize, feature_count: usize, config: &TrainConfig, rng: &mut StdRng) -> Self {
        let [wide, narrow] = config.lstm_units;
        Self {
            window_size,
            feature_count,
            lstm: vec![
                LstmLayer::new(feature_count, wide, rng),
                LstmLayer::new(wide, narrow, rng),
            ],
            dense: vec![
                DenseLayer::new(narrow, config.dense_units, true, rng),
                DenseLayer::new(config.dense_units, 1, false, rng),
            ],
            dropout: config.dropout,
        }
    }

    /// Predict the scaled primary value following one normalized window.
    /// Inference mode: no dropout.
    pub fn predict_step(&self, window: &DMatrix<f64>) -> Result<f64, AppError> {
        if window.nrows() != self.window_size || window.ncols() != self.feature_count {
            return Err(AppError::new(
                ErrorKind::Runtime,
                format!(
                    "Model expects a {}x{} window, got {}x{}.",
                    self.window_size,
                    self.feature_count,
                    window.nrows(),
                    window.ncols()
                ),
            ));
        }
        let (out, _) = self.forward(window, None);
        if !out.is_finite() {
            return Err(AppError::new(
                ErrorKind::Runtime,
                "Model produced a non-finite prediction.",
            ));
        }
        Ok(out)
    }

    /// Full forward pass. `masks` enables dropout (training); `None` runs
    /// the deterministic inference path.
    pub fn forward(&self, window: &DMatrix<f64>, masks: Option<&DropoutMasks>) -> (f64, ForwardCache) {
        let mut inputs: Vec<DVector<f64>> = (0..window.nrows())
            .map(|t| window.row(t).transpose())
            .collect();

        let mut lstm_steps = Vec::with_capacity(self.lstm.len());
        let mut h_final = DVector::zeros(0);
        for (li, layer) in self.lstm.iter().enumerate() {
            let steps = layer.forward(&inputs);
            if li + 1 < self.lstm.len() {
                inputs = steps.iter().map(|s| s.h.clone()).collect();
                if let Some(m) = masks {
                    for (t, h) in inputs.iter_mut().enumerate() {
                        *h = h.component_mul(&m.between[li][t]);
                    }
                }
            } else {
                h_final = match steps.last() {
                    Some(s) => s.h.clone(),
                    None => DVector::zeros(layer.hidden_size),
                };
                if let Some(m) = masks {
                    h_final = h_final.component_mul(&m.head);
                }
            }
            lstm_steps.push(steps);
        }

        let mut dense_caches = Vec::with_capacity(self.dense.len());
        let mut a = h_final;
        for layer in &self.dense {
            let cache = layer.forward(&a);
            a = cache.a.clone();
            dense_caches.push(cache);
        }

        let out = a[0];
        (
            out,
            ForwardCache {
                lstm_steps,
                dense: dense_caches,
            },
        )
    }

    /// Backward pass for one example. `d_out` is the loss gradient w.r.t.
    /// the scalar output; `masks` must be the same as in the forward pass.
    pub fn backward(
        &self,
        cache: &ForwardCache,
        d_out: f64,
        masks: Option<&DropoutMasks>,
    ) -> NetworkGrads {
        let mut dense_grads: Vec<Option<DenseGrads>> = vec![None; self.dense.len()];
        let mut d = DVector::from_element(1, d_out);
        for (li, layer) in self.dense.iter().enumerate().rev() {
            let (g, d_x) = layer.backward(&cache.dense[li], &d);
            dense_grads[li] = Some(g);
            d = d_x;
        }

        // d is now the gradient w.r.t. the (possibly masked) final hidden
        // vector; undo the head mask first.
        if let Some(m) = masks {
            d = d.component_mul(&m.head);
        }

        let steps_per_layer = cache.lstm_steps[0].len();
        let mut lstm_grads: Vec<Option<LstmGrads>> = vec![None; self.lstm.len()];
        let top = self.lstm.len() - 1;
        let mut d_h: Vec<DVector<f64>> = (0..steps_per_layer)
            .map(|t| {
                if t + 1 == steps_per_layer {
                    d.clone()
                } else {
                    DVector::zeros(self.lstm[top].hidden_size)
                }
            })
            .collect();

        for li in (0..self.lstm.len()).rev() {
            let (g, d_inputs) = self.lstm[li].backward(&cache.lstm_steps[li], &d_h);
            lstm_grads[li] = Some(g);
            if li > 0 {
                // Inputs of layer li were the masked hidden outputs of
                // layer li - 1.
                d_h = d_inputs;
                if let Some(m) = masks {
                    for (t, dv) in d_h.iter_mut().enumerate() {
                        *dv = dv.component_mul(&m.between[li - 1][t]);
                    }
                }
            }
        }

        NetworkGrads {
            lstm: lstm_grads.into_iter().flatten().collect(),
            dense: dense_grads.into_iter().flatten().collect(),
        }
    }

    /// Sample dropout masks for one training example. With zero dropout the
    /// masks are all ones and the pass matches inference exactly.
    pub fn sample_masks(&self, rng: &mut StdRng) -> DropoutMasks {
        let keep = 1.0 - self.dropout;
        let mask = |n: usize, rng: &mut StdRng| {
            DVector::from_fn(n, |_, _| {
                if rng.r#gen::<f64>() < keep { 1.0 / keep } else { 0.0 }
            })
        };
        let between = (0..self.lstm.len().saturating_sub(1))
            .map(|li| {
                (0..self.window_size)
                    .map(|_| mask(self.lstm[li].hidden_size, rng))
                    .collect()
            })
            .collect();
        let head = match self.lstm.last() {
            Some(l) => mask(l.hidden_size, rng),
            None => DVector::zeros(0),
        };
        DropoutMasks { between, head }
    }

    /// Parameter tensors as flat slices, ordered to match
    /// [`NetworkGrads::slices`].
    pub fn param_slices_mut(&mut self) -> Vec<&mut [f64]> {
        let mut out = Vec::new();
        for layer in &mut self.lstm {
            out.extend(layer.param_slices_mut());
        }
        for layer in &mut self.dense {
            out.extend(layer.param_slices_mut());
        }
        out
    }
}

impl NetworkGrads {
    pub fn zeros_like(model: &SequenceModel) -> Self {
        Self {
            lstm: model
                .lstm
                .iter()
                .map(|l| LstmGrads::zeros(l.input_size, l.hidden_size))
                .collect(),
            dense: model
                .dense
                .iter()
                .map(|l| DenseGrads::zeros(l.weights.ncols(), l.weights.nrows()))
                .collect(),
        }
    }

    pub fn add_assign(&mut self, other: &NetworkGrads) {
        for (a, b) in self.lstm.iter_mut().zip(other.lstm.iter()) {
            a.add_assign(b);
        }
        for (a, b) in self.dense.iter_mut().zip(other.dense.iter()) {
            a.add_assign(b);
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for g in &mut self.lstm {
            g.scale(factor);
        }
        for g in &mut self.dense {
            g.scale(factor);
        }
    }

    pub fn slices(&self) -> Vec<&[f64]> {
        let mut out = Vec::new();
        for g in &self.lstm {
            out.extend(g.slices());
        }
        for g in &self.dense {
            out.extend(g.slices());
        }
        out
    }

    pub fn slices_mut(&mut self) -> Vec<&mut [f64]> {
        let mut out = Vec::new();
        for g in &mut self.lstm {
            out.extend(g.slices_mut());
        }
        for g in &mut self.dense {
            out.extend(g.slices_mut());
        }
        out
    }
}
