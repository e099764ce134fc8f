//! Adam optimizer over the full network parameter set.
//!
//! Moments are stored as gradient-shaped buffers and paired with the model's
//! parameter tensors through the fixed slice order both sides expose.

use crate::model::network::{NetworkGrads, SequenceModel};

/// Exponential decay for the first moment.
const BETA1: f64 = 0.9;
/// Exponential decay for the second moment.
const BETA2: f64 = 0.999;
/// Denominator floor.
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    /// Update counter for bias correction.
    t: u64,
    m: NetworkGrads,
    v: NetworkGrads,
}

impl Adam {
    pub fn new(model: &SequenceModel, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            t: 0,
            m: NetworkGrads::zeros_like(model),
            v: NetworkGrads::zeros_like(model),
        }
    }

    /// Apply one update from already-averaged batch gradients.
    pub fn step(&mut self, model: &mut SequenceModel, grads: &NetworkGrads) {
        self.t += 1;
        let bc1 = 1.0 - BETA1.powi(self.t as i32);
        let bc2 = 1.0 - BETA2.powi(self.t as i32);
        let lr = self.learning_rate;

        let params = model.param_slices_mut();
        let grad_slices = grads.slices();
        let m_slices = self.m.slices_mut();
        let v_slices = self.v.slices_mut();

        for (((p, g), m), v) in params
            .into_iter()
            .zip(grad_slices)
            .zip(m_slices)
            .zip(v_slices)
        {
            update_tensor(lr, bc1, bc2, p, g, m, v);
        }
    }
}

fn update_tensor(
    lr: f64,
    bc1: f64,
    bc2: f64,
    params: &mut [f64],
    grads: &[f64],
    m: &mut [f64],
    v: &mut [f64],
) {
    for i in 0..params.len() {
        m[i] = BETA1 * m[i] + (1.0 - BETA1) * grads[i];
        v[i] = BETA2 * v[i] + (1.0 - BETA2) * grads[i] * grads[i];
        let m_hat = m[i] / bc1;
        let v_hat = v[i] / bc2;
        params[i] -= lr * m_hat / (v_hat.sqrt() + EPSILON);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_moves_by_roughly_the_learning_rate() {
        // With a constant unit gradient the bias-corrected step is
        // lr * 1 / (1 + eps) on the very first update.
        let mut p = [1.0];
        let mut m = [0.0];
        let mut v = [0.0];
        let bc1 = 1.0 - BETA1;
        let bc2 = 1.0 - BETA2;
        update_tensor(0.01, bc1, bc2, &mut p, &[1.0], &mut m, &mut v);
        assert!((p[0] - (1.0 - 0.01)).abs() < 1e-6, "p = {}", p[0]);
    }

    #[test]
    fn repeated_steps_shrink_a_quadratic() {
        // Minimize (w - 3)^2 elementwise on a bare tensor.
        let mut p = [0.0f64];
        let mut m = [0.0];
        let mut v = [0.0];
        let mut t = 0u64;
        for _ in 0..2_000 {
            t += 1;
            let g = 2.0 * (p[0] - 3.0);
            let bc1 = 1.0 - BETA1.powi(t as i32);
            let bc2 = 1.0 - BETA2.powi(t as i32);
            update_tensor(0.05, bc1, bc2, &mut p, &[g], &mut m, &mut v);
        }
        assert!((p[0] - 3.0).abs() < 0.1, "w = {}", p[0]);
    }

    #[test]
    fn update_direction_opposes_gradient_sign() {
        let mut p = [0.5, 0.5];
        let mut m = [0.0, 0.0];
        let mut v = [0.0, 0.0];
        update_tensor(
            0.001,
            1.0 - BETA1,
            1.0 - BETA2,
            &mut p,
            &[2.0, -2.0],
            &mut m,
            &mut v,
        );
        assert!(p[0] < 0.5);
        assert!(p[1] > 0.5);
    }
}
