//! A single LSTM layer: gate math, per-step forward caches, and
//! backpropagation through time.
//!
//! Layout conventions:
//!
//! - `w_x*` are `hidden x input`, `w_h*` are `hidden x hidden`, biases are
//!   `hidden`-length vectors
//! - gates: `i` input, `f` forget, `g` cell candidate, `o` output
//! - `c = f ∘ c_prev + i ∘ g`, `h = o ∘ tanh(c)`

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::math::{sigmoid, sigmoid_prime_from_output, tanh_prime_from_output};

/// Forget-gate bias at init, so the cell starts with its memory open.
const FORGET_BIAS_INIT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,
    pub w_xi: DMatrix<f64>,
    pub w_hi: DMatrix<f64>,
    pub b_i: DVector<f64>,
    pub w_xf: DMatrix<f64>,
    pub w_hf: DMatrix<f64>,
    pub b_f: DVector<f64>,
    pub w_xg: DMatrix<f64>,
    pub w_hg: DMatrix<f64>,
    pub b_g: DVector<f64>,
    pub w_xo: DMatrix<f64>,
    pub w_ho: DMatrix<f64>,
    pub b_o: DVector<f64>,
}

/// Values cached at one timestep for the backward pass.
#[derive(Debug, Clone)]
pub struct LstmStep {
    pub x: DVector<f64>,
    pub h_prev: DVector<f64>,
    pub c_prev: DVector<f64>,
    pub i: DVector<f64>,
    pub f: DVector<f64>,
    pub g: DVector<f64>,
    pub o: DVector<f64>,
    pub c: DVector<f64>,
    pub c_tanh: DVector<f64>,
    pub h: DVector<f64>,
}

impl LstmLayer {
    /// Uniform init in `±sqrt(1 / hidden_size)`, forget bias raised to
    /// [`FORGET_BIAS_INIT`].
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let bound = (1.0 / hidden_size as f64).sqrt();
        let mat = |rows: usize, cols: usize, rng: &mut StdRng| {
            DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-bound..bound))
        };
        Self {
            input_size,
            hidden_size,
            w_xi: mat(hidden_size, input_size, rng),
            w_hi: mat(hidden_size, hidden_size, rng),
            b_i: DVector::zeros(hidden_size),
            w_xf: mat(hidden_size, input_size, rng),
            w_hf: mat(hidden_size, hidden_size, rng),
            b_f: DVector::from_element(hidden_size, FORGET_BIAS_INIT),
            w_xg: mat(hidden_size, input_size, rng),
            w_hg: mat(hidden_size, hidden_size, rng),
            b_g: DVector::zeros(hidden_size),
            w_xo: mat(hidden_size, input_size, rng),
            w_ho: mat(hidden_size, hidden_size, rng),
            b_o: DVector::zeros(hidden_size),
        }
    }

    /// Run the layer over a full input sequence from a zero state, returning
    /// one cache per step.
    pub fn forward(&self, inputs: &[DVector<f64>]) -> Vec<LstmStep> {
        let mut h_prev = DVector::zeros(self.hidden_size);
        let mut c_prev = DVector::zeros(self.hidden_size);
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let i = (&self.w_xi * x + &self.w_hi * &h_prev + &self.b_i).map(sigmoid);
            let f = (&self.w_xf * x + &self.w_hf * &h_prev + &self.b_f).map(sigmoid);
            let g = (&self.w_xg * x + &self.w_hg * &h_prev + &self.b_g).map(f64::tanh);
            let o = (&self.w_xo * x + &self.w_ho * &h_prev + &self.b_o).map(sigmoid);
            let c = f.component_mul(&c_prev) + i.component_mul(&g);
            let c_tanh = c.map(f64::tanh);
            let h = o.component_mul(&c_tanh);

            steps.push(LstmStep {
                x: x.clone(),
                h_prev: h_prev.clone(),
                c_prev: c_prev.clone(),
                i,
                f,
                g,
                o,
                c: c.clone(),
                c_tanh,
                h: h.clone(),
            });
            h_prev = h;
            c_prev = c;
        }
        steps
    }

    /// Backpropagate through time.
    ///
    /// `d_h[t]` is the loss gradient arriving at step `t`'s hidden output
    /// from above (zero where none arrives). Returns accumulated parameter
    /// gradients and the gradient w.r.t. each input step.
    pub fn backward(
        &self,
        steps: &[LstmStep],
        d_h: &[DVector<f64>],
    ) -> (LstmGrads, Vec<DVector<f64>>) {
        let mut grads = LstmGrads::zeros(self.input_size, self.hidden_size);
        let mut d_inputs = vec![DVector::zeros(self.input_size); steps.len()];
        let mut dh_next = DVector::zeros(self.hidden_size);
        let mut dc_next = DVector::zeros(self.hidden_size);

        for t in (0..steps.len()).rev() {
            let s = &steps[t];
            let dh_total = &d_h[t] + &dh_next;

            let d_o_pre = dh_total
                .component_mul(&s.c_tanh)
                .zip_map(&s.o, |d, o| d * sigmoid_prime_from_output(o));

            let mut d_c = dh_total
                .component_mul(&s.o)
                .zip_map(&s.c_tanh, |d, ct| d * tanh_prime_from_output(ct));
            d_c += &dc_next;

            let d_f_pre = d_c
                .component_mul(&s.c_prev)
                .zip_map(&s.f, |d, f| d * sigmoid_prime_from_output(f));
            let d_i_pre = d_c
                .component_mul(&s.g)
                .zip_map(&s.i, |d, i| d * sigmoid_prime_from_output(i));
            let d_g_pre = d_c
                .component_mul(&s.i)
                .zip_map(&s.g, |d, g| d * tanh_prime_from_output(g));

            grads.w_xi += &d_i_pre * s.x.transpose();
            grads.w_hi += &d_i_pre * s.h_prev.transpose();
            grads.b_i += &d_i_pre;
            grads.w_xf += &d_f_pre * s.x.transpose();
            grads.w_hf += &d_f_pre * s.h_prev.transpose();
            grads.b_f += &d_f_pre;
            grads.w_xg += &d_g_pre * s.x.transpose();
            grads.w_hg += &d_g_pre * s.h_prev.transpose();
            grads.b_g += &d_g_pre;
            grads.w_xo += &d_o_pre * s.x.transpose();
            grads.w_ho += &d_o_pre * s.h_prev.transpose();
            grads.b_o += &d_o_pre;

            d_inputs[t] = self.w_xi.tr_mul(&d_i_pre)
                + self.w_xf.tr_mul(&d_f_pre)
                + self.w_xg.tr_mul(&d_g_pre)
                + self.w_xo.tr_mul(&d_o_pre);
            dh_next = self.w_hi.tr_mul(&d_i_pre)
                + self.w_hf.tr_mul(&d_f_pre)
                + self.w_hg.tr_mul(&d_g_pre)
                + self.w_ho.tr_mul(&d_o_pre);
            dc_next = d_c.component_mul(&s.f);
        }

        (grads, d_inputs)
    }

    /// Parameter tensors as flat mutable slices, in the fixed order shared
    /// with [`LstmGrads`] and the optimizer.
    pub fn param_slices_mut(&mut self) -> Vec<&mut [f64]> {
        vec![
            self.w_xi.as_mut_slice(),
            self.w_hi.as_mut_slice(),
            self.b_i.as_mut_slice(),
            self.w_xf.as_mut_slice(),
            self.w_hf.as_mut_slice(),
            self.b_f.as_mut_slice(),
            self.w_xg.as_mut_slice(),
            self.w_hg.as_mut_slice(),
            self.b_g.as_mut_slice(),
            self.w_xo.as_mut_slice(),
            self.w_ho.as_mut_slice(),
            self.b_o.as_mut_slice(),
        ]
    }
}

/// Accumulated parameter gradients for one layer. Also reused as the shape
/// of the optimizer's moment buffers.
#[derive(Debug, Clone)]
pub struct LstmGrads {
    pub w_xi: DMatrix<f64>,
    pub w_hi: DMatrix<f64>,
    pub b_i: DVector<f64>,
    pub w_xf: DMatrix<f64>,
    pub w_hf: DMatrix<f64>,
    pub b_f: DVector<f64>,
    pub w_xg: DMatrix<f64>,
    pub w_hg: DMatrix<f64>,
    pub b_g: DVector<f64>,
    pub w_xo: DMatrix<f64>,
    pub w_ho: DMatrix<f64>,
    pub b_o: DVector<f64>,
}

impl LstmGrads {
    pub fn zeros(input_size: usize, hidden_size: usize) -> Self {
        Self {
            w_xi: DMatrix::zeros(hidden_size, input_size),
            w_hi: DMatrix::zeros(hidden_size, hidden_size),
            b_i: DVector::zeros(hidden_size),
            w_xf: DMatrix::zeros(hidden_size, input_size),
            w_hf: DMatrix::zeros(hidden_size, hidden_size),
            b_f: DVector::zeros(hidden_size),
            w_xg: DMatrix::zeros(hidden_size, input_size),
            w_hg: DMatrix::zeros(hidden_size, hidden_size),
            b_g: DVector::zeros(hidden_size),
            w_xo: DMatrix::zeros(hidden_size, input_size),
            w_ho: DMatrix::zeros(hidden_size, hidden_size),
            b_o: DVector::zeros(hidden_size),
        }
    }

    pub fn add_assign(&mut self, other: &LstmGrads) {
        self.w_xi += &other.w_xi;
        self.w_hi += &other.w_hi;
        self.b_i += &other.b_i;
        self.w_xf += &other.w_xf;
        self.w_hf += &other.w_hf;
        self.b_f += &other.b_f;
        self.w_xg += &other.w_xg;
        self.w_hg += &other.w_hg;
        self.b_g += &other.b_g;
        self.w_xo += &other.w_xo;
        self.w_ho += &other.w_ho;
        self.b_o += &other.b_o;
    }

    pub fn scale(&mut self, factor: f64) {
        for s in self.slices_mut() {
            for v in s {
                *v *= factor;
            }
        }
    }

    /// Tensor slices in the same fixed order as
    /// [`LstmLayer::param_slices_mut`].
    pub fn slices(&self) -> Vec<&[f64]> {
        vec![
            self.w_xi.as_slice(),
            self.w_hi.as_slice(),
            self.b_i.as_slice(),
            self.w_xf.as_slice(),
            self.w_hf.as_slice(),
            self.b_f.as_slice(),
            self.w_xg.as_slice(),
            self.w_hg.as_slice(),
            self.b_g.as_slice(),
            self.w_xo.as_slice(),
            self.w_ho.as_slice(),
            self.b_o.as_slice(),
        ]
    }

    pub fn slices_mut(&mut self) -> Vec<&mut [f64]> {
        vec![
            self.w_xi.as_mut_slice(),
            self.w_hi.as_mut_slice(),
            self.b_i.as_mut_slice(),
            self.w_xf.as_mut_slice(),
            self.w_hf.as_mut_slice(),
            self.b_f.as_mut_slice(),
            self.w_xg.as_mut_slice(),
            self.w_hg.as_mut_slice(),
            self.b_g.as_mut_slice(),
            self.w_xo.as_mut_slice(),
            self.w_ho.as_mut_slice(),
            self.b_o.as_mut_slice(),
        ]
    }
}
