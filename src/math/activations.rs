//! Scalar activation kernels shared by the recurrent and dense layers.
//!
//! Derivatives are expressed in terms of the activation *output* where the
//! function allows it, so backprop can reuse values cached on the forward
//! pass instead of recomputing the nonlinearity.

/// Logistic sigmoid, numerically stable for large `|x|`.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        // exp(x) stays finite for negative x; the symmetric form avoids
        // overflow in exp(-x).
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// d/dx sigmoid(x), given `s = sigmoid(x)`.
pub fn sigmoid_prime_from_output(s: f64) -> f64 {
    s * (1.0 - s)
}

/// d/dx tanh(x), given `t = tanh(x)`.
pub fn tanh_prime_from_output(t: f64) -> f64 {
    1.0 - t * t
}

pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

/// d/dx relu(x). Zero at the kink.
pub fn relu_prime(x: f64) -> f64 {
    if x > 0.0 { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_midpoint_and_symmetry() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        for x in [0.3, 1.7, 4.0] {
            let s = sigmoid(x) + sigmoid(-x);
            assert!((s - 1.0).abs() < 1e-12, "sigmoid symmetry at {x}");
        }
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert!(sigmoid(500.0).is_finite());
        assert!(sigmoid(-500.0).is_finite());
        assert!((sigmoid(500.0) - 1.0).abs() < 1e-12);
        assert!(sigmoid(-500.0) < 1e-12);
    }

    #[test]
    fn derivative_forms_match_numeric_slope() {
        let h = 1e-6;
        for x in [-2.0, -0.5, 0.25, 1.5] {
            let numeric = (sigmoid(x + h) - sigmoid(x - h)) / (2.0 * h);
            let analytic = sigmoid_prime_from_output(sigmoid(x));
            assert!(
                (numeric - analytic).abs() < 1e-8,
                "sigmoid' mismatch at {x}: {numeric} vs {analytic}"
            );

            let numeric_t = ((x + h).tanh() - (x - h).tanh()) / (2.0 * h);
            let analytic_t = tanh_prime_from_output(x.tanh());
            assert!(
                (numeric_t - analytic_t).abs() < 1e-8,
                "tanh' mismatch at {x}: {numeric_t} vs {analytic_t}"
            );
        }
    }

    #[test]
    fn relu_masks_negatives() {
        assert_eq!(relu(-3.0), 0.0);
        assert_eq!(relu(2.5), 2.5);
        assert_eq!(relu_prime(-0.1), 0.0);
        assert_eq!(relu_prime(0.1), 1.0);
    }
}
