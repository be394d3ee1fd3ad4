//! Gauss-Legendre rules for the one-dimensional domain `[-1, 1]`.
use std::f64::consts::PI;

const MAX_NEWTON_ITERATIONS: usize = 100;

/// Values of the Legendre polynomials `p_n(x)` and `p_{n-1}(x)`.
///
/// The derivative formula is singular at `|x| == 1`, so this is only suitable for evaluation
/// in the open interval `(-1, 1)`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LegendreRecurrence {
    n: usize,
    x: f64,
    p_n: f64,
    p_n_minus_1: f64,
}

impl LegendreRecurrence {
    pub(crate) fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p_n = 1.0;
        let mut p_n_minus_1 = 0.0;
        for m in 1..=n {
            let m = m as f64;
            let p_n_minus_2 = p_n_minus_1;
            p_n_minus_1 = p_n;
            p_n = ((2.0 * m - 1.0) * x * p_n_minus_1 - (m - 1.0) * p_n_minus_2) / m;
        }
        Self { n, x, p_n, p_n_minus_1 }
    }

    pub(crate) fn value(&self) -> f64 {
        self.p_n
    }

    pub(crate) fn derivative(&self) -> f64 {
        // dp_n/dx (x) = n * (x * p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        let n = self.n as f64;
        n * (self.x * self.p_n - self.p_n_minus_1) / (self.x * self.x - 1.0)
    }
}

/// Gauss-Legendre rule with the given number of points on `[-1, 1]`, as `(weights, points)`.
///
/// Integrates polynomials of degree up to `2 n - 1` exactly. Points are returned in
/// decreasing order.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> (Vec<f64>, Vec<f64>) {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    // Roots are symmetric about the origin, so only the first half is computed
    let num_unique = (n + 1) / 2;
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);

    for i in 0..num_unique {
        // Initial guess from the asymptotic distribution of the roots
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let recurrence = LegendreRecurrence::evaluate(n, x);
            let dx = -recurrence.value() / recurrence.derivative();
            x += dx;
            if dx.abs() <= 1e-15 {
                break;
            }
        }
        let dp = LegendreRecurrence::evaluate(n, x).derivative();
        points.push(x);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }

    for i in num_unique..n {
        let mirror = n - i - 1;
        points.push(-points[mirror]);
        weights.push(weights[mirror]);
    }

    (weights, points)
}
