//! Polynomial prime bases from which element bases are constructed.
//!
//! Prime functions are expressed in the scaled local coordinates `xi = (x - x_c) / h` of a
//! cell with centroid `x_c` and diameter `h`, which keeps the generalized Vandermonde matrices
//! well conditioned independently of the cell size.
use crate::Real;
use nalgebra::{DMatrix, DVector, Vector2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Monomial<T> {
    pub coefficient: T,
    pub exponents: [usize; 2],
}

impl<T: Real> Monomial<T> {
    fn unit(exponents: [usize; 2]) -> Self {
        Self {
            coefficient: T::one(),
            exponents,
        }
    }

    fn evaluate(&self, xi: &Vector2<T>) -> T {
        let [a, b] = self.exponents;
        self.coefficient * xi.x.powi(a as i32) * xi.y.powi(b as i32)
    }

    /// Partial derivative with respect to the given local coordinate.
    fn derivative(&self, direction: usize, xi: &Vector2<T>) -> T {
        let [a, b] = self.exponents;
        let (power, other) = match direction {
            0 => (a, xi.y.powi(b as i32)),
            _ => (b, xi.x.powi(a as i32)),
        };
        if power == 0 {
            return T::zero();
        }
        let base = if direction == 0 { xi.x } else { xi.y };
        self.coefficient * convert_usize::<T>(power) * base.powi(power as i32 - 1) * other
    }
}

fn convert_usize<T: Real>(n: usize) -> T {
    nalgebra::convert(n as f64)
}

/// A scalar (one component) or vector (two components) valued polynomial.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PrimeFunction<T> {
    pub components: Vec<Vec<Monomial<T>>>,
}

impl<T: Real> PrimeFunction<T> {
    pub fn evaluate_component(&self, component: usize, xi: &Vector2<T>) -> T {
        self.components[component]
            .iter()
            .fold(T::zero(), |acc, m| acc + m.evaluate(xi))
    }

    /// Divergence with respect to the local coordinates.
    pub fn local_divergence(&self, xi: &Vector2<T>) -> T {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(direction, terms)| terms.iter().map(move |m| (direction, m)))
            .fold(T::zero(), |acc, (direction, m)| acc + m.derivative(direction, xi))
    }
}

/// Exponents of all monomials of total degree at most `degree`, ordered by degree.
pub(crate) fn monomial_exponents(degree: usize) -> Vec<[usize; 2]> {
    (0..=degree).flat_map(homogeneous_exponents).collect()
}

/// Exponents of all monomials of total degree exactly `degree`.
pub(crate) fn homogeneous_exponents(degree: usize) -> Vec<[usize; 2]> {
    (0..=degree).map(|b| [degree - b, b]).collect()
}

fn shift(exponents: [usize; 2], direction: usize) -> [usize; 2] {
    let mut shifted = exponents;
    shifted[direction] += 1;
    shifted
}

/// Scalar polynomials of degree at most `degree`.
pub(crate) fn scalar_polynomials<T: Real>(degree: usize) -> Vec<PrimeFunction<T>> {
    monomial_exponents(degree)
        .into_iter()
        .map(|e| PrimeFunction {
            components: vec![vec![Monomial::unit(e)]],
        })
        .collect()
}

/// Vector polynomials of degree at most `degree`, or the empty set for negative degrees.
pub(crate) fn vector_polynomials<T: Real>(degree: Option<usize>) -> Vec<PrimeFunction<T>> {
    let Some(degree) = degree else {
        return Vec::new();
    };
    monomial_exponents(degree)
        .into_iter()
        .flat_map(|e| {
            [
                PrimeFunction {
                    components: vec![vec![Monomial::unit(e)], vec![]],
                },
                PrimeFunction {
                    components: vec![vec![], vec![Monomial::unit(e)]],
                },
            ]
        })
        .collect()
}

/// Raviart-Thomas space `P_{k-1}^2 + x P~_{k-1}`.
pub(crate) fn raviart_thomas<T: Real>(degree: usize) -> Vec<PrimeFunction<T>> {
    debug_assert!(degree >= 1);
    let mut functions = vector_polynomials(Some(degree - 1));
    functions.extend(homogeneous_exponents(degree - 1).into_iter().map(|e| PrimeFunction {
        components: vec![vec![Monomial::unit(shift(e, 0))], vec![Monomial::unit(shift(e, 1))]],
    }));
    functions
}

/// Nedelec (first kind) space `P_{k-1}^2 + (-y, x) P~_{k-1}`.
pub(crate) fn nedelec<T: Real>(degree: usize) -> Vec<PrimeFunction<T>> {
    debug_assert!(degree >= 1);
    let mut functions = vector_polynomials(Some(degree - 1));
    functions.extend(homogeneous_exponents(degree - 1).into_iter().map(|e| PrimeFunction {
        components: vec![
            vec![Monomial {
                coefficient: -T::one(),
                exponents: shift(e, 1),
            }],
            vec![Monomial::unit(shift(e, 0))],
        ],
    }));
    functions
}

/// Values of all functions at `xi`, one row per function.
pub(crate) fn tabulate<T: Real>(functions: &[PrimeFunction<T>], value_dim: usize, xi: &Vector2<T>) -> DMatrix<T> {
    DMatrix::from_fn(functions.len(), value_dim, |i, c| functions[i].evaluate_component(c, xi))
}

/// Local divergences of all functions at `xi`.
pub(crate) fn tabulate_divergence<T: Real>(functions: &[PrimeFunction<T>], xi: &Vector2<T>) -> DVector<T> {
    DVector::from_iterator(functions.len(), functions.iter().map(|p| p.local_divergence(xi)))
}
