//! Quadrature rules on segments and triangles.
//!
//! Reference rules are computed in double precision and converted to the working precision.
//! Triangle rules are collapsed (Duffy) tensor products of Gauss rules, which are exact for
//! polynomials of any requested degree at the cost of a few more points than optimal rules.
use crate::Real;
use nalgebra::{convert, Point1, Point2};
use std::ops::{AddAssign, Mul};

pub mod univariate;

pub type QuadraturePair<T, P> = (Vec<T>, Vec<P>);
pub type QuadraturePair1d<T> = QuadraturePair<T, Point1<T>>;
pub type QuadraturePair2d<T> = QuadraturePair<T, Point2<T>>;

/// A quadrature rule consisting of weights and points.
pub trait Quadrature<T, P> {
    fn weights(&self) -> &[T];
    fn points(&self) -> &[P];

    /// Approximates the integral of the given function using this quadrature rule.
    fn integrate<U, F>(&self, f: F) -> U
    where
        T: Copy,
        F: Fn(&P) -> U,
        U: num::Zero + Mul<T, Output = U> + AddAssign<U>,
    {
        let mut integral = U::zero();
        for (w, p) in self.weights().iter().zip(self.points()) {
            integral += f(p) * *w;
        }
        integral
    }
}

impl<T, P, A, B> Quadrature<T, P> for (A, B)
where
    A: AsRef<[T]>,
    B: AsRef<[P]>,
{
    fn weights(&self) -> &[T] {
        self.0.as_ref()
    }

    fn points(&self) -> &[P] {
        self.1.as_ref()
    }
}

/// Number of Gauss points needed to integrate polynomials of the given degree exactly.
pub fn gauss_points_for_strength(strength: usize) -> usize {
    strength / 2 + 1
}

/// Gauss rule on the unit interval `[0, 1]` that integrates polynomials of degree
/// `strength` exactly.
pub fn segment_rule<T: Real>(strength: usize) -> QuadraturePair1d<T> {
    let (weights, points) = univariate::gauss(gauss_points_for_strength(strength));
    let weights = weights.into_iter().map(|w| convert(0.5 * w)).collect();
    let points = points
        .into_iter()
        .map(|x| Point1::new(convert(0.5 * (x + 1.0))))
        .collect();
    (weights, points)
}

/// Collapsed Gauss rule on the reference triangle with vertices `(0, 0)`, `(1, 0)`, `(0, 1)`
/// that integrates polynomials of total degree `strength` exactly.
///
/// The square `[0, 1]^2` is mapped onto the triangle by `(u, v) -> (u (1 - v), v)`, whose
/// Jacobian determinant `1 - v` raises the degree of the integrand in `v` by one.
pub fn triangle_rule<T: Real>(strength: usize) -> QuadraturePair2d<T> {
    let (u_weights, u_points) = univariate::gauss(gauss_points_for_strength(strength));
    let (v_weights, v_points) = univariate::gauss(gauss_points_for_strength(strength + 1));

    let mut weights = Vec::with_capacity(u_weights.len() * v_weights.len());
    let mut points = Vec::with_capacity(u_weights.len() * v_weights.len());
    for (&w_v, &v) in v_weights.iter().zip(&v_points) {
        let (w_v, v) = (0.5 * w_v, 0.5 * (v + 1.0));
        for (&w_u, &u) in u_weights.iter().zip(&u_points) {
            let (w_u, u) = (0.5 * w_u, 0.5 * (u + 1.0));
            weights.push(convert(w_u * w_v * (1.0 - v)));
            points.push(Point2::new(convert(u * (1.0 - v)), convert(v)));
        }
    }
    (weights, points)
}

/// Maps a reference triangle rule onto the triangle with the given vertices.
pub fn map_triangle_rule<T: Real>(rule: &QuadraturePair2d<T>, vertices: &[Point2<T>; 3]) -> QuadraturePair2d<T> {
    let [a, b, c] = vertices;
    let (e1, e2) = (b - a, c - a);
    let det = e1.perp(&e2).abs();
    let weights = rule.weights().iter().map(|&w| w * det).collect();
    let points = rule
        .points()
        .iter()
        .map(|xi| a + e1 * xi.x + e2 * xi.y)
        .collect();
    (weights, points)
}

/// Maps a unit interval rule onto the segment from `a` to `b`.
///
/// Returns the physical weights, the physical points and the parameters `s` in `[0, 1]` of the
/// points along the segment.
pub fn map_segment_rule<T: Real>(
    rule: &QuadraturePair1d<T>,
    a: &Point2<T>,
    b: &Point2<T>,
) -> (Vec<T>, Vec<Point2<T>>, Vec<T>) {
    let length = (b - a).norm();
    let weights = rule.weights().iter().map(|&w| w * length).collect();
    let params: Vec<T> = rule.points().iter().map(|s| s.x).collect();
    let points = params.iter().map(|&s| a + (b - a) * s).collect();
    (weights, points, params)
}
