//! Nullspaces attached to singular operators.
use crate::operator::LinearOperator;
use nalgebra::{DVector, DVectorViewMut, RealField, Scalar};
use std::error::Error;
use std::fmt;

/// An orthonormal basis for (an approximation of) the kernel of an operator.
///
/// Krylov methods use the nullspace to keep right-hand sides, search directions and iterates
/// in the orthogonal complement of the kernel, which makes singular but consistent systems
/// solvable.
#[derive(Debug, Clone, PartialEq)]
pub struct Nullspace<T: Scalar> {
    basis: Vec<DVector<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NullspaceError {
    /// The vector at the given index is zero or linearly dependent on the preceding vectors.
    DegenerateVector { index: usize },
    /// The vector at the given index does not have the same length as the first vector.
    DimensionMismatch { index: usize, expected: usize, actual: usize },
}

impl fmt::Display for NullspaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DegenerateVector { index } => {
                write!(f, "nullspace vector {} is zero or linearly dependent on the others", index)
            }
            Self::DimensionMismatch {
                index,
                expected,
                actual,
            } => write!(
                f,
                "nullspace vector {} has length {}, expected {}",
                index, actual, expected
            ),
        }
    }
}

impl Error for NullspaceError {}

impl<T> Nullspace<T>
where
    T: RealField + Copy,
{
    /// Orthonormalizes the given vectors (modified Gram-Schmidt) and stores the result.
    ///
    /// Vectors whose remaining norm after orthogonalization is negligible compared to their
    /// original norm are rejected.
    pub fn new(vectors: Vec<DVector<T>>) -> Result<Self, NullspaceError> {
        let expected = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut basis: Vec<DVector<T>> = Vec::with_capacity(vectors.len());
        let tolerance = T::default_epsilon().sqrt();

        for (index, mut v) in vectors.into_iter().enumerate() {
            if v.len() != expected {
                return Err(NullspaceError::DimensionMismatch {
                    index,
                    expected,
                    actual: v.len(),
                });
            }
            let original_norm = v.norm();
            for q in &basis {
                let projection = q.dot(&v);
                v.axpy(-projection, q, T::one());
            }
            let norm = v.norm();
            if original_norm == T::zero() || norm <= tolerance * original_norm {
                return Err(NullspaceError::DegenerateVector { index });
            }
            v.unscale_mut(norm);
            basis.push(v);
        }

        Ok(Self { basis })
    }

    pub fn len(&self) -> usize {
        self.basis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basis.is_empty()
    }

    pub fn dim(&self) -> Option<usize> {
        self.basis.first().map(|v| v.len())
    }

    pub fn vectors(&self) -> &[DVector<T>] {
        &self.basis
    }

    /// Removes the nullspace components from `x`, i.e. `x <- (I - Q Q^T) x`.
    pub fn remove_from<'a>(&self, x: impl Into<DVectorViewMut<'a, T>>) {
        let mut x = x.into();
        for q in &self.basis {
            let projection = q.dot(&x);
            x.axpy(-projection, q, T::one());
        }
    }

    /// Checks whether every basis vector `v` satisfies `|A v| <= tol`.
    pub fn is_nullspace_of(&self, operator: &dyn LinearOperator<T>, tol: T) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let mut image = DVector::zeros(self.dim().unwrap_or(0));
        for q in &self.basis {
            operator.apply((&mut image).into(), q.into())?;
            if image.norm() > tol {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
