use nalgebra::base::constraint::AreMultipliable;
use nalgebra::constraint::{DimEq, ShapeConstraint};
use nalgebra::storage::Storage;
use nalgebra::{ClosedAdd, ClosedMul, DVector, DVectorView, DVectorViewMut, Dim, Dyn, Matrix, RealField, Scalar, U1};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::{One, Zero};
use std::error::Error;
use std::fmt;

/// An operator `y = A x` acting on dynamically sized vectors.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T, R, C, S> LinearOperator<T> for Matrix<T, R, C, S>
where
    T: Scalar + One + Zero + ClosedMul + ClosedAdd,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
    ShapeConstraint: DimEq<Dyn, R> + DimEq<C, Dyn> + AreMultipliable<R, C, Dyn, U1>,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: Scalar + Zero + One + ClosedMul + ClosedAdd,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.ncols() != x.len() || self.nrows() != y.len() {
            return Err(Box::new(DimensionMismatch {
                operator: (self.nrows(), self.ncols()),
                input: x.len(),
                output: y.len(),
            }));
        }
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

/// Error returned when an operator is applied to vectors of the wrong length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub operator: (usize, usize),
    pub input: usize,
    pub output: usize,
}

impl fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot apply {}x{} operator to vector of length {} with output of length {}",
            self.operator.0, self.operator.1, self.input, self.output
        )
    }
}

impl Error for DimensionMismatch {}

pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Diagonal (Jacobi) preconditioner `y = D^{-1} x`.
///
/// Zero diagonal entries are treated as ones, so that rows which are identically zero
/// do not poison the preconditioned residual.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobiPreconditioner<T: Scalar> {
    inverse_diagonal: DVector<T>,
}

impl<T: RealField + Copy> JacobiPreconditioner<T> {
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        let mut inverse_diagonal = DVector::zeros(matrix.nrows());
        Self::update_from_csr_(&mut inverse_diagonal, matrix);
        Self { inverse_diagonal }
    }

    /// Recomputes the diagonal from new matrix values without reallocating.
    pub fn update_from_csr(&mut self, matrix: &CsrMatrix<T>) {
        self.inverse_diagonal
            .resize_vertically_mut(matrix.nrows(), T::zero());
        Self::update_from_csr_(&mut self.inverse_diagonal, matrix);
    }

    fn update_from_csr_(inverse_diagonal: &mut DVector<T>, matrix: &CsrMatrix<T>) {
        for (i, d_i) in inverse_diagonal.iter_mut().enumerate() {
            let row = matrix.row(i);
            let diag = row
                .col_indices()
                .iter()
                .position(|&j| j == i)
                .map(|idx| row.values()[idx])
                .unwrap_or_else(T::zero);
            *d_i = if diag == T::zero() { T::one() } else { diag.recip() };
        }
    }

    pub fn inverse_diagonal(&self) -> &DVector<T> {
        &self.inverse_diagonal
    }
}

impl<T: RealField + Copy> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        y.zip_zip_apply(&x, &self.inverse_diagonal, |y_i, x_i, d_i| *y_i = x_i * d_i);
        Ok(())
    }
}
