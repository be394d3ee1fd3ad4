use crate::config::FormCompilerParameters;
use crate::error::{AlgebraicError, HybridizationError};
use crate::form::BilinearForm;
use crate::tensor::{Bindings, KernelCompiler, LocalKernel, Shape, Tensor};
use crate::Real;
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, Dyn};
use numeric_literals::replace_float_literals;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Kernel compiler that evaluates expression trees directly, cell by cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl<T: Real> KernelCompiler<T> for Interpreter {
    fn compile(
        &self,
        expression: &Tensor<T>,
        parameters: &FormCompilerParameters,
    ) -> Result<Box<dyn LocalKernel<T>>, HybridizationError> {
        let shape = expression.shape()?;
        Ok(Box::new(InterpretedKernel {
            expression: expression.clone(),
            shape,
            quadrature_degree: parameters.quadrature_degree,
        }))
    }
}

#[derive(Debug)]
struct InterpretedKernel<T: Real> {
    expression: Tensor<T>,
    shape: Shape<T>,
    quadrature_degree: Option<usize>,
}

impl<T: Real> LocalKernel<T> for InterpretedKernel<T> {
    fn shape(&self) -> &Shape<T> {
        &self.shape
    }

    fn evaluate(&self, cell_index: usize, bindings: &Bindings<T>) -> Result<DMatrix<T>, HybridizationError> {
        CellEvaluator {
            quadrature_degree: self.quadrature_degree,
            cell_index,
            bindings,
            form_matrices: FxHashMap::default(),
        }
        .evaluate(&self.expression)
    }
}

/// Evaluation of an expression on a single cell.
///
/// Form leaves shared between several nodes of the expression are assembled once.
struct CellEvaluator<'a, 'b, T: Real> {
    quadrature_degree: Option<usize>,
    cell_index: usize,
    bindings: &'a Bindings<'b, T>,
    form_matrices: FxHashMap<*const BilinearForm<T>, DMatrix<T>>,
}

impl<'a, 'b, T: Real> CellEvaluator<'a, 'b, T> {
    fn evaluate(&mut self, node: &Tensor<T>) -> Result<DMatrix<T>, HybridizationError> {
        let cell_index = self.cell_index;
        match node {
            Tensor::Form(form) => self.form_matrix(form),
            Tensor::Coefficient(coefficient) => {
                let function = self.bindings.resolve(coefficient)?;
                let values = match coefficient.component_index() {
                    Some(component) => function.cell_component_coefficients(component, cell_index),
                    None => function.cell_coefficients(cell_index),
                };
                Ok(DMatrix::from_column_slice(values.len(), 1, values.as_slice()))
            }
            Tensor::Add(a, b) => Ok(self.evaluate(a)? + self.evaluate(b)?),
            Tensor::Sub(a, b) => Ok(self.evaluate(a)? - self.evaluate(b)?),
            Tensor::Neg(a) => Ok(-self.evaluate(a)?),
            Tensor::Mul(a, b) => match (a.as_ref(), b.as_ref()) {
                // A^-1 B is a solve with A
                (Tensor::Inverse(inner), _) => {
                    let lu = factorize(self.evaluate(inner)?, cell_index)?;
                    solve(&lu, &self.evaluate(b)?, cell_index)
                }
                // B A^-1 = (A^-T B^T)^T is a solve with A^T
                (_, Tensor::Inverse(inner)) => {
                    let lu = factorize(self.evaluate(inner)?.transpose(), cell_index)?;
                    Ok(solve(&lu, &self.evaluate(a)?.transpose(), cell_index)?.transpose())
                }
                _ => Ok(self.evaluate(a)? * self.evaluate(b)?),
            },
            Tensor::Transpose(a) => Ok(self.evaluate(a)?.transpose()),
            Tensor::Inverse(a) => {
                let lu = factorize(self.evaluate(a)?, cell_index)?;
                lu.try_inverse()
                    .ok_or(AlgebraicError::SingularLocalBlock { cell: cell_index }.into())
            }
        }
    }

    fn form_matrix(&mut self, form: &Arc<BilinearForm<T>>) -> Result<DMatrix<T>, HybridizationError> {
        let key = Arc::as_ptr(form);
        if let Some(matrix) = self.form_matrices.get(&key) {
            return Ok(matrix.clone());
        }
        let degree = self
            .quadrature_degree
            .unwrap_or_else(|| form.estimated_quadrature_degree());
        let matrix = form.assemble_cell_matrix(self.cell_index, degree)?;
        self.form_matrices.insert(key, matrix.clone());
        Ok(matrix)
    }
}

/// LU factorization that rejects numerically singular blocks.
///
/// A block is considered singular when its smallest pivot is negligible compared to its largest.
#[replace_float_literals(T::from_f64(literal).unwrap())]
fn factorize<T: Real>(matrix: DMatrix<T>, cell_index: usize) -> Result<LU<T, Dyn, Dyn>, AlgebraicError> {
    let n = matrix.nrows();
    let lu = matrix.lu();
    if n == 0 {
        return Ok(lu);
    }
    let pivots = lu.u().diagonal().map(|d| d.abs());
    let largest = pivots.max();
    let smallest = pivots.min();
    let tolerance = 10.0 * T::from_usize(n).unwrap() * T::default_epsilon() * largest;
    if largest == T::zero() || smallest <= tolerance {
        Err(AlgebraicError::SingularLocalBlock { cell: cell_index })
    } else {
        Ok(lu)
    }
}

fn solve<T: Real>(lu: &LU<T, Dyn, Dyn>, rhs: &DMatrix<T>, cell_index: usize) -> Result<DMatrix<T>, HybridizationError> {
    lu.solve(rhs)
        .ok_or_else(|| AlgebraicError::SingularLocalBlock { cell: cell_index }.into())
}
