//! Symbolic algebra of element-local tensors.
//!
//! A [`Tensor`] is an expression tree over element-local matrices (assembled bilinear forms)
//! and vectors (coefficients of fields), combined with sums, differences, negation, products,
//! transposes and inverses. Expressions are compiled into [`LocalKernel`]s by a
//! [`KernelCompiler`], which checks shapes once, and the kernels are evaluated cell by cell and
//! assembled into global storage.
//!
//! ```ignore
//! let a = Tensor::form(broken_operator);
//! let k = Tensor::form(trace_coupling);
//! let schur = &k * a.inv() * k.t();
//! let kernel = Interpreter.compile(&schur, &parameters)?;
//! let matrix = assemble_matrix(kernel.as_ref(), &Bindings::new())?;
//! ```
use crate::assembly::global::{add_local_matrix_to_csr, add_local_vector, assemble_pattern, zero_csr_from_pattern};
use crate::error::{AlgebraicError, HybridizationError};
use crate::form::BilinearForm;
use crate::function::Function;
use crate::space::MixedSpace;
use crate::Real;
use nalgebra::{DMatrix, DVectorViewMut, Scalar};
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

mod interpreter;

pub use interpreter::Interpreter;

/// A named slot for the coefficient vector of a field, bound at assembly time.
#[derive(Debug, Clone)]
pub struct Coefficient<T: Scalar> {
    name: String,
    space: MixedSpace<T>,
    component: Option<usize>,
}

impl<T: Real> Coefficient<T> {
    /// A coefficient for a field on the given space.
    pub fn new(name: impl Into<String>, space: impl Into<MixedSpace<T>>) -> Self {
        Self {
            name: name.into(),
            space: space.into(),
            component: None,
        }
    }

    /// Restricts the coefficient to one component of the mixed field.
    pub fn component(self, index: usize) -> Self {
        Self {
            component: Some(index),
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The space of the bound field.
    pub fn space(&self) -> &MixedSpace<T> {
        &self.space
    }

    /// The space of the local vectors this coefficient produces.
    pub fn value_space(&self) -> MixedSpace<T> {
        match self.component {
            Some(index) => self.space.component(index),
            None => self.space.clone(),
        }
    }

    pub fn component_index(&self) -> Option<usize> {
        self.component
    }
}

/// Expression tree of element-local tensors.
#[derive(Debug, Clone)]
pub enum Tensor<T: Scalar> {
    /// The local matrices of a bilinear form.
    Form(Arc<BilinearForm<T>>),
    /// The local coefficient vectors of a field.
    Coefficient(Coefficient<T>),
    Add(Box<Tensor<T>>, Box<Tensor<T>>),
    Sub(Box<Tensor<T>>, Box<Tensor<T>>),
    Neg(Box<Tensor<T>>),
    Mul(Box<Tensor<T>>, Box<Tensor<T>>),
    Transpose(Box<Tensor<T>>),
    Inverse(Box<Tensor<T>>),
}

impl<T: Real> Tensor<T> {
    pub fn form(form: impl Into<Arc<BilinearForm<T>>>) -> Self {
        Self::Form(form.into())
    }

    pub fn coefficient(coefficient: Coefficient<T>) -> Self {
        Self::Coefficient(coefficient)
    }

    /// Transpose.
    pub fn t(&self) -> Self {
        Self::Transpose(Box::new(self.clone()))
    }

    /// Inverse. Products `A.inv() * B` are evaluated as local solves.
    pub fn inv(&self) -> Self {
        Self::Inverse(Box::new(self.clone()))
    }

    /// Infers the shape of the expression, checking all operands.
    pub fn shape(&self) -> Result<Shape<T>, AlgebraicError> {
        use Shape::*;
        match self {
            Self::Form(form) => Ok(Matrix(form.test_space().clone(), form.trial_space().clone())),
            Self::Coefficient(coefficient) => Ok(Vector(coefficient.value_space())),
            Self::Add(a, b) | Self::Sub(a, b) => {
                let operation = if matches!(self, Self::Add(..)) { "sum" } else { "difference" };
                match (a.shape()?, b.shape()?) {
                    (Vector(s1), Vector(s2)) if s1.is_compatible_with(&s2) => Ok(Vector(s1)),
                    (Matrix(r1, c1), Matrix(r2, c2)) if r1.is_compatible_with(&r2) && c1.is_compatible_with(&c2) => {
                        Ok(Matrix(r1, c1))
                    }
                    (s1, s2) if s1.rank() == s2.rank() => Err(AlgebraicError::IncompatibleSpaces { operation }),
                    (s1, s2) => Err(AlgebraicError::IncompatibleRanks {
                        operation,
                        left: s1.rank(),
                        right: s2.rank(),
                    }),
                }
            }
            Self::Neg(a) => a.shape(),
            Self::Mul(a, b) => match (a.shape()?, b.shape()?) {
                (Matrix(rows, inner1), Matrix(inner2, cols)) => {
                    if inner1.is_compatible_with(&inner2) {
                        Ok(Matrix(rows, cols))
                    } else {
                        Err(AlgebraicError::IncompatibleSpaces { operation: "product" })
                    }
                }
                (Matrix(rows, inner1), Vector(inner2)) => {
                    if inner1.is_compatible_with(&inner2) {
                        Ok(Vector(rows))
                    } else {
                        Err(AlgebraicError::IncompatibleSpaces { operation: "product" })
                    }
                }
                (s1, s2) => Err(AlgebraicError::IncompatibleRanks {
                    operation: "product",
                    left: s1.rank(),
                    right: s2.rank(),
                }),
            },
            Self::Transpose(a) => match a.shape()? {
                Matrix(rows, cols) => Ok(Matrix(cols, rows)),
                shape => Err(AlgebraicError::NotRank2 {
                    operation: "transpose",
                    rank: shape.rank(),
                }),
            },
            Self::Inverse(a) => match a.shape()? {
                Matrix(rows, cols) if rows.is_compatible_with(&cols) => Ok(Matrix(rows, cols)),
                Matrix(..) => Err(AlgebraicError::NonSquareInverse),
                shape => Err(AlgebraicError::NotRank2 {
                    operation: "inverse",
                    rank: shape.rank(),
                }),
            },
        }
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<T: Real> $trait<Tensor<T>> for Tensor<T> {
            type Output = Tensor<T>;

            fn $method(self, rhs: Tensor<T>) -> Self::Output {
                Tensor::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl<'a, T: Real> $trait<Tensor<T>> for &'a Tensor<T> {
            type Output = Tensor<T>;

            fn $method(self, rhs: Tensor<T>) -> Self::Output {
                Tensor::$variant(Box::new(self.clone()), Box::new(rhs))
            }
        }

        impl<'a, T: Real> $trait<&'a Tensor<T>> for Tensor<T> {
            type Output = Tensor<T>;

            fn $method(self, rhs: &'a Tensor<T>) -> Self::Output {
                Tensor::$variant(Box::new(self), Box::new(rhs.clone()))
            }
        }

        impl<'a, 'b, T: Real> $trait<&'b Tensor<T>> for &'a Tensor<T> {
            type Output = Tensor<T>;

            fn $method(self, rhs: &'b Tensor<T>) -> Self::Output {
                Tensor::$variant(Box::new(self.clone()), Box::new(rhs.clone()))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);

impl<T: Real> Neg for Tensor<T> {
    type Output = Tensor<T>;

    fn neg(self) -> Self::Output {
        Tensor::Neg(Box::new(self))
    }
}

impl<'a, T: Real> Neg for &'a Tensor<T> {
    type Output = Tensor<T>;

    fn neg(self) -> Self::Output {
        Tensor::Neg(Box::new(self.clone()))
    }
}

/// Shape of a local tensor: a vector over a space, or a matrix with row and column spaces.
#[derive(Debug, Clone)]
pub enum Shape<T: Scalar> {
    Vector(MixedSpace<T>),
    Matrix(MixedSpace<T>, MixedSpace<T>),
}

impl<T: Real> Shape<T> {
    pub fn rank(&self) -> usize {
        match self {
            Self::Vector(_) => 1,
            Self::Matrix(..) => 2,
        }
    }

    pub fn row_space(&self) -> &MixedSpace<T> {
        match self {
            Self::Vector(space) | Self::Matrix(space, _) => space,
        }
    }
}

/// Fields bound to the named coefficients of an expression.
#[derive(Debug, Clone, Default)]
pub struct Bindings<'a, T: Scalar> {
    functions: BTreeMap<String, &'a Function<T>>,
}

impl<'a, T: Real> Bindings<'a, T> {
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, function: &'a Function<T>) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    /// The function bound to the coefficient, checked against the declared space.
    pub fn resolve(&self, coefficient: &Coefficient<T>) -> Result<&'a Function<T>, AlgebraicError> {
        let function = self
            .functions
            .get(coefficient.name())
            .copied()
            .ok_or_else(|| AlgebraicError::UnboundCoefficient {
                name: coefficient.name().to_string(),
            })?;
        if function.space().is_compatible_with(coefficient.space()) {
            Ok(function)
        } else {
            Err(AlgebraicError::IncompatibleBinding {
                name: coefficient.name().to_string(),
            })
        }
    }
}

/// A compiled expression that produces one dense local tensor per cell.
///
/// Vectors are returned as matrices with a single column.
pub trait LocalKernel<T: Real>: Send + Sync + fmt::Debug {
    fn shape(&self) -> &Shape<T>;

    fn evaluate(&self, cell_index: usize, bindings: &Bindings<T>) -> Result<DMatrix<T>, HybridizationError>;
}

/// Generates local kernels from tensor expressions.
pub trait KernelCompiler<T: Real>: Send + Sync + fmt::Debug {
    fn compile(
        &self,
        expression: &Tensor<T>,
        parameters: &crate::config::FormCompilerParameters,
    ) -> Result<Box<dyn LocalKernel<T>>, HybridizationError>;
}

fn evaluate_all_cells<T: Real>(
    kernel: &dyn LocalKernel<T>,
    bindings: &Bindings<T>,
) -> Result<Vec<DMatrix<T>>, HybridizationError> {
    let num_cells = kernel.shape().row_space().mesh().num_cells();
    (0..num_cells)
        .into_par_iter()
        .map(|cell_index| kernel.evaluate(cell_index, bindings))
        .collect()
}

fn expect_rank<T: Real>(kernel: &dyn LocalKernel<T>, expected: usize) -> Result<(), AlgebraicError> {
    let actual = kernel.shape().rank();
    if actual == expected {
        Ok(())
    } else {
        Err(AlgebraicError::UnexpectedRank { expected, actual })
    }
}

fn matrix_spaces<T: Real>(kernel: &dyn LocalKernel<T>) -> Result<(&MixedSpace<T>, &MixedSpace<T>), AlgebraicError> {
    match kernel.shape() {
        Shape::Matrix(rows, cols) => Ok((rows, cols)),
        Shape::Vector(_) => Err(AlgebraicError::UnexpectedRank { expected: 2, actual: 1 }),
    }
}

/// Assembles a rank-2 kernel into a newly allocated CSR matrix.
pub fn assemble_matrix<T: Real>(
    kernel: &dyn LocalKernel<T>,
    bindings: &Bindings<T>,
) -> Result<CsrMatrix<T>, HybridizationError> {
    let (rows, cols) = matrix_spaces(kernel)?;
    let mut matrix = zero_csr_from_pattern(assemble_pattern(rows, cols)?)?;
    assemble_matrix_into(&mut matrix, kernel, bindings)?;
    Ok(matrix)
}

/// Re-populates the values of an existing CSR matrix, keeping its sparsity pattern.
pub fn assemble_matrix_into<T: Real>(
    matrix: &mut CsrMatrix<T>,
    kernel: &dyn LocalKernel<T>,
    bindings: &Bindings<T>,
) -> Result<(), HybridizationError> {
    let (rows, cols) = matrix_spaces(kernel)?;
    let local_matrices = evaluate_all_cells(kernel, bindings)?;

    matrix.values_mut().fill(T::zero());
    let mut row_dofs = Vec::new();
    let mut col_dofs = Vec::new();
    for (cell_index, local) in local_matrices.iter().enumerate() {
        rows.populate_cell_dofs(&mut row_dofs, cell_index);
        cols.populate_cell_dofs(&mut col_dofs, cell_index);
        add_local_matrix_to_csr(matrix, &row_dofs, &col_dofs, local)?;
    }
    Ok(())
}

/// Assembles a rank-1 kernel into a global vector by summing the local contributions.
///
/// The vector is zeroed first.
pub fn assemble_vector_into<'a, T: Real>(
    vector: impl Into<DVectorViewMut<'a, T>>,
    kernel: &dyn LocalKernel<T>,
    bindings: &Bindings<T>,
) -> Result<(), HybridizationError> {
    expect_rank(kernel, 1)?;
    let space = kernel.shape().row_space();
    let mut vector = vector.into();
    assert_eq!(vector.len(), space.num_dofs());
    let local_vectors = evaluate_all_cells(kernel, bindings)?;

    vector.fill(T::zero());
    let mut dofs = Vec::new();
    for (cell_index, local) in local_vectors.into_iter().enumerate() {
        space.populate_cell_dofs(&mut dofs, cell_index);
        add_local_vector(&mut vector, &dofs, &local.column(0).into_owned());
    }
    Ok(())
}

/// Evaluates a rank-1 kernel cell by cell and writes the local results into a global vector.
///
/// Intended for discontinuous targets, where every degree of freedom belongs to one cell. Shared
/// degrees of freedom receive the value of the last cell visited.
pub fn evaluate_local_into<'a, T: Real>(
    vector: impl Into<DVectorViewMut<'a, T>>,
    kernel: &dyn LocalKernel<T>,
    bindings: &Bindings<T>,
) -> Result<(), HybridizationError> {
    expect_rank(kernel, 1)?;
    let space = kernel.shape().row_space();
    let mut vector = vector.into();
    assert_eq!(vector.len(), space.num_dofs());
    let local_vectors = evaluate_all_cells(kernel, bindings)?;

    let mut dofs = Vec::new();
    for (cell_index, local) in local_vectors.into_iter().enumerate() {
        space.populate_cell_dofs(&mut dofs, cell_index);
        for (&dof, &value) in dofs.iter().zip(local.iter()) {
            vector[dof] = value;
        }
    }
    Ok(())
}
