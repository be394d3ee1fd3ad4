//! Transfer of a nullspace of the original operator to the reduced trace operator.
//!
//! A kernel vector `x` of the original operator, transferred to the broken space as `x_b`,
//! satisfies the broken equations `A x_b + K^T lambda = 0` and `K x_b = 0` for some trace
//! vector `lambda`, since the conforming test functions are sums of broken ones. The multiplier
//! then lies in the kernel of the reduced operator, `S lambda = K A^-1 K^T lambda = -K x_b = 0`.
//!
//! `K^T` is injective on the interior facets, so `lambda` is recovered from the normal equations
//! `K K^T lambda = -K A x_b`. Both sides are sums of cell-local contributions because every
//! broken degree of freedom belongs to a single cell.
use crate::config::FormCompilerParameters;
use crate::error::{HybridizationError, ReducedSolveError};
use crate::function::Function;
use crate::hybridization::projection::{copy_scalar_component, LocalProjector};
use crate::hybridization::schur::SchurComplement;
use crate::hybridization::transform::HybridSpaces;
use crate::tensor::{assemble_matrix, assemble_vector_into, Bindings, Coefficient, KernelCompiler, Tensor};
use crate::Real;
use eyre::eyre;
use hybridization_sparse::Nullspace;
use log::{debug, warn};
use nalgebra::DVector;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::CscMatrix;
use std::sync::Arc;

const BROKEN_NULLSPACE_VECTOR: &str = "broken_nullspace_vector";

/// Maps nullspace vectors of the original operator to the kernel of the reduced operator.
///
/// Each vector is interpreted as a field on the conforming mixed space and transferred to the
/// broken space (local projection of the flux, copy of the scalar). Its trace multiplier is
/// checked to satisfy `|S lambda| <= sqrt(eps) |S|_F |lambda|`, and the multipliers are
/// orthonormalized, so the reduced nullspace has as many vectors as the original one.
///
/// Returns `None` when no vectors are given.
pub fn transfer_nullspace<T: Real>(
    vectors: &[DVector<T>],
    spaces: &HybridSpaces<T>,
    schur: &SchurComplement<T>,
    projector: &LocalProjector<T>,
    compiler: &dyn KernelCompiler<T>,
    parameters: &FormCompilerParameters,
) -> Result<Option<Nullspace<T>>, HybridizationError> {
    if vectors.is_empty() {
        warn!("Nullspace attached to the operator has no vectors, ignoring it");
        return Ok(None);
    }

    let a = Tensor::form(Arc::clone(schur.broken_operator()));
    let k = Tensor::form(Arc::clone(schur.coupling()));
    let x = Tensor::coefficient(Coefficient::new(BROKEN_NULLSPACE_VECTOR, spaces.broken.clone()));
    let gram_kernel = compiler.compile(&(&k * k.t()), parameters)?;
    let residual_kernel = compiler.compile(&(&k * (a * x)), parameters)?;

    // Boundary multipliers do not couple to any broken flux
    let mut gram = assemble_matrix(gram_kernel.as_ref(), &Bindings::new())?;
    spaces.trace_bc.apply_to_matrix(&mut gram);
    let cholesky = CscCholesky::factor(&CscMatrix::from(&gram)).map_err(|_| ReducedSolveError::CholeskyFailed)?;

    let reduced = schur.matrix();
    let reduced_norm = reduced
        .values()
        .iter()
        .fold(T::zero(), |sum, &v| sum + v * v)
        .sqrt();
    let tolerance = T::default_epsilon().sqrt() * reduced_norm;

    let mut broken = Function::new(BROKEN_NULLSPACE_VECTOR, spaces.broken.clone());
    let mut residual = DVector::zeros(spaces.trace.num_dofs());
    let mut multipliers = Vec::with_capacity(vectors.len());
    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != spaces.original.num_dofs() {
            return Err(eyre!(
                "nullspace vector {} has length {}, expected {}",
                index,
                vector.len(),
                spaces.original.num_dofs()
            )
            .into());
        }
        let conforming = Function::from_coefficients("nullspace_vector", spaces.original.clone(), vector.clone())?;
        projector.project(&conforming, &mut broken)?;
        copy_scalar_component(spaces, &conforming, &mut broken);

        let bindings = Bindings::new().bind(BROKEN_NULLSPACE_VECTOR, &broken);
        assemble_vector_into(&mut residual, residual_kernel.as_ref(), &bindings)?;
        residual.neg_mut();
        spaces.trace_bc.apply_to_vector(&mut residual);
        let multiplier = cholesky.solve(&residual).column(0).into_owned();

        let image_norm = (reduced * &multiplier).norm();
        if image_norm > tolerance * multiplier.norm() {
            return Err(ReducedSolveError::NotInKernel { index }.into());
        }
        multipliers.push(multiplier);
    }

    let nullspace = Nullspace::new(multipliers)?;
    debug!("Transferred nullspace with {} vectors to the trace space", nullspace.len());
    Ok(Some(nullspace))
}
