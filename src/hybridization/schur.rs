//! Local elimination of the broken unknowns and assembly of the reduced trace system.
use crate::config::FormCompilerParameters;
use crate::error::HybridizationError;
use crate::form::{BilinearForm, FormTerm, Integrand, Measure};
use crate::function::Function;
use crate::hybridization::transform::HybridSpaces;
use crate::tensor::{assemble_matrix, assemble_matrix_into, assemble_vector_into, Bindings, Coefficient, KernelCompiler, LocalKernel, Tensor};
use crate::Real;
use log::debug;
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

/// Name of the coefficient holding the broken right-hand side in the elimination kernels.
pub const BROKEN_RHS: &str = "broken_rhs";

/// The reduced operator `S = K A^-1 K^T` and right-hand side `K A^-1 f_b` on the trace space.
///
/// Here `A` is the original operator restated on the broken space and `K` is the coupling
/// `<gamma, tau . n>` over the interior facets, with `gamma` a trace test function and `tau` a
/// broken flux. Every boundary trace degree of freedom is constrained to zero.
///
/// The sparse storage of `S` is allocated once and re-populated in place by
/// [`SchurComplement::update`].
#[derive(Debug)]
pub struct SchurComplement<T: Real> {
    broken_operator: Arc<BilinearForm<T>>,
    coupling: Arc<BilinearForm<T>>,
    operator_kernel: Box<dyn LocalKernel<T>>,
    elimination_kernel: Box<dyn LocalKernel<T>>,
    matrix: CsrMatrix<T>,
    rhs: Function<T>,
    spaces: HybridSpaces<T>,
}

impl<T: Real> SchurComplement<T> {
    /// Builds the reduced expressions for the given operator and assembles `S`.
    pub fn new(
        operator: &BilinearForm<T>,
        spaces: &HybridSpaces<T>,
        compiler: &dyn KernelCompiler<T>,
        parameters: &FormCompilerParameters,
    ) -> Result<Self, HybridizationError> {
        let broken_operator = Arc::new(operator.replace_arguments(spaces.broken.clone(), spaces.broken.clone())?);
        let coupling = Arc::new(
            BilinearForm::new(Arc::clone(&spaces.trace), spaces.broken.clone())?.with_term(FormTerm::new(
                Integrand::NormalTrial,
                0,
                spaces.vector_index,
                Measure::InteriorFacet,
            ))?,
        );

        let a = Tensor::form(Arc::clone(&broken_operator));
        let k = Tensor::form(Arc::clone(&coupling));
        let f = Tensor::coefficient(Coefficient::new(BROKEN_RHS, spaces.broken.clone()));
        let schur = &k * (a.inv() * k.t());
        let elimination = &k * (a.inv() * f);

        let operator_kernel = compiler.compile(&schur, parameters)?;
        let elimination_kernel = compiler.compile(&elimination, parameters)?;

        let mut matrix = assemble_matrix(operator_kernel.as_ref(), &Bindings::new())?;
        spaces.trace_bc.apply_to_matrix(&mut matrix);
        debug!(
            "Assembled reduced operator: {}x{} with {} nonzeros",
            matrix.nrows(),
            matrix.ncols(),
            matrix.nnz()
        );

        Ok(Self {
            broken_operator,
            coupling,
            operator_kernel,
            elimination_kernel,
            matrix,
            rhs: Function::new("schur_rhs", Arc::clone(&spaces.trace)),
            spaces: spaces.clone(),
        })
    }

    /// Re-assembles `S` into its existing storage, picking up changed constants.
    pub fn update(&mut self) -> Result<(), HybridizationError> {
        assemble_matrix_into(&mut self.matrix, self.operator_kernel.as_ref(), &Bindings::new())?;
        self.spaces.trace_bc.apply_to_matrix(&mut self.matrix);
        Ok(())
    }

    /// Assembles the reduced right-hand side `K A^-1 f_b`, zero on the boundary.
    pub fn assemble_rhs(&mut self, broken_rhs: &Function<T>) -> Result<(), HybridizationError> {
        let bindings = Bindings::new().bind(BROKEN_RHS, broken_rhs);
        assemble_vector_into(
            self.rhs.coefficients_mut(),
            self.elimination_kernel.as_ref(),
            &bindings,
        )?;
        self.spaces
            .trace_bc
            .apply_to_vector(self.rhs.coefficients_mut());
        Ok(())
    }

    /// The reduced operator, with boundary conditions applied.
    pub fn matrix(&self) -> &CsrMatrix<T> {
        &self.matrix
    }

    /// The most recently assembled reduced right-hand side.
    pub fn rhs(&self) -> &Function<T> {
        &self.rhs
    }

    /// The original operator posed on the broken space.
    pub fn broken_operator(&self) -> &Arc<BilinearForm<T>> {
        &self.broken_operator
    }

    /// The trace coupling form `K`.
    pub fn coupling(&self) -> &Arc<BilinearForm<T>> {
        &self.coupling
    }
}
