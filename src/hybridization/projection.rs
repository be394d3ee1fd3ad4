//! Transfers between the conforming mixed space and its broken counterpart.
//!
//! - Right-hand sides (dual quantities) go from conforming to broken by splitting each shared
//!   degree of freedom evenly among the cells that reference it ([`RhsTransfer`]).
//! - Fields (primal quantities) go from conforming to broken by a cell-local L2 projection
//!   ([`LocalProjector`]) and from broken to conforming by a global L2 projection solved with
//!   conjugate gradients ([`ConformingProjector`]).
//!
//! The scalar component is discontinuous in both representations and is copied verbatim.
use crate::config::FormCompilerParameters;
use crate::error::{HybridizationError, ReducedSolveError};
use crate::form::{BilinearForm, FormTerm, Integrand, Measure};
use crate::function::Function;
use crate::hybridization::transform::HybridSpaces;
use crate::space::FunctionSpace;
use crate::tensor::{
    assemble_matrix, assemble_vector_into, evaluate_local_into, Bindings, Coefficient, KernelCompiler, LocalKernel,
    Tensor,
};
use crate::Real;
use hybridization_sparse::cg::{CgWorkspace, ConjugateGradient, RelativeResidualCriterion};
use hybridization_sparse::JacobiPreconditioner;
use log::debug;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

const CONFORMING_FIELD: &str = "conforming_field";
const BROKEN_FIELD: &str = "broken_field";

/// Copies the scalar component between two mixed fields sharing the cell-wise numbering of a
/// discontinuous space.
pub fn copy_scalar_component<T: Real>(spaces: &HybridSpaces<T>, source: &Function<T>, target: &mut Function<T>) {
    let index = spaces.scalar_index;
    target.component_mut(index).copy_from(&source.component(index));
}

/// Distributes a conforming right-hand side onto the broken space.
///
/// Each broken copy of a conforming degree of freedom receives the conforming value divided
/// by the number of copies, so that summing the broken vector back over the copies recovers
/// the conforming one exactly.
#[derive(Debug, Clone)]
pub struct RhsTransfer<T: Real> {
    spaces: HybridSpaces<T>,
    /// Conforming flux dof of every broken flux dof.
    conforming_dof: Vec<usize>,
    inverse_multiplicity: DVector<T>,
}

impl<T: Real> RhsTransfer<T> {
    pub fn new(spaces: &HybridSpaces<T>) -> Self {
        let conforming = spaces.original.sub(spaces.vector_index);
        let broken = spaces.broken.sub(spaces.vector_index);
        let mut conforming_dof = vec![0; broken.num_dofs()];
        for cell_index in 0..conforming.mesh().num_cells() {
            for (&b, &c) in broken
                .cell_dofs(cell_index)
                .iter()
                .zip(conforming.cell_dofs(cell_index))
            {
                conforming_dof[b] = c;
            }
        }
        let multiplicity = conforming.dof_multiplicity();
        let inverse_multiplicity = DVector::from_iterator(
            multiplicity.len(),
            multiplicity
                .iter()
                .map(|&m| if m == 0 { T::zero() } else { T::one() / nalgebra::convert::<f64, T>(m as f64) }),
        );
        Self {
            spaces: spaces.clone(),
            conforming_dof,
            inverse_multiplicity,
        }
    }

    /// Writes the broken right-hand side corresponding to the conforming one.
    pub fn transfer(&self, conforming: &Function<T>, broken: &mut Function<T>) {
        let index = self.spaces.vector_index;
        let source = conforming.component(index);
        let mut target = broken.component_mut(index);
        for (b, &c) in self.conforming_dof.iter().enumerate() {
            target[b] = source[c] * self.inverse_multiplicity[c];
        }
        copy_scalar_component(&self.spaces, conforming, broken);
    }
}

/// Cell-local L2 projection of conforming flux fields into the broken flux space.
#[derive(Debug)]
pub struct LocalProjector<T: Real> {
    spaces: HybridSpaces<T>,
    kernel: Box<dyn LocalKernel<T>>,
}

impl<T: Real> LocalProjector<T> {
    pub fn new(
        spaces: &HybridSpaces<T>,
        compiler: &dyn KernelCompiler<T>,
        parameters: &FormCompilerParameters,
    ) -> Result<Self, HybridizationError> {
        let index = spaces.vector_index;
        let broken = Arc::clone(spaces.broken.sub(index));
        let conforming = Arc::clone(spaces.original.sub(index));
        let inner = |test: Arc<FunctionSpace<T>>, trial: Arc<FunctionSpace<T>>| -> eyre::Result<Arc<BilinearForm<T>>> {
            Ok(Arc::new(
                BilinearForm::new(test, trial)?.with_term(FormTerm::new(Integrand::Inner, 0, 0, Measure::Cell))?,
            ))
        };
        let mass = Tensor::form(inner(Arc::clone(&broken), Arc::clone(&broken))?);
        let mixed_mass = Tensor::form(inner(broken, conforming)?);
        let field = Tensor::coefficient(Coefficient::new(CONFORMING_FIELD, spaces.original.clone()).component(index));
        let kernel = compiler.compile(&(mass.inv() * (mixed_mass * field)), parameters)?;
        Ok(Self {
            spaces: spaces.clone(),
            kernel,
        })
    }

    /// Projects the flux component of `conforming` into the flux component of `broken`.
    pub fn project(&self, conforming: &Function<T>, broken: &mut Function<T>) -> Result<(), HybridizationError> {
        let bindings = Bindings::new().bind(CONFORMING_FIELD, conforming);
        evaluate_local_into(
            broken.component_mut(self.spaces.vector_index),
            self.kernel.as_ref(),
            &bindings,
        )
    }
}

/// Global L2 projection of broken flux fields into the conforming flux space.
///
/// The conforming mass matrix and its Jacobi preconditioner are assembled once.
#[derive(Debug)]
pub struct ConformingProjector<T: Real> {
    spaces: HybridSpaces<T>,
    mass: CsrMatrix<T>,
    preconditioner: JacobiPreconditioner<T>,
    rhs_kernel: Box<dyn LocalKernel<T>>,
    rhs: DVector<T>,
    workspace: CgWorkspace<T>,
    tolerance: T,
    max_iter: usize,
}

impl<T: Real> ConformingProjector<T> {
    pub fn new(
        spaces: &HybridSpaces<T>,
        compiler: &dyn KernelCompiler<T>,
        parameters: &FormCompilerParameters,
        tolerance: f64,
    ) -> Result<Self, HybridizationError> {
        let index = spaces.vector_index;
        let conforming = Arc::clone(spaces.original.sub(index));
        let broken = Arc::clone(spaces.broken.sub(index));
        let inner = FormTerm::new(Integrand::Inner, 0, 0, Measure::Cell);

        let mass_form = BilinearForm::new(Arc::clone(&conforming), Arc::clone(&conforming))?.with_term(inner.clone())?;
        let mass_kernel = compiler.compile(&Tensor::form(mass_form), parameters)?;
        let mass = assemble_matrix(mass_kernel.as_ref(), &Bindings::new())?;
        let preconditioner = JacobiPreconditioner::from_csr(&mass);

        let mixed_mass = BilinearForm::new(Arc::clone(&conforming), broken)?.with_term(inner)?;
        let field = Coefficient::new(BROKEN_FIELD, spaces.broken.clone()).component(index);
        let rhs_kernel = compiler.compile(&(Tensor::form(mixed_mass) * Tensor::coefficient(field)), parameters)?;

        let n = conforming.num_dofs();
        debug!("Assembled conforming flux mass matrix with {} nonzeros", mass.nnz());
        Ok(Self {
            spaces: spaces.clone(),
            mass,
            preconditioner,
            rhs_kernel,
            rhs: DVector::zeros(n),
            workspace: CgWorkspace::default(),
            tolerance: nalgebra::convert(tolerance),
            max_iter: 10 * n.max(100),
        })
    }

    /// Limits the number of CG iterations of each projection. Defaults to ten times the number
    /// of conforming flux dofs, but at least 1000.
    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self { max_iter, ..self }
    }

    /// Projects the flux component of `broken` into `output`, a conforming flux vector.
    ///
    /// Returns the number of CG iterations.
    pub fn project<'a>(
        &mut self,
        broken: &Function<T>,
        output: impl Into<DVectorViewMut<'a, T>>,
    ) -> Result<usize, HybridizationError> {
        let bindings = Bindings::new().bind(BROKEN_FIELD, broken);
        assemble_vector_into(&mut self.rhs, self.rhs_kernel.as_ref(), &bindings)?;

        let mut output = output.into();
        output.fill(T::zero());
        let result = ConjugateGradient::with_workspace(&mut self.workspace)
            .with_operator(&self.mass)
            .with_preconditioner(&self.preconditioner)
            .with_stopping_criterion(RelativeResidualCriterion::new(self.tolerance))
            .with_max_iter(self.max_iter)
            .solve_with_guess(&self.rhs, &mut output);
        match result {
            Ok(cg_output) => Ok(cg_output.num_iterations),
            Err(err) => Err(ReducedSolveError::Projection {
                num_iterations: err.output.num_iterations,
                kind: err.kind,
            }
            .into()),
        }
    }

    /// The conforming flux mass matrix.
    pub fn mass_matrix(&self) -> &CsrMatrix<T> {
        &self.mass
    }

    /// The right-hand side of the most recent projection.
    pub fn rhs(&self) -> DVectorView<T> {
        self.rhs.as_view()
    }

    pub fn spaces(&self) -> &HybridSpaces<T> {
        &self.spaces
    }
}
