use crate::config::{FormCompilerParameters, HybridizationConfig, OptionsDatabase};
use crate::error::{ConfigurationError, HybridizationError};
use crate::form::BilinearForm;
use crate::function::Function;
use crate::hybridization::nullspace::transfer_nullspace;
use crate::hybridization::projection::{copy_scalar_component, ConformingProjector, LocalProjector, RhsTransfer};
use crate::hybridization::reconstruct::Reconstruction;
use crate::hybridization::reduced::ReducedSolver;
use crate::hybridization::schur::SchurComplement;
use crate::hybridization::transform::{hybridize_spaces, HybridSpaces};
use crate::tensor::{Interpreter, KernelCompiler};
use crate::Real;
use eyre::eyre;
use hybridization_sparse::Nullspace;
use log::{debug, info};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use std::fmt;
use std::sync::Arc;

/// The lifecycle of a preconditioner: set up once, updated whenever the operator values change,
/// applied once per outer iteration.
pub trait Preconditioner<T: Real> {
    fn initialize(&mut self, context: &PcContext<T>) -> Result<(), HybridizationError>;

    fn update(&mut self, context: &PcContext<T>) -> Result<(), HybridizationError>;

    /// Computes `y = P x`.
    fn apply(&mut self, x: DVectorView<T>, y: DVectorViewMut<T>) -> Result<(), HybridizationError>;

    /// Computes `y = P^T x`.
    fn apply_transpose(&mut self, x: DVectorView<T>, y: DVectorViewMut<T>) -> Result<(), HybridizationError>;

    fn view(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

/// Everything a preconditioner learns about the problem it is attached to.
#[derive(Debug, Clone)]
pub struct PcContext<T: Real> {
    /// The mixed operator. Its test space determines the mixed space being hybridized.
    pub operator: Arc<BilinearForm<T>>,
    pub form_compiler_parameters: FormCompilerParameters,
    /// Vectors spanning the nullspace of the operator, if any.
    pub nullspace: Option<Vec<DVector<T>>>,
    /// Prefix of the options read at setup.
    pub options_prefix: String,
    pub options: OptionsDatabase,
}

impl<T: Real> PcContext<T> {
    pub fn new(operator: impl Into<Arc<BilinearForm<T>>>) -> Self {
        Self {
            operator: operator.into(),
            form_compiler_parameters: FormCompilerParameters::default(),
            nullspace: None,
            options_prefix: String::new(),
            options: OptionsDatabase::new(),
        }
    }

    pub fn with_options(self, options_prefix: impl Into<String>, options: OptionsDatabase) -> Self {
        Self {
            options_prefix: options_prefix.into(),
            options,
            ..self
        }
    }

    pub fn with_nullspace(self, vectors: Vec<DVector<T>>) -> Self {
        Self {
            nullspace: Some(vectors),
            ..self
        }
    }

    pub fn with_form_compiler_parameters(self, form_compiler_parameters: FormCompilerParameters) -> Self {
        Self {
            form_compiler_parameters,
            ..self
        }
    }
}

/// State owned by a set-up preconditioner.
#[derive(Debug)]
struct ReadyState<T: Real> {
    config: HybridizationConfig,
    spaces: HybridSpaces<T>,
    schur: SchurComplement<T>,
    reduced: ReducedSolver<T>,
    reconstruction: Reconstruction<T>,
    rhs_transfer: RhsTransfer<T>,
    projector: ConformingProjector<T>,
    unbroken_rhs: Function<T>,
    broken_rhs: Function<T>,
    trace_solution: Function<T>,
    broken_solution: Function<T>,
    unbroken_solution: Function<T>,
}

/// Hybridization preconditioner for mixed H(div) x L2 saddle-point operators.
///
/// Applying the preconditioner solves the original mixed system exactly (up to the tolerances
/// of the reduced solver and of the flux projection) by way of the hybridized system, so it can
/// be used as a direct solver with `preonly`-style outer iterations.
///
/// ```ignore
/// let mut pc = HybridizationPc::new();
/// pc.initialize(&PcContext::new(operator))?;
/// pc.apply(rhs.as_view(), solution.as_view_mut())?;
/// ```
#[derive(Debug)]
pub struct HybridizationPc<T: Real> {
    compiler: Arc<dyn KernelCompiler<T>>,
    state: Option<Box<ReadyState<T>>>,
}

impl<T: Real> Default for HybridizationPc<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> HybridizationPc<T> {
    /// A preconditioner generating its local kernels with the [`Interpreter`].
    pub fn new() -> Self {
        Self::with_compiler(Arc::new(Interpreter))
    }

    pub fn with_compiler(compiler: Arc<dyn KernelCompiler<T>>) -> Self {
        Self { compiler, state: None }
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Releases all state. The preconditioner must be initialized again before use.
    pub fn teardown(&mut self) {
        if self.state.take().is_some() {
            debug!("Hybridization preconditioner torn down");
        }
    }

    pub fn config(&self) -> Option<&HybridizationConfig> {
        self.state.as_ref().map(|state| &state.config)
    }

    pub fn spaces(&self) -> Option<&HybridSpaces<T>> {
        self.state.as_ref().map(|state| &state.spaces)
    }

    /// The reduced operator on the trace space.
    pub fn schur_complement(&self) -> Option<&CsrMatrix<T>> {
        self.state.as_ref().map(|state| state.schur.matrix())
    }

    /// The reduced right-hand side of the most recent application or update.
    pub fn schur_rhs(&self) -> Option<&DVector<T>> {
        self.state
            .as_ref()
            .map(|state| state.schur.rhs().coefficients())
    }

    /// The nullspace attached to the reduced operator.
    pub fn reduced_nullspace(&self) -> Option<&Nullspace<T>> {
        self.state
            .as_ref()
            .and_then(|state| state.reduced.nullspace())
    }

    pub fn trace_solution(&self) -> Option<&Function<T>> {
        self.state.as_ref().map(|state| &state.trace_solution)
    }

    pub fn broken_solution(&self) -> Option<&Function<T>> {
        self.state.as_ref().map(|state| &state.broken_solution)
    }

    fn set_up(&self, context: &PcContext<T>) -> Result<ReadyState<T>, HybridizationError> {
        let operator = &context.operator;
        let spaces = hybridize_spaces(operator.test_space())?;
        if !operator.test_space().is_compatible_with(operator.trial_space()) {
            return Err(ConfigurationError::MismatchedArguments.into());
        }
        let config = HybridizationConfig::from_options(&context.options, &context.options_prefix)?;
        let compiler = self.compiler.as_ref();
        let parameters = &context.form_compiler_parameters;

        let schur = SchurComplement::new(operator, &spaces, compiler, parameters)?;

        let nullspace = match &context.nullspace {
            Some(vectors) => {
                let projector = LocalProjector::new(&spaces, compiler, parameters)?;
                transfer_nullspace(vectors, &spaces, &schur, &projector, compiler, parameters)?
            }
            None => None,
        };
        let mut reduced = ReducedSolver::new(config.inner_solver.clone(), nullspace);
        reduced.refresh(schur.matrix())?;

        let reconstruction = Reconstruction::new(schur.broken_operator(), schur.coupling(), &spaces, compiler, parameters)?;
        let rhs_transfer = RhsTransfer::new(&spaces);
        let projector = ConformingProjector::new(&spaces, compiler, parameters, config.projector_tolerance)?;

        info!(
            "Hybridization set up: {} conforming dofs, {} broken dofs, reduced system of size {} with {} nonzeros",
            spaces.original.num_dofs(),
            spaces.broken.num_dofs(),
            schur.matrix().nrows(),
            schur.matrix().nnz()
        );
        info!(
            "Reduced solver: ksp_type = {}, pc_type = {}, rtol = {:e}",
            config.inner_solver.ksp_type, config.inner_solver.pc_type, config.inner_solver.rtol
        );

        Ok(ReadyState {
            unbroken_rhs: Function::new("unbroken_rhs", spaces.original.clone()),
            broken_rhs: Function::new("broken_rhs", spaces.broken.clone()),
            trace_solution: Function::new("trace_solution", Arc::clone(&spaces.trace)),
            broken_solution: Function::new("broken_solution", spaces.broken.clone()),
            unbroken_solution: Function::new("unbroken_solution", spaces.original.clone()),
            config,
            spaces,
            schur,
            reduced,
            reconstruction,
            rhs_transfer,
            projector,
        })
    }
}

impl<T: Real> Preconditioner<T> for HybridizationPc<T> {
    fn initialize(&mut self, context: &PcContext<T>) -> Result<(), HybridizationError> {
        self.state = None;
        let state = self.set_up(context)?;
        self.state = Some(Box::new(state));
        Ok(())
    }

    /// Re-assembles the reduced operator and right-hand side from the current operator values.
    fn update(&mut self, _context: &PcContext<T>) -> Result<(), HybridizationError> {
        let state = self.state.as_deref_mut().ok_or(HybridizationError::NotSetUp)?;
        state.schur.update()?;
        state.schur.assemble_rhs(&state.broken_rhs)?;
        state.reduced.mark_stale();
        debug!("Reduced operator re-assembled");
        Ok(())
    }

    fn apply(&mut self, x: DVectorView<T>, mut y: DVectorViewMut<T>) -> Result<(), HybridizationError> {
        let state = self.state.as_deref_mut().ok_or(HybridizationError::NotSetUp)?;
        let n = state.spaces.original.num_dofs();
        if x.len() != n || y.len() != n {
            return Err(eyre!(
                "input of length {} and output of length {} do not match the {} dofs of the mixed space",
                x.len(),
                y.len(),
                n
            )
            .into());
        }

        state.unbroken_rhs.coefficients_mut().copy_from(&x);
        state
            .rhs_transfer
            .transfer(&state.unbroken_rhs, &mut state.broken_rhs);
        state.schur.assemble_rhs(&state.broken_rhs)?;

        state.reduced.solve(
            state.schur.matrix(),
            state.schur.rhs().coefficients(),
            state.trace_solution.coefficients_mut(),
        )?;

        state
            .reconstruction
            .reconstruct(&state.broken_rhs, &state.trace_solution, &mut state.broken_solution)?;

        copy_scalar_component(&state.spaces, &state.broken_solution, &mut state.unbroken_solution);
        let vector_index = state.spaces.vector_index;
        let iterations = state.projector.project(
            &state.broken_solution,
            state.unbroken_solution.component_mut(vector_index),
        )?;
        debug!("Projected flux into the conforming space in {} iterations", iterations);

        y.copy_from(state.unbroken_solution.coefficients());
        Ok(())
    }

    fn apply_transpose(&mut self, _x: DVectorView<T>, _y: DVectorViewMut<T>) -> Result<(), HybridizationError> {
        Err(HybridizationError::NotImplemented("transpose application of the hybridization preconditioner"))
    }

    fn view(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let state = match &self.state {
            Some(state) => state,
            None => return writeln!(out, "Hybridization preconditioner (not set up)"),
        };
        let spaces = &state.spaces;
        let flux = spaces.original.sub(spaces.vector_index).element();
        let scalar = spaces.original.sub(spaces.scalar_index).element();
        let trace = spaces.trace.element();
        writeln!(out, "Hybridization preconditioner")?;
        writeln!(
            out,
            "  mixed space: {}{} x {}{} ({} dofs), broken: {} dofs",
            flux.family(),
            flux.degree(),
            scalar.family(),
            scalar.degree(),
            spaces.original.num_dofs(),
            spaces.broken.num_dofs()
        )?;
        writeln!(
            out,
            "  trace space: {}{} ({} dofs, {} on the boundary)",
            trace.family(),
            trace.degree(),
            spaces.trace.num_dofs(),
            spaces.trace_bc.dofs().len()
        )?;
        writeln!(
            out,
            "  reduced operator: S = K A^-1 K^T, {}x{} with {} nonzeros",
            state.schur.matrix().nrows(),
            state.schur.matrix().ncols(),
            state.schur.matrix().nnz()
        )?;
        writeln!(out, "  flux projection: rtol = {:e}", state.config.projector_tolerance)?;
        state.reduced.view(out)
    }
}
