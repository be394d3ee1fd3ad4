//! Solution of the reduced trace system.
use crate::config::{InnerSolverOptions, KspType, PcType};
use crate::error::{HybridizationError, ReducedSolveError};
use crate::Real;
use hybridization_sparse::cg::{CgWorkspace, ConjugateGradient, RelativeResidualCriterion};
use hybridization_sparse::{IdentityOperator, JacobiPreconditioner, LinearOperator, Nullspace};
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use std::error::Error;
use std::fmt;

/// Sparse Cholesky factorization applied as an operator, `y = S^-1 x`.
struct CholeskyOperator<'a, T: Real>(&'a CscCholesky<T>);

impl<'a, T: Real> LinearOperator<T> for CholeskyOperator<'a, T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        let solution = self.0.solve(&x.clone_owned());
        y.copy_from(&solution.column(0));
        Ok(())
    }
}

/// Solver for `S lambda = r` configured by [`InnerSolverOptions`].
///
/// Preconditioners and factorizations are computed lazily: after [`ReducedSolver::mark_stale`]
/// they are refreshed at the beginning of the next solve.
#[derive(Debug)]
pub struct ReducedSolver<T: Real> {
    options: InnerSolverOptions,
    nullspace: Option<Nullspace<T>>,
    jacobi: Option<JacobiPreconditioner<T>>,
    cholesky: Option<CscCholesky<T>>,
    workspace: CgWorkspace<T>,
    stale: bool,
    last_iterations: Option<usize>,
}

impl<T: Real> ReducedSolver<T> {
    pub fn new(options: InnerSolverOptions, nullspace: Option<Nullspace<T>>) -> Self {
        Self {
            options,
            nullspace,
            jacobi: None,
            cholesky: None,
            workspace: CgWorkspace::default(),
            stale: true,
            last_iterations: None,
        }
    }

    pub fn options(&self) -> &InnerSolverOptions {
        &self.options
    }

    pub fn nullspace(&self) -> Option<&Nullspace<T>> {
        self.nullspace.as_ref()
    }

    /// Marks the preconditioner as out of date with respect to the operator values.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Iterations taken by the most recent solve.
    pub fn last_iterations(&self) -> Option<usize> {
        self.last_iterations
    }

    /// Recomputes the preconditioner or factorization from the current operator values.
    pub fn refresh(&mut self, operator: &CsrMatrix<T>) -> Result<(), HybridizationError> {
        match self.options.pc_type {
            PcType::None => {}
            PcType::Jacobi => match &mut self.jacobi {
                Some(jacobi) => jacobi.update_from_csr(operator),
                None => self.jacobi = Some(JacobiPreconditioner::from_csr(operator)),
            },
            PcType::Cholesky => {
                let csc = CscMatrix::from(operator);
                let refactored = match &mut self.cholesky {
                    Some(cholesky) => cholesky.refactor(csc.values()).is_ok(),
                    None => false,
                };
                if !refactored {
                    let cholesky = CscCholesky::factor(&csc).map_err(|_| ReducedSolveError::CholeskyFailed)?;
                    self.cholesky = Some(cholesky);
                }
            }
        }
        self.stale = false;
        Ok(())
    }

    /// Solves `operator * solution = rhs`, refreshing the preconditioner first if needed.
    ///
    /// The initial guess is zero. With a nullspace, the returned solution is orthogonal to it.
    /// Returns the number of iterations.
    pub fn solve<'a>(
        &mut self,
        operator: &CsrMatrix<T>,
        rhs: impl Into<DVectorView<'a, T>>,
        solution: impl Into<DVectorViewMut<'a, T>>,
    ) -> Result<usize, HybridizationError> {
        if self.stale {
            self.refresh(operator)?;
        }
        let rhs = rhs.into();
        let mut solution = solution.into();

        let iterations = match self.options.ksp_type {
            KspType::PreOnly => {
                let cholesky = self.cholesky.as_ref().ok_or(HybridizationError::NotSetUp)?;
                CholeskyOperator(cholesky)
                    .apply(solution.as_view_mut(), rhs)
                    .map_err(|_| ReducedSolveError::CholeskyFailed)?;
                if let Some(nullspace) = &self.nullspace {
                    nullspace.remove_from(&mut solution);
                }
                1
            }
            KspType::Cg => {
                let identity = IdentityOperator;
                let cholesky_operator;
                let preconditioner: &dyn LinearOperator<T> = match self.options.pc_type {
                    PcType::None => &identity,
                    PcType::Jacobi => self.jacobi.as_ref().ok_or(HybridizationError::NotSetUp)?,
                    PcType::Cholesky => {
                        cholesky_operator = CholeskyOperator(self.cholesky.as_ref().ok_or(HybridizationError::NotSetUp)?);
                        &cholesky_operator
                    }
                };

                solution.fill(T::zero());
                let result = ConjugateGradient::with_workspace(&mut self.workspace)
                    .with_operator(operator)
                    .with_preconditioner(preconditioner)
                    .with_stopping_criterion(RelativeResidualCriterion::new(nalgebra::convert::<f64, T>(
                        self.options.rtol,
                    )))
                    .with_max_iter(self.options.max_it)
                    .with_nullspace(self.nullspace.as_ref())
                    .solve_with_guess(rhs, &mut solution);
                match result {
                    Ok(output) => output.num_iterations,
                    Err(err) => {
                        return Err(ReducedSolveError::Krylov {
                            num_iterations: err.output.num_iterations,
                            kind: err.kind,
                        }
                        .into())
                    }
                }
            }
        };

        debug!("Solved reduced system in {} iterations", iterations);
        self.last_iterations = Some(iterations);
        Ok(iterations)
    }

    /// Writes a description of the solver.
    pub fn view(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "  reduced solver: ksp_type = {}, pc_type = {}, rtol = {:e}, max_it = {}",
            self.options.ksp_type, self.options.pc_type, self.options.rtol, self.options.max_it
        )?;
        match &self.nullspace {
            Some(nullspace) => writeln!(out, "  reduced nullspace: {} vectors", nullspace.len())?,
            None => writeln!(out, "  reduced nullspace: none")?,
        }
        if let Some(iterations) = self.last_iterations {
            writeln!(out, "  last solve: {} iterations", iterations)?;
        }
        Ok(())
    }
}
