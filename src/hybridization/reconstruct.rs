//! Local recovery of the broken unknowns from the trace solution.
//!
//! With the broken operator split into blocks
//!
//! ```text
//! [ A  B ] [ sigma ]   [ g ]   [ K^T lambda ]
//! [ C  D ] [   u   ] = [ f ] - [     0      ]
//! ```
//!
//! the scalar is recovered first from the Schur complement `M = D - C A^-1 B`,
//!
//! ```text
//! u = M^-1 f + M^-1 (C A^-1 K^T lambda - C A^-1 g),
//! ```
//!
//! and then the flux,
//!
//! ```text
//! sigma = A^-1 g - A^-1 (B u + K^T lambda).
//! ```
//!
//! Both steps are cell-local.
use crate::config::FormCompilerParameters;
use crate::error::HybridizationError;
use crate::form::BilinearForm;
use crate::function::Function;
use crate::hybridization::schur::BROKEN_RHS;
use crate::hybridization::transform::HybridSpaces;
use crate::tensor::{evaluate_local_into, Bindings, Coefficient, KernelCompiler, LocalKernel, Tensor};
use crate::Real;
use nalgebra::DVector;

const TRACE_SOLUTION: &str = "trace_solution";
const BROKEN_SOLUTION: &str = "broken_solution";

#[derive(Debug)]
pub struct Reconstruction<T: Real> {
    spaces: HybridSpaces<T>,
    scalar_kernel: Box<dyn LocalKernel<T>>,
    flux_kernel: Box<dyn LocalKernel<T>>,
    flux: DVector<T>,
}

impl<T: Real> Reconstruction<T> {
    /// Compiles the recovery kernels for a broken operator and its trace coupling.
    pub fn new(
        broken_operator: &BilinearForm<T>,
        coupling: &BilinearForm<T>,
        spaces: &HybridSpaces<T>,
        compiler: &dyn KernelCompiler<T>,
        parameters: &FormCompilerParameters,
    ) -> Result<Self, HybridizationError> {
        let (v, s) = (spaces.vector_index, spaces.scalar_index);
        let block = |i, j| -> Result<Tensor<T>, HybridizationError> { Ok(Tensor::form(broken_operator.block(i, j)?)) };
        let a = block(v, v)?;
        let b = block(v, s)?;
        let c = block(s, v)?;
        let d = block(s, s)?;
        let k = Tensor::form(coupling.block(0, v)?);

        let lambda = Tensor::coefficient(Coefficient::new(TRACE_SOLUTION, spaces.trace.clone()));
        let rhs = Coefficient::new(BROKEN_RHS, spaces.broken.clone());
        let g = Tensor::coefficient(rhs.clone().component(v));
        let f = Tensor::coefficient(rhs.component(s));
        let u = Tensor::coefficient(Coefficient::new(BROKEN_SOLUTION, spaces.broken.clone()).component(s));

        let a_inv = a.inv();
        let m = &d - &c * (&a_inv * &b);
        let scalar = m.inv() * &f + m.inv() * (&c * (&a_inv * (k.t() * &lambda)) - &c * (&a_inv * &g));
        let flux = &a_inv * &g - &a_inv * (&b * &u + k.t() * &lambda);

        Ok(Self {
            spaces: spaces.clone(),
            scalar_kernel: compiler.compile(&scalar, parameters)?,
            flux_kernel: compiler.compile(&flux, parameters)?,
            flux: DVector::zeros(spaces.broken.sub(v).num_dofs()),
        })
    }

    /// Recovers the broken solution from the broken right-hand side and the trace solution.
    pub fn reconstruct(
        &mut self,
        broken_rhs: &Function<T>,
        trace_solution: &Function<T>,
        broken_solution: &mut Function<T>,
    ) -> Result<(), HybridizationError> {
        let scalar_bindings = Bindings::new()
            .bind(BROKEN_RHS, broken_rhs)
            .bind(TRACE_SOLUTION, trace_solution);
        evaluate_local_into(
            broken_solution.component_mut(self.spaces.scalar_index),
            self.scalar_kernel.as_ref(),
            &scalar_bindings,
        )?;

        let flux_bindings = Bindings::new()
            .bind(BROKEN_RHS, broken_rhs)
            .bind(TRACE_SOLUTION, trace_solution)
            .bind(BROKEN_SOLUTION, &*broken_solution);
        evaluate_local_into(&mut self.flux, self.flux_kernel.as_ref(), &flux_bindings)?;
        broken_solution
            .component_mut(self.spaces.vector_index)
            .copy_from(&self.flux);
        Ok(())
    }
}
