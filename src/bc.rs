use crate::assembly::global::{apply_homogeneous_dirichlet_bc_csr, apply_homogeneous_dirichlet_bc_rhs};
use crate::space::FunctionSpace;
use crate::Real;
use nalgebra::DVectorViewMut;
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

/// Homogeneous Dirichlet condition on a set of degrees of freedom of a space.
#[derive(Debug, Clone)]
pub struct DirichletBc<T: Real> {
    space: Arc<FunctionSpace<T>>,
    dofs: Vec<usize>,
}

impl<T: Real> DirichletBc<T> {
    /// Constrains all degrees of freedom attached to boundary facets.
    pub fn on_boundary(space: Arc<FunctionSpace<T>>) -> Self {
        let mut dofs: Vec<usize> = space
            .mesh()
            .boundary_facets()
            .iter()
            .flat_map(|&facet_index| space.facet_dofs(facet_index))
            .collect();
        dofs.sort_unstable();
        dofs.dedup();
        Self { space, dofs }
    }

    pub fn space(&self) -> &Arc<FunctionSpace<T>> {
        &self.space
    }

    /// Sorted constrained degrees of freedom.
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    pub fn apply_to_matrix(&self, matrix: &mut CsrMatrix<T>) {
        apply_homogeneous_dirichlet_bc_csr(matrix, &self.dofs);
    }

    pub fn apply_to_vector<'a>(&self, vector: impl Into<DVectorViewMut<'a, T>>) {
        apply_homogeneous_dirichlet_bc_rhs(vector, &self.dofs);
    }
}
