use crate::space::MixedSpace;
use crate::Real;
use eyre::eyre;
use nalgebra::{DVector, DVectorView, DVectorViewMut, Scalar};

/// A named finite element field: a coefficient vector over a (mixed) function space.
#[derive(Debug, Clone)]
pub struct Function<T: Scalar> {
    name: String,
    space: MixedSpace<T>,
    coefficients: DVector<T>,
}

impl<T: Real> Function<T> {
    /// A zero-initialized field on the given space.
    pub fn new(name: impl Into<String>, space: impl Into<MixedSpace<T>>) -> Self {
        let space = space.into();
        let coefficients = DVector::zeros(space.num_dofs());
        Self {
            name: name.into(),
            space,
            coefficients,
        }
    }

    pub fn from_coefficients(
        name: impl Into<String>,
        space: impl Into<MixedSpace<T>>,
        coefficients: DVector<T>,
    ) -> eyre::Result<Self> {
        let space = space.into();
        if coefficients.len() != space.num_dofs() {
            return Err(eyre!(
                "coefficient vector has length {}, but the space has {} dofs",
                coefficients.len(),
                space.num_dofs()
            ));
        }
        Ok(Self {
            name: name.into(),
            space,
            coefficients,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> &MixedSpace<T> {
        &self.space
    }

    pub fn coefficients(&self) -> &DVector<T> {
        &self.coefficients
    }

    pub fn coefficients_mut(&mut self) -> &mut DVector<T> {
        &mut self.coefficients
    }

    /// Coefficients of the given component of a mixed field.
    pub fn component(&self, index: usize) -> DVectorView<T> {
        let offset = self.space.offset(index);
        let n = self.space.sub(index).num_dofs();
        self.coefficients.rows(offset, n)
    }

    pub fn component_mut(&mut self, index: usize) -> DVectorViewMut<T> {
        let offset = self.space.offset(index);
        let n = self.space.sub(index).num_dofs();
        self.coefficients.rows_mut(offset, n)
    }

    /// Gathers the coefficients associated with the given cell, in local order.
    pub fn cell_coefficients(&self, cell_index: usize) -> DVector<T> {
        let dofs = self.space.cell_dofs(cell_index);
        DVector::from_iterator(dofs.len(), dofs.iter().map(|&dof| self.coefficients[dof]))
    }

    /// Gathers the coefficients of one component associated with the given cell.
    pub fn cell_component_coefficients(&self, component: usize, cell_index: usize) -> DVector<T> {
        let offset = self.space.offset(component);
        let dofs = self.space.sub(component).cell_dofs(cell_index);
        DVector::from_iterator(dofs.len(), dofs.iter().map(|&dof| self.coefficients[offset + dof]))
    }

    pub fn fill(&mut self, value: T) {
        self.coefficients.fill(value);
    }
}
