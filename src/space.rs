//! Function spaces and their degree-of-freedom numbering.
use crate::element::{CellBasis, FiniteElement, SobolevSpace};
use crate::mesh::Mesh2d;
use crate::Real;
use eyre::eyre;
use log::debug;
use nalgebra::Scalar;
use rayon::prelude::*;
use std::sync::Arc;

/// A finite element space over a mesh, built from a single element.
///
/// Conforming spaces share the degrees of freedom attached to a facet between the cells
/// adjacent to it. Their global numbering places all facet degrees of freedom first (facet by
/// facet), followed by the interior degrees of freedom (cell by cell). Broken spaces use the
/// same element with every cell owning its own copy of all degrees of freedom, numbered cell
/// by cell.
#[derive(Debug, Clone)]
pub struct FunctionSpace<T: Scalar> {
    mesh: Arc<Mesh2d<T>>,
    element: FiniteElement,
    broken: bool,
    num_dofs: usize,
    cell_dofs: Vec<usize>,
    bases: Arc<Vec<CellBasis<T>>>,
}

impl<T: Real> FunctionSpace<T> {
    pub fn new(mesh: Arc<Mesh2d<T>>, element: FiniteElement) -> eyre::Result<Self> {
        let bases: Vec<_> = (0..mesh.num_cells())
            .into_par_iter()
            .map(|cell_index| element.cell_basis(&mesh, cell_index))
            .collect::<eyre::Result<_>>()?;
        let (num_dofs, cell_dofs) = number_dofs(&mesh, &element, false);
        debug!(
            "Built {} space of degree {} with {} dofs on {} cells",
            element.family(),
            element.degree(),
            num_dofs,
            mesh.num_cells()
        );
        Ok(Self {
            mesh,
            element,
            broken: false,
            num_dofs,
            cell_dofs,
            bases: Arc::new(bases),
        })
    }

    /// The discontinuous version of this space, with the same element on every cell.
    ///
    /// The cell bases are shared with `self`.
    pub fn broken(&self) -> Self {
        let (num_dofs, cell_dofs) = number_dofs(&self.mesh, &self.element, true);
        Self {
            mesh: Arc::clone(&self.mesh),
            element: self.element,
            broken: true,
            num_dofs,
            cell_dofs,
            bases: Arc::clone(&self.bases),
        }
    }

    pub fn mesh(&self) -> &Arc<Mesh2d<T>> {
        &self.mesh
    }

    pub fn element(&self) -> &FiniteElement {
        &self.element
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn is_vector_valued(&self) -> bool {
        self.element.is_vector_valued()
    }

    pub fn value_dim(&self) -> usize {
        self.element.value_dim()
    }

    /// Broken spaces only have L2 regularity, whatever the element.
    pub fn sobolev_space(&self) -> SobolevSpace {
        if self.broken {
            SobolevSpace::L2
        } else {
            self.element.sobolev_space()
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_cell_dofs(&self) -> usize {
        self.element.num_cell_dofs()
    }

    /// Global indices of the degrees of freedom of the given cell, in local order.
    pub fn cell_dofs(&self, cell_index: usize) -> &[usize] {
        let n = self.num_cell_dofs();
        &self.cell_dofs[n * cell_index..n * (cell_index + 1)]
    }

    pub fn cell_basis(&self, cell_index: usize) -> &CellBasis<T> {
        &self.bases[cell_index]
    }

    /// Global degrees of freedom attached to the given facet, in facet-local order.
    pub fn facet_dofs(&self, facet_index: usize) -> Vec<usize> {
        let per_facet = self.element.num_facet_dofs();
        let neighbors = self.mesh.facet_neighbors(facet_index);
        let (cell_index, local_facet) = neighbors.first;
        self.cell_dofs(cell_index)[local_facet * per_facet..(local_facet + 1) * per_facet].to_vec()
    }

    /// The number of cells referencing each degree of freedom.
    pub fn dof_multiplicity(&self) -> Vec<usize> {
        let mut multiplicity = vec![0; self.num_dofs];
        for &dof in &self.cell_dofs {
            multiplicity[dof] += 1;
        }
        multiplicity
    }

    /// Whether the spaces discretize the same function space with the same numbering.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mesh, &other.mesh) && self.element == other.element && self.broken == other.broken
    }
}

fn number_dofs<T: Real>(mesh: &Mesh2d<T>, element: &FiniteElement, broken: bool) -> (usize, Vec<usize>) {
    let n = element.num_cell_dofs();
    let num_cells = mesh.num_cells();
    if broken {
        return (n * num_cells, (0..n * num_cells).collect());
    }

    let per_facet = element.num_facet_dofs();
    let num_interior = element.num_interior_dofs();
    let interior_offset = per_facet * mesh.num_facets();
    let mut cell_dofs = Vec::with_capacity(n * num_cells);
    for cell_index in 0..num_cells {
        for &facet_index in mesh.cell_facets(cell_index) {
            cell_dofs.extend((0..per_facet).map(|m| per_facet * facet_index + m));
        }
        cell_dofs.extend((0..num_interior).map(|r| interior_offset + num_interior * cell_index + r));
    }
    (interior_offset + num_interior * num_cells, cell_dofs)
}

/// An ordered tuple of function spaces on the same mesh.
///
/// Degrees of freedom of the mixed space are the concatenation of the degrees of freedom of the
/// subspaces. A single space is treated as a mixed space with one subspace.
#[derive(Debug, Clone)]
pub struct MixedSpace<T: Scalar> {
    spaces: Vec<Arc<FunctionSpace<T>>>,
    offsets: Vec<usize>,
}

impl<T: Real> MixedSpace<T> {
    pub fn new(spaces: Vec<Arc<FunctionSpace<T>>>) -> eyre::Result<Self> {
        let first = spaces
            .first()
            .ok_or_else(|| eyre!("a mixed space needs at least one subspace"))?;
        if spaces.iter().any(|space| !Arc::ptr_eq(space.mesh(), first.mesh())) {
            return Err(eyre!("all subspaces of a mixed space must be defined on the same mesh"));
        }
        let offsets = spaces
            .iter()
            .scan(0, |offset, space| {
                let current = *offset;
                *offset += space.num_dofs();
                Some(current)
            })
            .collect();
        Ok(Self { spaces, offsets })
    }

    pub fn num_subspaces(&self) -> usize {
        self.spaces.len()
    }

    pub fn subspaces(&self) -> &[Arc<FunctionSpace<T>>] {
        &self.spaces
    }

    pub fn sub(&self, index: usize) -> &Arc<FunctionSpace<T>> {
        &self.spaces[index]
    }

    /// The mixed space consisting only of the given subspace.
    pub fn component(&self, index: usize) -> Self {
        Self::from(Arc::clone(&self.spaces[index]))
    }

    pub fn mesh(&self) -> &Arc<Mesh2d<T>> {
        self.spaces[0].mesh()
    }

    /// Offset of the given subspace in the global numbering.
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    pub fn num_dofs(&self) -> usize {
        self.spaces.iter().map(|space| space.num_dofs()).sum()
    }

    pub fn num_cell_dofs(&self) -> usize {
        self.spaces.iter().map(|space| space.num_cell_dofs()).sum()
    }

    /// Offset of the given subspace within the degrees of freedom of a cell.
    pub fn cell_offset(&self, index: usize) -> usize {
        self.spaces[..index]
            .iter()
            .map(|space| space.num_cell_dofs())
            .sum()
    }

    /// Global degrees of freedom of the given cell, subspace by subspace.
    pub fn cell_dofs(&self, cell_index: usize) -> Vec<usize> {
        let mut dofs = Vec::with_capacity(self.num_cell_dofs());
        self.populate_cell_dofs(&mut dofs, cell_index);
        dofs
    }

    pub fn populate_cell_dofs(&self, dofs: &mut Vec<usize>, cell_index: usize) {
        dofs.clear();
        for (space, offset) in self.spaces.iter().zip(&self.offsets) {
            dofs.extend(space.cell_dofs(cell_index).iter().map(|dof| offset + dof));
        }
    }

    /// The mixed space with every subspace replaced by its broken version.
    pub fn broken(&self) -> Self {
        let spaces = self
            .spaces
            .iter()
            .map(|space| Arc::new(space.broken()))
            .collect();
        Self {
            spaces,
            offsets: self.offsets_for_broken(),
        }
    }

    fn offsets_for_broken(&self) -> Vec<usize> {
        let num_cells = self.mesh().num_cells();
        self.spaces
            .iter()
            .scan(0, |offset, space| {
                let current = *offset;
                *offset += space.num_cell_dofs() * num_cells;
                Some(current)
            })
            .collect()
    }

    /// Structural compatibility: same mesh and pairwise compatible subspaces.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.spaces.len() == other.spaces.len()
            && self
                .spaces
                .iter()
                .zip(&other.spaces)
                .all(|(a, b)| a.is_compatible_with(b))
    }
}

impl<T: Real> From<Arc<FunctionSpace<T>>> for MixedSpace<T> {
    fn from(space: Arc<FunctionSpace<T>>) -> Self {
        Self {
            spaces: vec![space],
            offsets: vec![0],
        }
    }
}

impl<T: Real> From<FunctionSpace<T>> for MixedSpace<T> {
    fn from(space: FunctionSpace<T>) -> Self {
        Self::from(Arc::new(space))
    }
}
