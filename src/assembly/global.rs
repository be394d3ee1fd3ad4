use crate::space::MixedSpace;
use crate::Real;
use eyre::eyre;
use nalgebra::{DMatrix, DVector, DVectorViewMut, RealField};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;

/// Sparsity pattern of a matrix coupling the degrees of freedom of two spaces through cells.
///
/// Row `i` has an entry in column `j` whenever the test degree of freedom `i` and the trial
/// degree of freedom `j` belong to a common cell.
pub fn assemble_pattern<T: Real>(
    test_space: &MixedSpace<T>,
    trial_space: &MixedSpace<T>,
) -> eyre::Result<SparsityPattern> {
    // Collecting into a BTreeSet stores each matrix entry exactly once, which keeps memory
    // usage low even though many entries are visited from several cells
    let mut matrix_entries = BTreeSet::new();
    let mut row_dofs = Vec::new();
    let mut col_dofs = Vec::new();
    for cell_index in 0..test_space.mesh().num_cells() {
        test_space.populate_cell_dofs(&mut row_dofs, cell_index);
        trial_space.populate_cell_dofs(&mut col_dofs, cell_index);
        for &i in &row_dofs {
            for &j in &col_dofs {
                matrix_entries.insert((i, j));
            }
        }
    }

    let num_rows = test_space.num_dofs();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());

    offsets.push(0);
    for (i, j) in matrix_entries {
        // Consecutive empty rows need a while loop
        while i + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < (num_rows + 1) {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, trial_space.num_dofs(), offsets, column_indices)
        .map_err(|err| eyre!("failed to construct sparsity pattern: {}", err))
}

/// A CSR matrix with the given pattern and all values zero.
pub fn zero_csr_from_pattern<T: Real>(pattern: SparsityPattern) -> eyre::Result<CsrMatrix<T>> {
    let values = vec![T::zero(); pattern.nnz()];
    CsrMatrix::try_from_pattern_and_values(pattern, values)
        .map_err(|err| eyre!("failed to construct CSR matrix: {}", err))
}

/// Adds a local element matrix to the given rows and columns of a CSR matrix.
///
/// Fails if an entry is not part of the sparsity pattern.
pub fn add_local_matrix_to_csr<T: Real>(
    csr: &mut CsrMatrix<T>,
    row_dofs: &[usize],
    col_dofs: &[usize],
    local: &DMatrix<T>,
) -> eyre::Result<()> {
    assert_eq!(local.nrows(), row_dofs.len());
    assert_eq!(local.ncols(), col_dofs.len());
    for (local_row, &global_row) in row_dofs.iter().enumerate() {
        let mut row = csr.row_mut(global_row);
        let (cols, values) = row.cols_and_values_mut();
        for (local_col, &global_col) in col_dofs.iter().enumerate() {
            let idx = cols
                .binary_search(&global_col)
                .map_err(|_| eyre!("entry ({}, {}) is not in the sparsity pattern", global_row, global_col))?;
            values[idx] += local[(local_row, local_col)];
        }
    }
    Ok(())
}

/// Adds a local element vector to the given entries of a global vector.
pub fn add_local_vector<T: Real>(global: &mut DVectorViewMut<T>, dofs: &[usize], local: &DVector<T>) {
    assert_eq!(local.len(), dofs.len());
    for (&dof, &value) in dofs.iter().zip(local.iter()) {
        global[dof] += value;
    }
}

/// Applies homogeneous Dirichlet conditions to the given degrees of freedom of a matrix with
/// symmetric sparsity pattern.
///
/// Rows and columns of constrained degrees of freedom are zeroed, and their diagonal entries
/// are set to a representative diagonal value of the matrix, which keeps the conditioning of
/// the matrix comparable to the unconstrained one.
pub fn apply_homogeneous_dirichlet_bc_csr<T>(matrix: &mut CsrMatrix<T>, dofs: &[usize])
where
    T: RealField + Copy,
{
    // The first nonzero diagonal entry serves as the representative scale
    let scale = (0..matrix.nrows())
        .filter_map(|i| {
            let row = matrix.row(i);
            row.col_indices()
                .binary_search(&i)
                .ok()
                .map(|idx| row.values()[idx])
        })
        .find(|&d| d != T::zero())
        .map(|d| d.abs())
        .unwrap_or_else(T::one);

    // To zero column c without visiting the whole matrix, note that by symmetry of the pattern,
    // visiting (r, c) in a Dirichlet row r means that row c contains the entry (c, r)
    let mut dirichlet_membership = vec![false; matrix.nrows()];
    let mut rows_to_visit = vec![false; matrix.nrows()];

    for &dof in dofs {
        dirichlet_membership[dof] = true;
        let mut row = matrix.row_mut(dof);
        let (cols, values) = row.cols_and_values_mut();
        for (&col_idx, val) in cols.iter().zip(values) {
            if col_idx == dof {
                *val = scale;
            } else {
                *val = T::zero();
                rows_to_visit[col_idx] = true;
            }
        }
    }

    for row_index in (0..matrix.nrows()).filter(|&i| rows_to_visit[i] && !dirichlet_membership[i]) {
        let mut row = matrix.row_mut(row_index);
        let (cols, values) = row.cols_and_values_mut();
        for (&col_idx, val) in cols.iter().zip(values) {
            if dirichlet_membership[col_idx] {
                *val = T::zero();
            }
        }
    }
}

/// Zeroes the entries of constrained degrees of freedom in a right-hand side.
pub fn apply_homogeneous_dirichlet_bc_rhs<'a, T>(rhs: impl Into<DVectorViewMut<'a, T>>, dofs: &[usize])
where
    T: RealField + Copy,
{
    let mut rhs = rhs.into();
    for &dof in dofs {
        rhs[dof] = T::zero();
    }
}
